// Helper functions shared by the engine adapter and the job worker

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use super::errors::EngineError;

/// Extensions accepted as the finished output of a transfer, in scan order
pub const MEDIA_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "webm", "avi", "m4a", "mp3"];

/// Run command with timeout, capturing stdout and stderr
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, EngineError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        EngineError::ExecutionError(format!("Failed to capture stdout from {}", program))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        EngineError::ExecutionError(format!("Failed to capture stderr from {}", program))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await {
        Ok(status_res) => {
            let status = status_res.map_err(|e| {
                EngineError::ExecutionError(format!("Failed to wait for {}: {}", program, e))
            })?;
            let stdout = join_pipe(stdout_task, "stdout").await?;
            let stderr = join_pipe(stderr_task, "stderr").await?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(EngineError::Timeout(timeout_secs))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, EngineError> {
    task.await
        .map_err(|e| EngineError::ExecutionError(format!("{} task failed: {}", name, e)))?
        .map_err(|e| EngineError::ExecutionError(format!("Failed to read {}: {}", name, e)))
}

pub fn spawn_error(program: &str, err: io::Error) -> EngineError {
    if err.kind() == io::ErrorKind::NotFound {
        EngineError::ToolNotFound(format!("{} ({})", program, err))
    } else {
        EngineError::ExecutionError(format!("Failed to start {}: {}", program, err))
    }
}

/// Condense yt-dlp stderr into the message worth showing.
///
/// `ERROR:` lines are preferred; otherwise the last non-empty line.
pub fn error_summary(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return errors.join(" | ");
    }

    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .next_back()
        .unwrap_or("yt-dlp exited with an error")
        .to_string()
}

pub fn has_media_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// First regular file in `dir` with a media extension.
///
/// Partial downloads (`.part`, `.ytdl`) never match.
pub async fn find_media_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_media_extension(&path) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Whether `dir` has no entries left
pub async fn is_dir_empty(dir: &Path) -> io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_summary_prefers_error_lines() {
        let stderr = "WARNING: something\nERROR: [youtube] x: Video unavailable\n\n";
        assert_eq!(error_summary(stderr), "ERROR: [youtube] x: Video unavailable");
    }

    #[test]
    fn test_error_summary_falls_back_to_last_line() {
        assert_eq!(error_summary("one\ntwo\n  \n"), "two");
        assert_eq!(error_summary(""), "yt-dlp exited with an error");
    }

    #[test]
    fn test_media_extension() {
        assert!(has_media_extension(Path::new("/tmp/a/video.mp4")));
        assert!(has_media_extension(Path::new("song.MP3")));
        assert!(!has_media_extension(Path::new("video.mp4.part")));
        assert!(!has_media_extension(Path::new("video.f137.ytdl")));
        assert!(!has_media_extension(Path::new("noext")));
    }

    #[tokio::test]
    async fn test_find_media_file_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("clip.mp4.part"), b"x")
            .await
            .unwrap();
        assert_eq!(find_media_file(dir.path()).await.unwrap(), None);

        tokio::fs::write(dir.path().join("clip.webm"), b"xyz")
            .await
            .unwrap();
        let found = find_media_file(dir.path()).await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "clip.webm");
    }

    #[tokio::test]
    async fn test_is_dir_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_dir_empty(dir.path()).await.unwrap());
        tokio::fs::write(dir.path().join("f"), b"").await.unwrap();
        assert!(!is_dir_empty(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = run_output_with_timeout("definitely-not-a-real-binary-xyz", vec![], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound(_)));
    }
}
