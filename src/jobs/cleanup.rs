// Retrieval of finished files and removal of job artifacts

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use super::table::{JobId, JobTable};
use crate::downloader::errors::JobError;
use crate::downloader::utils::is_dir_empty;

/// Open handle on a completed job's output
#[derive(Debug)]
pub struct RetrievedFile {
    pub file: tokio::fs::File,
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

/// Open the result of a completed job and schedule its deferred cleanup
pub async fn retrieve(
    table: &Arc<JobTable>,
    id: JobId,
    grace: Duration,
) -> Result<RetrievedFile, JobError> {
    let result = table.result(&id).ok_or_else(|| {
        JobError::NotFound("File not found or download not completed".to_string())
    })?;

    let file = match tokio::fs::File::open(&result.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(JobError::NotFound("File no longer exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata().await?.len();

    schedule_cleanup(table.clone(), id, grace);
    debug!(job = %id, file = %result.path.display(), size, "serving result file");

    Ok(RetrievedFile {
        file,
        path: result.path,
        filename: result.filename,
        size,
    })
}

/// Purge the job after `grace`; errors are logged only
pub fn schedule_cleanup(table: Arc<JobTable>, id: JobId, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        match purge(&table, &id).await {
            Ok(true) => info!(job = %id, "deferred cleanup done"),
            Ok(false) => debug!(job = %id, "deferred cleanup: job already gone"),
            Err(e) => warn!(job = %id, error = %e, "deferred cleanup failed"),
        }
    });
}

/// Explicit cleanup; unknown ids succeed
pub async fn cleanup_now(table: &JobTable, id: &JobId) -> Result<(), JobError> {
    let purged = purge(table, id).await?;
    if purged {
        info!(job = %id, "cleaned up on request");
    }
    Ok(())
}

/// Remove the job entry, its result file and its work directory if empty.
///
/// The entry is taken out of the table first, so when two cleanups race only
/// one of them touches the filesystem. Returns whether an entry was removed.
pub async fn purge(table: &JobTable, id: &JobId) -> Result<bool, JobError> {
    let Some(entry) = table.remove(id) else {
        return Ok(false);
    };

    let mut failures = Vec::new();
    if let Some(result) = &entry.result {
        if let Err(e) = remove_file_if_present(&result.path).await {
            failures.push(format!("{}: {}", result.path.display(), e));
        }
    }

    let dir = entry.work_dir.or_else(|| {
        entry
            .result
            .as_ref()
            .and_then(|r| r.path.parent().map(Path::to_path_buf))
    });
    if let Some(dir) = dir {
        if let Err(e) = remove_dir_if_empty(&dir).await {
            failures.push(format!("{}: {}", dir.display(), e));
        }
    }

    if failures.is_empty() {
        Ok(true)
    } else {
        Err(JobError::Cleanup(failures.join("; ")))
    }
}

async fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn remove_dir_if_empty(dir: &Path) -> std::io::Result<()> {
    match is_dir_empty(dir).await {
        Ok(true) => match tokio::fs::remove_dir(dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
        Ok(false) => {
            debug!(dir = %dir.display(), "work dir not empty, keeping it");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete `{prefix}*` directories under `root` older than `older_than`.
///
/// Directories still owned by a live job are skipped. Returns how many were
/// removed.
pub async fn sweep_stale_work_dirs(
    table: &JobTable,
    root: &Path,
    prefix: &str,
    older_than: Duration,
) -> usize {
    if older_than.is_zero() {
        return 0;
    }

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(root = %root.display(), error = %e, "cannot open work root for sweep");
            }
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "cannot iterate work root for sweep");
                break;
            }
        };

        let path = entry.path();
        let name_matches = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(prefix))
            .unwrap_or(false);
        if !name_matches || table.owns_dir(&path) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_dir() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read metadata");
                continue;
            }
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !matches!(age, Some(age) if age >= older_than) {
            continue;
        }

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale work dir");
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "cannot remove stale work dir"),
        }
    }

    if removed > 0 {
        info!(removed, root = %root.display(), "swept stale work dirs");
    }
    removed
}
