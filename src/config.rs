use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::downloader::models::{InfoOptions, RetryPolicy};
use crate::jobs::manager::default_work_root;
use crate::jobs::ManagerSettings;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// yt-dlp tuning (`[engine]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub socket_timeout_secs: u32,
    /// Retries for metadata-only calls.
    pub info_retries: u32,
    /// Wall-clock budget of one metadata call.
    pub info_timeout_secs: u64,
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_retries: u32,
    pub file_access_retries: u32,
    pub concurrent_fragments: u32,
    pub http_chunk_size: u64,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 30,
            info_retries: 3,
            info_timeout_secs: 120,
            retries: 5,
            fragment_retries: 5,
            extractor_retries: 3,
            file_access_retries: 3,
            concurrent_fragments: 4,
            http_chunk_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

impl EngineConfig {
    pub fn info_options(&self) -> InfoOptions {
        InfoOptions {
            socket_timeout_secs: self.socket_timeout_secs,
            retries: self.info_retries,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            fragment_retries: self.fragment_retries,
            extractor_retries: self.extractor_retries,
            file_access_retries: self.file_access_retries,
        }
    }
}

/// Service configuration loaded from `<config_dir>/ytdl-service/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    /// Parent of the per-job work directories (`<temp>/ytdl-service` if unset).
    pub work_root: Option<PathBuf>,
    pub work_dir_prefix: String,
    /// Delay between serving a file and deleting it.
    pub cleanup_grace_secs: u64,
    /// Startup sweep threshold for leftover work dirs; 0 disables the sweep.
    pub stale_work_dir_secs: u64,
    /// Explicit yt-dlp binary; discovered from common locations otherwise.
    pub ytdlp_path: Option<String>,
    /// Log to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            work_root: None,
            work_dir_prefix: "ytdl_".to_string(),
            cleanup_grace_secs: 30,
            stale_work_dir_secs: 2 * 60 * 60,
            ytdlp_path: None,
            log_file: None,
            engine: EngineConfig::default(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ytdl-service").join("config.toml"))
}

impl ServiceConfig {
    /// Load from `path` (or the default location), then apply `YTDL_*`
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut cfg = match path {
            Some(path) if path.exists() => {
                let data = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                toml::from_str(&data)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            _ => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = var("YTDL_BIND") {
            self.bind_addr = bind;
        }
        if let Some(root) = var("YTDL_WORK_ROOT") {
            self.work_root = Some(PathBuf::from(root));
        }
        if let Some(grace) = var("YTDL_CLEANUP_GRACE_SECS") {
            self.cleanup_grace_secs = grace
                .trim()
                .parse()
                .with_context(|| format!("YTDL_CLEANUP_GRACE_SECS is not a number: {grace}"))?;
        }
        if let Some(path) = var("YTDL_YTDLP_PATH") {
            self.ytdlp_path = Some(path);
        }
        if let Some(proxy) = var("YTDL_PROXY") {
            self.engine.proxy = Some(proxy).filter(|p| !p.trim().is_empty());
        }
        Ok(())
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(default_work_root)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            work_root: self.work_root(),
            work_dir_prefix: self.work_dir_prefix.clone(),
            cleanup_grace: Duration::from_secs(self.cleanup_grace_secs),
            stale_after: Duration::from_secs(self.stale_work_dir_secs),
            info: self.engine.info_options(),
            retry: self.engine.retry_policy(),
        }
    }
}
