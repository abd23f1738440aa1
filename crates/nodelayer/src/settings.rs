use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use nodelayer_core::{DEFAULT_DIST_URL, FALLBACK_VERSION, RuntimeVersion, VersionParseError};
use nodelayer_platform::AppPaths;
use serde::Deserialize;
use thiserror::Error;

/// Overrides the settings file location. Re-exec'd children inherit it.
pub const SETTINGS_ENV: &str = "NODELAYER_SETTINGS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_dist_url")]
    pub dist_url: String,

    #[serde(default = "default_fallback_version")]
    pub fallback_version: String,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    #[serde(default = "default_true")]
    pub prewarm_default: bool,

    #[serde(default)]
    pub retain_artifacts: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 1923))
}

fn default_dist_url() -> String {
    DEFAULT_DIST_URL.to_string()
}

fn default_fallback_version() -> String {
    FALLBACK_VERSION.to_string()
}

fn default_http_timeout() -> u64 {
    300
}

fn default_job_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            dist_url: default_dist_url(),
            fallback_version: default_fallback_version(),
            cache_dir: None,
            work_dir: None,
            http_timeout_secs: default_http_timeout(),
            job_timeout_secs: default_job_timeout(),
            verify_checksums: true,
            prewarm_default: true,
            retain_artifacts: false,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl Settings {
    /// Load settings from `NODELAYER_SETTINGS` or the per-user config file.
    ///
    /// Runs before logging is set up, so a file that cannot be used is
    /// handed back next to the defaults for the caller to report.
    #[must_use]
    pub fn load() -> (Self, Option<SettingsError>) {
        let path = match std::env::var_os(SETTINGS_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => match AppPaths::new() {
                Ok(paths) => paths.settings_file(),
                Err(_) => return (Self::default(), None),
            },
        };
        Self::load_or_default(&path)
    }

    /// Defaults when `path` is missing, the file's settings when it parses,
    /// and defaults plus the error otherwise.
    #[must_use]
    pub fn load_or_default(path: &Path) -> (Self, Option<SettingsError>) {
        if !path.exists() {
            return (Self::default(), None);
        }

        match Self::load_from(path) {
            Ok(settings) => (settings, None),
            Err(error) => (Self::default(), Some(error)),
        }
    }

    /// Read and parse one settings file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The configured fallback, or the built-in one if it does not parse.
    ///
    /// # Errors
    /// Returns an error only if the built-in fallback is malformed as well.
    pub fn fallback_version(&self) -> Result<RuntimeVersion, VersionParseError> {
        RuntimeVersion::parse(&self.fallback_version).or_else(|error| {
            warn!("Ignoring fallback_version: {error}");
            RuntimeVersion::parse(FALLBACK_VERSION)
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            AppPaths::new().map_or_else(
                |_| std::env::temp_dir().join("nodelayer-dist"),
                |paths| paths.dist_cache_dir(),
            )
        })
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            AppPaths::new().map_or_else(|_| std::env::temp_dir(), |paths| paths.work_root())
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}
