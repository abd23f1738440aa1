use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use log::{debug, info, warn};
use nodelayer_platform::Host;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::command::{locate_tool, run_captured};
use crate::error::LayerError;
use crate::source::DistSource;
use crate::version::RuntimeVersion;

pub const NPM_BIN: &str = "npm";

const EXTRACTED_PREFIX: &str = "node-v";
const CHECKSUMS_FILE: &str = "SHASUMS256.txt";

/// An extracted Node.js distribution. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInstallation {
    pub version: RuntimeVersion,
    pub root: PathBuf,
    pub npm_path: PathBuf,
}

impl RuntimeInstallation {
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }
}

/// Host-wide store of extracted distributions keyed by version, OS and
/// architecture.
///
/// Lookups never lock. Populating an entry takes an exclusive lock file per
/// key, extracts into a private staging directory and renames the result
/// into place, so concurrent first use downloads once and readers never see
/// a half-extracted tree.
#[derive(Clone)]
pub struct DistributionCache {
    root: PathBuf,
    host: Host,
    source: Arc<dyn DistSource>,
    verify_checksums: bool,
}

impl DistributionCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn DistSource>) -> Self {
        Self {
            root: root.into(),
            host: Host::current(),
            source,
            verify_checksums: true,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: Host) -> Self {
        self.host = host;
        self
    }

    #[must_use]
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    #[must_use]
    pub fn distribution_name(&self, version: &RuntimeVersion) -> String {
        format!("node-{version}-{}-{}", self.host.os, self.host.arch)
    }

    #[must_use]
    pub fn installation_dir(&self, version: &RuntimeVersion) -> PathBuf {
        self.root.join(self.distribution_name(version))
    }

    /// Return the cached installation for `version` if its npm can be opened.
    #[must_use]
    pub fn lookup(&self, version: &RuntimeVersion) -> Option<RuntimeInstallation> {
        let root = self.installation_dir(version);
        let npm_path = root.join("bin").join(NPM_BIN);

        std::fs::File::open(&npm_path).ok()?;

        Some(RuntimeInstallation {
            version: version.clone(),
            root,
            npm_path,
        })
    }

    /// Return a usable installation for `version`, downloading and extracting
    /// the distribution on a cache miss.
    ///
    /// # Errors
    /// Returns an error if the platform has no tarball distribution, the
    /// download or checksum verification fails, extraction does not produce
    /// a Node.js tree, or the cache directory cannot be written.
    pub async fn acquire(
        &self,
        version: &RuntimeVersion,
    ) -> Result<RuntimeInstallation, LayerError> {
        if let Some(installation) = self.lookup(version) {
            debug!("Using cached Node.js {version} at {}", installation.root.display());
            return Ok(installation);
        }

        if !self.host.has_tarball() {
            return Err(LayerError::UnsupportedPlatform {
                host: self.host.to_string(),
            });
        }

        tokio::fs::create_dir_all(&self.root).await.map_err(|error| {
            LayerError::io_with_path("failed to create distribution cache", &self.root, &error)
        })?;

        let _lock = self.lock(version).await?;

        if let Some(installation) = self.lookup(version) {
            debug!("Node.js {version} was installed while waiting for the cache lock");
            return Ok(installation);
        }

        self.populate(version).await
    }

    /// Acquire `version` ahead of the first request, logging failures.
    pub async fn prewarm(&self, version: &RuntimeVersion) {
        match self.acquire(version).await {
            Ok(installation) => info!(
                "Node.js {version} ready at {}",
                installation.npm_path.display()
            ),
            Err(error) => warn!("Failed to prewarm Node.js {version}: {error}"),
        }
    }

    async fn lock(&self, version: &RuntimeVersion) -> Result<std::fs::File, LayerError> {
        let path = self
            .root
            .join(format!("{}.lock", self.distribution_name(version)));

        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|error| {
                    LayerError::io_with_path("failed to open cache lock", &path, &error)
                })?;
            file.lock_exclusive().map_err(|error| {
                LayerError::io_with_path("failed to lock distribution cache", &path, &error)
            })?;
            Ok(file)
        })
        .await
        .map_err(|error| LayerError::Io {
            context: "cache lock task failed",
            kind: std::io::ErrorKind::Other,
            message: error.to_string(),
        })?
    }

    async fn populate(&self, version: &RuntimeVersion) -> Result<RuntimeInstallation, LayerError> {
        let name = self.distribution_name(version);
        let tarball = format!("{name}.tar.gz");

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}-"))
            .tempdir_in(&self.root)
            .map_err(|error| {
                LayerError::io_with_path("failed to create staging directory", &self.root, &error)
            })?;
        let archive_path = staging.path().join(&tarball);

        info!("Downloading Node.js {version} for {}", self.host);
        self.source
            .download(&format!("{version}/{tarball}"), &archive_path)
            .await?;

        if self.verify_checksums {
            self.verify_checksum(version, &tarball, &archive_path).await?;
        }

        extract_tarball(&archive_path, staging.path()).await?;
        let extracted = find_extracted_root(staging.path())?;

        if !extracted.join("bin").join(NPM_BIN).is_file() {
            return Err(LayerError::extraction(format!(
                "{} does not contain bin/{NPM_BIN}",
                extracted.display()
            )));
        }

        let root = self.installation_dir(version);
        if tokio::fs::symlink_metadata(&root).await.is_ok() {
            // lookup already failed under the lock, so this entry is broken
            warn!("Replacing incomplete cache entry {}", root.display());
            tokio::fs::remove_dir_all(&root).await.map_err(|error| {
                LayerError::io_with_path("failed to remove broken cache entry", &root, &error)
            })?;
        }
        tokio::fs::rename(&extracted, &root).await.map_err(|error| {
            LayerError::io_with_path("failed to move distribution into cache", &root, &error)
        })?;

        info!("Installed Node.js {version} into {}", root.display());

        Ok(RuntimeInstallation {
            version: version.clone(),
            npm_path: root.join("bin").join(NPM_BIN),
            root,
        })
    }

    async fn verify_checksum(
        &self,
        version: &RuntimeVersion,
        tarball: &str,
        archive_path: &Path,
    ) -> Result<(), LayerError> {
        let checksums = self
            .source
            .fetch_text(&format!("{version}/{CHECKSUMS_FILE}"))
            .await?;
        let expected =
            parse_expected_checksum(&checksums, tarball).ok_or_else(|| {
                LayerError::ChecksumMissing {
                    file: tarball.to_string(),
                }
            })?;

        let path = archive_path.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || sha256_file(&path))
            .await
            .map_err(|error| LayerError::Io {
                context: "checksum task failed",
                kind: std::io::ErrorKind::Other,
                message: error.to_string(),
            })??;

        if actual.eq_ignore_ascii_case(&expected) {
            debug!("Checksum verified for {tarball}");
            Ok(())
        } else {
            Err(LayerError::ChecksumMismatch {
                file: tarball.to_string(),
                expected,
                actual,
            })
        }
    }
}

async fn extract_tarball(archive: &Path, dest: &Path) -> Result<(), LayerError> {
    let tar = locate_tool("tar")?;
    let mut cmd = Command::new(tar);
    cmd.arg("-xzf").arg(archive).current_dir(dest);

    match run_captured("tar", &mut cmd).await {
        Ok(_) => Ok(()),
        Err(LayerError::CommandFailed { output, .. }) => Err(LayerError::extraction(output)),
        Err(LayerError::CommandExited { status, .. }) => Err(LayerError::extraction(format!(
            "tar exited unsuccessfully ({status})"
        ))),
        Err(error) => Err(error),
    }
}

fn find_extracted_root(dir: &Path) -> Result<PathBuf, LayerError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|error| LayerError::io_with_path("failed to read staging directory", dir, &error))?;

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with(EXTRACTED_PREFIX)
        })
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        LayerError::extraction(format!(
            "no {EXTRACTED_PREFIX}* directory found in {}",
            dir.display()
        ))
    })
}

fn parse_expected_checksum(checksums: &str, file_name: &str) -> Option<String> {
    checksums.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let name = parts
            .next()?
            .trim_start_matches('*')
            .trim_start_matches("./");
        (name == file_name).then(|| hash.to_ascii_lowercase())
    })
}

fn sha256_file(path: &Path) -> Result<String, LayerError> {
    let mut file = std::fs::File::open(path).map_err(|error| {
        LayerError::io_with_path("failed to open file for checksum", path, &error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(|error| {
            LayerError::io_with_path("failed to read file for checksum", path, &error)
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
