use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::archive::create_archive;
use crate::dist::DistributionCache;
use crate::error::LayerError;
use crate::npm::{install_packages, parse_package_list};
use crate::version::RuntimeVersion;

pub const WORK_DIR_PREFIX: &str = "nodelayer-";

/// One layer generation: a version, its packages and a working directory
/// owned by this job alone.
#[derive(Debug)]
pub struct LayerJob {
    version: RuntimeVersion,
    packages: Vec<String>,
    work_dir: PathBuf,
}

impl LayerJob {
    /// Validate raw arguments, then create the job's working directory.
    ///
    /// Nothing touches the filesystem unless both arguments are valid.
    ///
    /// # Errors
    /// Returns an error for an invalid version or package name, or when the
    /// working directory cannot be created.
    pub fn from_args(version: &str, packages: &str, work_root: &Path) -> Result<Self, LayerError> {
        let version = RuntimeVersion::parse(version)?;
        let packages = parse_package_list(packages)?;
        Self::create(version, packages, work_root)
    }

    /// Create a fresh `nodelayer-XXXXXX` directory under `work_root`.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created.
    pub fn create(
        version: RuntimeVersion,
        packages: Vec<String>,
        work_root: &Path,
    ) -> Result<Self, LayerError> {
        std::fs::create_dir_all(work_root).map_err(|error| {
            LayerError::io_with_path("failed to create work root", work_root, &error)
        })?;

        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(work_root)
            .map_err(|error| {
                LayerError::io_with_path("failed to create work directory", work_root, &error)
            })?
            .keep();

        debug!("Created work directory {}", work_dir.display());

        Ok(Self {
            version,
            packages,
            work_dir,
        })
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Acquire the runtime, install the packages and archive the result.
    ///
    /// # Errors
    /// Returns the first pipeline error; nothing is retried.
    pub async fn run(&self, cache: &DistributionCache) -> Result<PathBuf, LayerError> {
        let installation = cache.acquire(&self.version).await?;
        install_packages(&installation, &self.work_dir, &self.packages).await?;
        let archive = create_archive(&self.work_dir).await?;

        info!(
            "Layer for Node.js {} with [{}] written to {}",
            self.version,
            self.packages.join(", "),
            archive.display()
        );
        Ok(archive)
    }

    /// Remove the working directory and everything in it.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be removed.
    pub fn discard(self) -> Result<(), LayerError> {
        std::fs::remove_dir_all(&self.work_dir).map_err(|error| {
            LayerError::io_with_path("failed to remove work directory", &self.work_dir, &error)
        })
    }
}

/// Whether `dir` looks like a job directory created under `work_root`.
#[must_use]
pub fn is_job_dir(dir: &Path, work_root: &Path) -> bool {
    dir.parent() == Some(work_root)
        && dir
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(WORK_DIR_PREFIX))
}
