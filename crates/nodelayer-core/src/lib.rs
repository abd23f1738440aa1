//! Core layer generation for nodelayer.
//!
//! This crate holds everything needed to turn a Node.js version and a list of
//! npm packages into a deployable `layer.zip`, independent of the HTTP
//! surface:
//! - Release catalog queries against the Node.js distribution index.
//! - A shared, lock-coordinated cache of extracted distributions.
//! - npm project initialization and package installation.
//! - Archiving the project directory with the host `zip` tool.

mod archive;
mod catalog;
mod command;
mod dist;
mod error;
mod job;
mod npm;
mod source;
#[cfg(test)]
mod test_support;
mod version;

/// Zip helper producing the layer archive.
pub use archive::{ARCHIVE_FILE, create_archive};
/// LTS release listing and default version resolution.
pub use catalog::{FALLBACK_VERSION, VersionCatalog};
/// Extracted distribution cache.
pub use dist::{DistributionCache, RuntimeInstallation};
pub use error::{LayerError, NetworkStage};
/// One end-to-end generation with its own working directory.
pub use job::{LayerJob, WORK_DIR_PREFIX, is_job_dir};
/// npm project setup.
pub use npm::{PROJECT_DIR, install_packages, parse_package_list};
/// Distribution server access.
pub use source::{DEFAULT_DIST_URL, DistSource, HttpDistSource, IndexEntry, LtsMarker};
pub use version::{RuntimeVersion, VersionComponent, VersionParseError};
