use std::path::{Path, PathBuf};

use log::info;
use tokio::process::Command;

use crate::command::{locate_tool, run_captured};
use crate::error::LayerError;
use crate::npm::PROJECT_DIR;

pub const ARCHIVE_FILE: &str = "layer.zip";

/// Zip `<work_dir>/nodejs` into `<work_dir>/layer.zip`.
///
/// # Errors
/// Returns an error if `zip` is not installed or exits unsuccessfully; the
/// tool's output is carried in the error.
pub async fn create_archive(work_dir: &Path) -> Result<PathBuf, LayerError> {
    let zip = locate_tool("zip")?;

    let mut cmd = Command::new(zip);
    cmd.args(["-r", ARCHIVE_FILE, PROJECT_DIR]).current_dir(work_dir);
    run_captured("zip", &mut cmd).await?;

    let archive = work_dir.join(ARCHIVE_FILE);
    info!("Created {}", archive.display());
    Ok(archive)
}
