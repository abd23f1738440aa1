use std::path::{Path, PathBuf};

use log::info;
use nodelayer_platform::PrependPath;
use tokio::process::Command;

use crate::command::run_captured;
use crate::dist::RuntimeInstallation;
use crate::error::LayerError;

/// Directory name the serverless runtime searches for Node.js modules.
pub const PROJECT_DIR: &str = "nodejs";

/// Split a comma-separated package list, dropping blank entries.
///
/// # Errors
/// Returns an error for entries that npm would read as an option.
pub fn parse_package_list(csv: &str) -> Result<Vec<String>, LayerError> {
    csv.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            if name.starts_with('-') || name.chars().any(char::is_whitespace) {
                Err(LayerError::InvalidPackage {
                    name: name.to_string(),
                })
            } else {
                Ok(name.to_string())
            }
        })
        .collect()
}

/// Create `<work_dir>/nodejs`, initialize a manifest in it and install
/// `packages` with the installation's npm. Returns the project directory.
///
/// An empty package list only initializes the manifest.
///
/// # Errors
/// Returns an error if the project directory cannot be created or an npm
/// invocation fails; npm's output is carried in the error.
pub async fn install_packages(
    installation: &RuntimeInstallation,
    work_dir: &Path,
    packages: &[String],
) -> Result<PathBuf, LayerError> {
    let project_dir = work_dir.join(PROJECT_DIR);
    tokio::fs::create_dir(&project_dir).await.map_err(|error| {
        LayerError::io_with_path("failed to create project directory", &project_dir, &error)
    })?;

    run_npm(installation, &project_dir, &["init", "-y"]).await?;

    if packages.is_empty() {
        info!("No packages requested, skipping npm install");
        return Ok(project_dir);
    }

    info!(
        "Installing {} with Node.js {}",
        packages.join(", "),
        installation.version
    );

    let mut args = vec!["install", "--save"];
    args.extend(packages.iter().map(String::as_str));
    run_npm(installation, &project_dir, &args).await?;

    Ok(project_dir)
}

async fn run_npm(
    installation: &RuntimeInstallation,
    project_dir: &Path,
    args: &[&str],
) -> Result<String, LayerError> {
    let mut cmd = Command::new(&installation.npm_path);
    cmd.args(args)
        .current_dir(project_dir)
        .prepend_path(&installation.bin_dir())
        .env("NO_COLOR", "1")
        .env("npm_config_fund", "false")
        .env("npm_config_update_notifier", "false");

    run_captured("npm", &mut cmd).await
}
