mod cli;
mod dispatch;
mod logging;
mod server;
mod settings;

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use nodelayer_core::{
    DistSource, DistributionCache, HttpDistSource, LayerError, LayerJob, RuntimeVersion,
    VersionCatalog, parse_package_list,
};
use nodelayer_platform::AppPaths;
use thiserror::Error;

use crate::cli::Cli;
use crate::dispatch::SelfExec;
use crate::server::AppState;
use crate::settings::Settings;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error("Invalid route pattern: {0}")]
    Routes(#[from] regex::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (settings, settings_error) = Settings::load();
    let paths = AppPaths::new().ok();
    let log_path = paths.as_ref().map(AppPaths::log_file);

    if cli.is_job() {
        logging::init_logging(
            settings.debug_logging,
            std::io::stderr().is_terminal(),
            log_path.as_deref(),
            None,
        );
        if let Some(error) = settings_error {
            warn!("{error}, using defaults");
        }
        run_job(cli, &settings, &mut std::io::stdout(), &mut std::io::stderr()).await
    } else {
        if let Some(paths) = &paths
            && let Err(error) = paths.ensure_dirs()
        {
            eprintln!("Failed to create application directories: {error}");
        }
        logging::init_logging(
            settings.debug_logging,
            true,
            log_path.as_deref(),
            Some(settings.max_log_size_bytes),
        );
        if let Some(error) = settings_error {
            warn!("{error}, using defaults");
        }
        match run_server(&settings).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                error!("Server stopped: {error}");
                ExitCode::FAILURE
            }
        }
    }
}

fn dist_source(settings: &Settings) -> Result<Arc<dyn DistSource>, LayerError> {
    let source: Arc<dyn DistSource> = Arc::new(HttpDistSource::new(
        settings.dist_url.clone(),
        settings.http_timeout(),
    )?);
    Ok(source)
}

fn distribution_cache(settings: &Settings, source: Arc<dyn DistSource>) -> DistributionCache {
    DistributionCache::new(settings.cache_dir(), source)
        .with_checksum_verification(settings.verify_checksums)
}

/// Build one layer and report it: the archive path on `out`, or the error
/// text on `err`.
async fn run_job(
    cli: Cli,
    settings: &Settings,
    out: &mut impl Write,
    err: &mut impl Write,
) -> ExitCode {
    match build_layer(cli, settings).await {
        Ok(archive) => match writeln!(out, "{}", archive.display()).and_then(|()| out.flush()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                let _ = writeln!(err, "Failed to report archive path: {error}");
                ExitCode::FAILURE
            }
        },
        Err(error) => {
            let _ = writeln!(err, "{error}");
            ExitCode::FAILURE
        }
    }
}

async fn build_layer(cli: Cli, settings: &Settings) -> Result<PathBuf, LayerError> {
    let requested = cli
        .version
        .as_deref()
        .map(RuntimeVersion::parse)
        .transpose()?;
    let packages = parse_package_list(cli.packages.as_deref().unwrap_or_default())?;

    let source = dist_source(settings)?;
    let version = match requested {
        Some(version) => version,
        None => {
            VersionCatalog::new(Arc::clone(&source))
                .resolve_default(&settings.fallback_version()?)
                .await
        }
    };

    let job = LayerJob::create(version, packages, &settings.work_root())?;
    let cache = distribution_cache(settings, source);

    match job.run(&cache).await {
        Ok(archive) => Ok(archive),
        Err(error) => {
            if let Err(cleanup) = job.discard() {
                warn!("{cleanup}");
            }
            Err(error)
        }
    }
}

async fn run_server(settings: &Settings) -> Result<(), StartupError> {
    let source = dist_source(settings)?;
    let catalog = VersionCatalog::new(Arc::clone(&source));
    let cache = distribution_cache(settings, source);

    let default_version = catalog
        .resolve_default(&settings.fallback_version().map_err(LayerError::from)?)
        .await;
    info!("Default Node.js version: {default_version}");

    if settings.prewarm_default {
        tokio::spawn(async move { cache.prewarm(&default_version).await });
    }

    let exec = SelfExec::current(settings.job_timeout())?;
    let state = AppState::new(
        catalog,
        exec,
        settings.work_root(),
        settings.retain_artifacts,
    )?;

    server::serve(settings.listen_addr, Arc::new(state)).await?;
    Ok(())
}
