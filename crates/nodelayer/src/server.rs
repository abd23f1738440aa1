use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use log::{error, info, warn};
use nodelayer_core::{RuntimeVersion, VersionCatalog, is_job_dir};
use regex::{Regex, RegexBuilder};
use tokio_util::io::ReaderStream;

use crate::dispatch::SelfExec;

const UNSUPPORTED_VERSION: &str =
    "Unsupported version provided, see supported versions at 'GET /versions'";
const UNEXPECTED_ERROR: &str = "An unexpected error occurred, please try again later";
const NOT_FOUND: &str = "Not Found";

/// Path patterns, matched case-insensitively. Any number of leading
/// alphanumeric segments is accepted so the service can sit behind a prefix.
struct Routes {
    versions: Regex,
    generate: Regex,
}

impl Routes {
    fn compile() -> Result<Self, regex::Error> {
        let pattern = |suffix: &str| {
            RegexBuilder::new(&format!(r"^(/[a-z0-9]+)*{suffix}/?$"))
                .case_insensitive(true)
                .build()
        };
        Ok(Self {
            versions: pattern("/versions")?,
            generate: pattern("/layers/generate")?,
        })
    }
}

enum Route {
    Versions,
    Generate,
}

pub struct AppState {
    catalog: VersionCatalog,
    exec: SelfExec,
    work_root: PathBuf,
    retain_artifacts: bool,
    routes: Routes,
}

impl AppState {
    /// # Errors
    /// Returns an error if the route patterns fail to compile.
    pub fn new(
        catalog: VersionCatalog,
        exec: SelfExec,
        work_root: PathBuf,
        retain_artifacts: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            catalog,
            exec,
            work_root,
            retain_artifacts,
            routes: Routes::compile()?,
        })
    }

    fn route(&self, method: &Method, path: &str) -> Option<Route> {
        if method != Method::GET {
            return None;
        }
        if self.routes.versions.is_match(path) {
            Some(Route::Versions)
        } else if self.routes.generate.is_match(path) {
            Some(Route::Generate)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct GenerateParams {
    version: Option<String>,
    packages: String,
}

impl GenerateParams {
    /// Read `version` and `packages` from the query. A repeated key keeps its
    /// first value; an undecodable query reads as empty.
    fn from_uri(uri: &Uri) -> Self {
        let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
            .map(|Query(pairs)| pairs)
            .unwrap_or_default();
        let first = |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        };
        Self {
            version: first("version"),
            packages: first("packages").unwrap_or_default(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handle)
        .layer(middleware::map_response(add_cors_headers))
        .with_state(state)
}

async fn add_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("HEAD, GET"),
    );
    response
}

async fn handle(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let forwarded_for: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    info!(
        "{method} {} query={:?} peer={} x-forwarded-for={forwarded_for:?}",
        uri.path(),
        uri.query().unwrap_or_default(),
        peer.map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.to_string()),
    );

    match state.route(&method, uri.path()) {
        Some(Route::Versions) => list_versions(&state).await,
        Some(Route::Generate) => {
            generate_layer(&state, GenerateParams::from_uri(&uri)).await
        }
        None => (StatusCode::NOT_FOUND, NOT_FOUND).into_response(),
    }
}

async fn list_versions(state: &AppState) -> Response {
    let versions: Vec<String> = state
        .catalog
        .list_versions()
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    (StatusCode::OK, versions.join("\n")).into_response()
}

async fn generate_layer(state: &AppState, params: GenerateParams) -> Response {
    let Some(version) = params
        .version
        .as_deref()
        .and_then(|raw| RuntimeVersion::parse(raw).ok())
    else {
        return (StatusCode::UNPROCESSABLE_ENTITY, UNSUPPORTED_VERSION).into_response();
    };

    let archive = match state.exec.run(&version, &params.packages).await {
        Ok(archive) => archive,
        Err(err) => {
            error!("Layer job for {version} [{}] failed: {err}", params.packages);
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let file = match tokio::fs::File::open(&archive).await {
        Ok(file) => file,
        Err(err) => {
            error!("Failed to open {}: {err}", archive.display());
            return (StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_ERROR).into_response();
        }
    };
    let length = file.metadata().await.ok().map(|metadata| metadata.len());

    if !state.retain_artifacts {
        remove_job_dir(&archive, &state.work_root).await;
    }

    let mut response = (
        StatusCode::CREATED,
        [
            (CONTENT_TYPE, "application/octet-stream"),
            (CONTENT_DISPOSITION, "attachment; filename=\"layer.zip\""),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response();
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

/// Remove the job directory holding `archive`. The open handle keeps the
/// archive readable until streaming finishes.
async fn remove_job_dir(archive: &Path, work_root: &Path) {
    let Some(dir) = archive.parent() else {
        return;
    };
    if !is_job_dir(dir, work_root) {
        warn!(
            "Not removing {}: outside work root {}",
            dir.display(),
            work_root.display()
        );
        return;
    }
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        warn!("Failed to remove {}: {err}", dir.display());
    }
}

/// Bind `addr` and serve until the process exits.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
