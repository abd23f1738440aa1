use std::sync::Arc;

use log::{debug, warn};

use crate::source::DistSource;
use crate::version::RuntimeVersion;

/// Used when the remote index cannot be reached at startup.
pub const FALLBACK_VERSION: &str = "v22.12.0";

/// Long-term-support releases listed by the distribution index, newest
/// first.
#[derive(Clone)]
pub struct VersionCatalog {
    source: Arc<dyn DistSource>,
}

impl VersionCatalog {
    #[must_use]
    pub fn new(source: Arc<dyn DistSource>) -> Self {
        Self { source }
    }

    /// Fetch the index and keep LTS entries, in index order.
    ///
    /// Transport and decode failures yield an empty list.
    pub async fn list_versions(&self) -> Vec<RuntimeVersion> {
        let entries = match self.source.fetch_index().await {
            Ok(entries) => entries,
            Err(error) => {
                warn!("Failed to load version index: {error}");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter(|entry| entry.lts.codename().is_some())
            .filter_map(|entry| match RuntimeVersion::parse(&entry.version) {
                Ok(version) => Some(version),
                Err(error) => {
                    debug!("Skipping index entry {:?}: {error}", entry.version);
                    None
                }
            })
            .collect()
    }

    /// The newest LTS release, or `fallback` when the catalog is empty.
    pub async fn resolve_default(&self, fallback: &RuntimeVersion) -> RuntimeVersion {
        self.list_versions()
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::LayerError;
    use crate::source::IndexEntry;

    struct FixtureSource {
        index: Result<&'static str, LayerError>,
        calls: AtomicUsize,
    }

    impl FixtureSource {
        fn new(index: Result<&'static str, LayerError>) -> Arc<Self> {
            Arc::new(Self {
                index,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DistSource for FixtureSource {
        async fn fetch_index(&self) -> Result<Vec<IndexEntry>, LayerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let raw = self.index.clone()?;
            serde_json::from_str(raw)
                .map_err(|error| LayerError::network_parse_from("fetch version index", error))
        }

        async fn fetch_text(&self, _path: &str) -> Result<String, LayerError> {
            unreachable!("catalog never fetches text")
        }

        async fn download(&self, _path: &str, _dest: &Path) -> Result<u64, LayerError> {
            unreachable!("catalog never downloads")
        }
    }

    const INDEX: &str = r#"[
        {"version":"v23.4.0","lts":false},
        {"version":"v22.12.0","lts":"Jod"},
        {"version":"v21.7.3","lts":false},
        {"version":"v20.18.1","lts":"Iron"},
        {"version":"v18.20.5","lts":"Hydrogen"},
        {"version":"v4.9.1","lts":""},
        {"version":"v1000.0.0","lts":"Future"}
    ]"#;

    #[tokio::test]
    async fn list_versions_keeps_only_lts_entries_in_index_order() {
        let catalog = VersionCatalog::new(FixtureSource::new(Ok(INDEX)));

        let versions: Vec<String> = catalog
            .list_versions()
            .await
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(versions, vec!["v22.12.0", "v20.18.1", "v18.20.5"]);
    }

    #[tokio::test]
    async fn list_versions_returns_empty_on_transport_failure() {
        let source = FixtureSource::new(Err(LayerError::network_request(
            "fetch version index",
            "connection refused",
        )));
        let catalog = VersionCatalog::new(source.clone());

        assert!(catalog.list_versions().await.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_versions_returns_empty_on_decode_failure() {
        let catalog = VersionCatalog::new(FixtureSource::new(Ok("<html>oops</html>")));
        assert!(catalog.list_versions().await.is_empty());
    }

    #[tokio::test]
    async fn resolve_default_prefers_first_catalog_entry() {
        let catalog = VersionCatalog::new(FixtureSource::new(Ok(INDEX)));
        let fallback = RuntimeVersion::parse(FALLBACK_VERSION).unwrap();

        assert_eq!(catalog.resolve_default(&fallback).await.as_str(), "v22.12.0");
    }

    #[tokio::test]
    async fn resolve_default_uses_fallback_for_empty_catalog() {
        let catalog = VersionCatalog::new(FixtureSource::new(Ok("[]")));
        let fallback = RuntimeVersion::parse("v20.0.0").unwrap();

        assert_eq!(catalog.resolve_default(&fallback).await, fallback);
    }

    #[tokio::test]
    #[ignore = "requires network access to nodejs.org"]
    async fn live_index_lists_at_least_twenty_lts_releases() {
        let source = crate::source::HttpDistSource::new(
            crate::source::DEFAULT_DIST_URL,
            std::time::Duration::from_secs(30),
        )
        .unwrap();
        let catalog = VersionCatalog::new(Arc::new(source));

        assert!(catalog.list_versions().await.len() >= 20);
    }
}
