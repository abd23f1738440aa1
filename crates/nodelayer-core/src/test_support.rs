use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::dist::RuntimeInstallation;
use crate::error::LayerError;
use crate::source::{DistSource, IndexEntry};
use crate::version::RuntimeVersion;

/// In-memory distribution server counting every call it receives.
pub(crate) struct FakeSource {
    tarball: Vec<u8>,
    checksums: String,
    pub(crate) downloads: AtomicUsize,
    pub(crate) texts: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn new(tarball: Vec<u8>, checksums: String) -> Arc<Self> {
        Arc::new(Self {
            tarball,
            checksums,
            downloads: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        })
    }

    pub(crate) fn offline() -> Arc<Self> {
        Self::new(Vec::new(), String::new())
    }

    pub(crate) fn calls(&self) -> usize {
        self.downloads.load(Ordering::SeqCst) + self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistSource for FakeSource {
    async fn fetch_index(&self) -> Result<Vec<IndexEntry>, LayerError> {
        Ok(Vec::new())
    }

    async fn fetch_text(&self, _path: &str) -> Result<String, LayerError> {
        self.texts.fetch_add(1, Ordering::SeqCst);
        Ok(self.checksums.clone())
    }

    async fn download(&self, _path: &str, dest: &Path) -> Result<u64, LayerError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.tarball.is_empty() {
            return Err(LayerError::network_request(
                "download distribution",
                "offline",
            ));
        }
        tokio::fs::write(dest, &self.tarball).await?;
        Ok(self.tarball.len() as u64)
    }
}

/// Stands in for npm: `init` writes package.json, `install` creates one
/// directory per package under node_modules. Every call records `PATH`.
#[cfg(unix)]
pub(crate) const FAKE_NPM: &str = r#"#!/bin/sh
echo "$PATH" > .seen-path
case "$1" in
  init)
    echo '{"name":"nodejs","version":"1.0.0"}' > package.json
    echo "Wrote to package.json"
    ;;
  install)
    shift
    for arg in "$@"; do
      case "$arg" in
        --*) ;;
        missing-*) echo "npm ERR! 404 Not Found - $arg" >&2; exit 1 ;;
        *) mkdir -p "node_modules/$arg" ;;
      esac
    done
    ;;
esac
"#;

/// Lay out `<root>/bin/npm` running `script` and describe it as an
/// installation of v22.12.0.
#[cfg(unix)]
pub(crate) fn fake_installation(root: &Path, script: &str) -> RuntimeInstallation {
    use std::os::unix::fs::PermissionsExt;

    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).expect("bin dir should be created");
    let npm = bin.join("npm");
    std::fs::write(&npm, script).expect("fake npm should be written");
    std::fs::set_permissions(&npm, std::fs::Permissions::from_mode(0o755))
        .expect("fake npm should be made executable");

    RuntimeInstallation {
        version: RuntimeVersion::parse("v22.12.0").expect("valid version"),
        root: root.to_path_buf(),
        npm_path: npm,
    }
}
