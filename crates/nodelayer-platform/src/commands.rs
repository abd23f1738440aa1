use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Search path used when the parent process has no `PATH` at all.
pub const FALLBACK_PATH: &str = "/usr/bin:/usr/sbin:/usr/local/bin:/usr/local/sbin";

pub trait PrependPath {
    /// Inherit the parent's `PATH` with `dir` placed in front of it.
    fn prepend_path(&mut self, dir: &Path) -> &mut Self;
}

impl PrependPath for tokio::process::Command {
    fn prepend_path(&mut self, dir: &Path) -> &mut Self {
        let current = std::env::var_os("PATH");
        self.env("PATH", path_with_prefix(dir, current.as_deref()))
    }
}

#[must_use]
pub fn path_with_prefix(dir: &Path, current: Option<&OsStr>) -> OsString {
    let rest = match current {
        Some(value) if !value.is_empty() => value.to_os_string(),
        _ => OsString::from(FALLBACK_PATH),
    };

    let mut entries = vec![dir.to_path_buf()];
    entries.extend(std::env::split_paths(&rest));

    // join_paths refuses entries containing the separator itself
    std::env::join_paths(entries).unwrap_or_else(|_| {
        let mut joined = dir.as_os_str().to_os_string();
        joined.push(":");
        joined.push(&rest);
        joined
    })
}
