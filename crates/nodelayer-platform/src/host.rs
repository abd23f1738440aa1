use std::fmt;

/// Operating system and architecture tokens as they appear in Node.js
/// distribution file names (`node-v22.12.0-linux-x64.tar.gz`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub os: String,
    pub arch: String,
}

impl Host {
    #[must_use]
    pub fn current() -> Self {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    #[must_use]
    pub fn from_consts(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            "windows" => "win",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            "x86" => "x86",
            "powerpc64" => "ppc64le",
            other => other,
        };

        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Whether the vendor publishes a `.tar.gz` build for this OS.
    #[must_use]
    pub fn has_tarball(&self) -> bool {
        !matches!(self.os.as_str(), "win")
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
