use clap::Parser;

/// Generate Node.js dependency layers.
///
/// Without arguments an HTTP server is started. With `--version` or
/// `--packages` a single layer is built and its path printed on stdout.
#[derive(Parser, Debug, Default, PartialEq, Eq)]
#[command(name = "nodelayer", disable_version_flag = true)]
pub struct Cli {
    /// Node.js version to build against, e.g. v22.12.0 (default: newest LTS)
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Comma-separated npm packages to install
    #[arg(long, value_name = "CSV")]
    pub packages: Option<String>,
}

impl Cli {
    /// Whether this invocation builds one layer instead of serving.
    #[must_use]
    pub fn is_job(&self) -> bool {
        self.version.is_some() || self.packages.is_some()
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn no_arguments_means_serve() {
        let cli = Cli::try_parse_from(["nodelayer"]).unwrap();
        assert!(!cli.is_job());
    }

    #[test]
    fn version_flag_carries_runtime_token() {
        let cli =
            Cli::try_parse_from(["nodelayer", "--version", "v20.18.1", "--packages", "is-odd"])
                .unwrap();

        assert!(cli.is_job());
        assert_eq!(cli.version.as_deref(), Some("v20.18.1"));
        assert_eq!(cli.packages.as_deref(), Some("is-odd"));
    }

    #[test]
    fn packages_alone_is_a_job() {
        let cli = Cli::try_parse_from(["nodelayer", "--packages", ""]).unwrap();
        assert!(cli.is_job());
        assert_eq!(cli.version, None);
    }

    #[test]
    fn attached_values_may_look_like_flags() {
        let cli = Cli::try_parse_from(["nodelayer", "--version=v22.12.0", "--packages=--help"])
            .unwrap();

        assert_eq!(cli.version.as_deref(), Some("v22.12.0"));
        assert_eq!(cli.packages.as_deref(), Some("--help"));
    }

    #[test]
    fn attached_empty_packages_is_a_job() {
        let cli = Cli::try_parse_from(["nodelayer", "--version=v22.12.0", "--packages="]).unwrap();

        assert!(cli.is_job());
        assert_eq!(cli.packages.as_deref(), Some(""));
    }

    #[test]
    fn bare_version_flag_requires_a_value() {
        assert!(Cli::try_parse_from(["nodelayer", "--version"]).is_err());
    }
}
