use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error(transparent)]
    InvalidVersion(#[from] crate::version::VersionParseError),

    #[error("Invalid package name: {name:?}")]
    InvalidPackage { name: String },

    #[error("Network error during {operation} ({stage}): {details}")]
    NetworkError {
        operation: &'static str,
        stage: NetworkStage,
        details: String,
    },

    #[error("{operation} failed with HTTP {status} for {url}")]
    HttpStatus {
        operation: &'static str,
        url: String,
        status: u16,
    },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("No checksum entry found for {file}")]
    ChecksumMissing { file: String },

    #[error("Extraction failed: {details}")]
    Extraction { details: String },

    #[error("No Node.js distribution is published for {host}")]
    UnsupportedPlatform { host: String },

    #[error("Required tool not found on PATH: {tool}")]
    ToolNotFound { tool: &'static str },

    #[error("{output}")]
    CommandFailed { tool: &'static str, output: String },

    #[error("{tool} exited unsuccessfully ({status})")]
    CommandExited { tool: &'static str, status: String },

    #[error("{context}: {message}")]
    Io {
        context: &'static str,
        kind: std::io::ErrorKind,
        message: String,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStage {
    #[error("request")]
    Request,
    #[error("response parse")]
    ResponseParse,
}

impl LayerError {
    pub fn network_request(operation: &'static str, details: impl Into<String>) -> Self {
        Self::NetworkError {
            operation,
            stage: NetworkStage::Request,
            details: details.into(),
        }
    }

    pub fn network_request_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::network_request(operation, error.to_string())
    }

    pub fn network_parse(operation: &'static str, details: impl Into<String>) -> Self {
        Self::NetworkError {
            operation,
            stage: NetworkStage::ResponseParse,
            details: details.into(),
        }
    }

    pub fn network_parse_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::network_parse(operation, error.to_string())
    }

    pub fn extraction(details: impl Into<String>) -> Self {
        Self::Extraction {
            details: details.into(),
        }
    }

    #[must_use]
    pub fn io(context: &'static str, error: &std::io::Error) -> Self {
        Self::Io {
            context,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    #[must_use]
    pub fn io_with_path(
        context: &'static str,
        path: &std::path::Path,
        error: &std::io::Error,
    ) -> Self {
        Self::Io {
            context,
            kind: error.kind(),
            message: format!("{}: {error}", path.display()),
        }
    }
}

impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        Self::io("IO error", &err)
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerError, NetworkStage};

    #[test]
    fn io_error_conversion_maps_to_io_variant() {
        let mapped = LayerError::from(std::io::Error::other("permission denied"));
        assert!(
            matches!(mapped, LayerError::Io { kind, ref message, .. } if kind == std::io::ErrorKind::Other && message.contains("permission denied"))
        );
    }

    #[test]
    fn command_failed_display_is_the_captured_output() {
        let error = LayerError::CommandFailed {
            tool: "npm",
            output: "npm ERR! 404 Not Found - GET https://registry.npmjs.org/nope".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "npm ERR! 404 Not Found - GET https://registry.npmjs.org/nope"
        );
    }

    #[test]
    fn network_helpers_set_expected_stage() {
        let request = LayerError::network_request("download distribution", "timed out");
        assert!(matches!(
            request,
            LayerError::NetworkError {
                operation: "download distribution",
                stage: NetworkStage::Request,
                ..
            }
        ));

        let parse = LayerError::network_parse("fetch version index", "invalid json");
        assert!(matches!(
            parse,
            LayerError::NetworkError {
                operation: "fetch version index",
                stage: NetworkStage::ResponseParse,
                ..
            }
        ));
    }

    #[test]
    fn io_with_path_includes_the_path() {
        let error = LayerError::io_with_path(
            "failed to create project directory",
            std::path::Path::new("/tmp/nodelayer-abc/nodejs"),
            &std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        );

        assert!(
            error
                .to_string()
                .starts_with("failed to create project directory: /tmp/nodelayer-abc/nodejs")
        );
    }
}
