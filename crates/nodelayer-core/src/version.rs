use std::fmt;
use std::str::FromStr;

const MAX_COMPONENT_DIGITS: usize = 3;

/// A Node.js release token such as `v22.12.0`.
///
/// Only `v<major>.<minor>.<patch>` with one to three ASCII digits per
/// component is accepted. The token is kept verbatim since it is used to
/// build download URLs and cache directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeVersion {
    token: String,
    major: u16,
    minor: u16,
    patch: u16,
}

impl RuntimeVersion {
    /// Parse and validate a version token.
    ///
    /// # Errors
    /// Returns an error unless `input` matches `v<d{1,3}>.<d{1,3}>.<d{1,3}>`.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        input.parse()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn major(&self) -> u16 {
        self.major
    }

    #[must_use]
    pub fn minor(&self) -> u16 {
        self.minor
    }

    #[must_use]
    pub fn patch(&self) -> u16 {
        self.patch
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl AsRef<str> for RuntimeVersion {
    fn as_ref(&self) -> &str {
        &self.token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected vX.Y.Z format, got: {input:?}")]
    InvalidFormat { input: String },
    #[error("Invalid {component} version: {value:?}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
}

impl FromStr for RuntimeVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid_format = || VersionParseError::InvalidFormat {
            input: s.to_string(),
        };

        let rest = s.strip_prefix('v').ok_or_else(invalid_format)?;
        let mut parts = rest.split('.');
        let major_str = parts.next().ok_or_else(invalid_format)?;
        let minor_str = parts.next().ok_or_else(invalid_format)?;
        let patch_str = parts.next().ok_or_else(invalid_format)?;
        if parts.next().is_some() {
            return Err(invalid_format());
        }

        Ok(Self {
            token: s.to_string(),
            major: parse_component(major_str, VersionComponent::Major)?,
            minor: parse_component(minor_str, VersionComponent::Minor)?,
            patch: parse_component(patch_str, VersionComponent::Patch)?,
        })
    }
}

fn parse_component(value: &str, component: VersionComponent) -> Result<u16, VersionParseError> {
    let well_formed = !value.is_empty()
        && value.len() <= MAX_COMPONENT_DIGITS
        && value.bytes().all(|b| b.is_ascii_digit());

    if !well_formed {
        return Err(VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        });
    }

    value
        .parse()
        .map_err(|_| VersionParseError::InvalidComponent {
            component,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_with_v_prefix() {
        let v: RuntimeVersion = "v20.11.0".parse().unwrap();
        assert_eq!(v.major(), 20);
        assert_eq!(v.minor(), 11);
        assert_eq!(v.patch(), 0);
        assert_eq!(v.as_str(), "v20.11.0");
    }

    #[test]
    fn test_display_preserves_token() {
        let v = RuntimeVersion::parse("v010.1.0").unwrap();
        assert_eq!(v.to_string(), "v010.1.0");
        assert_eq!(v.major(), 10);
    }

    #[test]
    fn test_parse_version_without_v_prefix_is_rejected() {
        assert!(matches!(
            "20.11.0".parse::<RuntimeVersion>(),
            Err(VersionParseError::InvalidFormat { .. })
        ));
        assert!("00.00.00".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_parse_version_with_whitespace_is_rejected() {
        assert!("  v20.11.0  ".parse::<RuntimeVersion>().is_err());
        assert!("v20.11.0\n".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_parse_version_invalid_format() {
        assert!("v20.11".parse::<RuntimeVersion>().is_err());
        assert!("v20.11.0.1".parse::<RuntimeVersion>().is_err());
        assert!("v".parse::<RuntimeVersion>().is_err());
        assert!("".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_parse_version_rejects_long_components() {
        let result = "v1000.0.0".parse::<RuntimeVersion>();
        assert!(matches!(
            result,
            Err(VersionParseError::InvalidComponent {
                component: VersionComponent::Major,
                ..
            })
        ));
        assert!("v1.2.3456".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_parse_version_rejects_non_digits() {
        assert!("vXX.11.0".parse::<RuntimeVersion>().is_err());
        assert!("v20.+1.0".parse::<RuntimeVersion>().is_err());
        assert!("v20.11.0-rc.1".parse::<RuntimeVersion>().is_err());
        assert!("v20.1١.0".parse::<RuntimeVersion>().is_err());
        assert!("v../../etc".parse::<RuntimeVersion>().is_err());
    }

    #[test]
    fn test_version_equality() {
        let v1: RuntimeVersion = "v20.11.0".parse().unwrap();
        let v2: RuntimeVersion = "v20.11.0".parse().unwrap();
        assert_eq!(v1, v2);
    }
}
