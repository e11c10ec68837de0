//! Shared value types for endpoint configuration and wire handling.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Version of the remote REST API, written `"<major>.<minor>"` (e.g. `"56.0"`).
///
/// Appears in every REST path (`/services/data/v56.0/...`) and Bulk path
/// (`/services/async/56.0/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    /// Major version, one per platform release.
    pub major: u32,
    /// Minor version, `0` for every release so far.
    pub minor: u32,
}

impl ApiVersion {
    /// Version used when the endpoint does not configure one.
    pub const DEFAULT: ApiVersion = ApiVersion {
        major: 56,
        minor: 0,
    };

    /// Creates a new [`ApiVersion`].
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses `"<major>.<minor>"`; a bare major (`"56"`) implies minor `0`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().trim_start_matches('v');
        let (major, minor) = match value.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (value, "0"),
        };
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid API version '{value}'"))
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.to_string()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Wire format used for request and response payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `application/json`.
    #[default]
    Json,
    /// `application/xml`.
    Xml,
}

impl PayloadFormat {
    /// MIME type sent in `Content-Type` and `Accept` headers.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Xml => f.write_str("xml"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error policy
// ---------------------------------------------------------------------------

/// What a `404 Not Found` from the backend turns into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotFoundBehaviour {
    /// Report the backend error to the caller.
    #[default]
    Exception,
    /// Complete successfully with an empty payload.
    Null,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("56.0", ApiVersion::new(56, 0))]
    #[case("v58.0", ApiVersion::new(58, 0))]
    #[case("60", ApiVersion::new(60, 0))]
    fn parses_api_versions(#[case] input: &str, #[case] expected: ApiVersion) {
        assert_eq!(ApiVersion::parse(input), Some(expected));
    }

    #[test]
    fn rejects_malformed_api_version() {
        assert!(ApiVersion::parse("latest").is_none());
        assert!(ApiVersion::try_from("5x.0".to_owned()).is_err());
    }

    #[test]
    fn api_version_displays_as_wire_form() {
        assert_eq!(ApiVersion::DEFAULT.to_string(), "56.0");
    }
}
