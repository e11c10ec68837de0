//! The `sfcall.toml` configuration file.

use std::path::Path;

use anyhow::Context;
use dispatch::EndpointConfig;
use serde::Deserialize;

use crate::telemetry::TelemetryConfig;

/// Everything `sfcall` reads from its configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CliConfig {
    pub(crate) connection: ConnectionConfig,
    #[serde(default)]
    pub(crate) endpoint: EndpointConfig,
    #[serde(default)]
    pub(crate) telemetry: TelemetryConfig,
}

/// Where the remote instance lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConnectionConfig {
    /// Base URL, for example `https://example.my.salesforce.com`.
    pub(crate) instance_url: String,
}

impl CliConfig {
    /// Parses configuration from TOML text.
    pub(crate) fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("configuration does not match the expected schema")
    }

    /// Reads and parses the configuration file at `path`.
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid configuration file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use dispatch::{ApiVersion, PayloadFormat};

    use super::*;
    use crate::telemetry::LogFormat;

    #[test]
    fn full_configuration_parses() {
        let config = CliConfig::from_toml_str(
            r#"
            [connection]
            instance_url = "https://example.my.salesforce.com"

            [endpoint]
            api_version = "58.0"
            format = "xml"
            raw_payload = true

            [endpoint.options]
            sObjectName = "Account"

            [telemetry]
            log_filter = "debug"
            log_format = "json"
            "#,
        )
        .expect("valid configuration");

        assert_eq!(config.connection.instance_url, "https://example.my.salesforce.com");
        assert_eq!(config.endpoint.api_version, ApiVersion::new(58, 0));
        assert_eq!(config.endpoint.format, PayloadFormat::Xml);
        assert!(config.endpoint.raw_payload);
        assert_eq!(config.endpoint.option("sObjectName").as_deref(), Some("Account"));
        assert_eq!(config.telemetry.log_filter, "debug");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn only_the_connection_is_required() {
        let config = CliConfig::from_toml_str(
            r#"
            [connection]
            instance_url = "https://example.my.salesforce.com"
            "#,
        )
        .expect("valid configuration");

        assert_eq!(config.endpoint, EndpointConfig::default());
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
    }

    #[test]
    fn missing_connection_is_rejected() {
        assert!(CliConfig::from_toml_str("[telemetry]\nlog_filter = \"info\"\n").is_err());
    }

    #[test]
    fn unreadable_files_name_the_path() {
        let error = CliConfig::load(Path::new("/nonexistent/sfcall.toml")).expect_err("missing file");
        assert!(format!("{error:#}").contains("/nonexistent/sfcall.toml"));
    }
}
