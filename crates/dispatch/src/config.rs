//! Static endpoint configuration.
//!
//! An [`EndpointConfig`] is fixed when a dispatcher is built and shared by
//! every call it makes. Besides wire settings it holds `options`: statically
//! configured parameter values, consulted by the parameter resolver after
//! headers and before the message body.
//!
//! ```toml
//! api_version = "56.0"
//! format = "json"
//! not_found_behaviour = "null"
//!
//! [options]
//! sObjectName = "Account"
//! allOrNone = true
//! limit = 10
//!
//! [apex_query_params]
//! region = "emea"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ApiVersion, DispatchError, NotFoundBehaviour, PayloadFormat};

/// A configured option value.
///
/// TOML lets operators write `allOrNone = true` or `limit = 10`; all values are
/// held as text so the resolver applies one coercion path regardless of how
/// the option was spelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// A boolean literal.
    Flag(bool),
    /// An integer literal.
    Integer(i64),
    /// Any string.
    Text(String),
}

impl OptionValue {
    /// The value as text.
    pub fn as_text(&self) -> String {
        match self {
            Self::Flag(flag) => flag.to_string(),
            Self::Integer(number) => number.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<bool> for OptionValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<i64> for OptionValue {
    fn from(number: i64) -> Self {
        Self::Integer(number)
    }
}

/// Configuration shared by every call on one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    /// Remote API version.
    pub api_version: ApiVersion,
    /// Wire format for request and response bodies.
    pub format: PayloadFormat,
    /// Skip response decoding and hand back the raw stream.
    pub raw_payload: bool,
    /// How a 404 from the backend is reported.
    pub not_found_behaviour: NotFoundBehaviour,
    /// Statically configured parameter values.
    pub options: BTreeMap<String, OptionValue>,
    /// Query parameters added to every APEX call.
    pub apex_query_params: BTreeMap<String, OptionValue>,
}

impl EndpointConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] if the text is not valid TOML
    /// or does not match the configuration schema.
    pub fn from_toml_str(text: &str) -> Result<Self, DispatchError> {
        toml::from_str(text).map_err(|error| DispatchError::configuration(error.to_string()))
    }

    /// Sets one option, builder style.
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Looks up a configured option as text.
    pub fn option(&self, name: &str) -> Option<String> {
        self.options.get(name).map(OptionValue::as_text)
    }
}
