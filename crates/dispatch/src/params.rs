//! Parameter resolution.
//!
//! Each call parameter is looked up in a fixed order:
//!
//! 1. a message header of the same name, which must already have the
//!    parameter's type;
//! 2. the endpoint's configured `options`, coerced from text;
//! 3. the message body, only when the handler allows it.
//!
//! A required parameter found nowhere is a [`DispatchError::MissingParameter`];
//! an optional one yields `None`.

use serde_json::Value;

use crate::errors::BoxError;
use crate::message::{Body, Message};
use crate::{DispatchError, EndpointConfig};

// ---------------------------------------------------------------------------
// Parameter names
// ---------------------------------------------------------------------------

/// Object type name.
pub const SOBJECT_NAME: &str = "sObjectName";
/// Record identifier.
pub const SOBJECT_ID: &str = "sObjectId";
/// Record identifiers for collection operations.
pub const SOBJECT_IDS: &str = "sObjectIds";
/// Comma-separated field list.
pub const SOBJECT_FIELDS: &str = "sObjectFields";
/// External-id field name.
pub const SOBJECT_EXT_ID_NAME: &str = "sObjectIdName";
/// External-id field value.
pub const SOBJECT_EXT_ID_VALUE: &str = "sObjectIdValue";
/// Blob field name.
pub const SOBJECT_BLOB_FIELD_NAME: &str = "sObjectBlobFieldName";
/// Registered response type name for queries and APEX calls.
pub const SOBJECT_CLASS: &str = "sObjectClass";
/// Query text, or the next-records locator for `queryMore`.
pub const SOBJECT_QUERY: &str = "sObjectQuery";
/// Search text.
pub const SOBJECT_SEARCH: &str = "sObjectSearch";
/// HTTP method for APEX calls.
pub const APEX_METHOD: &str = "apexMethod";
/// APEX REST path, may contain `{header}` templates.
pub const APEX_URL: &str = "apexUrl";
/// Header prefix for individual APEX query parameters.
pub const APEX_QUERY_PARAM_PREFIX: &str = "apexQueryParam.";
/// Result limit for `recent`.
pub const LIMIT: &str = "limit";
/// Roll back all records when one fails.
pub const ALL_OR_NONE: &str = "allOrNone";
/// Approval request template.
pub const APPROVAL: &str = "approval";
/// Header prefix for individual approval request fields.
pub const APPROVAL_PREFIX: &str = "approval.";
/// Bulk content type.
pub const CONTENT_TYPE: &str = "contentType";
/// Bulk job identifier.
pub const JOB_ID: &str = "jobId";
/// Bulk batch identifier.
pub const BATCH_ID: &str = "batchId";
/// Bulk query result identifier.
pub const RESULT_ID: &str = "resultId";
/// Split a Bulk query job into chunks by primary key.
pub const PK_CHUNKING: &str = "pkChunking";
/// Records per chunk when PK chunking.
pub const PK_CHUNKING_CHUNK_SIZE: &str = "pkChunkingChunkSize";
/// Parent object whose key is chunked, for queries on sharing objects.
pub const PK_CHUNKING_PARENT: &str = "pkChunkingParent";
/// Record id the first chunk starts from.
pub const PK_CHUNKING_START_ROW: &str = "pkChunkingStartRow";
/// Analytics report identifier.
pub const REPORT_ID: &str = "reportId";
/// Include detail rows in report results.
pub const INCLUDE_DETAILS: &str = "includeDetails";
/// Report metadata overriding the saved filters and groupings.
pub const REPORT_METADATA: &str = "reportMetadata";
/// Asynchronous report run identifier.
pub const INSTANCE_ID: &str = "instanceId";
/// HTTP method for raw calls.
pub const RAW_METHOD: &str = "rawMethod";
/// Path for raw calls.
pub const RAW_PATH: &str = "rawPath";
/// Comma-separated header names sent as query parameters on raw calls.
pub const RAW_QUERY_PARAMETERS: &str = "rawQueryParameters";
/// Comma-separated header names sent as HTTP headers on raw calls.
pub const RAW_HTTP_HEADERS: &str = "rawHttpHeaders";

// ---------------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------------

/// Whether the message body may supply a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFallback {
    /// Try the body last.
    Use,
    /// Never look at the body.
    Ignore,
}

/// A type a parameter can be resolved as.
pub trait Param: Sized {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    /// Accepts a header value only if it already has this type.
    fn from_header(value: &Value) -> Option<Self>;

    /// Coerces configured text.
    fn from_config(text: &str) -> Result<Self, BoxError>;

    /// Converts the message body.
    fn from_body(body: &Body) -> Option<Self>;
}

impl Param for String {
    const TYPE_NAME: &'static str = "a string";

    fn from_header(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }

    fn from_config(text: &str) -> Result<Self, BoxError> {
        Ok(text.to_owned())
    }

    fn from_body(body: &Body) -> Option<Self> {
        body.as_text()
            .map(|text| text.into_owned())
            .filter(|text| !text.is_empty())
    }
}

impl Param for bool {
    const TYPE_NAME: &'static str = "a boolean";

    fn from_header(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn from_config(text: &str) -> Result<Self, BoxError> {
        Ok(text.trim().parse::<bool>()?)
    }

    fn from_body(body: &Body) -> Option<Self> {
        match body {
            Body::Value(Value::Bool(flag)) => Some(*flag),
            other => other.as_text()?.trim().parse().ok(),
        }
    }
}

impl Param for u32 {
    const TYPE_NAME: &'static str = "an unsigned integer";

    fn from_header(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|number| u32::try_from(number).ok())
    }

    fn from_config(text: &str) -> Result<Self, BoxError> {
        Ok(text.trim().parse::<u32>()?)
    }

    fn from_body(body: &Body) -> Option<Self> {
        match body {
            Body::Value(value @ Value::Number(_)) => Self::from_header(value),
            other => other.as_text()?.trim().parse().ok(),
        }
    }
}

/// A list of strings: a header array, comma-separated configured text, or a
/// body array.
impl Param for Vec<String> {
    const TYPE_NAME: &'static str = "an array of strings";

    fn from_header(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect()
    }

    fn from_config(text: &str) -> Result<Self, BoxError> {
        Ok(split_list(text))
    }

    fn from_body(body: &Body) -> Option<Self> {
        match body {
            Body::Value(value) => Self::from_header(value),
            other => other.as_text().map(|text| split_list(&text)),
        }
    }
}

/// An arbitrary document.
impl Param for Value {
    const TYPE_NAME: &'static str = "a document";

    fn from_header(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn from_config(text: &str) -> Result<Self, BoxError> {
        Ok(serde_json::from_str(text)?)
    }

    fn from_body(body: &Body) -> Option<Self> {
        body.as_value().cloned()
    }
}

/// Splits comma-separated text, trimming items and dropping empties.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// JSON type name of a value, for error messages.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves parameters for one call from its message and the endpoint config.
#[derive(Debug, Clone, Copy)]
pub struct ParameterResolver<'a> {
    message: &'a Message,
    config: &'a EndpointConfig,
}

impl<'a> ParameterResolver<'a> {
    /// Creates a resolver over one message.
    pub fn new(message: &'a Message, config: &'a EndpointConfig) -> Self {
        Self { message, config }
    }

    /// Resolves an optional parameter; `Ok(None)` means no source had it.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidHeader`] if a header is present with the wrong type.
    /// - [`DispatchError::ParameterConversion`] if the configured text cannot be
    ///   coerced.
    pub fn optional<T: Param>(
        &self,
        name: &str,
        body: BodyFallback,
    ) -> Result<Option<T>, DispatchError> {
        if let Some(value) = self.message.header(name).filter(|value| !value.is_null()) {
            return T::from_header(value)
                .map(Some)
                .ok_or_else(|| DispatchError::InvalidHeader {
                    name: name.to_owned(),
                    expected: T::TYPE_NAME,
                    found: value_type_name(value),
                });
        }

        if let Some(text) = self.config.option(name) {
            return T::from_config(&text)
                .map(Some)
                .map_err(|source| DispatchError::ParameterConversion {
                    name: name.to_owned(),
                    value: text,
                    target: T::TYPE_NAME,
                    source,
                });
        }

        match body {
            BodyFallback::Use => Ok(T::from_body(self.message.body())),
            BodyFallback::Ignore => Ok(None),
        }
    }

    /// Resolves a mandatory parameter.
    ///
    /// # Errors
    ///
    /// As [`ParameterResolver::optional`], plus
    /// [`DispatchError::MissingParameter`] when no source yields a value.
    pub fn required<T: Param>(&self, name: &str, body: BodyFallback) -> Result<T, DispatchError> {
        self.optional(name, body)?
            .ok_or_else(|| DispatchError::missing_parameter(name, body == BodyFallback::Use))
    }

    /// Headers whose names start with `prefix`, with the prefix stripped.
    pub fn prefixed_headers(&self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a Value)> {
        let prefix = prefix.to_owned();
        self.message
            .headers()
            .iter()
            .filter_map(move |(name, value)| {
                name.strip_prefix(prefix.as_str())
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest, value))
            })
    }

    /// The message being resolved against.
    pub fn message(&self) -> &'a Message {
        self.message
    }

    /// The endpoint configuration.
    pub fn config(&self) -> &'a EndpointConfig {
        self.config
    }
}
