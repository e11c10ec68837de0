//! Error taxonomy for dispatched calls.
//!
//! [`DispatchError`] is the single error type delivered through a call's
//! completion signal. Every variant belongs to exactly one [`ErrorKind`]:
//!
//! | Kind | Raised | Variants |
//! |------|--------|----------|
//! | `Parameter` | synchronously, while preparing | `MissingParameter`, `InvalidHeader`, `ParameterConversion`, `InvalidParameter` |
//! | `Encode` | synchronously, while preparing | `UnsupportedBody`, `Encode` |
//! | `Configuration` | synchronously, while preparing | `UnknownOperation`, `UnknownType`, `Configuration` |
//! | `Backend` | asynchronously, from the backend | `Backend` |
//! | `Decode` | asynchronously, while completing | `Decode` |
//! | `FieldRestoration` | asynchronously, as a secondary warning | `FieldRestoration` |
//! | `Exhausted` | from a query cursor | `NoMoreElements` |
//!
//! No kind is retried here; retry policy belongs to the backend client.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed underlying error preserved as a `#[source]`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, malformed, or unconvertible call parameter.
    Parameter,
    /// Request body could not be serialised to the wire format.
    Encode,
    /// The remote call failed.
    Backend,
    /// Response bytes could not be parsed into the expected type.
    Decode,
    /// A captured field could not be written back.
    FieldRestoration,
    /// Endpoint or operation configuration is invalid.
    Configuration,
    /// A cursor was advanced past its last element.
    Exhausted,
}

// ---------------------------------------------------------------------------
// Backend errors
// ---------------------------------------------------------------------------

/// One structured error entry from a REST error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestError {
    /// Machine-readable code (e.g. `"NOT_FOUND"`, `"INVALID_FIELD"`).
    pub error_code: String,
    /// Human-readable description.
    pub message: String,
    /// Fields the error applies to, if any.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Failure reported by the backend client for one call.
#[derive(Debug, Error)]
#[error("{}", describe_backend_error(self))]
pub struct BackendError {
    /// HTTP status, or `None` for transport-level failures.
    pub status: Option<u16>,
    /// Summary supplied by the backend client.
    pub message: String,
    /// Structured errors decoded from the response body.
    pub errors: Vec<RestError>,
    /// Raw error response body, if the backend returned one.
    pub body: Option<Bytes>,
}

fn describe_backend_error(error: &BackendError) -> String {
    let mut text = match error.status {
        Some(status) => format!("[{status}] {}", error.message),
        None => error.message.clone(),
    };
    for entry in &error.errors {
        text.push_str(&format!("; {}: {}", entry.error_code, entry.message));
    }
    text
}

fn body_hint(body_attempted: &bool) -> &'static str {
    if *body_attempted {
        "; the message body could not be converted to it"
    } else {
        ""
    }
}

impl BackendError {
    /// Creates an error for a non-success HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            errors: Vec::new(),
            body: None,
        }
    }

    /// Creates an error for a failure that produced no HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            errors: Vec::new(),
            body: None,
        }
    }

    /// Attaches the raw error response body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns `true` for `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

/// Errors delivered through a call's completion signal.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A mandatory parameter was found in no source.
    #[error("missing required parameter '{name}'{}", body_hint(.body_attempted))]
    MissingParameter {
        /// Parameter name.
        name: String,
        /// Whether the message body was tried as a fallback.
        body_attempted: bool,
    },

    /// A header carried a value of the wrong type for the parameter.
    #[error("header '{name}' must be {expected}, found {found}")]
    InvalidHeader {
        /// Header (parameter) name.
        name: String,
        /// Type the parameter requires.
        expected: &'static str,
        /// Type actually present.
        found: &'static str,
    },

    /// A configured option could not be coerced to the parameter type.
    #[error("cannot convert configured value '{value}' of '{name}' to {target}")]
    ParameterConversion {
        /// Parameter name.
        name: String,
        /// Configured text.
        value: String,
        /// Target type name.
        target: &'static str,
        /// Underlying conversion failure.
        #[source]
        source: BoxError,
    },

    /// A parameter was present but unusable for this call.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// The operation name does not match any known operation.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// The rejected name.
        name: String,
    },

    /// No response type is registered under the given name.
    #[error("no response type registered for '{name}'")]
    UnknownType {
        /// Object or class name that was looked up.
        name: String,
    },

    /// Endpoint configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The message body has a type the codec cannot serialise.
    #[error("unsupported body type: {type_name}")]
    UnsupportedBody {
        /// Runtime type of the offending body.
        type_name: &'static str,
    },

    /// Serialisation of the request body failed.
    #[error("failed to encode request body as {format}")]
    Encode {
        /// Wire format being produced.
        format: crate::PayloadFormat,
        /// Underlying serialiser error.
        #[source]
        source: BoxError,
    },

    /// An operation handler panicked while building the request.
    #[error("preparing {operation} panicked: {message}")]
    PreparationPanicked {
        /// Operation being prepared.
        operation: String,
        /// Panic payload text.
        message: String,
    },

    /// The remote call failed.
    #[error("backend call failed: {0}")]
    Backend(#[from] BackendError),

    /// Response bytes could not be parsed into the expected type.
    #[error("failed to decode {operation} response as {type_name}")]
    Decode {
        /// Operation whose response was being decoded.
        operation: String,
        /// Expected type.
        type_name: String,
        /// Underlying parser error.
        #[source]
        source: BoxError,
    },

    /// A field cleared before the call could not be written back.
    #[error("failed to restore field {object}.{field}: {reason}")]
    FieldRestoration {
        /// Object type name.
        object: String,
        /// Field name.
        field: String,
        /// Why the write failed.
        reason: String,
    },

    /// A cursor was advanced after its last element.
    #[error("no more elements")]
    NoMoreElements,
}

impl DispatchError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter { .. }
            | Self::InvalidHeader { .. }
            | Self::ParameterConversion { .. }
            | Self::InvalidParameter { .. } => ErrorKind::Parameter,
            Self::UnsupportedBody { .. }
            | Self::Encode { .. }
            | Self::PreparationPanicked { .. } => ErrorKind::Encode,
            Self::UnknownOperation { .. }
            | Self::UnknownType { .. }
            | Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::FieldRestoration { .. } => ErrorKind::FieldRestoration,
            Self::NoMoreElements => ErrorKind::Exhausted,
        }
    }

    /// HTTP status of a backend error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend(error) => error.status,
            _ => None,
        }
    }

    /// Creates a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>, body_attempted: bool) -> Self {
        Self::MissingParameter {
            name: name.into(),
            body_attempted,
        }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation { name: name.into() }
    }

    /// Creates an unknown response type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a decode error wrapping the parser failure.
    pub fn decode(
        operation: impl Into<String>,
        type_name: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Decode {
            operation: operation.into(),
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// Creates a field restoration error.
    pub fn field_restoration(
        object: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::FieldRestoration {
            object: object.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
