//! Header propagation and transient field restoration.
//!
//! Two pieces of state cross a call boundary besides the payload:
//!
//! - **Headers.** Inbound headers carrying protocol options (names starting
//!   with `Sforce` or `X-SFDC`, any case) are forwarded on the outbound HTTP
//!   request. When the call completes, the backend's response headers are
//!   merged over the inbound ones.
//! - **Fields.** Some operations clear a field of the request object before
//!   encoding it (the backend rejects identifiers in an update or upsert
//!   body). A [`RestorableField`] captures the value and writes it back on
//!   completion, whether the call succeeded or not.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::error;

use crate::message::Headers;
use crate::sobject::{FieldError, FieldValue, SharedSObject};
use crate::DispatchError;

/// Header name prefixes forwarded on outbound requests, compared in lower case.
pub const PROPAGATED_PREFIXES: [&str; 2] = ["sforce", "x-sfdc"];

/// Outbound request headers: one name, possibly several values.
pub type RequestHeaders = BTreeMap<String, Vec<String>>;

/// Headers returned by the backend.
pub type ResponseHeaders = BTreeMap<String, String>;

/// Returns `true` if a header with this name is forwarded to the backend.
pub fn is_propagated(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    PROPAGATED_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Extracts the inbound headers forwarded on the outbound request.
///
/// Array values become multiple values; other values are stringified.
pub fn propagated_headers(headers: &Headers) -> RequestHeaders {
    headers
        .iter()
        .filter(|(name, value)| is_propagated(name) && !value.is_null())
        .map(|(name, value)| (name.clone(), header_values(value)))
        .collect()
}

fn header_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(header_text).collect(),
        other => vec![header_text(other)],
    }
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Outbound header map: inbound headers overlaid with response headers.
///
/// A response header replaces any inbound header whose name matches it
/// ignoring ASCII case.
pub fn merge_response_headers(inbound: &Headers, response: &ResponseHeaders) -> Headers {
    let mut merged = inbound.clone();
    merged.retain(|name, _| {
        !response
            .keys()
            .any(|replacement| replacement.eq_ignore_ascii_case(name))
    });
    merged.extend(
        response
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone()))),
    );
    merged
}

// ---------------------------------------------------------------------------
// Field restoration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Id(Option<String>),
    Field { name: String, value: FieldValue },
}

/// A field value captured before a call, written back when it completes.
#[derive(Debug)]
pub struct RestorableField {
    object: SharedSObject,
    slot: Slot,
}

impl RestorableField {
    /// Captures the object's identifier without changing it.
    pub fn capture_id(object: &SharedSObject) -> Self {
        let id = object.lock().id().map(str::to_owned);
        Self {
            object: object.clone(),
            slot: Slot::Id(id),
        }
    }

    /// Captures a named field and clears it to null.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidParameter`] naming `field` if the object has
    /// no such field or rejects the null.
    pub fn take(object: &SharedSObject, field: &str) -> Result<Self, DispatchError> {
        let value = object
            .lock()
            .take_field(field)
            .map_err(|error| DispatchError::invalid_parameter(field, error.to_string()))?;
        Ok(Self {
            object: object.clone(),
            slot: Slot::Field {
                name: field.to_owned(),
                value,
            },
        })
    }

    /// The captured field's name; `"Id"` for the identifier.
    pub fn field_name(&self) -> &str {
        match &self.slot {
            Slot::Id(_) => "Id",
            Slot::Field { name, .. } => name,
        }
    }

    /// The captured value.
    pub fn value(&self) -> FieldValue {
        match &self.slot {
            Slot::Id(id) => id.clone().map(Value::String).unwrap_or(Value::Null),
            Slot::Field { value, .. } => value.clone(),
        }
    }

    /// Writes the captured value back.
    ///
    /// # Errors
    ///
    /// [`DispatchError::FieldRestoration`] if the object rejects the value.
    pub fn restore(self) -> Result<(), DispatchError> {
        let mut object = self.object.lock();
        let result = match self.slot {
            Slot::Id(id) => {
                object.set_id(id);
                Ok(())
            }
            Slot::Field { name, value } => object.set_field(&name, value),
        };
        result.map_err(|error| match error {
            FieldError::NoSuchField { object, field } => {
                DispatchError::field_restoration(object, field, "no such field")
            }
            FieldError::Rejected {
                object,
                field,
                reason,
            } => DispatchError::field_restoration(object, field, reason),
        })
    }
}

/// Restores every captured field, collecting failures instead of stopping.
pub fn restore_all(fields: Vec<RestorableField>) -> Vec<DispatchError> {
    fields
        .into_iter()
        .filter_map(|field| field.restore().err())
        .inspect(|failure| error!(error = %failure, "Field restoration failed"))
        .collect()
}
