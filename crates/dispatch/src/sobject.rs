//! Domain object capability.
//!
//! Records sent to and received from the backend implement [`SObject`]. Field
//! access by name goes through a [`FieldTable`] declared once per type, so a
//! field that does not exist on the concrete type is reported as an error
//! instead of being looked up (and silently missed) at runtime.
//!
//! Objects travel inside a message as a [`SharedSObject`]. The dispatcher
//! clears identifier fields the backend refuses to accept, and writes them back
//! when the call completes, on whatever thread the backend completes on; the
//! caller keeps its own handle and observes the restored values.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

/// Value of a named field, in document form.
pub type FieldValue = Value;

/// A domain object shared between the caller and an in-flight call.
pub type SharedSObject = Arc<Mutex<dyn SObject>>;

/// Wraps an object for placement in a message body.
pub fn share<T: SObject>(object: T) -> SharedSObject {
    Arc::new(Mutex::new(object))
}

/// Why a named field could not be read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The concrete type declares no field with this name.
    #[error("{object} does not have a field {field}")]
    NoSuchField {
        /// Object type name.
        object: String,
        /// Requested field name.
        field: String,
    },
    /// The field exists but rejected the value.
    #[error("{object}.{field} rejected value: {reason}")]
    Rejected {
        /// Object type name.
        object: String,
        /// Field name.
        field: String,
        /// Reason supplied by the setter.
        reason: String,
    },
}

/// Capability every domain record exposes to the dispatcher.
pub trait SObject: Send + fmt::Debug + 'static {
    /// API name of the object type (e.g. `"Account"`).
    fn object_name(&self) -> &str;

    /// Record identifier, if assigned.
    fn id(&self) -> Option<&str>;

    /// Replaces the record identifier.
    fn set_id(&mut self, id: Option<String>);

    /// Clears system fields the backend refuses on create/update.
    ///
    /// The default clears only the identifier.
    fn clear_base_fields(&mut self) {
        self.set_id(None);
    }

    /// Reads a field by API name.
    fn field(&self, name: &str) -> Result<FieldValue, FieldError>;

    /// Writes a field by API name.
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError>;

    /// Serialises the record to a document for encoding.
    fn to_document(&self) -> Result<Value, serde_json::Error>;

    /// Reads a field and clears it to null, returning the prior value.
    fn take_field(&mut self, name: &str) -> Result<FieldValue, FieldError> {
        let value = self.field(name)?;
        self.set_field(name, Value::Null)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Field tables
// ---------------------------------------------------------------------------

/// Getter/setter pair for one named field of `T`.
pub struct FieldAccessor<T: 'static> {
    /// API name of the field.
    pub name: &'static str,
    /// Reads the field.
    pub get: fn(&T) -> FieldValue,
    /// Writes the field; returns a reason on rejection.
    pub set: fn(&mut T, FieldValue) -> Result<(), String>,
}

/// Static table of named field accessors for one object type.
///
/// ```
/// use dispatch::sobject::{FieldAccessor, FieldTable};
/// use serde_json::Value;
///
/// struct Line {
///     name: Option<String>,
/// }
///
/// fn get_name(line: &Line) -> Value {
///     line.name.clone().map(Value::String).unwrap_or(Value::Null)
/// }
///
/// fn set_name(line: &mut Line, value: Value) -> Result<(), String> {
///     match value {
///         Value::Null => line.name = None,
///         Value::String(text) => line.name = Some(text),
///         other => return Err(format!("expected string, found {other}")),
///     }
///     Ok(())
/// }
///
/// static LINE_FIELDS: FieldTable<Line> = FieldTable::new(
///     "Line_Item__c",
///     &[FieldAccessor { name: "Name", get: get_name, set: set_name }],
/// );
///
/// let mut line = Line { name: Some("ext-1".to_owned()) };
/// assert_eq!(LINE_FIELDS.get(&line, "Name").unwrap(), Value::from("ext-1"));
/// LINE_FIELDS.set(&mut line, "Name", Value::Null).unwrap();
/// assert!(line.name.is_none());
/// assert!(LINE_FIELDS.get(&line, "Missing").is_err());
/// ```
pub struct FieldTable<T: 'static> {
    object: &'static str,
    fields: &'static [FieldAccessor<T>],
}

impl<T: 'static> FieldTable<T> {
    /// Declares the accessor table for an object type.
    pub const fn new(object: &'static str, fields: &'static [FieldAccessor<T>]) -> Self {
        Self { object, fields }
    }

    /// Names of all declared fields.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|accessor| accessor.name)
    }

    /// Reads a field of `target`.
    pub fn get(&self, target: &T, name: &str) -> Result<FieldValue, FieldError> {
        Ok((self.accessor(name)?.get)(target))
    }

    /// Writes a field of `target`.
    pub fn set(&self, target: &mut T, name: &str, value: FieldValue) -> Result<(), FieldError> {
        (self.accessor(name)?.set)(target, value).map_err(|reason| FieldError::Rejected {
            object: self.object.to_owned(),
            field: name.to_owned(),
            reason,
        })
    }

    fn accessor(&self, name: &str) -> Result<&FieldAccessor<T>, FieldError> {
        self.fields
            .iter()
            .find(|accessor| accessor.name == name)
            .ok_or_else(|| FieldError::NoSuchField {
                object: self.object.to_owned(),
                field: name.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_name_the_object_and_field() {
        let missing = FieldError::NoSuchField {
            object: "Account".to_owned(),
            field: "Nope__c".to_owned(),
        };
        assert_eq!(missing.to_string(), "Account does not have a field Nope__c");

        let rejected = FieldError::Rejected {
            object: "Account".to_owned(),
            field: "ExtId__c".to_owned(),
            reason: "expected text".to_owned(),
        };
        assert_eq!(rejected.to_string(), "Account.ExtId__c rejected value: expected text");
    }
}
