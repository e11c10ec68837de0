//! Inbound and outbound message shapes.
//!
//! A [`Message`] is what the caller hands to the dispatcher: named headers
//! holding typed values, a [`Body`], and a property bag for call-scoped
//! metadata. Headers carry parameters with the highest precedence, so their
//! values keep their JSON type and are never coerced.

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use crate::sobject::{share, SObject, SharedSObject};

/// Header or property map keyed by name.
pub type Headers = BTreeMap<String, Value>;

/// Message property naming the XML root element to expect in the response.
pub const RESPONSE_ALIAS: &str = "responseAlias";

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// Payload carried by an inbound message.
pub enum Body {
    /// No body.
    Empty,
    /// Raw bytes, sent to the backend unmodified.
    Bytes(Bytes),
    /// Text, used as a parameter fallback or sent as UTF-8.
    Text(String),
    /// A structured document (JSON-shaped).
    Value(Value),
    /// A domain record shared with the caller.
    SObject(SharedSObject),
    /// Any other value; carried through but never encodable.
    Opaque(OpaqueBody),
}

/// A body of a type the engine has no conversion for.
pub struct OpaqueBody {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl OpaqueBody {
    /// Runtime type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl Body {
    /// Wraps a domain record.
    pub fn sobject<T: SObject>(object: T) -> Self {
        Self::SObject(share(object))
    }

    /// Wraps a value of an arbitrary type.
    pub fn opaque<T: Any + Send>(value: T) -> Self {
        Self::Opaque(OpaqueBody {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        })
    }

    /// Name of the body's runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Value(_) => "document",
            Self::SObject(_) => "sobject",
            Self::Opaque(opaque) => opaque.type_name,
        }
    }

    /// Returns `true` for [`Body::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The shared record, if the body is one.
    pub fn as_sobject(&self) -> Option<&SharedSObject> {
        match self {
            Self::SObject(object) => Some(object),
            _ => None,
        }
    }

    /// Text view of the body: text, a string document, or UTF-8 bytes.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(text) => Some(Cow::Borrowed(text)),
            Self::Value(Value::String(text)) => Some(Cow::Borrowed(text)),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            _ => None,
        }
    }

    /// Document view of the body.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::SObject(object) => f.debug_tuple("SObject").field(object).finish(),
            Self::Opaque(opaque) => f.debug_tuple("Opaque").field(&opaque.type_name).finish(),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Inbound message handed to `Dispatcher::process`.
#[derive(Debug, Default)]
pub struct Message {
    headers: Headers,
    body: Body,
    properties: Headers,
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a call-scoped property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Looks up a header by exact name.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    /// All headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replaces the body in place.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Looks up a property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_view_covers_text_string_documents_and_utf8_bytes() {
        assert_eq!(Body::from("abc").as_text().as_deref(), Some("abc"));
        assert_eq!(
            Body::from(Value::from("def")).as_text().as_deref(),
            Some("def")
        );
        assert_eq!(
            Body::from(Bytes::from_static(b"ghi")).as_text().as_deref(),
            Some("ghi")
        );
        assert!(Body::from(Value::from(3)).as_text().is_none());
        assert!(Body::Empty.as_text().is_none());
    }

    #[test]
    fn opaque_bodies_report_their_type() {
        struct Widget;
        let body = Body::opaque(Widget);
        assert!(body.type_name().ends_with("Widget"));
    }

    #[test]
    fn builder_collects_headers_and_properties() {
        let message = Message::new()
            .with_header("sObjectName", "Account")
            .with_property(RESPONSE_ALIAS, "Account")
            .with_body("001xx");

        assert_eq!(message.header("sObjectName"), Some(&Value::from("Account")));
        assert_eq!(message.property(RESPONSE_ALIAS), Some(&Value::from("Account")));
        assert_eq!(message.body().as_text().as_deref(), Some("001xx"));
    }
}
