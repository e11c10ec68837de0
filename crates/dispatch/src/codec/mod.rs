//! Pluggable wire format codecs.
//!
//! A [`PayloadCodec`] turns request bodies into bytes and response bytes into
//! a [`Payload`]. Which shape a response decodes into is chosen per call by a
//! [`ResponseType`]:
//!
//! | Response type | Decoded payload |
//! |---------------|-----------------|
//! | none / [`ResponseType::Raw`] | [`Payload::Stream`], bytes unchanged |
//! | [`ResponseType::Concrete`] | [`Payload::Record`] |
//! | [`ResponseType::ListOf`] | [`Payload::Records`] |
//!
//! Concrete types are type-erased behind a [`TypeBinding`]; a
//! [`TypeRegistry`] maps object and class names to bindings.

mod json;
mod xml;

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::json::JsonCodec;
pub use self::xml::{AliasChange, XmlCodec};

use crate::errors::BoxError;
use crate::message::Body;
use crate::payload::{AnyRecord, Payload};
use crate::{DispatchError, PayloadFormat};

// ---------------------------------------------------------------------------
// Codec strategy
// ---------------------------------------------------------------------------

/// Encodes request documents and decodes response bytes in one wire format.
pub trait PayloadCodec: Send + Sync + fmt::Debug {
    /// Format produced and consumed.
    fn format(&self) -> PayloadFormat;

    /// Serialises a document; `root` names the XML root element.
    ///
    /// Null members are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Encode`] if the serialiser rejects the document.
    fn encode_document(&self, root: &str, document: &Value) -> Result<Bytes, DispatchError>;

    /// Decodes response bytes according to `response`.
    ///
    /// `alias` names the XML root element expected for a concrete type and
    /// overrides the binding's own alias for this decode only.
    ///
    /// # Errors
    ///
    /// Returns the underlying parser error; the caller adds operation context.
    fn decode(
        &self,
        bytes: Bytes,
        response: Option<&ResponseType>,
        alias: Option<&str>,
    ) -> Result<Payload, BoxError>;
}

/// Creates the codec for a configured format.
pub fn codec_for(format: PayloadFormat) -> Arc<dyn PayloadCodec> {
    match format {
        PayloadFormat::Json => Arc::new(JsonCodec),
        PayloadFormat::Xml => Arc::new(XmlCodec::default()),
    }
}

/// Encodes a message body.
///
/// Raw bytes pass through unmodified; a domain record or document is
/// serialised in the codec's format; text is sent as UTF-8. Any other body is
/// rejected.
///
/// # Errors
///
/// [`DispatchError::UnsupportedBody`] naming the body's type, or
/// [`DispatchError::Encode`] from the codec.
pub fn encode_body(
    codec: &dyn PayloadCodec,
    root: &str,
    body: &Body,
) -> Result<Bytes, DispatchError> {
    match body {
        Body::Bytes(bytes) => Ok(bytes.clone()),
        Body::SObject(object) => {
            let object = object.lock();
            let document = object
                .to_document()
                .map_err(|source| encode_error(codec.format(), source))?;
            codec.encode_document(object.object_name(), &document)
        }
        Body::Value(document) => codec.encode_document(root, document),
        Body::Text(text) => Ok(Bytes::from(text.clone().into_bytes())),
        Body::Empty | Body::Opaque(_) => Err(DispatchError::UnsupportedBody {
            type_name: body.type_name(),
        }),
    }
}

/// Serialises a typed value through the codec.
///
/// # Errors
///
/// [`DispatchError::Encode`] if the value cannot be represented.
pub fn encode_value<T: Serialize>(
    codec: &dyn PayloadCodec,
    root: &str,
    value: &T,
) -> Result<Bytes, DispatchError> {
    let document =
        serde_json::to_value(value).map_err(|source| encode_error(codec.format(), source))?;
    codec.encode_document(root, &document)
}

pub(crate) fn encode_error(format: PayloadFormat, source: impl Into<BoxError>) -> DispatchError {
    DispatchError::Encode {
        format,
        source: source.into(),
    }
}

/// Removes null object members, recursively.
pub(crate) fn strip_nulls(document: &Value) -> Value {
    match document {
        Value::Object(members) => Value::Object(
            members
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| (name.clone(), strip_nulls(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

type DecodeOne = fn(&[u8]) -> Result<AnyRecord, BoxError>;
type DecodeMany = fn(&[u8]) -> Result<Vec<AnyRecord>, BoxError>;

/// Type-erased decoder for one concrete response type.
#[derive(Clone)]
pub struct TypeBinding {
    alias: Arc<str>,
    type_id: TypeId,
    type_name: &'static str,
    json_one: DecodeOne,
    json_many: DecodeMany,
    xml_one: DecodeOne,
    xml_many: DecodeMany,
}

impl TypeBinding {
    /// Binds `T`, expected under XML root element `alias`.
    pub fn of<T: DeserializeOwned + Send + 'static>(alias: &str) -> Self {
        Self {
            alias: Arc::from(alias),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            json_one: json::decode_one::<T>,
            json_many: json::decode_many::<T>,
            xml_one: xml::decode_one::<T>,
            xml_many: xml::decode_many::<T>,
        }
    }

    /// Binding for a schemaless document ([`serde_json::Value`]).
    pub fn document() -> Self {
        Self::of::<Value>("document")
    }

    /// The same type under another alias.
    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Arc::from(alias);
        self
    }

    /// Expected XML root element.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Rust type name of the bound type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Identity of the bound type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if this binding decodes into `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    fn decode_one(&self, format: PayloadFormat, bytes: &[u8]) -> Result<AnyRecord, BoxError> {
        match format {
            PayloadFormat::Json => (self.json_one)(bytes),
            PayloadFormat::Xml => (self.xml_one)(bytes),
        }
    }

    fn decode_many(&self, format: PayloadFormat, bytes: &[u8]) -> Result<Vec<AnyRecord>, BoxError> {
        match format {
            PayloadFormat::Json => (self.json_many)(bytes),
            PayloadFormat::Xml => (self.xml_many)(bytes),
        }
    }
}

impl fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBinding")
            .field("alias", &self.alias)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl PartialEq for TypeBinding {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.alias == other.alias
    }
}

/// How a call's response bytes are decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseType {
    /// Hand back the bytes unchanged.
    Raw,
    /// Decode one value.
    Concrete(TypeBinding),
    /// Decode a list of values.
    ListOf(TypeBinding),
}

impl ResponseType {
    /// Human-readable description, used in decode errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Raw => "raw stream".to_owned(),
            Self::Concrete(binding) => binding.type_name().to_owned(),
            Self::ListOf(binding) => format!("list of {}", binding.type_name()),
        }
    }
}

/// Decodes `bytes` with `binding` in `format`; shared by both codecs.
fn decode_with(
    format: PayloadFormat,
    bytes: &[u8],
    response: &ResponseType,
) -> Result<Payload, BoxError> {
    match response {
        ResponseType::Raw => Ok(Payload::Stream(Bytes::copy_from_slice(bytes))),
        ResponseType::Concrete(binding) => Ok(Payload::Record(binding.decode_one(format, bytes)?)),
        ResponseType::ListOf(binding) => Ok(Payload::Records(binding.decode_many(format, bytes)?)),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps object and class names to response type bindings.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    bindings: HashMap<String, TypeBinding>,
    fallback: Option<TypeBinding>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `name`, which is also its XML alias.
    #[must_use]
    pub fn with<T: DeserializeOwned + Send + 'static>(mut self, name: &str) -> Self {
        self.register::<T>(name);
        self
    }

    /// Registers `T` under `name`, which is also its XML alias.
    pub fn register<T: DeserializeOwned + Send + 'static>(&mut self, name: &str) {
        self.bindings.insert(name.to_owned(), TypeBinding::of::<T>(name));
    }

    /// Registers an explicit binding under `name`.
    pub fn register_binding(&mut self, name: &str, binding: TypeBinding) {
        self.bindings.insert(name.to_owned(), binding);
    }

    /// Answers unregistered names with `binding`, aliased to the name.
    #[must_use]
    pub fn with_fallback(mut self, binding: TypeBinding) -> Self {
        self.fallback = Some(binding);
        self
    }

    /// A registry that decodes every name as a schemaless document.
    pub fn documents() -> Self {
        Self::new().with_fallback(TypeBinding::document())
    }

    /// Looks up a registered binding; the fallback is not consulted.
    pub fn get(&self, name: &str) -> Option<&TypeBinding> {
        self.bindings.get(name)
    }

    /// Looks up a binding, failing if none is registered.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownType`] naming `name`.
    pub fn resolve(&self, name: &str) -> Result<TypeBinding, DispatchError> {
        if let Some(binding) = self.get(name) {
            return Ok(binding.clone());
        }
        self.fallback
            .as_ref()
            .map(|binding| binding.clone().with_alias(name))
            .ok_or_else(|| DispatchError::unknown_type(name))
    }
}

// ---------------------------------------------------------------------------
// Shared DTO helpers
// ---------------------------------------------------------------------------

/// XML list wrapper: any root element whose children are the items.
#[derive(Debug, Deserialize)]
struct XmlList<T> {
    #[serde(rename = "$value", default = "Vec::new")]
    items: Vec<T>,
}
