//! Decoded response payloads.

use std::any::Any;
use std::fmt;

use bytes::Bytes;

/// A decoded value of a type only known at runtime.
pub struct AnyRecord {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl AnyRecord {
    /// Wraps a decoded value.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the wrapped value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Takes the wrapped value as `T`, or returns `self` unchanged.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Self { type_name, value })
    }
}

impl fmt::Debug for AnyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyRecord")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Body placed on the outbound message when a call completes.
#[derive(Debug, Default)]
pub enum Payload {
    /// The operation has no response, or the backend returned none.
    #[default]
    Empty,
    /// Undecoded response bytes.
    Stream(Bytes),
    /// One decoded value.
    Record(AnyRecord),
    /// A decoded list.
    Records(Vec<AnyRecord>),
}

impl Payload {
    /// Returns `true` for [`Payload::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The raw stream, if the payload was passed through undecoded.
    pub fn as_stream(&self) -> Option<&Bytes> {
        match self {
            Self::Stream(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Borrows a single decoded value as `T`.
    pub fn record<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Record(record) => record.downcast_ref(),
            _ => None,
        }
    }

    /// Takes a single decoded value as `T`.
    pub fn into_record<T: Any>(self) -> Option<T> {
        match self {
            Self::Record(record) => record.downcast().ok(),
            _ => None,
        }
    }

    /// Takes a decoded list as `Vec<T>`; `None` if any element is not a `T`.
    pub fn into_records<T: Any>(self) -> Option<Vec<T>> {
        match self {
            Self::Records(records) => records
                .into_iter()
                .map(|record| record.downcast().ok())
                .collect(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_downcast_to_their_own_type_only() {
        let payload = Payload::Record(AnyRecord::new(42_u32));
        assert_eq!(payload.record::<u32>(), Some(&42));
        assert_eq!(payload.record::<i64>(), None);
        assert_eq!(payload.into_record::<u32>(), Some(42));
    }

    #[test]
    fn failed_downcast_returns_the_record() {
        let record = AnyRecord::new("text".to_owned());
        let record = record.downcast::<u8>().expect_err("wrong type");
        assert!(record.is::<String>());
        assert!(record.type_name().contains("String"));
    }

    #[test]
    fn lists_downcast_element_wise() {
        let payload = Payload::Records(vec![AnyRecord::new(1_u8), AnyRecord::new(2_u8)]);
        assert_eq!(payload.into_records::<u8>(), Some(vec![1, 2]));

        let mixed = Payload::Records(vec![AnyRecord::new(1_u8), AnyRecord::new("x")]);
        assert_eq!(mixed.into_records::<u8>(), None);
    }
}
