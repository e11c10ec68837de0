//! JSON codec.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{decode_with, encode_error, strip_nulls, PayloadCodec, ResponseType};
use crate::errors::BoxError;
use crate::payload::{AnyRecord, Payload};
use crate::{DispatchError, PayloadFormat};

/// Stateless JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn format(&self) -> PayloadFormat {
        PayloadFormat::Json
    }

    fn encode_document(&self, _root: &str, document: &Value) -> Result<Bytes, DispatchError> {
        serde_json::to_vec(&strip_nulls(document))
            .map(Bytes::from)
            .map_err(|source| encode_error(PayloadFormat::Json, source))
    }

    fn decode(
        &self,
        bytes: Bytes,
        response: Option<&ResponseType>,
        _alias: Option<&str>,
    ) -> Result<Payload, BoxError> {
        match response {
            None | Some(ResponseType::Raw) => Ok(Payload::Stream(bytes)),
            Some(response) => decode_with(PayloadFormat::Json, &bytes, response),
        }
    }
}

pub(super) fn decode_one<T: DeserializeOwned + Send + 'static>(
    bytes: &[u8],
) -> Result<AnyRecord, BoxError> {
    let value: T = serde_json::from_slice(bytes)?;
    Ok(AnyRecord::new(value))
}

pub(super) fn decode_many<T: DeserializeOwned + Send + 'static>(
    bytes: &[u8],
) -> Result<Vec<AnyRecord>, BoxError> {
    let values: Vec<T> = serde_json::from_slice(bytes)?;
    Ok(values.into_iter().map(AnyRecord::new).collect())
}
