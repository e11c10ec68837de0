//! Composite handlers: request trees, batches, and record collections.

use bytes::Bytes;
use serde_json::{json, Value};

use super::rest::object_name;
use super::{Preparation, Prepared};
use crate::backend::BackendCall;
use crate::message::Body;
use crate::params::{
    BodyFallback::{Ignore, Use},
    ALL_OR_NONE, SOBJECT_EXT_ID_NAME, SOBJECT_FIELDS, SOBJECT_IDS, SOBJECT_NAME,
};
use crate::DispatchError;

type Result<T> = std::result::Result<T, DispatchError>;

pub(super) fn composite(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let body = prep.encode_body("compositeRequest")?;
    Ok(Prepared::call(BackendCall::Composite)
        .with_body(body)
        .expecting(prep.document()))
}

pub(super) fn composite_batch(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let body = prep.encode_body("batchRequest")?;
    Ok(Prepared::call(BackendCall::CompositeBatch)
        .with_body(body)
        .expecting(prep.document()))
}

pub(super) fn composite_tree(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let object = object_name(prep.required(SOBJECT_NAME, Ignore)?)?;
    let body = prep.encode_body("SObjectTreeRequest")?;
    Ok(Prepared::call(BackendCall::CompositeTree { object })
        .with_body(body)
        .expecting(prep.document()))
}

pub(super) fn create_collections(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let all_or_none = all_or_none(prep)?;
    let body = collection_body(prep, all_or_none)?;
    Ok(
        Prepared::call(BackendCall::CompositeCreateSObjectCollections { all_or_none })
            .with_body(body)
            .expecting(prep.document()),
    )
}

pub(super) fn update_collections(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let all_or_none = all_or_none(prep)?;
    let body = collection_body(prep, all_or_none)?;
    Ok(
        Prepared::call(BackendCall::CompositeUpdateSObjectCollections { all_or_none })
            .with_body(body)
            .expecting(prep.document()),
    )
}

pub(super) fn upsert_collections(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let object = object_name(prep.required(SOBJECT_NAME, Ignore)?)?;
    let field: String = prep.required(SOBJECT_EXT_ID_NAME, Ignore)?;
    let all_or_none = all_or_none(prep)?;
    let body = collection_body(prep, all_or_none)?;
    Ok(Prepared::call(BackendCall::CompositeUpsertSObjectCollections {
        object,
        field,
        all_or_none,
    })
    .with_body(body)
    .expecting(prep.document()))
}

pub(super) fn retrieve_collections(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let name: String = prep.required(SOBJECT_NAME, Ignore)?;
    let ids: Vec<String> = prep.required(SOBJECT_IDS, Use)?;
    let fields: Vec<String> = prep.required(SOBJECT_FIELDS, Ignore)?;
    let response = prep.registered_list(&name)?;
    Ok(Prepared::call(BackendCall::CompositeRetrieveSObjectCollections {
        object: object_name(name)?,
        ids,
        fields,
    })
    .expecting(response))
}

pub(super) fn delete_collections(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let ids: Vec<String> = prep.required(SOBJECT_IDS, Use)?;
    let all_or_none = all_or_none(prep)?;
    Ok(
        Prepared::call(BackendCall::CompositeDeleteSObjectCollections { ids, all_or_none })
            .expecting(prep.document()),
    )
}

fn all_or_none(prep: &Preparation<'_>) -> Result<bool> {
    Ok(prep.optional::<bool>(ALL_OR_NONE, Ignore)?.unwrap_or(false))
}

/// The collection request document.
///
/// A record array is wrapped with the `allOrNone` flag; a complete request
/// document gets the flag only if it has none. Raw bytes are sent unchanged.
fn collection_body(prep: &Preparation<'_>, all_or_none: bool) -> Result<Bytes> {
    let document = match prep.message().body() {
        Body::Bytes(bytes) => return Ok(bytes.clone()),
        Body::Value(Value::Array(records)) => json!({
            "allOrNone": all_or_none,
            "records": records,
        }),
        Body::Value(Value::Object(request)) => {
            let mut request = request.clone();
            request
                .entry(ALL_OR_NONE)
                .or_insert(Value::Bool(all_or_none));
            Value::Object(request)
        }
        other => {
            return Err(DispatchError::UnsupportedBody {
                type_name: other.type_name(),
            })
        }
    };
    prep.encode_value("SObjectCollectionRequest", &document)
}
