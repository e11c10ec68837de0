//! Raw passthrough handler.

use std::collections::BTreeMap;

use super::{http_method, value_text, Preparation, Prepared};
use crate::backend::BackendCall;
use crate::params::{
    BodyFallback::Ignore, RAW_HTTP_HEADERS, RAW_METHOD, RAW_PATH, RAW_QUERY_PARAMETERS,
};
use crate::DispatchError;

/// Sends the body to an arbitrary path.
///
/// `rawQueryParameters` and `rawHttpHeaders` name message headers whose values
/// become query parameters and HTTP headers respectively. Named headers that
/// are absent are skipped.
pub(super) fn raw(prep: &mut Preparation<'_>) -> Result<Prepared, DispatchError> {
    let method: String = prep.required(RAW_METHOD, Ignore)?;
    let method = http_method(RAW_METHOD, &method)?;
    let path: String = prep.required(RAW_PATH, Ignore)?;
    let query = named_headers(prep, RAW_QUERY_PARAMETERS)?;
    let headers = named_headers(prep, RAW_HTTP_HEADERS)?;

    let body = if prep.message().body().is_empty() {
        None
    } else {
        Some(prep.encode_body("request")?)
    };

    Ok(Prepared::call(BackendCall::Raw {
        method,
        path,
        query,
        headers,
    })
    .with_optional_body(body)
    .expecting(prep.raw()))
}

fn named_headers(
    prep: &Preparation<'_>,
    parameter: &str,
) -> Result<BTreeMap<String, String>, DispatchError> {
    let names = prep.optional::<Vec<String>>(parameter, Ignore)?.unwrap_or_default();
    Ok(names
        .into_iter()
        .filter_map(|name| {
            let value = prep.message().header(&name).filter(|value| !value.is_null())?;
            Some((name, value_text(value)))
        })
        .collect())
}
