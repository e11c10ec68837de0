//! REST handlers: object CRUD, queries, search, APEX, approvals.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{http_method, identifier, value_text, Preparation, Prepared};
use crate::backend::BackendCall;
use crate::identifiers::{RecordId, SObjectName};
use crate::params::{
    BodyFallback::{Ignore, Use},
    value_type_name, APEX_METHOD, APEX_QUERY_PARAM_PREFIX, APEX_URL, APPROVAL, APPROVAL_PREFIX, LIMIT,
    SOBJECT_BLOB_FIELD_NAME, SOBJECT_EXT_ID_NAME, SOBJECT_EXT_ID_VALUE, SOBJECT_FIELDS, SOBJECT_ID,
    SOBJECT_NAME, SOBJECT_QUERY, SOBJECT_SEARCH,
};
use crate::sobject::SharedSObject;
use crate::DispatchError;

type Result<T> = std::result::Result<T, DispatchError>;

pub(super) fn get_versions(prep: &mut Preparation<'_>) -> Result<Prepared> {
    Ok(Prepared::call(BackendCall::GetVersions).expecting(prep.document()))
}

pub(super) fn get_resources(prep: &mut Preparation<'_>) -> Result<Prepared> {
    Ok(Prepared::call(BackendCall::GetResources).expecting(prep.document()))
}

pub(super) fn get_global_objects(prep: &mut Preparation<'_>) -> Result<Prepared> {
    Ok(Prepared::call(BackendCall::GetGlobalObjects).expecting(prep.document()))
}

pub(super) fn get_basic_info(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let object = object_name(prep.required(SOBJECT_NAME, Use)?)?;
    Ok(Prepared::call(BackendCall::GetBasicInfo { object }).expecting(prep.document()))
}

pub(super) fn get_description(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let object = object_name(prep.required(SOBJECT_NAME, Use)?)?;
    Ok(Prepared::call(BackendCall::GetDescription { object }).expecting(prep.document()))
}

pub(super) fn get_sobject(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (name, id) = match prep.sobject() {
        Some(object) => (object_name_of(&object), id_of(&object)?),
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_ID, Use)?,
        ),
    };
    let response = prep.registered(&name)?;
    let fields = prep
        .optional::<Vec<String>>(SOBJECT_FIELDS, Ignore)?
        .unwrap_or_default();

    Ok(Prepared::call(BackendCall::GetSObject {
        object: object_name(name)?,
        id: record_id(id)?,
        fields,
    })
    .expecting(response))
}

pub(super) fn create_sobject(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let name = match prep.sobject() {
        Some(object) => object_name_of(&object),
        None => prep.required(SOBJECT_NAME, Ignore)?,
    };
    let body = prep.encode_body(&name)?;

    Ok(Prepared::call(BackendCall::CreateSObject {
        object: object_name(name)?,
    })
    .with_body(body)
    .expecting(prep.document()))
}

pub(super) fn update_sobject(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (name, id) = match prep.sobject() {
        Some(object) => {
            let id = id_of(&object)?;
            prep.capture_id(&object);
            object.lock().clear_base_fields();
            (object_name_of(&object), id)
        }
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_ID, Ignore)?,
        ),
    };
    let body = prep.encode_body(&name)?;

    Ok(Prepared::call(BackendCall::UpdateSObject {
        object: object_name(name)?,
        id: record_id(id)?,
    })
    .with_body(body))
}

pub(super) fn delete_sobject(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (name, id) = match prep.sobject() {
        Some(object) => {
            let id = id_of(&object)?;
            prep.capture_id(&object);
            (object_name_of(&object), id)
        }
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_ID, Use)?,
        ),
    };

    Ok(Prepared::call(BackendCall::DeleteSObject {
        object: object_name(name)?,
        id: record_id(id)?,
    }))
}

pub(super) fn get_sobject_with_id(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let field: String = prep.required(SOBJECT_EXT_ID_NAME, Ignore)?;
    let (name, value) = match prep.sobject() {
        Some(object) => {
            let value = external_id(prep.take_field(&object, &field)?)?;
            (object_name_of(&object), value)
        }
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_EXT_ID_VALUE, Use)?,
        ),
    };
    let response = prep.registered(&name)?;

    Ok(Prepared::call(BackendCall::GetSObjectWithId {
        object: object_name(name)?,
        field,
        value,
    })
    .expecting(response))
}

pub(super) fn upsert_sobject(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let field: String = prep.required(SOBJECT_EXT_ID_NAME, Ignore)?;
    let (name, value) = match prep.sobject() {
        Some(object) => {
            let value = external_id(prep.take_field(&object, &field)?)?;
            prep.capture_id(&object);
            object.lock().clear_base_fields();
            (object_name_of(&object), value)
        }
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_EXT_ID_VALUE, Ignore)?,
        ),
    };
    let body = prep.encode_body(&name)?;

    Ok(Prepared::call(BackendCall::UpsertSObject {
        object: object_name(name)?,
        field,
        value,
    })
    .with_body(body)
    .expecting(prep.document()))
}

pub(super) fn delete_sobject_with_id(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let field: String = prep.required(SOBJECT_EXT_ID_NAME, Ignore)?;
    let (name, value) = match prep.sobject() {
        Some(object) => {
            let value = external_id(prep.take_field(&object, &field)?)?;
            (object_name_of(&object), value)
        }
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_EXT_ID_VALUE, Use)?,
        ),
    };

    Ok(Prepared::call(BackendCall::DeleteSObjectWithId {
        object: object_name(name)?,
        field,
        value,
    }))
}

pub(super) fn get_blob_field(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let field: String = prep.required(SOBJECT_BLOB_FIELD_NAME, Ignore)?;
    let (name, id) = match prep.sobject() {
        Some(object) => {
            let id = id_of(&object)?;
            prep.capture_id(&object);
            (object_name_of(&object), id)
        }
        None => (
            prep.required::<String>(SOBJECT_NAME, Ignore)?,
            prep.required::<String>(SOBJECT_ID, Use)?,
        ),
    };

    Ok(Prepared::call(BackendCall::GetBlobField {
        object: object_name(name)?,
        id: record_id(id)?,
        field,
    })
    .expecting(prep.raw()))
}

pub(super) fn query(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let soql = prep.required(SOBJECT_QUERY, Use)?;
    let response = prep.response_class()?;
    Ok(Prepared::call(BackendCall::Query { soql }).expecting(response))
}

/// The continuation locator travels in the query parameter.
pub(super) fn query_more(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let next_records_url = prep.required(SOBJECT_QUERY, Use)?;
    let response = prep.response_class()?;
    Ok(Prepared::call(BackendCall::QueryMore { next_records_url }).expecting(response))
}

pub(super) fn query_all(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let soql = prep.required(SOBJECT_QUERY, Use)?;
    let response = prep.response_class()?;
    Ok(Prepared::call(BackendCall::QueryAll { soql }).expecting(response))
}

pub(super) fn search(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let sosl = prep.required(SOBJECT_SEARCH, Use)?;
    Ok(Prepared::call(BackendCall::Search { sosl }).expecting(prep.document()))
}

pub(super) fn apex_call(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let template: String = prep.required(APEX_URL, Ignore)?;
    let url = expand_url_template(&template, |name| prep.message().header(name))?;
    let method = match prep.optional::<String>(APEX_METHOD, Ignore)? {
        Some(method) => http_method(APEX_METHOD, &method)?,
        None => {
            debug!(url = %url, "APEX call method defaults to GET");
            "GET".to_owned()
        }
    };
    let query = apex_query_params(prep);

    let response = match prep.optional::<String>(SOBJECT_NAME, Ignore)? {
        Some(name) => prep.registered(&name)?,
        None => prep.raw(),
    };

    // A map body supplies query parameters instead of a request body.
    let body = match prep.message().body() {
        body if body.is_empty() || matches!(body.as_value(), Some(Value::Object(_))) => None,
        _ => Some(prep.encode_body("request")?),
    };

    Ok(Prepared::call(BackendCall::ApexCall { method, url, query })
        .with_optional_body(body)
        .expecting(response))
}

pub(super) fn recent(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let limit = prep.optional::<u32>(LIMIT, Use)?;
    Ok(Prepared::call(BackendCall::Recent { limit }).expecting(prep.document()))
}

pub(super) fn limits(prep: &mut Preparation<'_>) -> Result<Prepared> {
    Ok(Prepared::call(BackendCall::Limits).expecting(prep.document()))
}

/// Builds approval requests from the `approval` header template, `approval.*`
/// header overrides, and the body (one request or a list).
pub(super) fn approval(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let template_header = prep.optional::<Value>(APPROVAL, Ignore)?;
    let from_header = template_header.is_some();
    let mut template = match template_header {
        None => Map::new(),
        Some(Value::Object(fields)) => fields,
        Some(other) => {
            return Err(DispatchError::InvalidHeader {
                name: APPROVAL.to_owned(),
                expected: "an object",
                found: value_type_name(&other),
            })
        }
    };
    let mut overridden = false;
    for (field, value) in prep.params().prefixed_headers(APPROVAL_PREFIX) {
        if !value.is_null() {
            template.insert(field.to_owned(), value.clone());
            overridden = true;
        }
    }

    let body = prep.message().body();
    let nothing_in_body = match body.as_value() {
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
        None => body.is_empty(),
    };
    if !from_header && !overridden && nothing_in_body {
        return Err(DispatchError::missing_parameter(APPROVAL, true));
    }

    let requests: Vec<Value> = match body.as_value() {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| apply_template(item, &template))
            .collect(),
        Some(single @ Value::Object(_)) => vec![apply_template(single, &template)],
        _ => vec![Value::Object(template)],
    };

    let body = prep.encode_value("requests", &json!({ "requests": requests }))?;
    Ok(Prepared::call(BackendCall::Approval)
        .with_body(body)
        .expecting(prep.document()))
}

pub(super) fn approvals(prep: &mut Preparation<'_>) -> Result<Prepared> {
    Ok(Prepared::call(BackendCall::Approvals).expecting(prep.document()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(super) fn object_name(name: String) -> Result<SObjectName> {
    identifier(SOBJECT_NAME, name, SObjectName::new)
}

fn record_id(id: String) -> Result<RecordId> {
    identifier(SOBJECT_ID, id, RecordId::new)
}

fn object_name_of(object: &SharedSObject) -> String {
    object.lock().object_name().to_owned()
}

fn id_of(object: &SharedSObject) -> Result<String> {
    object
        .lock()
        .id()
        .map(str::to_owned)
        .ok_or_else(|| DispatchError::missing_parameter(SOBJECT_ID, true))
}

fn external_id(value: Value) -> Result<String> {
    match value {
        Value::Null => Err(DispatchError::missing_parameter(SOBJECT_EXT_ID_VALUE, true)),
        other => Ok(value_text(&other)),
    }
}

/// Fills fields the request leaves unset from the template.
fn apply_template(request: &Value, template: &Map<String, Value>) -> Value {
    let mut merged = match request {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    for (field, value) in template {
        let unset = merged.get(field).map_or(true, Value::is_null);
        if unset {
            merged.insert(field.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Query parameters: configured defaults, then `apexQueryParam.*` headers,
/// then the members of a map body.
fn apex_query_params(prep: &Preparation<'_>) -> BTreeMap<String, String> {
    let mut query: BTreeMap<String, String> = prep
        .config()
        .apex_query_params
        .iter()
        .map(|(name, value)| (name.clone(), value.as_text()))
        .collect();
    for (name, value) in prep.params().prefixed_headers(APEX_QUERY_PARAM_PREFIX) {
        query.insert(name.to_owned(), value_text(value));
    }
    if let Some(Value::Object(members)) = prep.message().body().as_value() {
        for (name, value) in members {
            query.insert(name.clone(), value_text(value));
        }
    }
    query
}

/// Replaces each `{name}` in an APEX URL with the percent-encoded value of
/// header `name`.
pub(super) fn expand_url_template<'v>(
    template: &str,
    lookup: impl Fn(&str) -> Option<&'v Value>,
) -> Result<String> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find(['{', '}']) {
            Some(end) if end > 0 && after.as_bytes()[end] == b'}' => {
                let name = &after[..end];
                let value = lookup(name)
                    .filter(|value| !value.is_null())
                    .ok_or_else(|| DispatchError::missing_parameter(name, false))?;
                expanded.push_str(&rest[..open]);
                expanded.push_str(&encode_component(&value_text(value)));
                rest = &after[end + 1..];
            }
            Some(_) => {
                expanded.push_str(&rest[..=open]);
                rest = after;
            }
            None => break,
        }
    }
    expanded.push_str(rest);
    Ok(expanded)
}

/// Form-encodes text, with spaces as `%20`.
fn encode_component(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::message::Headers;

    fn headers(entries: Value) -> Headers {
        serde_json::from_value(entries).expect("header map")
    }

    #[rstest]
    #[case("Widget/{id}", json!({"id": "a0x 1"}), "Widget/a0x%201")]
    #[case("Widget/{id}/parts/{part}", json!({"id": 7, "part": "a/b"}), "Widget/7/parts/a%2Fb")]
    #[case("Widget/static", json!({}), "Widget/static")]
    #[case("Widget/{}", json!({}), "Widget/{}")]
    fn url_templates_expand_from_headers(
        #[case] template: &str,
        #[case] values: Value,
        #[case] expected: &str,
    ) {
        let values = headers(values);
        let expanded =
            expand_url_template(template, |name| values.get(name)).expect("all templates set");
        assert_eq!(expanded, expected);
    }

    #[test]
    fn missing_template_header_is_a_parameter_error() {
        let values = Headers::new();
        let error = expand_url_template("Widget/{id}", |name| values.get(name))
            .expect_err("id header absent");
        assert_eq!(error.kind(), crate::ErrorKind::Parameter);
        assert!(error.to_string().contains("'id'"));
    }

    #[test]
    fn template_fills_only_unset_request_fields() {
        let template = json!({"actionType": "Submit", "comments": "from template"})
            .as_object()
            .cloned()
            .expect("object template");
        let merged = apply_template(
            &json!({"contextId": "001xx", "comments": "own comment", "nextApproverIds": null}),
            &template,
        );

        assert_eq!(merged["actionType"], "Submit");
        assert_eq!(merged["comments"], "own comment");
        assert_eq!(merged["contextId"], "001xx");
    }
}
