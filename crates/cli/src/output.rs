//! Rendering decoded payloads for the terminal.

use anyhow::{bail, Context};
use dispatch::bulk::{BatchInfo, JobInfo};
use dispatch::{AnyRecord, Payload};
use serde_json::Value;

/// Renders a payload; `None` when there is nothing to print.
///
/// Documents are pretty-printed JSON. Streams are printed as UTF-8 text.
pub(crate) fn render(payload: Payload) -> anyhow::Result<Option<String>> {
    let document = match payload {
        Payload::Empty => return Ok(None),
        Payload::Stream(bytes) => {
            let text = String::from_utf8(bytes.to_vec()).context("response is not UTF-8 text")?;
            return Ok(Some(text));
        }
        Payload::Record(record) => to_document(record)?,
        Payload::Records(records) => Value::Array(
            records
                .into_iter()
                .map(to_document)
                .collect::<anyhow::Result<_>>()?,
        ),
    };
    Ok(Some(serde_json::to_string_pretty(&document)?))
}

fn to_document(record: AnyRecord) -> anyhow::Result<Value> {
    let record = match record.downcast::<Value>() {
        Ok(value) => return Ok(value),
        Err(record) => record,
    };
    let record = match record.downcast::<JobInfo>() {
        Ok(job) => return Ok(serde_json::to_value(job)?),
        Err(record) => record,
    };
    let record = match record.downcast::<BatchInfo>() {
        Ok(batch) => return Ok(serde_json::to_value(batch)?),
        Err(record) => record,
    };
    match record.downcast::<String>() {
        Ok(text) => Ok(Value::String(text)),
        Err(record) => bail!("cannot render a {}", record.type_name()),
    }
}
