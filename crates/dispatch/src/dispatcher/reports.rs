//! Analytics report handlers.

use serde_json::{json, Value};

use super::{identifier, Preparation, Prepared};
use crate::backend::BackendCall;
use crate::identifiers::{ReportId, ReportInstanceId};
use crate::params::{
    BodyFallback::{Ignore, Use},
    INCLUDE_DETAILS, INSTANCE_ID, REPORT_ID, REPORT_METADATA,
};
use crate::DispatchError;

type Result<T> = std::result::Result<T, DispatchError>;

pub(super) fn get_recent_reports(prep: &mut Preparation<'_>) -> Result<Prepared> {
    Ok(Prepared::call(BackendCall::GetRecentReports).expecting(prep.document()))
}

pub(super) fn get_report_description(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let report = report_id(prep, None)?;
    Ok(Prepared::call(BackendCall::GetReportDescription { report }).expecting(prep.document()))
}

/// Runs a report and waits for its results. Metadata, when given, replaces
/// the saved filters and is sent with POST; otherwise the saved report runs.
pub(super) fn execute_sync_report(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let metadata = report_metadata(prep)?;
    let report = report_id(prep, metadata.as_ref())?;
    let include_details = prep.optional::<bool>(INCLUDE_DETAILS, Ignore)?;
    let body = metadata
        .map(|metadata| prep.encode_value(REPORT_METADATA, &metadata))
        .transpose()?;

    Ok(Prepared::call(BackendCall::ExecuteSyncReport {
        report,
        include_details,
        with_metadata: body.is_some(),
    })
    .with_optional_body(body)
    .expecting(prep.document()))
}

pub(super) fn execute_async_report(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let metadata = report_metadata(prep)?;
    let report = report_id(prep, metadata.as_ref())?;
    let include_details = prep.optional::<bool>(INCLUDE_DETAILS, Ignore)?;
    let body = metadata
        .map(|metadata| prep.encode_value(REPORT_METADATA, &metadata))
        .transpose()?;

    Ok(Prepared::call(BackendCall::ExecuteAsyncReport {
        report,
        include_details,
    })
    .with_optional_body(body)
    .expecting(prep.document()))
}

pub(super) fn get_report_instances(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let report = report_id(prep, None)?;
    Ok(Prepared::call(BackendCall::GetReportInstances { report }).expecting(prep.document()))
}

pub(super) fn get_report_results(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let id: String = prep.required(REPORT_ID, Ignore)?;
    let report = identifier(REPORT_ID, id, ReportId::new)?;
    let instance: String = prep.required(INSTANCE_ID, Use)?;
    let instance = identifier(INSTANCE_ID, instance, ReportInstanceId::new)?;

    Ok(Prepared::call(BackendCall::GetReportResults { report, instance })
        .expecting(prep.document()))
}

/// The report id from the parameter, the metadata's `id`, or the body text,
/// in that order.
fn report_id(prep: &Preparation<'_>, metadata: Option<&Value>) -> Result<ReportId> {
    let from_metadata = metadata
        .and_then(|request| request.get(REPORT_METADATA))
        .and_then(|metadata| metadata.get("id"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let id = match (prep.optional::<String>(REPORT_ID, Ignore)?, from_metadata) {
        (Some(id), _) | (None, Some(id)) => id,
        (None, None) => prep.required(REPORT_ID, Use)?,
    };
    identifier(REPORT_ID, id, ReportId::new)
}

/// Report metadata as a `{"reportMetadata": {...}}` request document.
///
/// Taken from the `reportMetadata` parameter, else from an object body. A
/// bare metadata object is wrapped.
fn report_metadata(prep: &Preparation<'_>) -> Result<Option<Value>> {
    let metadata = match prep.optional::<Value>(REPORT_METADATA, Ignore)? {
        Some(Value::Object(metadata)) => Value::Object(metadata),
        Some(_) => {
            return Err(DispatchError::invalid_parameter(
                REPORT_METADATA,
                "must be an object",
            ))
        }
        None => match prep.message().body().as_value() {
            Some(Value::Object(metadata)) => Value::Object(metadata.clone()),
            _ => return Ok(None),
        },
    };
    if metadata.get(REPORT_METADATA).is_some() {
        return Ok(Some(metadata));
    }
    Ok(Some(json!({ REPORT_METADATA: metadata })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TypeRegistry;
    use crate::config::EndpointConfig;
    use crate::dispatcher::handler_for;
    use crate::message::Message;
    use crate::operation::Operation;

    fn prepare(operation: Operation, message: &Message) -> Result<Prepared> {
        let config = EndpointConfig::default();
        let codec = crate::codec::codec_for(config.format);
        let registry = TypeRegistry::new();
        let mut prep = Preparation::new(operation, message, &config, codec.as_ref(), &registry);
        handler_for(operation)(&mut prep)
    }

    #[test]
    fn metadata_body_supplies_the_report_id_and_is_wrapped() {
        let message = Message::new()
            .with_header(INCLUDE_DETAILS, true)
            .with_body(json!({"id": "00Ox0000000a1", "reportFormat": "TABULAR"}));

        let prepared = prepare(Operation::ExecuteSyncReport, &message).expect("prepared");

        assert_eq!(
            prepared.call,
            BackendCall::ExecuteSyncReport {
                report: ReportId::new("00Ox0000000a1").expect("id"),
                include_details: Some(true),
                with_metadata: true,
            }
        );
        let sent: Value =
            serde_json::from_slice(prepared.body.as_deref().expect("body")).expect("json");
        assert_eq!(sent["reportMetadata"]["reportFormat"], "TABULAR");
    }

    #[test]
    fn saved_reports_run_without_a_body() {
        let message = Message::new().with_body("00Ox0000000a1");

        let prepared = prepare(Operation::ExecuteAsyncReport, &message).expect("prepared");

        assert_eq!(
            prepared.call,
            BackendCall::ExecuteAsyncReport {
                report: ReportId::new("00Ox0000000a1").expect("id"),
                include_details: None,
            }
        );
        assert!(prepared.body.is_none());
    }

    #[test]
    fn non_object_metadata_is_rejected() {
        let message = Message::new()
            .with_header(REPORT_ID, "00Ox0000000a1")
            .with_header(REPORT_METADATA, "TABULAR");

        let error = prepare(Operation::ExecuteSyncReport, &message).expect_err("invalid");
        assert!(error.to_string().contains(REPORT_METADATA));
    }

    #[test]
    fn results_need_both_the_report_and_the_instance() {
        let message = Message::new().with_header(REPORT_ID, "00Ox0000000a1");
        let error = prepare(Operation::GetReportResults, &message).expect_err("no instance");
        assert!(error.to_string().contains(INSTANCE_ID));

        let prepared = prepare(
            Operation::GetReportResults,
            &Message::new().with_header(REPORT_ID, "00Ox0000000a1").with_body("0LGx01"),
        )
        .expect("prepared");
        assert_eq!(
            prepared.call,
            BackendCall::GetReportResults {
                report: ReportId::new("00Ox0000000a1").expect("id"),
                instance: ReportInstanceId::new("0LGx01").expect("id"),
            }
        );
    }
}
