//! Bulk API handlers: jobs, batches, and query results.

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use super::{identifier, Preparation, Prepared};
use crate::backend::BackendCall;
use crate::bulk::{BatchInfo, ContentType, JobInfo, JobState};
use crate::identifiers::{BatchId, JobId, ResultId};
use crate::message::Body;
use crate::params::{
    BodyFallback::{Ignore, Use},
    BATCH_ID, CONTENT_TYPE, JOB_ID, PK_CHUNKING, PK_CHUNKING_CHUNK_SIZE, PK_CHUNKING_PARENT,
    PK_CHUNKING_START_ROW, RESULT_ID, SOBJECT_QUERY,
};
use crate::DispatchError;

type Result<T> = std::result::Result<T, DispatchError>;

const JOB_INFO: &str = "jobInfo";
const BATCH_INFO: &str = "batchInfo";

pub(super) fn create_job(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_info(prep.message().body())?
        .ok_or_else(|| DispatchError::missing_parameter(JOB_INFO, true))?;
    let body = prep.encode_value(JOB_INFO, &job)?;
    let pk_chunking = pk_chunking(prep)?;

    Ok(Prepared::call(BackendCall::CreateJob { pk_chunking })
        .with_body(body)
        .expecting(prep.typed::<JobInfo>(JOB_INFO)))
}

pub(super) fn get_job(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_of(prep)?;
    Ok(Prepared::call(BackendCall::GetJob { job }).expecting(prep.typed::<JobInfo>(JOB_INFO)))
}

pub(super) fn close_job(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_of(prep)?;
    let body = prep.encode_value(JOB_INFO, &JobInfo::state_change(JobState::Closed))?;
    Ok(Prepared::call(BackendCall::CloseJob { job })
        .with_body(body)
        .expecting(prep.typed::<JobInfo>(JOB_INFO)))
}

pub(super) fn abort_job(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_of(prep)?;
    let body = prep.encode_value(JOB_INFO, &JobInfo::state_change(JobState::Aborted))?;
    Ok(Prepared::call(BackendCall::AbortJob { job })
        .with_body(body)
        .expecting(prep.typed::<JobInfo>(JOB_INFO)))
}

pub(super) fn create_batch(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_id(prep.required(JOB_ID, Ignore)?)?;
    let content_type = content_type(prep)?;
    let body = prep.encode_body("batch")?;

    Ok(Prepared::call(BackendCall::CreateBatch { job, content_type })
        .with_body(body)
        .expecting(prep.typed::<BatchInfo>(BATCH_INFO)))
}

pub(super) fn get_batch(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (job, batch) = batch_of(prep)?;
    Ok(Prepared::call(BackendCall::GetBatch { job, batch })
        .expecting(prep.typed::<BatchInfo>(BATCH_INFO)))
}

pub(super) fn get_all_batches(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_of(prep)?;
    Ok(Prepared::call(BackendCall::GetAllBatches { job })
        .expecting(prep.list_of::<BatchInfo>(BATCH_INFO)))
}

pub(super) fn get_request(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (job, batch) = batch_of(prep)?;
    Ok(Prepared::call(BackendCall::GetRequest { job, batch }).expecting(prep.raw()))
}

pub(super) fn get_results(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (job, batch) = batch_of(prep)?;
    Ok(Prepared::call(BackendCall::GetResults { job, batch }).expecting(prep.raw()))
}

/// The query text is sent as the batch body.
pub(super) fn create_batch_query(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_id(prep.required(JOB_ID, Ignore)?)?;
    let content_type = content_type(prep)?;
    let soql: String = prep.required(SOBJECT_QUERY, Use)?;

    Ok(Prepared::call(BackendCall::CreateBatchQuery { job, content_type })
        .with_body(Bytes::from(soql))
        .expecting(prep.typed::<BatchInfo>(BATCH_INFO)))
}

pub(super) fn get_query_result_ids(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let (job, batch) = batch_of(prep)?;
    Ok(Prepared::call(BackendCall::GetQueryResultIds { job, batch })
        .expecting(prep.list_of::<String>("result")))
}

pub(super) fn get_query_result(prep: &mut Preparation<'_>) -> Result<Prepared> {
    let job = job_id(prep.required(JOB_ID, Ignore)?)?;
    let batch = batch_id(prep.required(BATCH_ID, Ignore)?)?;
    let result = identifier(RESULT_ID, prep.required(RESULT_ID, Use)?, ResultId::new)?;
    Ok(Prepared::call(BackendCall::GetQueryResult { job, batch, result }).expecting(prep.raw()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A job document from the body: a [`JobInfo`] value or a JSON document.
fn job_info(body: &Body) -> Result<Option<JobInfo>> {
    match body {
        Body::Opaque(opaque) => Ok(opaque.downcast_ref::<JobInfo>().cloned()),
        Body::Value(document @ Value::Object(_)) => serde_json::from_value(document.clone())
            .map(Some)
            .map_err(|error| DispatchError::invalid_parameter(JOB_INFO, error.to_string())),
        _ => Ok(None),
    }
}

/// The job a call targets: the id of a job document body, else `jobId`.
fn job_of(prep: &Preparation<'_>) -> Result<JobId> {
    let from_body = job_info(prep.message().body())?.and_then(|job| job.id);
    let id = match from_body {
        Some(id) => id,
        None => prep.required(JOB_ID, Use)?,
    };
    job_id(id)
}

/// The batch a call targets: a batch document body, else `jobId` and `batchId`.
fn batch_of(prep: &Preparation<'_>) -> Result<(JobId, BatchId)> {
    let from_body = match prep.message().body() {
        Body::Opaque(opaque) => opaque.downcast_ref::<BatchInfo>(),
        _ => None,
    };
    if let Some(BatchInfo {
        id: Some(batch),
        job_id: Some(job),
        ..
    }) = from_body
    {
        return Ok((job_id(job.clone())?, batch_id(batch.clone())?));
    }
    let job = job_id(prep.required(JOB_ID, Ignore)?)?;
    let batch = batch_id(prep.required(BATCH_ID, Use)?)?;
    Ok((job, batch))
}

/// `Sforce-Enable-PKChunking` value: `true`, or the `; `-separated
/// directives when any chunking option is set.
fn pk_chunking(prep: &Preparation<'_>) -> Result<Option<String>> {
    let enabled = prep.optional::<bool>(PK_CHUNKING, Ignore)?.unwrap_or(false);
    let chunk_size = prep.optional::<u32>(PK_CHUNKING_CHUNK_SIZE, Ignore)?;
    let parent = prep.optional::<String>(PK_CHUNKING_PARENT, Ignore)?;
    let start_row = prep.optional::<String>(PK_CHUNKING_START_ROW, Ignore)?;

    let directives: Vec<String> = [
        chunk_size.map(|size| format!("chunkSize={size}")),
        parent.map(|parent| format!("parent={parent}")),
        start_row.map(|row| format!("startRow={row}")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if !enabled {
        if !directives.is_empty() {
            debug!(?directives, "PK chunking options ignored without pkChunking");
        }
        return Ok(None);
    }
    if directives.is_empty() {
        return Ok(Some("true".to_owned()));
    }
    Ok(Some(directives.join("; ")))
}

fn content_type(prep: &Preparation<'_>) -> Result<ContentType> {
    let text: String = prep.required(CONTENT_TYPE, Ignore)?;
    ContentType::parse(&text).ok_or_else(|| {
        DispatchError::invalid_parameter(CONTENT_TYPE, format!("unknown content type '{text}'"))
    })
}

fn job_id(id: String) -> Result<JobId> {
    identifier(JOB_ID, id, JobId::new)
}

fn batch_id(id: String) -> Result<BatchId> {
    identifier(BATCH_ID, id, BatchId::new)
}
