//! Bulk API job and batch documents.

use serde::{Deserialize, Serialize};

/// Data operation a bulk job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkOperation {
    Insert,
    Update,
    Upsert,
    Delete,
    HardDelete,
    Query,
    QueryAll,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Open,
    Closed,
    Aborted,
    Failed,
}

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Queued,
    InProgress,
    Completed,
    Failed,
    NotProcessed,
}

/// Format of batch request and result data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Xml,
    Csv,
    Json,
    ZipXml,
    ZipCsv,
    ZipJson,
}

impl ContentType {
    /// Parses the wire name (`"CSV"`, `"ZIP_XML"`), ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "XML" => Some(Self::Xml),
            "CSV" => Some(Self::Csv),
            "JSON" => Some(Self::Json),
            "ZIP_XML" => Some(Self::ZipXml),
            "ZIP_CSV" => Some(Self::ZipCsv),
            "ZIP_JSON" => Some(Self::ZipJson),
            _ => None,
        }
    }

    /// MIME type sent with batch data of this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::ZipXml => "zip/xml",
            Self::ZipCsv => "zip/csv",
            Self::ZipJson => "zip/json",
        }
    }
}

/// A bulk job, as created and reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobInfo {
    pub id: Option<String>,
    pub operation: Option<BulkOperation>,
    pub object: Option<String>,
    pub external_id_field_name: Option<String>,
    pub state: Option<JobState>,
    pub content_type: Option<ContentType>,
    pub created_date: Option<String>,
    pub number_batches_total: Option<u32>,
    pub number_batches_completed: Option<u32>,
    pub number_records_processed: Option<u64>,
    pub number_records_failed: Option<u64>,
}

impl JobInfo {
    /// Document that moves a job to `state`.
    pub fn state_change(state: JobState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}

/// A batch within a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchInfo {
    pub id: Option<String>,
    pub job_id: Option<String>,
    pub state: Option<BatchState>,
    pub state_message: Option<String>,
    pub created_date: Option<String>,
    pub number_records_processed: Option<u64>,
    pub number_records_failed: Option<u64>,
}
