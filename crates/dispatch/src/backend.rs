//! Backend port.
//!
//! The dispatcher never performs I/O itself. It hands a fully resolved
//! [`BackendRequest`] to a [`BackendClient`] together with a
//! [`ResponseCallback`]; the client answers exactly once, on any thread, at
//! any later time. `rest-client` provides the HTTP implementation.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::bulk::ContentType;
use crate::errors::BackendError;
use crate::identifiers::{
    BatchId, JobId, RecordId, ReportId, ReportInstanceId, ResultId, SObjectName,
};
use crate::operation::Operation;
use crate::propagation::{RequestHeaders, ResponseHeaders};
use crate::PayloadFormat;

/// One backend call with its resolved parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    // REST
    GetVersions,
    GetResources,
    GetGlobalObjects,
    GetBasicInfo {
        object: SObjectName,
    },
    GetDescription {
        object: SObjectName,
    },
    GetSObject {
        object: SObjectName,
        id: RecordId,
        /// Fields to return; empty means all.
        fields: Vec<String>,
    },
    CreateSObject {
        object: SObjectName,
    },
    UpdateSObject {
        object: SObjectName,
        id: RecordId,
    },
    DeleteSObject {
        object: SObjectName,
        id: RecordId,
    },
    GetSObjectWithId {
        object: SObjectName,
        field: String,
        value: String,
    },
    UpsertSObject {
        object: SObjectName,
        field: String,
        value: String,
    },
    DeleteSObjectWithId {
        object: SObjectName,
        field: String,
        value: String,
    },
    GetBlobField {
        object: SObjectName,
        id: RecordId,
        field: String,
    },
    Query {
        soql: String,
    },
    QueryMore {
        /// Continuation locator returned with the previous page.
        next_records_url: String,
    },
    QueryAll {
        soql: String,
    },
    Search {
        sosl: String,
    },
    ApexCall {
        method: String,
        /// Path below the APEX REST root, templates already expanded.
        url: String,
        query: BTreeMap<String, String>,
    },
    Recent {
        limit: Option<u32>,
    },
    Limits,
    Approval,
    Approvals,

    // Bulk
    CreateJob {
        /// `Sforce-Enable-PKChunking` header value, when chunking is enabled.
        pk_chunking: Option<String>,
    },
    GetJob {
        job: JobId,
    },
    CloseJob {
        job: JobId,
    },
    AbortJob {
        job: JobId,
    },
    CreateBatch {
        job: JobId,
        content_type: ContentType,
    },
    GetBatch {
        job: JobId,
        batch: BatchId,
    },
    GetAllBatches {
        job: JobId,
    },
    GetRequest {
        job: JobId,
        batch: BatchId,
    },
    GetResults {
        job: JobId,
        batch: BatchId,
    },
    CreateBatchQuery {
        job: JobId,
        content_type: ContentType,
    },
    GetQueryResultIds {
        job: JobId,
        batch: BatchId,
    },
    GetQueryResult {
        job: JobId,
        batch: BatchId,
        result: ResultId,
    },

    // Composite
    Composite,
    CompositeBatch,
    CompositeTree {
        object: SObjectName,
    },
    CompositeCreateSObjectCollections {
        all_or_none: bool,
    },
    CompositeUpdateSObjectCollections {
        all_or_none: bool,
    },
    CompositeUpsertSObjectCollections {
        object: SObjectName,
        field: String,
        all_or_none: bool,
    },
    CompositeRetrieveSObjectCollections {
        object: SObjectName,
        ids: Vec<String>,
        fields: Vec<String>,
    },
    CompositeDeleteSObjectCollections {
        ids: Vec<String>,
        all_or_none: bool,
    },

    // Reports
    GetRecentReports,
    GetReportDescription {
        report: ReportId,
    },
    ExecuteSyncReport {
        report: ReportId,
        include_details: Option<bool>,
        /// Whether metadata travels in the request body.
        with_metadata: bool,
    },
    ExecuteAsyncReport {
        report: ReportId,
        include_details: Option<bool>,
    },
    GetReportInstances {
        report: ReportId,
    },
    GetReportResults {
        report: ReportId,
        instance: ReportInstanceId,
    },

    // Raw
    Raw {
        method: String,
        path: String,
        query: BTreeMap<String, String>,
        headers: BTreeMap<String, String>,
    },
}

impl BackendCall {
    /// The operation this call serves.
    pub fn operation(&self) -> Operation {
        match self {
            Self::GetVersions => Operation::GetVersions,
            Self::GetResources => Operation::GetResources,
            Self::GetGlobalObjects => Operation::GetGlobalObjects,
            Self::GetBasicInfo { .. } => Operation::GetBasicInfo,
            Self::GetDescription { .. } => Operation::GetDescription,
            Self::GetSObject { .. } => Operation::GetSObject,
            Self::CreateSObject { .. } => Operation::CreateSObject,
            Self::UpdateSObject { .. } => Operation::UpdateSObject,
            Self::DeleteSObject { .. } => Operation::DeleteSObject,
            Self::GetSObjectWithId { .. } => Operation::GetSObjectWithId,
            Self::UpsertSObject { .. } => Operation::UpsertSObject,
            Self::DeleteSObjectWithId { .. } => Operation::DeleteSObjectWithId,
            Self::GetBlobField { .. } => Operation::GetBlobField,
            Self::Query { .. } => Operation::Query,
            Self::QueryMore { .. } => Operation::QueryMore,
            Self::QueryAll { .. } => Operation::QueryAll,
            Self::Search { .. } => Operation::Search,
            Self::ApexCall { .. } => Operation::ApexCall,
            Self::Recent { .. } => Operation::Recent,
            Self::Limits => Operation::Limits,
            Self::Approval => Operation::Approval,
            Self::Approvals => Operation::Approvals,
            Self::CreateJob { .. } => Operation::CreateJob,
            Self::GetJob { .. } => Operation::GetJob,
            Self::CloseJob { .. } => Operation::CloseJob,
            Self::AbortJob { .. } => Operation::AbortJob,
            Self::CreateBatch { .. } => Operation::CreateBatch,
            Self::GetBatch { .. } => Operation::GetBatch,
            Self::GetAllBatches { .. } => Operation::GetAllBatches,
            Self::GetRequest { .. } => Operation::GetRequest,
            Self::GetResults { .. } => Operation::GetResults,
            Self::CreateBatchQuery { .. } => Operation::CreateBatchQuery,
            Self::GetQueryResultIds { .. } => Operation::GetQueryResultIds,
            Self::GetQueryResult { .. } => Operation::GetQueryResult,
            Self::Composite => Operation::Composite,
            Self::CompositeBatch => Operation::CompositeBatch,
            Self::CompositeTree { .. } => Operation::CompositeTree,
            Self::CompositeCreateSObjectCollections { .. } => {
                Operation::CompositeCreateSObjectCollections
            }
            Self::CompositeUpdateSObjectCollections { .. } => {
                Operation::CompositeUpdateSObjectCollections
            }
            Self::CompositeUpsertSObjectCollections { .. } => {
                Operation::CompositeUpsertSObjectCollections
            }
            Self::CompositeRetrieveSObjectCollections { .. } => {
                Operation::CompositeRetrieveSObjectCollections
            }
            Self::CompositeDeleteSObjectCollections { .. } => {
                Operation::CompositeDeleteSObjectCollections
            }
            Self::GetRecentReports => Operation::GetRecentReports,
            Self::GetReportDescription { .. } => Operation::GetReportDescription,
            Self::ExecuteSyncReport { .. } => Operation::ExecuteSyncReport,
            Self::ExecuteAsyncReport { .. } => Operation::ExecuteAsyncReport,
            Self::GetReportInstances { .. } => Operation::GetReportInstances,
            Self::GetReportResults { .. } => Operation::GetReportResults,
            Self::Raw { .. } => Operation::Raw,
        }
    }
}

/// A call ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// What to call.
    pub call: BackendCall,
    /// Encoded request body, if the call sends one.
    pub body: Option<Bytes>,
    /// Wire format of `body` and of the expected response.
    pub format: PayloadFormat,
    /// Inbound headers forwarded on the request.
    pub headers: RequestHeaders,
}

impl BackendRequest {
    /// The operation this request serves.
    pub fn operation(&self) -> Operation {
        self.call.operation()
    }
}

/// The backend's single answer to one request.
#[derive(Debug, Default)]
pub struct BackendResponse {
    /// Response body, if any.
    pub body: Option<Bytes>,
    /// Response headers.
    pub headers: ResponseHeaders,
    /// Set when the call failed.
    pub error: Option<BackendError>,
}

impl BackendResponse {
    /// A successful response with a body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// A successful response without a body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A failed response.
    pub fn failed(error: BackendError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Adds a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Receives the backend's answer; invoked at most once.
pub type ResponseCallback = Box<dyn FnOnce(BackendResponse) + Send + 'static>;

/// Issues backend calls.
///
/// Implementations must eventually invoke `on_response` exactly once per
/// request. Dropping it uninvoked is tolerated: the dispatcher then completes
/// the call with a backend error.
pub trait BackendClient: Send + Sync + fmt::Debug {
    /// Sends `request`, answering through `on_response`.
    fn execute(&self, request: BackendRequest, on_response: ResponseCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_report_their_operation() {
        let call = BackendCall::GetQueryResult {
            job: JobId::new("750x").expect("non-empty"),
            batch: BatchId::new("751x").expect("non-empty"),
            result: ResultId::new("752x").expect("non-empty"),
        };
        assert_eq!(call.operation(), Operation::GetQueryResult);
        assert_eq!(BackendCall::Limits.operation(), Operation::Limits);
    }

    #[test]
    fn response_builders_set_one_outcome() {
        let ok = BackendResponse::ok("{}").with_header("Sforce-Limit-Info", "api-usage=1/100");
        assert!(ok.error.is_none());
        assert_eq!(ok.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(ok.headers["Sforce-Limit-Info"], "api-usage=1/100");

        let failed = BackendResponse::failed(BackendError::status(500, "boom"));
        assert!(failed.body.is_none());
        assert_eq!(failed.error.and_then(|error| error.status), Some(500));
    }
}
