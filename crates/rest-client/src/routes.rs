//! Mapping from backend calls to HTTP requests.
//!
//! | Family | Root | Credentials |
//! |--------|------|-------------|
//! | REST, Composite | `/services/data/v{version}/` | `Authorization: Bearer` |
//! | Bulk | `/services/async/{version}/` | `X-SFDC-Session` |
//! | APEX | `/services/apexrest/` | `Authorization: Bearer` |
//!
//! [`route`] is pure; [`HttpRoute::url`] joins a route onto the instance URL.

use dispatch::backend::BackendCall;
use dispatch::ApiVersion;
use reqwest::Method;
use tracing::warn;
use url::Url;

use crate::errors::ClientError;

/// API a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Rest,
    Bulk,
    Apex,
}

/// How a route authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `X-SFDC-Session: <token>`.
    Session,
}

impl Api {
    pub fn credentials(self) -> Credentials {
        match self {
            Self::Rest | Self::Apex => Credentials::Bearer,
            Self::Bulk => Credentials::Session,
        }
    }

    fn root(self, version: ApiVersion) -> Vec<String> {
        match self {
            Self::Rest => vec!["services".into(), "data".into(), format!("v{version}")],
            Self::Bulk => vec!["services".into(), "async".into(), version.to_string()],
            Self::Apex => vec!["services".into(), "apexrest".into()],
        }
    }
}

/// Path of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePath {
    /// Unencoded segments below the API root.
    Segments(Vec<String>),
    /// Absolute path on the instance, already encoded.
    Literal(String),
}

/// Method, location, and extra headers of one HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRoute {
    pub method: Method,
    pub api: Api,
    pub path: RoutePath,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Overrides the format's MIME type for the request body.
    pub content_type: Option<&'static str>,
}

impl HttpRoute {
    fn new(method: Method, api: Api, segments: &[&str]) -> Self {
        Self {
            method,
            api,
            path: RoutePath::Segments(segments.iter().map(|segment| (*segment).to_owned()).collect()),
            query: Vec::new(),
            headers: Vec::new(),
            content_type: None,
        }
    }

    fn rest(method: Method, segments: &[&str]) -> Self {
        Self::new(method, Api::Rest, segments)
    }

    fn bulk(method: Method, segments: &[&str]) -> Self {
        Self::new(method, Api::Bulk, segments)
    }

    fn literal(method: Method, api: Api, path: String) -> Self {
        Self {
            path: RoutePath::Literal(path),
            ..Self::new(method, api, &[])
        }
    }

    fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_owned(), value.into()));
        self
    }

    fn with_optional_query<T: ToString>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.with_query(name, value.to_string()),
            None => self,
        }
    }

    fn with_list(self, name: &str, values: &[String]) -> Self {
        if values.is_empty() {
            return self;
        }
        self.with_query(name, values.join(","))
    }

    /// Full request URL on `instance`.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotABase`] if `instance` cannot carry a path.
    pub fn url(&self, instance: &Url, version: ApiVersion) -> Result<Url, ClientError> {
        let mut url = instance.clone();
        match &self.path {
            RoutePath::Literal(path) => url.set_path(path),
            RoutePath::Segments(segments) => {
                let mut path = url.path_segments_mut().map_err(|()| ClientError::NotABase {
                    url: instance.to_string(),
                })?;
                path.clear()
                    .extend(self.api.root(version))
                    .extend(segments);
            }
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// The HTTP request serving one backend call.
pub fn route(call: &BackendCall) -> HttpRoute {
    use BackendCall as C;

    match call {
        C::GetVersions => HttpRoute::literal(Method::GET, Api::Rest, "/services/data/".to_owned()),
        C::GetResources => HttpRoute::rest(Method::GET, &[""]),
        C::GetGlobalObjects => HttpRoute::rest(Method::GET, &["sobjects"]),
        C::GetBasicInfo { object } => HttpRoute::rest(Method::GET, &["sobjects", object.as_str()]),
        C::GetDescription { object } => {
            HttpRoute::rest(Method::GET, &["sobjects", object.as_str(), "describe"])
        }
        C::GetSObject { object, id, fields } => {
            HttpRoute::rest(Method::GET, &["sobjects", object.as_str(), id.as_str()])
                .with_list("fields", fields)
        }
        C::CreateSObject { object } => HttpRoute::rest(Method::POST, &["sobjects", object.as_str()]),
        C::UpdateSObject { object, id } => {
            HttpRoute::rest(Method::PATCH, &["sobjects", object.as_str(), id.as_str()])
        }
        C::DeleteSObject { object, id } => {
            HttpRoute::rest(Method::DELETE, &["sobjects", object.as_str(), id.as_str()])
        }
        C::GetSObjectWithId { object, field, value } => {
            HttpRoute::rest(Method::GET, &["sobjects", object.as_str(), field, value])
        }
        C::UpsertSObject { object, field, value } => {
            HttpRoute::rest(Method::PATCH, &["sobjects", object.as_str(), field, value])
        }
        C::DeleteSObjectWithId { object, field, value } => {
            HttpRoute::rest(Method::DELETE, &["sobjects", object.as_str(), field, value])
        }
        C::GetBlobField { object, id, field } => {
            HttpRoute::rest(Method::GET, &["sobjects", object.as_str(), id.as_str(), field])
        }
        C::Query { soql } => HttpRoute::rest(Method::GET, &["query"]).with_query("q", soql),
        C::QueryMore { next_records_url } => {
            HttpRoute::literal(Method::GET, Api::Rest, next_records_url.clone())
        }
        C::QueryAll { soql } => HttpRoute::rest(Method::GET, &["queryAll"]).with_query("q", soql),
        C::Search { sosl } => HttpRoute::rest(Method::GET, &["search"]).with_query("q", sosl),
        C::ApexCall { method, url, query } => {
            let mut route = HttpRoute::literal(
                parse_method(method),
                Api::Apex,
                format!("/services/apexrest/{}", url.trim_start_matches('/')),
            );
            route.query = query.iter().map(|(name, value)| (name.clone(), value.clone())).collect();
            route
        }
        C::Recent { limit } => {
            let route = HttpRoute::rest(Method::GET, &["recent"]);
            match limit {
                Some(limit) => route.with_query("limit", limit.to_string()),
                None => route,
            }
        }
        C::Limits => HttpRoute::rest(Method::GET, &["limits"]),
        C::Approval => HttpRoute::rest(Method::POST, &["process", "approvals"]),
        C::Approvals => HttpRoute::rest(Method::GET, &["process", "approvals"]),

        C::CreateJob { pk_chunking } => {
            let mut route = HttpRoute::bulk(Method::POST, &["job"]);
            if let Some(directives) = pk_chunking {
                route.headers.push((PK_CHUNKING_HEADER.to_owned(), directives.clone()));
            }
            route
        }
        C::GetJob { job } => HttpRoute::bulk(Method::GET, &["job", job.as_str()]),
        C::CloseJob { job } | C::AbortJob { job } => {
            HttpRoute::bulk(Method::POST, &["job", job.as_str()])
        }
        C::CreateBatch { job, content_type } | C::CreateBatchQuery { job, content_type } => {
            HttpRoute {
                content_type: Some(content_type.mime_type()),
                ..HttpRoute::bulk(Method::POST, &["job", job.as_str(), "batch"])
            }
        }
        C::GetBatch { job, batch } => {
            HttpRoute::bulk(Method::GET, &["job", job.as_str(), "batch", batch.as_str()])
        }
        C::GetAllBatches { job } => HttpRoute::bulk(Method::GET, &["job", job.as_str(), "batch"]),
        C::GetRequest { job, batch } => HttpRoute::bulk(
            Method::GET,
            &["job", job.as_str(), "batch", batch.as_str(), "request"],
        ),
        C::GetResults { job, batch } | C::GetQueryResultIds { job, batch } => HttpRoute::bulk(
            Method::GET,
            &["job", job.as_str(), "batch", batch.as_str(), "result"],
        ),
        C::GetQueryResult { job, batch, result } => HttpRoute::bulk(
            Method::GET,
            &["job", job.as_str(), "batch", batch.as_str(), "result", result.as_str()],
        ),

        C::Composite => HttpRoute::rest(Method::POST, &["composite"]),
        C::CompositeBatch => HttpRoute::rest(Method::POST, &["composite", "batch"]),
        C::CompositeTree { object } => {
            HttpRoute::rest(Method::POST, &["composite", "tree", object.as_str()])
        }
        C::CompositeCreateSObjectCollections { .. } => {
            HttpRoute::rest(Method::POST, &["composite", "sobjects"])
        }
        C::CompositeUpdateSObjectCollections { .. } => {
            HttpRoute::rest(Method::PATCH, &["composite", "sobjects"])
        }
        C::CompositeUpsertSObjectCollections { object, field, .. } => {
            HttpRoute::rest(Method::PATCH, &["composite", "sobjects", object.as_str(), field])
        }
        C::CompositeRetrieveSObjectCollections { object, ids, fields } => {
            HttpRoute::rest(Method::GET, &["composite", "sobjects", object.as_str()])
                .with_list("ids", ids)
                .with_list("fields", fields)
        }
        C::CompositeDeleteSObjectCollections { ids, all_or_none } => {
            HttpRoute::rest(Method::DELETE, &["composite", "sobjects"])
                .with_list("ids", ids)
                .with_query("allOrNone", all_or_none.to_string())
        }

        C::GetRecentReports => HttpRoute::rest(Method::GET, &["analytics", "reports"]),
        C::GetReportDescription { report } => {
            HttpRoute::rest(Method::GET, &["analytics", "reports", report.as_str(), "describe"])
        }
        C::ExecuteSyncReport {
            report,
            include_details,
            with_metadata,
        } => {
            let method = if *with_metadata { Method::POST } else { Method::GET };
            HttpRoute::rest(method, &["analytics", "reports", report.as_str()])
                .with_optional_query("includeDetails", *include_details)
        }
        C::ExecuteAsyncReport {
            report,
            include_details,
        } => HttpRoute::rest(Method::POST, &["analytics", "reports", report.as_str(), "instances"])
            .with_optional_query("includeDetails", *include_details),
        C::GetReportInstances { report } => {
            HttpRoute::rest(Method::GET, &["analytics", "reports", report.as_str(), "instances"])
        }
        C::GetReportResults { report, instance } => HttpRoute::rest(
            Method::GET,
            &["analytics", "reports", report.as_str(), "instances", instance.as_str()],
        ),

        C::Raw {
            method,
            path,
            query,
            headers,
        } => {
            let mut route = HttpRoute::literal(parse_method(method), Api::Rest, path.clone());
            route.query = query.iter().map(|(name, value)| (name.clone(), value.clone())).collect();
            route.headers = headers.iter().map(|(name, value)| (name.clone(), value.clone())).collect();
            route
        }
    }
}

/// Parses a method name; an invalid token falls back to GET.
/// Header that turns on primary-key chunking for a bulk query job.
pub const PK_CHUNKING_HEADER: &str = "Sforce-Enable-PKChunking";

/// Handlers validate method tokens, so the fallback only covers calls built
/// by hand.
fn parse_method(name: &str) -> Method {
    Method::from_bytes(name.as_bytes()).unwrap_or_else(|_| {
        warn!(method = name, "Not an HTTP method token, sending GET");
        Method::GET
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use dispatch::bulk::ContentType;
    use dispatch::{BatchId, JobId, RecordId, ReportId, ReportInstanceId, SObjectName};
    use rstest::rstest;

    use super::*;

    fn instance() -> Url {
        Url::parse("https://acme.my.example.com").expect("valid instance URL")
    }

    fn name(text: &str) -> SObjectName {
        SObjectName::new(text).expect("non-empty")
    }

    fn job() -> JobId {
        JobId::new("750x").expect("non-empty")
    }

    fn report() -> ReportId {
        ReportId::new("00Ox0000000a1").expect("non-empty")
    }

    #[rstest]
    #[case(BackendCall::GetVersions, Method::GET, "/services/data/", None)]
    #[case(BackendCall::Limits, Method::GET, "/services/data/v56.0/limits", None)]
    #[case(
        BackendCall::GetSObject {
            object: name("Account"),
            id: RecordId::new("001xx").expect("id"),
            fields: vec!["Id".into(), "Name".into()],
        },
        Method::GET,
        "/services/data/v56.0/sobjects/Account/001xx",
        Some("fields=Id%2CName")
    )]
    #[case(
        BackendCall::UpsertSObject {
            object: name("Line_Item__c"),
            field: "Name".into(),
            value: "ext/1".into(),
        },
        Method::PATCH,
        "/services/data/v56.0/sobjects/Line_Item__c/Name/ext%2F1",
        None
    )]
    #[case(
        BackendCall::Query { soql: "SELECT Id FROM Account".into() },
        Method::GET,
        "/services/data/v56.0/query",
        Some("q=SELECT+Id+FROM+Account")
    )]
    #[case(
        BackendCall::QueryMore { next_records_url: "/services/data/v56.0/query/01gx-2000".into() },
        Method::GET,
        "/services/data/v56.0/query/01gx-2000",
        None
    )]
    #[case(BackendCall::CreateJob { pk_chunking: None }, Method::POST, "/services/async/56.0/job", None)]
    #[case(BackendCall::GetRecentReports, Method::GET, "/services/data/v56.0/analytics/reports", None)]
    #[case(
        BackendCall::GetReportDescription { report: report() },
        Method::GET,
        "/services/data/v56.0/analytics/reports/00Ox0000000a1/describe",
        None
    )]
    #[case(
        BackendCall::ExecuteSyncReport { report: report(), include_details: Some(true), with_metadata: false },
        Method::GET,
        "/services/data/v56.0/analytics/reports/00Ox0000000a1",
        Some("includeDetails=true")
    )]
    #[case(
        BackendCall::ExecuteSyncReport { report: report(), include_details: None, with_metadata: true },
        Method::POST,
        "/services/data/v56.0/analytics/reports/00Ox0000000a1",
        None
    )]
    #[case(
        BackendCall::ExecuteAsyncReport { report: report(), include_details: Some(false) },
        Method::POST,
        "/services/data/v56.0/analytics/reports/00Ox0000000a1/instances",
        Some("includeDetails=false")
    )]
    #[case(
        BackendCall::GetReportResults {
            report: report(),
            instance: ReportInstanceId::new("0LGx01").expect("id"),
        },
        Method::GET,
        "/services/data/v56.0/analytics/reports/00Ox0000000a1/instances/0LGx01",
        None
    )]
    #[case(
        BackendCall::GetBatch { job: job(), batch: BatchId::new("751x").expect("id") },
        Method::GET,
        "/services/async/56.0/job/750x/batch/751x",
        None
    )]
    #[case(
        BackendCall::CompositeDeleteSObjectCollections {
            ids: vec!["001a".into(), "001b".into()],
            all_or_none: true,
        },
        Method::DELETE,
        "/services/data/v56.0/composite/sobjects",
        Some("ids=001a%2C001b&allOrNone=true")
    )]
    fn calls_route_to_urls(
        #[case] call: BackendCall,
        #[case] method: Method,
        #[case] path: &str,
        #[case] query: Option<&str>,
    ) {
        let route = route(&call);
        let url = route.url(&instance(), ApiVersion::DEFAULT).expect("url");

        assert_eq!(route.method, method);
        assert_eq!(url.path(), path);
        assert_eq!(url.query(), query);
    }

    #[test]
    fn apex_calls_keep_their_encoded_path_and_method() {
        let call = BackendCall::ApexCall {
            method: "PUT".into(),
            url: "/Invoices/INV%207".into(),
            query: BTreeMap::from([("verbose".to_owned(), "true".to_owned())]),
        };
        let route = route(&call);
        let url = route.url(&instance(), ApiVersion::DEFAULT).expect("url");

        assert_eq!(route.method, Method::PUT);
        assert_eq!(route.api.credentials(), Credentials::Bearer);
        assert_eq!(url.as_str(), "https://acme.my.example.com/services/apexrest/Invoices/INV%207?verbose=true");
    }

    #[test]
    fn batches_carry_their_content_type_and_session_credentials() {
        let route = route(&BackendCall::CreateBatch {
            job: job(),
            content_type: ContentType::Csv,
        });
        assert_eq!(route.content_type, Some("text/csv"));
        assert_eq!(route.api.credentials(), Credentials::Session);
    }

    #[test]
    fn pk_chunking_travels_as_a_job_header() {
        let plain = route(&BackendCall::CreateJob { pk_chunking: None });
        assert!(plain.headers.is_empty());

        let chunked = route(&BackendCall::CreateJob {
            pk_chunking: Some("chunkSize=50000; startRow=001x".into()),
        });
        assert_eq!(
            chunked.headers,
            [(PK_CHUNKING_HEADER.to_owned(), "chunkSize=50000; startRow=001x".to_owned())]
        );
    }

    #[test]
    fn unknown_method_tokens_fall_back_to_get() {
        assert_eq!(parse_method("PATCH"), Method::PATCH);
        assert_eq!(parse_method("GET /x"), Method::GET);
    }

    #[test]
    fn raw_routes_forward_headers() {
        let route = route(&BackendCall::Raw {
            method: "GET".into(),
            path: "/services/data/v56.0/limits".into(),
            query: BTreeMap::new(),
            headers: BTreeMap::from([("X-Trace".to_owned(), "t-1".to_owned())]),
        });
        assert_eq!(route.headers, [("X-Trace".to_owned(), "t-1".to_owned())]);
    }
}
