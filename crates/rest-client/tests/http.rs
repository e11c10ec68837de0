//! HTTP backend against a mock server.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use dispatch::backend::{BackendCall, BackendClient, BackendRequest, BackendResponse};
use dispatch::{
    ApiVersion, Dispatcher, EndpointConfig, ErrorKind, Message, Operation, PayloadFormat,
    RecordId, SObjectName, TypeRegistry,
};
use rest_client::{HttpBackend, StaticToken};
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(base: &str) -> HttpBackend {
    HttpBackend::new(
        base,
        ApiVersion::DEFAULT,
        Arc::new(StaticToken::new("00Dx!token")),
        Handle::current(),
    )
    .expect("backend")
}

fn request(call: BackendCall) -> BackendRequest {
    BackendRequest {
        call,
        body: None,
        format: PayloadFormat::Json,
        headers: BTreeMap::new(),
    }
}

async fn execute(backend: &HttpBackend, request: BackendRequest) -> BackendResponse {
    let (sender, receiver) = oneshot::channel();
    backend.execute(
        request,
        Box::new(move |response| {
            let _ = sender.send(response);
        }),
    );
    receiver.await.expect("callback invoked")
}

fn get_account() -> BackendCall {
    BackendCall::GetSObject {
        object: SObjectName::new("Account").expect("name"),
        id: RecordId::new("001xx").expect("id"),
        fields: vec!["Id".to_owned(), "Name".to_owned()],
    }
}

#[tokio::test]
async fn rest_calls_send_bearer_credentials_and_return_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v56.0/sobjects/Account/001xx"))
        .and(query_param("fields", "Id,Name"))
        .and(header("authorization", "Bearer 00Dx!token"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"Id":"001xx","Name":"Acme"}"#)
                .insert_header("Sforce-Limit-Info", "api-usage=18/5000"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = execute(&backend(&server.uri()), request(get_account())).await;

    assert!(response.error.is_none());
    assert_eq!(
        response.body.as_deref(),
        Some(&br#"{"Id":"001xx","Name":"Acme"}"#[..])
    );
    assert_eq!(response.headers["sforce-limit-info"], "api-usage=18/5000");
}

#[tokio::test]
async fn bulk_calls_send_the_session_header_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/async/56.0/job"))
        .and(header("x-sfdc-session", "00Dx!token"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"object":"Account","operation":"insert"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":"750x","state":"Open"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut create = request(BackendCall::CreateJob { pk_chunking: None });
    create.body = Some(Bytes::from_static(br#"{"object":"Account","operation":"insert"}"#));
    let response = execute(&backend(&server.uri()), create).await;

    assert!(response.error.is_none());
    assert!(response.body.is_some());
}

#[tokio::test]
async fn pk_chunked_jobs_send_the_chunking_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/async/56.0/job"))
        .and(header("sforce-enable-pkchunking", "chunkSize=50000"))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":"750x"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut create = request(BackendCall::CreateJob {
        pk_chunking: Some("chunkSize=50000".to_owned()),
    });
    create.body = Some(Bytes::from_static(br#"{"object":"Account","operation":"query"}"#));
    let response = execute(&backend(&server.uri()), create).await;

    assert!(response.error.is_none());
}

#[tokio::test]
async fn propagated_headers_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v56.0/limits"))
        .and(header("sforce-call-options", "client=sfcall"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let mut limits = request(BackendCall::Limits);
    limits
        .headers
        .insert("Sforce-Call-Options".to_owned(), vec!["client=sfcall".to_owned()]);
    let response = execute(&backend(&server.uri()), limits).await;

    assert!(response.error.is_none());
}

#[tokio::test]
async fn error_statuses_keep_the_body() {
    let server = MockServer::start().await;
    let body = r#"[{"errorCode":"NOT_FOUND","message":"The requested resource does not exist"}]"#;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string(body))
        .mount(&server)
        .await;

    let response = execute(&backend(&server.uri()), request(get_account())).await;

    let error = response.error.expect("status error");
    assert_eq!(error.status, Some(404));
    assert_eq!(error.body.as_deref(), Some(body.as_bytes()));
    assert!(response.body.is_none());
}

#[tokio::test]
async fn empty_success_bodies_are_absent() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let delete = request(BackendCall::DeleteSObject {
        object: SObjectName::new("Account").expect("name"),
        id: RecordId::new("001xx").expect("id"),
    });
    let response = execute(&backend(&server.uri()), delete).await;

    assert!(response.error.is_none());
    assert!(response.body.is_none());
}

#[tokio::test]
async fn unreachable_hosts_are_transport_errors() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let uri = format!("http://{}", listener.local_addr().expect("address"));
    drop(listener);

    let response = execute(&backend(&uri), request(BackendCall::Limits)).await;

    let error = response.error.expect("transport error");
    assert_eq!(error.status, None);
}

#[tokio::test]
async fn dispatcher_decodes_through_the_http_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/data/v56.0/sobjects/Account/001xx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Id":"001xx","Name":"Acme"}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v56.0/sobjects/Account/001gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"[{"errorCode":"NOT_FOUND","message":"gone"}]"#,
        ))
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        Operation::GetSObject,
        EndpointConfig::default(),
        TypeRegistry::new().with::<Value>("Account"),
        Arc::new(backend(&server.uri())),
    );

    let found = dispatcher
        .call(Message::new().with_header("sObjectName", "Account").with_body("001xx"))
        .await;
    let record = found
        .into_result()
        .expect("record")
        .into_record::<Value>()
        .expect("document");
    assert_eq!(record, json!({"Id": "001xx", "Name": "Acme"}));

    let missing = dispatcher
        .call(Message::new().with_header("sObjectName", "Account").with_body("001gone"))
        .await;
    let error = missing.error().expect("not found");
    assert_eq!(error.kind(), ErrorKind::Backend);
    assert_eq!(error.status(), Some(404));
    assert!(error.to_string().contains("NOT_FOUND"));
}
