//! `BackendClient` over HTTP.

use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch::backend::{BackendClient, BackendRequest, BackendResponse, ResponseCallback};
use dispatch::propagation::ResponseHeaders;
use dispatch::{ApiVersion, BackendError};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

use crate::errors::ClientError;
use crate::routes::{route, Credentials};
use crate::token::AccessTokenSource;

/// Header carrying the session token on Bulk API calls.
const SESSION_HEADER: &str = "X-SFDC-Session";

/// Sends backend calls with `reqwest` on a tokio runtime.
///
/// Every call runs as a task on `runtime`; its callback is invoked from that
/// task. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    instance_url: Url,
    api_version: ApiVersion,
    tokens: Arc<dyn AccessTokenSource>,
    runtime: Handle,
}

impl HttpBackend {
    /// Creates a backend for one instance.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidInstanceUrl`] if `instance_url` does not parse.
    /// - [`ClientError::NotABase`] if it cannot carry a path.
    /// - [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(
        instance_url: &str,
        api_version: ApiVersion,
        tokens: Arc<dyn AccessTokenSource>,
        runtime: Handle,
    ) -> Result<Self, ClientError> {
        let instance_url =
            Url::parse(instance_url).map_err(|source| ClientError::InvalidInstanceUrl {
                url: instance_url.to_owned(),
                source,
            })?;
        if instance_url.cannot_be_a_base() {
            return Err(ClientError::NotABase {
                url: instance_url.to_string(),
            });
        }
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                instance_url,
                api_version,
                tokens,
                runtime,
            }),
        })
    }

    async fn send(&self, request: BackendRequest) -> BackendResponse {
        let operation = request.operation();
        match self.try_send(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(operation = operation.as_str(), error = %error, "Backend call failed before a response");
                BackendResponse::failed(error)
            }
        }
    }

    async fn try_send(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let inner = &self.inner;
        let route = route(&request.call);
        let url = route
            .url(&inner.instance_url, inner.api_version)
            .map_err(|error| BackendError::transport(error.to_string()))?;
        let token = inner
            .tokens
            .access_token()
            .await
            .map_err(|error| BackendError::transport(error.to_string()))?;

        let mime_type = request.format.mime_type();
        let mut builder = inner.http.request(route.method.clone(), url.clone());
        builder = match route.api.credentials() {
            Credentials::Bearer => builder.bearer_auth(token),
            Credentials::Session => builder.header(SESSION_HEADER, token),
        };
        builder = builder.header(ACCEPT, mime_type);
        for (name, values) in &request.headers {
            for value in values {
                builder = builder.header(name, value);
            }
        }
        for (name, value) in &route.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, route.content_type.unwrap_or(mime_type))
                .body(body);
        }

        debug!(method = %route.method, url = %url, "Sending HTTP request");
        let response = builder
            .send()
            .await
            .map_err(|error| BackendError::transport(error.to_string()))?;

        let status = response.status();
        let headers = response_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|error| BackendError::transport(error.to_string()))?;
        debug!(status = status.as_u16(), body_len = body.len(), "Received HTTP response");

        if status.is_success() {
            return Ok(BackendResponse {
                body: (!body.is_empty()).then_some(body),
                headers,
                error: None,
            });
        }

        let reason = status.canonical_reason().unwrap_or("request failed");
        let mut error = BackendError::status(status.as_u16(), reason);
        if !body.is_empty() {
            error = error.with_body(body);
        }
        Ok(BackendResponse {
            body: None,
            headers,
            error: Some(error),
        })
    }
}

impl BackendClient for HttpBackend {
    fn execute(&self, request: BackendRequest, on_response: ResponseCallback) {
        let backend = self.clone();
        self.inner.runtime.spawn(async move {
            let response = backend.send(request).await;
            on_response(response);
        });
    }
}

/// Flattens response headers, joining repeated values with `", "`.
fn response_headers(headers: &HeaderMap) -> ResponseHeaders {
    let mut flattened: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flattened
            .entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }
    flattened
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::token::StaticToken;

    #[test]
    fn repeated_response_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("sforce-limit-info", HeaderValue::from_static("api-usage=1/100"));
        headers.append("warning", HeaderValue::from_static("a"));
        headers.append("warning", HeaderValue::from_static("b"));

        let flattened = response_headers(&headers);

        assert_eq!(flattened["sforce-limit-info"], "api-usage=1/100");
        assert_eq!(flattened["warning"], "a, b");
    }

    #[tokio::test]
    async fn instance_url_must_parse() {
        let error = HttpBackend::new(
            "not a url",
            ApiVersion::DEFAULT,
            Arc::new(StaticToken::new("token")),
            Handle::current(),
        )
        .expect_err("invalid URL");
        assert!(matches!(error, ClientError::InvalidInstanceUrl { .. }));
    }

    #[tokio::test]
    async fn instance_url_must_carry_a_path() {
        let error = HttpBackend::new(
            "mailto:ops@example.com",
            ApiVersion::DEFAULT,
            Arc::new(StaticToken::new("token")),
            Handle::current(),
        )
        .expect_err("not a base");
        assert!(matches!(error, ClientError::NotABase { .. }));
    }
}
