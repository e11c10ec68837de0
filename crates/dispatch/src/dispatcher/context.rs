//! Per-call state and the exactly-once completion guard.

use std::mem;

use bytes::Bytes;
use tracing::{debug, warn, Span};

use crate::backend::BackendResponse;
use crate::codec::{PayloadCodec, ResponseType, TypeBinding};
use crate::errors::{BackendError, RestError};
use crate::identifiers::CallId;
use crate::message::Headers;
use crate::operation::Operation;
use crate::payload::Payload;
use crate::propagation::{merge_response_headers, restore_all, RestorableField};
use crate::{DispatchError, NotFoundBehaviour};

/// What a call's completion signal receives.
#[derive(Debug)]
pub struct Completion {
    /// Decoded payload, or the terminal error.
    pub outcome: Result<Payload, DispatchError>,
    /// Inbound headers overlaid with the backend's response headers.
    pub headers: Headers,
    /// Secondary failures that did not change the outcome, such as fields
    /// that could not be restored.
    pub warnings: Vec<DispatchError>,
    /// `true` if the call completed before `process()` returned.
    pub synchronous: bool,
}

impl Completion {
    /// Returns `true` if the outcome is a payload.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The outcome's error, if any.
    pub fn error(&self) -> Option<&DispatchError> {
        self.outcome.as_ref().err()
    }

    /// Discards headers and warnings.
    pub fn into_result(self) -> Result<Payload, DispatchError> {
        self.outcome
    }
}

/// Single-use completion callback.
pub type CompletionSignal = Box<dyn FnOnce(Completion) + Send + 'static>;

/// Lifecycle of one call.
///
/// `Preparing -> Dispatched -> Completing -> Done`, or `Failed` from any
/// state before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Preparing,
    Dispatched,
    Completing,
    Done,
    Failed,
}

impl CallState {
    /// Lower-case state name, used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Dispatched => "dispatched",
            Self::Completing => "completing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// State owned by one in-flight call.
///
/// Dropping a context that has not signalled completes the call with a
/// backend error, so the signal fires exactly once even if the backend
/// discards its callback.
pub(crate) struct CallContext {
    call_id: CallId,
    operation: Operation,
    state: CallState,
    inbound: Headers,
    restorable: Vec<RestorableField>,
    response: Option<ResponseType>,
    alias: Option<String>,
    not_found: NotFoundBehaviour,
    span: Span,
    signal: Option<CompletionSignal>,
}

impl CallContext {
    pub(crate) fn new(
        call_id: CallId,
        operation: Operation,
        inbound: Headers,
        not_found: NotFoundBehaviour,
        span: Span,
        signal: CompletionSignal,
    ) -> Self {
        Self {
            call_id,
            operation,
            state: CallState::Preparing,
            inbound,
            restorable: Vec::new(),
            response: None,
            alias: None,
            not_found,
            span,
            signal: Some(signal),
        }
    }

    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    pub(crate) fn restore_on_completion(&mut self, fields: Vec<RestorableField>) {
        self.restorable.extend(fields);
    }

    pub(crate) fn expect_response(&mut self, response: Option<ResponseType>, alias: Option<String>) {
        self.response = response;
        self.alias = alias;
    }

    fn transition(&mut self, next: CallState) {
        debug_assert!(!self.state.is_terminal(), "transition out of a terminal state");
        debug!(
            call_id = %self.call_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Call state transition"
        );
        self.state = next;
    }

    pub(crate) fn dispatched(&mut self) {
        self.transition(CallState::Dispatched);
    }

    /// Ends the call before anything was sent.
    pub(crate) fn fail_synchronously(mut self, error: DispatchError) {
        let warnings = restore_all(mem::take(&mut self.restorable));
        let headers = self.inbound.clone();
        self.finish(Err(error), headers, warnings, true);
    }

    /// Handles the backend's answer.
    pub(crate) fn complete(mut self, response: BackendResponse, codec: &dyn PayloadCodec) {
        let span = self.span.clone();
        let _entered = span.enter();
        self.transition(CallState::Completing);

        let BackendResponse {
            body,
            headers,
            error,
        } = response;

        let outcome = match error {
            Some(error) if error.is_not_found() && self.not_found == NotFoundBehaviour::Null => {
                debug!(call_id = %self.call_id, "Not found reported as empty payload");
                Ok(Payload::Empty)
            }
            Some(error) => Err(self.backend_failure(error, codec)),
            None => self.decode(body, codec),
        };

        let merged = merge_response_headers(&self.inbound, &headers);
        let warnings = restore_all(mem::take(&mut self.restorable));
        self.finish(outcome, merged, warnings, false);
    }

    fn decode(&self, body: Option<Bytes>, codec: &dyn PayloadCodec) -> Result<Payload, DispatchError> {
        let Some(response) = &self.response else {
            return Ok(Payload::Empty);
        };
        let body = match body {
            Some(body) if !body.is_empty() || *response == ResponseType::Raw => body,
            _ => return Ok(Payload::Empty),
        };
        codec
            .decode(body, Some(response), self.alias.as_deref())
            .map_err(|source| {
                let error = DispatchError::decode(self.operation.as_str(), response.describe(), source);
                warn!(call_id = %self.call_id, error = %error, "Response decoding failed");
                error
            })
    }

    /// Attaches structured errors from the body; a body that cannot be parsed
    /// only wins over a failure that has no status.
    fn backend_failure(&self, mut error: BackendError, codec: &dyn PayloadCodec) -> DispatchError {
        let Some(body) = error.body.clone().filter(|body| !body.is_empty()) else {
            return error.into();
        };
        if !error.errors.is_empty() {
            return error.into();
        }

        let errors = ResponseType::ListOf(TypeBinding::of::<RestError>("Error"));
        match codec
            .decode(body, Some(&errors), None)
            .map(|payload| payload.into_records::<RestError>())
        {
            Ok(Some(entries)) => {
                error.errors = entries;
                error.into()
            }
            Ok(None) => error.into(),
            Err(source) if error.status.is_none() => {
                DispatchError::decode(self.operation.as_str(), "error response", source)
            }
            Err(source) => {
                debug!(
                    call_id = %self.call_id,
                    status = error.status,
                    error = %source,
                    "Error response body is not structured"
                );
                error.into()
            }
        }
    }

    fn finish(
        &mut self,
        outcome: Result<Payload, DispatchError>,
        headers: Headers,
        warnings: Vec<DispatchError>,
        synchronous: bool,
    ) {
        let Some(signal) = self.signal.take() else {
            return;
        };
        match &outcome {
            Ok(_) => {
                self.transition(CallState::Done);
            }
            Err(error) => {
                self.transition(CallState::Failed);
                warn!(
                    call_id = %self.call_id,
                    operation = self.operation.as_str(),
                    kind = ?error.kind(),
                    status = error.status(),
                    error = %error,
                    synchronous,
                    "Call failed"
                );
            }
        }
        signal(Completion {
            outcome,
            headers,
            warnings,
            synchronous,
        });
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        if self.signal.is_none() {
            return;
        }
        let span = self.span.clone();
        let _entered = span.enter();
        let synchronous = self.state == CallState::Preparing;
        let warnings = restore_all(mem::take(&mut self.restorable));
        let headers = self.inbound.clone();
        self.finish(
            Err(BackendError::transport("response callback dropped without an answer").into()),
            headers,
            warnings,
            synchronous,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde::Deserialize;

    use super::*;
    use crate::codec::JsonCodec;
    use crate::ErrorKind;

    type Seen = Arc<Mutex<Vec<Completion>>>;

    fn context(not_found: NotFoundBehaviour) -> (CallContext, Seen) {
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        let context = CallContext::new(
            CallId::new_random(),
            Operation::GetSObject,
            Headers::from([("Sforce-Auto-Assign".to_owned(), "false".into())]),
            not_found,
            Span::none(),
            Box::new(move |completion| sink.lock().push(completion)),
        );
        (context, seen)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Versioned {
        version: String,
    }

    #[test]
    fn dropped_context_signals_once() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.dispatched();
        drop(context);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].error().map(DispatchError::kind), Some(ErrorKind::Backend));
        assert!(!seen[0].synchronous);
    }

    #[test]
    fn synchronous_failure_is_flagged() {
        let (context, seen) = context(NotFoundBehaviour::Exception);
        assert_eq!(context.state(), CallState::Preparing);
        context.fail_synchronously(DispatchError::missing_parameter("sObjectId", true));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].synchronous);
        assert_eq!(seen[0].error().map(DispatchError::kind), Some(ErrorKind::Parameter));
    }

    #[test]
    fn response_headers_are_merged_on_completion() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.expect_response(
            Some(ResponseType::Concrete(TypeBinding::of::<Versioned>("Versioned"))),
            None,
        );
        context.dispatched();
        context.complete(
            BackendResponse::ok(r#"{"version":"56.0"}"#).with_header("Sforce-Limit-Info", "1/100"),
            &JsonCodec,
        );

        let mut seen = seen.lock();
        let completion = seen.pop().expect("signalled");
        assert_eq!(completion.headers["Sforce-Auto-Assign"], "false");
        assert_eq!(completion.headers["Sforce-Limit-Info"], "1/100");
        let record = completion.into_result().expect("decoded").into_record::<Versioned>();
        assert_eq!(record, Some(Versioned { version: "56.0".to_owned() }));
    }

    #[test]
    fn decode_failure_overrides_backend_success() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.expect_response(
            Some(ResponseType::Concrete(TypeBinding::of::<Versioned>("Versioned"))),
            None,
        );
        context.dispatched();
        context.complete(BackendResponse::ok("not json"), &JsonCodec);

        let seen = seen.lock();
        let error = seen[0].error().expect("decode error");
        assert_eq!(error.kind(), ErrorKind::Decode);
        assert!(error.to_string().contains("getSObject"));
    }

    #[test]
    fn structured_error_body_keeps_status() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.dispatched();
        let body = Bytes::from_static(
            br#"[{"errorCode":"NOT_FOUND","message":"The requested resource does not exist"}]"#,
        );
        context.complete(
            BackendResponse::failed(BackendError::status(404, "Not Found").with_body(body)),
            &JsonCodec,
        );

        let seen = seen.lock();
        match seen[0].error() {
            Some(DispatchError::Backend(error)) => {
                assert_eq!(error.status, Some(404));
                assert_eq!(error.errors[0].error_code, "NOT_FOUND");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_error_body_keeps_status_when_present() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.dispatched();
        context.complete(
            BackendResponse::failed(
                BackendError::status(502, "Bad Gateway").with_body(Bytes::from_static(b"<html>")),
            ),
            &JsonCodec,
        );
        assert_eq!(seen.lock()[0].error().and_then(DispatchError::status), Some(502));
    }

    #[test]
    fn unparseable_error_body_without_status_is_a_decode_error() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.dispatched();
        context.complete(
            BackendResponse::failed(
                BackendError::transport("protocol violation").with_body(Bytes::from_static(b"\x00")),
            ),
            &JsonCodec,
        );
        assert_eq!(
            seen.lock()[0].error().map(DispatchError::kind),
            Some(ErrorKind::Decode)
        );
    }

    #[test]
    fn not_found_becomes_empty_when_configured() {
        let (mut context, seen) = context(NotFoundBehaviour::Null);
        context.dispatched();
        context.complete(
            BackendResponse::failed(BackendError::status(404, "Not Found")),
            &JsonCodec,
        );

        let seen = seen.lock();
        assert!(matches!(seen[0].outcome, Ok(Payload::Empty)));
    }

    #[test]
    fn operations_without_response_skip_decoding() {
        let (mut context, seen) = context(NotFoundBehaviour::Exception);
        context.expect_response(None, None);
        context.dispatched();
        context.complete(BackendResponse::ok("ignored"), &JsonCodec);

        assert!(matches!(seen.lock()[0].outcome, Ok(Payload::Empty)));
    }
}
