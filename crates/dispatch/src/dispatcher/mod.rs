//! Operation dispatcher.
//!
//! A [`Dispatcher`] serves one [`Operation`] on one endpoint. Each call to
//! [`Dispatcher::process`] runs the same lifecycle:
//!
//! 1. **Preparing.** The operation's handler resolves parameters, captures
//!    and clears transient fields, encodes the body, and picks a response
//!    type. Any failure completes the call immediately and `process` returns
//!    `true`.
//! 2. **Dispatched.** The request goes to the [`BackendClient`]; `process`
//!    returns `false`.
//! 3. **Completing.** On the backend's answer (any thread), the response is
//!    decoded, headers are merged, and captured fields are restored.
//! 4. **Done / Failed.** The completion signal fires exactly once.
//!
//! Handlers are plain functions selected by operation in [`handler_for`]; the
//! lifecycle itself lives only here and in `context`.

mod bulk;
mod composite;
mod context;
mod raw;
mod reports;
mod rest;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info_span};

pub use self::context::{CallState, Completion, CompletionSignal};
use self::context::CallContext;

use crate::backend::{BackendCall, BackendClient, BackendRequest};
use crate::codec::{codec_for, encode_body, encode_value, PayloadCodec, ResponseType, TypeBinding, TypeRegistry};
use crate::errors::BackendError;
use crate::identifiers::CallId;
use crate::message::{Message, RESPONSE_ALIAS};
use crate::operation::Operation;
use crate::params::{BodyFallback, Param, ParameterResolver, SOBJECT_CLASS};
use crate::propagation::{propagated_headers, RestorableField};
use crate::sobject::SharedSObject;
use crate::{DispatchError, EndpointConfig};

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatches calls of one operation to a backend.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    operation: Operation,
    config: Arc<EndpointConfig>,
    codec: Arc<dyn PayloadCodec>,
    registry: Arc<TypeRegistry>,
    backend: Arc<dyn BackendClient>,
}

impl Dispatcher {
    /// Creates a dispatcher using the codec for the configured format.
    pub fn new(
        operation: Operation,
        config: EndpointConfig,
        registry: TypeRegistry,
        backend: Arc<dyn BackendClient>,
    ) -> Self {
        let codec = codec_for(config.format);
        Self {
            operation,
            config: Arc::new(config),
            codec,
            registry: Arc::new(registry),
            backend,
        }
    }

    /// Creates a dispatcher for an operation given by wire name.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownOperation`] if the name matches no operation.
    pub fn for_name(
        name: &str,
        config: EndpointConfig,
        registry: TypeRegistry,
        backend: Arc<dyn BackendClient>,
    ) -> Result<Self, DispatchError> {
        Ok(Self::new(Operation::parse(name)?, config, registry, backend))
    }

    /// Replaces the codec, e.g. to share one XML alias table between dispatchers.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// A dispatcher for another operation on the same endpoint, sharing
    /// configuration, codec, registry, and backend.
    #[must_use]
    pub fn for_operation(&self, operation: Operation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    /// The operation served.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The endpoint configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// The codec in use.
    pub fn codec(&self) -> &Arc<dyn PayloadCodec> {
        &self.codec
    }

    /// Starts one call.
    ///
    /// `on_done` is invoked exactly once. Returns `true` if it has already
    /// been invoked (the call failed while preparing), `false` if it will be
    /// invoked later by the backend's answer.
    pub fn process<F>(&self, message: Message, on_done: F) -> bool
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let call_id = CallId::new_random();
        let span = info_span!(
            "dispatch",
            operation = self.operation.as_str(),
            family = self.operation.family().as_str(),
            %call_id,
        );
        let _entered = span.enter();

        let mut context = CallContext::new(
            call_id,
            self.operation,
            message.headers().clone(),
            self.config.not_found_behaviour,
            span.clone(),
            Box::new(on_done),
        );

        let mut preparation = Preparation::new(
            self.operation,
            &message,
            &self.config,
            self.codec.as_ref(),
            &self.registry,
        );
        let handler = handler_for(self.operation);
        let prepared = panic::catch_unwind(AssertUnwindSafe(|| handler(&mut preparation)))
            .unwrap_or_else(|payload| {
                let error = DispatchError::PreparationPanicked {
                    operation: self.operation.as_str().to_owned(),
                    message: panic_message(payload.as_ref()),
                };
                error!(error = %error, "Operation handler panicked");
                Err(error)
            });
        context.restore_on_completion(preparation.into_restorable());

        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                context.fail_synchronously(error);
                return true;
            }
        };

        let alias = message
            .property(RESPONSE_ALIAS)
            .and_then(Value::as_str)
            .map(str::to_owned);
        context.expect_response(prepared.response, alias);

        let request = BackendRequest {
            call: prepared.call,
            body: prepared.body,
            format: self.codec.format(),
            headers: propagated_headers(message.headers()),
        };
        debug!(
            body_len = request.body.as_ref().map(Bytes::len),
            propagated = request.headers.len(),
            "Dispatching backend call"
        );

        context.dispatched();
        let codec = Arc::clone(&self.codec);
        self.backend.execute(
            request,
            Box::new(move |response| context.complete(response, codec.as_ref())),
        );
        false
    }

    /// Runs one call and waits for its completion.
    pub async fn call(&self, message: Message) -> Completion {
        let (sender, receiver) = oneshot::channel();
        self.process(message, move |completion| {
            let _ = sender.send(completion);
        });
        receiver.await.unwrap_or_else(|_| abandoned())
    }

    /// Runs one call, blocking the current thread until it completes.
    ///
    /// Must not be called from within an async runtime.
    pub fn call_blocking(&self, message: Message) -> Completion {
        let (sender, receiver) = oneshot::channel();
        self.process(message, move |completion| {
            let _ = sender.send(completion);
        });
        receiver.blocking_recv().unwrap_or_else(|_| abandoned())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-text panic payload".to_owned()
    }
}

fn abandoned() -> Completion {
    Completion {
        outcome: Err(BackendError::transport("call was abandoned before completing").into()),
        headers: Default::default(),
        warnings: Vec::new(),
        synchronous: false,
    }
}

// ---------------------------------------------------------------------------
// Handler table
// ---------------------------------------------------------------------------

/// Builds the backend request for one operation.
pub(crate) type Handler = fn(&mut Preparation<'_>) -> Result<Prepared, DispatchError>;

/// Routing table from operation to handler.
pub(crate) fn handler_for(operation: Operation) -> Handler {
    use Operation as Op;

    match operation {
        Op::GetVersions => rest::get_versions,
        Op::GetResources => rest::get_resources,
        Op::GetGlobalObjects => rest::get_global_objects,
        Op::GetBasicInfo => rest::get_basic_info,
        Op::GetDescription => rest::get_description,
        Op::GetSObject => rest::get_sobject,
        Op::CreateSObject => rest::create_sobject,
        Op::UpdateSObject => rest::update_sobject,
        Op::DeleteSObject => rest::delete_sobject,
        Op::GetSObjectWithId => rest::get_sobject_with_id,
        Op::UpsertSObject => rest::upsert_sobject,
        Op::DeleteSObjectWithId => rest::delete_sobject_with_id,
        Op::GetBlobField => rest::get_blob_field,
        Op::Query => rest::query,
        Op::QueryMore => rest::query_more,
        Op::QueryAll => rest::query_all,
        Op::Search => rest::search,
        Op::ApexCall => rest::apex_call,
        Op::Recent => rest::recent,
        Op::Limits => rest::limits,
        Op::Approval => rest::approval,
        Op::Approvals => rest::approvals,

        Op::CreateJob => bulk::create_job,
        Op::GetJob => bulk::get_job,
        Op::CloseJob => bulk::close_job,
        Op::AbortJob => bulk::abort_job,
        Op::CreateBatch => bulk::create_batch,
        Op::GetBatch => bulk::get_batch,
        Op::GetAllBatches => bulk::get_all_batches,
        Op::GetRequest => bulk::get_request,
        Op::GetResults => bulk::get_results,
        Op::CreateBatchQuery => bulk::create_batch_query,
        Op::GetQueryResultIds => bulk::get_query_result_ids,
        Op::GetQueryResult => bulk::get_query_result,

        Op::Composite => composite::composite,
        Op::CompositeBatch => composite::composite_batch,
        Op::CompositeTree => composite::composite_tree,
        Op::CompositeCreateSObjectCollections => composite::create_collections,
        Op::CompositeUpdateSObjectCollections => composite::update_collections,
        Op::CompositeUpsertSObjectCollections => composite::upsert_collections,
        Op::CompositeRetrieveSObjectCollections => composite::retrieve_collections,
        Op::CompositeDeleteSObjectCollections => composite::delete_collections,

        Op::GetRecentReports => reports::get_recent_reports,
        Op::GetReportDescription => reports::get_report_description,
        Op::ExecuteSyncReport => reports::execute_sync_report,
        Op::ExecuteAsyncReport => reports::execute_async_report,
        Op::GetReportInstances => reports::get_report_instances,
        Op::GetReportResults => reports::get_report_results,

        Op::Raw => raw::raw,
    }
}

/// Output of a handler.
#[derive(Debug)]
pub(crate) struct Prepared {
    call: BackendCall,
    body: Option<Bytes>,
    response: Option<ResponseType>,
}

impl Prepared {
    /// A call with no body and no response to decode.
    pub(crate) fn call(call: BackendCall) -> Self {
        Self {
            call,
            body: None,
            response: None,
        }
    }

    #[must_use]
    pub(crate) fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub(crate) fn with_optional_body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub(crate) fn expecting(mut self, response: ResponseType) -> Self {
        self.response = Some(response);
        self
    }
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// What a handler works with while preparing one call.
pub(crate) struct Preparation<'a> {
    operation: Operation,
    params: ParameterResolver<'a>,
    codec: &'a dyn PayloadCodec,
    registry: &'a TypeRegistry,
    restorable: Vec<RestorableField>,
}

impl<'a> Preparation<'a> {
    fn new(
        operation: Operation,
        message: &'a Message,
        config: &'a EndpointConfig,
        codec: &'a dyn PayloadCodec,
        registry: &'a TypeRegistry,
    ) -> Self {
        Self {
            operation,
            params: ParameterResolver::new(message, config),
            codec,
            registry,
            restorable: Vec::new(),
        }
    }

    fn into_restorable(self) -> Vec<RestorableField> {
        self.restorable
    }

    pub(crate) fn params(&self) -> &ParameterResolver<'a> {
        &self.params
    }

    pub(crate) fn message(&self) -> &'a Message {
        self.params.message()
    }

    pub(crate) fn config(&self) -> &'a EndpointConfig {
        self.params.config()
    }

    pub(crate) fn required<T: Param>(&self, name: &str, body: BodyFallback) -> Result<T, DispatchError> {
        self.params.required(name, body)
    }

    pub(crate) fn optional<T: Param>(
        &self,
        name: &str,
        body: BodyFallback,
    ) -> Result<Option<T>, DispatchError> {
        self.params.optional(name, body)
    }

    /// The domain record carried in the body, if any.
    pub(crate) fn sobject(&self) -> Option<SharedSObject> {
        self.message().body().as_sobject().cloned()
    }

    /// Captures the record's identifier for restoration.
    pub(crate) fn capture_id(&mut self, object: &SharedSObject) {
        self.restorable.push(RestorableField::capture_id(object));
    }

    /// Captures and clears a named field; returns its prior value.
    pub(crate) fn take_field(
        &mut self,
        object: &SharedSObject,
        field: &str,
    ) -> Result<Value, DispatchError> {
        let captured = RestorableField::take(object, field)?;
        let value = captured.value();
        self.restorable.push(captured);
        Ok(value)
    }

    /// Encodes the message body.
    pub(crate) fn encode_body(&self, root: &str) -> Result<Bytes, DispatchError> {
        debug!(
            operation = self.operation.as_str(),
            root,
            body = self.message().body().type_name(),
            "Encoding request body"
        );
        encode_body(self.codec, root, self.message().body())
    }

    /// Encodes a typed request document.
    pub(crate) fn encode_value<T: Serialize>(&self, root: &str, value: &T) -> Result<Bytes, DispatchError> {
        encode_value(self.codec, root, value)
    }

    fn raw_payload(&self) -> bool {
        self.config().raw_payload
    }

    /// The undecoded stream.
    pub(crate) fn raw(&self) -> ResponseType {
        ResponseType::Raw
    }

    /// A schemaless document.
    pub(crate) fn document(&self) -> ResponseType {
        if self.raw_payload() {
            return ResponseType::Raw;
        }
        ResponseType::Concrete(TypeBinding::document())
    }

    /// One `T`, expected under XML root `alias`.
    pub(crate) fn typed<T: DeserializeOwned + Send + 'static>(&self, alias: &str) -> ResponseType {
        if self.raw_payload() {
            return ResponseType::Raw;
        }
        ResponseType::Concrete(TypeBinding::of::<T>(alias))
    }

    /// A list of `T`.
    pub(crate) fn list_of<T: DeserializeOwned + Send + 'static>(&self, alias: &str) -> ResponseType {
        if self.raw_payload() {
            return ResponseType::Raw;
        }
        ResponseType::ListOf(TypeBinding::of::<T>(alias))
    }

    /// The type registered for an object name.
    pub(crate) fn registered(&self, name: &str) -> Result<ResponseType, DispatchError> {
        if self.raw_payload() {
            return Ok(ResponseType::Raw);
        }
        Ok(ResponseType::Concrete(self.registry.resolve(name)?))
    }

    /// A list of the type registered for an object name.
    pub(crate) fn registered_list(&self, name: &str) -> Result<ResponseType, DispatchError> {
        if self.raw_payload() {
            return Ok(ResponseType::Raw);
        }
        Ok(ResponseType::ListOf(self.registry.resolve(name)?))
    }

    /// The type registered under the mandatory `sObjectClass` parameter.
    pub(crate) fn response_class(&self) -> Result<ResponseType, DispatchError> {
        if self.raw_payload() {
            return Ok(ResponseType::Raw);
        }
        let class: String = self.required(SOBJECT_CLASS, BodyFallback::Ignore)?;
        Ok(ResponseType::Concrete(self.registry.resolve(&class)?))
    }
}

/// Wraps a resolved value in an identifier newtype, rejecting empty text.
pub(crate) fn identifier<T>(
    name: &str,
    value: String,
    make: impl FnOnce(String) -> Option<T>,
) -> Result<T, DispatchError> {
    make(value).ok_or_else(|| DispatchError::invalid_parameter(name, "must not be empty"))
}

/// Upper-cases an HTTP method, rejecting text that is not a method token.
pub(crate) fn http_method(name: &str, value: &str) -> Result<String, DispatchError> {
    let token = |byte: u8| byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte);
    if value.is_empty() || !value.bytes().all(token) {
        return Err(DispatchError::invalid_parameter(
            name,
            format!("'{value}' is not an HTTP method"),
        ));
    }
    Ok(value.to_ascii_uppercase())
}

/// Text form of a header or field value.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
