//! Operation dispatch engine for the REST, Bulk, and Composite APIs.
//!
//! A caller hands a [`Message`] to a [`Dispatcher`] bound to one
//! [`Operation`]. The dispatcher resolves the call's parameters, encodes the
//! body, sends the request through a [`BackendClient`], and later decodes the
//! answer, merges response headers, restores any fields it cleared, and fires
//! the caller's completion callback exactly once.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no network I/O. The
//! backend is reached only through the [`BackendClient`] port; the
//! `rest-client` crate supplies the HTTP implementation.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`operation`] | The closed set of operations and their families |
//! | [`params`] | Parameter names and the header/config/body resolver |
//! | [`codec`] | JSON and XML codecs, response types, the type registry |
//! | [`dispatcher`] | Per-call state machine and operation handlers |
//! | [`cursor`] | Blocking cursor over paginated query results |
//! | [`propagation`] | Header forwarding and field capture/restore |
//! | [`backend`] | The backend port: requests, responses, callbacks |
//! | [`message`] | Inbound message, headers, and body shapes |
//! | [`payload`] | Decoded response payloads |
//! | [`sobject`] | Domain record capability trait and field tables |
//! | [`bulk`] | Bulk job and batch documents |
//! | [`config`] | Endpoint configuration |
//! | [`identifiers`] | Newtype identifiers (`RecordId`, `JobId`, `CallId`, ...) |
//! | [`types`] | Shared value types (`ApiVersion`, `PayloadFormat`, ...) |
//! | [`errors`] | Error taxonomy |

pub mod backend;
pub mod bulk;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod errors;
pub mod identifiers;
pub mod message;
pub mod operation;
pub mod params;
pub mod payload;
pub mod propagation;
pub mod sobject;
pub mod types;

// Re-export the everyday surface at the crate root.
pub use backend::{BackendCall, BackendClient, BackendRequest, BackendResponse, ResponseCallback};
pub use codec::{PayloadCodec, ResponseType, TypeBinding, TypeRegistry};
pub use config::{EndpointConfig, OptionValue};
pub use cursor::{QueryCursor, QueryRecords};
pub use dispatcher::{CallState, Completion, CompletionSignal, Dispatcher};
pub use errors::{BackendError, DispatchError, ErrorKind, RestError};
pub use identifiers::{
    BatchId, CallId, JobId, RecordId, ReportId, ReportInstanceId, ResultId, SObjectName,
};
pub use message::{Body, Headers, Message};
pub use operation::{Operation, OperationFamily};
pub use payload::{AnyRecord, Payload};
pub use sobject::{SObject, SharedSObject};
pub use types::{ApiVersion, NotFoundBehaviour, PayloadFormat};
