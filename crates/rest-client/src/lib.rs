//! HTTP adapter for the dispatch engine.
//!
//! Implements [`dispatch::backend::BackendClient`] with `reqwest`. Each
//! backend call is mapped to an HTTP request by [`routes::route`], sent on a
//! tokio runtime, and answered through the dispatcher's callback with the
//! response body and headers, or a `BackendError` carrying the status and
//! error body.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`routes`] | Pure mapping from backend calls to method, path, and query |
//! | [`backend`] | [`HttpBackend`], the `BackendClient` implementation |
//! | [`token`] | [`AccessTokenSource`] port and [`StaticToken`] |
//! | [`errors`] | Construction errors |

pub mod backend;
pub mod errors;
pub mod routes;
pub mod token;

pub use backend::HttpBackend;
pub use errors::{ClientError, TokenError};
pub use routes::{route, Api, Credentials, HttpRoute};
pub use token::{AccessTokenSource, StaticToken};
