//! Blocking cursor over paginated query results.
//!
//! The backend answers through callbacks, but query results are consumed by
//! pulling. A [`QueryCursor`] drains the page it holds and, when that page is
//! exhausted and the server reported more, dispatches one `queryMore` call and
//! blocks the current thread until it completes.
//!
//! Cursors block, so they must not be driven from inside an async runtime;
//! use a plain thread or `tokio::task::spawn_blocking`.

use std::collections::VecDeque;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::codec::{PayloadCodec, ResponseType, TypeBinding};
use crate::dispatcher::Dispatcher;
use crate::message::{Headers, Message};
use crate::operation::Operation;
use crate::params::SOBJECT_QUERY;
use crate::payload::Payload;
use crate::DispatchError;

/// XML root element of a query result page.
const PAGE_ROOT: &str = "QueryResult";

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecords<T> {
    /// Total number of matching records across all pages.
    #[serde(default)]
    pub total_size: u64,
    /// `true` if this is the last page.
    #[serde(default)]
    pub done: bool,
    /// Locator of the next page, present while `done` is `false`.
    #[serde(default)]
    pub next_records_url: Option<String>,
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
}

/// Pull iterator over every record of a paginated query.
///
/// Not safe for concurrent use; at most one page fetch is in flight.
pub struct QueryCursor<T> {
    more: Dispatcher,
    headers: Headers,
    buffer: VecDeque<T>,
    done: bool,
    next_records_url: Option<String>,
}

impl<T> QueryCursor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Runs a `query` or `queryAll` call and wraps its first page.
    ///
    /// The message's headers are reused for every following page, with the
    /// query parameter replaced by the page locator.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Configuration`] if `dispatcher` serves another operation.
    /// - Any error completing the first call.
    /// - [`DispatchError::Decode`] if the payload is not a page of `T`.
    pub fn open(dispatcher: &Dispatcher, message: Message) -> Result<Self, DispatchError> {
        let operation = dispatcher.operation();
        if !matches!(operation, Operation::Query | Operation::QueryAll) {
            return Err(DispatchError::configuration(format!(
                "a query cursor needs a query or queryAll dispatcher, not {operation}"
            )));
        }

        let headers = message.headers().clone();
        let payload = dispatcher.call_blocking(message).into_result()?;
        let page = into_page(operation, dispatcher.codec().as_ref(), payload)?;
        Ok(Self::from_first_page(
            dispatcher.for_operation(Operation::QueryMore),
            headers,
            page,
        ))
    }

    /// Wraps a page that has already been fetched.
    ///
    /// `more` fetches following pages; `headers` are sent with each of them.
    pub fn from_first_page(more: Dispatcher, headers: Headers, page: QueryRecords<T>) -> Self {
        let mut cursor = Self {
            more,
            headers,
            buffer: VecDeque::new(),
            done: true,
            next_records_url: None,
        };
        cursor.load(page);
        cursor
    }

    /// Returns `true` while the current page has records or more pages remain.
    pub fn has_next(&self) -> bool {
        !self.buffer.is_empty() || !self.done
    }

    /// The next record, fetching the next page if needed.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoMoreElements`] once every record has been returned.
    /// - Any error of the page fetch. The locator is kept, so a later call
    ///   retries the same page.
    pub fn next_record(&mut self) -> Result<T, DispatchError> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(record);
            }
            if self.done {
                return Err(DispatchError::NoMoreElements);
            }
            self.fetch_next_page()?;
        }
    }

    fn fetch_next_page(&mut self) -> Result<(), DispatchError> {
        let Some(locator) = self.next_records_url.clone() else {
            self.done = true;
            return Err(DispatchError::decode(
                Operation::QueryMore.as_str(),
                std::any::type_name::<QueryRecords<T>>(),
                "page is not done but has no next records locator",
            ));
        };

        let mut message = Message::new();
        *message.headers_mut() = self.headers.clone();
        message
            .headers_mut()
            .insert(SOBJECT_QUERY.to_owned(), Value::String(locator));
        debug!(buffered = self.buffer.len(), "Fetching next query page");

        let payload = self.more.call_blocking(message).into_result()?;
        let page = into_page(Operation::QueryMore, self.more.codec().as_ref(), payload)?;
        self.load(page);
        Ok(())
    }

    fn load(&mut self, page: QueryRecords<T>) {
        debug!(
            records = page.records.len(),
            total_size = page.total_size,
            done = page.done,
            "Loaded query page"
        );
        self.buffer.extend(page.records);
        self.done = page.done;
        self.next_records_url = page.next_records_url;
    }
}

impl<T> Iterator for QueryCursor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = Result<T, DispatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_record())
    }
}

impl<T> fmt::Debug for QueryCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCursor")
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .field("next_records_url", &self.next_records_url)
            .finish_non_exhaustive()
    }
}

/// Extracts a page from a call's payload, decoding a raw stream or converting
/// a JSON document if needed.
fn into_page<T>(
    operation: Operation,
    codec: &dyn PayloadCodec,
    payload: Payload,
) -> Result<QueryRecords<T>, DispatchError>
where
    T: DeserializeOwned + Send + 'static,
{
    let expected = std::any::type_name::<QueryRecords<T>>();
    let payload = match payload {
        Payload::Stream(bytes) => {
            let page_type = ResponseType::Concrete(TypeBinding::of::<QueryRecords<T>>(PAGE_ROOT));
            codec
                .decode(bytes, Some(&page_type), None)
                .map_err(|source| DispatchError::decode(operation.as_str(), expected, source))?
        }
        other => other,
    };

    match payload {
        Payload::Record(record) => record
            .downcast::<QueryRecords<T>>()
            .or_else(|record| match record.downcast::<Value>() {
                Ok(document) => serde_json::from_value(document)
                    .map_err(|source| DispatchError::decode(operation.as_str(), expected, source)),
                Err(record) => Err(DispatchError::decode(
                    operation.as_str(),
                    expected,
                    format!("page decoded as {}", record.type_name()),
                )),
            }),
        Payload::Empty => Err(DispatchError::decode(
            operation.as_str(),
            expected,
            "no result page",
        )),
        Payload::Stream(_) | Payload::Records(_) => Err(DispatchError::decode(
            operation.as_str(),
            expected,
            "result page is not a single record",
        )),
    }
}
