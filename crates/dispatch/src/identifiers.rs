//! Newtype identifiers.
//!
//! Every value that names a remote resource is a distinct newtype wrapping a
//! `String`. This keeps a [`RecordId`] from being passed where a [`JobId`] is
//! expected even though both are opaque strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: remote resources
// ---------------------------------------------------------------------------

string_id! {
    /// API name of an object type (e.g. `"Account"`, `"Line_Item__c"`).
    SObjectName
}

string_id! {
    /// Record identifier assigned by the remote service (15 or 18 characters).
    RecordId
}

string_id! {
    /// Identifies a Bulk API job.
    JobId
}

string_id! {
    /// Identifies a batch within a Bulk API job.
    BatchId
}

string_id! {
    /// Identifies one result set of a Bulk API query batch.
    ResultId
}

string_id! {
    /// Identifies an analytics report.
    ReportId
}

string_id! {
    /// Identifies one asynchronous run of a report.
    ReportInstanceId
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed, generated locally
// ---------------------------------------------------------------------------

/// Identifies a single dispatched call.
///
/// Generated fresh for every `process()` invocation and recorded on the call's
/// tracing span, so that a completion running on a transport thread can be
/// correlated with the request that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a new random call identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(SObjectName::new("").is_none());
        assert!(RecordId::new(String::new()).is_none());
    }

    #[test]
    fn identifiers_display_their_value() {
        let id = RecordId::new("001xx").expect("non-empty");
        assert_eq!(id.as_str(), "001xx");
        assert_eq!(id.to_string(), "001xx");
    }

    #[test]
    fn call_ids_are_unique() {
        assert_ne!(CallId::new_random(), CallId::new_random());
    }
}
