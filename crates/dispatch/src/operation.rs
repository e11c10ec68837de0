//! Operation tags.
//!
//! An [`Operation`] names one backend capability. The set is closed and each
//! operation belongs to one [`OperationFamily`]. Operations are addressed by
//! their camelCase wire name (`"getSObject"`, `"createJob"`); parsing ignores
//! case.

use crate::DispatchError;

/// Backend capability group an operation is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationFamily {
    /// REST object CRUD, queries, search, APEX, approvals.
    Rest,
    /// Bulk API job and batch lifecycle.
    Bulk,
    /// Composite requests and sObject collections.
    Composite,
    /// Analytics reports.
    Reports,
    /// Arbitrary HTTP passthrough.
    Raw,
}

impl OperationFamily {
    /// Lower-case family name, used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Bulk => "bulk",
            Self::Composite => "composite",
            Self::Reports => "reports",
            Self::Raw => "raw",
        }
    }
}

// ---------------------------------------------------------------------------
// Generates the enum, its wire names, and its family table from one list.
// ---------------------------------------------------------------------------
macro_rules! operations {
    (
        $(
            $family:ident {
                $( $variant:ident => $name:literal, )+
            }
        )+
    ) => {
        /// One dispatchable operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Operation {
            $( $( #[doc = concat!("`", $name, "`")] $variant, )+ )+
        }

        impl Operation {
            /// Every operation, in declaration order.
            pub const ALL: &'static [Operation] = &[ $( $( Operation::$variant, )+ )+ ];

            /// Canonical camelCase wire name.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $( Self::$variant => $name, )+ )+
                }
            }

            /// Family serving this operation.
            pub fn family(self) -> OperationFamily {
                match self {
                    $( $( Self::$variant => OperationFamily::$family, )+ )+
                }
            }
        }
    };
}

operations! {
    Rest {
        GetVersions => "getVersions",
        GetResources => "getResources",
        GetGlobalObjects => "getGlobalObjects",
        GetBasicInfo => "getBasicInfo",
        GetDescription => "getDescription",
        GetSObject => "getSObject",
        CreateSObject => "createSObject",
        UpdateSObject => "updateSObject",
        DeleteSObject => "deleteSObject",
        GetSObjectWithId => "getSObjectWithId",
        UpsertSObject => "upsertSObject",
        DeleteSObjectWithId => "deleteSObjectWithId",
        GetBlobField => "getBlobField",
        Query => "query",
        QueryMore => "queryMore",
        QueryAll => "queryAll",
        Search => "search",
        ApexCall => "apexCall",
        Recent => "recent",
        Limits => "limits",
        Approval => "approval",
        Approvals => "approvals",
    }
    Bulk {
        CreateJob => "createJob",
        GetJob => "getJob",
        CloseJob => "closeJob",
        AbortJob => "abortJob",
        CreateBatch => "createBatch",
        GetBatch => "getBatch",
        GetAllBatches => "getAllBatches",
        GetRequest => "getRequest",
        GetResults => "getResults",
        CreateBatchQuery => "createBatchQuery",
        GetQueryResultIds => "getQueryResultIds",
        GetQueryResult => "getQueryResult",
    }
    Composite {
        Composite => "composite",
        CompositeBatch => "compositeBatch",
        CompositeTree => "compositeTree",
        CompositeCreateSObjectCollections => "compositeCreateSObjectCollections",
        CompositeUpdateSObjectCollections => "compositeUpdateSObjectCollections",
        CompositeUpsertSObjectCollections => "compositeUpsertSObjectCollections",
        CompositeRetrieveSObjectCollections => "compositeRetrieveSObjectCollections",
        CompositeDeleteSObjectCollections => "compositeDeleteSObjectCollections",
    }
    Reports {
        GetRecentReports => "getRecentReports",
        GetReportDescription => "getReportDescription",
        ExecuteSyncReport => "executeSyncReport",
        ExecuteAsyncReport => "executeAsyncReport",
        GetReportInstances => "getReportInstances",
        GetReportResults => "getReportResults",
    }
    Raw {
        Raw => "raw",
    }
}

impl Operation {
    /// Parses a wire name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownOperation`] if no operation has this name.
    pub fn parse(name: &str) -> Result<Self, DispatchError> {
        Self::ALL
            .iter()
            .copied()
            .find(|operation| operation.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| DispatchError::unknown_operation(name))
    }

    /// Returns `false` for operations whose response carries no body to decode.
    pub fn has_response(self) -> bool {
        !matches!(
            self,
            Self::UpdateSObject | Self::DeleteSObject | Self::DeleteSObjectWithId
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = DispatchError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::parse(name)
    }
}
