use ferrodav_core::{BackendError, PropertyName};
use serde::Serialize;

/// Per-resource result of one engine step. Every engine code path maps
/// to exactly one of these; no other statuses exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Created,
    Overwritten,
    CannotOverwrite,
    CreateFailed,
    TargetDeleteFailed,
    /// Destination kind differs from the source kind; nothing was
    /// touched.
    OverwriteFailed,
    PropSetFailed,
    CleanupFailed,
}

impl OutcomeStatus {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Created | Self::Overwritten)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Overwritten => "overwritten",
            Self::CannotOverwrite => "cannot-overwrite",
            Self::CreateFailed => "create-failed",
            Self::TargetDeleteFailed => "target-delete-failed",
            Self::OverwriteFailed => "overwrite-failed",
            Self::PropSetFailed => "prop-set-failed",
            Self::CleanupFailed => "cleanup-failed",
        }
    }
}

/// Result for one visited document.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub url: String,
    pub status: OutcomeStatus,
    pub error: Option<BackendError>,
    pub failed_properties: Vec<PropertyName>,
}

impl DocumentOutcome {
    pub(crate) fn with_status(url: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            url: url.into(),
            status,
            error: None,
            failed_properties: Vec::new(),
        }
    }

    pub(crate) fn failed(
        url: impl Into<String>,
        status: OutcomeStatus,
        error: BackendError,
    ) -> Self {
        Self {
            url: url.into(),
            status,
            error: Some(error),
            failed_properties: Vec::new(),
        }
    }
}

/// Result for one visited collection, carrying the ordered outcomes of
/// its children. Child lists mirror source enumeration order and hold
/// one entry per source child regardless of individual failures.
#[derive(Debug)]
pub struct CollectionOutcome {
    pub url: String,
    pub status: OutcomeStatus,
    pub error: Option<BackendError>,
    pub failed_properties: Vec<PropertyName>,
    pub documents: Vec<DocumentOutcome>,
    pub collections: Vec<CollectionOutcome>,
}

impl CollectionOutcome {
    pub(crate) fn with_status(url: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            url: url.into(),
            status,
            error: None,
            failed_properties: Vec::new(),
            documents: Vec::new(),
            collections: Vec::new(),
        }
    }

    pub(crate) fn failed(
        url: impl Into<String>,
        status: OutcomeStatus,
        error: BackendError,
    ) -> Self {
        let mut outcome = Self::with_status(url, status);
        outcome.error = Some(error);
        outcome
    }
}

/// Outcome of a top-level engine invocation.
#[derive(Debug)]
pub enum Outcome {
    Document(DocumentOutcome),
    Collection(CollectionOutcome),
}

impl Outcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Document(document) => &document.url,
            Self::Collection(collection) => &collection.url,
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        match self {
            Self::Document(document) => document.status,
            Self::Collection(collection) => collection.status,
        }
    }

    /// Depth-first (url, status) rows for every visited resource,
    /// documents before sub-collections within each collection. This
    /// is the order a multi-status response renders in.
    pub fn statuses(&self) -> Vec<(&str, OutcomeStatus)> {
        match self {
            Self::Document(document) => vec![(document.url.as_str(), document.status)],
            Self::Collection(collection) => {
                let mut rows = Vec::new();
                flatten(collection, &mut rows);
                rows
            }
        }
    }
}

fn flatten<'a>(collection: &'a CollectionOutcome, rows: &mut Vec<(&'a str, OutcomeStatus)>) {
    rows.push((collection.url.as_str(), collection.status));
    for document in &collection.documents {
        rows.push((document.url.as_str(), document.status));
    }
    for child in &collection.collections {
        flatten(child, rows);
    }
}
