use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{BackendError, DocumentSource, Property, PropertyName};

/// Destination state at one URL: exactly one of missing, document or
/// collection. Operations that change the destination's kind consume
/// the handle and return a new one, so a stale handle cannot be
/// reused.
pub enum Target {
    Missing(Box<dyn MissingTarget>),
    Document(Box<dyn DocumentTarget>),
    Collection(CollectionHandle),
}

impl Target {
    /// Wraps an existing destination collection.
    pub fn collection(target: Box<dyn CollectionTarget>) -> Self {
        Self::Collection(CollectionHandle {
            target,
            created: false,
        })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Missing(missing) => missing.url(),
            Self::Document(document) => document.url(),
            Self::Collection(handle) => handle.target.url(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Missing(_) => "missing",
            Self::Document(_) => "document",
            Self::Collection(_) => "collection",
        }
    }
}

/// A destination collection plus whether the current operation created
/// it. Children of a collection created moments ago cannot exist, so
/// the engine skips existence probes under it.
pub struct CollectionHandle {
    pub target: Box<dyn CollectionTarget>,
    pub created: bool,
}

/// Destination URL with nothing at it.
#[async_trait]
pub trait MissingTarget: Send + Sync {
    fn url(&self) -> &str;

    /// Materializes `source` as a document at this URL.
    async fn create_document(
        self: Box<Self>,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DocumentTarget>, BackendError>;

    /// Creates an empty collection at this URL.
    async fn create_collection(
        self: Box<Self>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn CollectionTarget>, BackendError>;
}

/// Destination URL currently holding a document.
#[async_trait]
pub trait DocumentTarget: Send + Sync {
    fn url(&self) -> &str;

    async fn delete(
        self: Box<Self>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn MissingTarget>, BackendError>;

    /// Overwrites the document's content in place from `source`.
    async fn replace(
        self: Box<Self>,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn DocumentTarget>, BackendError>;

    async fn properties(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError>;

    /// Applies properties, returning the names the backend declined to
    /// set. A non-empty return is not an error.
    async fn write_properties(
        &mut self,
        properties: &[Property],
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyName>, BackendError>;
}

/// Destination URL currently holding a collection.
#[async_trait]
pub trait CollectionTarget: Send + Sync {
    fn url(&self) -> &str;

    async fn delete(
        self: Box<Self>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn MissingTarget>, BackendError>;

    /// Probes for a child entry of the given name.
    async fn child(&self, name: &str, cancel: &CancellationToken)
    -> Result<Target, BackendError>;

    /// Composes a missing-child handle without probing the backend,
    /// for children of a collection this operation just created.
    fn missing_child(&self, name: &str) -> Box<dyn MissingTarget>;

    async fn properties(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError>;

    async fn write_properties(
        &mut self,
        properties: &[Property],
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyName>, BackendError>;
}
