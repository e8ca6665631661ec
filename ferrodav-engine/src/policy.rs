use async_trait::async_trait;
use ferrodav_core::{
    BackendError, CollectionSource, CollectionTarget, DocumentSource, DocumentTarget,
    MissingTarget, PropertyName, SourceRemover, Target,
};
use tokio_util::sync::CancellationToken;

use crate::OutcomeStatus;

/// How the engine treats a destination that already holds a resource
/// of the source's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingTargetBehavior {
    /// Delete the destination, then run the missing-target path.
    RecreateFirst,
    /// Write into the existing destination.
    OverwriteInPlace,
}

/// Failure reported by a policy's overwrite step. The engine records
/// the carried status on the node unchanged, which lets a policy
/// distinguish e.g. a failed delete from a failed write.
#[derive(Debug)]
pub struct PolicyFailure {
    pub status: OutcomeStatus,
    pub error: BackendError,
}

impl PolicyFailure {
    pub fn new(status: OutcomeStatus, error: BackendError) -> Self {
        Self { status, error }
    }
}

impl From<BackendError> for PolicyFailure {
    fn from(error: BackendError) -> Self {
        Self::new(OutcomeStatus::CreateFailed, error)
    }
}

/// Verb-specific strategy plugged into the engine: one implementation
/// per operation (copy, move, delete). The engine drives the
/// traversal; the policy performs the action on each source/target
/// pair and decides which properties travel.
#[async_trait]
pub trait OperationPolicy: Send + Sync {
    fn existing_target(&self) -> ExistingTargetBehavior;

    /// Decides whether a source property is carried to the
    /// destination.
    fn transfers_property(&self, name: &PropertyName) -> bool;

    /// Materializes the source document at a missing destination.
    async fn create_document(
        &self,
        source: &dyn DocumentSource,
        target: Box<dyn MissingTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError>;

    /// Applies the verb to a destination document overwritten in
    /// place.
    async fn update_document(
        &self,
        source: &dyn DocumentSource,
        target: Box<dyn DocumentTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, PolicyFailure>;

    /// Runs once a collection and all of its children have been
    /// processed. A move deletes the emptied source collection here; a
    /// delete removes the target collection itself.
    async fn finish_collection(
        &self,
        source: &dyn CollectionSource,
        target: Box<dyn CollectionTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError>;
}

type PropertyFilter = Box<dyn Fn(&PropertyName) -> bool + Send + Sync>;

/// Duplicates the source at the destination, leaving the source
/// untouched.
pub struct CopyPolicy {
    existing: ExistingTargetBehavior,
    filter: Option<PropertyFilter>,
}

impl CopyPolicy {
    pub fn new() -> Self {
        Self {
            existing: ExistingTargetBehavior::RecreateFirst,
            filter: None,
        }
    }

    pub fn overwrite_in_place(mut self) -> Self {
        self.existing = ExistingTargetBehavior::OverwriteInPlace;
        self
    }

    /// Restricts which source properties are carried over.
    pub fn with_property_filter(
        mut self,
        filter: impl Fn(&PropertyName) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl Default for CopyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationPolicy for CopyPolicy {
    fn existing_target(&self) -> ExistingTargetBehavior {
        self.existing
    }

    fn transfers_property(&self, name: &PropertyName) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(name))
    }

    async fn create_document(
        &self,
        source: &dyn DocumentSource,
        target: Box<dyn MissingTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        Ok(Target::Document(target.create_document(source, cancel).await?))
    }

    async fn update_document(
        &self,
        source: &dyn DocumentSource,
        target: Box<dyn DocumentTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, PolicyFailure> {
        Ok(Target::Document(target.replace(source, cancel).await?))
    }

    async fn finish_collection(
        &self,
        _source: &dyn CollectionSource,
        target: Box<dyn CollectionTarget>,
        _cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        Ok(Target::collection(target))
    }
}

/// Copy semantics plus removal of the source once each resource has
/// landed at the destination.
pub struct MovePolicy<R> {
    remover: R,
    existing: ExistingTargetBehavior,
}

impl<R> MovePolicy<R> {
    pub fn new(remover: R) -> Self {
        Self {
            remover,
            existing: ExistingTargetBehavior::RecreateFirst,
        }
    }

    pub fn overwrite_in_place(mut self) -> Self {
        self.existing = ExistingTargetBehavior::OverwriteInPlace;
        self
    }
}

#[async_trait]
impl<R: SourceRemover> OperationPolicy for MovePolicy<R> {
    fn existing_target(&self) -> ExistingTargetBehavior {
        self.existing
    }

    fn transfers_property(&self, _name: &PropertyName) -> bool {
        true
    }

    async fn create_document(
        &self,
        source: &dyn DocumentSource,
        target: Box<dyn MissingTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        let document = target.create_document(source, cancel).await?;
        self.remover.remove_document(source.path(), cancel).await?;
        Ok(Target::Document(document))
    }

    async fn update_document(
        &self,
        source: &dyn DocumentSource,
        target: Box<dyn DocumentTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, PolicyFailure> {
        let document = target.replace(source, cancel).await?;
        self.remover
            .remove_document(source.path(), cancel)
            .await
            .map_err(PolicyFailure::from)?;
        Ok(Target::Document(document))
    }

    async fn finish_collection(
        &self,
        source: &dyn CollectionSource,
        target: Box<dyn CollectionTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        self.remover.remove_collection(source.path(), cancel).await?;
        Ok(Target::collection(target))
    }
}

/// Removes the resources the traversal visits. Driven with the target
/// handle addressing the same tree as the source; documents go first,
/// each collection deletes itself once emptied.
pub struct DeletePolicy;

#[async_trait]
impl OperationPolicy for DeletePolicy {
    fn existing_target(&self) -> ExistingTargetBehavior {
        ExistingTargetBehavior::OverwriteInPlace
    }

    fn transfers_property(&self, _name: &PropertyName) -> bool {
        false
    }

    async fn create_document(
        &self,
        _source: &dyn DocumentSource,
        target: Box<dyn MissingTarget>,
        _cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        // Nothing exists at the destination; deletion is a no-op.
        Ok(Target::Missing(target))
    }

    async fn update_document(
        &self,
        _source: &dyn DocumentSource,
        target: Box<dyn DocumentTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, PolicyFailure> {
        let missing = target
            .delete(cancel)
            .await
            .map_err(|error| PolicyFailure::new(OutcomeStatus::TargetDeleteFailed, error))?;
        Ok(Target::Missing(missing))
    }

    async fn finish_collection(
        &self,
        _source: &dyn CollectionSource,
        target: Box<dyn CollectionTarget>,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        Ok(Target::Missing(target.delete(cancel).await?))
    }
}
