use std::{future::Future, pin::Pin};

use ferrodav_core::{
    BackendError, CollectionHandle, CollectionNode, DocumentSource, EntryProperties,
    MissingTarget, Property, PropertyStore, Target, join_url,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    CollectionOutcome, DocumentOutcome, ExistingTargetBehavior, OperationPolicy, Outcome,
    OutcomeStatus, PolicyFailure,
};

/// Settings for one top-level invocation.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Whether an existing destination may be replaced at all.
    pub overwrite: bool,
    /// Budget for dead-property reads; `None` is unbounded.
    pub max_property_cost: Option<u64>,
    /// Surface properties whose validity check currently fails.
    pub include_invalid_properties: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            max_property_cost: None,
            include_invalid_properties: false,
        }
    }
}

/// Source side of one invocation: a document, or a collection together
/// with its depth-limited snapshot.
pub enum Source<'a> {
    Document(&'a dyn DocumentSource),
    Collection(&'a CollectionNode),
}

/// Walks a source tree and drives the destination through the
/// operation policy, producing one outcome per visited resource.
///
/// No backend failure escapes `execute`: every fallible backend call
/// is converted into a status plus captured error on the node where it
/// happened, and the traversal of siblings continues. The engine keeps
/// no state across invocations; callers may run several concurrently.
pub struct ExecutionEngine<'a> {
    policy: &'a dyn OperationPolicy,
    store: Option<&'a dyn PropertyStore>,
    options: EngineOptions,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(policy: &'a dyn OperationPolicy, options: EngineOptions) -> Self {
        Self {
            policy,
            store: None,
            options,
        }
    }

    /// Attaches the dead-property store consulted during property
    /// collection.
    pub fn with_property_store(mut self, store: &'a dyn PropertyStore) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn execute(
        &self,
        source_url: &str,
        source: Source<'_>,
        target: Target,
        cancel: &CancellationToken,
    ) -> Outcome {
        debug!(source_url, target = target.kind(), "executing operation");
        match source {
            Source::Document(document) => Outcome::Document(
                self.execute_document(source_url, document, target, cancel)
                    .await,
            ),
            Source::Collection(node) => Outcome::Collection(
                self.execute_collection(source_url.to_string(), node, target, cancel)
                    .await,
            ),
        }
    }

    async fn execute_document(
        &self,
        url: &str,
        source: &dyn DocumentSource,
        target: Target,
        cancel: &CancellationToken,
    ) -> DocumentOutcome {
        match target {
            Target::Missing(missing) => {
                self.document_into_missing(url, source, missing, cancel)
                    .await
            }
            Target::Document(existing) => {
                if !self.options.overwrite {
                    return DocumentOutcome::with_status(url, OutcomeStatus::CannotOverwrite);
                }
                match self.policy.existing_target() {
                    ExistingTargetBehavior::RecreateFirst => {
                        match existing.delete(cancel).await {
                            Ok(missing) => {
                                self.document_into_missing(url, source, missing, cancel)
                                    .await
                            }
                            Err(error) => {
                                warn!(url, %error, "destination document delete failed");
                                DocumentOutcome::failed(
                                    url,
                                    OutcomeStatus::TargetDeleteFailed,
                                    error,
                                )
                            }
                        }
                    }
                    ExistingTargetBehavior::OverwriteInPlace => {
                        let (properties, property_error) = self
                            .collect_properties(source.path(), source.live_properties(), cancel)
                            .await;
                        match self.policy.update_document(source, existing, cancel).await {
                            Ok(result) => {
                                self.finish_document(
                                    url,
                                    result,
                                    properties,
                                    property_error,
                                    OutcomeStatus::Overwritten,
                                    cancel,
                                )
                                .await
                            }
                            Err(PolicyFailure { status, error }) => {
                                warn!(url, %error, "document overwrite failed");
                                DocumentOutcome::failed(url, status, error)
                            }
                        }
                    }
                }
            }
            // A collection where a document was expected: the kinds
            // conflict and the destination stays untouched.
            Target::Collection(_) => {
                if self.options.overwrite {
                    DocumentOutcome::with_status(url, OutcomeStatus::OverwriteFailed)
                } else {
                    DocumentOutcome::with_status(url, OutcomeStatus::CannotOverwrite)
                }
            }
        }
    }

    async fn document_into_missing(
        &self,
        url: &str,
        source: &dyn DocumentSource,
        missing: Box<dyn MissingTarget>,
        cancel: &CancellationToken,
    ) -> DocumentOutcome {
        let (properties, property_error) = self
            .collect_properties(source.path(), source.live_properties(), cancel)
            .await;
        match self.policy.create_document(source, missing, cancel).await {
            Ok(result) => {
                self.finish_document(
                    url,
                    result,
                    properties,
                    property_error,
                    OutcomeStatus::Created,
                    cancel,
                )
                .await
            }
            Err(error) => {
                warn!(url, %error, "document creation failed");
                DocumentOutcome::failed(url, OutcomeStatus::CreateFailed, error)
            }
        }
    }

    /// Applies collected properties to the document the policy left at
    /// the destination, downgrading the node to `PropSetFailed` when
    /// any of them do not stick.
    async fn finish_document(
        &self,
        url: &str,
        result: Target,
        properties: Vec<Property>,
        property_error: Option<BackendError>,
        success: OutcomeStatus,
        cancel: &CancellationToken,
    ) -> DocumentOutcome {
        let mut outcome = DocumentOutcome::with_status(url, success);

        // A policy may transition the destination away from the
        // document kind (delete does); there is nothing left to
        // annotate then.
        let Target::Document(mut document) = result else {
            return outcome;
        };

        if !properties.is_empty() {
            match document.write_properties(&properties, cancel).await {
                Ok(rejected) if rejected.is_empty() => {}
                Ok(rejected) => {
                    outcome.status = OutcomeStatus::PropSetFailed;
                    outcome.failed_properties = rejected;
                }
                Err(error) => {
                    warn!(url, %error, "property application failed");
                    outcome.status = OutcomeStatus::PropSetFailed;
                    outcome.error = Some(error);
                }
            }
        }
        if outcome.status == success
            && let Some(error) = property_error
        {
            outcome.status = OutcomeStatus::PropSetFailed;
            outcome.error = Some(error);
        }
        outcome
    }

    fn execute_collection<'s>(
        &'s self,
        url: String,
        node: &'s CollectionNode,
        target: Target,
        cancel: &'s CancellationToken,
    ) -> Pin<Box<dyn Future<Output = CollectionOutcome> + Send + 's>> {
        Box::pin(async move {
            match target {
                Target::Missing(missing) => {
                    let (properties, property_error) = self
                        .collect_properties(
                            node.collection.path(),
                            node.collection.live_properties(),
                            cancel,
                        )
                        .await;
                    match missing.create_collection(cancel).await {
                        Ok(created) => {
                            let handle = CollectionHandle {
                                target: created,
                                created: true,
                            };
                            self.collection_into(
                                &url,
                                node,
                                handle,
                                properties,
                                property_error,
                                OutcomeStatus::Created,
                                cancel,
                            )
                            .await
                        }
                        Err(error) => {
                            warn!(url = url.as_str(), %error, "collection creation failed");
                            CollectionOutcome::failed(url, OutcomeStatus::CreateFailed, error)
                        }
                    }
                }
                Target::Collection(handle) => {
                    if !self.options.overwrite && !handle.created {
                        return CollectionOutcome::with_status(
                            url,
                            OutcomeStatus::CannotOverwrite,
                        );
                    }
                    if !handle.created
                        && self.policy.existing_target() == ExistingTargetBehavior::RecreateFirst
                    {
                        return match handle.target.delete(cancel).await {
                            Ok(missing) => {
                                self.execute_collection(
                                    url,
                                    node,
                                    Target::Missing(missing),
                                    cancel,
                                )
                                .await
                            }
                            Err(error) => {
                                warn!(url = url.as_str(), %error, "destination collection delete failed");
                                CollectionOutcome::failed(
                                    url,
                                    OutcomeStatus::TargetDeleteFailed,
                                    error,
                                )
                            }
                        };
                    }
                    let (properties, property_error) = self
                        .collect_properties(
                            node.collection.path(),
                            node.collection.live_properties(),
                            cancel,
                        )
                        .await;
                    let success = if handle.created {
                        OutcomeStatus::Created
                    } else {
                        OutcomeStatus::Overwritten
                    };
                    self.collection_into(
                        &url,
                        node,
                        handle,
                        properties,
                        property_error,
                        success,
                        cancel,
                    )
                    .await
                }
                // A document where a collection was expected.
                Target::Document(_) => {
                    if self.options.overwrite {
                        CollectionOutcome::with_status(url, OutcomeStatus::OverwriteFailed)
                    } else {
                        CollectionOutcome::with_status(url, OutcomeStatus::CannotOverwrite)
                    }
                }
            }
        })
    }

    /// Processes every child of the snapshot against the destination
    /// collection, then applies properties and runs the policy's
    /// cleanup hook. Child failures stay local: each child contributes
    /// exactly one outcome and never short-circuits its siblings.
    #[allow(clippy::too_many_arguments)]
    async fn collection_into(
        &self,
        url: &str,
        node: &CollectionNode,
        mut handle: CollectionHandle,
        properties: Vec<Property>,
        property_error: Option<BackendError>,
        success: OutcomeStatus,
        cancel: &CancellationToken,
    ) -> CollectionOutcome {
        let mut documents = Vec::with_capacity(node.documents.len());
        for child in &node.documents {
            let child_url = join_url(url, child.name());
            let outcome = match self.resolve_child(&handle, child.name(), cancel).await {
                Ok(Target::Collection(_)) => {
                    // Kind mismatch: a collection sits where the source
                    // has a document. Leave it untouched.
                    DocumentOutcome::with_status(&child_url, OutcomeStatus::OverwriteFailed)
                }
                Ok(child_target) => {
                    self.execute_document(&child_url, child.as_ref(), child_target, cancel)
                        .await
                }
                Err(error) => {
                    warn!(url = child_url.as_str(), %error, "destination probe failed");
                    DocumentOutcome::failed(&child_url, OutcomeStatus::CreateFailed, error)
                }
            };
            documents.push(outcome);
        }

        let mut collections = Vec::with_capacity(node.collections.len());
        for child in &node.collections {
            let child_url = join_url(url, child.collection.name());
            let outcome = match self
                .resolve_child(&handle, child.collection.name(), cancel)
                .await
            {
                Ok(Target::Document(_)) => {
                    CollectionOutcome::with_status(&child_url, OutcomeStatus::OverwriteFailed)
                }
                Ok(child_target) => {
                    self.execute_collection(child_url, child, child_target, cancel)
                        .await
                }
                Err(error) => {
                    warn!(url = child_url.as_str(), %error, "destination probe failed");
                    CollectionOutcome::failed(&child_url, OutcomeStatus::CreateFailed, error)
                }
            };
            collections.push(outcome);
        }

        let mut outcome = CollectionOutcome::with_status(url, success);
        outcome.documents = documents;
        outcome.collections = collections;

        if !properties.is_empty() {
            match handle.target.write_properties(&properties, cancel).await {
                Ok(rejected) if rejected.is_empty() => {}
                Ok(rejected) => {
                    outcome.status = OutcomeStatus::PropSetFailed;
                    outcome.failed_properties = rejected;
                }
                Err(error) => {
                    warn!(url, %error, "property application failed");
                    outcome.status = OutcomeStatus::PropSetFailed;
                    outcome.error = Some(error);
                }
            }
        }
        if outcome.status == success
            && let Some(error) = property_error
        {
            outcome.status = OutcomeStatus::PropSetFailed;
            outcome.error = Some(error);
        }

        if let Err(error) = self
            .policy
            .finish_collection(node.collection.as_ref(), handle.target, cancel)
            .await
        {
            warn!(url, %error, "collection cleanup failed");
            outcome.status = OutcomeStatus::CleanupFailed;
            outcome.error = Some(error);
        }
        outcome
    }

    async fn resolve_child(
        &self,
        handle: &CollectionHandle,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Target, BackendError> {
        if handle.created {
            // Nothing can exist under a collection created moments
            // ago; skip the probe.
            return Ok(Target::Missing(handle.target.missing_child(name)));
        }
        handle.target.child(name, cancel).await
    }

    /// Runs the property pipeline and keeps the writable properties
    /// the policy wants transferred. A dead-property load failure does
    /// not abort the verb action; the error is carried and surfaced as
    /// `PropSetFailed` on an otherwise successful node.
    async fn collect_properties(
        &self,
        entry_path: &str,
        live: Vec<Property>,
        cancel: &CancellationToken,
    ) -> (Vec<Property>, Option<BackendError>) {
        let mut pipeline = EntryProperties::new(
            entry_path,
            live,
            self.store,
            self.options.max_property_cost,
            self.options.include_invalid_properties,
        );
        let mut properties = Vec::new();
        loop {
            match pipeline.next(cancel).await {
                Ok(Some(property)) => {
                    if property.writable && self.policy.transfers_property(&property.name) {
                        properties.push(property);
                    }
                }
                Ok(None) => return (properties, None),
                Err(error) => {
                    warn!(entry_path, %error, "dead property load failed");
                    return (properties, Some(error));
                }
            }
        }
    }
}
