mod engine;
mod outcome;
mod policy;

pub use engine::{EngineOptions, ExecutionEngine, Source};
pub use outcome::{CollectionOutcome, DocumentOutcome, Outcome, OutcomeStatus};
pub use policy::{
    CopyPolicy, DeletePolicy, ExistingTargetBehavior, MovePolicy, OperationPolicy, PolicyFailure,
};
