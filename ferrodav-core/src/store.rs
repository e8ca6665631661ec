use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{BackendError, Property};

/// Persistence for dead properties, keyed by entry path.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Cumulative expense of the reads this store has performed so
    /// far. The property pipeline stops consulting the store once the
    /// cost exceeds the caller's budget, which bounds the work of a
    /// deep traversal.
    fn cost(&self) -> u64;

    async fn load(
        &self,
        entry_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError>;

    async fn save(
        &self,
        entry_path: &str,
        properties: &[Property],
        cancel: &CancellationToken,
    ) -> Result<(), BackendError>;
}
