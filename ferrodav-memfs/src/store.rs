use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ferrodav_core::{BackendError, Property, PropertyStore};
use tokio_util::sync::CancellationToken;

/// In-memory dead-property store with a controllable reported cost.
#[derive(Clone, Default)]
pub struct MemPropertyStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    properties: HashMap<String, Vec<Property>>,
    cost: u64,
    loads: u64,
    fail_loads: bool,
}

impl MemPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, entry_path: &str, properties: Vec<Property>) {
        self.state()
            .properties
            .insert(entry_path.to_string(), properties);
    }

    /// Overrides the cost the store reports before any further reads.
    pub fn set_cost(&self, cost: u64) {
        self.state().cost = cost;
    }

    /// Number of `load` calls performed so far.
    pub fn loads(&self) -> u64 {
        self.state().loads
    }

    /// Makes every subsequent `load` fail.
    pub fn fail_loads(&self) {
        self.state().fail_loads = true;
    }

    pub fn saved(&self, entry_path: &str) -> Vec<Property> {
        self.state()
            .properties
            .get(entry_path)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PropertyStore for MemPropertyStore {
    fn cost(&self) -> u64 {
        self.state().cost
    }

    async fn load(
        &self,
        entry_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let mut state = self.state();
        state.loads += 1;
        state.cost += 1;
        if state.fail_loads {
            return Err(BackendError::other("property store unavailable"));
        }
        Ok(state.properties.get(entry_path).cloned().unwrap_or_default())
    }

    async fn save(
        &self,
        entry_path: &str,
        properties: &[Property],
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        self.state()
            .properties
            .insert(entry_path.to_string(), properties.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ferrodav_core::PropertyName;

    use super::*;

    #[tokio::test]
    async fn load_counts_and_raises_cost() {
        let cancel = CancellationToken::new();
        let store = MemPropertyStore::new();
        store.insert("/a", vec![Property::new(PropertyName::dav("p"), "1")]);

        assert_eq!(store.cost(), 0);
        let loaded = store.load("/a", &cancel).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(store.loads(), 1);
        assert_eq!(store.cost(), 1);
    }

    #[tokio::test]
    async fn failing_store_still_counts_loads() {
        let cancel = CancellationToken::new();
        let store = MemPropertyStore::new();
        store.fail_loads();

        assert!(store.load("/a", &cancel).await.is_err());
        assert_eq!(store.loads(), 1);
    }

    #[tokio::test]
    async fn save_round_trips() {
        let cancel = CancellationToken::new();
        let store = MemPropertyStore::new();
        let properties = vec![Property::new(PropertyName::dav("note"), "kept")];
        store.save("/a", &properties, &cancel).await.unwrap();
        assert_eq!(store.load("/a", &cancel).await.unwrap(), properties);
    }

    #[tokio::test]
    async fn honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let store = MemPropertyStore::new();
        assert!(matches!(
            store.load("/a", &cancel).await,
            Err(BackendError::Cancelled)
        ));
    }
}
