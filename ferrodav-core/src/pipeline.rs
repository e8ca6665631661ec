use std::collections::HashSet;
use std::vec;

use tokio_util::sync::CancellationToken;

use crate::{BackendError, Property, PropertyName, PropertyStore};

/// Lazily merges an entry's predefined (live) properties with the dead
/// properties persisted for it, deduplicating by qualified name.
///
/// Single-pass and not restartable: once exhausted it only yields
/// `None`. Consumers needing two passes must collect first.
pub struct EntryProperties<'a> {
    entry_path: &'a str,
    predefined: vec::IntoIter<Property>,
    store: Option<&'a dyn PropertyStore>,
    max_cost: Option<u64>,
    include_invalid: bool,
    emitted: HashSet<PropertyName>,
    dead: Option<vec::IntoIter<Property>>,
    exhausted: bool,
}

impl<'a> EntryProperties<'a> {
    pub fn new(
        entry_path: &'a str,
        predefined: Vec<Property>,
        store: Option<&'a dyn PropertyStore>,
        max_cost: Option<u64>,
        include_invalid: bool,
    ) -> Self {
        Self {
            entry_path,
            predefined: predefined.into_iter(),
            store,
            max_cost,
            include_invalid,
            emitted: HashSet::new(),
            dead: None,
            exhausted: false,
        }
    }

    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Property>, BackendError> {
        if self.exhausted {
            return Ok(None);
        }

        // Predefined properties first, in their given order.
        while let Some(property) = self.predefined.next() {
            if admit(&mut self.emitted, self.include_invalid, &property) {
                return Ok(Some(property));
            }
        }

        if self.dead.is_none() {
            let Some(store) = self.store else {
                self.exhausted = true;
                return Ok(None);
            };
            if self.max_cost.is_some_and(|max| store.cost() > max) {
                self.exhausted = true;
                return Ok(None);
            }
            let loaded = match store.load(self.entry_path, cancel).await {
                Ok(properties) => properties,
                Err(err) => {
                    self.exhausted = true;
                    return Err(err);
                }
            };
            self.dead = Some(loaded.into_iter());
        }

        if let Some(dead) = self.dead.as_mut() {
            for property in dead {
                if admit(&mut self.emitted, self.include_invalid, &property) {
                    return Ok(Some(property));
                }
            }
        }

        self.exhausted = true;
        Ok(None)
    }

    /// Drains the remainder of the sequence into a vector.
    pub async fn collect(
        mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Property>, BackendError> {
        let mut out = Vec::new();
        while let Some(property) = self.next(cancel).await? {
            out.push(property);
        }
        Ok(out)
    }
}

fn admit(
    emitted: &mut HashSet<PropertyName>,
    include_invalid: bool,
    property: &Property,
) -> bool {
    if !include_invalid && !property.valid {
        return false;
    }
    // First occurrence of a name wins; later duplicates are dropped.
    emitted.insert(property.name.clone())
}
