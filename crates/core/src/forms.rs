use std::collections::HashMap;

use crate::feature::FeatureId;

/// Maps each unsaved drawing to the numeric slot of its form in the field
/// panel. Slots come from a counter and are never reused.
#[derive(Debug, Default)]
pub struct FieldFormRegistry {
    slots: HashMap<FeatureId, usize>,
    next_slot: usize,
}

impl FieldFormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `feature`, allocating one on first use.
    pub fn register(&mut self, feature: FeatureId) -> usize {
        if let Some(&slot) = self.slots.get(&feature) {
            return slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(feature, slot);
        slot
    }

    pub fn slot(&self, feature: FeatureId) -> Option<usize> {
        self.slots.get(&feature).copied()
    }

    pub fn remove(&mut self, feature: FeatureId) -> Option<usize> {
        self.slots.remove(&feature)
    }

    pub fn contains(&self, feature: FeatureId) -> bool {
        self.slots.contains_key(&feature)
    }

    pub fn features(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
