//! Transaction-scoped identity map.

use rustc_hash::FxHashMap;

use crate::instance::CompositeInstance;
use crate::session::RecordId;

/// Maps record ids to their live composite instance within one open
/// transaction. At most one instance exists per record per cache; the cache
/// is cleared on every transaction completion, successful or not.
#[derive(Default)]
pub(crate) struct InstanceCache {
    entries: FxHashMap<RecordId, CompositeInstance>,
}

impl InstanceCache {
    pub(crate) fn get(&self, id: RecordId) -> Option<CompositeInstance> {
        self.entries.get(&id).cloned()
    }

    pub(crate) fn insert(&mut self, id: RecordId, instance: CompositeInstance) {
        self.entries.insert(id, instance);
    }

    pub(crate) fn evict(&mut self, id: RecordId) -> Option<CompositeInstance> {
        self.entries.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn values(&self) -> Vec<CompositeInstance> {
        self.entries.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
