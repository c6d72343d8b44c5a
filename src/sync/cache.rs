use crate::history::{SlotHandle, SnapshotHistory};
use crate::mesh::{MeshId, MeshSnapshot};
use std::collections::HashMap;

/// Identity index over the snapshot history: at most one live snapshot per id.
#[derive(Debug)]
pub struct MeshIdentityCache {
    history: SnapshotHistory<MeshSnapshot>,
    index: HashMap<MeshId, SlotHandle>,
}

impl MeshIdentityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: SnapshotHistory::new(capacity),
            index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn contains(&self, id: &MeshId) -> bool {
        self.index.contains_key(id)
    }

    /// Best-known snapshot for `id`, if its geometry has arrived and it has
    /// not been evicted.
    pub fn assemble(&self, id: &MeshId) -> Option<&MeshSnapshot> {
        self.index.get(id).and_then(|handle| self.history.get(*handle))
    }

    pub(crate) fn assemble_mut(&mut self, id: &MeshId) -> Option<&mut MeshSnapshot> {
        let handle = *self.index.get(id)?;
        self.history.get_mut(handle)
    }

    /// Admits a fresh snapshot at the tail of the history. A live snapshot
    /// with the same id is invalidated first. Returns the ids evicted to make
    /// room, oldest-first.
    pub fn admit(&mut self, snapshot: MeshSnapshot) -> Vec<MeshId> {
        let id = snapshot.mesh_id().clone();
        self.invalidate(&id);

        let (handle, evicted) = self.history.admit(snapshot);
        self.index.insert(id, handle);
        self.forget(evicted)
    }

    /// Drops all cached state for one id.
    pub fn invalidate(&mut self, id: &MeshId) -> Option<MeshSnapshot> {
        let handle = self.index.remove(id)?;
        self.history.remove(handle)
    }

    /// Makes the live snapshot for `id` current without re-admitting it.
    pub fn promote(&mut self, id: &MeshId) -> bool {
        match self.index.get(id) {
            Some(handle) => self.history.promote(*handle),
            None => false,
        }
    }

    pub fn current(&self) -> Option<&MeshSnapshot> {
        self.history.current()
    }

    pub fn is_current(&self, id: &MeshId) -> bool {
        match (self.index.get(id), self.history.current_handle()) {
            (Some(handle), Some(current)) => *handle == current,
            _ => false,
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Vec<MeshId> {
        let evicted = self.history.set_capacity(capacity);
        self.forget(evicted)
    }

    /// Snapshots oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &MeshSnapshot> {
        self.history.iter()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.index.clear();
    }

    fn forget(&mut self, evicted: Vec<MeshSnapshot>) -> Vec<MeshId> {
        evicted
            .into_iter()
            .map(|snapshot| {
                let id = snapshot.mesh_id().clone();
                self.index.remove(&id);
                log::trace!("[history] evicted snapshot {id}");
                id
            })
            .collect()
    }
}
