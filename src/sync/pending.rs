use crate::mesh::{ColorLayer, CostLayer, MaterialSet, MeshId, TextureImage};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Colors,
    Costs(String),
    Materials,
    Texture(u32),
}

/// Attribute data waiting for its geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAttribute {
    Colors(ColorLayer),
    Costs(CostLayer),
    Materials(MaterialSet),
    Texture(TextureImage),
}

impl PendingAttribute {
    pub fn mesh_id(&self) -> &MeshId {
        match self {
            PendingAttribute::Colors(layer) => &layer.mesh_id,
            PendingAttribute::Costs(layer) => &layer.mesh_id,
            PendingAttribute::Materials(set) => &set.mesh_id,
            PendingAttribute::Texture(image) => &image.mesh_id,
        }
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            PendingAttribute::Colors(_) => AttributeKind::Colors,
            PendingAttribute::Costs(layer) => AttributeKind::Costs(layer.name.clone()),
            PendingAttribute::Materials(_) => AttributeKind::Materials,
            PendingAttribute::Texture(image) => AttributeKind::Texture(image.index),
        }
    }

    pub fn stamp_ms(&self) -> u64 {
        match self {
            PendingAttribute::Colors(layer) => layer.stamp_ms,
            PendingAttribute::Costs(layer) => layer.stamp_ms,
            PendingAttribute::Materials(set) => set.stamp_ms,
            PendingAttribute::Texture(image) => image.stamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInsert {
    Buffered,
    /// Replaced an older entry with the same id and kind.
    Superseded,
    /// An entry with a newer stamp was already held.
    Stale,
}

/// Unmatched attributes, last-write-wins per (id, kind). The bound counts
/// mesh ids, like the snapshot history; overflow drops every entry of the
/// id that started waiting first.
#[derive(Debug)]
pub struct PendingMatchBuffer {
    entries: VecDeque<PendingAttribute>,
    ids: VecDeque<MeshId>,
    capacity: usize,
    dropped: u64,
}

impl PendingMatchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            ids: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Number of buffered attributes across all ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct ids waiting for geometry.
    pub fn mesh_count(&self) -> usize {
        self.ids.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped for lack of room since construction or the last clear.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn insert(&mut self, attribute: PendingAttribute) -> PendingInsert {
        let kind = attribute.kind();
        let existing = self
            .entries
            .iter()
            .position(|entry| entry.mesh_id() == attribute.mesh_id() && entry.kind() == kind);

        let outcome = match existing {
            Some(position) if self.entries[position].stamp_ms() > attribute.stamp_ms() => {
                return PendingInsert::Stale;
            }
            Some(position) => {
                self.entries.remove(position);
                PendingInsert::Superseded
            }
            None => PendingInsert::Buffered,
        };

        if !self.ids.contains(attribute.mesh_id()) {
            while self.ids.len() >= self.capacity {
                self.drop_oldest_id();
            }
            self.ids.push_back(attribute.mesh_id().clone());
        }
        self.entries.push_back(attribute);
        outcome
    }

    /// Removes and returns every entry for `id`, in arrival order.
    pub fn take(&mut self, id: &MeshId) -> Vec<PendingAttribute> {
        self.ids.retain(|waiting| waiting != id);
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.mesh_id() == id {
                taken.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        taken
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.ids.len() > self.capacity {
            self.drop_oldest_id();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
        self.dropped = 0;
    }

    fn drop_oldest_id(&mut self) {
        let Some(id) = self.ids.pop_front() else {
            return;
        };
        let before = self.entries.len();
        self.entries.retain(|entry| entry.mesh_id() != &id);
        let dropped = before - self.entries.len();
        self.dropped += dropped as u64;
        log::debug!("[sync] dropping {dropped} unmatched attributes for {id}");
    }
}
