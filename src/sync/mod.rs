//! Reconciles independently arriving geometry and attribute streams.
//!
//! Geometry creates or updates the snapshot for its id. Attributes merge into
//! a live snapshot immediately or wait in the pending-match buffer for their
//! geometry. Within one (id, kind) pair a newer stamp always wins; across
//! kinds merges commute.

pub mod cache;
pub mod pending;

pub use cache::MeshIdentityCache;
pub use pending::{AttributeKind, PendingAttribute, PendingInsert, PendingMatchBuffer};

use crate::mesh::validate::{self, GeometryFingerprint, ValidationError};
use crate::mesh::{
    ColorLayer, CostLayer, GeometryPayload, MaterialSet, MeshId, MeshSnapshot, TextureImage,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new snapshot entered the history, possibly evicting older ones.
    Created { evicted: Vec<MeshId> },
    /// A live snapshot changed in place.
    Updated,
    /// No geometry yet; the attribute waits in the pending-match buffer.
    Pending(PendingInsert),
    /// Older than the data already held for the same id and kind.
    Stale,
}

impl MergeOutcome {
    /// Whether a live snapshot changed and should be re-rendered.
    pub fn touches_snapshot(&self) -> bool {
        matches!(self, MergeOutcome::Created { .. } | MergeOutcome::Updated)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub rejected: u64,
    pub stale: u64,
    pub unmatched_dropped: u64,
}

enum GeometryDecision {
    Create,
    Update,
    Replace,
    Stale,
}

pub struct AttributeSynchronizer {
    cache: MeshIdentityCache,
    pending: PendingMatchBuffer,
    rejected: u64,
    stale: u64,
}

impl AttributeSynchronizer {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: MeshIdentityCache::new(capacity),
            pending: PendingMatchBuffer::new(capacity),
            rejected: 0,
            stale: 0,
        }
    }

    pub fn cache(&self) -> &MeshIdentityCache {
        &self.cache
    }

    pub fn pending(&self) -> &PendingMatchBuffer {
        &self.pending
    }

    pub fn current(&self) -> Option<&MeshSnapshot> {
        self.cache.current()
    }

    pub fn assemble(&self, id: &MeshId) -> Option<&MeshSnapshot> {
        self.cache.assemble(id)
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            rejected: self.rejected,
            stale: self.stale,
            unmatched_dropped: self.pending.dropped(),
        }
    }

    pub fn on_geometry(&mut self, payload: GeometryPayload) -> Result<MergeOutcome, ValidationError> {
        self.checked(validate::geometry(&payload))?;

        let id = payload.mesh_id.clone();
        let fingerprint = GeometryFingerprint::of(&payload);
        let decision = match self.cache.assemble(&id) {
            None => GeometryDecision::Create,
            Some(live) if live.geometry().stamp_ms() > payload.stamp_ms() => {
                GeometryDecision::Stale
            }
            Some(live) if live.fingerprint() == fingerprint => GeometryDecision::Update,
            Some(_) => GeometryDecision::Replace,
        };

        let outcome = match decision {
            GeometryDecision::Stale => {
                self.stale += 1;
                log::debug!(
                    "[sync] ignoring geometry for {id} stamped {} (older than held)",
                    payload.stamp_ms()
                );
                return Ok(MergeOutcome::Stale);
            }
            GeometryDecision::Update => {
                if let Some(snapshot) = self.cache.assemble_mut(&id) {
                    snapshot.replace_geometry(payload);
                }
                // fresh geometry makes its mesh current, attributes included
                self.cache.promote(&id);
                MergeOutcome::Updated
            }
            GeometryDecision::Replace => {
                log::debug!("[sync] structure of {id} changed; invalidating cached attributes");
                self.cache.invalidate(&id);
                MergeOutcome::Created {
                    evicted: self.cache.admit(MeshSnapshot::new(payload)),
                }
            }
            GeometryDecision::Create => MergeOutcome::Created {
                evicted: self.cache.admit(MeshSnapshot::new(payload)),
            },
        };

        self.drain_pending(&id);
        Ok(outcome)
    }

    pub fn on_colors(&mut self, layer: ColorLayer) -> Result<MergeOutcome, ValidationError> {
        self.merge(PendingAttribute::Colors(layer))
    }

    pub fn on_costs(&mut self, layer: CostLayer) -> Result<MergeOutcome, ValidationError> {
        self.merge(PendingAttribute::Costs(layer))
    }

    pub fn on_materials(&mut self, set: MaterialSet) -> Result<MergeOutcome, ValidationError> {
        let id = set.mesh_id.clone();
        let outcome = self.merge(PendingAttribute::Materials(set))?;
        if outcome == MergeOutcome::Updated {
            // textures that beat their material set here can attach now
            self.drain_pending(&id);
        }
        Ok(outcome)
    }

    pub fn on_texture(&mut self, image: TextureImage) -> Result<MergeOutcome, ValidationError> {
        self.merge(PendingAttribute::Texture(image))
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Vec<MeshId> {
        self.pending.set_capacity(capacity);
        self.cache.set_capacity(capacity)
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Drops every snapshot and every pending attribute, and zeroes the
    /// counters.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.pending.clear();
        self.rejected = 0;
        self.stale = 0;
    }

    fn merge(&mut self, attribute: PendingAttribute) -> Result<MergeOutcome, ValidationError> {
        let id = attribute.mesh_id().clone();
        let Some(snapshot) = self.cache.assemble_mut(&id) else {
            if let PendingAttribute::Texture(image) = &attribute {
                self.checked(validate::texture(image))?;
            }
            return Ok(self.hold(attribute));
        };

        let geometry = snapshot.geometry();
        let validation = match &attribute {
            PendingAttribute::Colors(layer) => validate::colors(layer, geometry),
            PendingAttribute::Costs(layer) => validate::costs(layer, geometry),
            PendingAttribute::Materials(set) => validate::materials(set, geometry),
            PendingAttribute::Texture(image) => validate::texture(image),
        };
        if let Err(err) = validation {
            self.rejected += 1;
            log::warn!("[sync] rejected {:?} for {id}: {err}", attribute.kind());
            return Err(err);
        }

        let changed = match attribute {
            PendingAttribute::Colors(layer) => snapshot.set_colors(layer),
            PendingAttribute::Costs(layer) => snapshot.set_cost_layer(layer),
            PendingAttribute::Materials(set) => snapshot.set_materials(set),
            PendingAttribute::Texture(image) => {
                if snapshot.materials().is_none() {
                    return Ok(self.hold(PendingAttribute::Texture(image)));
                }
                snapshot.attach_texture(image)
            }
        };

        if changed {
            Ok(MergeOutcome::Updated)
        } else {
            self.stale += 1;
            log::debug!("[sync] ignoring stale attribute for {id}");
            Ok(MergeOutcome::Stale)
        }
    }

    fn hold(&mut self, attribute: PendingAttribute) -> MergeOutcome {
        log::debug!(
            "[sync] holding {:?} for {} until its geometry arrives",
            attribute.kind(),
            attribute.mesh_id()
        );
        match self.pending.insert(attribute) {
            PendingInsert::Stale => {
                self.stale += 1;
                MergeOutcome::Stale
            }
            inserted => MergeOutcome::Pending(inserted),
        }
    }

    /// Applies buffered attributes for `id`; textures go last so they find
    /// any material set that was buffered alongside them.
    fn drain_pending(&mut self, id: &MeshId) {
        let mut waiting = self.pending.take(id);
        if waiting.is_empty() {
            return;
        }
        waiting.sort_by_key(|attribute| matches!(attribute, PendingAttribute::Texture(_)));
        for attribute in waiting {
            // rejects are already counted and logged by merge
            let _ = self.merge(attribute);
        }
    }

    fn checked(&mut self, result: Result<(), ValidationError>) -> Result<(), ValidationError> {
        result.map_err(|err| {
            self.rejected += 1;
            log::warn!("[sync] rejected payload: {err}");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Header, Material};

    fn quad(id: &str, stamp_ms: u64) -> GeometryPayload {
        GeometryPayload::new(
            id,
            Header::new("map", stamp_ms),
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    fn textured_materials(id: &str, stamp_ms: u64) -> MaterialSet {
        let mut set = MaterialSet::new(id, stamp_ms);
        set.materials.push(Material {
            color: [1.0; 4],
            texture_index: Some(0),
        });
        set
    }

    fn texture(id: &str, stamp_ms: u64) -> TextureImage {
        TextureImage {
            mesh_id: id.into(),
            stamp_ms,
            index: 0,
            width: 1,
            height: 1,
            encoding: "rgba8".into(),
            data: vec![255; 4],
        }
    }

    #[test]
    fn colors_merge_into_live_snapshot() {
        let mut sync = AttributeSynchronizer::new(4);
        assert!(matches!(
            sync.on_geometry(quad("m1", 1)),
            Ok(MergeOutcome::Created { .. })
        ));
        let outcome = sync
            .on_colors(ColorLayer::new("m1", 2, vec![[0.5; 4]; 4]))
            .expect("valid colors");
        assert_eq!(outcome, MergeOutcome::Updated);
        assert!(sync.current().and_then(MeshSnapshot::colors).is_some());
    }

    #[test]
    fn attributes_before_geometry_wait_then_attach() {
        let mut sync = AttributeSynchronizer::new(4);
        let outcome = sync
            .on_costs(CostLayer::new("m1", 1, "slope", vec![1.0; 4]))
            .expect("buffered");
        assert_eq!(outcome, MergeOutcome::Pending(PendingInsert::Buffered));
        assert_eq!(sync.pending().len(), 1);

        sync.on_geometry(quad("m1", 1)).expect("valid geometry");
        assert!(sync.pending().is_empty());
        let snapshot = sync.current().expect("snapshot");
        assert_eq!(snapshot.cost_layers().len(), 1);
    }

    #[test]
    fn malformed_geometry_leaves_state_untouched() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_geometry(quad("m1", 1)).expect("valid");
        let mut broken = quad("m2", 2);
        broken.faces.push([0, 1, 17]);

        assert!(sync.on_geometry(broken).is_err());
        assert_eq!(sync.cache().len(), 1);
        assert_eq!(sync.current().map(|s| s.mesh_id().as_str()), Some("m1"));
        assert_eq!(sync.stats().rejected, 1);
    }

    #[test]
    fn pending_attribute_invalid_for_geometry_is_dropped() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_colors(ColorLayer::new("m1", 1, vec![[0.5; 4]; 9]))
            .expect("buffered");
        sync.on_geometry(quad("m1", 1)).expect("valid");

        assert!(sync.current().and_then(MeshSnapshot::colors).is_none());
        assert_eq!(sync.stats().rejected, 1);
    }

    #[test]
    fn older_geometry_is_stale() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_geometry(quad("m1", 10)).expect("valid");
        assert_eq!(sync.on_geometry(quad("m1", 5)), Ok(MergeOutcome::Stale));
        assert_eq!(sync.current().map(|s| s.geometry().stamp_ms()), Some(10));
    }

    #[test]
    fn same_structure_update_keeps_attributes() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_geometry(quad("m1", 1)).expect("valid");
        sync.on_colors(ColorLayer::new("m1", 1, vec![[0.5; 4]; 4]))
            .expect("valid");

        let mut moved = quad("m1", 2);
        moved.vertices[3] = [0.0, 2.0, 0.0];
        assert_eq!(sync.on_geometry(moved), Ok(MergeOutcome::Updated));
        let snapshot = sync.current().expect("snapshot");
        assert!(snapshot.colors().is_some());
        assert_eq!(snapshot.geometry().vertices[3], [0.0, 2.0, 0.0]);
    }

    #[test]
    fn geometry_update_for_older_mesh_makes_it_current() {
        let mut sync = AttributeSynchronizer::new(2);
        sync.on_geometry(quad("m1", 1)).expect("valid");
        sync.on_colors(ColorLayer::new("m1", 1, vec![[0.5; 4]; 4]))
            .expect("valid");
        sync.on_geometry(quad("m2", 2)).expect("valid");

        assert_eq!(sync.on_geometry(quad("m1", 3)), Ok(MergeOutcome::Updated));
        let current = sync.current().expect("snapshot");
        assert_eq!(current.mesh_id().as_str(), "m1");
        assert_eq!(current.geometry().stamp_ms(), 3);
        assert!(current.colors().is_some());

        // m2 is now the oldest and leaves first
        let outcome = sync.on_geometry(quad("m3", 4)).expect("valid");
        assert_eq!(
            outcome,
            MergeOutcome::Created {
                evicted: vec![MeshId::new("m2")]
            }
        );
    }

    #[test]
    fn clear_zeroes_counters() {
        let mut sync = AttributeSynchronizer::new(1);
        sync.on_geometry(quad("m1", 5)).expect("valid");
        sync.on_geometry(quad("m1", 1)).expect("stale");
        let mut broken = quad("m2", 1);
        broken.vertices.clear();
        assert!(sync.on_geometry(broken).is_err());
        sync.on_colors(ColorLayer::new("x", 1, vec![[0.0; 4]; 4]))
            .expect("buffered");
        sync.on_colors(ColorLayer::new("y", 1, vec![[0.0; 4]; 4]))
            .expect("buffered");
        assert_ne!(sync.stats(), SyncStats::default());

        sync.clear();
        assert_eq!(sync.stats(), SyncStats::default());
        assert!(sync.pending().is_empty());
        assert!(sync.current().is_none());
    }

    #[test]
    fn structural_change_invalidates_attributes() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_geometry(quad("m1", 1)).expect("valid");
        sync.on_colors(ColorLayer::new("m1", 1, vec![[0.5; 4]; 4]))
            .expect("valid");

        let mut triangle = quad("m1", 2);
        triangle.vertices.truncate(3);
        triangle.faces.truncate(1);
        let outcome = sync.on_geometry(triangle).expect("valid");
        assert_eq!(outcome, MergeOutcome::Created { evicted: Vec::new() });
        assert_eq!(sync.cache().len(), 1);
        assert!(sync.current().and_then(MeshSnapshot::colors).is_none());
    }

    #[test]
    fn texture_before_materials_attaches_when_materials_arrive() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_geometry(quad("m1", 1)).expect("valid");
        assert!(matches!(
            sync.on_texture(texture("m1", 1)),
            Ok(MergeOutcome::Pending(_))
        ));

        sync.on_materials(textured_materials("m1", 1)).expect("valid");
        let materials = sync
            .current()
            .and_then(MeshSnapshot::materials)
            .expect("materials");
        assert!(materials.missing_textures().is_empty());
        assert!(sync.pending().is_empty());
    }

    #[test]
    fn buffered_materials_and_texture_both_attach_on_geometry() {
        let mut sync = AttributeSynchronizer::new(4);
        sync.on_texture(texture("m1", 1)).expect("buffered");
        sync.on_materials(textured_materials("m1", 1))
            .expect("buffered");
        sync.on_geometry(quad("m1", 1)).expect("valid");

        let materials = sync
            .current()
            .and_then(MeshSnapshot::materials)
            .expect("materials");
        assert!(materials.texture(0).is_some());
    }

    #[test]
    fn capacity_shrink_applies_to_history_and_pending() {
        let mut sync = AttributeSynchronizer::new(3);
        for id in ["a", "b", "c"] {
            sync.on_geometry(quad(id, 1)).expect("valid");
        }
        sync.on_colors(ColorLayer::new("x", 1, vec![[0.0; 4]; 4]))
            .expect("buffered");
        sync.on_colors(ColorLayer::new("y", 1, vec![[0.0; 4]; 4]))
            .expect("buffered");

        let evicted = sync.set_capacity(1);
        assert_eq!(evicted, vec![MeshId::new("a"), MeshId::new("b")]);
        assert_eq!(sync.pending().len(), 1);
        assert_eq!(sync.stats().unmatched_dropped, 1);
    }
}
