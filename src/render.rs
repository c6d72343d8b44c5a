use crate::costs::CostOverlay;
use crate::display::RenderOptions;
use crate::mesh::{MeshId, MeshSnapshot};

/// Consumer of finished snapshots, typically a scene-graph visual.
///
/// Snapshots are lent for the duration of the call; a sink that needs the
/// data past the next admission or reset must clone it. Implementations must
/// not block.
pub trait RendererSink: Send {
    fn label(&self) -> &'static str;

    /// A snapshot became current or changed in place.
    fn on_snapshot_ready(&mut self, snapshot: &MeshSnapshot, costs: Option<&CostOverlay>);

    /// The snapshot for `mesh_id` left the history.
    fn on_snapshot_evicted(&mut self, _mesh_id: &MeshId) {}

    /// Every snapshot was dropped.
    fn on_cleared(&mut self) {}

    fn on_render_options(&mut self, _options: &RenderOptions) {}
}

#[derive(Debug, Default)]
pub struct NullRendererSink;

impl RendererSink for NullRendererSink {
    fn label(&self) -> &'static str {
        "null"
    }

    fn on_snapshot_ready(&mut self, snapshot: &MeshSnapshot, _costs: Option<&CostOverlay>) {
        log::trace!(
            "[display] null sink ignoring snapshot {}",
            snapshot.mesh_id()
        );
    }
}
