pub mod cycle;

pub use cycle::{
    AcquisitionError, Completion, MeshRequest, PendingRequest, RequestCycle, RequestKind,
    RequestTicket, ServiceError, ServiceResponse,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How attribute data reaches the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Geometry, colors and costs are pushed on independent topics.
    #[default]
    Subscribing,
    /// Everything is pulled: uuid, then geometry, then attributes by uuid.
    Requesting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicNames {
    pub geometry: String,
    pub vertex_colors: String,
    pub vertex_costs: String,
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            geometry: "mesh".into(),
            vertex_colors: "mesh/vertex_colors".into(),
            vertex_costs: "mesh/vertex_costs".into(),
        }
    }
}

/// Service names for the pull cycle. An empty name disables that request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNames {
    pub uuid: String,
    pub geometry: String,
    pub vertex_colors: String,
    pub vertex_costs: String,
    pub materials: String,
    pub textures: String,
}

impl Default for ServiceNames {
    fn default() -> Self {
        Self {
            uuid: "get_uuid".into(),
            geometry: "get_geometry".into(),
            vertex_colors: "get_vertex_colors".into(),
            vertex_costs: "get_vertex_costs".into(),
            materials: "get_materials".into(),
            textures: "get_texture".into(),
        }
    }
}

impl ServiceNames {
    pub fn for_kind(&self, kind: &RequestKind) -> &str {
        match kind {
            RequestKind::Uuid => &self.uuid,
            RequestKind::Geometry => &self.geometry,
            RequestKind::VertexColors => &self.vertex_colors,
            RequestKind::VertexCosts => &self.vertex_costs,
            RequestKind::Materials => &self.materials,
            RequestKind::Texture(_) => &self.textures,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to subscribe to '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Message bus and service client the display acquires data through.
///
/// Pushed messages and service responses come back through
/// [`crate::events::DisplayEvent`]; nothing here may block.
pub trait MeshTransport: Send {
    fn label(&self) -> &'static str;
    fn subscribe(&mut self, topics: &TopicNames) -> Result<(), TransportError>;
    fn unsubscribe(&mut self);
    fn submit(&mut self, request: MeshRequest);
}

#[derive(Debug, Default)]
pub struct NullTransport;

impl MeshTransport for NullTransport {
    fn label(&self) -> &'static str {
        "null"
    }

    fn subscribe(&mut self, _topics: &TopicNames) -> Result<(), TransportError> {
        Ok(())
    }

    fn unsubscribe(&mut self) {}

    fn submit(&mut self, request: MeshRequest) {
        log::debug!(
            "[acquisition] null transport dropping {} request",
            request.kind
        );
    }
}
