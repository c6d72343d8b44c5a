use super::ServiceNames;
use crate::mesh::validate::ValidationError;
use crate::mesh::{
    ColorLayer, CostLayer, GeometryPayload, MaterialSet, MeshId, TextureImage,
};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Uuid,
    Geometry,
    VertexColors,
    VertexCosts,
    Materials,
    Texture(u32),
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Uuid => f.write_str("uuid"),
            RequestKind::Geometry => f.write_str("geometry"),
            RequestKind::VertexColors => f.write_str("vertex colors"),
            RequestKind::VertexCosts => f.write_str("vertex costs"),
            RequestKind::Materials => f.write_str("materials"),
            RequestKind::Texture(index) => write!(f, "texture {index}"),
        }
    }
}

/// Identifies one outstanding round trip. Tickets from an older epoch are
/// dead: their responses are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTicket {
    epoch: u64,
    sequence: u64,
}

impl RequestTicket {
    pub const fn epoch(self) -> u64 {
        self.epoch
    }

    pub const fn sequence(self) -> u64 {
        self.sequence
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshRequest {
    pub ticket: RequestTicket,
    pub kind: RequestKind,
    pub service: String,
    pub mesh_id: Option<MeshId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResponse {
    Uuid(MeshId),
    Geometry(GeometryPayload),
    VertexColors(ColorLayer),
    VertexCosts(Vec<CostLayer>),
    Materials(MaterialSet),
    Texture(TextureImage),
}

impl ServiceResponse {
    fn answers(&self, kind: &RequestKind) -> bool {
        match (self, kind) {
            (ServiceResponse::Uuid(_), RequestKind::Uuid)
            | (ServiceResponse::Geometry(_), RequestKind::Geometry)
            | (ServiceResponse::VertexColors(_), RequestKind::VertexColors)
            | (ServiceResponse::VertexCosts(_), RequestKind::VertexCosts)
            | (ServiceResponse::Materials(_), RequestKind::Materials) => true,
            (ServiceResponse::Texture(image), RequestKind::Texture(index)) => image.index == *index,
            _ => false,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ServiceResponse::Uuid(_) => "uuid",
            ServiceResponse::Geometry(_) => "geometry",
            ServiceResponse::VertexColors(_) => "vertex colors",
            ServiceResponse::VertexCosts(_) => "vertex costs",
            ServiceResponse::Materials(_) => "materials",
            ServiceResponse::Texture(_) => "texture",
        }
    }

    /// Mesh ids carried by the payload; a uuid response names a new mesh.
    fn mesh_ids(&self) -> Vec<&MeshId> {
        match self {
            ServiceResponse::Uuid(_) => Vec::new(),
            ServiceResponse::Geometry(payload) => vec![&payload.mesh_id],
            ServiceResponse::VertexColors(layer) => vec![&layer.mesh_id],
            ServiceResponse::VertexCosts(layers) => layers.iter().map(|l| &l.mesh_id).collect(),
            ServiceResponse::Materials(set) => vec![&set.mesh_id],
            ServiceResponse::Texture(image) => vec![&image.mesh_id],
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("{kind} request for '{}' failed: {source}", .mesh_id.as_ref().map(MeshId::as_str).unwrap_or("-"))]
    RequestFailed {
        kind: RequestKind,
        mesh_id: Option<MeshId>,
        source: ServiceError,
    },
    #[error("expected a {expected} response, received {received}")]
    UnexpectedResponse {
        expected: RequestKind,
        received: &'static str,
    },
    #[error("{kind} response for '{received}' does not match requested mesh '{requested}'")]
    MismatchedMesh {
        kind: RequestKind,
        requested: MeshId,
        received: MeshId,
    },
    #[error("{kind} response rejected: {source}")]
    Rejected {
        kind: RequestKind,
        source: ValidationError,
    },
    #[error("no service configured for {0} requests")]
    ServiceNotConfigured(RequestKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub mesh_id: Option<MeshId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Delivered {
        request: PendingRequest,
        response: ServiceResponse,
    },
    Failed(AcquisitionError),
    /// Superseded epoch, unknown or already answered ticket.
    Discarded,
}

/// Ticket bookkeeping and ordering for the pull cycle:
/// uuid, then geometry, then colors/costs/materials, then textures.
#[derive(Debug, Default)]
pub struct RequestCycle {
    epoch: u64,
    next_sequence: u64,
    outstanding: HashMap<RequestTicket, PendingRequest>,
}

impl RequestCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn is_outstanding(&self, kind: &RequestKind, mesh_id: Option<&MeshId>) -> bool {
        self.outstanding
            .values()
            .any(|pending| pending.kind == *kind && pending.mesh_id.as_ref() == mesh_id)
    }

    /// Opens a cycle by asking for the current mesh id.
    pub fn start(&mut self, services: &ServiceNames) -> Result<MeshRequest, AcquisitionError> {
        self.issue(RequestKind::Uuid, None, services)
    }

    pub fn after_uuid(
        &mut self,
        mesh_id: MeshId,
        services: &ServiceNames,
    ) -> Result<MeshRequest, AcquisitionError> {
        self.issue(RequestKind::Geometry, Some(mesh_id), services)
    }

    /// Attribute requests once geometry for `mesh_id` is known. Kinds
    /// without a configured service, or already in flight, are skipped.
    pub fn after_geometry(&mut self, mesh_id: &MeshId, services: &ServiceNames) -> Vec<MeshRequest> {
        [
            RequestKind::VertexColors,
            RequestKind::VertexCosts,
            RequestKind::Materials,
        ]
        .into_iter()
        .filter_map(|kind| self.issue_optional(kind, mesh_id, services))
        .collect()
    }

    /// Materials alone, for meshes whose other attributes are pushed.
    pub fn materials_for(&mut self, mesh_id: &MeshId, services: &ServiceNames) -> Option<MeshRequest> {
        self.issue_optional(RequestKind::Materials, mesh_id, services)
    }

    pub fn after_materials(
        &mut self,
        mesh_id: &MeshId,
        missing_textures: &[u32],
        services: &ServiceNames,
    ) -> Vec<MeshRequest> {
        missing_textures
            .iter()
            .filter_map(|index| self.issue_optional(RequestKind::Texture(*index), mesh_id, services))
            .collect()
    }

    pub fn complete(
        &mut self,
        ticket: RequestTicket,
        result: Result<ServiceResponse, ServiceError>,
    ) -> Completion {
        if ticket.epoch != self.epoch {
            log::debug!(
                "[acquisition] discarding response from epoch {} (current {})",
                ticket.epoch,
                self.epoch
            );
            return Completion::Discarded;
        }
        let Some(request) = self.outstanding.remove(&ticket) else {
            log::debug!(
                "[acquisition] discarding response for unknown ticket {}",
                ticket.sequence
            );
            return Completion::Discarded;
        };

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                return Completion::Failed(AcquisitionError::RequestFailed {
                    kind: request.kind,
                    mesh_id: request.mesh_id,
                    source,
                });
            }
        };

        if !response.answers(&request.kind) {
            return Completion::Failed(AcquisitionError::UnexpectedResponse {
                expected: request.kind,
                received: response.label(),
            });
        }
        if let Some(requested) = &request.mesh_id {
            if let Some(received) = response.mesh_ids().into_iter().find(|id| *id != requested) {
                return Completion::Failed(AcquisitionError::MismatchedMesh {
                    kind: request.kind.clone(),
                    requested: requested.clone(),
                    received: received.clone(),
                });
            }
        }

        Completion::Delivered { request, response }
    }

    /// Abandons every outstanding request; late responses will be discarded.
    pub fn cancel(&mut self) -> usize {
        let abandoned = self.outstanding.len();
        self.outstanding.clear();
        self.epoch = self.epoch.wrapping_add(1);
        if abandoned > 0 {
            log::debug!("[acquisition] cancelled {abandoned} outstanding requests");
        }
        abandoned
    }

    /// Drops outstanding requests for a mesh that left the history. Their
    /// responses will be discarded.
    pub fn forget(&mut self, mesh_id: &MeshId) -> usize {
        let before = self.outstanding.len();
        self.outstanding
            .retain(|_, pending| pending.mesh_id.as_ref() != Some(mesh_id));
        let forgotten = before - self.outstanding.len();
        if forgotten > 0 {
            log::debug!("[acquisition] forgot {forgotten} requests for {mesh_id}");
        }
        forgotten
    }

    fn issue_optional(
        &mut self,
        kind: RequestKind,
        mesh_id: &MeshId,
        services: &ServiceNames,
    ) -> Option<MeshRequest> {
        if services.for_kind(&kind).is_empty() || self.is_outstanding(&kind, Some(mesh_id)) {
            return None;
        }
        self.issue(kind, Some(mesh_id.clone()), services).ok()
    }

    fn issue(
        &mut self,
        kind: RequestKind,
        mesh_id: Option<MeshId>,
        services: &ServiceNames,
    ) -> Result<MeshRequest, AcquisitionError> {
        let service = services.for_kind(&kind);
        if service.is_empty() {
            return Err(AcquisitionError::ServiceNotConfigured(kind));
        }

        self.next_sequence = self.next_sequence.wrapping_add(1);
        let ticket = RequestTicket {
            epoch: self.epoch,
            sequence: self.next_sequence,
        };
        self.outstanding.insert(
            ticket,
            PendingRequest {
                kind: kind.clone(),
                mesh_id: mesh_id.clone(),
            },
        );
        Ok(MeshRequest {
            ticket,
            kind,
            service: service.to_string(),
            mesh_id,
        })
    }
}
