pub mod validate;

pub use validate::{GeometryFingerprint, ValidationError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token naming one mesh instance across every attribute stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(String);

impl MeshId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MeshId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MeshId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Coordinate frame and acquisition time of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    pub frame_id: String,
    pub stamp_ms: u64,
}

impl Header {
    pub fn new(frame_id: impl Into<String>, stamp_ms: u64) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp_ms,
        }
    }
}

pub type Rgba = [f32; 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryPayload {
    pub mesh_id: MeshId,
    pub header: Header,
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
}

impl GeometryPayload {
    pub fn new(
        mesh_id: impl Into<MeshId>,
        header: Header,
        vertices: Vec<[f32; 3]>,
        faces: Vec<[u32; 3]>,
    ) -> Self {
        Self {
            mesh_id: mesh_id.into(),
            header,
            vertices,
            faces,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn stamp_ms(&self) -> u64 {
        self.header.stamp_ms
    }
}

/// Per-vertex RGBA colors for one mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorLayer {
    pub mesh_id: MeshId,
    pub stamp_ms: u64,
    pub colors: Vec<Rgba>,
}

impl ColorLayer {
    pub fn new(mesh_id: impl Into<MeshId>, stamp_ms: u64, colors: Vec<Rgba>) -> Self {
        Self {
            mesh_id: mesh_id.into(),
            stamp_ms,
            colors,
        }
    }
}

/// A named per-vertex scalar map, e.g. a traversability or roughness layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLayer {
    pub mesh_id: MeshId,
    pub stamp_ms: u64,
    pub name: String,
    pub costs: Vec<f32>,
}

impl CostLayer {
    pub fn new(
        mesh_id: impl Into<MeshId>,
        stamp_ms: u64,
        name: impl Into<String>,
        costs: Vec<f32>,
    ) -> Self {
        Self {
            mesh_id: mesh_id.into(),
            stamp_ms,
            name: name.into(),
            costs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Rgba,
    pub texture_index: Option<u32>,
}

/// A group of faces sharing one material.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cluster {
    pub face_indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureImage {
    pub mesh_id: MeshId,
    pub stamp_ms: u64,
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub encoding: String,
    pub data: Vec<u8>,
}

impl TextureImage {
    /// Bytes per pixel for the encodings the renderer understands.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self.encoding.as_str() {
            "mono8" => Some(1),
            "rgb8" | "bgr8" => Some(3),
            "rgba8" | "bgra8" => Some(4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSet {
    pub mesh_id: MeshId,
    pub stamp_ms: u64,
    pub materials: Vec<Material>,
    pub clusters: Vec<Cluster>,
    /// Material index for each cluster, parallel to `clusters`.
    pub cluster_materials: Vec<u32>,
    pub vertex_tex_coords: Vec<[f32; 2]>,
    pub textures: Vec<TextureImage>,
}

impl MaterialSet {
    pub fn new(mesh_id: impl Into<MeshId>, stamp_ms: u64) -> Self {
        Self {
            mesh_id: mesh_id.into(),
            stamp_ms,
            materials: Vec::new(),
            clusters: Vec::new(),
            cluster_materials: Vec::new(),
            vertex_tex_coords: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn texture(&self, index: u32) -> Option<&TextureImage> {
        self.textures.iter().find(|texture| texture.index == index)
    }

    /// Texture indices referenced by materials whose image has not arrived yet.
    pub fn missing_textures(&self) -> Vec<u32> {
        let mut missing: Vec<u32> = self
            .materials
            .iter()
            .filter_map(|material| material.texture_index)
            .filter(|index| self.texture(*index).is_none())
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Inserts or replaces the texture with the same index. Older images are
    /// ignored; returns whether the set changed.
    pub fn attach_texture(&mut self, texture: TextureImage) -> bool {
        match self
            .textures
            .iter_mut()
            .find(|existing| existing.index == texture.index)
        {
            Some(existing) if existing.stamp_ms > texture.stamp_ms => false,
            Some(existing) => {
                *existing = texture;
                true
            }
            None => {
                self.textures.push(texture);
                true
            }
        }
    }
}

/// The renderable unit: geometry plus whatever attributes have attached so far.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSnapshot {
    geometry: GeometryPayload,
    fingerprint: GeometryFingerprint,
    colors: Option<ColorLayer>,
    costs: Vec<CostLayer>,
    materials: Option<MaterialSet>,
}

impl MeshSnapshot {
    pub fn new(geometry: GeometryPayload) -> Self {
        let fingerprint = GeometryFingerprint::of(&geometry);
        Self {
            geometry,
            fingerprint,
            colors: None,
            costs: Vec::new(),
            materials: None,
        }
    }

    pub fn mesh_id(&self) -> &MeshId {
        &self.geometry.mesh_id
    }

    pub fn geometry(&self) -> &GeometryPayload {
        &self.geometry
    }

    pub fn fingerprint(&self) -> GeometryFingerprint {
        self.fingerprint
    }

    pub fn colors(&self) -> Option<&ColorLayer> {
        self.colors.as_ref()
    }

    /// Cost layers in the order their names were first seen.
    pub fn cost_layers(&self) -> &[CostLayer] {
        &self.costs
    }

    pub fn cost_layer(&self, name: &str) -> Option<&CostLayer> {
        self.costs.iter().find(|layer| layer.name == name)
    }

    pub fn cost_layer_names(&self) -> impl Iterator<Item = &str> {
        self.costs.iter().map(|layer| layer.name.as_str())
    }

    pub fn materials(&self) -> Option<&MaterialSet> {
        self.materials.as_ref()
    }

    /// Swaps in geometry with the same structure; attached attributes stay valid.
    pub(crate) fn replace_geometry(&mut self, geometry: GeometryPayload) {
        debug_assert_eq!(self.fingerprint, GeometryFingerprint::of(&geometry));
        self.geometry = geometry;
    }

    pub(crate) fn set_colors(&mut self, colors: ColorLayer) -> bool {
        if let Some(existing) = &self.colors {
            if existing.stamp_ms > colors.stamp_ms {
                return false;
            }
        }
        self.colors = Some(colors);
        true
    }

    pub(crate) fn set_cost_layer(&mut self, layer: CostLayer) -> bool {
        match self.costs.iter_mut().find(|existing| existing.name == layer.name) {
            Some(existing) if existing.stamp_ms > layer.stamp_ms => false,
            Some(existing) => {
                *existing = layer;
                true
            }
            None => {
                self.costs.push(layer);
                true
            }
        }
    }

    pub(crate) fn set_materials(&mut self, mut materials: MaterialSet) -> bool {
        if let Some(existing) = &mut self.materials {
            if existing.stamp_ms > materials.stamp_ms {
                return false;
            }
            // Textures fetched for the previous set stay usable if still referenced.
            for texture in existing.textures.drain(..) {
                if materials.texture(texture.index).is_none() {
                    materials.textures.push(texture);
                }
            }
        }
        self.materials = Some(materials);
        true
    }

    pub(crate) fn attach_texture(&mut self, texture: TextureImage) -> bool {
        match &mut self.materials {
            Some(materials) => materials.attach_texture(texture),
            None => false,
        }
    }
}
