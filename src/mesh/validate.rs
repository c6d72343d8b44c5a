use super::{ColorLayer, CostLayer, GeometryPayload, MaterialSet, TextureImage};
use siphasher::sip::SipHasher24;
use std::hash::{Hash, Hasher};
use thiserror::Error;

const FINGERPRINT_KEY_0: u64 = 0x6d65_7368_5f66_7031;
const FINGERPRINT_KEY_1: u64 = 0x0f1e_2d3c_4b5a_6978;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("payload has an empty mesh id")]
    EmptyMeshId,
    #[error("geometry for {0} has no vertices")]
    EmptyVertices(String),
    #[error("face {face} references vertex {index} but the mesh has {vertex_count} vertices")]
    FaceIndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("{normals} normals for {vertex_count} vertices")]
    NormalCountMismatch { normals: usize, vertex_count: usize },
    #[error("{colors} vertex colors for {vertex_count} vertices")]
    ColorCountMismatch { colors: usize, vertex_count: usize },
    #[error("cost layer '{layer}' has {costs} values for {vertex_count} vertices")]
    CostCountMismatch {
        layer: String,
        costs: usize,
        vertex_count: usize,
    },
    #[error("cost layer for {0} has an empty name")]
    EmptyLayerName(String),
    #[error("cluster {cluster} references face {face} but the mesh has {face_count} faces")]
    ClusterFaceOutOfRange {
        cluster: usize,
        face: u32,
        face_count: usize,
    },
    #[error("{assignments} cluster material assignments for {clusters} clusters")]
    ClusterMaterialMismatch { assignments: usize, clusters: usize },
    #[error("cluster {cluster} uses material {material} but only {materials} exist")]
    MaterialIndexOutOfRange {
        cluster: usize,
        material: u32,
        materials: usize,
    },
    #[error("{coords} texture coordinates for {vertex_count} vertices")]
    TexCoordCountMismatch { coords: usize, vertex_count: usize },
    #[error("texture {index} holds {actual} bytes, expected {expected}")]
    TextureSizeMismatch {
        index: u32,
        expected: usize,
        actual: usize,
    },
}

pub type ValidationResult = Result<(), ValidationError>;

pub fn geometry(payload: &GeometryPayload) -> ValidationResult {
    if payload.mesh_id.is_empty() {
        return Err(ValidationError::EmptyMeshId);
    }
    let vertex_count = payload.vertex_count();
    if vertex_count == 0 {
        return Err(ValidationError::EmptyVertices(payload.mesh_id.to_string()));
    }
    for (face, indices) in payload.faces.iter().enumerate() {
        if let Some(index) = indices.iter().find(|i| **i as usize >= vertex_count) {
            return Err(ValidationError::FaceIndexOutOfRange {
                face,
                index: *index,
                vertex_count,
            });
        }
    }
    if let Some(normals) = &payload.normals {
        if normals.len() != vertex_count {
            return Err(ValidationError::NormalCountMismatch {
                normals: normals.len(),
                vertex_count,
            });
        }
    }
    Ok(())
}

pub fn colors(layer: &ColorLayer, geometry: &GeometryPayload) -> ValidationResult {
    let vertex_count = geometry.vertex_count();
    if layer.colors.len() != vertex_count {
        return Err(ValidationError::ColorCountMismatch {
            colors: layer.colors.len(),
            vertex_count,
        });
    }
    Ok(())
}

pub fn costs(layer: &CostLayer, geometry: &GeometryPayload) -> ValidationResult {
    if layer.name.is_empty() {
        return Err(ValidationError::EmptyLayerName(layer.mesh_id.to_string()));
    }
    let vertex_count = geometry.vertex_count();
    if layer.costs.len() != vertex_count {
        return Err(ValidationError::CostCountMismatch {
            layer: layer.name.clone(),
            costs: layer.costs.len(),
            vertex_count,
        });
    }
    Ok(())
}

pub fn materials(set: &MaterialSet, geometry: &GeometryPayload) -> ValidationResult {
    let face_count = geometry.face_count();
    for (cluster, members) in set.clusters.iter().enumerate() {
        if let Some(face) = members
            .face_indices
            .iter()
            .find(|face| **face as usize >= face_count)
        {
            return Err(ValidationError::ClusterFaceOutOfRange {
                cluster,
                face: *face,
                face_count,
            });
        }
    }

    if set.cluster_materials.len() != set.clusters.len() {
        return Err(ValidationError::ClusterMaterialMismatch {
            assignments: set.cluster_materials.len(),
            clusters: set.clusters.len(),
        });
    }
    for (cluster, material) in set.cluster_materials.iter().enumerate() {
        if *material as usize >= set.materials.len() {
            return Err(ValidationError::MaterialIndexOutOfRange {
                cluster,
                material: *material,
                materials: set.materials.len(),
            });
        }
    }

    let vertex_count = geometry.vertex_count();
    if !set.vertex_tex_coords.is_empty() && set.vertex_tex_coords.len() != vertex_count {
        return Err(ValidationError::TexCoordCountMismatch {
            coords: set.vertex_tex_coords.len(),
            vertex_count,
        });
    }

    set.textures.iter().try_for_each(texture)
}

/// Checks the image buffer size; unknown encodings pass through untouched.
pub fn texture(image: &TextureImage) -> ValidationResult {
    let Some(bytes_per_pixel) = image.bytes_per_pixel() else {
        return Ok(());
    };
    let expected = image.width as usize * image.height as usize * bytes_per_pixel;
    if image.data.len() != expected {
        return Err(ValidationError::TextureSizeMismatch {
            index: image.index,
            expected,
            actual: image.data.len(),
        });
    }
    Ok(())
}

/// Stable hash of a mesh's structure (vertex count and face topology).
///
/// Two geometries with equal fingerprints can share vertex-indexed attributes;
/// vertex positions and normals do not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryFingerprint {
    pub vertex_count: usize,
    pub topology_hash: u64,
}

impl GeometryFingerprint {
    pub fn of(payload: &GeometryPayload) -> Self {
        let mut hasher = SipHasher24::new_with_keys(FINGERPRINT_KEY_0, FINGERPRINT_KEY_1);
        payload.faces.len().hash(&mut hasher);
        payload.faces.hash(&mut hasher);
        Self {
            vertex_count: payload.vertex_count(),
            topology_hash: hasher.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Cluster, Header, Material};

    fn triangle() -> GeometryPayload {
        GeometryPayload::new(
            "tri",
            Header::new("map", 1),
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn rejects_empty_vertex_set() {
        let payload = GeometryPayload::new("m", Header::default(), Vec::new(), Vec::new());
        assert_eq!(
            geometry(&payload),
            Err(ValidationError::EmptyVertices("m".into()))
        );
    }

    #[test]
    fn rejects_face_index_past_vertex_count() {
        let mut payload = triangle();
        payload.faces.push([0, 2, 3]);
        assert_eq!(
            geometry(&payload),
            Err(ValidationError::FaceIndexOutOfRange {
                face: 1,
                index: 3,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn rejects_empty_mesh_id() {
        let mut payload = triangle();
        payload.mesh_id = crate::mesh::MeshId::new("");
        assert_eq!(geometry(&payload), Err(ValidationError::EmptyMeshId));
    }

    #[test]
    fn normals_must_match_vertices() {
        let payload = triangle().with_normals(vec![[0.0, 0.0, 1.0]]);
        assert!(matches!(
            geometry(&payload),
            Err(ValidationError::NormalCountMismatch { .. })
        ));
    }

    #[test]
    fn attribute_lengths_follow_geometry() {
        let geometry = triangle();
        assert!(colors(&ColorLayer::new("tri", 1, vec![[1.0; 4]; 3]), &geometry).is_ok());
        assert!(colors(&ColorLayer::new("tri", 1, vec![[1.0; 4]; 2]), &geometry).is_err());
        assert!(costs(&CostLayer::new("tri", 1, "slope", vec![0.0; 3]), &geometry).is_ok());
        assert!(matches!(
            costs(&CostLayer::new("tri", 1, "", vec![0.0; 3]), &geometry),
            Err(ValidationError::EmptyLayerName(_))
        ));
    }

    #[test]
    fn material_clusters_are_bounds_checked() {
        let geometry = triangle();
        let mut set = MaterialSet::new("tri", 1);
        set.materials.push(Material {
            color: [1.0; 4],
            texture_index: None,
        });
        set.clusters.push(Cluster {
            face_indices: vec![0],
        });
        set.cluster_materials.push(0);
        assert!(materials(&set, &geometry).is_ok());

        set.cluster_materials[0] = 4;
        assert!(matches!(
            materials(&set, &geometry),
            Err(ValidationError::MaterialIndexOutOfRange { material: 4, .. })
        ));

        set.cluster_materials[0] = 0;
        set.clusters[0].face_indices.push(9);
        assert!(matches!(
            materials(&set, &geometry),
            Err(ValidationError::ClusterFaceOutOfRange { face: 9, .. })
        ));
    }

    #[test]
    fn texture_size_is_checked_for_known_encodings() {
        let mut image = TextureImage {
            mesh_id: "tri".into(),
            stamp_ms: 1,
            index: 0,
            width: 2,
            height: 2,
            encoding: "rgba8".into(),
            data: vec![0; 16],
        };
        assert!(texture(&image).is_ok());
        image.data.truncate(15);
        assert!(texture(&image).is_err());
        image.encoding = "jpeg".into();
        assert!(texture(&image).is_ok());
    }

    #[test]
    fn fingerprint_ignores_positions_but_not_topology() {
        let base = triangle();
        let mut moved = base.clone();
        moved.vertices[0] = [5.0, 5.0, 5.0];
        assert_eq!(GeometryFingerprint::of(&base), GeometryFingerprint::of(&moved));

        let mut rewired = base.clone();
        rewired.faces[0] = [0, 2, 1];
        assert_ne!(GeometryFingerprint::of(&base), GeometryFingerprint::of(&rewired));
    }
}
