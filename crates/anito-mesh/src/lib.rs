// SPDX-License-Identifier: CEPL-1.0
//! OBJ import for the scene shown once a renderer has been picked.

use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("{0} contains no meshes")]
    NoMeshes(PathBuf),
    #[error("{path}: {reason}")]
    MalformedMesh { path: PathBuf, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            albedo: Vec3::ONE,
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

/// One indexed triangle mesh. `normals` and `tex_coords` are either empty
/// or one per vertex.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub material: Material,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Loads the first mesh in an OBJ file, triangulated with a single index
/// buffer.
pub fn load_mesh(path: impl AsRef<Path>) -> Result<MeshData, MeshError> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, materials) = tobj::load_obj(path, &options).map_err(|source| MeshError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    if models.len() > 1 {
        debug!("{}: {} meshes, using the first", path.display(), models.len());
    }
    let model = models
        .into_iter()
        .next()
        .ok_or_else(|| MeshError::NoMeshes(path.to_path_buf()))?;
    let mesh = model.mesh;

    let malformed = |reason: String| MeshError::MalformedMesh {
        path: path.to_path_buf(),
        reason,
    };
    if mesh.positions.len() % 3 != 0 {
        return Err(malformed(format!("{} position floats", mesh.positions.len())));
    }
    let vertex_count = mesh.positions.len() / 3;
    if !mesh.normals.is_empty() && mesh.normals.len() != mesh.positions.len() {
        return Err(malformed(format!(
            "{} normals for {vertex_count} vertices",
            mesh.normals.len() / 3
        )));
    }
    if !mesh.texcoords.is_empty() && mesh.texcoords.len() != vertex_count * 2 {
        return Err(malformed(format!(
            "{} tex coords for {vertex_count} vertices",
            mesh.texcoords.len() / 2
        )));
    }
    if let Some(&bad) = mesh.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(malformed(format!("index {bad} out of range for {vertex_count} vertices")));
    }

    let material = match (mesh.material_id, materials) {
        (Some(id), Ok(materials)) => materials
            .get(id)
            .and_then(|m| m.diffuse)
            .map(|d| Material {
                albedo: Vec3::from_array(d),
                ..Default::default()
            })
            .unwrap_or_default(),
        (Some(_), Err(e)) => {
            warn!("{}: materials unavailable ({e}), using defaults", path.display());
            Material::default()
        }
        (None, _) => Material::default(),
    };

    Ok(MeshData {
        vertices: mesh.positions.chunks_exact(3).map(Vec3::from_slice).collect(),
        normals: mesh.normals.chunks_exact(3).map(Vec3::from_slice).collect(),
        tex_coords: mesh.texcoords.chunks_exact(2).map(Vec2::from_slice).collect(),
        indices: mesh.indices,
        material,
    })
}
