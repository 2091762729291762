//! glTF models and the PBR draw dispatch
//!
//! Loading is split in two: [`ModelData`] is the CPU-side import (geometry, materials,
//! decoded images, the flattened world-matrix table), and [`ModelRenderer::upload`] turns it
//! into GPU buffers, textures, bind groups and pipeline variants.

mod dispatch;
mod loader;
mod material;
mod primitive;
pub mod scene_graph;
pub mod shaders;
mod sphere_grid;

pub use dispatch::*;
pub use loader::*;
pub use material::*;
pub use primitive::*;
pub use sphere_grid::sphere_grid;

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur while importing or uploading a model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("glTF parse error: {0}")]
    Parse(#[from] gltf::Error),
    #[error("unsupported topology {mode} in mesh {mesh} primitive {primitive}")]
    UnsupportedTopology {
        mode: String,
        mesh: usize,
        primitive: usize,
    },
    #[error("mesh {mesh} primitive {primitive} has no POSITION attribute")]
    MissingPositions { mesh: usize, primitive: usize },
    #[error("mesh {mesh} primitive {primitive} has no material")]
    MissingMaterial { mesh: usize, primitive: usize },
    #[error("materials use textures but the document defines no sampler")]
    MissingSampler,
    #[error("document has no scene")]
    MissingScene,
    #[error("image {index} has unsupported format {format}")]
    UnsupportedImageFormat { index: usize, format: String },
    #[error("GPU upload failed: {0}")]
    Backend(#[from] BackendError),
}
