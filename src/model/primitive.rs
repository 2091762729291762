//! Geometry and primitive types shared by import and dispatch

use glam::{Mat4, Vec3};

use crate::backend::{
    BindGroupHandle, BufferHandle, IndexFormat, PrimitiveTopology, RenderPipelineHandle,
};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in points {
            let p = Vec3::from_array(*p);
            min = min.min(p);
            max = max.max(p);
        }
        if points.is_empty() {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        }
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners: Vec<[f32; 3]> = (0..8)
            .map(|i| {
                let corner = Vec3::new(
                    if i & 1 == 0 { self.min.x } else { self.max.x },
                    if i & 2 == 0 { self.min.y } else { self.max.y },
                    if i & 4 == 0 { self.min.z } else { self.max.z },
                );
                matrix.transform_point3(corner).to_array()
            })
            .collect();
        Self::from_points(&corners)
    }
}

/// Index data at the width the file declares; 8-bit indices are widened to 16 bits.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    /// Sequential indices for unindexed primitives.
    pub fn sequential(count: usize) -> Self {
        if count <= u16::MAX as usize {
            IndexData::U16((0..count as u16).collect())
        } else {
            IndexData::U32((0..count as u32).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> IndexFormat {
        match self {
            IndexData::U16(_) => IndexFormat::Uint16,
            IndexData::U32(_) => IndexFormat::Uint32,
        }
    }

    pub fn get(&self, i: usize) -> Option<usize> {
        match self {
            IndexData::U16(v) => v.get(i).map(|&x| x as usize),
            IndexData::U32(v) => v.get(i).map(|&x| x as usize),
        }
    }

    /// Bytes padded to a four-byte multiple for upload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = match self {
            IndexData::U16(v) => bytemuck::cast_slice(v).to_vec(),
            IndexData::U32(v) => bytemuck::cast_slice(v).to_vec(),
        };
        bytes.resize(bytes.len().next_multiple_of(4), 0);
        bytes
    }
}

/// One mesh primitive's vertex streams, shared by every node instancing the mesh
#[derive(Debug, Clone)]
pub struct GeometryData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub indices: IndexData,
    pub topology: PrimitiveTopology,
    pub strip_index_format: Option<IndexFormat>,
    /// Material index declared by the primitive
    pub material: usize,
    pub bounds: Aabb,
}

/// A geometry placed by one world matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveData {
    pub geometry: usize,
    pub material: usize,
    /// Index into [`ModelData::world_matrices`](super::ModelData::world_matrices)
    pub matrix: usize,
    pub world_bounds: Aabb,
}

/// Uploaded vertex and index buffers of one geometry
#[derive(Debug)]
pub struct Geometry {
    pub positions: BufferHandle,
    pub normals: BufferHandle,
    pub texcoords: BufferHandle,
    pub indices: BufferHandle,
    pub index_format: IndexFormat,
    pub index_count: u32,
}

/// Uploaded primitive, ready to draw
#[derive(Debug)]
pub struct Primitive {
    pub geometry: usize,
    pub material: usize,
    pub object_uniform: BufferHandle,
    pub object_group: BindGroupHandle,
    pub world_bounds: Aabb,
    pub pipeline: RenderPipelineHandle,
}

/// Face normals accumulated per vertex for triangle lists without a NORMAL attribute.
pub fn compute_normals(positions: &[[f32; 3]], indices: &IndexData) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in 0..indices.len() / 3 {
        let corners = [
            indices.get(tri * 3),
            indices.get(tri * 3 + 1),
            indices.get(tri * 3 + 2),
        ];
        let [Some(a), Some(b), Some(c)] = corners else {
            continue;
        };
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa = Vec3::from_array(positions[a]);
        let face = (Vec3::from_array(positions[b]) - pa).cross(Vec3::from_array(positions[c]) - pa);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}
