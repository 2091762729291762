//! Built-in scene shown when no model is given

use glam::{Mat4, Vec3, Vec4};

use crate::backend::PrimitiveTopology;

use super::loader::ModelData;
use super::material::MaterialData;
use super::primitive::{Aabb, GeometryData, IndexData, PrimitiveData};

const GRID_SIZE: usize = 10;
const GRID_WIDTH: f32 = 5.0;
const SPHERE_RADIUS: f32 = 0.25;
const LATITUDE_LINES: u16 = 16;
const LONGITUDE_LINES: u16 = 16;

fn uv_sphere(radius: f32) -> GeometryData {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut texcoords = Vec::new();

    for lat in 0..=LATITUDE_LINES {
        let v = lat as f32 / LATITUDE_LINES as f32;
        let theta = v * std::f32::consts::PI;
        for lon in 0..=LONGITUDE_LINES {
            let u = lon as f32 / LONGITUDE_LINES as f32;
            let phi = u * std::f32::consts::TAU;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            positions.push((normal * radius).to_array());
            normals.push(normal.to_array());
            texcoords.push([u, v]);
        }
    }

    let stride = LONGITUDE_LINES + 1;
    let mut indices = Vec::new();
    for lat in 0..LATITUDE_LINES {
        for lon in 0..LONGITUDE_LINES {
            let a = lat * stride + lon;
            let b = a + stride;
            indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }

    GeometryData {
        bounds: Aabb::from_points(&positions),
        positions,
        normals,
        texcoords,
        indices: IndexData::U16(indices),
        topology: PrimitiveTopology::TriangleList,
        strip_index_format: None,
        material: 0,
    }
}

/// A grid of white spheres in the XY plane, roughness rising along x and metalness along y.
pub fn sphere_grid() -> ModelData {
    let sphere = uv_sphere(SPHERE_RADIUS);
    let step = 1.0 / (GRID_SIZE - 1) as f32;

    let mut model = ModelData::default();
    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            let (x, y) = (i as f32 * step, j as f32 * step);
            let matrix = Mat4::from_translation(Vec3::new(
                GRID_WIDTH * (x - 0.5),
                GRID_WIDTH * (y - 0.5),
                0.0,
            ));

            model.materials.push(MaterialData {
                name: Some(format!("sphere {i},{j}")),
                albedo: Vec4::ONE,
                roughness: x,
                metalness: y,
                ..Default::default()
            });
            model.primitives.push(PrimitiveData {
                geometry: 0,
                material: model.materials.len() - 1,
                matrix: model.world_matrices.len(),
                world_bounds: sphere.bounds.transformed(&matrix),
            });
            model.world_matrices.push(matrix);
        }
    }
    model.geometries.push(sphere);
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_layout() {
        let model = sphere_grid();
        assert_eq!(model.geometries.len(), 1);
        assert_eq!(model.primitives.len(), 100);
        assert_eq!(model.materials.len(), 100);
        assert!(model.transparent_primitives().is_empty());

        let first = model.world_matrices[0].w_axis;
        let last = model.world_matrices[99].w_axis;
        assert_relative_eq!(first.x, -2.5);
        assert_relative_eq!(last.y, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_parameters_follow_axes() {
        let model = sphere_grid();
        // i = 9, j = 0: roughest dielectric
        let material = &model.materials[9 * GRID_SIZE];
        assert_relative_eq!(material.roughness, 1.0, epsilon = 1e-6);
        assert_relative_eq!(material.metalness, 0.0);
        assert_relative_eq!(model.materials[GRID_SIZE - 1].metalness, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sphere_is_closed_and_outward_facing() {
        let sphere = uv_sphere(1.0);
        for (p, n) in sphere.positions.iter().zip(&sphere.normals) {
            assert_relative_eq!(Vec3::from_array(*p).length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(Vec3::from_array(*p).dot(Vec3::from_array(*n)), 1.0, epsilon = 1e-5);
        }
        // A triangle on the equator winds counter-clockwise seen from outside
        let IndexData::U16(indices) = &sphere.indices else {
            panic!("sphere uses 16-bit indices");
        };
        let base = (LATITUDE_LINES / 2 * LONGITUDE_LINES) as usize * 6;
        let tri: Vec<Vec3> = indices[base..base + 3]
            .iter()
            .map(|&i| Vec3::from_array(sphere.positions[i as usize]))
            .collect();
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
        assert!(normal.dot(tri[0]) > 0.0);
    }
}
