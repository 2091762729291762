//! glTF import tests.
//!
//! Documents are built in memory with [`common::GlbBuilder`] and imported through
//! `ModelData::import_slice`, so these cover the same path as loading a file.

mod common;

use approx::assert_relative_eq;
use glam::{Mat4, Quat, Vec3};
use rstest::rstest;

use common::{primitive, triangle_glb, GlbBuilder, MODE_TRIANGLE_FAN, MODE_TRIANGLE_STRIP, TRIANGLE};
use ibl_renderer::backend::{AddressMode, FilterMode, IndexFormat, PrimitiveTopology};
use ibl_renderer::model::{AlphaMode, IndexData, MaterialFeatures, ModelData, ModelError};

const PLAIN_MATERIAL: &str = r#"{ "pbrMetallicRoughness": { "roughnessFactor": 0.3, "metallicFactor": 0.7 } }"#;

fn assert_mat4_eq(actual: Mat4, expected: Mat4) {
    for (a, e) in actual.to_cols_array().iter().zip(expected.to_cols_array()) {
        assert_relative_eq!(*a, e, epsilon = 1e-5);
    }
}

#[test]
fn test_garbage_is_a_parse_error() {
    let err = ModelData::import_slice(b"definitely not glTF").unwrap_err();
    assert!(matches!(err, ModelError::Parse(_)), "{err}");
}

#[test]
fn test_plain_triangle() {
    let model = ModelData::import_slice(&triangle_glb(Some(PLAIN_MATERIAL), None)).unwrap();

    assert_eq!(model.geometries.len(), 1);
    assert_eq!(model.primitives.len(), 1);
    assert_eq!(model.world_matrices, vec![Mat4::IDENTITY]);
    assert!(model.sampler.is_none());

    let material = &model.materials[0];
    assert_relative_eq!(material.roughness, 0.3);
    assert_relative_eq!(material.metalness, 0.7);
    assert_eq!(material.alpha_mode, AlphaMode::Opaque);
    assert!(material.features().is_empty());

    let geometry = &model.geometries[0];
    assert_eq!(geometry.topology, PrimitiveTopology::TriangleList);
    assert_eq!(geometry.strip_index_format, None);
    assert_eq!(geometry.texcoords, vec![[0.0, 0.0]; 3]);
}

#[test]
fn test_missing_normals_are_computed_from_winding() {
    let model = ModelData::import_slice(&triangle_glb(Some(PLAIN_MATERIAL), None)).unwrap();
    for normal in &model.geometries[0].normals {
        assert_relative_eq!(normal[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(normal[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(normal[2], 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_triangle_fan_is_rejected() {
    let glb = triangle_glb(Some(PLAIN_MATERIAL), Some(MODE_TRIANGLE_FAN));
    let err = ModelData::import_slice(&glb).unwrap_err();
    assert!(
        matches!(err, ModelError::UnsupportedTopology { mesh: 0, primitive: 0, .. }),
        "{err}"
    );
}

#[test]
fn test_primitive_without_material_is_rejected() {
    let err = ModelData::import_slice(&triangle_glb(None, None)).unwrap_err();
    assert!(
        matches!(err, ModelError::MissingMaterial { mesh: 0, primitive: 0 }),
        "{err}"
    );
}

#[test]
fn test_u8_indices_are_widened() {
    let mut glb = GlbBuilder::new();
    let positions = glb.add_positions(&TRIANGLE);
    let indices = glb.add_indices_u8(&[2, 1, 0]);
    let material = glb.add_material(PLAIN_MATERIAL);
    let mesh = glb.add_mesh(&[primitive(&[("POSITION", positions)], Some(indices), Some(material), None)]);
    glb.add_root(&format!(r#"{{ "mesh": {mesh} }}"#));

    let model = ModelData::import_slice(&glb.build()).unwrap();
    let geometry = &model.geometries[0];
    assert_eq!(geometry.indices, IndexData::U16(vec![2, 1, 0]));
    assert_eq!(geometry.indices.format(), IndexFormat::Uint16);
}

#[test]
fn test_strip_keeps_declared_index_width() {
    let mut glb = GlbBuilder::new();
    let positions = glb.add_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]]);
    let normals = glb.add_normals(&[[0.0, 0.0, 1.0]; 4]);
    let texcoords = glb.add_texcoords(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
    let indices = glb.add_indices_u32(&[0, 1, 2, 3]);
    let material = glb.add_material(PLAIN_MATERIAL);
    let mesh = glb.add_mesh(&[primitive(
        &[("POSITION", positions), ("NORMAL", normals), ("TEXCOORD_0", texcoords)],
        Some(indices),
        Some(material),
        Some(MODE_TRIANGLE_STRIP),
    )]);
    glb.add_root(&format!(r#"{{ "mesh": {mesh} }}"#));

    let model = ModelData::import_slice(&glb.build()).unwrap();
    let geometry = &model.geometries[0];
    assert_eq!(geometry.topology, PrimitiveTopology::TriangleStrip);
    assert_eq!(geometry.strip_index_format, Some(IndexFormat::Uint32));
    assert_eq!(geometry.indices, IndexData::U32(vec![0, 1, 2, 3]));
    assert_eq!(geometry.texcoords[3], [1.0, 1.0]);
}

#[test]
fn test_mesh_is_placed_by_its_ancestors() {
    let mut glb = GlbBuilder::new();
    let positions = glb.add_positions(&TRIANGLE);
    let material = glb.add_material(PLAIN_MATERIAL);
    let mesh = glb.add_mesh(&[primitive(&[("POSITION", positions)], None, Some(material), None)]);

    // Root translates by (1, 2, 3). Its child turns a quarter about Y, which moves only the
    // grandchild.
    glb.add_root(r#"{ "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 1,2,3,1], "children": [1] }"#);
    glb.add_node(&format!(
        r#"{{ "rotation": [0, 0.70710677, 0, 0.70710677], "mesh": {mesh}, "children": [2] }}"#
    ));
    glb.add_node(&format!(r#"{{ "mesh": {mesh} }}"#));

    let model = ModelData::import_slice(&glb.build()).unwrap();
    assert_eq!(model.world_matrices.len(), 3);
    assert_eq!(model.primitives.len(), 2);

    let translation = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let child = &model.primitives[0];
    assert_eq!(child.matrix, 1);
    assert_mat4_eq(model.world_matrices[child.matrix], translation);
    assert_relative_eq!(child.world_bounds.min.x, 1.0, epsilon = 1e-5);
    assert_relative_eq!(child.world_bounds.max.x, 2.0, epsilon = 1e-5);
    assert_relative_eq!(child.world_bounds.max.z, 3.0, epsilon = 1e-5);

    let grandchild = &model.primitives[1];
    assert_eq!(grandchild.matrix, 2);
    let expected = translation * Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
    assert_mat4_eq(model.world_matrices[grandchild.matrix], expected);

    // +X rotates onto -Z, then the translation applies
    assert_relative_eq!(grandchild.world_bounds.min.z, 2.0, epsilon = 1e-5);
    assert_relative_eq!(grandchild.world_bounds.max.z, 3.0, epsilon = 1e-5);
    assert_relative_eq!(grandchild.world_bounds.min.x, 1.0, epsilon = 1e-5);
}

#[test]
fn test_instanced_mesh_shares_geometry() {
    let mut glb = GlbBuilder::new();
    let positions = glb.add_positions(&TRIANGLE);
    let material = glb.add_material(PLAIN_MATERIAL);
    let mesh = glb.add_mesh(&[primitive(&[("POSITION", positions)], None, Some(material), None)]);
    glb.add_root(&format!(r#"{{ "mesh": {mesh} }}"#));
    // Node 1 places its child, node 2
    glb.add_root(r#"{ "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 10,0,0,1], "children": [2] }"#);
    glb.add_node(&format!(r#"{{ "mesh": {mesh} }}"#));

    let model = ModelData::import_slice(&glb.build()).unwrap();
    assert_eq!(model.geometries.len(), 1);
    assert_eq!(model.primitives.len(), 2);
    assert_eq!(model.primitives[0].geometry, model.primitives[1].geometry);
    assert_ne!(model.primitives[0].matrix, model.primitives[1].matrix);
    assert_relative_eq!(model.primitives[1].world_bounds.center().x, 10.5, epsilon = 1e-5);
}

#[rstest]
#[case(r#"{ "alphaMode": "BLEND" }"#, AlphaMode::Blend, vec![0])]
#[case(r#"{ "alphaMode": "MASK", "alphaCutoff": 0.25 }"#, AlphaMode::Mask, vec![])]
#[case(r#"{ "doubleSided": true }"#, AlphaMode::Opaque, vec![])]
fn test_alpha_modes(#[case] material: &str, #[case] mode: AlphaMode, #[case] transparent: Vec<usize>) {
    let model = ModelData::import_slice(&triangle_glb(Some(material), None)).unwrap();
    assert_eq!(model.materials[0].alpha_mode, mode);
    assert_eq!(model.transparent_primitives(), transparent);
}

#[test]
fn test_mask_cutoff_is_read() {
    let glb = triangle_glb(Some(r#"{ "alphaMode": "MASK", "alphaCutoff": 0.25 }"#), None);
    let model = ModelData::import_slice(&glb).unwrap();
    assert_relative_eq!(model.materials[0].alpha_cutoff, 0.25);
}

fn textured_triangle(sampler: Option<&str>) -> Vec<u8> {
    let mut glb = GlbBuilder::new();
    let positions = glb.add_positions(&TRIANGLE);
    let texture = glb.add_png_texture(2, 2, [200, 100, 50, 255]);
    if let Some(sampler) = sampler {
        glb.add_sampler(sampler);
    }
    let material = glb.add_material(&format!(
        r#"{{ "pbrMetallicRoughness": {{ "baseColorTexture": {{ "index": {texture} }} }} }}"#
    ));
    let mesh = glb.add_mesh(&[primitive(&[("POSITION", positions)], None, Some(material), None)]);
    glb.add_root(&format!(r#"{{ "mesh": {mesh} }}"#));
    glb.build()
}

#[test]
fn test_textures_without_sampler_are_rejected() {
    let err = ModelData::import_slice(&textured_triangle(None)).unwrap_err();
    assert!(matches!(err, ModelError::MissingSampler), "{err}");
}

#[test]
fn test_textured_material_with_sampler() {
    let sampler = r#"{ "magFilter": 9728, "minFilter": 9987, "wrapS": 33071, "wrapT": 33648 }"#;
    let model = ModelData::import_slice(&textured_triangle(Some(sampler))).unwrap();

    let material = &model.materials[0];
    assert_eq!(material.features(), MaterialFeatures::BASE_COLOR);
    assert_eq!(material.base_color_texture, Some(0));

    let image = &model.images[0];
    assert_eq!((image.width, image.height), (2, 2));
    assert_eq!(image.rgba, [200, 100, 50, 255].repeat(4));

    let desc = model.sampler.as_ref().unwrap();
    assert_eq!(desc.mag_filter, FilterMode::Nearest);
    assert_eq!(desc.min_filter, FilterMode::Linear);
    assert_eq!(desc.mipmap_filter, FilterMode::Linear);
    assert_eq!(desc.address_mode_u, AddressMode::ClampToEdge);
    assert_eq!(desc.address_mode_v, AddressMode::MirrorRepeat);
    assert_eq!(desc.address_mode_w, AddressMode::Repeat);
}

#[test]
fn test_textured_model_uploads_through_renderer() {
    let sampler = r#"{ "magFilter": 9729, "minFilter": 9729 }"#;
    let data = ModelData::import_slice(&textured_triangle(Some(sampler))).unwrap();

    let mut renderer = common::recording_renderer(64, 64);
    renderer.set_model(&data).unwrap();

    let model = renderer.model();
    assert_eq!(model.primitives.len(), 1);
    assert_eq!(model.texture_count(), 1);
    assert_eq!(model.materials[0].features, MaterialFeatures::BASE_COLOR);
}
