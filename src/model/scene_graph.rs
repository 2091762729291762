//! Flattening of the glTF node hierarchy into a world-matrix table
//!
//! The table is built once at load by a depth-first walk from the scene roots. Entry 0 is the
//! identity that roots are placed with. A mesh node is placed with the matrix in effect when
//! it is reached, the product of its ancestors' local transforms; its own local transform only
//! moves its children. A local transform is the node's explicit matrix when it has one,
//! otherwise its rotation quaternion. Translation and scale of decomposed transforms are not
//! applied.

use glam::{Mat4, Quat};
use gltf::scene::Transform;

/// A mesh placed by one entry of the world-matrix table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInstance {
    pub mesh: usize,
    pub matrix: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WorldMatrices {
    /// The root identity, then one entry per node with children, in visiting order
    pub matrices: Vec<Mat4>,
    pub instances: Vec<MeshInstance>,
}

pub fn local_transform(node: &gltf::Node<'_>) -> Mat4 {
    match node.transform() {
        Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        Transform::Decomposed { rotation, .. } => Mat4::from_quat(Quat::from_array(rotation).normalize()),
    }
}

pub fn flatten(scene: &gltf::Scene<'_>) -> WorldMatrices {
    let mut table = WorldMatrices {
        matrices: vec![Mat4::IDENTITY],
        instances: Vec::new(),
    };
    for root in scene.nodes() {
        visit(&root, 0, &mut table);
    }
    table
}

fn visit(node: &gltf::Node<'_>, in_effect: usize, table: &mut WorldMatrices) {
    if let Some(mesh) = node.mesh() {
        table.instances.push(MeshInstance {
            mesh: mesh.index(),
            matrix: in_effect,
        });
    }

    let mut children = node.children().peekable();
    if children.peek().is_none() {
        return;
    }
    let world = table.matrices[in_effect] * local_transform(node);
    let matrix = table.matrices.len();
    table.matrices.push(world);
    for child in children {
        visit(&child, matrix, table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    // 36 zero bytes backing the one position accessor
    const MESH_JSON: &str = r#"
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [0, 0, 0], "max": [1, 1, 1]
        }]"#;

    fn document(nodes: &str, roots: &str) -> gltf::Gltf {
        let json = format!(
            r#"{{
                "asset": {{ "version": "2.0" }},
                "scene": 0,
                "scenes": [{{ "nodes": {roots} }}],
                "nodes": {nodes},
                {MESH_JSON}
            }}"#
        );
        match gltf::Gltf::from_slice(json.as_bytes()) {
            Ok(gltf) => gltf,
            Err(e) => panic!("fixture rejected: {e}"),
        }
    }

    fn quarter_turn_y() -> [f32; 4] {
        Quat::from_rotation_y(std::f32::consts::FRAC_PI_2).to_array()
    }

    #[test]
    fn test_leaf_matrix_is_product_of_ancestors() {
        let [x, y, z, w] = quarter_turn_y();
        let rx = Quat::from_rotation_x(0.3).to_array();
        let nodes = format!(
            r#"[
                {{ "rotation": [{x}, {y}, {z}, {w}], "children": [1] }},
                {{ "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 1,2,3,1], "children": [2] }},
                {{ "rotation": [{}, {}, {}, {}], "mesh": 0 }}
            ]"#,
            rx[0], rx[1], rx[2], rx[3]
        );
        let gltf = document(&nodes, "[0]");
        let scene = gltf.default_scene().unwrap();
        let table = flatten(&scene);

        // The leaf's own rotation is not part of its placement
        let expected = Mat4::from_quat(Quat::from_array([x, y, z, w]))
            * Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(table.matrices.len(), 3);
        assert_eq!(table.instances, vec![MeshInstance { mesh: 0, matrix: 2 }]);
        assert!(table.matrices[2].abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_mesh_node_transform_moves_only_children() {
        let nodes = r#"[
            { "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 4,0,0,1], "mesh": 0, "children": [1] },
            { "mesh": 0 }
        ]"#;
        let table = flatten(&document(nodes, "[0]").default_scene().unwrap());

        assert_eq!(
            table.instances,
            vec![
                MeshInstance { mesh: 0, matrix: 0 },
                MeshInstance { mesh: 0, matrix: 1 },
            ]
        );
        assert_eq!(table.matrices[0], Mat4::IDENTITY);
        assert_eq!(table.matrices[1], Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_decomposed_translation_is_not_applied() {
        let gltf = document(
            r#"[{ "translation": [5, 0, 0], "scale": [2, 2, 2], "children": [1] }, { "mesh": 0 }]"#,
            "[0]",
        );
        let table = flatten(&gltf.default_scene().unwrap());
        assert_eq!(table.instances[0].matrix, 1);
        assert_eq!(table.matrices[1], Mat4::IDENTITY);
    }

    #[test]
    fn test_siblings_share_the_parent_matrix() {
        let gltf = document(
            r#"[
                { "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,7,0,1], "children": [1, 2] },
                { "children": [3] },
                { "mesh": 0 },
                { "mesh": 0 },
                { "mesh": 0 }
            ]"#,
            "[0, 4]",
        );
        let table = flatten(&gltf.default_scene().unwrap());

        // Depth-first: node 3 under node 1, then node 2, then root 4
        let matrices: Vec<usize> = table.instances.iter().map(|i| i.matrix).collect();
        assert_eq!(matrices, vec![2, 1, 0]);
        assert_eq!(table.matrices[1], table.matrices[2]);
    }
}
