//! Common utilities for integration tests.
//!
//! [`GlbBuilder`] assembles small binary glTF files in memory so loader tests go through the
//! real `gltf` import path. The renderer helpers create a [`Renderer`] on the recording
//! backend with IBL sizes small enough to keep the command log short.

#![allow(dead_code)]

use std::io::Cursor;

use ibl_renderer::backend::recording::RecordingBackend;
use ibl_renderer::{Renderer, RendererConfig};

pub const ARRAY_BUFFER: u32 = 34962;
pub const ELEMENT_ARRAY_BUFFER: u32 = 34963;

pub const UNSIGNED_BYTE: u32 = 5121;
pub const UNSIGNED_SHORT: u32 = 5123;
pub const UNSIGNED_INT: u32 = 5125;
pub const FLOAT: u32 = 5126;

pub const MODE_TRIANGLES: u32 = 4;
pub const MODE_TRIANGLE_STRIP: u32 = 5;
pub const MODE_TRIANGLE_FAN: u32 = 6;

/// Counter-clockwise triangle in the XY plane, facing +Z.
pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

// ============================================================================
// GLB Builder
// ============================================================================

/// In-memory binary glTF writer.
///
/// Every `add_*` method returns the index of the created object, for use in JSON passed to
/// later calls.
#[derive(Default)]
pub struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<String>,
    accessors: Vec<String>,
    images: Vec<String>,
    textures: Vec<String>,
    samplers: Vec<String>,
    materials: Vec<String>,
    meshes: Vec<String>,
    nodes: Vec<String>,
    roots: Vec<usize>,
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);

        let target = target
            .map(|t| format!(r#", "target": {t}"#))
            .unwrap_or_default();
        self.buffer_views.push(format!(
            r#"{{ "buffer": 0, "byteOffset": {offset}, "byteLength": {}{target} }}"#,
            bytes.len()
        ));
        self.buffer_views.len() - 1
    }

    fn add_accessor(&mut self, view: usize, component_type: u32, count: usize, ty: &str, extra: &str) -> usize {
        self.accessors.push(format!(
            r#"{{ "bufferView": {view}, "componentType": {component_type}, "count": {count}, "type": "{ty}"{extra} }}"#
        ));
        self.accessors.len() - 1
    }

    /// POSITION accessor, with the min/max glTF requires.
    pub fn add_positions(&mut self, positions: &[[f32; 3]]) -> usize {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        let view = self.add_view(bytemuck::cast_slice(positions), Some(ARRAY_BUFFER));
        let extra = format!(
            r#", "min": [{}, {}, {}], "max": [{}, {}, {}]"#,
            min[0], min[1], min[2], max[0], max[1], max[2]
        );
        self.add_accessor(view, FLOAT, positions.len(), "VEC3", &extra)
    }

    pub fn add_normals(&mut self, normals: &[[f32; 3]]) -> usize {
        let view = self.add_view(bytemuck::cast_slice(normals), Some(ARRAY_BUFFER));
        self.add_accessor(view, FLOAT, normals.len(), "VEC3", "")
    }

    pub fn add_texcoords(&mut self, texcoords: &[[f32; 2]]) -> usize {
        let view = self.add_view(bytemuck::cast_slice(texcoords), Some(ARRAY_BUFFER));
        self.add_accessor(view, FLOAT, texcoords.len(), "VEC2", "")
    }

    pub fn add_indices_u8(&mut self, indices: &[u8]) -> usize {
        let view = self.add_view(indices, Some(ELEMENT_ARRAY_BUFFER));
        self.add_accessor(view, UNSIGNED_BYTE, indices.len(), "SCALAR", "")
    }

    pub fn add_indices_u16(&mut self, indices: &[u16]) -> usize {
        let view = self.add_view(bytemuck::cast_slice(indices), Some(ELEMENT_ARRAY_BUFFER));
        self.add_accessor(view, UNSIGNED_SHORT, indices.len(), "SCALAR", "")
    }

    pub fn add_indices_u32(&mut self, indices: &[u32]) -> usize {
        let view = self.add_view(bytemuck::cast_slice(indices), Some(ELEMENT_ARRAY_BUFFER));
        self.add_accessor(view, UNSIGNED_INT, indices.len(), "SCALAR", "")
    }

    /// Embed a solid-color PNG and return the index of a texture sourcing it.
    pub fn add_png_texture(&mut self, width: u32, height: u32, rgba: [u8; 4]) -> usize {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageOutputFormat::Png)
            .expect("PNG encoding failed");

        let view = self.add_view(png.get_ref(), None);
        self.images
            .push(format!(r#"{{ "bufferView": {view}, "mimeType": "image/png" }}"#));
        self.textures
            .push(format!(r#"{{ "source": {} }}"#, self.images.len() - 1));
        self.textures.len() - 1
    }

    pub fn add_sampler(&mut self, json: &str) -> usize {
        self.samplers.push(json.to_string());
        self.samplers.len() - 1
    }

    pub fn add_material(&mut self, json: &str) -> usize {
        self.materials.push(json.to_string());
        self.materials.len() - 1
    }

    pub fn add_mesh(&mut self, primitives: &[String]) -> usize {
        self.meshes
            .push(format!(r#"{{ "primitives": [{}] }}"#, primitives.join(", ")));
        self.meshes.len() - 1
    }

    pub fn add_node(&mut self, json: &str) -> usize {
        self.nodes.push(json.to_string());
        self.nodes.len() - 1
    }

    /// Add a node as a root of the default scene.
    pub fn add_root(&mut self, json: &str) -> usize {
        let node = self.add_node(json);
        self.roots.push(node);
        node
    }

    fn json(&self) -> String {
        let mut fields = vec![
            r#""asset": { "version": "2.0" }"#.to_string(),
            r#""scene": 0"#.to_string(),
            format!(
                r#""scenes": [{{ "nodes": [{}] }}]"#,
                self.roots
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ];
        if !self.bin.is_empty() {
            fields.push(format!(r#""buffers": [{{ "byteLength": {} }}]"#, self.bin.len()));
        }
        for (name, items) in [
            ("bufferViews", &self.buffer_views),
            ("accessors", &self.accessors),
            ("images", &self.images),
            ("textures", &self.textures),
            ("samplers", &self.samplers),
            ("materials", &self.materials),
            ("meshes", &self.meshes),
            ("nodes", &self.nodes),
        ] {
            if !items.is_empty() {
                fields.push(format!(r#""{name}": [{}]"#, items.join(", ")));
            }
        }
        format!("{{ {} }}", fields.join(", "))
    }

    /// Serialize as GLB: header, JSON chunk, then the BIN chunk if any data was added.
    pub fn build(&self) -> Vec<u8> {
        let mut json = self.json().into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut bin = self.bin.clone();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let mut total = 12 + 8 + json.len();
        if !bin.is_empty() {
            total += 8 + bin.len();
        }

        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        if !bin.is_empty() {
            glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            glb.extend_from_slice(b"BIN\0");
            glb.extend_from_slice(&bin);
        }
        glb
    }
}

/// JSON for one mesh primitive.
pub fn primitive(
    attributes: &[(&str, usize)],
    indices: Option<usize>,
    material: Option<usize>,
    mode: Option<u32>,
) -> String {
    let attributes = attributes
        .iter()
        .map(|(name, accessor)| format!(r#""{name}": {accessor}"#))
        .collect::<Vec<_>>()
        .join(", ");
    let mut json = format!(r#"{{ "attributes": {{ {attributes} }}"#);
    if let Some(indices) = indices {
        json.push_str(&format!(r#", "indices": {indices}"#));
    }
    if let Some(material) = material {
        json.push_str(&format!(r#", "material": {material}"#));
    }
    if let Some(mode) = mode {
        json.push_str(&format!(r#", "mode": {mode}"#));
    }
    json.push('}');
    json
}

/// One triangle under a single root node, with the given material JSON.
pub fn triangle_glb(material: Option<&str>, mode: Option<u32>) -> Vec<u8> {
    let mut glb = GlbBuilder::new();
    let positions = glb.add_positions(&TRIANGLE);
    let indices = glb.add_indices_u16(&[0, 1, 2]);
    let material = material.map(|json| glb.add_material(json));
    let mesh = glb.add_mesh(&[primitive(
        &[("POSITION", positions)],
        Some(indices),
        material,
        mode,
    )]);
    glb.add_root(&format!(r#"{{ "mesh": {mesh} }}"#));
    glb.build()
}

// ============================================================================
// Renderer Helpers
// ============================================================================

/// Default config with IBL sizes shrunk for tests.
pub fn small_config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.ibl.environment_size = 16;
    config.ibl.environment_mips = 5;
    config.ibl.irradiance_size = 8;
    config.ibl.prefilter_size = 16;
    config.ibl.prefilter_samples = 16;
    config.ibl.brdf_lut_size = 16;
    config.ibl.brdf_samples = 16;
    config
}

/// Renderer on a recording backend with an empty command log.
pub fn recording_renderer(width: u32, height: u32) -> Renderer<RecordingBackend> {
    let mut renderer = Renderer::new(RecordingBackend::new(width, height), small_config())
        .expect("renderer creation failed");
    renderer.backend_mut().clear_commands();
    renderer
}
