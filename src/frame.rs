//! Per-frame uniforms shared by every scene pass (bind group 0)

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::backend::*;
use crate::error::RendererResult;
use crate::scene::{Camera, LightRig, LightUniform};

/// Alternative outputs of the PBR shader for inspecting single BRDF terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderMode {
    #[default]
    Regular,
    NormalDistribution,
    Geometry,
    Fresnel,
}

impl ShaderMode {
    pub fn as_u32(self) -> u32 {
        match self {
            ShaderMode::Regular => 0,
            ShaderMode::NormalDistribution => 1,
            ShaderMode::Geometry => 2,
            ShaderMode::Fresnel => 3,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GeneralUniform {
    pub camera_position: Vec4,
    pub time: f32,
    pub shader_mode: u32,
    pub _pad: [u32; 2],
}

/// WGSL declarations matching [`FrameResources`].
pub const FRAME_BINDINGS_WGSL: &str = r#"
struct Camera {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    inv_view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

struct Lights {
    positions: array<vec4<f32>, 3>,
    colors: array<vec4<f32>, 3>,
}

struct General {
    camera_position: vec4<f32>,
    time: f32,
    shader_mode: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<uniform> lights: Lights;
@group(0) @binding(2) var<uniform> general: General;
"#;

/// Camera, light and general constant buffers with their bind group
pub struct FrameResources {
    camera: BufferHandle,
    lights: BufferHandle,
    general: BufferHandle,
    layout: BindGroupLayoutHandle,
    bind_group: BindGroupHandle,
}

impl FrameResources {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RendererResult<Self> {
        let camera = backend.create_buffer(&BufferDescriptor::uniform(
            "Camera Uniforms",
            std::mem::size_of::<CameraUniform>() as u64,
        ))?;
        let lights = backend.create_buffer(&BufferDescriptor::uniform(
            "Light Uniforms",
            std::mem::size_of::<LightUniform>() as u64,
        ))?;
        let general = backend.create_buffer(&BufferDescriptor::uniform(
            "General Uniforms",
            std::mem::size_of::<GeneralUniform>() as u64,
        ))?;

        let entry = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        };
        let layout = backend.create_bind_group_layout(&[entry(0), entry(1), entry(2)])?;

        let whole = |buffer| BindGroupEntry::Buffer {
            buffer,
            offset: 0,
            size: None,
        };
        let bind_group = backend.create_bind_group(
            layout,
            &[(0, whole(camera)), (1, whole(lights)), (2, whole(general))],
        )?;

        Ok(Self {
            camera,
            lights,
            general,
            layout,
            bind_group,
        })
    }

    pub fn layout(&self) -> BindGroupLayoutHandle {
        self.layout
    }

    pub fn bind_group(&self) -> BindGroupHandle {
        self.bind_group
    }

    pub fn camera_buffer(&self) -> BufferHandle {
        self.camera
    }

    pub fn write(
        &self,
        backend: &mut dyn GraphicsBackend,
        camera: &Camera,
        lights: &LightRig,
        time: f32,
        shader_mode: ShaderMode,
    ) {
        let general = GeneralUniform {
            camera_position: camera.position().extend(1.0),
            time,
            shader_mode: shader_mode.as_u32(),
            _pad: [0; 2],
        };
        backend.write_buffer(self.camera, 0, bytemuck::bytes_of(&camera.uniform_data()));
        backend.write_buffer(self.lights, 0, bytemuck::bytes_of(&lights.uniform_data()));
        backend.write_buffer(self.general, 0, bytemuck::bytes_of(&general));
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_buffer(self.camera);
        backend.destroy_buffer(self.lights);
        backend.destroy_buffer(self.general);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    #[test]
    fn test_general_uniform_layout_matches_wgsl() {
        assert_eq!(std::mem::size_of::<GeneralUniform>(), 32);
        assert_eq!(std::mem::size_of::<LightUniform>(), 6 * 16);
    }

    #[test]
    fn test_write_uploads_camera_and_mode() {
        let mut backend = RecordingBackend::new(8, 8);
        let frame = FrameResources::new(&mut backend).unwrap();
        let camera = Camera::default();

        frame.write(&mut backend, &camera, &LightRig::new(), 1.5, ShaderMode::Fresnel);

        let general: GeneralUniform =
            bytemuck::pod_read_unaligned(backend.buffer_contents(frame.general).unwrap());
        assert_eq!(general.shader_mode, 3);
        assert_eq!(general.time, 1.5);
        assert_eq!(general.camera_position.truncate(), camera.position());

        let uploaded: CameraUniform =
            bytemuck::pod_read_unaligned(backend.buffer_contents(frame.camera).unwrap());
        assert_eq!(uploaded.view_proj, camera.view_projection_matrix());
    }
}
