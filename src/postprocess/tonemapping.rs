//! Tonemapping post-processing

use std::str::FromStr;

use bytemuck::{Pod, Zeroable};

use crate::backend::*;
use crate::error::RendererResult;

use super::fullscreen_shader;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    None,
}

impl TonemapOperator {
    fn shader_index(self) -> u32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::None => 2,
        }
    }
}

impl FromStr for TonemapOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reinhard" => Ok(TonemapOperator::Reinhard),
            "aces" => Ok(TonemapOperator::Aces),
            "none" => Ok(TonemapOperator::None),
            other => Err(format!("unknown tonemap operator '{other}' (reinhard, aces, none)")),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TonemapParams {
    pub exposure: f32,
    pub gamma: f32,
    pub operator: u32,
    pub _pad: u32,
}

/// Exposure that maps the adapted log-average luminance onto `key_value`.
pub fn exposure(key_value: f32, adapted_log_luminance: f32) -> f32 {
    key_value / adapted_log_luminance.exp().max(1e-4)
}

/// sRGB targets encode in hardware, anything else gets gamma applied in the shader.
pub fn output_gamma(format: TextureFormat) -> f32 {
    if format.is_srgb() {
        1.0
    } else {
        2.2
    }
}

const TONEMAPPING_FRAGMENT: &str = r#"
struct TonemapParams {
    exposure: f32,
    gamma: f32,
    operator: u32,
    _pad: u32,
}

@group(0) @binding(0) var hdr_texture: texture_2d<f32>;
@group(0) @binding(1) var hdr_sampler: sampler;
@group(0) @binding(2) var<uniform> params: TonemapParams;

fn aces_tonemap(color: vec3<f32>) -> vec3<f32> {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    return saturate((color * (a * color + b)) / (color * (c * color + d) + e));
}

fn reinhard_tonemap(color: vec3<f32>) -> vec3<f32> {
    return color / (color + vec3<f32>(1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(hdr_texture, hdr_sampler, input.uv).rgb;
    color = color * params.exposure;

    var mapped: vec3<f32>;
    switch params.operator {
        case 0u: { mapped = reinhard_tonemap(color); }
        case 1u: { mapped = aces_tonemap(color); }
        default: { mapped = saturate(color); }
    }

    let gamma_corrected = pow(mapped, vec3<f32>(1.0 / params.gamma));
    return vec4<f32>(gamma_corrected, 1.0);
}
"#;

/// Final pass: HDR scene color to the swapchain
pub struct TonemappingPass {
    pub operator: TonemapOperator,
    pub key_value: f32,
    gamma: f32,
    pipeline: RenderPipelineHandle,
    layout: BindGroupLayoutHandle,
    sampler: SamplerHandle,
    params: BufferHandle,
    bind_group: BindGroupHandle,
}

impl TonemappingPass {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        operator: TonemapOperator,
        key_value: f32,
        scene_color: TextureViewHandle,
    ) -> RendererResult<Self> {
        let output_format = backend.swapchain_format();

        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_2d(),
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { comparison: false },
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
        ])?;
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Tonemapping Sampler".into()),
            ..Default::default()
        })?;
        let params = backend.create_buffer(&BufferDescriptor::uniform(
            "Tonemap Params",
            std::mem::size_of::<TonemapParams>() as u64,
        ))?;
        let shader = fullscreen_shader(TONEMAPPING_FRAGMENT);
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Tonemapping".into()),
            vertex_shader: shader.clone(),
            fragment_shader: Some(shader),
            vertex_layouts: vec![],
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState::opaque(output_format)],
        })?;
        let bind_group = Self::create_bind_group(backend, layout, scene_color, sampler, params)?;

        log::debug!(
            "Tonemapping {:?} into {:?}, gamma {}",
            operator,
            output_format,
            output_gamma(output_format)
        );

        Ok(Self {
            operator,
            key_value,
            gamma: output_gamma(output_format),
            pipeline,
            layout,
            sampler,
            params,
            bind_group,
        })
    }

    fn create_bind_group(
        backend: &mut dyn GraphicsBackend,
        layout: BindGroupLayoutHandle,
        scene_color: TextureViewHandle,
        sampler: SamplerHandle,
        params: BufferHandle,
    ) -> RendererResult<BindGroupHandle> {
        Ok(backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(scene_color)),
                (1, BindGroupEntry::Sampler(sampler)),
                (
                    2,
                    BindGroupEntry::Buffer {
                        buffer: params,
                        offset: 0,
                        size: None,
                    },
                ),
            ],
        )?)
    }

    /// Point the pass at a recreated scene color target.
    pub fn set_source(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene_color: TextureViewHandle,
    ) -> RendererResult<()> {
        let bind_group =
            Self::create_bind_group(backend, self.layout, scene_color, self.sampler, self.params)?;
        backend.destroy_bind_group(std::mem::replace(&mut self.bind_group, bind_group));
        Ok(())
    }

    pub fn params(&self, adapted_log_luminance: f32) -> TonemapParams {
        TonemapParams {
            exposure: exposure(self.key_value, adapted_log_luminance),
            gamma: self.gamma,
            operator: self.operator.shader_index(),
            _pad: 0,
        }
    }

    pub fn encode(
        &self,
        backend: &mut dyn GraphicsBackend,
        target: TextureViewHandle,
        width: u32,
        height: u32,
        adapted_log_luminance: f32,
    ) {
        let params = self.params(adapted_log_luminance);
        log::trace!("Tonemap exposure {:.4}", params.exposure);
        backend.write_buffer(self.params, 0, bytemuck::bytes_of(&params));

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Tonemapping".into()),
            color_attachments: vec![ColorAttachment::clear(target, [0.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: None,
        });
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, self.bind_group);
        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_buffer(self.params);
    }
}
