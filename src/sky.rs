//! Environment background drawn first inside the scene pass

use crate::backend::*;
use crate::error::RendererResult;
use crate::frame::FRAME_BINDINGS_WGSL;
use crate::ibl::IblMaps;
use crate::postprocess::FULLSCREEN_VERTEX_SHADER;
use crate::renderer::{DEPTH_FORMAT, SCENE_COLOR_FORMAT};

const SKY_FRAGMENT: &str = r#"
@group(1) @binding(0) var sky_texture: texture_cube<f32>;
@group(1) @binding(1) var sky_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let far_point = camera.inv_view_proj * vec4<f32>(input.ndc, 1.0, 1.0);
    let dir = normalize(far_point.xyz / far_point.w - camera.position.xyz);
    return vec4<f32>(textureSampleLevel(sky_texture, sky_sampler, dir, 0.0).rgb, 1.0);
}
"#;

/// Which cube map the background shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkySource {
    #[default]
    Environment,
    Prefiltered,
}

impl SkySource {
    pub fn toggled(self) -> Self {
        match self {
            SkySource::Environment => SkySource::Prefiltered,
            SkySource::Prefiltered => SkySource::Environment,
        }
    }
}

struct SkyBindings {
    environment: BindGroupHandle,
    prefiltered: BindGroupHandle,
    /// Single-mip cube view into the middle of the prefiltered chain
    prefiltered_view: TextureViewHandle,
}

impl SkyBindings {
    fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_bind_group(self.environment);
        backend.destroy_bind_group(self.prefiltered);
        backend.destroy_texture_view(self.prefiltered_view);
    }
}

pub struct SkyPass {
    pipeline: RenderPipelineHandle,
    layout: BindGroupLayoutHandle,
    sampler: SamplerHandle,
    bindings: Option<SkyBindings>,
    pub source: SkySource,
}

impl SkyPass {
    pub fn new(backend: &mut dyn GraphicsBackend, frame_layout: BindGroupLayoutHandle) -> RendererResult<Self> {
        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_cube(),
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { comparison: false },
            },
        ])?;
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Sky Sampler".into()),
            ..Default::default()
        })?;
        let shader = [FRAME_BINDINGS_WGSL, FULLSCREEN_VERTEX_SHADER, SKY_FRAGMENT].concat();
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Sky".into()),
            vertex_shader: shader.clone(),
            fragment_shader: Some(shader),
            vertex_layouts: vec![],
            bind_group_layouts: vec![frame_layout, layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: CompareFunction::LessEqual,
            }),
            color_targets: vec![ColorTargetState::opaque(SCENE_COLOR_FORMAT)],
        })?;

        Ok(Self {
            pipeline,
            layout,
            sampler,
            bindings: None,
            source: SkySource::default(),
        })
    }

    /// Bind freshly generated IBL maps, releasing views made for the previous ones.
    pub fn set_maps(&mut self, backend: &mut dyn GraphicsBackend, maps: &IblMaps) -> RendererResult<()> {
        let prefiltered_view = backend.create_texture_view(
            maps.prefiltered.texture,
            &TextureViewDescriptor {
                base_mip: maps.prefiltered.mip_levels / 2,
                mip_count: Some(1),
                ..TextureViewDescriptor::cube()
            },
        )?;
        let environment = match self.cube_group(backend, maps.environment.view) {
            Ok(group) => group,
            Err(e) => {
                backend.destroy_texture_view(prefiltered_view);
                return Err(e.into());
            }
        };
        let prefiltered = match self.cube_group(backend, prefiltered_view) {
            Ok(group) => group,
            Err(e) => {
                backend.destroy_bind_group(environment);
                backend.destroy_texture_view(prefiltered_view);
                return Err(e.into());
            }
        };

        let new = SkyBindings {
            environment,
            prefiltered,
            prefiltered_view,
        };
        if let Some(old) = self.bindings.replace(new) {
            old.release(backend);
        }
        Ok(())
    }

    fn cube_group(
        &self,
        backend: &mut dyn GraphicsBackend,
        view: TextureViewHandle,
    ) -> BackendResult<BindGroupHandle> {
        backend.create_bind_group(
            self.layout,
            &[
                (0, BindGroupEntry::Texture(view)),
                (1, BindGroupEntry::Sampler(self.sampler)),
            ],
        )
    }

    pub fn toggle(&mut self) {
        self.source = self.source.toggled();
        log::info!("Sky shows {:?} map", self.source);
    }

    /// Record the background draw into the current scene pass.
    pub fn encode(&self, backend: &mut dyn GraphicsBackend, frame_group: BindGroupHandle) {
        let Some(bindings) = &self.bindings else {
            return;
        };
        let group = match self.source {
            SkySource::Environment => bindings.environment,
            SkySource::Prefiltered => bindings.prefiltered,
        };
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, frame_group);
        backend.set_bind_group(1, group);
        backend.draw(0..3, 0..1);
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        if let Some(bindings) = self.bindings {
            bindings.release(backend);
        }
    }
}
