//! Scene luminance reduction
//!
//! The HDR scene color is converted to log luminance in a square power-of-two target, then
//! box-filtered level by level down to a single texel holding the log-average luminance.

use crate::backend::*;
use crate::error::{RendererError, RendererResult};

use super::fullscreen_shader;

const BRIGHTNESS_FRAGMENT: &str = r#"
@group(0) @binding(0) var scene_color: texture_2d<f32>;
@group(0) @binding(1) var scene_sampler: sampler;

const DELTA: f32 = 0.0001;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSampleLevel(scene_color, scene_sampler, input.uv, 0.0).rgb;
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    return vec4<f32>(log(DELTA + luminance), 0.0, 0.0, 1.0);
}
"#;

const DOWNSAMPLE_FRAGMENT: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let src = vec2<i32>(floor(input.position.xy)) * 2;
    let sum = textureLoad(source, src, 0).r
        + textureLoad(source, src + vec2<i32>(1, 0), 0).r
        + textureLoad(source, src + vec2<i32>(0, 1), 0).r
        + textureLoad(source, src + vec2<i32>(1, 1), 0).r;
    return vec4<f32>(sum * 0.25, 0.0, 0.0, 1.0);
}
"#;

pub const LUMINANCE_FORMAT: TextureFormat = TextureFormat::R32Float;

/// Edge lengths of the reduction chain for a `width` x `height` source.
///
/// The first level is the largest power of two not exceeding the smaller dimension and the
/// last level is always 1. Empty for a zero-sized source.
pub fn chain_sizes(width: u32, height: u32) -> Vec<u32> {
    let min = width.min(height);
    if min == 0 {
        return Vec::new();
    }
    let levels = 32 - min.leading_zeros();
    (0..levels).rev().map(|shift| 1 << shift).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ChainLevel {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub size: u32,
}

/// Log-average luminance reduction over power-of-two render targets
pub struct LuminanceChain {
    brightness_pipeline: RenderPipelineHandle,
    downsample_pipeline: RenderPipelineHandle,
    source_layout: BindGroupLayoutHandle,
    level_layout: BindGroupLayoutHandle,
    sampler: SamplerHandle,
    levels: Vec<ChainLevel>,
    brightness_group: Option<BindGroupHandle>,
    /// `downsample_groups[i]` reads `levels[i]`
    downsample_groups: Vec<BindGroupHandle>,
}

impl LuminanceChain {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        scene_color: TextureViewHandle,
        width: u32,
        height: u32,
    ) -> RendererResult<Self> {
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Luminance Source Sampler".into()),
            ..Default::default()
        })?;

        let source_layout = backend.create_bind_group_layout(&[
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
        ])?;
        // R32Float is not filterable, levels are read with textureLoad
        let level_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: false },
                view_dimension: TextureViewDimension::D2,
            },
        }])?;

        let mut pipeline = |label: &str, fragment: &str, layout| {
            let shader = fullscreen_shader(fragment);
            backend.create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(label.into()),
                vertex_shader: shader.clone(),
                fragment_shader: Some(shader),
                vertex_layouts: vec![],
                bind_group_layouts: vec![layout],
                primitive_topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: CullMode::None,
                depth_stencil: None,
                color_targets: vec![ColorTargetState::opaque(LUMINANCE_FORMAT)],
            })
        };
        let brightness_pipeline = pipeline("Luminance Brightness", BRIGHTNESS_FRAGMENT, source_layout)?;
        let downsample_pipeline = pipeline("Luminance Downsample", DOWNSAMPLE_FRAGMENT, level_layout)?;

        let mut chain = Self {
            brightness_pipeline,
            downsample_pipeline,
            source_layout,
            level_layout,
            sampler,
            levels: Vec::new(),
            brightness_group: None,
            downsample_groups: Vec::new(),
        };
        chain.resize(backend, scene_color, width, height)?;
        Ok(chain)
    }

    /// Recreate the level targets for a new source size.
    pub fn resize(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene_color: TextureViewHandle,
        width: u32,
        height: u32,
    ) -> RendererResult<()> {
        let sizes = chain_sizes(width, height);
        if sizes.is_empty() {
            return Err(RendererError::InvalidConfig(format!(
                "luminance chain needs a non-empty source, got {}x{}",
                width, height
            )));
        }

        self.release(backend);
        log::debug!("Luminance chain rebuilt: {} levels from {}", sizes.len(), sizes[0]);

        for &size in &sizes {
            let texture = backend.create_texture(&TextureDescriptor {
                label: Some(format!("Luminance {}x{}", size, size)),
                width: size,
                height: size,
                format: LUMINANCE_FORMAT,
                usage: TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC,
                ..Default::default()
            });
            let texture = match texture {
                Ok(texture) => texture,
                Err(e) => {
                    self.release(backend);
                    return Err(e.into());
                }
            };
            let view = match backend.create_texture_view(texture, &TextureViewDescriptor::default()) {
                Ok(view) => view,
                Err(e) => {
                    backend.destroy_texture(texture);
                    self.release(backend);
                    return Err(e.into());
                }
            };
            self.levels.push(ChainLevel { texture, view, size });
        }

        if let Err(e) = self.bind_levels(backend, scene_color) {
            self.release(backend);
            return Err(e.into());
        }
        Ok(())
    }

    fn bind_levels(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene_color: TextureViewHandle,
    ) -> BackendResult<()> {
        self.brightness_group = Some(backend.create_bind_group(
            self.source_layout,
            &[
                (0, BindGroupEntry::Texture(scene_color)),
                (1, BindGroupEntry::Sampler(self.sampler)),
            ],
        )?);
        for level in &self.levels {
            let group = backend.create_bind_group(
                self.level_layout,
                &[(0, BindGroupEntry::Texture(level.view))],
            )?;
            self.downsample_groups.push(group);
        }
        Ok(())
    }

    pub fn levels(&self) -> &[ChainLevel] {
        &self.levels
    }

    /// The 1x1 level holding the reduced value.
    pub fn output(&self) -> Option<TextureHandle> {
        self.levels.last().map(|level| level.texture)
    }

    /// Record the brightness pass and every downsample pass.
    pub fn encode(&self, backend: &mut dyn GraphicsBackend) {
        let Some(brightness_group) = self.brightness_group else {
            return;
        };

        for (i, level) in self.levels.iter().enumerate() {
            let (pipeline, group, label) = if i == 0 {
                (self.brightness_pipeline, brightness_group, "Luminance Brightness")
            } else {
                (self.downsample_pipeline, self.downsample_groups[i - 1], "Luminance Downsample")
            };

            // Each level is its own pass, so the previous level is no longer an attachment
            // when it is bound as input here
            backend.begin_render_pass(&RenderPassDescriptor {
                label: Some(label.into()),
                color_attachments: vec![ColorAttachment::clear(level.view, [0.0; 4])],
                depth_stencil_attachment: None,
            });
            backend.set_render_pipeline(pipeline);
            backend.set_bind_group(0, group);
            backend.set_viewport(0.0, 0.0, level.size as f32, level.size as f32, 0.0, 1.0);
            backend.draw(0..3, 0..1);
            backend.end_render_pass();
        }
    }

    fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        for level in self.levels.drain(..) {
            backend.destroy_texture_view(level.view);
            backend.destroy_texture(level.texture);
        }
        for group in self.downsample_groups.drain(..).chain(self.brightness_group.take()) {
            backend.destroy_bind_group(group);
        }
    }

    pub fn destroy(mut self, backend: &mut dyn GraphicsBackend) {
        self.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;
    use rstest::rstest;

    fn scene_color(backend: &mut RecordingBackend, width: u32, height: u32) -> (TextureHandle, TextureViewHandle) {
        let texture = backend
            .create_texture(&TextureDescriptor {
                label: Some("Scene Color".into()),
                width,
                height,
                format: TextureFormat::Rgba16Float,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ..Default::default()
            })
            .unwrap();
        let view = backend
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();
        (texture, view)
    }

    #[rstest]
    #[case(1, 1, vec![1])]
    #[case(8, 8, vec![8, 4, 2, 1])]
    #[case(800, 600, vec![512, 256, 128, 64, 32, 16, 8, 4, 2, 1])]
    #[case(3, 1000, vec![2, 1])]
    #[case(0, 600, vec![])]
    fn test_chain_sizes(#[case] width: u32, #[case] height: u32, #[case] expected: Vec<u32>) {
        assert_eq!(chain_sizes(width, height), expected);
    }

    #[rstest]
    fn test_power_of_two_chain_length(#[values(1, 2, 16, 256, 1024)] size: u32) {
        let sizes = chain_sizes(size, size);
        assert_eq!(sizes.len() as u32, size.ilog2() + 1);
        assert_eq!(sizes[0], size);
        assert_eq!(*sizes.last().unwrap(), 1);
    }

    #[test]
    fn test_encode_reads_previous_level_only() {
        let mut backend = RecordingBackend::new(64, 48);
        let (color, color_view) = scene_color(&mut backend, 64, 48);
        let chain = LuminanceChain::new(&mut backend, color_view, 64, 48).unwrap();

        backend.clear_commands();
        chain.encode(&mut backend);

        let passes = backend.passes();
        let levels = chain.levels();
        assert_eq!(passes.len(), levels.len());
        assert_eq!(levels.len(), 6);
        for (i, pass) in passes.iter().enumerate() {
            assert!(!pass.has_feedback_loop());
            assert_eq!(pass.targets, vec![levels[i].texture]);
            let expected_source = if i == 0 { color } else { levels[i - 1].texture };
            assert_eq!(pass.sampled, vec![expected_source]);
            assert_eq!(pass.draw_count, 1);
        }
        assert_eq!(backend.texture_desc(chain.output().unwrap()).unwrap().width, 1);
    }

    #[test]
    fn test_resize_replaces_levels() {
        let mut backend = RecordingBackend::new(64, 64);
        let (_, color_view) = scene_color(&mut backend, 64, 64);
        let mut chain = LuminanceChain::new(&mut backend, color_view, 64, 64).unwrap();
        let old: Vec<TextureHandle> = chain.levels().iter().map(|l| l.texture).collect();

        let (_, new_view) = scene_color(&mut backend, 16, 32);
        chain.resize(&mut backend, new_view, 16, 32).unwrap();

        assert_eq!(chain.levels().len(), 5);
        assert!(old.iter().all(|t| !backend.is_texture_live(*t)));
        assert!(chain.levels().iter().all(|l| backend.is_texture_live(l.texture)));
    }

    #[test]
    fn test_levels_are_single_channel_float() {
        let mut backend = RecordingBackend::new(32, 32);
        let (_, color_view) = scene_color(&mut backend, 32, 32);
        let chain = LuminanceChain::new(&mut backend, color_view, 32, 32).unwrap();
        for level in chain.levels() {
            let desc = backend.texture_desc(level.texture).unwrap();
            assert_eq!(desc.format, TextureFormat::R32Float);
            assert_eq!((desc.width, desc.height), (level.size, level.size));
        }
    }
}
