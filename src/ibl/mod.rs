//! Image based lighting precomputation
//!
//! From an equirectangular HDR panorama this produces, entirely on the GPU:
//!
//! - an environment cube map with a full mip chain
//! - a diffuse irradiance cube map
//! - a specular cube map whose mip `i` is prefiltered for roughness sample `i`
//! - a 2D BRDF integration table indexed by (cos theta, roughness)
//!
//! Every cube face is rendered into a single-face render target and then copied into the
//! matching layer and mip of the destination cube.

mod cube_face;
pub mod shaders;

pub use cube_face::CubeFace;

use std::path::Path;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use half::f16;

use crate::backend::*;
use crate::error::{RendererError, RendererResult};

/// Sizes and sample counts for IBL precomputation
#[derive(Debug, Clone, PartialEq)]
pub struct IblConfig {
    pub environment_size: u32,
    pub environment_mips: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    /// Roughness rendered into each prefiltered mip, starting at mip 0
    pub prefilter_roughness: Vec<f32>,
    pub prefilter_samples: u32,
    pub brdf_lut_size: u32,
    pub brdf_samples: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            environment_size: 512,
            environment_mips: full_mip_count(512),
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_roughness: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            prefilter_samples: 1024,
            brdf_lut_size: 512,
            brdf_samples: 1024,
        }
    }
}

impl IblConfig {
    pub fn validate(&self) -> RendererResult<()> {
        let invalid = |msg: String| Err(RendererError::InvalidConfig(msg));

        for (name, size) in [
            ("environment_size", self.environment_size),
            ("irradiance_size", self.irradiance_size),
            ("prefilter_size", self.prefilter_size),
            ("brdf_lut_size", self.brdf_lut_size),
        ] {
            if size == 0 {
                return invalid(format!("ibl.{name} must be positive"));
            }
        }
        if self.environment_mips == 0 || self.environment_mips > full_mip_count(self.environment_size) {
            return invalid(format!(
                "ibl.environment_mips must be in 1..={} for size {}",
                full_mip_count(self.environment_size),
                self.environment_size
            ));
        }
        let levels = self.prefilter_roughness.len() as u32;
        if levels == 0 || levels > full_mip_count(self.prefilter_size) {
            return invalid(format!(
                "ibl.prefilter_roughness needs 1..={} entries for size {}",
                full_mip_count(self.prefilter_size),
                self.prefilter_size
            ));
        }
        if let Some(r) = self
            .prefilter_roughness
            .iter()
            .find(|r| !(0.0..=1.0).contains(*r))
        {
            return invalid(format!("ibl.prefilter_roughness value {r} outside [0, 1]"));
        }
        if self.prefilter_samples == 0 || self.brdf_samples == 0 {
            return invalid("ibl sample counts must be positive".into());
        }
        Ok(())
    }

    pub fn prefilter_mips(&self) -> u32 {
        self.prefilter_roughness.len() as u32
    }
}

/// Equirectangular HDR source image uploaded as `Rgba16Float`
#[derive(Debug, Clone, Copy)]
pub struct Panorama {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

impl Panorama {
    /// Load an HDR (or any `image`-readable) file.
    pub fn load(backend: &mut dyn GraphicsBackend, path: &Path) -> RendererResult<Self> {
        log::info!("Loading environment panorama {}", path.display());
        let image = image::open(path).map_err(|source| RendererError::Image {
            path: path.display().to_string(),
            source,
        })?;
        let rgba = image.into_rgba32f();
        let (width, height) = rgba.dimensions();
        Self::from_rgba32f(backend, width, height, rgba.as_raw())
    }

    /// Upload tightly packed RGBA texels.
    pub fn from_rgba32f(
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        texels: &[f32],
    ) -> RendererResult<Self> {
        let expected = width as usize * height as usize * 4;
        if texels.len() != expected {
            return Err(BackendError::TextureCreationFailed(format!(
                "panorama {}x{} needs {} floats, got {}",
                width,
                height,
                expected,
                texels.len()
            ))
            .into());
        }

        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Environment Panorama".into()),
            width,
            height,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        })?;
        let view = match backend.create_texture_view(texture, &TextureViewDescriptor::default()) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e.into());
            }
        };

        let halves: Vec<f16> = texels.iter().map(|&v| f16::from_f32(v)).collect();
        backend.write_texture(texture, bytemuck::cast_slice(&halves), width, height);

        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.texture);
    }
}

/// A six-layer texture with a cube view over all of its mips
#[derive(Debug, Clone, Copy)]
pub struct CubeMap {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub size: u32,
    pub mip_levels: u32,
}

/// The four precomputed lighting maps
#[derive(Debug, Clone, Copy)]
pub struct IblMaps {
    pub environment: CubeMap,
    pub irradiance: CubeMap,
    pub prefiltered: CubeMap,
    pub brdf_lut: TextureHandle,
    pub brdf_lut_view: TextureViewHandle,
}

impl IblMaps {
    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for cube in [self.environment, self.irradiance, self.prefiltered] {
            backend.destroy_texture_view(cube.view);
            backend.destroy_texture(cube.texture);
        }
        backend.destroy_texture_view(self.brdf_lut_view);
        backend.destroy_texture(self.brdf_lut);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FaceParams {
    pub inv_view_proj: Mat4,
    /// (roughness, sample count, source face resolution, unused)
    pub params: Vec4,
}

impl FaceParams {
    fn new(face: CubeFace, roughness: f32, sample_count: u32, source_size: u32) -> Self {
        Self {
            inv_view_proj: face.view_projection().inverse(),
            params: Vec4::new(roughness, sample_count as f32, source_size as f32, 0.0),
        }
    }
}

/// Resources created during one generation, released together.
#[derive(Default)]
struct Allocations {
    textures: Vec<TextureHandle>,
    views: Vec<TextureViewHandle>,
    buffers: Vec<BufferHandle>,
    bind_groups: Vec<BindGroupHandle>,
}

impl Allocations {
    fn texture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        desc: &TextureDescriptor,
    ) -> BackendResult<TextureHandle> {
        let texture = backend.create_texture(desc)?;
        self.textures.push(texture);
        Ok(texture)
    }

    fn view(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let view = backend.create_texture_view(texture, desc)?;
        self.views.push(view);
        Ok(view)
    }

    fn uniform<T: Pod>(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        label: &str,
        data: &T,
    ) -> BackendResult<BufferHandle> {
        let bytes = bytemuck::bytes_of(data);
        let buffer =
            backend.create_buffer_init(&BufferDescriptor::uniform(label, bytes.len() as u64), bytes)?;
        self.buffers.push(buffer);
        Ok(buffer)
    }

    fn bind_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let group = backend.create_bind_group(layout, entries)?;
        self.bind_groups.push(group);
        Ok(group)
    }

    fn release(self, backend: &mut dyn GraphicsBackend) {
        for group in self.bind_groups {
            backend.destroy_bind_group(group);
        }
        for view in self.views {
            backend.destroy_texture_view(view);
        }
        for texture in self.textures {
            backend.destroy_texture(texture);
        }
        for buffer in self.buffers {
            backend.destroy_buffer(buffer);
        }
    }
}

/// A face-sized render target with a view on mip 0.
struct FaceTarget {
    texture: TextureHandle,
    view: TextureViewHandle,
    size: u32,
}

/// Owns the precomputation pipelines and renders [`IblMaps`] from panoramas.
pub struct IblGenerator {
    config: IblConfig,
    sampler: SamplerHandle,
    panorama_layout: BindGroupLayoutHandle,
    cube_layout: BindGroupLayoutHandle,
    brdf_layout: BindGroupLayoutHandle,
    equirect_pipeline: RenderPipelineHandle,
    irradiance_pipeline: RenderPipelineHandle,
    prefilter_pipeline: RenderPipelineHandle,
    brdf_pipeline: RenderPipelineHandle,
}

impl IblGenerator {
    pub fn new(backend: &mut dyn GraphicsBackend, config: IblConfig) -> RendererResult<Self> {
        config.validate()?;

        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("IBL Source Sampler".into()),
            // The panorama wraps around horizontally
            address_mode_u: AddressMode::Repeat,
            ..Default::default()
        })?;

        let source_layout = |texture: BindingType| {
            vec![
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::UniformBuffer,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: texture,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::Sampler { comparison: false },
                },
            ]
        };
        let panorama_layout = backend.create_bind_group_layout(&source_layout(BindingType::texture_2d()))?;
        let cube_layout = backend.create_bind_group_layout(&source_layout(BindingType::texture_cube()))?;
        let brdf_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;

        let mut pipeline = |label: &str, source: String, layout, format| {
            backend.create_render_pipeline(&RenderPipelineDescriptor {
                label: Some(label.into()),
                vertex_shader: source.clone(),
                fragment_shader: Some(source),
                vertex_layouts: vec![],
                bind_group_layouts: vec![layout],
                primitive_topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: CullMode::None,
                depth_stencil: None,
                color_targets: vec![ColorTargetState::opaque(format)],
            })
        };
        let equirect_pipeline = pipeline(
            "Equirect To Cube",
            shaders::equirect_to_cube(),
            panorama_layout,
            TextureFormat::Rgba16Float,
        )?;
        let irradiance_pipeline = pipeline(
            "Irradiance Convolution",
            shaders::irradiance_convolution(),
            cube_layout,
            TextureFormat::Rgba16Float,
        )?;
        let prefilter_pipeline = pipeline(
            "Specular Prefilter",
            shaders::specular_prefilter(),
            cube_layout,
            TextureFormat::Rgba16Float,
        )?;
        let brdf_pipeline = pipeline(
            "BRDF Integration",
            shaders::brdf_integration(),
            brdf_layout,
            TextureFormat::Rg16Float,
        )?;

        Ok(Self {
            config,
            sampler,
            panorama_layout,
            cube_layout,
            brdf_layout,
            equirect_pipeline,
            irradiance_pipeline,
            prefilter_pipeline,
            brdf_pipeline,
        })
    }

    pub fn config(&self) -> &IblConfig {
        &self.config
    }

    /// Render all four maps from `panorama`.
    ///
    /// On failure every texture created by this call is destroyed again. On success only the
    /// returned maps stay alive.
    pub fn generate(
        &self,
        backend: &mut dyn GraphicsBackend,
        panorama: &Panorama,
    ) -> RendererResult<IblMaps> {
        let start = Instant::now();
        log::info!(
            "Generating IBL maps from {}x{} panorama",
            panorama.width,
            panorama.height
        );

        let mut outputs = Allocations::default();
        let mut transients = Allocations::default();

        match self.record(backend, panorama, &mut outputs, &mut transients) {
            Ok(maps) => {
                backend.submit();
                transients.release(backend);
                log::info!("IBL maps generated in {:.2?}", start.elapsed());
                Ok(maps)
            }
            Err(e) => {
                log::error!("IBL generation failed: {}", e);
                transients.release(backend);
                outputs.release(backend);
                Err(e)
            }
        }
    }

    fn record(
        &self,
        backend: &mut dyn GraphicsBackend,
        panorama: &Panorama,
        outputs: &mut Allocations,
        transients: &mut Allocations,
    ) -> RendererResult<IblMaps> {
        let environment = self.render_environment(backend, panorama, outputs, transients)?;
        let irradiance = self.render_irradiance(backend, &environment, outputs, transients)?;
        let prefiltered = self.render_prefiltered(backend, &environment, outputs, transients)?;
        let (brdf_lut, brdf_lut_view) = self.render_brdf_lut(backend, outputs, transients)?;

        Ok(IblMaps {
            environment,
            irradiance,
            prefiltered,
            brdf_lut,
            brdf_lut_view,
        })
    }

    fn create_cube(
        backend: &mut dyn GraphicsBackend,
        outputs: &mut Allocations,
        label: &str,
        size: u32,
        mip_levels: u32,
    ) -> BackendResult<CubeMap> {
        let texture = outputs.texture(
            backend,
            &TextureDescriptor {
                label: Some(label.into()),
                width: size,
                height: size,
                array_layers: 6,
                mip_levels,
                format: TextureFormat::Rgba16Float,
                usage: TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_DST
                    | TextureUsage::COPY_SRC,
            },
        )?;
        let view = outputs.view(backend, texture, &TextureViewDescriptor::cube())?;
        Ok(CubeMap {
            texture,
            view,
            size,
            mip_levels,
        })
    }

    fn create_face_target(
        backend: &mut dyn GraphicsBackend,
        transients: &mut Allocations,
        label: &str,
        size: u32,
        mip_levels: u32,
        format: TextureFormat,
    ) -> BackendResult<FaceTarget> {
        let texture = transients.texture(
            backend,
            &TextureDescriptor {
                label: Some(label.into()),
                width: size,
                height: size,
                array_layers: 1,
                mip_levels,
                format,
                usage: TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::TEXTURE_BINDING
                    | TextureUsage::COPY_SRC,
            },
        )?;
        let view = transients.view(backend, texture, &TextureViewDescriptor::single(0, 0))?;
        Ok(FaceTarget { texture, view, size })
    }

    fn draw_fullscreen(
        backend: &mut dyn GraphicsBackend,
        label: &str,
        target: TextureViewHandle,
        pipeline: RenderPipelineHandle,
        bind_group: BindGroupHandle,
    ) {
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(label.into()),
            color_attachments: vec![ColorAttachment::clear(target, [0.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: None,
        });
        backend.set_render_pipeline(pipeline);
        backend.set_bind_group(0, bind_group);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
    }

    fn face_bind_group(
        &self,
        backend: &mut dyn GraphicsBackend,
        transients: &mut Allocations,
        layout: BindGroupLayoutHandle,
        params: BufferHandle,
        source: TextureViewHandle,
    ) -> BackendResult<BindGroupHandle> {
        transients.bind_group(
            backend,
            layout,
            &[
                (
                    0,
                    BindGroupEntry::Buffer {
                        buffer: params,
                        offset: 0,
                        size: None,
                    },
                ),
                (1, BindGroupEntry::Texture(source)),
                (2, BindGroupEntry::Sampler(self.sampler)),
            ],
        )
    }

    fn render_environment(
        &self,
        backend: &mut dyn GraphicsBackend,
        panorama: &Panorama,
        outputs: &mut Allocations,
        transients: &mut Allocations,
    ) -> RendererResult<CubeMap> {
        let size = self.config.environment_size;
        let mips = self.config.environment_mips;
        log::debug!("IBL: environment cube {}x{} with {} mips", size, size, mips);

        let cube = Self::create_cube(backend, outputs, "Environment Cube", size, mips)?;
        let target = Self::create_face_target(
            backend,
            transients,
            "Environment Face Target",
            size,
            mips,
            TextureFormat::Rgba16Float,
        )?;

        let mut params = Vec::with_capacity(6);
        for face in CubeFace::ALL {
            params.push(transients.uniform(
                backend,
                "Environment Face Params",
                &FaceParams::new(face, 0.0, 0, panorama.width),
            )?);
        }

        for (face, params) in CubeFace::ALL.into_iter().zip(params) {
            let bind_group = self.face_bind_group(
                backend,
                transients,
                self.panorama_layout,
                params,
                panorama.view,
            )?;
            Self::draw_fullscreen(
                backend,
                "Environment Face",
                target.view,
                self.equirect_pipeline,
                bind_group,
            );
            backend.generate_mipmaps(target.texture)?;

            for mip in 0..mips {
                let extent = (size >> mip).max(1);
                backend.copy_texture_to_texture(
                    TextureCopyLocation {
                        texture: target.texture,
                        mip_level: mip,
                        array_layer: 0,
                    },
                    TextureCopyLocation {
                        texture: cube.texture,
                        mip_level: mip,
                        array_layer: face.layer(),
                    },
                    extent,
                    extent,
                );
            }
        }

        Ok(cube)
    }

    fn render_irradiance(
        &self,
        backend: &mut dyn GraphicsBackend,
        environment: &CubeMap,
        outputs: &mut Allocations,
        transients: &mut Allocations,
    ) -> RendererResult<CubeMap> {
        let size = self.config.irradiance_size;
        log::debug!("IBL: irradiance cube {}x{}", size, size);

        let cube = Self::create_cube(backend, outputs, "Irradiance Cube", size, 1)?;
        let target = Self::create_face_target(
            backend,
            transients,
            "Irradiance Face Target",
            size,
            1,
            TextureFormat::Rgba16Float,
        )?;

        let mut params = Vec::with_capacity(6);
        for face in CubeFace::ALL {
            params.push(transients.uniform(
                backend,
                "Irradiance Face Params",
                &FaceParams::new(face, 0.0, 0, environment.size),
            )?);
        }

        for (face, params) in CubeFace::ALL.into_iter().zip(params) {
            let bind_group =
                self.face_bind_group(backend, transients, self.cube_layout, params, environment.view)?;
            Self::draw_fullscreen(
                backend,
                "Irradiance Face",
                target.view,
                self.irradiance_pipeline,
                bind_group,
            );
            backend.copy_texture_to_texture(
                TextureCopyLocation::base(target.texture),
                TextureCopyLocation {
                    texture: cube.texture,
                    mip_level: 0,
                    array_layer: face.layer(),
                },
                target.size,
                target.size,
            );
        }

        Ok(cube)
    }

    fn render_prefiltered(
        &self,
        backend: &mut dyn GraphicsBackend,
        environment: &CubeMap,
        outputs: &mut Allocations,
        transients: &mut Allocations,
    ) -> RendererResult<CubeMap> {
        let size = self.config.prefilter_size;
        let mips = self.config.prefilter_mips();
        log::debug!(
            "IBL: prefiltered cube {}x{}, roughness {:?}",
            size,
            size,
            self.config.prefilter_roughness
        );

        let cube = Self::create_cube(backend, outputs, "Prefiltered Cube", size, mips)?;

        let mut levels = Vec::with_capacity(mips as usize);
        for (mip, &roughness) in self.config.prefilter_roughness.iter().enumerate() {
            let target = Self::create_face_target(
                backend,
                transients,
                "Prefilter Face Target",
                (size >> mip).max(1),
                1,
                TextureFormat::Rgba16Float,
            )?;
            let mut params = Vec::with_capacity(6);
            for face in CubeFace::ALL {
                params.push(transients.uniform(
                    backend,
                    "Prefilter Face Params",
                    &FaceParams::new(
                        face,
                        roughness,
                        self.config.prefilter_samples,
                        environment.size,
                    ),
                )?);
            }
            levels.push((mip as u32, target, params));
        }

        for (mip, target, params) in levels {
            for (face, params) in CubeFace::ALL.into_iter().zip(params) {
                let bind_group = self.face_bind_group(
                    backend,
                    transients,
                    self.cube_layout,
                    params,
                    environment.view,
                )?;
                Self::draw_fullscreen(
                    backend,
                    "Prefilter Face",
                    target.view,
                    self.prefilter_pipeline,
                    bind_group,
                );
                backend.copy_texture_to_texture(
                    TextureCopyLocation::base(target.texture),
                    TextureCopyLocation {
                        texture: cube.texture,
                        mip_level: mip,
                        array_layer: face.layer(),
                    },
                    target.size,
                    target.size,
                );
            }
        }

        Ok(cube)
    }

    fn render_brdf_lut(
        &self,
        backend: &mut dyn GraphicsBackend,
        outputs: &mut Allocations,
        transients: &mut Allocations,
    ) -> RendererResult<(TextureHandle, TextureViewHandle)> {
        let size = self.config.brdf_lut_size;
        log::debug!("IBL: BRDF table {}x{}", size, size);

        let texture = outputs.texture(
            backend,
            &TextureDescriptor {
                label: Some("BRDF LUT".into()),
                width: size,
                height: size,
                format: TextureFormat::Rg16Float,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ..Default::default()
            },
        )?;
        let view = outputs.view(backend, texture, &TextureViewDescriptor::default())?;

        let params = transients.uniform(
            backend,
            "BRDF Params",
            &[self.config.brdf_samples, 0, 0, 0],
        )?;
        let bind_group = transients.bind_group(
            backend,
            self.brdf_layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: params,
                    offset: 0,
                    size: None,
                },
            )],
        )?;
        Self::draw_fullscreen(backend, "BRDF Integration", view, self.brdf_pipeline, bind_group);

        Ok((texture, view))
    }
}

/// Angular step of the diffuse convolution.
pub const IRRADIANCE_SAMPLE_DELTA: f32 = 0.025;
const IRRADIANCE_PHI_STEPS: u32 = 252;
const IRRADIANCE_THETA_STEPS: u32 = 63;

/// CPU evaluation of the diffuse convolution the irradiance shader performs, for a normal
/// and a radiance function over directions.
pub fn reference_irradiance(normal: Vec3, radiance: impl Fn(Vec3) -> Vec3) -> Vec3 {
    let n = normal.normalize();
    let up = if n.y.abs() > 0.999 { Vec3::X } else { Vec3::Y };
    let right = up.cross(n).normalize();
    let up = n.cross(right).normalize();

    let mut sum = Vec3::ZERO;
    for i in 0..IRRADIANCE_PHI_STEPS {
        let phi = i as f32 * IRRADIANCE_SAMPLE_DELTA;
        for j in 0..IRRADIANCE_THETA_STEPS {
            let theta = j as f32 * IRRADIANCE_SAMPLE_DELTA;
            let tangent = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            let dir = tangent.x * right + tangent.y * up + tangent.z * n;
            sum += radiance(dir) * theta.cos() * theta.sin();
        }
    }
    std::f32::consts::PI * sum / (IRRADIANCE_PHI_STEPS * IRRADIANCE_THETA_STEPS) as f32
}
