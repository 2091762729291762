//! Top-level renderer
//!
//! Owns the backend and every GPU resource, and lends them to the components. A frame is:
//! scene pass (sky then model) into the HDR target, luminance reduction, blocking readback
//! folded into the adapted brightness, then tone mapping into the swapchain.

use std::path::Path;

use glam::Vec3;

use crate::backend::*;
use crate::error::{RendererError, RendererResult};
use crate::frame::{FrameResources, ShaderMode};
use crate::ibl::{IblGenerator, IblMaps, Panorama};
use crate::input::{InputState, Key};
use crate::model::{sphere_grid, Model, ModelData, ModelRenderer};
use crate::postprocess::{
    AdaptedBrightness, BrightnessReadback, LuminanceChain, StagingReadback, TonemappingPass,
};
use crate::scene::{Camera, CameraController, CameraInput, FreeFlyController, LightRig};
use crate::sky::{SkyPass, SkySource};
use crate::timer::FrameTimer;
use crate::RendererConfig;

/// Format of the HDR scene target every scene pass renders into.
pub const SCENE_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const DEFAULT_PANORAMA_WIDTH: u32 = 128;
const DEFAULT_PANORAMA_HEIGHT: u32 = 64;

/// Window-size dependent scene color and depth targets
struct SceneTargets {
    color: TextureHandle,
    color_view: TextureViewHandle,
    depth: TextureHandle,
    depth_view: TextureViewHandle,
    width: u32,
    height: u32,
}

impl SceneTargets {
    fn new(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> BackendResult<Self> {
        let color = backend.create_texture(&TextureDescriptor {
            label: Some("Scene Color".into()),
            width,
            height,
            format: SCENE_COLOR_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        })?;
        let color_view = backend.create_texture_view(color, &TextureViewDescriptor::default())?;
        let depth = backend.create_texture(&TextureDescriptor {
            label: Some("Scene Depth".into()),
            width,
            height,
            format: DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        })?;
        let depth_view = backend.create_texture_view(depth, &TextureViewDescriptor::default())?;

        Ok(Self {
            color,
            color_view,
            depth,
            depth_view,
            width,
            height,
        })
    }

    fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_texture_view(self.color_view);
        backend.destroy_texture(self.color);
        backend.destroy_texture_view(self.depth_view);
        backend.destroy_texture(self.depth);
    }
}

/// Sky gradient used when no panorama file is configured.
fn default_panorama_texels(width: u32, height: u32) -> Vec<f32> {
    let zenith = Vec3::new(0.25, 0.45, 1.0);
    let horizon = Vec3::new(1.6, 1.5, 1.35);
    let ground = Vec3::new(0.12, 0.1, 0.08);

    let mut texels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        // +1 at the top row, -1 at the bottom
        let elevation = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
        let color = if elevation >= 0.0 {
            horizon.lerp(zenith, elevation.sqrt())
        } else {
            ground.lerp(horizon * 0.3, (1.0 + elevation).powi(8))
        };
        for _ in 0..width {
            texels.extend_from_slice(&[color.x, color.y, color.z, 1.0]);
        }
    }
    texels
}

pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    frame: FrameResources,
    ibl: IblGenerator,
    maps: IblMaps,
    sky: SkyPass,
    models: ModelRenderer,
    model: Model,
    targets: SceneTargets,
    luminance: LuminanceChain,
    readback: StagingReadback,
    adapted: AdaptedBrightness,
    tonemap: TonemappingPass,
    camera: Camera,
    controller: FreeFlyController,
    lights: LightRig,
    shader_mode: ShaderMode,
    timer: FrameTimer,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Create every resource, generate the IBL maps and upload the model.
    pub fn new(mut backend: B, config: RendererConfig) -> RendererResult<Self> {
        config.validate()?;

        let (width, height) = match backend.surface_size() {
            (0, _) | (_, 0) => (config.width, config.height),
            size => size,
        };

        let frame = FrameResources::new(&mut backend)?;
        let ibl = IblGenerator::new(&mut backend, config.ibl.clone())?;
        let panorama = match &config.environment {
            Some(path) => Panorama::load(&mut backend, path)?,
            None => Self::default_panorama(&mut backend)?,
        };
        let maps = ibl.generate(&mut backend, &panorama);
        panorama.destroy(&mut backend);
        let maps = maps?;

        let mut sky = SkyPass::new(&mut backend, frame.layout())?;
        sky.set_maps(&mut backend, &maps)?;

        let mut models = ModelRenderer::new(&mut backend, frame.layout())?;
        let data = match &config.model {
            Some(path) => ModelData::import(path)?,
            None => sphere_grid(),
        };
        let model = models.upload(&mut backend, &data, &maps)?;

        let targets = SceneTargets::new(&mut backend, width, height)?;
        let luminance = LuminanceChain::new(&mut backend, targets.color_view, width, height)?;
        let readback = StagingReadback::new(&mut backend)?;
        let tonemap = TonemappingPass::new(
            &mut backend,
            config.tonemap,
            config.adaptation.key_value,
            targets.color_view,
        )?;

        let camera = Camera::from_config(&config.camera, width as f32 / height as f32);
        let adapted = AdaptedBrightness::new(config.adaptation.time_constant);

        log::info!("Renderer ready at {}x{}", width, height);

        Ok(Self {
            backend,
            config,
            frame,
            ibl,
            maps,
            sky,
            models,
            model,
            targets,
            luminance,
            readback,
            adapted,
            tonemap,
            camera,
            controller: FreeFlyController::new(),
            lights: LightRig::new(),
            shader_mode: ShaderMode::default(),
            timer: FrameTimer::new(),
        })
    }

    fn default_panorama(backend: &mut dyn GraphicsBackend) -> RendererResult<Panorama> {
        let texels = default_panorama_texels(DEFAULT_PANORAMA_WIDTH, DEFAULT_PANORAMA_HEIGHT);
        Panorama::from_rgba32f(
            backend,
            DEFAULT_PANORAMA_WIDTH,
            DEFAULT_PANORAMA_HEIGHT,
            &texels,
        )
    }

    /// Advance time by `dt` seconds and apply input.
    ///
    /// Keys act on release: `1`/`2` cycle the first two lights, `3`-`6` select the shader
    /// mode, `7` toggles the sky source.
    pub fn update(&mut self, dt: f32, input: &mut InputState) {
        self.timer.tick_with(dt);

        let keyboard = &input.keyboard;
        if keyboard.was_released(Key::Digit(1)) {
            self.lights.cycle(0);
        }
        if keyboard.was_released(Key::Digit(2)) {
            self.lights.cycle(1);
        }
        for (digit, mode) in [
            (3, ShaderMode::Regular),
            (4, ShaderMode::NormalDistribution),
            (5, ShaderMode::Geometry),
            (6, ShaderMode::Fresnel),
        ] {
            if keyboard.was_released(Key::Digit(digit)) {
                self.shader_mode = mode;
            }
        }
        if keyboard.was_released(Key::Digit(7)) {
            self.sky.toggle();
        }

        let camera_input = CameraInput::gather(&input.keyboard, &mut input.mouse);
        self.controller.update(&mut self.camera, &camera_input, dt);
    }

    /// Render and present one frame.
    ///
    /// Returns `Ok(false)` when nothing was drawn: before the first [`Renderer::update`] and
    /// when the surface had to be reconfigured.
    pub fn render(&mut self) -> RendererResult<bool> {
        if self.timer.frame_count() == 0 {
            return Ok(false);
        }

        let frame = match self.backend.begin_frame() {
            Ok(frame) => frame,
            Err(BackendError::SurfaceLost) => {
                log::warn!("Surface lost, skipping frame");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        self.frame.write(
            &mut self.backend,
            &self.camera,
            &self.lights,
            self.timer.total_seconds() as f32,
            self.shader_mode,
        );

        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Scene".into()),
            color_attachments: vec![ColorAttachment::clear(
                self.targets.color_view,
                self.config.clear_color,
            )],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: self.targets.depth_view,
                depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });
        self.backend.set_viewport(
            0.0,
            0.0,
            self.targets.width as f32,
            self.targets.height as f32,
            0.0,
            1.0,
        );
        self.sky.encode(&mut self.backend, self.frame.bind_group());
        self.models
            .draw(&mut self.backend, &self.model, self.frame.bind_group(), &self.camera);
        self.backend.end_render_pass();

        self.luminance.encode(&mut self.backend);
        let output = self
            .luminance
            .output()
            .ok_or_else(|| RendererError::Readback("luminance chain has no levels".into()))?;
        let raw = self.readback.read(&mut self.backend, output)?;
        let adapted = self.adapted.update(raw, self.timer.delta_seconds());
        log::trace!("Luminance raw {:.4}, adapted {:.4}", raw, adapted);

        self.tonemap.encode(
            &mut self.backend,
            frame.swapchain_view,
            frame.width,
            frame.height,
            adapted,
        );

        self.backend.end_frame()?;
        Ok(true)
    }

    /// Resize the surface and every window-size dependent target.
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize(width, height);

        // The backend may clamp to device limits
        let (width, height) = match self.backend.surface_size() {
            (0, _) | (_, 0) => (width, height),
            size => size,
        };
        if width == self.targets.width && height == self.targets.height {
            return Ok(());
        }

        let targets = SceneTargets::new(&mut self.backend, width, height)?;
        std::mem::replace(&mut self.targets, targets).destroy(&mut self.backend);
        self.luminance
            .resize(&mut self.backend, self.targets.color_view, width, height)?;
        self.tonemap.set_source(&mut self.backend, self.targets.color_view)?;
        self.camera.set_aspect(width as f32, height as f32);

        log::info!("Resized to {}x{}", width, height);
        Ok(())
    }

    /// Load a new environment panorama and regenerate the IBL maps from it.
    pub fn set_environment(&mut self, path: &Path) -> RendererResult<()> {
        let panorama = Panorama::load(&mut self.backend, path)?;
        self.apply_panorama(panorama)
    }

    /// Regenerate the IBL maps from an already uploaded panorama, which is consumed.
    pub fn apply_panorama(&mut self, panorama: Panorama) -> RendererResult<()> {
        let maps = self.ibl.generate(&mut self.backend, &panorama);
        panorama.destroy(&mut self.backend);
        let maps = maps?;

        if let Err(e) = self.sky.set_maps(&mut self.backend, &maps) {
            maps.destroy(&mut self.backend);
            return Err(e);
        }
        if let Err(e) = self
            .models
            .rebind_environment(&mut self.backend, &mut self.model, &maps)
        {
            // Point the sky back at the maps that stay current
            self.sky.set_maps(&mut self.backend, &self.maps)?;
            maps.destroy(&mut self.backend);
            return Err(e.into());
        }
        std::mem::replace(&mut self.maps, maps).destroy(&mut self.backend);
        Ok(())
    }

    /// Replace the displayed model.
    pub fn set_model(&mut self, data: &ModelData) -> RendererResult<()> {
        let model = self.models.upload(&mut self.backend, data, &self.maps)?;
        std::mem::replace(&mut self.model, model).destroy(&mut self.backend);
        Ok(())
    }

    /// Release every GPU resource the renderer owns and hand the backend back.
    pub fn destroy(mut self) -> B {
        let backend: &mut dyn GraphicsBackend = &mut self.backend;
        self.model.destroy(backend);
        self.sky.destroy(backend);
        self.maps.destroy(backend);
        self.tonemap.destroy(backend);
        self.luminance.destroy(backend);
        self.readback.destroy(backend);
        self.targets.destroy(backend);
        self.frame.destroy(backend);
        self.backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn lights(&self) -> &LightRig {
        &self.lights
    }

    pub fn shader_mode(&self) -> ShaderMode {
        self.shader_mode
    }

    pub fn sky_source(&self) -> SkySource {
        self.sky.source
    }

    /// Adapted log-average luminance.
    pub fn adapted_luminance(&self) -> f32 {
        self.adapted.value()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn maps(&self) -> &IblMaps {
        &self.maps
    }

    pub fn luminance(&self) -> &LuminanceChain {
        &self.luminance
    }

    pub fn scene_color_texture(&self) -> TextureHandle {
        self.targets.color
    }

    pub fn frame_count(&self) -> u64 {
        self.timer.frame_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;
    use crate::input::Keyboard;

    fn small_config() -> RendererConfig {
        let mut config = RendererConfig::default();
        config.ibl.environment_size = 16;
        config.ibl.environment_mips = 5;
        config.ibl.irradiance_size = 8;
        config.ibl.prefilter_size = 16;
        config.ibl.brdf_lut_size = 16;
        config
    }

    fn renderer() -> Renderer<RecordingBackend> {
        match Renderer::new(RecordingBackend::new(64, 32), small_config()) {
            Ok(renderer) => renderer,
            Err(e) => panic!("renderer creation failed: {e}"),
        }
    }

    fn release(input: &mut InputState, digit: u8) {
        input.keyboard = Keyboard::new();
        input.keyboard.press(Key::Digit(digit));
        input.keyboard.release(Key::Digit(digit));
    }

    #[test]
    fn test_default_panorama_is_brighter_above_horizon() {
        let texels = default_panorama_texels(4, 8);
        assert_eq!(texels.len(), 4 * 8 * 4);
        let top = texels[0] + texels[1] + texels[2];
        let bottom_row = 7 * 4 * 4;
        let bottom = texels[bottom_row] + texels[bottom_row + 1] + texels[bottom_row + 2];
        assert!(top > bottom);
        assert!(texels.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_nothing_rendered_before_first_update() {
        let mut renderer = renderer();
        renderer.backend_mut().clear_commands();

        assert!(!renderer.render().unwrap());
        assert!(renderer.backend().commands().is_empty());
    }

    #[test]
    fn test_keys_change_state_on_release() {
        let mut renderer = renderer();
        let mut input = InputState::new();

        release(&mut input, 5);
        renderer.update(0.016, &mut input);
        assert_eq!(renderer.shader_mode(), ShaderMode::Geometry);

        release(&mut input, 7);
        renderer.update(0.016, &mut input);
        assert_eq!(renderer.sky_source(), SkySource::Prefiltered);

        let before = renderer.lights().strength(0);
        release(&mut input, 1);
        renderer.update(0.016, &mut input);
        assert_ne!(renderer.lights().strength(0), before);
    }

    #[test]
    fn test_held_key_does_nothing() {
        let mut renderer = renderer();
        let mut input = InputState::new();
        input.keyboard.press(Key::Digit(4));
        renderer.update(0.016, &mut input);
        assert_eq!(renderer.shader_mode(), ShaderMode::Regular);
    }

    #[test]
    fn test_resize_to_same_size_keeps_targets() {
        let mut renderer = renderer();
        let color = renderer.scene_color_texture();
        renderer.resize(64, 32).unwrap();
        assert_eq!(renderer.scene_color_texture(), color);
        renderer.resize(0, 10).unwrap();
        assert_eq!(renderer.scene_color_texture(), color);
    }
}
