//! IBL Renderer - physically based rendering with image-based lighting
//!
//! An HDR panorama is projected once into environment, irradiance and prefiltered specular
//! cube maps plus a BRDF lookup table. Every frame the scene (glTF model or a sphere grid)
//! is shaded with Cook-Torrance point lights and the IBL maps into an HDR target, reduced
//! to a log-average luminance, adapted over time and tone mapped to the swapchain.
//!
//! All GPU work goes through [`backend::GraphicsBackend`]; the wgpu backend renders, the
//! recording backend lets tests inspect what was asked of the GPU.

use std::path::PathBuf;

pub mod backend;
pub mod error;
pub mod frame;
pub mod ibl;
pub mod input;
pub mod model;
pub mod postprocess;
pub mod renderer;
pub mod scene;
pub mod sky;
pub mod timer;
pub mod window;

pub use backend::wgpu_backend::WgpuBackend;
pub use error::{RendererError, RendererResult};
pub use ibl::IblConfig;
pub use postprocess::{AdaptationConfig, TonemapOperator};
pub use renderer::Renderer;
pub use scene::CameraConfig;
pub use window::{run, Window};

/// Configuration for the renderer and its window
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    pub ibl: IblConfig,
    pub adaptation: AdaptationConfig,
    pub tonemap: TonemapOperator,
    pub camera: CameraConfig,
    /// Scene pass clear color, visible only where the sky is not drawn
    pub clear_color: [f32; 4],
    /// glTF model to show; the sphere grid when `None`
    pub model: Option<PathBuf>,
    /// Equirectangular HDR panorama; a procedural sky when `None`
    pub environment: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "IBL Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            ibl: IblConfig::default(),
            adaptation: AdaptationConfig::default(),
            tonemap: TonemapOperator::default(),
            camera: CameraConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            model: None,
            environment: None,
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> RendererResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RendererError::InvalidConfig(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        let camera = &self.camera;
        if !(camera.fov_y_degrees > 0.0 && camera.fov_y_degrees < 180.0) {
            return Err(RendererError::InvalidConfig(format!(
                "camera.fov_y_degrees must be in (0, 180), got {}",
                camera.fov_y_degrees
            )));
        }
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(RendererError::InvalidConfig(format!(
                "camera planes must satisfy 0 < near < far, got {} and {}",
                camera.near, camera.far
            )));
        }
        self.ibl.validate()?;
        self.adaptation.validate()
    }
}
