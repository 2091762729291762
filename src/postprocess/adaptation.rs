//! Eye adaptation
//!
//! The reduced log luminance is read back to the CPU every frame and folded into an
//! exponentially decaying average, so exposure follows scene brightness with a lag.

use crate::backend::*;
use crate::error::{RendererError, RendererResult};

/// Row pitch of texture to buffer copies.
const READBACK_ROW_PITCH: u32 = 256;

/// Eye adaptation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptationConfig {
    /// Seconds for the adapted value to cover 63% of a step change
    pub time_constant: f32,
    /// Middle-grey target the adapted luminance is exposed to
    pub key_value: f32,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            time_constant: 2.0,
            key_value: 0.18,
        }
    }
}

impl AdaptationConfig {
    pub fn validate(&self) -> RendererResult<()> {
        if self.time_constant.is_nan() || self.time_constant <= 0.0 {
            return Err(RendererError::InvalidConfig(format!(
                "adaptation.time_constant must be positive, got {}",
                self.time_constant
            )));
        }
        if self.key_value.is_nan() || self.key_value <= 0.0 {
            return Err(RendererError::InvalidConfig(format!(
                "adaptation.key_value must be positive, got {}",
                self.key_value
            )));
        }
        Ok(())
    }
}

/// One step of the exponential low-pass filter.
pub fn adapt(previous: f32, raw: f32, dt: f32, time_constant: f32) -> f32 {
    previous + (raw - previous) * (1.0 - (-dt / time_constant).exp())
}

/// Temporally adapted log-average luminance. Starts at 0 and is never reset.
#[derive(Debug, Clone)]
pub struct AdaptedBrightness {
    value: f32,
    time_constant: f32,
}

impl AdaptedBrightness {
    pub fn new(time_constant: f32) -> Self {
        Self {
            value: 0.0,
            time_constant,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Fold this frame's raw sample in and return the new adapted value.
    pub fn update(&mut self, raw: f32, dt: f32) -> f32 {
        self.value = adapt(self.value, raw, dt.max(0.0), self.time_constant);
        log::trace!("Luminance raw {:.4} adapted {:.4}", raw, self.value);
        self.value
    }
}

/// Blocking GPU to CPU read of the reduced luminance texel.
pub trait BrightnessReadback {
    /// Read texel (0, 0) of `source`, waiting for all GPU work that writes it.
    fn read(&mut self, backend: &mut dyn GraphicsBackend, source: TextureHandle) -> RendererResult<f32>;
}

/// Copies the texel into a mappable staging buffer and maps it synchronously.
pub struct StagingReadback {
    buffer: BufferHandle,
}

impl StagingReadback {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RendererResult<Self> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("Luminance Readback".into()),
            size: READBACK_ROW_PITCH as u64,
            usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        Ok(Self { buffer })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_buffer(self.buffer);
    }
}

impl BrightnessReadback for StagingReadback {
    fn read(&mut self, backend: &mut dyn GraphicsBackend, source: TextureHandle) -> RendererResult<f32> {
        backend.copy_texture_to_buffer(
            TextureCopyLocation::base(source),
            self.buffer,
            READBACK_ROW_PITCH,
            1,
            1,
        );
        let bytes = backend
            .read_buffer(self.buffer, 0, std::mem::size_of::<f32>() as u64)
            .map_err(|e| RendererError::Readback(e.to_string()))?;
        if bytes.len() < std::mem::size_of::<f32>() {
            return Err(RendererError::Readback(format!(
                "expected 4 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytemuck::pod_read_unaligned::<f32>(&bytes[..4]))
    }
}
