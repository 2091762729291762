//! Backend abstraction layer
//!
//! [`GraphicsBackend`] is implemented by the wgpu backend for real rendering and by the
//! recording backend for GPU-free tests.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
