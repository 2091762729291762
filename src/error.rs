//! Renderer-level errors

use crate::backend::BackendError;
use crate::model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("GPU backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Failed to load image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Brightness readback failed: {0}")]
    Readback(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Window error: {0}")]
    Window(String),
}

pub type RendererResult<T> = Result<T, RendererError>;
