use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The model artifact does not exist on disk
    #[error("Model file not found at {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("TensorFlow: {0}")]
    TensorFlow(#[from] tensorflow::Status),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Tensor data does not match the declared shape
    #[error("tensor shape {shape:?} needs {expected} values, got {actual}")]
    ShapeMismatch {
        shape: [u64; 4],
        expected: usize,
        actual: usize,
    },

    #[error("model returned an empty output tensor")]
    EmptyOutput,

    #[error("model returned {0}, which is not a probability")]
    InvalidProbability(f32),
}

pub type Result<T> = std::result::Result<T, Error>;
