use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    #[error("Snapshot encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CanvasError>;
