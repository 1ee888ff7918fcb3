use thiserror::Error;

pub type VisionResult<T> = Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("{capability} call failed: {message}")]
    Service {
        capability: &'static str,
        message: String,
    },

    #[error("object '{key}' not found")]
    NotFound { key: String },

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VisionError {
    pub fn service(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Service {
            capability,
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }
}
