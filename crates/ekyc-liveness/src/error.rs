use ekyc_vision::VisionError;
use thiserror::Error;

pub type LivenessResult<T> = Result<T, LivenessError>;

/// Failures that stop a check from reaching a verdict. A photograph that is
/// simply not live enough is reported as a `LivenessOutcome`, not an error.
#[derive(Debug, Error)]
pub enum LivenessError {
    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("no faces found in image {image}")]
    NoFace { image: String },

    #[error("not enough confidence to ascertain if eyes are open ({confidence:.1} < {required:.1})")]
    LowConfidence { confidence: f32, required: f32 },

    #[error("image is {width}x{height}px; at least {min_width}x{min_height}px is required")]
    ImageTooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
}

impl LivenessError {
    pub fn no_face(image: impl Into<String>) -> Self {
        Self::NoFace {
            image: image.into(),
        }
    }
}
