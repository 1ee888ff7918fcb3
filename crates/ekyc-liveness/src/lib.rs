//! Liveness verification across the four photographs of a session: the
//! identity document, a head-on selfie, an eyes-closed frame and a
//! nose-pointing frame.

pub mod checks;
mod error;
mod quadrant;
mod verifier;

pub use error::{LivenessError, LivenessResult};
pub use quadrant::ScreenQuadrant;
pub use verifier::{LivenessReport, LivenessStage, LivenessVerifier};
