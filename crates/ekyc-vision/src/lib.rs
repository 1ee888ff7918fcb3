//! External capability seams used by the ekyc engines.
//!
//! Text detection, face analysis, label classification, object storage,
//! session lookup and failure notification are all provided by services the
//! engines never implement themselves. Each is a `Send + Sync` async trait so
//! the engines can hold them as `Arc<dyn ...>` and tests can swap in the
//! in-memory and scripted implementations below.

mod capability;
mod error;
pub mod imaging;
mod memory;
mod scripted;

pub use capability::{
    Capabilities, FaceAnalyzer, FaceAttributes, ImageRef, LabelClassifier, NotificationSink,
    ObjectStore, SessionStore, TextDetector,
};
pub use error::{VisionError, VisionResult};
pub use memory::{
    MemoryObjectStore, MemorySessionStore, NoopNotificationSink, RecordingNotificationSink,
};
pub use scripted::{FaceComparisonScript, ScriptedFaceAnalyzer, ScriptedLabelClassifier, ScriptedTextDetector};
