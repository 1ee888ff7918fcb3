//! Document understanding: classification, field extraction and face crops
//! for the identity documents the engine supports.

pub mod alignment;
pub mod classifier;
mod error;
pub mod extract;
pub mod face;
pub mod lines;
mod pipeline;
pub mod reference;
pub mod registry;

pub use classifier::{Classification, CroppedDocument, DocumentClassifier};
pub use error::{DocumentError, DocumentResult};
pub use extract::{ExtractionContext, FieldExtractor};
pub use lines::TextLineIndex;
pub use pipeline::DocumentPipeline;
pub use reference::MalaysianReference;
pub use registry::{DataField, DocumentDefinition, DocumentRegistry, DocumentSummary};
