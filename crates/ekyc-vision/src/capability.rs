use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ekyc_types::{
    CustomLabel, FaceDetail, FaceMatch, IdentityField, ModelVersion, TextLine, VerificationSession,
};

use crate::error::VisionResult;

/// Image handed to a capability, either by storage key or inline.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageRef {
    Stored(String),
    Bytes(Arc<[u8]>),
}

impl ImageRef {
    pub fn stored(key: impl Into<String>) -> Self {
        Self::Stored(key.into())
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        Self::Bytes(Arc::from(data.into_boxed_slice()))
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            ImageRef::Stored(key) => Some(key),
            ImageRef::Bytes(_) => None,
        }
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Stored(key) => f.debug_tuple("Stored").field(key).finish(),
            ImageRef::Bytes(data) => f.debug_struct("Bytes").field("len", &data.len()).finish(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Stored(key) => f.write_str(key),
            ImageRef::Bytes(data) => write!(f, "<{} inline bytes>", data.len()),
        }
    }
}

/// How much detail a face detection call should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaceAttributes {
    #[default]
    Default,
    /// Include pose, eye state and landmarks.
    All,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_image(&self, key: &str) -> VisionResult<Vec<u8>>;

    async fn put_image(&self, key: &str, bytes: Vec<u8>) -> VisionResult<()>;

    async fn delete(&self, key: &str) -> VisionResult<()>;
}

#[async_trait]
pub trait TextDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plain line detection.
    async fn detect_lines(&self, image: &ImageRef) -> VisionResult<Vec<TextLine>>;

    /// Line detection with form analysis enabled. Tends to split label and
    /// value columns more reliably on cards.
    async fn detect_key_value_forms(&self, image: &ImageRef) -> VisionResult<Vec<TextLine>>;

    async fn analyze_identity_document(&self, image: &ImageRef) -> VisionResult<Vec<IdentityField>>;
}

#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    async fn detect_faces(
        &self,
        image: &ImageRef,
        attributes: FaceAttributes,
    ) -> VisionResult<Vec<FaceDetail>>;

    /// Returns the faces in `target` matching the largest face in `source`
    /// with at least `similarity_threshold` similarity.
    async fn compare_faces(
        &self,
        source: &ImageRef,
        target: &ImageRef,
        similarity_threshold: f32,
    ) -> VisionResult<Vec<FaceMatch>>;
}

#[async_trait]
pub trait LabelClassifier: Send + Sync {
    /// Latest running version of `project`, if any.
    async fn describe_active_version(&self, project: &str) -> VisionResult<Option<ModelVersion>>;

    async fn detect_custom_labels(
        &self,
        image: &ImageRef,
        model_version: &str,
        min_confidence: Option<f32>,
    ) -> VisionResult<Vec<CustomLabel>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, id: &str) -> VisionResult<Option<VerificationSession>>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_verification_failure(&self, session_id: &str, message: &str)
    -> VisionResult<()>;
}

/// Handles to the capabilities the document engine needs.
#[derive(Clone)]
pub struct Capabilities {
    pub store: Arc<dyn ObjectStore>,
    pub text: Arc<dyn TextDetector>,
    pub faces: Arc<dyn FaceAnalyzer>,
    pub labels: Arc<dyn LabelClassifier>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("text", &self.text.name())
            .finish_non_exhaustive()
    }
}
