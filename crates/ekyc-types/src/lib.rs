//! Shared domain models for the ekyc workspace.
//!
//! This crate holds the plain data carried between the capability layer, the
//! document engine and the liveness verifier. Keep it free of I/O and heavy
//! dependencies so every crate can depend on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fields;
pub mod geometry;
pub mod session;
pub mod settings;

pub use fields::{BirthDetails, ExtractedFields};
pub use geometry::{BoundingBox, PixelRect, Point};
pub use session::{LivenessOutcome, VerificationHistoryRecord, VerificationSession};
pub use settings::{ClassifierSettings, EngineSettings, SettingsError};

/// A single line of text reported by a text detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    pub text: String,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    /// Outline of the line, clockwise from the top-left corner. May be empty.
    #[serde(default)]
    pub polygon: Vec<Point>,
}

impl TextLine {
    pub fn new(text: impl Into<String>, bounding_box: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bounding_box,
            confidence: 100.0,
            polygon: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_polygon(mut self, polygon: Vec<Point>) -> Self {
        self.polygon = polygon;
        self
    }

    /// Left and right ends of the line's top edge.
    pub fn top_edge(&self) -> (Point, Point) {
        match self.polygon.as_slice() {
            [first, second, ..] => (*first, *second),
            _ => {
                let bbox = &self.bounding_box;
                (
                    Point::new(bbox.left, bbox.top),
                    Point::new(bbox.right(), bbox.top),
                )
            }
        }
    }
}

/// A single field reported by an identity-document analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityField {
    pub field_type: String,
    pub value: String,
    pub confidence: f32,
}

/// Custom label emitted by a trained classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomLabel {
    pub name: String,
    pub confidence: f32,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

/// Trained classifier model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub arn: String,
    pub status: String,
}

impl ModelVersion {
    pub const RUNNING: &'static str = "RUNNING";

    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case(Self::RUNNING)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Pose {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyesOpen {
    pub value: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkType {
    EyeLeft,
    EyeRight,
    Nose,
    MouthLeft,
    MouthRight,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceLandmark {
    #[serde(rename = "type")]
    pub kind: LandmarkType,
    pub x: f32,
    pub y: f32,
}

/// A face reported by a face analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetail {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    #[serde(default)]
    pub pose: Pose,
    #[serde(default)]
    pub eyes_open: Option<EyesOpen>,
    #[serde(default)]
    pub landmarks: Vec<FaceLandmark>,
}

impl FaceDetail {
    pub fn new(bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            bounding_box,
            confidence,
            pose: Pose::default(),
            eyes_open: None,
            landmarks: Vec::new(),
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_eyes_open(mut self, value: bool, confidence: f32) -> Self {
        self.eyes_open = Some(EyesOpen { value, confidence });
        self
    }

    pub fn with_landmark(mut self, kind: LandmarkType, x: f32, y: f32) -> Self {
        self.landmarks.push(FaceLandmark { kind, x, y });
        self
    }

    pub fn landmark(&self, kind: LandmarkType) -> Option<&FaceLandmark> {
        self.landmarks.iter().find(|landmark| landmark.kind == kind)
    }

    /// Size measure used to pick the dominant face in a frame.
    pub fn extent(&self) -> f32 {
        self.bounding_box.width + self.bounding_box.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub similarity: f32,
}

/// Identity document families the engine knows how to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    IdKtp,
    MyNric,
    AuPassport,
    KhIc,
    PrcPassport,
    SgPassport,
    ThaiIdFront,
    ThaiIdBack,
    Generic,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        DocumentType::IdKtp,
        DocumentType::MyNric,
        DocumentType::AuPassport,
        DocumentType::KhIc,
        DocumentType::PrcPassport,
        DocumentType::SgPassport,
        DocumentType::ThaiIdFront,
        DocumentType::ThaiIdBack,
        DocumentType::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::IdKtp => "ID_KTP",
            DocumentType::MyNric => "MY_NRIC",
            DocumentType::AuPassport => "AU_PASSPORT",
            DocumentType::KhIc => "KH_IC",
            DocumentType::PrcPassport => "PRC_PASSPORT",
            DocumentType::SgPassport => "SG_PASSPORT",
            DocumentType::ThaiIdFront => "THAI_ID_FRONT",
            DocumentType::ThaiIdBack => "THAI_ID_BACK",
            DocumentType::Generic => "GENERIC",
        }
    }

    /// Maps a classifier label onto a document type. Classifier models name
    /// the Thai front side `thai_id`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("thai_id") {
            return Some(DocumentType::ThaiIdFront);
        }
        label.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown document type '{0}'")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        DocumentType::ALL
            .into_iter()
            .find(|doc_type| doc_type.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownDocumentType(trimmed.to_string()))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named region of a document layout, optionally with a value pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedField {
    pub name: String,
    #[serde(default)]
    pub expected_bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub regex_expression: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl NamedField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected_bounding_box: None,
            regex_expression: None,
            language: None,
        }
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.expected_bounding_box = Some(bounding_box);
        self
    }

    pub fn with_regex(mut self, expression: impl Into<String>) -> Self {
        self.regex_expression = Some(expression.into());
        self
    }
}
