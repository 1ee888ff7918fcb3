//! Capabilities that replay pre-recorded responses.
//!
//! Responses are keyed by storage key. A key ending in `*` matches every key
//! sharing that prefix, which lets a script answer for images staged under
//! content-derived names. Inline images never match a script entry.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use ekyc_types::{CustomLabel, FaceDetail, FaceMatch, IdentityField, ModelVersion, TextLine};
use serde::Deserialize;

use crate::capability::{FaceAnalyzer, FaceAttributes, ImageRef, LabelClassifier, TextDetector};
use crate::error::{VisionError, VisionResult};

#[derive(Debug, Default)]
struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    fn record(&self, entry: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn count(&self, operation: &str) -> usize {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.split(':').next() == Some(operation))
            .count()
    }
}

fn lookup<'a, T>(entries: &'a HashMap<String, T>, image: &ImageRef) -> Option<&'a T> {
    let key = image.key()?;
    if let Some(value) = entries.get(key) {
        return Some(value);
    }
    entries
        .iter()
        .filter_map(|(pattern, value)| {
            let prefix = pattern.strip_suffix('*')?;
            key.starts_with(prefix).then_some((prefix.len(), value))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, value)| value)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptedTextDetector {
    lines: HashMap<String, Vec<TextLine>>,
    /// Form-analysis responses. Keys missing here reuse `lines`.
    forms: HashMap<String, Vec<TextLine>>,
    identity: HashMap<String, Vec<IdentityField>>,
    #[serde(skip)]
    calls: CallLog,
}

impl ScriptedTextDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(mut self, key: impl Into<String>, lines: Vec<TextLine>) -> Self {
        self.lines.insert(key.into(), lines);
        self
    }

    pub fn with_forms(mut self, key: impl Into<String>, lines: Vec<TextLine>) -> Self {
        self.forms.insert(key.into(), lines);
        self
    }

    pub fn with_identity_fields(mut self, key: impl Into<String>, fields: Vec<IdentityField>) -> Self {
        self.identity.insert(key.into(), fields);
        self
    }

    /// Every call as `operation:image`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.entries()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.count(operation)
    }
}

#[async_trait]
impl TextDetector for ScriptedTextDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn detect_lines(&self, image: &ImageRef) -> VisionResult<Vec<TextLine>> {
        self.calls.record(format!("detect_lines:{image}"));
        Ok(lookup(&self.lines, image).cloned().unwrap_or_default())
    }

    async fn detect_key_value_forms(&self, image: &ImageRef) -> VisionResult<Vec<TextLine>> {
        self.calls.record(format!("detect_key_value_forms:{image}"));
        Ok(lookup(&self.forms, image)
            .or_else(|| lookup(&self.lines, image))
            .cloned()
            .unwrap_or_default())
    }

    async fn analyze_identity_document(&self, image: &ImageRef) -> VisionResult<Vec<IdentityField>> {
        self.calls.record(format!("analyze_identity_document:{image}"));
        Ok(lookup(&self.identity, image).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceComparisonScript {
    pub source: String,
    pub target: String,
    pub similarity: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptedFaceAnalyzer {
    faces: HashMap<String, Vec<FaceDetail>>,
    comparisons: Vec<FaceComparisonScript>,
    /// Detection calls on these keys fail with the given message.
    failures: HashMap<String, String>,
    #[serde(skip)]
    calls: CallLog,
}

impl ScriptedFaceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(mut self, key: impl Into<String>, faces: Vec<FaceDetail>) -> Self {
        self.faces.insert(key.into(), faces);
        self
    }

    pub fn with_similarity(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        similarity: f32,
    ) -> Self {
        self.comparisons.push(FaceComparisonScript {
            source: source.into(),
            target: target.into(),
            similarity,
        });
        self
    }

    pub fn with_failure(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(key.into(), message.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.entries()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.count(operation)
    }
}

#[async_trait]
impl FaceAnalyzer for ScriptedFaceAnalyzer {
    async fn detect_faces(
        &self,
        image: &ImageRef,
        _attributes: FaceAttributes,
    ) -> VisionResult<Vec<FaceDetail>> {
        self.calls.record(format!("detect_faces:{image}"));
        if let Some(message) = lookup(&self.failures, image) {
            return Err(VisionError::service("face detection", message.clone()));
        }
        Ok(lookup(&self.faces, image).cloned().unwrap_or_default())
    }

    async fn compare_faces(
        &self,
        source: &ImageRef,
        target: &ImageRef,
        similarity_threshold: f32,
    ) -> VisionResult<Vec<FaceMatch>> {
        self.calls.record(format!("compare_faces:{source}->{target}"));
        let (Some(source), Some(target)) = (source.key(), target.key()) else {
            return Ok(Vec::new());
        };
        Ok(self
            .comparisons
            .iter()
            .filter(|script| script.source == source && script.target == target)
            .filter(|script| script.similarity >= similarity_threshold)
            .map(|script| FaceMatch {
                similarity: script.similarity,
            })
            .collect())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptedLabelClassifier {
    active_version: Option<ModelVersion>,
    /// Labels keyed by image key, or by `model|key` for a specific model.
    labels: HashMap<String, Vec<CustomLabel>>,
    #[serde(skip)]
    calls: CallLog,
}

impl ScriptedLabelClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active_version(mut self, version: ModelVersion) -> Self {
        self.active_version = Some(version);
        self
    }

    pub fn with_labels(mut self, key: impl Into<String>, labels: Vec<CustomLabel>) -> Self {
        self.labels.insert(key.into(), labels);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.entries()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.count(operation)
    }
}

#[async_trait]
impl LabelClassifier for ScriptedLabelClassifier {
    async fn describe_active_version(&self, project: &str) -> VisionResult<Option<ModelVersion>> {
        self.calls.record(format!("describe_active_version:{project}"));
        Ok(self
            .active_version
            .clone()
            .filter(ModelVersion::is_running))
    }

    async fn detect_custom_labels(
        &self,
        image: &ImageRef,
        model_version: &str,
        min_confidence: Option<f32>,
    ) -> VisionResult<Vec<CustomLabel>> {
        self.calls
            .record(format!("detect_custom_labels:{model_version}|{image}"));
        let scoped = image
            .key()
            .and_then(|key| self.labels.get(&format!("{model_version}|{key}")));
        let labels = scoped
            .or_else(|| lookup(&self.labels, image))
            .cloned()
            .unwrap_or_default();
        Ok(labels
            .into_iter()
            .filter(|label| min_confidence.is_none_or(|min| label.confidence >= min))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use ekyc_types::BoundingBox;

    use super::*;

    #[tokio::test]
    async fn prefix_entries_match_staged_keys() {
        let detector = ScriptedTextDetector::new()
            .with_lines("doc.png", vec![TextLine::new("A", BoundingBox::default())])
            .with_lines("temp/rotated/*", vec![TextLine::new("B", BoundingBox::default())]);
        let rotated = detector
            .detect_lines(&ImageRef::stored("temp/rotated/abc.png"))
            .await
            .unwrap();
        assert_eq!(rotated[0].text, "B");
        let inline = detector
            .detect_lines(&ImageRef::bytes(vec![0; 4]))
            .await
            .unwrap();
        assert!(inline.is_empty());
        assert_eq!(detector.call_count("detect_lines"), 2);
    }

    #[tokio::test]
    async fn forms_fall_back_to_plain_lines() {
        let detector = ScriptedTextDetector::new()
            .with_lines("doc.png", vec![TextLine::new("A", BoundingBox::default())]);
        let lines = detector
            .detect_key_value_forms(&ImageRef::stored("doc.png"))
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn comparisons_respect_threshold() {
        let analyzer = ScriptedFaceAnalyzer::new().with_similarity("selfie", "doc", 82.0);
        let selfie = ImageRef::stored("selfie");
        let doc = ImageRef::stored("doc");
        assert_eq!(analyzer.compare_faces(&selfie, &doc, 70.0).await.unwrap().len(), 1);
        assert!(analyzer.compare_faces(&selfie, &doc, 90.0).await.unwrap().is_empty());
        assert!(analyzer.compare_faces(&doc, &selfie, 70.0).await.unwrap().is_empty());
        assert_eq!(analyzer.call_count("compare_faces"), 3);
    }

    #[tokio::test]
    async fn stopped_versions_are_not_active() {
        let classifier = ScriptedLabelClassifier::new().with_active_version(ModelVersion {
            arn: "arn:version/1".into(),
            status: "STOPPED".into(),
        });
        assert!(classifier.describe_active_version("arn:project").await.unwrap().is_none());
    }

    #[test]
    fn scripts_deserialize_from_json() {
        let json = r#"{
            "faces": {"selfie.jpg": [{"boundingBox": {"top": 0.1, "left": 0.2, "width": 0.3, "height": 0.4}, "confidence": 99.0}]},
            "comparisons": [{"source": "selfie.jpg", "target": "doc.jpg", "similarity": 91.5}]
        }"#;
        let analyzer: ScriptedFaceAnalyzer = serde_json::from_str(json).unwrap();
        assert_eq!(analyzer.faces["selfie.jpg"].len(), 1);
        assert_eq!(analyzer.comparisons[0].similarity, 91.5);
    }
}
