//! Document type recognition with a trained custom-label model.

use std::collections::HashSet;
use std::sync::Arc;

use ekyc_types::geometry::{crop_region, edges_align};
use ekyc_types::{BoundingBox, CustomLabel, DocumentType, EngineSettings};
use ekyc_vision::{Capabilities, ImageRef, imaging};
use image::GenericImageView;
use tracing::{debug, info};

use crate::error::{DocumentError, DocumentResult};
use crate::registry::DocumentDefinition;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub document_type: DocumentType,
    /// Where the document sits in the image, when the model located it.
    pub bounding_box: Option<BoundingBox>,
    pub confidence: f32,
}

/// Document cut out of a larger photograph.
#[derive(Debug, Clone)]
pub struct CroppedDocument {
    pub document_type: DocumentType,
    pub bounding_box: BoundingBox,
    /// PNG-encoded crop.
    pub image: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DocumentClassifier {
    capabilities: Capabilities,
    settings: Arc<EngineSettings>,
}

impl DocumentClassifier {
    pub fn new(capabilities: Capabilities, settings: Arc<EngineSettings>) -> Self {
        Self {
            capabilities,
            settings,
        }
    }

    /// Configured model version, or the project's running one.
    async fn active_model(&self) -> DocumentResult<Option<String>> {
        let Some(classifier) = &self.settings.classifier else {
            return Ok(None);
        };
        if let Some(version) = &classifier.version_arn {
            return Ok(Some(version.clone()));
        }
        let version = self
            .capabilities
            .labels
            .describe_active_version(&classifier.project_arn)
            .await?;
        Ok(version.filter(|v| v.is_running()).map(|v| v.arn))
    }

    /// `None` when no model is available or no label names a known type.
    pub async fn classify(&self, image_key: &str) -> DocumentResult<Option<Classification>> {
        let Some(model) = self.active_model().await? else {
            debug!("no running classifier version; skipping classification");
            return Ok(None);
        };
        let labels = self
            .capabilities
            .labels
            .detect_custom_labels(
                &ImageRef::stored(image_key),
                &model,
                Some(self.settings.min_confidence),
            )
            .await?;

        let classification = rank_labels(labels).into_iter().find_map(|label| {
            DocumentType::from_label(&label.name).map(|document_type| Classification {
                document_type,
                bounding_box: label.bounding_box,
                confidence: label.confidence,
            })
        });
        match &classification {
            Some(found) => info!(
                document_type = %found.document_type,
                confidence = found.confidence,
                "classified document"
            ),
            None => debug!(image = image_key, "no label matched a known document type"),
        }
        Ok(classification)
    }

    /// Labels from the definition's model that sit where the definition
    /// expects its landmarks.
    pub async fn landmarks(
        &self,
        image_key: &str,
        definition: &DocumentDefinition,
    ) -> DocumentResult<Vec<CustomLabel>> {
        let model = match &definition.classifier_model_reference {
            Some(reference) => Some(reference.clone()),
            None => self.active_model().await?,
        };
        let Some(model) = model else {
            return Ok(Vec::new());
        };
        let labels = self
            .capabilities
            .labels
            .detect_custom_labels(
                &ImageRef::stored(image_key),
                &model,
                Some(self.settings.min_confidence),
            )
            .await?;
        Ok(labels
            .into_iter()
            .filter(|label| {
                matches_landmark(definition, label, self.settings.variance_threshold)
            })
            .collect())
    }

    /// Classifies the image and crops the document out of it.
    pub async fn detect_and_crop(&self, image_key: &str) -> DocumentResult<CroppedDocument> {
        let classification = self
            .classify(image_key)
            .await?
            .ok_or(DocumentError::UnrecognisedDocument)?;
        let bounding_box = classification
            .bounding_box
            .unwrap_or(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let too_small = || DocumentError::DocumentTooSmall {
            width: bounding_box.width,
            height: bounding_box.height,
            min_width: self.settings.min_document_width,
            min_height: self.settings.min_document_height,
        };
        if bounding_box.width < self.settings.min_document_width
            || bounding_box.height < self.settings.min_document_height
        {
            return Err(too_small());
        }

        let bytes = self.capabilities.store.get_image(image_key).await?;
        let original = imaging::decode(&bytes)?;
        let (width, height) = original.dimensions();
        let cropped = imaging::crop(&original, crop_region(&bounding_box, width, height))
            .ok_or_else(too_small)?;
        Ok(CroppedDocument {
            document_type: classification.document_type,
            bounding_box,
            image: imaging::encode_png(&cropped)?,
        })
    }
}

/// Most confident first, larger boxes breaking ties, one label per name.
pub fn rank_labels(mut labels: Vec<CustomLabel>) -> Vec<CustomLabel> {
    let extent = |label: &CustomLabel| label.bounding_box.unwrap_or_default();
    labels.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(extent(b).height.total_cmp(&extent(a).height))
            .then(extent(b).width.total_cmp(&extent(a).width))
    });
    let mut seen = HashSet::new();
    labels.retain(|label| seen.insert(label.name.clone()));
    labels
}

fn matches_landmark(definition: &DocumentDefinition, label: &CustomLabel, threshold: f32) -> bool {
    let Some(found) = &label.bounding_box else {
        return false;
    };
    definition.landmarks.iter().any(|landmark| {
        landmark.name.eq_ignore_ascii_case(&label.name)
            && landmark
                .expected_bounding_box
                .as_ref()
                .is_some_and(|expected| edges_align(expected, found, threshold))
    })
}
