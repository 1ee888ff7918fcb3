use std::sync::Arc;

use ekyc_types::{CustomLabel, DocumentType, EngineSettings, ExtractedFields};
use ekyc_vision::Capabilities;
use tracing::{debug, info};

use crate::classifier::{Classification, CroppedDocument, DocumentClassifier};
use crate::error::{DocumentError, DocumentResult};
use crate::extract::ExtractionContext;
use crate::face;
use crate::registry::{DocumentDefinition, DocumentRegistry};

/// Entry point for everything the engine does with a document image.
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    capabilities: Capabilities,
    settings: Arc<EngineSettings>,
    registry: Arc<DocumentRegistry>,
    classifier: DocumentClassifier,
}

impl DocumentPipeline {
    pub fn new(
        capabilities: Capabilities,
        settings: Arc<EngineSettings>,
        registry: Arc<DocumentRegistry>,
    ) -> Self {
        let classifier = DocumentClassifier::new(capabilities.clone(), Arc::clone(&settings));
        Self {
            capabilities,
            settings,
            registry,
            classifier,
        }
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn classify(&self, image_key: &str) -> DocumentResult<Option<Classification>> {
        self.classifier.classify(image_key).await
    }

    pub async fn document_type(&self, image_key: &str) -> DocumentResult<Option<DocumentType>> {
        Ok(self
            .classify(image_key)
            .await?
            .map(|classification| classification.document_type))
    }

    pub async fn detect_and_crop(&self, image_key: &str) -> DocumentResult<CroppedDocument> {
        self.classifier.detect_and_crop(image_key).await
    }

    /// Reads the fields of `image_key`, classifying it first when the type is
    /// not given.
    pub async fn field_data(
        &self,
        image_key: &str,
        document_type: Option<DocumentType>,
    ) -> DocumentResult<ExtractedFields> {
        let definition = self.definition_for(image_key, document_type).await?;
        let ctx = ExtractionContext {
            capabilities: &self.capabilities,
            settings: &self.settings,
            reference: self.registry.reference(),
        };
        let extractor = definition.extractor;
        debug!(
            document_type = %definition.document_type,
            extractor = extractor.name(),
            image = image_key,
            "extracting fields"
        );
        let fields = extractor.extract(ctx, &definition, image_key).await?;
        info!(
            document_type = %definition.document_type,
            fields = fields.len(),
            "extracted document fields"
        );
        Ok(fields)
    }

    /// JPEG crop of the holder's face.
    pub async fn face(
        &self,
        image_key: &str,
        document_type: Option<DocumentType>,
    ) -> DocumentResult<Option<Vec<u8>>> {
        let definition = self.definition_for(image_key, document_type).await?;
        face::extract_largest_face(&self.capabilities, &self.settings, &definition, image_key).await
    }

    /// Stages the face crop and returns its storage key.
    pub async fn stage_face(
        &self,
        image_key: &str,
        document_type: Option<DocumentType>,
    ) -> DocumentResult<Option<String>> {
        let definition = self.definition_for(image_key, document_type).await?;
        face::stage_largest_face(&self.capabilities, &self.settings, &definition, image_key).await
    }

    pub async fn landmarks(
        &self,
        image_key: &str,
        document_type: DocumentType,
    ) -> DocumentResult<Vec<CustomLabel>> {
        let definition = self.registry.resolve(document_type)?;
        self.classifier.landmarks(image_key, &definition).await
    }

    async fn definition_for(
        &self,
        image_key: &str,
        document_type: Option<DocumentType>,
    ) -> DocumentResult<Arc<DocumentDefinition>> {
        let document_type = match document_type {
            Some(document_type) => document_type,
            None => self
                .document_type(image_key)
                .await?
                .ok_or(DocumentError::UnrecognisedDocument)?,
        };
        self.registry.resolve(document_type)
    }
}
