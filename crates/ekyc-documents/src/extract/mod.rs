//! Field extraction strategies.
//!
//! Every document type maps to one [`FieldExtractor`]. Document-specific
//! strategies fall back once to the baseline when they produce nothing or
//! fail to find their anchors.

pub mod coordinates;
pub mod generic;
pub mod kh_ic;
pub mod ktp;
pub mod mykad;
pub mod prc_passport;
pub mod thai_back;
pub mod thai_front;

use ekyc_types::{DocumentType, EngineSettings, ExtractedFields};
use ekyc_vision::Capabilities;
use tracing::{debug, info, warn};

use crate::error::DocumentResult;
use crate::reference::MalaysianReference;
use crate::registry::DocumentDefinition;

/// Request-scoped handles an extractor works with.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub capabilities: &'a Capabilities,
    pub settings: &'a EngineSettings,
    pub reference: &'a MalaysianReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldExtractor {
    Baseline,
    IndonesianKtp,
    MalaysianMyKad,
    CambodianIc,
    ChinesePassport,
    ThaiIdFront,
    ThaiIdBack,
}

impl FieldExtractor {
    pub fn for_document_type(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::IdKtp => FieldExtractor::IndonesianKtp,
            DocumentType::MyNric => FieldExtractor::MalaysianMyKad,
            DocumentType::KhIc => FieldExtractor::CambodianIc,
            DocumentType::PrcPassport => FieldExtractor::ChinesePassport,
            DocumentType::ThaiIdFront => FieldExtractor::ThaiIdFront,
            DocumentType::ThaiIdBack => FieldExtractor::ThaiIdBack,
            DocumentType::AuPassport | DocumentType::SgPassport | DocumentType::Generic => {
                FieldExtractor::Baseline
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldExtractor::Baseline => "baseline",
            FieldExtractor::IndonesianKtp => "indonesian-ktp",
            FieldExtractor::MalaysianMyKad => "malaysian-mykad",
            FieldExtractor::CambodianIc => "cambodian-ic",
            FieldExtractor::ChinesePassport => "prc-passport",
            FieldExtractor::ThaiIdFront => "thai-id-front",
            FieldExtractor::ThaiIdBack => "thai-id-back",
        }
    }

    pub async fn extract(
        self,
        ctx: ExtractionContext<'_>,
        definition: &DocumentDefinition,
        image_key: &str,
    ) -> DocumentResult<ExtractedFields> {
        let attempt = match self {
            FieldExtractor::Baseline => return baseline(ctx, definition, image_key).await,
            FieldExtractor::ChinesePassport => {
                let fields = baseline(ctx, definition, image_key).await?;
                if !fields.is_empty() {
                    return Ok(self.post_process(fields));
                }
                debug!("baseline found nothing on PRC passport; using label lookup");
                prc_passport::extract(ctx, image_key).await
            }
            FieldExtractor::IndonesianKtp => ktp::extract(ctx, image_key).await,
            FieldExtractor::MalaysianMyKad => mykad::extract(ctx, image_key).await,
            FieldExtractor::CambodianIc => kh_ic::extract(ctx, image_key).await,
            FieldExtractor::ThaiIdFront => thai_front::extract(ctx, image_key).await,
            FieldExtractor::ThaiIdBack => thai_back::extract(ctx, image_key).await,
        };

        let fields = match attempt {
            Ok(fields) if !fields.is_empty() => fields,
            Ok(_) => {
                info!(extractor = self.name(), "no fields extracted; falling back to baseline");
                baseline(ctx, definition, image_key).await?
            }
            Err(err) if err.allows_fallback() => {
                warn!(
                    extractor = self.name(),
                    error = %err,
                    "extraction failed; falling back to baseline"
                );
                baseline(ctx, definition, image_key).await?
            }
            Err(err) => return Err(err),
        };
        Ok(self.post_process(fields))
    }

    /// Clean-up applied to every value the strategy returns.
    pub fn post_process(&self, mut fields: ExtractedFields) -> ExtractedFields {
        if *self == FieldExtractor::ChinesePassport {
            fields.map_values(prc_passport::clean_value);
        }
        fields
    }
}

/// Coordinate extraction when enabled and configured, identity-document
/// analysis otherwise or when coordinates produce nothing.
pub async fn baseline(
    ctx: ExtractionContext<'_>,
    definition: &DocumentDefinition,
    image_key: &str,
) -> DocumentResult<ExtractedFields> {
    if ctx.settings.use_field_coordinates && definition.has_coordinate_fields() {
        let fields = coordinates::extract(ctx, definition, image_key).await?;
        if !fields.is_empty() {
            return Ok(fields);
        }
        debug!(
            document_type = %definition.document_type,
            "no field matched its expected position; using identity analysis"
        );
    }
    generic::extract(ctx, image_key).await
}
