//! Identity-document analysis without any document-specific knowledge.

use ekyc_types::{ExtractedFields, IdentityField};
use ekyc_vision::ImageRef;
use tracing::debug;

use super::ExtractionContext;
use crate::error::DocumentResult;

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let fields = ctx
        .capabilities
        .text
        .analyze_identity_document(&ImageRef::stored(image_key))
        .await?;
    debug!(fields = fields.len(), "identity analysis returned fields");
    Ok(select_identity_fields(fields, ctx.settings.min_confidence))
}

/// Keeps the most confident value per field type, ignoring entries below
/// `min_confidence` or without text.
pub fn select_identity_fields(mut fields: Vec<IdentityField>, min_confidence: f32) -> ExtractedFields {
    fields.retain(|field| field.confidence >= min_confidence && !field.value.trim().is_empty());
    fields.sort_by(|a, b| {
        a.field_type
            .cmp(&b.field_type)
            .then(b.confidence.total_cmp(&a.confidence))
    });
    fields.dedup_by(|later, earlier| later.field_type == earlier.field_type);
    fields
        .into_iter()
        .map(|field| (field.field_type, field.value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(field_type: &str, value: &str, confidence: f32) -> IdentityField {
        IdentityField {
            field_type: field_type.into(),
            value: value.into(),
            confidence,
        }
    }

    #[test]
    fn most_confident_value_wins_per_type() {
        let values = select_identity_fields(
            vec![
                field("FIRST_NAME", "JOHN", 80.0),
                field("LAST_NAME", "SMITH", 99.0),
                field("FIRST_NAME", "JOHAN", 95.0),
            ],
            70.0,
        );
        assert_eq!(values.get("FIRST_NAME"), Some("JOHAN"));
        assert_eq!(values.get("LAST_NAME"), Some("SMITH"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn low_confidence_and_blank_entries_are_dropped() {
        let values = select_identity_fields(
            vec![
                field("FIRST_NAME", "JOHN", 40.0),
                field("MIDDLE_NAME", "  ", 99.0),
                field("EXPIRATION_DATE", "01 JAN 2030", 70.0),
            ],
            70.0,
        );
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("EXPIRATION_DATE"), Some("01 JAN 2030"));
    }
}
