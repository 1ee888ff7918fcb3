//! Reads fields from the positions the definition expects them at.

use ekyc_types::ExtractedFields;
use ekyc_vision::ImageRef;
use tracing::debug;

use super::ExtractionContext;
use crate::error::DocumentResult;
use crate::lines::{TextLineIndex, first_matching_regex};
use crate::registry::{DataField, DocumentDefinition};

pub async fn extract(
    ctx: ExtractionContext<'_>,
    definition: &DocumentDefinition,
    image_key: &str,
) -> DocumentResult<ExtractedFields> {
    let lines = ctx
        .capabilities
        .text
        .detect_lines(&ImageRef::stored(image_key))
        .await?;
    let index = TextLineIndex::new(lines, ctx.settings.min_confidence);
    debug!(lines = index.len(), "detected lines for coordinate extraction");
    Ok(extract_from_lines(
        &index,
        &definition.data_fields,
        ctx.settings.variance_threshold,
    ))
}

/// Lines aligning with a field's expected box are joined in reading order,
/// or, when the field has a pattern, the first matching line wins.
pub fn extract_from_lines(
    index: &TextLineIndex,
    fields: &[DataField],
    threshold: f32,
) -> ExtractedFields {
    let mut values = ExtractedFields::new();
    for field in fields.iter().filter(|field| !field.is_thai_script()) {
        let Some(expected) = &field.expected_bounding_box else {
            continue;
        };
        let candidates = index.lines_near(expected, threshold);
        match &field.pattern {
            Some(pattern) => {
                if let Some(line) = first_matching_regex(candidates, pattern) {
                    values.insert(field.name.as_str(), &line.text);
                }
            }
            None => {
                let joined = candidates
                    .iter()
                    .map(|line| line.text.trim())
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                values.insert(field.name.as_str(), joined);
            }
        }
    }
    values
}
