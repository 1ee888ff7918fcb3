//! Back of the Thai national ID. Nothing on it is labelled, so every line
//! is returned as a numbered field.

use ekyc_types::ExtractedFields;
use ekyc_vision::ImageRef;

use super::ExtractionContext;
use crate::error::DocumentResult;
use crate::lines::TextLineIndex;

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let lines = ctx
        .capabilities
        .text
        .detect_lines(&ImageRef::stored(image_key))
        .await?;
    Ok(extract_from_lines(&TextLineIndex::new(
        lines,
        ctx.settings.min_confidence,
    )))
}

/// `Field 1`, `Field 2`, ... in reading order.
pub fn extract_from_lines(index: &TextLineIndex) -> ExtractedFields {
    index
        .iter()
        .filter(|line| !line.text.trim().is_empty())
        .enumerate()
        .map(|(position, line)| (format!("Field {}", position + 1), line.text.as_str()))
        .collect()
}
