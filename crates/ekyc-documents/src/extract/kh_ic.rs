//! Cambodian national identity card.

use ekyc_types::ExtractedFields;
use ekyc_vision::ImageRef;
use tracing::debug;

use super::ExtractionContext;
use crate::error::{DocumentError, DocumentResult};
use crate::lines::{TextLineIndex, anchored, first_matching_regex};

const ID_PATTERN: &str = r"\d{9}";
const NAME_PATTERN: &str = r"[a-zA-Z\s]+";

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let lines = ctx
        .capabilities
        .text
        .detect_lines(&ImageRef::stored(image_key))
        .await?;
    let index = TextLineIndex::new(lines, ctx.settings.min_confidence);
    debug!(lines = index.len(), "detected Cambodian IC lines");
    extract_from_lines(&index)
}

/// The ID is the only nine-digit line; the romanised name is the first
/// latin-only line in the upper half.
pub fn extract_from_lines(index: &TextLineIndex) -> DocumentResult<ExtractedFields> {
    let id = index
        .first_matching_regex(&anchored(ID_PATTERN)?)
        .ok_or_else(|| DocumentError::extraction("Unable to find ID on card."))?;
    let name_pattern = anchored(NAME_PATTERN)?;
    let name = first_matching_regex(
        index.iter().filter(|line| line.bounding_box.top < 0.5),
        &name_pattern,
    )
    .ok_or_else(|| DocumentError::extraction("Unable to find name on card."))?;

    let mut values = ExtractedFields::new();
    values.insert("Id", &id.text);
    values.insert("Name", &name.text);
    Ok(values)
}

#[cfg(test)]
mod tests {
    use ekyc_types::{BoundingBox, TextLine};

    use super::*;

    fn line(text: &str, top: f32) -> TextLine {
        TextLine::new(text, BoundingBox::new(top, 0.3, 0.4, 0.05))
    }

    #[test]
    fn reads_id_and_romanised_name() {
        let index = TextLineIndex::new(
            vec![
                line("អត្តសញ្ញាណប័ណ្ណ", 0.05),
                line("123456789", 0.15),
                line("SOK CHEA", 0.3),
                line("ROAD 271", 0.7),
            ],
            70.0,
        );
        let values = extract_from_lines(&index).unwrap();
        assert_eq!(values.get("Id"), Some("123456789"));
        assert_eq!(values.get("Name"), Some("SOK CHEA"));
    }

    #[test]
    fn id_is_required() {
        let index = TextLineIndex::new(vec![line("SOK CHEA", 0.3)], 70.0);
        let err = extract_from_lines(&index).unwrap_err();
        assert_eq!(err.to_string(), "Unable to find ID on card.");
    }

    #[test]
    fn name_must_be_in_the_upper_half() {
        let index = TextLineIndex::new(vec![line("123456789", 0.15), line("SOK CHEA", 0.6)], 70.0);
        let err = extract_from_lines(&index).unwrap_err();
        assert_eq!(err.to_string(), "Unable to find name on card.");
    }
}
