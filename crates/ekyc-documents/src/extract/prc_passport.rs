//! Chinese (PRC) passport, read by finding each printed field name and
//! taking the value printed beneath it.

use ekyc_types::{ExtractedFields, TextLine};
use ekyc_vision::ImageRef;
use tracing::debug;

use super::ExtractionContext;
use crate::error::DocumentResult;
use crate::lines::TextLineIndex;

/// Printed field names and the keys their values are stored under.
const LABELS: [(&str, &str); 7] = [
    ("Passport No.", "PassportNo"),
    ("Name", "Name"),
    ("Place of issue", "PlaceOfIssue"),
    ("Place of birth", "PlaceOfBirth"),
    ("Date of birth", "DateOfBirth"),
    ("Nationality", "Nationality"),
    ("Sex", "Sex"),
];

const MAX_LEFT_DRIFT: f32 = 0.15;

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let lines = ctx
        .capabilities
        .text
        .detect_key_value_forms(&ImageRef::stored(image_key))
        .await?;
    let index = TextLineIndex::new(lines, ctx.settings.min_confidence);
    debug!(lines = index.len(), "detected PRC passport lines");
    Ok(extract_from_lines(&index))
}

pub fn extract_from_lines(index: &TextLineIndex) -> ExtractedFields {
    let mut values = ExtractedFields::new();
    for (label, field) in LABELS {
        let Some(label_line) = index.iter().find(|line| is_label(line, label)) else {
            debug!(label, "PRC passport label not found");
            continue;
        };
        let value = index.iter().find(|line| {
            line.bounding_box.top > label_line.bounding_box.bottom()
                && line.bounding_box.left > label_line.bounding_box.left - MAX_LEFT_DRIFT
                && !clean_value(&line.text).is_empty()
        });
        if let Some(value) = value {
            values.insert(field, clean_value(&value.text));
        }
    }
    values
}

/// Labels are bilingual (`姓名/Name`); the English part follows the last `/`.
fn is_label(line: &TextLine, label: &str) -> bool {
    line.text
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|english| english.trim().eq_ignore_ascii_case(label))
}

/// Drops a `/` separator left at either end of a value.
pub fn clean_value(value: &str) -> String {
    let mut value = value.trim();
    if value.len() > 1 {
        value = value.strip_prefix('/').unwrap_or(value).trim_start();
    }
    if value.len() > 1 {
        value = value.strip_suffix('/').unwrap_or(value).trim_end();
    }
    value.to_string()
}
