//! Malaysian identity card (MyKad).
//!
//! The card carries no field labels. Positions are worked out relative to
//! the `KAD PENGENALAN` title, the NRIC line beneath it and the state name
//! that closes the address block.

use std::ptr;

use ekyc_types::{ExtractedFields, TextLine};
use ekyc_vision::{ImageRef, imaging};
use regex::Regex;
use tracing::{debug, warn};

use super::ExtractionContext;
use crate::error::{DocumentError, DocumentResult};
use crate::lines::{TextLineIndex, anchored, first_matching_regex};
use crate::reference::MalaysianReference;

const TITLE_VARIANTS: [&str; 4] = [
    "kad pengenalan",
    "kad pengenawan",
    "kad pengenalan mykad",
    "mykad kad pengenalan",
];

const NRIC_PATTERN: &str = r"\d{6}-\d{2}-?(?:\d{4})?|\d{9}";
const POSTCODE_PATTERN: &str = r"(\d{4,5})\s(.+)";

const ANCHOR_SPAN_TOLERANCE: f32 = 0.05;
const NRIC_MAX_DISTANCE: f32 = 0.3;
const NAME_COLUMN_TOLERANCE: f32 = 0.03;
const NAME_MIN_DISTANCE: f32 = 0.3;
const NAME_LINE_GAP: f32 = 0.05;
const NAME_MAX_LINES: usize = 2;
const SAME_ROW_TOLERANCE: f32 = 0.01;

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let source_bytes = ctx.capabilities.store.get_image(image_key).await?;
    let prepared = imaging::prepare_for_text_detection(&imaging::decode(&source_bytes)?);
    let bytes = imaging::encode_png(&prepared)?;
    let staged = imaging::staging_key(&ctx.settings.staging_prefix, "preprocessed", &bytes, "png");
    ctx.capabilities.store.put_image(&staged, bytes).await?;

    let detected = ctx
        .capabilities
        .text
        .detect_key_value_forms(&ImageRef::stored(staged.as_str()))
        .await;
    if let Err(err) = ctx.capabilities.store.delete(&staged).await {
        warn!(key = %staged, error = %err, "failed to remove preprocessed image");
    }

    let index = TextLineIndex::new(detected?, ctx.settings.min_confidence);
    debug!(lines = index.len(), "detected MyKad lines");
    extract_from_lines(&index, ctx.reference)
}

pub fn extract_from_lines(
    index: &TextLineIndex,
    reference: &MalaysianReference,
) -> DocumentResult<ExtractedFields> {
    let lines = index.lines_ordered_top_left();
    let mut values = ExtractedFields::new();

    let anchor = lines
        .iter()
        .find(|line| {
            let text = line.text.trim();
            line.bounding_box.left < 0.5
                && TITLE_VARIANTS
                    .iter()
                    .any(|variant| text.eq_ignore_ascii_case(variant))
        })
        .ok_or_else(|| DocumentError::extraction("Unable to find myKad landmark - Kad Pengenalan"))?;

    let state = lines
        .iter()
        .find(|line| reference.is_state(&line.text))
        .ok_or_else(|| DocumentError::extraction("Unable to find the state on the MyKad."))?;

    let nric_pattern = anchored(NRIC_PATTERN)?;
    let nric = first_matching_regex(
        lines.iter().filter(|line| below_anchor(anchor, line)),
        &nric_pattern,
    )
    .ok_or_else(|| DocumentError::extraction("Unable to find the NRIC on the MyKad."))?;
    values.insert("NRIC", &nric.text);

    let height_multiplier = state.bounding_box.bottom() - nric.bounding_box.top;
    let name_and_address: Vec<&TextLine> = lines
        .iter()
        .filter(|line| {
            (line.bounding_box.left - nric.bounding_box.left).abs() < NAME_COLUMN_TOLERANCE
                && line.bounding_box.top - anchor.bounding_box.top > NAME_MIN_DISTANCE
        })
        .collect();

    let name_gap = NAME_LINE_GAP * height_multiplier;
    let mut name_parts = Vec::new();
    let mut name_end = None;
    for line in &name_and_address {
        name_parts.push(line.text.trim());
        name_end = Some(line.bounding_box.top);
        let bottom = line.bounding_box.bottom();
        let continues = name_and_address.iter().any(|other| {
            !ptr::eq(*other, *line) && (other.bounding_box.top - bottom).abs() < name_gap
        });
        if !continues || name_parts.len() >= NAME_MAX_LINES {
            break;
        }
    }
    values.insert("Name", name_parts.join(" "));

    if let Some(name_end) = name_end {
        read_address(&name_and_address, name_end, state, reference, &mut values)?;
    }

    read_gender_and_religion(lines, &mut values);
    Ok(values)
}

/// The NRIC sits under the title, inside its horizontal span.
fn below_anchor(anchor: &TextLine, line: &TextLine) -> bool {
    let offset = line.bounding_box.top - anchor.bounding_box.top;
    (0.0..=NRIC_MAX_DISTANCE).contains(&offset)
        && line.bounding_box.left >= anchor.bounding_box.left - ANCHOR_SPAN_TOLERANCE
        && line.bounding_box.right() <= anchor.bounding_box.right() + ANCHOR_SPAN_TOLERANCE
}

fn read_address(
    column: &[&TextLine],
    name_end: f32,
    state: &TextLine,
    reference: &MalaysianReference,
    values: &mut ExtractedFields,
) -> DocumentResult<()> {
    let postcode_pattern = anchored(POSTCODE_PATTERN)?;
    let address = column.iter().filter(|line| {
        !line.text.trim().is_empty()
            && line.bounding_box.top > name_end
            && line.bounding_box.top <= state.bounding_box.top
    });
    for (position, line) in address.enumerate() {
        let text = line.text.trim();
        let Some((code, area)) = postcode(&postcode_pattern, text) else {
            values.insert(format!("AddressLine_{}", position + 1), text);
            continue;
        };
        values.insert("AddressPostCode", code);
        match reference.postcode(code) {
            Some(entry) => {
                values.insert("AddressCity", &entry.city);
                values.insert("AddressState", &entry.state);
            }
            None => values.insert("AddressCity", area),
        }
    }
    Ok(())
}

/// Postcode and the area printed after it.
fn postcode<'a>(pattern: &Regex, text: &'a str) -> Option<(&'a str, &'a str)> {
    let captures = pattern.captures(text)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Gender is printed last on its line, optionally after the religion.
fn read_gender_and_religion(lines: &[TextLine], values: &mut ExtractedFields) {
    let Some(gender_line) = lines.iter().find(|line| {
        let text = line.text.trim().to_lowercase();
        text.ends_with("lelaki") || text.ends_with("perempuan")
    }) else {
        return;
    };

    let text = gender_line.text.trim();
    let gender = if text.to_lowercase().ends_with("lelaki") {
        "M"
    } else {
        "F"
    };
    values.insert("Gender", gender);

    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() > 1 {
        values.insert("Religion", tokens[..tokens.len() - 1].join(" "));
        return;
    }
    let religion = lines.iter().find(|line| {
        !ptr::eq(*line, gender_line)
            && line.bounding_box.left > 0.5
            && (line.bounding_box.top - gender_line.bounding_box.top).abs() < SAME_ROW_TOLERANCE
            && !line.text.trim().is_empty()
    });
    if let Some(religion) = religion {
        values.insert("Religion", &religion.text);
    }
}
