//! Indonesian resident identity card (KTP).
//!
//! Most rows read `Label : Value`; a few labels are split from their value
//! into separate lines, and the name, birth and address values may wrap onto
//! the following lines.

use std::ptr;

use chrono::NaiveDate;
use ekyc_types::{BirthDetails, ExtractedFields, TextLine};
use ekyc_vision::ImageRef;
use tracing::debug;

use super::ExtractionContext;
use crate::error::{DocumentError, DocumentResult};
use crate::lines::{TextLineIndex, starts_with_ignore_case};

const FIELDS_OF_INTEREST: [&str; 21] = [
    "IssuePlace",
    "IssueDate",
    "IssueProvince",
    "IssueArea",
    "NIK",
    "N.I.K",
    "Nama",
    "Gol. Darah",
    "Alamat",
    "Agama",
    "Kel/Desa",
    "RT/RW",
    "Kelurahan",
    "Kecamatan",
    "Jenis Kelamin",
    "TempatLahir",
    "TanggalLahir",
    "Pekerjaan",
    "Status Perkawinan",
    "Kewarganegaraan",
    "Berlaku Hingga",
];

const PLACE_AND_DATE_OF_BIRTH: &str = "Tempat/Tgl Lahir";

/// Headers in the order they appear down the card's left column.
const HEADER_SEQUENCE: [&str; 5] = [
    "Nama",
    PLACE_AND_DATE_OF_BIRTH,
    "Jenis kelamin",
    "Alamat",
    "RT/RW",
];

const HEADER_LEFT_THRESHOLD: f32 = 0.25;
const FIELD_LEFT_DIFF_THRESHOLD: f32 = 0.05;
const ISSUE_COLUMN_LEFT: f32 = 0.75;
const PERSPECTIVE_TOLERANCE: f32 = 0.02;
const SAME_ROW_TOLERANCE: f32 = 0.02;

const DATE_FORMATS: [&str; 5] = ["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%d %m %Y"];

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let lines = ctx
        .capabilities
        .text
        .detect_lines(&ImageRef::stored(image_key))
        .await?;
    let index = TextLineIndex::new(lines, ctx.settings.min_confidence);
    debug!(lines = index.len(), "detected KTP lines");
    extract_from_lines(&index)
}

pub fn extract_from_lines(index: &TextLineIndex) -> DocumentResult<ExtractedFields> {
    check_perspective(index)?;

    let lines = index.lines_ordered_top_left();
    let mut values = ExtractedFields::new();

    if lines.len() > 4 {
        values.insert("IssueProvince", &lines[0].text);
        values.insert("IssueArea", &lines[1].text);
    }

    let mut issue_column = lines
        .iter()
        .filter(|line| line.bounding_box.left > ISSUE_COLUMN_LEFT);
    if let Some(place) = issue_column.next() {
        values.insert("IssuePlace", &place.text);
    }
    if let Some(date) = issue_column.next() {
        values.insert("IssueDate", &date.text);
    }

    for line in lines {
        let text = line.text.trim();
        if text.contains(':') {
            read_labelled_line(index, line, text, &mut values);
            if let Some(remainder) = birth_remainder(text) {
                split_birth_details(remainder).write_into(&mut values, "TempatLahir", "TanggalLahir");
            }
        } else if let Some(field) = field_of_interest(text) {
            if let Some(value) = same_row_value(lines, line) {
                let value = if field == "Kewarganegaraan" && value == "WNF" {
                    "WNI"
                } else {
                    value
                };
                values.insert(field, value);
            }
        }
    }

    Ok(values)
}

/// The bottom line of a squarely photographed card starts in the same column
/// as the `NIK` label.
fn check_perspective(index: &TextLineIndex) -> DocumentResult<()> {
    let nik = index
        .iter()
        .find(|line| {
            let text = line.text.trim();
            text.eq_ignore_ascii_case("nik") || text.eq_ignore_ascii_case("n.i.k")
        })
        .ok_or_else(|| DocumentError::extraction("Could not find the NIK on this KTP."))?;

    let mut last = nik;
    for line in index.iter() {
        if line.bounding_box.top > last.bounding_box.top {
            last = line;
        }
    }

    if (last.bounding_box.left - nik.bounding_box.left).abs() < PERSPECTIVE_TOLERANCE {
        Ok(())
    } else {
        debug!(
            nik_left = nik.bounding_box.left,
            last_left = last.bounding_box.left,
            "KTP columns are not aligned"
        );
        Err(DocumentError::Perspective)
    }
}

fn read_labelled_line(
    index: &TextLineIndex,
    line: &TextLine,
    text: &str,
    values: &mut ExtractedFields,
) {
    let parts: Vec<&str> = text.split(':').filter(|part| !part.trim().is_empty()).collect();
    if parts.len() < 2 {
        return;
    }
    let header = parts[0].trim();
    let mut value = parts[1..].join(":").trim().to_string();

    let known = field_of_interest(header);
    if let Some(field) = known {
        values.insert(field, &value);
    }

    let position = HEADER_SEQUENCE[..HEADER_SEQUENCE.len() - 1]
        .iter()
        .position(|expected| starts_with_ignore_case(expected, header));
    if let Some(position) = position {
        let continuation: Vec<&str> = next_value_lines(index, line, HEADER_SEQUENCE[position + 1])
            .into_iter()
            .map(|line| line.text.trim())
            .collect();
        if !continuation.is_empty() {
            value.push(' ');
            value.push_str(&continuation.join(" "));
        }
        values.insert(known.unwrap_or(HEADER_SEQUENCE[position]), value);
    }
}

/// Lines wrapping the value of `current`, up to the next expected header.
fn next_value_lines<'a>(
    index: &'a TextLineIndex,
    current: &TextLine,
    next_header: &str,
) -> Vec<&'a TextLine> {
    let bottom = current.bounding_box.bottom();
    let Some(next) = index
        .lines_below(bottom, HEADER_LEFT_THRESHOLD)
        .into_iter()
        .find(|line| starts_with_ignore_case(line.text.trim(), next_header))
    else {
        return Vec::new();
    };

    index
        .iter()
        .filter(|line| {
            line.bounding_box.top > bottom
                && line.bounding_box.bottom() < next.bounding_box.top
                && (line.bounding_box.left - current.bounding_box.left).abs()
                    <= FIELD_LEFT_DIFF_THRESHOLD
                && !line.text.trim().is_empty()
        })
        .collect()
}

fn birth_remainder(text: &str) -> Option<&str> {
    if text.len() <= PLACE_AND_DATE_OF_BIRTH.len()
        || !starts_with_ignore_case(text, PLACE_AND_DATE_OF_BIRTH)
    {
        return None;
    }
    let remainder = text[PLACE_AND_DATE_OF_BIRTH.len()..]
        .trim_start()
        .trim_start_matches(':')
        .trim();
    (!remainder.is_empty()).then_some(remainder)
}

/// Splits `PLACE, DATE`; a lone value is a date when it parses as one.
pub fn split_birth_details(value: &str) -> BirthDetails {
    let parts: Vec<&str> = value.split(',').collect();
    match parts.as_slice() {
        [] => BirthDetails::default(),
        [single] => {
            let single = single.trim();
            if looks_like_date(single) {
                BirthDetails {
                    place: None,
                    date: Some(single.to_string()),
                }
            } else {
                BirthDetails {
                    place: Some(single.to_string()),
                    date: None,
                }
            }
        }
        [place @ .., date] => BirthDetails {
            place: Some(place.join(",").trim().to_string()),
            date: Some(date.trim().to_string()),
        },
    }
}

fn looks_like_date(value: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|format| NaiveDate::parse_from_str(value, format).is_ok())
}

fn field_of_interest(header: &str) -> Option<&'static str> {
    FIELDS_OF_INTEREST
        .iter()
        .copied()
        .find(|field| field.eq_ignore_ascii_case(header))
}

/// Nearest value to the right of a label printed without its colon.
fn same_row_value<'a>(lines: &'a [TextLine], label: &TextLine) -> Option<&'a str> {
    lines
        .iter()
        .filter(|line| {
            !ptr::eq(*line, label)
                && line.bounding_box.left > label.bounding_box.left
                && (line.bounding_box.top - label.bounding_box.top).abs() <= SAME_ROW_TOLERANCE
        })
        .filter(|line| {
            let text = line.text.trim();
            !text.is_empty() && text != ":"
        })
        .min_by(|a, b| a.bounding_box.left.total_cmp(&b.bounding_box.left))
        .map(|line| line.text.trim().trim_matches(':').trim())
}
