//! Front of the Thai national ID.
//!
//! Cards are often photographed at an angle, so the image is straightened
//! against the `Date of Birth` line before the fields are read.

use ekyc_types::{ExtractedFields, TextLine};
use regex::Regex;
use tracing::info;

use super::ExtractionContext;
use crate::alignment;
use crate::error::{DocumentError, DocumentResult};
use crate::lines::{TextLineIndex, anchored};

const DATE_OF_BIRTH: &str = "Date of Birth";
const THAI_DATE_PATTERN: &str = r"\d{2}\s[A-Z]{1}[a-z]{2}\.\s\d{4}";
const DATE_COLUMN_TOLERANCE: f32 = 0.05;
const ID_NUMBER_DIGITS: usize = 13;

const FEMALE_PREFIXES: [&str; 3] = ["ด.ญ.", "นาง", "น.ส."];
const MALE_PREFIXES: [&str; 4] = ["นาย", "ด.ช.", "พระสงฆ์", "บาทหลวง"];
const OTHER_PREFIXES: [&str; 6] = [
    "หม่อมหลวง",
    "หม่อมราชวงศ์",
    "หม่อมเจ้า",
    "ศาสตราจารย์",
    "รองศาสตราจารย์",
    "ผู้ช่วยศาสตราจารย์",
];

pub async fn extract(ctx: ExtractionContext<'_>, image_key: &str) -> DocumentResult<ExtractedFields> {
    let aligned = alignment::detect_aligned(ctx, image_key, |index| {
        index.first_starting_with(DATE_OF_BIRTH)
    })
    .await?;
    if let Some(degrees) = aligned.correction_degrees {
        info!(degrees, "read Thai ID after straightening");
    }
    extract_from_lines(&aligned.index)
}

pub fn extract_from_lines(index: &TextLineIndex) -> DocumentResult<ExtractedFields> {
    let id_label = index.find_text("Identification Number").ok_or_else(|| {
        DocumentError::extraction("Cannot find identification number text block on ID.")
    })?;
    let name_line = index
        .first_starting_with("Name")
        .ok_or_else(|| DocumentError::extraction("Cannot find name text block on ID."))?;
    index.first_starting_with("Thai National ID").ok_or_else(|| {
        DocumentError::extraction("Cannot find identification number title text block on ID.")
    })?;
    let expiry_label = index
        .find_text("Date of Expiry")
        .ok_or_else(|| DocumentError::extraction("Cannot find date of expiry text block on ID."))?;
    let issue_label = index
        .find_text("Date of Issue")
        .ok_or_else(|| DocumentError::extraction("Cannot find date of issue text block on ID."))?;

    let mut values = ExtractedFields::new();
    if let Some(number) = id_number(index, id_label) {
        values.insert("Identification Number", number);
    }
    values.insert("Name", after_prefix(name_line, "Name"));
    if let Some(last_name) = index.first_starting_with("Last name ") {
        values.insert("LastNameEN", after_prefix(last_name, "Last name"));
    }
    if let Some(birth) = index.first_starting_with(DATE_OF_BIRTH) {
        values.insert(DATE_OF_BIRTH, after_prefix(birth, DATE_OF_BIRTH));
    }

    let date_pattern = anchored(THAI_DATE_PATTERN)?;
    if let Some(expiry) = date_under(index, expiry_label, &date_pattern) {
        values.insert("Date of Expiry", &expiry.text);
    }
    if let Some(issue) = date_under(index, issue_label, &date_pattern) {
        values.insert("Date of Issue", &issue.text);
    }

    if let Some(full_name) = index
        .iter()
        .find(|line| thai_prefix(line.text.trim()).is_some())
    {
        values.insert("FullNameTH", &full_name.text);
        if let Some(gender) = thai_gender(full_name.text.trim()) {
            values.insert("Gender", gender);
        }
    }

    Ok(values)
}

fn after_prefix<'a>(line: &'a TextLine, prefix: &str) -> &'a str {
    let text = line.text.trim();
    text.get(prefix.len()..).unwrap_or_default().trim()
}

/// The 13-digit number, printed in groups, closest below or beside the label.
fn id_number(index: &TextLineIndex, label: &TextLine) -> Option<String> {
    index
        .iter()
        .filter(|line| line.bounding_box.top >= label.bounding_box.top - DATE_COLUMN_TOLERANCE)
        .map(|line| line.text.trim())
        .find(|text| {
            text.chars().all(|c| c.is_ascii_digit() || c == ' ')
                && text.chars().filter(char::is_ascii_digit).count() == ID_NUMBER_DIGITS
        })
        .map(str::to_string)
}

/// Bottom-most date printed in the label's column.
fn date_under<'a>(index: &'a TextLineIndex, label: &TextLine, pattern: &Regex) -> Option<&'a TextLine> {
    index
        .iter()
        .filter(|line| {
            (line.bounding_box.left - label.bounding_box.left).abs() < DATE_COLUMN_TOLERANCE
                && pattern.is_match(line.text.trim())
        })
        .fold(None, |lowest: Option<&TextLine>, line| match lowest {
            Some(current) if current.bounding_box.top >= line.bounding_box.top => Some(current),
            _ => Some(line),
        })
}

fn thai_prefix(text: &str) -> Option<&'static str> {
    FEMALE_PREFIXES
        .iter()
        .chain(&MALE_PREFIXES)
        .chain(&OTHER_PREFIXES)
        .copied()
        .find(|prefix| text.starts_with(prefix))
}

/// Gender implied by a Thai honorific, when it implies one.
pub fn thai_gender(name: &str) -> Option<&'static str> {
    if FEMALE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        Some("Female")
    } else if MALE_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        Some("Male")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use ekyc_types::BoundingBox;

    use super::*;

    fn line(text: &str, top: f32, left: f32) -> TextLine {
        TextLine::new(text, BoundingBox::new(top, left, 0.3, 0.04))
    }

    fn front_lines() -> Vec<TextLine> {
        vec![
            line("Thai National ID Card", 0.05, 0.3),
            line("Identification Number", 0.12, 0.05),
            line("1 1037 02071 81 1", 0.12, 0.4),
            line("ชื่อตัวและชื่อสกุล นาย สมชาย ใจดี", 0.2, 0.1),
            line("Name Mr. Somchai", 0.27, 0.25),
            line("Last name Jaidee", 0.33, 0.25),
            line("Date of Birth 12 Jan. 1985", 0.4, 0.25),
            line("01 Feb. 2020", 0.8, 0.05),
            line("Date of Issue", 0.85, 0.05),
            line("11 Jan. 2029", 0.8, 0.7),
            line("Date of Expiry", 0.85, 0.7),
        ]
    }

    #[test]
    fn reads_the_front_of_the_card() {
        let values = extract_from_lines(&TextLineIndex::new(front_lines(), 70.0)).unwrap();
        assert_eq!(values.get("Identification Number"), Some("1 1037 02071 81 1"));
        assert_eq!(values.get("Name"), Some("Mr. Somchai"));
        assert_eq!(values.get("LastNameEN"), Some("Jaidee"));
        assert_eq!(values.get("Date of Birth"), Some("12 Jan. 1985"));
        assert_eq!(values.get("Date of Issue"), Some("01 Feb. 2020"));
        assert_eq!(values.get("Date of Expiry"), Some("11 Jan. 2029"));
        assert!(values.get("FullNameTH").is_none());
    }

    #[test]
    fn thai_name_line_gives_gender() {
        let mut lines = front_lines();
        lines.push(line("นาย สมชาย ใจดี", 0.22, 0.25));
        let values = extract_from_lines(&TextLineIndex::new(lines, 70.0)).unwrap();
        assert_eq!(values.get("FullNameTH"), Some("นาย สมชาย ใจดี"));
        assert_eq!(values.get("Gender"), Some("Male"));
    }

    #[test]
    fn missing_anchor_names_the_block() {
        let lines: Vec<TextLine> = front_lines()
            .into_iter()
            .filter(|line| line.text != "Date of Expiry")
            .collect();
        let err = extract_from_lines(&TextLineIndex::new(lines, 70.0)).unwrap_err();
        assert_eq!(err.to_string(), "Cannot find date of expiry text block on ID.");
    }

    #[test]
    fn honorifics_map_to_gender() {
        assert_eq!(thai_gender("น.ส. สมหญิง"), Some("Female"));
        assert_eq!(thai_gender("นาง สมศรี"), Some("Female"));
        assert_eq!(thai_gender("ด.ช. สมปอง"), Some("Male"));
        assert_eq!(thai_gender("หม่อมหลวง สมศักดิ์"), None);
    }
}
