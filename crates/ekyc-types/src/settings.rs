use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::DEFAULT_VARIANCE_THRESHOLD;

pub const DEFAULT_MIN_CONFIDENCE: f32 = 70.0;
pub const DEFAULT_NOSE_POINT_AREA_SIZE: f32 = 0.05;
pub const DEFAULT_FACE_MAX_DRIFT_FROM_CENTRE: f32 = 0.05;
pub const DEFAULT_MIN_IMAGE_DIMENSION: u32 = 250;
pub const DEFAULT_MIN_DOCUMENT_FRACTION: f32 = 0.5;
pub const DEFAULT_STAGING_PREFIX: &str = "temp";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse {name}='{value}': {reason}")]
    Parse {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("{name} is out of range: {value}")]
    OutOfRange { name: &'static str, value: String },
}

/// Trained label-classifier model used to infer document types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierSettings {
    pub project_arn: String,
    pub version_arn: Option<String>,
}

/// Tunables shared by every engine component. Built once at startup and
/// passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Minimum detector confidence (0-100) for a line, face or label to count.
    pub min_confidence: f32,
    pub variance_threshold: f32,
    /// Prefer configured field coordinates over the generic analyzer.
    pub use_field_coordinates: bool,
    pub classifier: Option<ClassifierSettings>,
    /// Side length of the nose-pointing target square.
    pub nose_point_area_size: f32,
    pub face_max_drift_from_centre: f32,
    pub min_image_width: u32,
    pub min_image_height: u32,
    pub min_document_width: f32,
    pub min_document_height: f32,
    /// Object-storage prefix for intermediate images.
    pub staging_prefix: String,
    pub definitions_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            use_field_coordinates: false,
            classifier: None,
            nose_point_area_size: DEFAULT_NOSE_POINT_AREA_SIZE,
            face_max_drift_from_centre: DEFAULT_FACE_MAX_DRIFT_FROM_CENTRE,
            min_image_width: DEFAULT_MIN_IMAGE_DIMENSION,
            min_image_height: DEFAULT_MIN_IMAGE_DIMENSION,
            min_document_width: DEFAULT_MIN_DOCUMENT_FRACTION,
            min_document_height: DEFAULT_MIN_DOCUMENT_FRACTION,
            staging_prefix: DEFAULT_STAGING_PREFIX.to_string(),
            definitions_path: None,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds settings from defaults overridden by `EKYC_*` variables
    /// resolved through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = EngineSettings::default();
        if let Some(value) = lookup("EKYC_MIN_CONFIDENCE") {
            settings.min_confidence = parse_percentage("EKYC_MIN_CONFIDENCE", &value)?;
        }
        if let Some(value) = lookup("EKYC_VARIANCE_THRESHOLD") {
            settings.variance_threshold = parse_fraction("EKYC_VARIANCE_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("EKYC_USE_FIELD_COORDINATES") {
            settings.use_field_coordinates = parse_flag("EKYC_USE_FIELD_COORDINATES", &value)?;
        }
        if let Some(project_arn) = lookup("EKYC_CLASSIFIER_PROJECT_ARN") {
            let project_arn = project_arn.trim().to_string();
            if !project_arn.is_empty() {
                let version_arn = lookup("EKYC_CLASSIFIER_VERSION_ARN")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                settings.classifier = Some(ClassifierSettings {
                    project_arn,
                    version_arn,
                });
            }
        }
        if let Some(value) = lookup("EKYC_NOSE_POINT_AREA_SIZE") {
            settings.nose_point_area_size = parse_fraction("EKYC_NOSE_POINT_AREA_SIZE", &value)?;
        }
        if let Some(value) = lookup("EKYC_STAGING_PREFIX") {
            let trimmed = value.trim().trim_matches('/');
            if !trimmed.is_empty() {
                settings.staging_prefix = trimmed.to_string();
            }
        }
        if let Some(path) = lookup("EKYC_DEFINITIONS_PATH") {
            if !path.trim().is_empty() {
                settings.definitions_path = Some(PathBuf::from(path.trim()));
            }
        }
        Ok(settings)
    }
}

pub fn parse_percentage(name: &'static str, value: &str) -> Result<f32, SettingsError> {
    let parsed = parse_f32(name, value)?;
    if !(0.0..=100.0).contains(&parsed) {
        return Err(SettingsError::OutOfRange {
            name,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

pub fn parse_fraction(name: &'static str, value: &str) -> Result<f32, SettingsError> {
    let parsed = parse_f32(name, value)?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(SettingsError::OutOfRange {
            name,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_f32(name: &'static str, value: &str) -> Result<f32, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::Parse {
        name,
        value: value.to_string(),
        reason: "expected a number",
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::Parse {
            name,
            value: value.to_string(),
            reason: "expected a boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let settings = EngineSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.min_confidence, 70.0);
        assert!(settings.classifier.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = EngineSettings::from_lookup(lookup(&[
            ("EKYC_MIN_CONFIDENCE", "85"),
            ("EKYC_USE_FIELD_COORDINATES", "true"),
            ("EKYC_CLASSIFIER_PROJECT_ARN", "arn:project/doc-types"),
            ("EKYC_STAGING_PREFIX", "/scratch/"),
        ]))
        .unwrap();
        assert_eq!(settings.min_confidence, 85.0);
        assert!(settings.use_field_coordinates);
        let classifier = settings.classifier.unwrap();
        assert_eq!(classifier.project_arn, "arn:project/doc-types");
        assert_eq!(classifier.version_arn, None);
        assert_eq!(settings.staging_prefix, "scratch");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineSettings::from_lookup(lookup(&[("EKYC_MIN_CONFIDENCE", "high")]));
        assert!(matches!(err, Err(SettingsError::Parse { .. })));
        let err = EngineSettings::from_lookup(lookup(&[("EKYC_VARIANCE_THRESHOLD", "1.5")]));
        assert!(matches!(err, Err(SettingsError::OutOfRange { .. })));
    }
}
