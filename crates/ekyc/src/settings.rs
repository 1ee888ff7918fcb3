use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use ekyc_types::settings::{parse_fraction, parse_percentage};
use ekyc_types::{ClassifierSettings, EngineSettings, SettingsError};
use serde::Deserialize;
use url::Url;

use crate::cli::{CliArgs, CliSources};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    min_confidence: Option<f32>,
    variance_threshold: Option<f32>,
    use_field_coordinates: Option<bool>,
    nose_point_area_size: Option<f32>,
    face_max_drift_from_centre: Option<f32>,
    min_image_width: Option<u32>,
    min_image_height: Option<u32>,
    min_document_width: Option<f32>,
    min_document_height: Option<f32>,
    staging_prefix: Option<String>,
    definitions: Option<String>,
    classifier: Option<ClassifierFileConfig>,
    notifications: Option<NotificationsFileConfig>,
    history: Option<HistoryFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct ClassifierFileConfig {
    project_arn: Option<String>,
    version_arn: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct NotificationsFileConfig {
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct HistoryFileConfig {
    enable: Option<bool>,
    path: Option<String>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub engine: EngineSettings,
    pub webhook_url: Option<Url>,
    pub history_path: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

const DEFAULT_HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Environment(SettingsError),
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Environment(source) => {
                write!(f, "invalid environment setting: {source}")
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Environment(source) => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

/// Resolves settings from the command line, the config file, `EKYC_*`
/// environment variables and built-in defaults, in that order.
pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    resolve_settings_with(cli, sources, |name| env::var(name).ok())
}

pub fn resolve_settings_with(
    cli: &CliArgs,
    sources: &CliSources,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    let base = EngineSettings::from_lookup(lookup).map_err(ConfigError::Environment)?;
    merge(cli, sources, file, config_path, base)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    for candidate in [project_config_path(), default_config_path()]
        .into_iter()
        .flatten()
    {
        if candidate.exists() {
            let config = read_config(&candidate)?;
            return Ok((config, Some(candidate)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
    mut engine: EngineSettings,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        min_confidence: file_min_confidence,
        variance_threshold: file_variance_threshold,
        use_field_coordinates: file_use_field_coordinates,
        nose_point_area_size: file_nose_point_area_size,
        face_max_drift_from_centre: file_face_max_drift,
        min_image_width: file_min_image_width,
        min_image_height: file_min_image_height,
        min_document_width: file_min_document_width,
        min_document_height: file_min_document_height,
        staging_prefix: file_staging_prefix,
        definitions: file_definitions,
        classifier: file_classifier,
        notifications: file_notifications,
        history: file_history,
    } = file;

    let invalid = |field: &'static str, value: String| ConfigError::InvalidValue {
        path: config_path.clone(),
        field,
        value,
    };

    if sources.min_confidence_from_cli {
        engine.min_confidence = parse_percentage("min_confidence", &cli.min_confidence.to_string())
            .map_err(|_| ConfigError::InvalidValue {
                path: None,
                field: "min_confidence",
                value: cli.min_confidence.to_string(),
            })?;
    } else if let Some(value) = file_min_confidence {
        engine.min_confidence = parse_percentage("min_confidence", &value.to_string())
            .map_err(|_| invalid("min_confidence", value.to_string()))?;
    }

    if let Some(value) = file_variance_threshold {
        engine.variance_threshold = fraction(value, "variance_threshold", &invalid)?;
    }
    if let Some(value) = file_nose_point_area_size {
        engine.nose_point_area_size = fraction(value, "nose_point_area_size", &invalid)?;
    }
    if let Some(value) = file_face_max_drift {
        engine.face_max_drift_from_centre =
            fraction(value, "face_max_drift_from_centre", &invalid)?;
    }
    if let Some(value) = file_min_document_width {
        engine.min_document_width = fraction(value, "min_document_width", &invalid)?;
    }
    if let Some(value) = file_min_document_height {
        engine.min_document_height = fraction(value, "min_document_height", &invalid)?;
    }
    if let Some(value) = file_min_image_width {
        engine.min_image_width = value;
    }
    if let Some(value) = file_min_image_height {
        engine.min_image_height = value;
    }

    if sources.use_field_coordinates_from_cli {
        engine.use_field_coordinates = cli.use_field_coordinates;
    } else if let Some(value) = file_use_field_coordinates {
        engine.use_field_coordinates = value;
    }

    let staging_prefix = if sources.staging_prefix_from_cli {
        normalize_prefix(Some(cli.staging_prefix.clone()))
    } else {
        normalize_prefix(file_staging_prefix)
    };
    if let Some(prefix) = staging_prefix {
        engine.staging_prefix = prefix;
    }

    if let Some(path) = cli.definitions.clone() {
        engine.definitions_path = Some(expand_pathbuf(path));
    } else if let Some(path) = normalize_string(file_definitions)
        .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
    {
        engine.definitions_path = Some(path);
    }

    let (file_project, file_version) = match file_classifier {
        Some(section) => (
            normalize_string(section.project_arn),
            normalize_string(section.version_arn),
        ),
        None => (None, None),
    };
    if let Some(project_arn) = normalize_string(cli.classifier_project.clone()) {
        engine.classifier = Some(ClassifierSettings {
            project_arn,
            version_arn: normalize_string(cli.classifier_version.clone()),
        });
    } else if let Some(project_arn) = file_project {
        engine.classifier = Some(ClassifierSettings {
            project_arn,
            version_arn: file_version,
        });
    }

    let webhook_url = match normalize_string(cli.webhook_url.clone()) {
        Some(value) => Some(parse_webhook_url(&value, None)?),
        None => match file_notifications.and_then(|section| normalize_string(section.webhook_url)) {
            Some(value) => Some(parse_webhook_url(&value, config_path.as_ref())?),
            None => None,
        },
    };

    let history_path = if let Some(path) = cli.history.clone() {
        Some(expand_pathbuf(path))
    } else {
        let enabled = file_history
            .as_ref()
            .and_then(|section| section.enable)
            .unwrap_or_else(|| file_history.as_ref().is_some_and(|s| s.path.is_some()));
        if enabled {
            let value = file_history
                .and_then(|section| normalize_string(section.path))
                .unwrap_or_else(|| DEFAULT_HISTORY_FILE.to_string());
            resolve_path_from_config(value, config_dir.as_deref())
        } else {
            None
        }
    };

    Ok(EffectiveSettings {
        engine,
        webhook_url,
        history_path,
        config_dir,
    })
}

fn fraction(
    value: f32,
    field: &'static str,
    invalid: &impl Fn(&'static str, String) -> ConfigError,
) -> Result<f32, ConfigError> {
    parse_fraction(field, &value.to_string()).map_err(|_| invalid(field, value.to_string()))
}

fn parse_webhook_url(value: &str, path: Option<&PathBuf>) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        path: path.cloned(),
        field: "webhook_url",
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(invalid()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "ekyc", "ekyc").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join("config.toml"))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn normalize_prefix(value: Option<String>) -> Option<String> {
    normalize_string(value.map(|v| v.trim().trim_matches('/').to_string()))
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}
