//! Replays recorded capability responses so the engine can run offline.
//!
//! A fixture is a JSON file naming the images to load into the object store
//! and the responses each capability gives for them:
//!
//! ```json
//! {
//!   "images": { "uploads/card.jpg": "card.jpg" },
//!   "sessions": [{ "id": "s-1", "selfieImageKey": "uploads/selfie.jpg" }],
//!   "text": { "lines": { "uploads/card.jpg": [] } },
//!   "faces": { "faces": {}, "comparisons": [] },
//!   "labels": { "activeVersion": null, "labels": {} }
//! }
//! ```
//!
//! Image paths are resolved against the fixture's directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ekyc_types::VerificationSession;
use ekyc_vision::{
    Capabilities, MemoryObjectStore, MemorySessionStore, ScriptedFaceAnalyzer,
    ScriptedLabelClassifier, ScriptedTextDetector,
};
use serde::Deserialize;
use tokio::fs;
use tracing::debug;

#[derive(Debug)]
pub enum ReplayError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ReplayError::Parse { path, source } => {
                write!(f, "failed to parse fixture {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReplayError::Io { source, .. } => Some(source),
            ReplayError::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapabilityScript {
    pub images: BTreeMap<String, PathBuf>,
    pub sessions: Vec<VerificationSession>,
    pub text: ScriptedTextDetector,
    pub faces: ScriptedFaceAnalyzer,
    pub labels: ScriptedLabelClassifier,
}

/// Capabilities backed by a loaded fixture.
#[derive(Debug)]
pub struct Replay {
    pub store: Arc<MemoryObjectStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub text: Arc<ScriptedTextDetector>,
    pub faces: Arc<ScriptedFaceAnalyzer>,
    pub labels: Arc<ScriptedLabelClassifier>,
}

impl Replay {
    pub async fn load(path: &Path) -> Result<Self, ReplayError> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ReplayError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let script: CapabilityScript =
            serde_json::from_str(&contents).map_err(|source| ReplayError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_script(script, base).await
    }

    pub async fn from_script(script: CapabilityScript, base: &Path) -> Result<Self, ReplayError> {
        let CapabilityScript {
            images,
            sessions,
            text,
            faces,
            labels,
        } = script;

        let store = MemoryObjectStore::new();
        for (key, relative) in images {
            let path = if relative.is_absolute() {
                relative
            } else {
                base.join(relative)
            };
            let bytes = fs::read(&path)
                .await
                .map_err(|source| ReplayError::Io {
                    path: path.clone(),
                    source,
                })?;
            debug!(key = %key, path = %path.display(), bytes = bytes.len(), "loaded fixture image");
            store.insert(key, bytes);
        }

        let session_store = MemorySessionStore::new();
        for session in sessions {
            session_store.insert(session);
        }

        Ok(Self {
            store: Arc::new(store),
            sessions: Arc::new(session_store),
            text: Arc::new(text),
            faces: Arc::new(faces),
            labels: Arc::new(labels),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            store: self.store.clone(),
            text: self.text.clone(),
            faces: self.faces.clone(),
            labels: self.labels.clone(),
        }
    }
}
