use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use ekyc_documents::{DocumentError, DocumentPipeline, DocumentRegistry};
use ekyc_liveness::{LivenessError, LivenessVerifier};
use ekyc_types::{EngineSettings, VerificationHistoryRecord};
use ekyc_vision::{NotificationSink, SessionStore};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cli::{Command, ImageArgs};
use crate::history::{HistoryError, HistoryLog};
use crate::notify::{LogNotificationSink, WebhookNotificationSink};
use crate::replay::{Replay, ReplayError};
use crate::settings::EffectiveSettings;

#[derive(Debug)]
pub enum CommandError {
    Replay(ReplayError),
    Document(DocumentError),
    Liveness(LivenessError),
    History(HistoryError),
    NoFace { image: String },
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Replay(err) => write!(f, "{err}"),
            CommandError::Document(err) => write!(f, "{err}"),
            CommandError::Liveness(err) => write!(f, "liveness verification failed: {err}"),
            CommandError::History(err) => write!(f, "failed to record history: {err}"),
            CommandError::NoFace { image } => write!(f, "no face found on {image}"),
            CommandError::Output { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Replay(err) => Some(err),
            CommandError::Document(err) => Some(err),
            CommandError::Liveness(err) => Some(err),
            CommandError::History(err) => Some(err),
            CommandError::NoFace { .. } => None,
            CommandError::Output { source, .. } => Some(source),
        }
    }
}

impl From<ReplayError> for CommandError {
    fn from(err: ReplayError) -> Self {
        CommandError::Replay(err)
    }
}

impl From<DocumentError> for CommandError {
    fn from(err: DocumentError) -> Self {
        CommandError::Document(err)
    }
}

impl From<LivenessError> for CommandError {
    fn from(err: LivenessError) -> Self {
        CommandError::Liveness(err)
    }
}

impl From<HistoryError> for CommandError {
    fn from(err: HistoryError) -> Self {
        CommandError::History(err)
    }
}

/// Runs one subcommand and returns the JSON document to print.
pub async fn run(command: &Command, settings: &EffectiveSettings) -> Result<Value, CommandError> {
    let engine = Arc::new(settings.engine.clone());
    match command {
        Command::Doctypes => {
            let registry = DocumentRegistry::load(&engine)?;
            Ok(json!(registry.summaries()))
        }
        Command::Classify { image } => {
            let pipeline = pipeline(image, engine).await?;
            let classification = pipeline.classify(&image.image).await?;
            Ok(match classification {
                Some(found) => json!({
                    "documentType": found.document_type,
                    "confidence": found.confidence,
                    "boundingBox": found.bounding_box,
                }),
                None => Value::Null,
            })
        }
        Command::Extract {
            image,
            document_type,
        } => {
            let pipeline = pipeline(image, engine).await?;
            let fields = pipeline.field_data(&image.image, *document_type).await?;
            Ok(json!(fields))
        }
        Command::Face {
            image,
            document_type,
            output,
        } => {
            let pipeline = pipeline(image, engine).await?;
            let crop = pipeline
                .face(&image.image, *document_type)
                .await?
                .ok_or_else(|| CommandError::NoFace {
                    image: image.image.clone(),
                })?;
            tokio::fs::write(output, &crop)
                .await
                .map_err(|source| CommandError::Output {
                    path: output.clone(),
                    source,
                })?;
            info!(output = %output.display(), bytes = crop.len(), "wrote face crop");
            Ok(json!({ "output": output, "bytes": crop.len() }))
        }
        Command::Verify { fixture, session } => {
            let replay = Replay::load(fixture).await?;
            verify(&replay, session, settings, engine).await
        }
    }
}

async fn pipeline(
    image: &ImageArgs,
    engine: Arc<EngineSettings>,
) -> Result<DocumentPipeline, CommandError> {
    let replay = Replay::load(&image.fixture).await?;
    let registry = DocumentRegistry::load(&engine)?;
    Ok(DocumentPipeline::new(
        replay.capabilities(),
        engine,
        Arc::new(registry),
    ))
}

async fn verify(
    replay: &Replay,
    session_id: &str,
    settings: &EffectiveSettings,
    engine: Arc<EngineSettings>,
) -> Result<Value, CommandError> {
    let notifier: Arc<dyn NotificationSink> = match settings.webhook_url.clone() {
        Some(url) => Arc::new(WebhookNotificationSink::new(url)),
        None => Arc::new(LogNotificationSink),
    };
    let verifier = LivenessVerifier::new(
        replay.faces.clone(),
        replay.sessions.clone(),
        notifier,
        engine,
    );
    let report = verifier.verify_liveness_report(session_id).await?;

    if let Some(path) = settings.history_path.as_ref() {
        let session = match replay.sessions.load_session(session_id).await {
            Ok(session) => session,
            Err(err) => {
                warn!(session = session_id, error = %err, "session lookup for history failed");
                None
            }
        };
        let record = VerificationHistoryRecord::from_outcome(
            session_id,
            session.as_ref(),
            &report.outcome,
            Utc::now().timestamp(),
        );
        HistoryLog::new(path).append(&record).await?;
    }

    Ok(json!({
        "isLive": report.outcome.is_live,
        "error": report.outcome.error_message,
        "failedStage": report.failed_stage.map(|stage| stage.as_str()),
        "lowestFaceConfidence": report.lowest_face_confidence,
    }))
}
