use std::fmt;
use std::sync::Arc;

use ekyc_types::geometry::point_in_square;
use ekyc_types::{EngineSettings, FaceDetail, LandmarkType, LivenessOutcome, VerificationSession};
use ekyc_vision::{
    FaceAnalyzer, FaceAttributes, ImageRef, NotificationSink, SessionStore, VisionError,
};
use tracing::{debug, info, warn};

use crate::checks;
use crate::error::{LivenessError, LivenessResult};
use crate::quadrant::ScreenQuadrant;

const DOCUMENT_MAX_FACES: usize = 3;
const EYES_CLOSED_MAX_FACES: usize = 3;
const NOSE_POINT_MAX_FACES: usize = 1;

/// The checks a verification run goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessStage {
    SessionLoaded,
    DocumentPresent,
    DocumentFaces,
    EyesClosedFaces,
    SelfieFaces,
    SelfiePose,
    NosePointFaces,
    SelfieMatchesDocument,
    EyesClosed,
    NosePointMatchesSelfie,
    NoseInTarget,
    PoseConsistency,
}

impl LivenessStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessStage::SessionLoaded => "session-loaded",
            LivenessStage::DocumentPresent => "document-present",
            LivenessStage::DocumentFaces => "document-faces",
            LivenessStage::EyesClosedFaces => "eyes-closed-faces",
            LivenessStage::SelfieFaces => "selfie-faces",
            LivenessStage::SelfiePose => "selfie-pose",
            LivenessStage::NosePointFaces => "nose-point-faces",
            LivenessStage::SelfieMatchesDocument => "selfie-matches-document",
            LivenessStage::EyesClosed => "eyes-closed",
            LivenessStage::NosePointMatchesSelfie => "nose-point-matches-selfie",
            LivenessStage::NoseInTarget => "nose-in-target",
            LivenessStage::PoseConsistency => "pose-consistency",
        }
    }
}

impl fmt::Display for LivenessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run together with what the verifier observed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessReport {
    pub outcome: LivenessOutcome,
    pub failed_stage: Option<LivenessStage>,
    /// Lowest face-detection confidence seen across every image of the run.
    pub lowest_face_confidence: Option<f32>,
}

enum Halt {
    Rejected {
        stage: LivenessStage,
        message: String,
    },
    Failed(LivenessError),
}

impl From<LivenessError> for Halt {
    fn from(err: LivenessError) -> Self {
        Halt::Failed(err)
    }
}

impl From<VisionError> for Halt {
    fn from(err: VisionError) -> Self {
        Halt::Failed(err.into())
    }
}

fn reject(stage: LivenessStage, message: impl Into<String>) -> Halt {
    Halt::Rejected {
        stage,
        message: message.into(),
    }
}

/// Blank keys count as missing images.
fn image_key(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|key| !key.is_empty())
}

fn largest(faces: &[FaceDetail]) -> Option<&FaceDetail> {
    faces.iter().max_by(|a, b| a.extent().total_cmp(&b.extent()))
}

/// Correlates the photographs of a verification session and decides whether
/// they were taken of a live person.
#[derive(Clone)]
pub struct LivenessVerifier {
    faces: Arc<dyn FaceAnalyzer>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn NotificationSink>,
    settings: Arc<EngineSettings>,
}

impl fmt::Debug for LivenessVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessVerifier")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LivenessVerifier {
    pub fn new(
        faces: Arc<dyn FaceAnalyzer>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn NotificationSink>,
        settings: Arc<EngineSettings>,
    ) -> Self {
        Self {
            faces,
            sessions,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn verify_liveness(&self, session_id: &str) -> LivenessResult<LivenessOutcome> {
        Ok(self.verify_liveness_report(session_id).await?.outcome)
    }

    /// Runs every check for `session_id`, stopping at the first one that
    /// fails. A failed run is reported to the notification sink once.
    pub async fn verify_liveness_report(&self, session_id: &str) -> LivenessResult<LivenessReport> {
        let mut run = Run {
            faces: self.faces.as_ref(),
            settings: &self.settings,
            session_id,
            lowest_face_confidence: None,
        };
        let result = run.verify(self.sessions.as_ref()).await;
        let lowest_face_confidence = run.lowest_face_confidence;

        match result {
            Ok(()) => {
                info!(
                    session = session_id,
                    lowest_face_confidence = ?lowest_face_confidence,
                    "liveness verified"
                );
                Ok(LivenessReport {
                    outcome: LivenessOutcome::live(),
                    failed_stage: None,
                    lowest_face_confidence,
                })
            }
            Err(Halt::Rejected { stage, message }) => {
                info!(
                    session = session_id,
                    %stage,
                    reason = %message,
                    lowest_face_confidence = ?lowest_face_confidence,
                    "liveness rejected"
                );
                self.notify_failure(session_id, &message).await;
                Ok(LivenessReport {
                    outcome: LivenessOutcome::not_live(message),
                    failed_stage: Some(stage),
                    lowest_face_confidence,
                })
            }
            Err(Halt::Failed(err)) => Err(err),
        }
    }

    async fn notify_failure(&self, session_id: &str, message: &str) {
        if let Err(err) = self
            .notifier
            .notify_verification_failure(session_id, message)
            .await
        {
            warn!(
                session = session_id,
                error = %err,
                "failed to deliver liveness failure notification"
            );
        }
    }
}

struct Run<'a> {
    faces: &'a dyn FaceAnalyzer,
    settings: &'a EngineSettings,
    session_id: &'a str,
    lowest_face_confidence: Option<f32>,
}

impl Run<'_> {
    async fn verify(&mut self, sessions: &dyn SessionStore) -> Result<(), Halt> {
        let id = self.session_id;
        let min_confidence = self.settings.min_confidence;

        let Some(session) = sessions.load_session(id).await? else {
            return Err(reject(
                LivenessStage::SessionLoaded,
                format!("Session with ID {id} is not found."),
            ));
        };

        let document = image_key(&session.document_image_key).ok_or_else(|| {
            reject(
                LivenessStage::DocumentPresent,
                format!("Document to verify for session {id} is empty."),
            )
        })?;
        let document_faces = self.detect(document, FaceAttributes::Default).await?;
        self.check_count(
            LivenessStage::DocumentFaces,
            &document_faces,
            DOCUMENT_MAX_FACES,
            "the document to verify",
        )?;

        let eyes_closed = image_key(&session.eyes_closed_image_key).ok_or_else(|| {
            reject(
                LivenessStage::EyesClosedFaces,
                format!("Eyes closed image for session {id} is empty."),
            )
        })?;
        let eyes_closed_faces = self.detect(eyes_closed, FaceAttributes::All).await?;
        self.check_count(
            LivenessStage::EyesClosedFaces,
            &eyes_closed_faces,
            EYES_CLOSED_MAX_FACES,
            "the eyes closed image",
        )?;

        let selfie = image_key(&session.selfie_image_key).ok_or_else(|| {
            reject(
                LivenessStage::SelfieFaces,
                format!("Selfie image for session {id} is empty."),
            )
        })?;
        let selfie_faces = self.detect(selfie, FaceAttributes::All).await?;
        let [selfie_face] = selfie_faces.as_slice() else {
            return Err(reject(
                LivenessStage::SelfieFaces,
                format!("There can only be one face on the selfie image for session {id}."),
            ));
        };

        if let Some(problems) = checks::selfie_pose_problems(&selfie_face.pose) {
            return Err(reject(LivenessStage::SelfiePose, problems));
        }

        let nose_point = image_key(&session.nose_point_image_key).ok_or_else(|| {
            reject(
                LivenessStage::NosePointFaces,
                format!("Nose verification image for session {id} is empty."),
            )
        })?;
        let nose_point_faces = self.detect(nose_point, FaceAttributes::All).await?;
        self.check_count(
            LivenessStage::NosePointFaces,
            &nose_point_faces,
            NOSE_POINT_MAX_FACES,
            "the nose point image",
        )?;

        if checks::compare_faces(self.faces, selfie, document, min_confidence)
            .await?
            .is_none()
        {
            return Err(reject(
                LivenessStage::SelfieMatchesDocument,
                format!("The face on the document does not match the selfie for session {id}."),
            ));
        }

        if checks::compare_faces(self.faces, eyes_closed, selfie, min_confidence)
            .await?
            .is_none()
        {
            return Err(reject(
                LivenessStage::EyesClosed,
                format!("Eyes closed image does not match the selfie image for session {id}."),
            ));
        }
        let closed = largest(&eyes_closed_faces)
            .is_some_and(|face| checks::eyes_closed(face, min_confidence));
        if !closed {
            return Err(reject(
                LivenessStage::EyesClosed,
                format!("Eyes are not closed for the verification image for session {id}."),
            ));
        }

        if checks::compare_faces(self.faces, nose_point, selfie, min_confidence)
            .await?
            .is_none()
        {
            return Err(reject(
                LivenessStage::NosePointMatchesSelfie,
                format!(
                    "Nose verification image does not match the selfie image for session {id}."
                ),
            ));
        }

        let nose_point_face = largest(&nose_point_faces).ok_or_else(|| {
            reject(
                LivenessStage::NosePointFaces,
                format!("No faces found on the nose point image for session {id}."),
            )
        })?;
        self.check_nose(&session, nose_point_face, selfie_face)
    }

    fn check_nose(
        &self,
        session: &VerificationSession,
        nose_point_face: &FaceDetail,
        selfie_face: &FaceDetail,
    ) -> Result<(), Halt> {
        let Some(nose) = nose_point_face.landmark(LandmarkType::Nose) else {
            return Err(reject(LivenessStage::NoseInTarget, "Nose not found in image."));
        };
        let Some((left, top)) = session.nose_target() else {
            return Err(reject(
                LivenessStage::NoseInTarget,
                format!(
                    "Nose pointing target for session {} is not set.",
                    self.session_id
                ),
            ));
        };
        let size = self.settings.nose_point_area_size;
        if !point_in_square(nose.x, nose.y, left, top, size) {
            debug!(
                nose_x = nose.x,
                nose_y = nose.y,
                left,
                top,
                size,
                "nose outside target"
            );
            return Err(reject(
                LivenessStage::NoseInTarget,
                "Nose is not within the specified bounds.",
            ));
        }

        let quadrant = ScreenQuadrant::of_target(left, top);
        debug!(
            %quadrant,
            selfie = ?selfie_face.pose,
            nose_point = ?nose_point_face.pose,
            "comparing head poses"
        );
        if !quadrant.pose_fits(&nose_point_face.pose, &selfie_face.pose) {
            return Err(reject(
                LivenessStage::PoseConsistency,
                "Please do not move your shoulders while pointing your nose. Instead, tilt your head so that your nose fits within the bounds of the box.",
            ));
        }
        Ok(())
    }

    async fn detect(
        &mut self,
        image_key: &str,
        attributes: FaceAttributes,
    ) -> Result<Vec<FaceDetail>, Halt> {
        let faces = self
            .faces
            .detect_faces(&ImageRef::stored(image_key), attributes)
            .await?;
        if let Some(lowest) = faces.iter().map(|face| face.confidence).min_by(f32::total_cmp) {
            self.lowest_face_confidence = Some(
                self.lowest_face_confidence
                    .map_or(lowest, |current| current.min(lowest)),
            );
        }
        debug!(image = image_key, faces = faces.len(), "detected faces");
        Ok(faces)
    }

    fn check_count(
        &self,
        stage: LivenessStage,
        faces: &[FaceDetail],
        max_faces: usize,
        image: &str,
    ) -> Result<(), Halt> {
        let id = self.session_id;
        match faces.len() {
            0 => Err(reject(
                stage,
                format!("No faces found on {image} for session {id}."),
            )),
            count if count > max_faces => Err(reject(
                stage,
                format!("Too many faces found on {image} for session {id}."),
            )),
            _ => Ok(()),
        }
    }
}
