use serde::{Deserialize, Serialize};

/// State of a liveness verification session as persisted by the session
/// owner. Image fields hold object-storage keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    pub id: String,
    #[serde(default)]
    pub document_image_key: Option<String>,
    #[serde(default)]
    pub selfie_image_key: Option<String>,
    #[serde(default)]
    pub nose_point_image_key: Option<String>,
    #[serde(default)]
    pub eyes_closed_image_key: Option<String>,
    #[serde(default)]
    pub nose_point_area_top: Option<f32>,
    #[serde(default)]
    pub nose_point_area_left: Option<f32>,
    /// Unix timestamp (seconds) after which the session is no longer valid.
    #[serde(default)]
    pub expiry: i64,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
}

impl VerificationSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry != 0 && now >= self.expiry
    }

    /// Top-left corner of the nose-pointing target as `(left, top)`.
    pub fn nose_target(&self) -> Option<(f32, f32)> {
        Some((self.nose_point_area_left?, self.nose_point_area_top?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessOutcome {
    pub is_live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LivenessOutcome {
    pub fn live() -> Self {
        Self {
            is_live: true,
            error_message: None,
        }
    }

    pub fn not_live(message: impl Into<String>) -> Self {
        Self {
            is_live: false,
            error_message: Some(message.into()),
        }
    }
}

/// One row of the verification audit trail kept by the session owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationHistoryRecord {
    pub session_id: String,
    #[serde(default)]
    pub client: Option<String>,
    pub timestamp: i64,
    pub is_successful: bool,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VerificationHistoryRecord {
    pub fn from_outcome(
        session_id: &str,
        session: Option<&VerificationSession>,
        outcome: &LivenessOutcome,
        timestamp: i64,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            client: session.and_then(|s| s.client.clone()),
            timestamp,
            is_successful: outcome.is_live,
            document_type: session.and_then(|s| s.document_type.clone()),
            error: outcome.error_message.clone(),
        }
    }
}
