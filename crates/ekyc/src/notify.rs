use async_trait::async_trait;
use ekyc_vision::{NotificationSink, VisionError, VisionResult};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

/// Writes liveness failures to the log.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify_verification_failure(
        &self,
        session_id: &str,
        message: &str,
    ) -> VisionResult<()> {
        warn!(session = session_id, reason = message, "liveness verification failed");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailurePayload<'a> {
    session_id: &'a str,
    message: &'a str,
}

/// POSTs each liveness failure as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotificationSink {
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify_verification_failure(
        &self,
        session_id: &str,
        message: &str,
    ) -> VisionResult<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&FailurePayload {
                session_id,
                message,
            })
            .send()
            .await
            .map_err(|err| VisionError::service("notification", err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::service(
                "notification",
                format!("{} answered {status}", self.url),
            ));
        }
        info!(session = session_id, url = %self.url, "sent liveness failure notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case() {
        let payload = FailurePayload {
            session_id: "s-1",
            message: "Nose not found in image.",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["message"], "Nose not found in image.");
    }

    #[tokio::test]
    async fn log_sink_never_fails() {
        LogNotificationSink
            .notify_verification_failure("s-1", "Nose not found in image.")
            .await
            .unwrap();
    }
}
