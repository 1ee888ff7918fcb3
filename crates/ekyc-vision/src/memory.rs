use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use ekyc_types::VerificationSession;

use crate::capability::{NotificationSink, ObjectStore, SessionStore};
use crate::error::{VisionError, VisionResult};

/// Object store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_image(&self, key: &str) -> VisionResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| VisionError::not_found(key))
    }

    async fn put_image(&self, key: &str, bytes: Vec<u8>) -> VisionResult<()> {
        self.insert(key, bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> VisionResult<()> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, VerificationSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: VerificationSession) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_session(&self, id: &str) -> VisionResult<Option<VerificationSession>> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }
}

/// Sink that drops every notification.
#[derive(Debug, Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify_verification_failure(&self, _: &str, _: &str) -> VisionResult<()> {
        Ok(())
    }
}

/// Sink that keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(session_id, message)` pairs in the order they were received.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify_verification_failure(
        &self,
        session_id: &str,
        message: &str,
    ) -> VisionResult<()> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session_id.to_string(), message.to_string()));
        Ok(())
    }
}
