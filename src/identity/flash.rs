use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::session::SessionToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Success,
    Danger,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn success(msg: impl Into<String>) -> Self {
        Self { level: AlertLevel::Success, message: msg.into() }
    }
    pub fn danger(msg: impl Into<String>) -> Self {
        Self { level: AlertLevel::Danger, message: msg.into() }
    }
    pub fn info(msg: impl Into<String>) -> Self {
        Self { level: AlertLevel::Info, message: msg.into() }
    }
    pub fn warning(msg: impl Into<String>) -> Self {
        Self { level: AlertLevel::Warning, message: msg.into() }
    }
}

/// One-shot alert messages carried across a redirect boundary, keyed by
/// session token and consumed on first read. This replaces any notion of a
/// process-wide "current alert" variable: nothing here is shared between
/// sessions, and a read empties the slot.
#[derive(Clone, Default)]
pub struct FlashStore {
    inner: Arc<RwLock<HashMap<SessionToken, Vec<Alert>>>>,
}

impl FlashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, token: &str, alert: Alert) {
        self.inner.write().entry(token.to_string()).or_default().push(alert);
    }

    /// Take all pending alerts for a session. Single-read semantics.
    pub fn take(&self, token: &str) -> Vec<Alert> {
        self.inner.write().remove(token).unwrap_or_default()
    }

    /// Drop pending alerts for an ended session.
    pub fn clear(&self, token: &str) {
        self.inner.write().remove(token);
    }
}
