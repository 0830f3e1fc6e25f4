//! Capture and recognition authorization.
//!
//! The platform decides; this crate only asks and remembers the answer.

use std::sync::Mutex;

use crate::error::PermissionKind;

/// Trait for asking the platform for the authorizations recording needs.
#[async_trait::async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Ask for speech recognition authorization. True when granted.
    async fn request_recognition(&self) -> bool;

    /// Ask for microphone access. True when granted.
    async fn request_capture(&self) -> bool;
}

/// Provider with fixed answers that records the order of requests.
#[derive(Debug)]
pub struct StaticPermissions {
    recognition: bool,
    capture: bool,
    requests: Mutex<Vec<PermissionKind>>,
}

impl StaticPermissions {
    pub fn new(recognition: bool, capture: bool) -> Self {
        Self {
            recognition,
            capture,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Grants everything.
    pub fn granted() -> Self {
        Self::new(true, true)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<PermissionKind> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, kind: PermissionKind) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(kind);
        }
    }
}

#[async_trait::async_trait]
impl PermissionProvider for StaticPermissions {
    async fn request_recognition(&self) -> bool {
        self.record(PermissionKind::Recognition);
        self.recognition
    }

    async fn request_capture(&self) -> bool {
        self.record(PermissionKind::Capture);
        self.capture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_permissions_answers() {
        let permissions = StaticPermissions::new(true, false);
        assert!(permissions.request_recognition().await);
        assert!(!permissions.request_capture().await);
        assert_eq!(
            permissions.requests(),
            vec![PermissionKind::Recognition, PermissionKind::Capture]
        );
    }

    #[tokio::test]
    async fn test_granted_usable_as_trait_object() {
        let provider: Box<dyn PermissionProvider> = Box::new(StaticPermissions::granted());
        assert!(provider.request_capture().await);
        assert!(provider.request_recognition().await);
    }
}
