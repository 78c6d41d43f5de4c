use serde::Serialize;
use std::fmt;

/// Lifecycle of the live subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    #[default]
    Idle,
    Starting,
    Listening,
    /// Waiting for the backoff timer before reconnecting.
    Retrying,
    /// Gave up. Only an explicit start or refresh resumes.
    Failed,
}

impl ListenerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerState::Idle => "idle",
            ListenerState::Starting => "starting",
            ListenerState::Listening => "listening",
            ListenerState::Retrying => "retrying",
            ListenerState::Failed => "failed",
        }
    }

    /// States in which `start()` is a no-op.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ListenerState::Starting | ListenerState::Listening | ListenerState::Retrying
        )
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(!ListenerState::Idle.is_active());
        assert!(ListenerState::Starting.is_active());
        assert!(ListenerState::Listening.is_active());
        assert!(ListenerState::Retrying.is_active());
        assert!(!ListenerState::Failed.is_active());
    }

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_string(&ListenerState::Retrying).unwrap(),
            "\"retrying\""
        );
        assert_eq!(ListenerState::default().to_string(), "idle");
    }
}
