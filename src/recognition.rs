use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle of the one continuous recognition session.
/// Only a single session may be `Listening` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionSessionState {
    Stopped,
    Starting,
    Listening,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    Unsupported,
}

/// One interim or final recognition hypothesis.
/// Ephemeral, each new event supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorCode {
    /// Microphone access revoked by the user or platform
    NotAllowed,
    /// Recognition service rejected the session
    ServiceNotAllowed,
    NoSpeech,
    AudioCapture,
    Network,
    Aborted,
}

impl RecognitionErrorCode {
    /// Errors that mean access was revoked and the session must not restart
    /// until permission is requested again
    pub fn revokes_permission(self) -> bool {
        matches!(self, Self::NotAllowed | Self::ServiceNotAllowed)
    }
}

/// Notifications pushed by the host recognition backend.
/// Consumed as discrete ordered messages by the session manager loop.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    Started,
    Result(TranscriptEvent),
    Error(RecognitionErrorCode),
    Ended,
}

/// Host speech recognition backend. Continuous, interim results enabled.
/// Events arrive on the channel handed to the session manager, not through
/// return values here.
#[async_trait]
pub trait RecognitionCapability: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Host microphone permission query
#[async_trait]
pub trait PermissionCapability: Send + Sync {
    async fn query(&self) -> PermissionState;
    async fn request(&self) -> PermissionState;
}
