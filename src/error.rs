//! Error taxonomy shared by every session component
//!
//! Every variant ends up on the user-visible error channel. None of them is
//! fatal: the component that raised it is already back in its ready state.

use serde::{Deserialize, Serialize};

/// Errors surfaced to the user by the session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned an unexpected response: {0}")]
    Protocol(String),

    #[error("{0}")]
    Service(String),

    #[error("Microphone unavailable: {0}")]
    PermissionDenied(String),

    #[error("Recording too short. Hold the record button for at least one second.")]
    RecordingTooShort,

    #[error("No audio was captured. Check your microphone and try again.")]
    NoAudioCaptured,

    #[error("Transcription failed: {0}")]
    Transcription(String),
}

/// Serializable error category, for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Network,
    Protocol,
    Service,
    PermissionDenied,
    RecordingTooShort,
    NoAudioCaptured,
    Transcription,
}

impl ErrorKind {
    /// Stable code, same as the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Service => "service",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::RecordingTooShort => "recording_too_short",
            ErrorKind::NoAudioCaptured => "no_audio_captured",
            ErrorKind::Transcription => "transcription",
        }
    }
}

impl SessionError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Validation(_) => ErrorKind::Validation,
            SessionError::Network(_) => ErrorKind::Network,
            SessionError::Protocol(_) => ErrorKind::Protocol,
            SessionError::Service(_) => ErrorKind::Service,
            SessionError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            SessionError::RecordingTooShort => ErrorKind::RecordingTooShort,
            SessionError::NoAudioCaptured => ErrorKind::NoAudioCaptured,
            SessionError::Transcription(_) => ErrorKind::Transcription,
        }
    }

    pub(crate) fn timed_out(what: &str) -> Self {
        SessionError::Network(format!("{what} timed out"))
    }
}
