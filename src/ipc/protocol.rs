//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::lang::Language;
use crate::service::Phrase;
use crate::session::{SessionInput, SessionSnapshot};

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to session event notifications
    Subscribe,

    /// Fetch the phrase dictionary
    GetPhrases,

    /// Input text was edited
    TextChanged { text: String },

    /// Translate button pressed
    Translate,

    SetSourceLanguage { language: Language },

    SetTargetLanguage { language: Language },

    SwapLanguages,

    ClearInput,

    StartRecording,

    StopRecording,

    RemoveHistory { index: usize },

    ClearHistory,

    SetDarkMode { enabled: bool },
}

impl Request {
    /// Session input for requests that only forward a UI event
    pub fn into_input(self) -> Option<SessionInput> {
        let input = match self {
            Request::TextChanged { text } => SessionInput::TextChanged(text),
            Request::Translate => SessionInput::Submit,
            Request::SetSourceLanguage { language } => SessionInput::SetSourceLanguage(language),
            Request::SetTargetLanguage { language } => SessionInput::SetTargetLanguage(language),
            Request::SwapLanguages => SessionInput::SwapLanguages,
            Request::ClearInput => SessionInput::ClearInput,
            Request::StartRecording => SessionInput::StartRecording,
            Request::StopRecording => SessionInput::StopRecording,
            Request::RemoveHistory { index } => SessionInput::RemoveHistory(index),
            Request::ClearHistory => SessionInput::ClearHistory,
            Request::SetDarkMode { enabled } => SessionInput::SetDarkMode(enabled),
            Request::Ping | Request::GetStatus | Request::Subscribe | Request::GetPhrases => {
                return None
            }
        };
        Some(input)
    }
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Phrase dictionary
    Phrases { phrases: Vec<Phrase> },

    /// UI event forwarded to the session
    Accepted,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Session event occurred
    Event { event: SessionEvent },
    /// Client fell behind and missed events; it should re-read the status
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Everything the UI displays
    pub session: SessionSnapshot,
}

impl DaemonStatus {
    pub fn new(session: SessionSnapshot, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            session,
        }
    }
}
