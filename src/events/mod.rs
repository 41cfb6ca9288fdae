//! Events module for session state changes
//!
//! Every value the presentation layer renders changes through one of these
//! events, broadcast to subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::lang::Language;
use crate::session::CaptureState;

/// Events emitted by the session as its observable state changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Input text was replaced (typing, transcription, swap, clear)
    SourceTextChanged { text: String },

    /// Displayed translation changed
    ResultChanged { text: String },

    /// Busy indicator for explicit requests toggled
    BusyChanged { busy: bool },

    /// An error was put on the error channel
    ErrorRaised {
        id: u64,
        kind: ErrorKind,
        message: String,
    },

    /// The error with this id is no longer shown
    ErrorDismissed { id: u64 },

    /// Capture state machine moved to a new state
    CaptureStateChanged {
        state: CaptureState,
        /// How long the previous state lasted, in milliseconds
        duration_ms: u64,
    },

    /// Selected languages changed
    LanguagesChanged { source: Language, target: Language },

    /// History cache was mutated
    HistoryChanged { len: usize },

    /// Display mode preference changed
    DisplayModeChanged { dark: bool },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::SourceTextChanged { text } => {
                write!(f, "SOURCE_TEXT_CHANGED ({} chars)", text.chars().count())
            }
            SessionEvent::ResultChanged { text } => {
                write!(f, "RESULT_CHANGED ({} chars)", text.chars().count())
            }
            SessionEvent::BusyChanged { busy } => write!(f, "BUSY_CHANGED ({})", busy),
            SessionEvent::ErrorRaised { id, kind, .. } => {
                write!(f, "ERROR_RAISED (#{} {:?})", id, kind)
            }
            SessionEvent::ErrorDismissed { id } => write!(f, "ERROR_DISMISSED (#{})", id),
            SessionEvent::CaptureStateChanged { state, duration_ms } => {
                write!(f, "CAPTURE_{} ({}ms)", state, duration_ms)
            }
            SessionEvent::LanguagesChanged { source, target } => {
                write!(f, "LANGUAGES_CHANGED ({} -> {})", source, target)
            }
            SessionEvent::HistoryChanged { len } => write!(f, "HISTORY_CHANGED ({})", len),
            SessionEvent::DisplayModeChanged { dark } => {
                write!(f, "DISPLAY_MODE_CHANGED (dark={})", dark)
            }
        }
    }
}
