//! User-visible error channel
//!
//! Shows at most one notice at a time. Each notice carries an id so a
//! delayed auto-dismiss never hides a newer one.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SessionError};

/// An error as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub id: u64,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ErrorChannel {
    next_id: u64,
    current: Option<ErrorNotice>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `error`, replacing whatever is shown
    pub fn raise(&mut self, error: &SessionError) -> ErrorNotice {
        self.next_id += 1;
        let notice = ErrorNotice {
            id: self.next_id,
            kind: error.kind(),
            message: error.to_string(),
        };
        self.current = Some(notice.clone());
        notice
    }

    /// Hide the notice with `id`; false if something else is shown
    pub fn dismiss(&mut self, id: u64) -> bool {
        match &self.current {
            Some(notice) if notice.id == id => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    /// Hide whatever is shown, returning its id
    pub fn clear(&mut self) -> Option<u64> {
        self.current.take().map(|n| n.id)
    }

    pub fn current(&self) -> Option<&ErrorNotice> {
        self.current.as_ref()
    }
}
