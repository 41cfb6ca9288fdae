//! Request coordinator
//!
//! Tags every dispatched translation with a sequence number and applies an
//! outcome only if no newer outcome has been applied already. Arrival order
//! of outcomes does not matter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::history::{HistoryCache, HistoryEntry};
use crate::lang::Language;

/// How a translation was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Button or language change: clears the result and shows busy
    Explicit,
    /// Debounced typing: keeps the previous result visible
    Live,
}

/// One dispatched translation
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub sequence: u64,
    pub text: String,
    pub source: Language,
    pub target: Language,
    pub mode: Mode,
    pub issued_at: Instant,
}

impl TranslationRequest {
    pub fn new(
        sequence: u64,
        text: impl Into<String>,
        source: Language,
        target: Language,
        mode: Mode,
    ) -> Self {
        Self {
            sequence,
            text: text.into(),
            source,
            target,
            mode,
            issued_at: Instant::now(),
        }
    }
}

/// Result of a dispatched translation, tagged with its sequence
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub sequence: u64,
    pub result: Result<String, SessionError>,
}

/// Translation output as displayed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPane {
    pub text: String,
    pub busy: bool,
}

/// What happened to an outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Written to the pane and recorded in history
    Applied(HistoryEntry),
    /// Superseded by a newer result; dropped
    Stale,
    /// The request failed; the pane is untouched
    Failed(SessionError),
}

#[derive(Debug, Default)]
pub struct RequestCoordinator {
    /// Last sequence handed out; 0 before the first dispatch
    last_issued: u64,
    /// Sequence of the newest applied success
    last_applied: u64,
    /// Everything up to here was invalidated by clearing the input
    superseded_through: u64,
    in_flight: HashMap<u64, TranslationRequest>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and allocate a request
    ///
    /// Returns `Ok(None)` when live mode is asked to translate blank text;
    /// the pane is cleared instead.
    pub fn begin(
        &mut self,
        pane: &mut ResultPane,
        text: &str,
        source: Language,
        target: Language,
        mode: Mode,
    ) -> Result<Option<TranslationRequest>, SessionError> {
        if text.trim().is_empty() {
            return match mode {
                Mode::Explicit => Err(SessionError::Validation(
                    "Please enter text to translate.".into(),
                )),
                Mode::Live => {
                    self.supersede(pane);
                    Ok(None)
                }
            };
        }
        if source == target {
            return Err(SessionError::Validation(
                "Source and target languages cannot be the same.".into(),
            ));
        }

        self.last_issued += 1;
        let request = TranslationRequest::new(self.last_issued, text, source, target, mode);
        if mode == Mode::Explicit {
            pane.text.clear();
        }
        self.in_flight.insert(request.sequence, request.clone());
        pane.busy = self.explicit_in_flight();

        info!(
            sequence = request.sequence,
            ?mode,
            %source,
            %target,
            "translation dispatched"
        );
        Ok(Some(request))
    }

    /// Clear the pane and invalidate every request issued so far
    pub fn supersede(&mut self, pane: &mut ResultPane) {
        self.superseded_through = self.last_issued;
        pane.text.clear();
    }

    /// Apply an outcome unless a newer one already won
    pub fn resolve(
        &mut self,
        pane: &mut ResultPane,
        history: &mut HistoryCache,
        outcome: TranslationOutcome,
    ) -> Resolution {
        let request = self.in_flight.remove(&outcome.sequence);
        pane.busy = self.explicit_in_flight();

        let Some(request) = request else {
            debug!(sequence = outcome.sequence, "outcome for unknown request dropped");
            return Resolution::Stale;
        };
        let latency_ms = request.issued_at.elapsed().as_millis() as u64;

        if outcome.sequence < self.last_applied || outcome.sequence <= self.superseded_through {
            debug!(
                sequence = outcome.sequence,
                last_applied = self.last_applied,
                latency_ms,
                "stale outcome discarded"
            );
            return Resolution::Stale;
        }

        match outcome.result {
            Ok(translation) => {
                pane.text = translation.clone();
                self.last_applied = outcome.sequence;
                let entry = HistoryEntry::new(request.text, translation, request.source, request.target);
                history.append(entry.clone());
                info!(sequence = outcome.sequence, latency_ms, "translation applied");
                Resolution::Applied(entry)
            }
            Err(e) => {
                info!(sequence = outcome.sequence, latency_ms, kind = ?e.kind(), "translation failed");
                Resolution::Failed(e)
            }
        }
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    fn explicit_in_flight(&self) -> bool {
        self.in_flight.values().any(|r| r.mode == Mode::Explicit)
    }
}
