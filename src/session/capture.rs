//! Capture state machine
//!
//! Idle -> Recording -> Transcribing -> Idle. The microphone lease exists
//! only while Recording and is released on every exit path: too short,
//! nothing captured, or handed off for draining.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::audio::{AudioChunk, MicrophoneLease};
use crate::error::SessionError;
use crate::events::SessionEvent;

/// Observable capture state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Ready to record
    #[default]
    Idle,
    /// Microphone held, audio buffering
    Recording,
    /// Recording submitted to speech-to-text
    Transcribing,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "IDLE"),
            CaptureState::Recording => write!(f, "RECORDING"),
            CaptureState::Transcribing => write!(f, "TRANSCRIBING"),
        }
    }
}

/// Where the machine is between observable states
enum Phase {
    Idle,
    /// Device requested; `cancelled` once a stop arrived first
    Acquiring { cancelled: bool },
    Recording { lease: MicrophoneLease },
    /// Device released, output still being collected
    Draining,
    Transcribing,
}

/// Drives a capture through its states
///
/// Acquiring and draining the device are slow, so they run outside the
/// machine. The owner performs them and reports back through
/// [`CaptureMachine::acquired`] and [`CaptureMachine::drained`].
pub struct CaptureMachine {
    state: CaptureState,
    phase: Phase,
    /// Time when current non-Idle state was entered
    state_entered_at: Option<Instant>,
    min_duration: Duration,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CaptureMachine {
    pub fn new(min_duration: Duration, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            state: CaptureState::Idle,
            phase: Phase::Idle,
            state_entered_at: None,
            min_duration,
            event_tx,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Claim the device for a new capture
    ///
    /// Returns false when a capture is already under way, including one
    /// still waiting for its device. The caller acquires the device only on
    /// true.
    pub fn begin_start(&mut self) -> bool {
        if !matches!(self.phase, Phase::Idle) {
            debug!(state = %self.state, "capture already active, start ignored");
            return false;
        }
        self.phase = Phase::Acquiring { cancelled: false };
        true
    }

    /// Outcome of the acquisition started by [`CaptureMachine::begin_start`]
    ///
    /// A stop that arrived while the device was opening ends the capture
    /// here: the lease is dropped and the recording counts as too short.
    pub fn acquired(
        &mut self,
        result: Result<MicrophoneLease, SessionError>,
    ) -> Result<(), SessionError> {
        let cancelled = match self.phase {
            Phase::Acquiring { cancelled } => cancelled,
            _ => {
                debug!("unexpected microphone acquisition dropped");
                return Ok(());
            }
        };
        self.phase = Phase::Idle;

        let lease = result?;
        if cancelled {
            drop(lease);
            debug!("recording stopped before the microphone opened");
            return Err(SessionError::RecordingTooShort);
        }

        self.phase = Phase::Recording { lease };
        self.transition_to(CaptureState::Recording);
        Ok(())
    }

    /// Stop recording
    ///
    /// Returns the lease to drain when the recording is long enough; the
    /// caller releases it and hands the chunks to
    /// [`CaptureMachine::drained`]. A too-short recording releases the device
    /// here. `Ok(None)` means nothing was recording.
    pub fn begin_stop(&mut self) -> Result<Option<MicrophoneLease>, SessionError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Recording { lease } => {
                let elapsed = self
                    .state_entered_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                if elapsed < self.min_duration {
                    drop(lease);
                    debug!(elapsed_ms = elapsed.as_millis() as u64, "recording too short");
                    self.transition_to(CaptureState::Idle);
                    return Err(SessionError::RecordingTooShort);
                }
                self.phase = Phase::Draining;
                Ok(Some(lease))
            }
            Phase::Acquiring { .. } => {
                self.phase = Phase::Acquiring { cancelled: true };
                Ok(None)
            }
            other => {
                debug!(state = %self.state, "no active recording, stop ignored");
                self.phase = other;
                Ok(None)
            }
        }
    }

    /// Assemble the chunks collected from the released device
    ///
    /// Returns the payload to transcribe; the machine is then Transcribing.
    pub fn drained(&mut self, chunks: Vec<AudioChunk>) -> Result<Option<Vec<u8>>, SessionError> {
        if !matches!(self.phase, Phase::Draining) {
            return Ok(None);
        }
        if chunks.is_empty() {
            self.phase = Phase::Idle;
            self.transition_to(CaptureState::Idle);
            return Err(SessionError::NoAudioCaptured);
        }

        let payload = chunks.concat();
        debug!(chunks = chunks.len(), bytes = payload.len(), "recording assembled");
        self.phase = Phase::Transcribing;
        self.transition_to(CaptureState::Transcribing);
        Ok(Some(payload))
    }

    /// Return to Idle once speech-to-text has answered
    pub fn finish_transcription(&mut self) -> bool {
        if !matches!(self.phase, Phase::Transcribing) {
            return false;
        }
        self.phase = Phase::Idle;
        self.transition_to(CaptureState::Idle);
        true
    }

    fn transition_to(&mut self, new_state: CaptureState) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "capture transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != CaptureState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        let _ = self.event_tx.send(SessionEvent::CaptureStateChanged {
            state: new_state,
            duration_ms,
        });
    }
}
