//! Session core
//!
//! - Debounce gate: delays live translation until typing pauses
//! - Request coordinator: sequence-tagged dispatch, last issued wins
//! - Capture machine: Idle -> Recording -> Transcribing -> Idle
//! - Controller: the actor owning all of the above plus history

mod capture;
mod controller;
mod coordinator;
mod debounce;
mod errors;

pub use capture::CaptureState;
pub use controller::{
    Session, SessionClosed, SessionHandle, SessionInput, SessionSettings, SessionSnapshot,
};
pub use coordinator::{Mode, TranslationRequest};
