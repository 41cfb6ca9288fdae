//! Debounce gate for live translation
//!
//! At most one task is pending. Scheduling replaces it and restarts the
//! quiescence window; cancelling discards it without running it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Identifies one scheduled task
///
/// A task may already have fired when it is superseded; the owner checks
/// its ticket with [`DebounceGate::claim`] before acting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTicket(u64);

pub struct DebounceGate {
    window: Duration,
    generation: u64,
    pending: Option<(DebounceTicket, JoinHandle<()>)>,
}

impl DebounceGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: 0,
            pending: None,
        }
    }

    /// Replace any pending task with `task`, run after the window elapses
    pub fn schedule<F, Fut>(&mut self, task: F) -> DebounceTicket
    where
        F: FnOnce(DebounceTicket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let ticket = DebounceTicket(self.generation);
        let deadline = tokio::time::Instant::now() + self.window;
        let fut = task(ticket);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fut.await;
        });
        self.pending = Some((ticket, handle));
        ticket
    }

    /// Discard the pending task, if any
    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some((ticket, handle)) = self.pending.take() {
            handle.abort();
            debug!(?ticket, "debounced task cancelled");
        }
    }

    /// Accept a fired task if it is still the pending one
    pub fn claim(&mut self, ticket: DebounceTicket) -> bool {
        match self.pending {
            Some((pending, _)) if pending == ticket => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for DebounceGate {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }
}
