//! Microphone capability
//!
//! The device is held through a [`MicrophoneLease`]; the lease owns whatever
//! keeps the device open, so dropping it releases the device on every path.

mod recorder;

pub use recorder::RecorderMicrophone;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SessionError;

/// One block of encoded audio as produced by the device
pub type AudioChunk = Vec<u8>;

/// Platform capability that hands out exclusive microphone leases
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Open the device and start capturing
    ///
    /// Fails with [`SessionError::PermissionDenied`] when the device cannot
    /// be opened.
    async fn acquire(&self) -> Result<MicrophoneLease, SessionError>;
}

/// Whatever keeps a microphone open
///
/// Dropping the device must stop capture at once. [`CaptureDevice::stop`]
/// is the graceful path: capture ends, but output already produced may
/// still arrive until the chunk channel closes.
pub trait CaptureDevice: Send {
    fn stop(&mut self);
}

/// Exclusive hold on an open microphone
pub struct MicrophoneLease {
    chunks: mpsc::UnboundedReceiver<AudioChunk>,
    device: Box<dyn CaptureDevice>,
}

impl std::fmt::Debug for MicrophoneLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrophoneLease").finish_non_exhaustive()
    }
}

impl MicrophoneLease {
    /// Wrap an open device and the channel its chunks arrive on
    pub fn new(
        chunks: mpsc::UnboundedReceiver<AudioChunk>,
        device: impl CaptureDevice + 'static,
    ) -> Self {
        Self {
            chunks,
            device: Box::new(device),
        }
    }

    /// Stop the device, then collect everything captured
    ///
    /// Waits at most `drain` for the device to flush and close its output.
    /// The device is dropped afterwards either way.
    pub async fn release(self, drain: Duration) -> Vec<AudioChunk> {
        let Self {
            mut chunks,
            mut device,
        } = self;
        device.stop();
        debug!("microphone stopping");

        let mut buffer = Vec::new();
        let collect = async {
            while let Some(chunk) = chunks.recv().await {
                if !chunk.is_empty() {
                    buffer.push(chunk);
                }
            }
        };
        if tokio::time::timeout(drain, collect).await.is_err() {
            warn!("audio source did not close after stop, using partial buffer");
        }

        drop(device);
        debug!("microphone released");
        buffer
    }
}
