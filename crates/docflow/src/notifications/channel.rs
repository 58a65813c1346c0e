//! Push channel endpoints

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{Error, Result};
use crate::types::PushEvent;

/// Live delivery endpoint for one owner.
///
/// `send` runs while the owner's bucket is locked, so it must not block.
/// An error marks the channel dead and the hub drops it.
pub trait PushChannel: Send + Sync {
    fn send(&self, event: &PushEvent) -> Result<()>;
}

/// Channel backed by a bounded queue drained by a connection task
pub struct MpscPushChannel {
    tx: mpsc::Sender<PushEvent>,
}

impl MpscPushChannel {
    /// Create a channel and the receiver its connection task reads from
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PushEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl PushChannel for MpscPushChannel {
    fn send(&self, event: &PushEvent) -> Result<()> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => Error::internal("push queue full"),
            TrySendError::Closed(_) => Error::internal("push channel closed"),
        })
    }
}
