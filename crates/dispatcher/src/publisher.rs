//! ChannelPublisher - bridges the synchronous pipeline threads to the dispatcher

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{trace, warn};

use contracts::{OutputEvent, OutputSink};

/// `OutputSink` that forwards events into the dispatcher's input channel
///
/// Never blocks the caller: when the channel is full the event is dropped
/// and counted.
pub struct ChannelPublisher {
    tx: mpsc::Sender<OutputEvent>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::Sender<OutputEvent>) -> Self {
        Self {
            tx,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a publisher and the receiver to hand to a [`Dispatcher`](crate::Dispatcher)
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutputEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl OutputSink for ChannelPublisher {
    fn publish(&self, event: OutputEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // latest_pose runs at IMU rate; only warn on the first and every 1000th drop
                if dropped == 1 || dropped.is_multiple_of(1000) {
                    warn!(topic = event.topic(), dropped, "Dispatcher queue full, event dropped");
                }
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(topic = event.topic(), "Dispatcher closed, event dropped");
            }
        }
    }
}
