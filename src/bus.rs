use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Fan-out channel from the sampling thread to async consumers.
///
/// Holds at most `capacity` undelivered samples per subscriber; a subscriber
/// that falls further behind sees `RecvError::Lagged` and loses the oldest.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes `msg`, returning `false` if nobody is subscribed.
    pub fn publish(&self, msg: T) -> bool {
        match self.tx.send(Arc::new(msg)) {
            Ok(_) => true,
            Err(_) => {
                trace!("Message dropped, no subscribers.");
                false
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}
