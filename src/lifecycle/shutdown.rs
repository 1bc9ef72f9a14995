//! Gateway-wide stop signal.
//!
//! Listeners wait on [`Shutdown::signalled`]; the docker event watcher holds
//! a raw [`broadcast::Receiver`] so it can `select!` on it next to the event
//! stream.

use std::future::Future;
use tokio::sync::broadcast;

#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Resolves once [`trigger`](Self::trigger) is called. Owns its receiver,
    /// so it can be handed to `with_graceful_shutdown` or a spawned task.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // Err means the sender is gone, which is a stop as well.
            let _ = rx.recv().await;
        }
    }

    /// Stop everything subscribed.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still waiting for the signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
