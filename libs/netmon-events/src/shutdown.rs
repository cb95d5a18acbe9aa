// [libs/netmon-events/src/shutdown.rs]
//! The shared `done` signal every long-running component selects on.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, ShutdownSignal { receiver })
    }

    /// Signals every holder of a [`ShutdownSignal`] to stop. Idempotent.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

impl ShutdownSignal {
    /// Resolves once [`ShutdownHandle::trigger`] has been called.
    pub async fn cancelled(&mut self) {
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_trigger() {
        let (handle, mut signal) = ShutdownHandle::new();
        assert!(!signal.is_cancelled());
        handle.trigger();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }
}
