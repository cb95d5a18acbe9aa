// [libs/netmon-events/src/lib.rs]
//! The Event Plane: typed, bounded channels connecting every component.
//!
//! Every channel is non-blocking for its producer except `CacheInvalidate`,
//! which is backpressure-aware — the Scheduler must never miss a cache
//! update, so that send blocks (cancellable via the shared shutdown
//! signal) instead of dropping.

mod shutdown;

pub use shutdown::{ShutdownHandle, ShutdownSignal};

use netmon_protocol::{CacheInvalidate, DeviceValidatedEvent, DiscoveryRequestEvent, DiscoveryStatusEvent, MonitorStateEvent};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct EventPlaneCapacities {
    pub discovery_request: usize,
    pub device_validated: usize,
    pub discovery_status: usize,
    pub cache_invalidate: usize,
    pub monitor_state: usize,
}

impl Default for EventPlaneCapacities {
    fn default() -> Self {
        Self {
            discovery_request: 64,
            device_validated: 256,
            discovery_status: 64,
            cache_invalidate: 64,
            monitor_state: 64,
        }
    }
}

/// Producer-facing handle. Cheaply `Clone`-able — every sender is an
/// `mpsc::Sender`, which is itself a cheap shared handle.
#[derive(Clone)]
pub struct EventPlane {
    discovery_request_tx: mpsc::Sender<DiscoveryRequestEvent>,
    device_validated_tx: mpsc::Sender<DeviceValidatedEvent>,
    discovery_status_tx: mpsc::Sender<DiscoveryStatusEvent>,
    cache_invalidate_tx: mpsc::Sender<CacheInvalidate>,
    monitor_state_tx: mpsc::Sender<MonitorStateEvent>,
}

/// Consumer-facing handles. Each channel has exactly one consumer, so
/// these receivers are handed out once at construction time and moved
/// into the owning daemon.
pub struct EventPlaneReceivers {
    pub discovery_request: mpsc::Receiver<DiscoveryRequestEvent>,
    pub device_validated: mpsc::Receiver<DeviceValidatedEvent>,
    pub discovery_status: mpsc::Receiver<DiscoveryStatusEvent>,
    pub cache_invalidate: mpsc::Receiver<CacheInvalidate>,
    pub monitor_state: mpsc::Receiver<MonitorStateEvent>,
}

impl EventPlane {
    pub fn new(capacities: EventPlaneCapacities) -> (Self, EventPlaneReceivers) {
        let (discovery_request_tx, discovery_request) = mpsc::channel(capacities.discovery_request);
        let (device_validated_tx, device_validated) = mpsc::channel(capacities.device_validated);
        let (discovery_status_tx, discovery_status) = mpsc::channel(capacities.discovery_status);
        let (cache_invalidate_tx, cache_invalidate) = mpsc::channel(capacities.cache_invalidate);
        let (monitor_state_tx, monitor_state) = mpsc::channel(capacities.monitor_state);

        (
            Self {
                discovery_request_tx,
                device_validated_tx,
                discovery_status_tx,
                cache_invalidate_tx,
                monitor_state_tx,
            },
            EventPlaneReceivers { discovery_request, device_validated, discovery_status, cache_invalidate, monitor_state },
        )
    }

    pub fn send_discovery_request(&self, event: DiscoveryRequestEvent) {
        drop_if_full(&self.discovery_request_tx, event, "discovery_request");
    }

    pub fn send_device_validated(&self, event: DeviceValidatedEvent) {
        drop_if_full(&self.device_validated_tx, event, "device_validated");
    }

    pub fn send_discovery_status(&self, event: DiscoveryStatusEvent) {
        drop_if_full(&self.discovery_status_tx, event, "discovery_status");
    }

    pub fn send_monitor_state(&self, event: MonitorStateEvent) {
        drop_if_full(&self.monitor_state_tx, event, "monitor_state");
    }

    /// Blocking send with cancellation. Returns `Ok(())` once delivered,
    /// or `Err(())` if `shutdown` fired first or the Scheduler's receiver
    /// was dropped.
    pub async fn send_cache_invalidate(&self, event: CacheInvalidate, shutdown: &mut ShutdownSignal) -> Result<(), ()> {
        tokio::select! {
            result = self.cache_invalidate_tx.send(event) => result.map_err(|_| ()),
            _ = shutdown.cancelled() => Err(()),
        }
    }
}

fn drop_if_full<T>(sender: &mpsc::Sender<T>, event: T, channel_name: &'static str) {
    if let Err(err) = sender.try_send(event) {
        match err {
            mpsc::error::TrySendError::Full(_) => {
                warn!(channel = channel_name, "channel full, dropping event");
            }
            mpsc::error::TrySendError::Closed(_) => {
                warn!(channel = channel_name, "channel closed, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmon_protocol::DiscoveryRunStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (plane, mut receivers) = EventPlane::new(EventPlaneCapacities { discovery_status: 1, ..Default::default() });

        let event = || DiscoveryStatusEvent {
            profile_id: Uuid::nil(),
            status: DiscoveryRunStatus::Success,
            devices_found: 1,
            started_at: chrono::Utc::now(),
            completed_at: chrono::Utc::now(),
        };

        plane.send_discovery_status(event());
        plane.send_discovery_status(event());

        assert!(receivers.discovery_status.recv().await.is_some());
        assert!(receivers.discovery_status.try_recv().is_err());
    }

    #[tokio::test]
    async fn cache_invalidate_is_cancellable() {
        let (plane, receivers) = EventPlane::new(EventPlaneCapacities { cache_invalidate: 1, ..Default::default() });
        // Fill the single slot so the next send would otherwise block.
        plane.send_cache_invalidate(CacheInvalidate::Delete(vec![]), &mut ShutdownHandle::new().1).await.unwrap();

        let (handle, mut signal) = ShutdownHandle::new();
        handle.trigger();

        let result = plane.send_cache_invalidate(CacheInvalidate::Delete(vec![]), &mut signal).await;
        assert!(result.is_err());
        drop(receivers.cache_invalidate);
    }
}
