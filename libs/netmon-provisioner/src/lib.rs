// [libs/netmon-provisioner/src/lib.rs]
//! Provisioner: turns a validated device into persistent state. Upserts
//! the discovered-device row; if the originating profile auto-provisions,
//! also creates a monitor and pushes it onto the Scheduler's live cache.
//!
//! Failure to persist is logged and the event is dropped — there is no
//! retry, matching the Provisioner's documented no-retry contract.

use netmon_events::{EventPlane, ShutdownSignal};
use netmon_protocol::{monitor::DEFAULT_POLLING_INTERVAL_SECONDS, CacheInvalidate, DeviceStatus, DeviceValidatedEvent, NewDiscoveredDevice, NewMonitor};
use netmon_storage::PersistenceGateway;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub struct Provisioner {
    storage: Arc<dyn PersistenceGateway>,
    events: EventPlane,
}

impl Provisioner {
    pub fn new(storage: Arc<dyn PersistenceGateway>, events: EventPlane) -> Self {
        Self { storage, events }
    }

    pub async fn run(&self, mut validated: mpsc::Receiver<DeviceValidatedEvent>, mut shutdown: ShutdownSignal) {
        loop {
            let mut select_shutdown = shutdown.clone();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe_event = validated.recv() => {
                    match maybe_event {
                        Some(event) => self.handle(event, &mut select_shutdown).await,
                        None => break,
                    }
                }
            }
        }
    }

    #[instrument(skip(self, event, shutdown), fields(ip = %event.ip, port = event.port))]
    async fn handle(&self, event: DeviceValidatedEvent, shutdown: &mut ShutdownSignal) {
        let new_device = NewDiscoveredDevice {
            discovery_profile_id: event.discovery_profile.id,
            ip: event.ip,
            port: event.port,
            status: DeviceStatus::Validated,
        };

        if let Err(err) = self.storage.upsert_discovered_device(&new_device).await {
            warn!(error = %err, "failed to persist discovered device, dropping event");
            return;
        }

        if !event.discovery_profile.auto_provision {
            return;
        }

        let plugin_id = event
            .plugin_info
            .id
            .clone()
            .unwrap_or_else(|| event.plugin_info.protocol.as_str().to_string());

        let new_monitor = NewMonitor {
            ip: event.ip,
            port: event.port,
            plugin_id,
            credential_profile_id: event.credential_profile.id,
            discovery_profile_id: event.discovery_profile.id,
            polling_interval_seconds: DEFAULT_POLLING_INTERVAL_SECONDS,
        };

        let monitor_with_credential = match self.storage.create_monitor(&new_monitor).await {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, "failed to create monitor, dropping event");
                return;
            }
        };

        info!(monitor_id = %monitor_with_credential.monitor.id, "monitor auto-provisioned");
        if self
            .events
            .send_cache_invalidate(CacheInvalidate::Update(vec![monitor_with_credential]), shutdown)
            .await
            .is_err()
        {
            warn!("cache invalidate dropped: shutdown in progress or scheduler gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use netmon_events::EventPlaneCapacities;
    use netmon_protocol::{
        CredentialProfile, DiscoveredDevice, DiscoveryProfile, MetricSample, Monitor, MonitorStatus, MonitorWithCredential, Protocol, PluginRef,
    };
    use netmon_storage::StorageError;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeGateway {
        monitor_created: StdMutex<bool>,
        device_upserted: StdMutex<bool>,
    }

    #[async_trait]
    impl PersistenceGateway for FakeGateway {
        async fn load_active_monitors(&self) -> Result<Vec<MonitorWithCredential>, StorageError> {
            Ok(vec![])
        }
        async fn load_discovery_profile(&self, _id: Uuid) -> Result<Option<DiscoveryProfile>, StorageError> {
            Ok(None)
        }
        async fn load_credential_profile(&self, _id: Uuid) -> Result<Option<CredentialProfile>, StorageError> {
            Ok(None)
        }
        async fn upsert_discovered_device(&self, _device: &NewDiscoveredDevice) -> Result<DiscoveredDevice, StorageError> {
            *self.device_upserted.lock().unwrap() = true;
            Ok(DiscoveredDevice {
                id: Uuid::new_v4(),
                discovery_profile_id: Uuid::new_v4(),
                ip: "10.0.0.1".parse().unwrap(),
                port: 22,
                status: DeviceStatus::Validated,
                created_at: Utc::now(),
            })
        }
        async fn create_monitor(&self, monitor: &NewMonitor) -> Result<MonitorWithCredential, StorageError> {
            *self.monitor_created.lock().unwrap() = true;
            Ok(MonitorWithCredential {
                monitor: Monitor {
                    id: Uuid::new_v4(),
                    ip: monitor.ip,
                    port: monitor.port,
                    plugin_id: monitor.plugin_id.clone(),
                    credential_profile_id: monitor.credential_profile_id,
                    discovery_profile_id: monitor.discovery_profile_id,
                    polling_interval_seconds: monitor.polling_interval_seconds,
                    status: MonitorStatus::Active,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                credential_ciphertext: "cipher".into(),
                credential_protocol: Protocol::Ssh,
            })
        }
        async fn update_monitor_status(&self, _id: Uuid, _status: MonitorStatus) -> Result<(), StorageError> {
            Ok(())
        }
        async fn update_discovery_run_status(&self, _id: Uuid, _status: netmon_protocol::DiscoveryRunStatus, _devices_found: u32) -> Result<(), StorageError> {
            Ok(())
        }
        async fn insert_metric_samples(&self, _samples: &[MetricSample]) -> Result<usize, StorageError> {
            Ok(0)
        }
    }

    fn sample_event(auto_provision: bool) -> DeviceValidatedEvent {
        DeviceValidatedEvent {
            discovery_profile: DiscoveryProfile {
                id: Uuid::new_v4(),
                name: "test".into(),
                target_ciphertext: "cipher".into(),
                port: 22,
                handshake_timeout_ms: 1000,
                credential_profile_id: Uuid::new_v4(),
                auto_provision,
                auto_run: false,
                last_run_status: None,
                devices_discovered: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            credential_profile: CredentialProfile {
                id: Uuid::new_v4(),
                name: "test-cred".into(),
                protocol: Protocol::Ssh,
                payload_ciphertext: "cipher".into(),
            },
            plugin_info: PluginRef { id: Some("ssh-metrics".into()), protocol: Protocol::Ssh },
            ip: "10.0.0.1".parse().unwrap(),
            port: 22,
            hostname: None,
        }
    }

    #[tokio::test]
    async fn auto_provision_creates_monitor_and_invalidates_cache() {
        let gateway = Arc::new(FakeGateway::default());
        let (events, mut receivers) = EventPlane::new(EventPlaneCapacities::default());
        let provisioner = Provisioner::new(gateway.clone(), events);
        let (_handle, mut shutdown) = netmon_events::ShutdownHandle::new();

        provisioner.handle(sample_event(true), &mut shutdown).await;

        assert!(*gateway.device_upserted.lock().unwrap());
        assert!(*gateway.monitor_created.lock().unwrap());
        assert!(receivers.cache_invalidate.try_recv().is_ok());
    }

    #[tokio::test]
    async fn without_auto_provision_only_the_device_is_persisted() {
        let gateway = Arc::new(FakeGateway::default());
        let (events, mut receivers) = EventPlane::new(EventPlaneCapacities::default());
        let provisioner = Provisioner::new(gateway.clone(), events);
        let (_handle, mut shutdown) = netmon_events::ShutdownHandle::new();

        provisioner.handle(sample_event(false), &mut shutdown).await;

        assert!(*gateway.device_upserted.lock().unwrap());
        assert!(!*gateway.monitor_created.lock().unwrap());
        assert!(receivers.cache_invalidate.try_recv().is_err());
    }
}
