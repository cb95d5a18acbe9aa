// [libs/netmon-discovery/src/lib.rs]
//! Discovery Worker: expands a profile's target expression into
//! addresses, validates each with its protocol handshake, and emits
//! `DeviceValidated` events for the Provisioner.
//!
//! At most one run is in flight per profile at a time — a profile whose
//! prior run is still executing is skipped with a warning rather than
//! queued, matching the dedup-set semantics of the run loop this is
//! modeled on.

use chrono::Utc;
use netmon_events::EventPlane;
use netmon_plugin::PluginRegistry;
use netmon_protocol::{DiscoveryRequestEvent, DiscoveryRunStatus, DiscoveryStatusEvent, PluginRef};
use netmon_storage::PersistenceGateway;
use netmon_targets::expand;
use netmon_validators::validate;
use netmon_vault::CredentialVault;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct DiscoveryWorker {
    storage: Arc<dyn PersistenceGateway>,
    vault: Arc<CredentialVault>,
    registry: Arc<PluginRegistry>,
    events: EventPlane,
    running: Arc<Mutex<HashSet<Uuid>>>,
}

impl DiscoveryWorker {
    pub fn new(
        storage: Arc<dyn PersistenceGateway>,
        vault: Arc<CredentialVault>,
        registry: Arc<PluginRegistry>,
        events: EventPlane,
    ) -> Self {
        Self { storage, vault, registry, events, running: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Drains `requests` until the channel closes, spawning one run per
    /// event. Does not itself select on a shutdown signal — the caller is
    /// expected to drop the sending half of `requests` to stop this loop.
    pub async fn run(&self, mut requests: mpsc::Receiver<DiscoveryRequestEvent>) {
        while let Some(event) = requests.recv().await {
            self.spawn_run(event);
        }
    }

    fn spawn_run(&self, event: DiscoveryRequestEvent) {
        let profile_id = event.profile_id;
        {
            let mut running = self.running.lock().expect("discovery dedup set poisoned");
            if !running.insert(profile_id) {
                warn!(%profile_id, "discovery run already in flight for this profile, skipping");
                return;
            }
        }

        let worker = self.clone();
        tokio::spawn(netmon_telemetry::supervise("discovery_run", async move {
            worker.execute(event).await;
            worker.running.lock().expect("discovery dedup set poisoned").remove(&profile_id);
        }));
    }

    #[instrument(skip(self, event), fields(profile_id = %event.profile_id))]
    async fn execute(&self, event: DiscoveryRequestEvent) {
        let profile_id = event.profile_id;

        let profile = match self.storage.load_discovery_profile(profile_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                self.emit_status(profile_id, DiscoveryRunStatus::Failed, 0, event.started_at).await;
                return;
            }
            Err(err) => {
                warn!(error = %err, "failed to load discovery profile");
                self.emit_status(profile_id, DiscoveryRunStatus::Failed, 0, event.started_at).await;
                return;
            }
        };

        let target_expression = match self.vault.decrypt(&profile.target_ciphertext) {
            Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| profile.target_ciphertext.clone()),
            Err(err) => {
                warn!(error = %err, "target expression failed to decrypt, treating ciphertext field as raw legacy value");
                profile.target_ciphertext.clone()
            }
        };

        let addresses = match expand(&target_expression) {
            Ok(addresses) => addresses,
            Err(err) => {
                warn!(error = %err, "target expansion failed");
                self.emit_status(profile_id, DiscoveryRunStatus::Failed, 0, event.started_at).await;
                return;
            }
        };

        let credential_profile = match self.storage.load_credential_profile(profile.credential_profile_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                self.emit_status(profile_id, DiscoveryRunStatus::Failed, 0, event.started_at).await;
                return;
            }
            Err(err) => {
                warn!(error = %err, "failed to load credential profile");
                self.emit_status(profile_id, DiscoveryRunStatus::Failed, 0, event.started_at).await;
                return;
            }
        };

        let typed_credential = match self.vault.decrypt_container(&credential_profile.payload_ciphertext, credential_profile.protocol) {
            Ok(typed) => typed,
            Err(err) => {
                warn!(error = %err, "credential decryption failed");
                self.emit_status(profile_id, DiscoveryRunStatus::Failed, 0, event.started_at).await;
                return;
            }
        };

        let plugin_info = match self.registry.get_by_protocol(credential_profile.protocol.as_str()) {
            Some(manifest) => PluginRef { id: Some(manifest.id.clone()), protocol: credential_profile.protocol },
            None => PluginRef { id: None, protocol: credential_profile.protocol },
        };

        let total = addresses.len() as u32;
        let mut validated = 0u32;
        let timeout = Duration::from_millis(profile.handshake_timeout_ms);

        for ip in addresses {
            let outcome = validate(credential_profile.protocol, ip, profile.port, &typed_credential, timeout).await;
            if outcome.success {
                validated += 1;
                self.events.send_device_validated(netmon_protocol::DeviceValidatedEvent {
                    discovery_profile: profile.clone(),
                    credential_profile: credential_profile.clone(),
                    plugin_info: plugin_info.clone(),
                    ip,
                    port: profile.port,
                    hostname: outcome.hostname,
                });
            }
        }

        let status = if total == 0 || validated == 0 {
            DiscoveryRunStatus::Failed
        } else if validated == total {
            DiscoveryRunStatus::Success
        } else {
            DiscoveryRunStatus::Partial
        };

        if let Err(err) = self.storage.update_discovery_run_status(profile_id, status, validated).await {
            warn!(error = %err, "failed to persist discovery run status");
        }

        info!(%profile_id, validated, total, ?status, "discovery run complete");
        self.emit_status(profile_id, status, validated, event.started_at).await;
    }

    async fn emit_status(&self, profile_id: Uuid, status: DiscoveryRunStatus, devices_found: u32, started_at: chrono::DateTime<Utc>) {
        self.events.send_discovery_status(DiscoveryStatusEvent {
            profile_id,
            status,
            devices_found,
            started_at,
            completed_at: Utc::now(),
        });
    }
}
