// [apps/netmon-server/src/kernel.rs]
//! The composition root: connects storage, the credential vault, the
//! plugin registry, and the event plane, then spawns the discovery
//! worker, provisioner, scheduler, and batch writer, each on its own
//! supervised task, before blocking on a shutdown signal.

use netmon_config::NetmonConfig;
use netmon_discovery::DiscoveryWorker;
use netmon_events::{EventPlane, EventPlaneCapacities, EventPlaneReceivers, ShutdownHandle};
use netmon_plugin::{PluginExecutor, PluginRegistry};
use netmon_protocol::{DiscoveryStatusEvent, MonitorStateEvent};
use netmon_provisioner::Provisioner;
use netmon_scheduler::{Scheduler, SchedulerConfig};
use netmon_storage::{LibsqlGateway, PersistenceGateway, StorageClient};
use netmon_vault::CredentialVault;
use netmon_writer::BatchWriterConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

pub struct NetmonKernel {
    config: NetmonConfig,
    storage: Arc<dyn PersistenceGateway>,
    vault: Arc<CredentialVault>,
    registry: Arc<PluginRegistry>,
    executor: Arc<PluginExecutor>,
    events: EventPlane,
    receivers: EventPlaneReceivers,
}

impl NetmonKernel {
    /// Connects to storage and applies the schema, loads the plugin
    /// registry from `config.plugin_directory`, and builds the event
    /// plane. Nothing is spawned yet — see [`Self::launch`].
    #[instrument(skip_all)]
    pub async fn ignite(config: NetmonConfig) -> anyhow::Result<Self> {
        let client = StorageClient::connect(&config.database_url, config.database_auth_token.clone()).await?;
        let storage: Arc<dyn PersistenceGateway> = Arc::new(LibsqlGateway::new(client));

        let vault = Arc::new(CredentialVault::new(&config.encryption_key)?);

        let registry = Arc::new(PluginRegistry::scan(&config.plugin_directory)?);
        info!(plugins = registry.len(), directory = %config.plugin_directory.display(), "plugin registry loaded");

        let executor = Arc::new(PluginExecutor::new());

        let capacities = EventPlaneCapacities {
            discovery_request: config.discovery_channel_capacity,
            device_validated: config.device_validated_channel_capacity,
            discovery_status: config.discovery_channel_capacity,
            cache_invalidate: config.cache_invalidate_channel_capacity,
            monitor_state: config.monitor_state_channel_capacity,
        };
        let (events, receivers) = EventPlane::new(capacities);

        Ok(Self { config, storage, vault, registry, executor, events, receivers })
    }

    /// Spawns every daemon and blocks until Ctrl+C, then triggers a
    /// cooperative shutdown and waits for the batch writer's final flush.
    pub async fn launch(self) -> anyhow::Result<()> {
        let Self { config, storage, vault, registry, executor, events, receivers } = self;
        let EventPlaneReceivers { discovery_request, device_validated, discovery_status, cache_invalidate, monitor_state } = receivers;

        let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();

        // Neither channel has a consumer of its own yet — no REST API sits
        // in front of this core (see the persistence gateway's design
        // notes) — so both are drained into the log rather than dropped,
        // which would otherwise warn on every send once the buffer fills.
        tokio::spawn(drain_discovery_status(discovery_status));
        tokio::spawn(drain_monitor_state(monitor_state));

        let discovery_worker = DiscoveryWorker::new(storage.clone(), vault.clone(), registry.clone(), events.clone());
        tokio::spawn(netmon_telemetry::supervise("discovery_worker", async move {
            discovery_worker.run(discovery_request).await;
        }));

        let provisioner = Provisioner::new(storage.clone(), events.clone());
        let provisioner_shutdown = shutdown_signal.clone();
        tokio::spawn(netmon_telemetry::supervise("provisioner", async move {
            provisioner.run(device_validated, provisioner_shutdown).await;
        }));

        let (batch_writer, writer_join) = netmon_writer::spawn(
            storage.clone(),
            BatchWriterConfig {
                batch_size: config.batch_size,
                flush_interval: config.flush_interval,
                max_consecutive_failures: config.max_consecutive_flush_failures,
            },
            shutdown_signal.clone(),
        );

        let scheduler = Scheduler::new(
            storage.clone(),
            vault.clone(),
            registry.clone(),
            executor.clone(),
            events.clone(),
            batch_writer,
            SchedulerConfig {
                tick_interval: config.tick_interval,
                liveness_timeout: config.liveness_timeout,
                liveness_slots: config.liveness_slots,
                plugin_slots: config.plugin_slots,
                down_threshold: config.down_threshold,
            },
        );
        scheduler.load_active_monitors().await?;

        let scheduler_for_run = Arc::clone(&scheduler);
        let scheduler_shutdown = shutdown_signal.clone();
        tokio::spawn(netmon_telemetry::supervise("scheduler", async move {
            scheduler_for_run.run(cache_invalidate, scheduler_shutdown).await;
        }));

        info!("netmon core fully ignited");

        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, draining in-flight work");
        shutdown_handle.trigger();

        if let Err(join_err) = writer_join.await {
            error!(error = %join_err, "batch writer task panicked during shutdown");
        }

        Ok(())
    }
}

async fn drain_discovery_status(mut rx: mpsc::Receiver<DiscoveryStatusEvent>) {
    while let Some(event) = rx.recv().await {
        info!(profile_id = %event.profile_id, status = ?event.status, devices_found = event.devices_found, "discovery run completed");
    }
}

async fn drain_monitor_state(mut rx: mpsc::Receiver<MonitorStateEvent>) {
    while let Some(event) = rx.recv().await {
        info!(monitor_id = %event.monitor_id, ip = %event.ip, event_type = ?event.event_type, failures = event.failures, "monitor state changed");
    }
}
