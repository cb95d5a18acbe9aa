// [libs/netmon-scheduler/src/scheduler.rs]
//! The central state machine: a tick loop that fires due monitors,
//! probes liveness, batches live monitors per plugin, invokes the
//! subprocess, and applies the up/down transition per monitor.

use crate::state::{HeapItem, ScheduledMonitor, SchedulerState};
use netmon_events::{EventPlane, ShutdownSignal};
use netmon_plugin::PluginRegistry;
use netmon_plugin::PluginExecutor;
use netmon_protocol::{
    CacheInvalidate, MonitorEventType, MonitorStateEvent, MonitorStatus, PluginTask,
};
use netmon_storage::PersistenceGateway;
use netmon_vault::CredentialVault;
use netmon_writer::BatchWriterHandle;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("failed to load active monitors: {0}")]
    Storage(#[from] netmon_storage::StorageError),
}

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub liveness_timeout: Duration,
    pub liveness_slots: usize,
    pub plugin_slots: usize,
    pub down_threshold: u32,
}

pub struct Scheduler {
    storage: Arc<dyn PersistenceGateway>,
    vault: Arc<CredentialVault>,
    registry: Arc<PluginRegistry>,
    executor: Arc<PluginExecutor>,
    events: EventPlane,
    batch_writer: BatchWriterHandle,
    state: Mutex<SchedulerState>,
    liveness_slots: Arc<Semaphore>,
    plugin_slots: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn PersistenceGateway>,
        vault: Arc<CredentialVault>,
        registry: Arc<PluginRegistry>,
        executor: Arc<PluginExecutor>,
        events: EventPlane,
        batch_writer: BatchWriterHandle,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let liveness_slots = Arc::new(Semaphore::new(config.liveness_slots.max(1)));
        let plugin_slots = Arc::new(Semaphore::new(config.plugin_slots.max(1)));
        Arc::new(Self {
            storage,
            vault,
            registry,
            executor,
            events,
            batch_writer,
            state: Mutex::new(SchedulerState::default()),
            liveness_slots,
            plugin_slots,
            config,
        })
    }

    /// Step 1 of the lifecycle: load every active monitor, due immediately.
    pub async fn load_active_monitors(&self) -> Result<(), SchedulerError> {
        let rows = self.storage.load_active_monitors().await?;
        let now = Instant::now();
        let mut state = self.state.lock().expect("scheduler state poisoned");
        for row in rows {
            let id = row.monitor.id;
            state.heap.push(HeapItem { monitor_id: id, deadline: now });
            state.monitors.insert(
                id,
                ScheduledMonitor {
                    monitor: row.monitor,
                    credential_ciphertext: row.credential_ciphertext,
                    credential_protocol: row.credential_protocol,
                    decrypted_credential: None,
                    consecutive_failures: 0,
                    is_polling: false,
                    next_poll_deadline: now,
                },
            );
        }
        info!(count = state.monitors.len(), "active monitors loaded");
        Ok(())
    }

    pub async fn run(self: Arc<Self>, mut cache_invalidate: mpsc::Receiver<CacheInvalidate>, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    scheduler.tick().await;
                }
                maybe_event = cache_invalidate.recv() => {
                    match maybe_event {
                        Some(event) => self.apply_cache_invalidate(event),
                        None => break,
                    }
                }
            }
        }
    }

    fn apply_cache_invalidate(&self, event: CacheInvalidate) {
        let mut state = self.state.lock().expect("scheduler state poisoned");
        match event {
            CacheInvalidate::Update(rows) => {
                for row in rows {
                    let id = row.monitor.id;
                    if row.monitor.status != MonitorStatus::Active {
                        state.monitors.remove(&id);
                        continue;
                    }
                    let deadline = state.monitors.get(&id).map(|existing| existing.next_poll_deadline).unwrap_or_else(Instant::now);
                    state.monitors.insert(
                        id,
                        ScheduledMonitor {
                            monitor: row.monitor,
                            credential_ciphertext: row.credential_ciphertext,
                            credential_protocol: row.credential_protocol,
                            decrypted_credential: None,
                            consecutive_failures: 0,
                            is_polling: false,
                            next_poll_deadline: deadline,
                        },
                    );
                    state.heap.push(HeapItem { monitor_id: id, deadline });
                }
            }
            CacheInvalidate::Delete(ids) => {
                for id in ids {
                    state.monitors.remove(&id);
                }
            }
        }
    }

    async fn tick(self: Arc<Self>) {
        let now = Instant::now();
        let horizon = now + self.config.tick_interval;
        let mut due = Vec::new();

        {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            while let Some(top) = state.heap.peek() {
                if top.deadline > horizon {
                    break;
                }
                let item = state.heap.pop().expect("just peeked");
                let id = item.monitor_id;
                let interval = match state.monitors.get_mut(&id) {
                    Some(sched) => {
                        sched.is_polling = true;
                        Duration::from_secs(sched.monitor.polling_interval_seconds)
                    }
                    None => continue, // stale heap entry, lazily discarded
                };
                due.push(id);
                if let Some(sched) = state.monitors.get_mut(&id) {
                    sched.next_poll_deadline += interval;
                    state.heap.push(HeapItem { monitor_id: id, deadline: sched.next_poll_deadline });
                }
            }
        }

        if due.is_empty() {
            return;
        }

        let mut groups: HashMap<String, Vec<Uuid>> = HashMap::new();
        {
            let state = self.state.lock().expect("scheduler state poisoned");
            for id in due {
                if let Some(sched) = state.monitors.get(&id) {
                    groups.entry(sched.monitor.plugin_id.clone()).or_default().push(id);
                }
            }
        }

        for (plugin_id, ids) in groups {
            let scheduler = Arc::clone(&self);
            tokio::spawn(netmon_telemetry::supervise("scheduler_batch", async move {
                scheduler.run_batch(plugin_id, ids).await;
            }));
        }
    }

    #[instrument(skip(self, ids), fields(plugin_id = %plugin_id, batch_size = ids.len()))]
    async fn run_batch(&self, plugin_id: String, ids: Vec<Uuid>) {
        if self.registry.get_by_id(&plugin_id).is_none() {
            warn!("plugin not registered, failing every monitor in batch");
            for id in ids {
                self.apply_failure(id).await;
            }
            return;
        }

        let addrs: Vec<(Uuid, IpAddr, u16)> = {
            let state = self.state.lock().expect("scheduler state poisoned");
            ids.iter().filter_map(|id| state.monitors.get(id).map(|s| (*id, s.monitor.ip, s.monitor.port))).collect()
        };

        let mut live = Vec::new();
        let mut dead = Vec::new();
        let liveness_results = futures::future::join_all(addrs.into_iter().map(|(id, ip, port)| {
            let semaphore = Arc::clone(&self.liveness_slots);
            let timeout = self.config.liveness_timeout;
            async move {
                let _permit = semaphore.acquire().await.expect("liveness semaphore never closed");
                let alive = matches!(tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await, Ok(Ok(_)));
                (id, alive)
            }
        }))
        .await;

        for (id, alive) in liveness_results {
            if alive {
                live.push(id);
            } else {
                dead.push(id);
            }
        }

        for id in dead {
            self.apply_failure(id).await;
        }

        if live.is_empty() {
            return;
        }

        let _plugin_permit = self.plugin_slots.acquire().await.expect("plugin semaphore never closed");

        let mut request_map = HashMap::new();
        let mut tasks = Vec::new();
        {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            for id in &live {
                let Some(sched) = state.monitors.get_mut(id) else { continue };
                if sched.decrypted_credential.is_none() {
                    match self.vault.decrypt_container(&sched.credential_ciphertext, sched.credential_protocol) {
                        Ok(typed) => sched.decrypted_credential = Some(typed),
                        Err(err) => {
                            warn!(monitor_id = %id, error = %err, "credential decryption failed");
                            continue;
                        }
                    }
                }
                let Some(credential) = &sched.decrypted_credential else { continue };
                let request_id = Uuid::new_v4().to_string();
                request_map.insert(request_id.clone(), *id);
                tasks.push(PluginTask {
                    request_id,
                    target: sched.monitor.ip.to_string(),
                    port: sched.monitor.port,
                    credentials: serde_json::to_value(credential).unwrap_or(serde_json::Value::Null),
                });
            }
        }

        if tasks.is_empty() {
            return;
        }

        let results = match self.executor.poll(&self.registry, &plugin_id, tasks).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "plugin invocation failed, failing every live monitor in batch");
                for id in live {
                    self.apply_failure(id).await;
                }
                return;
            }
        };

        let batch_time = chrono::Utc::now();
        let mut seen = std::collections::HashSet::new();
        for result in &results {
            let Some(monitor_id) = request_map.get(&result.request_id).copied() else { continue };
            seen.insert(monitor_id);
            match result.status {
                netmon_protocol::PluginResultStatus::Success => {
                    let samples = netmon_writer::parse_plugin_result(monitor_id, result, batch_time);
                    self.apply_success(monitor_id).await;
                    for sample in samples {
                        let _ = self.batch_writer.submit(sample).await;
                    }
                }
                netmon_protocol::PluginResultStatus::Failed => {
                    self.apply_failure(monitor_id).await;
                }
            }
        }

        for (request_id, monitor_id) in &request_map {
            if !seen.contains(monitor_id) {
                warn!(%request_id, monitor_id = %monitor_id, "no result returned for request, treating as failure");
                self.apply_failure(*monitor_id).await;
            }
        }
    }

    async fn apply_success(&self, id: Uuid) {
        let recovered = {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            let Some(sched) = state.monitors.get_mut(&id) else { return };
            let was_down = sched.consecutive_failures >= self.config.down_threshold;
            sched.consecutive_failures = 0;
            sched.is_polling = false;
            was_down.then_some(sched.monitor.ip)
        };

        if let Some(ip) = recovered {
            if let Err(err) = self.storage.update_monitor_status(id, MonitorStatus::Active).await {
                warn!(monitor_id = %id, error = %err, "failed to persist recovered status");
            }
            self.events.send_monitor_state(MonitorStateEvent {
                monitor_id: id,
                ip,
                event_type: MonitorEventType::Recovered,
                failures: 0,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    async fn apply_failure(&self, id: Uuid) {
        let transition = {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            let Some(sched) = state.monitors.get_mut(&id) else { return };
            let pre = sched.consecutive_failures;
            sched.consecutive_failures += 1;
            sched.is_polling = false;
            let post = sched.consecutive_failures;
            let ip = sched.monitor.ip;

            if pre < self.config.down_threshold && post >= self.config.down_threshold {
                state.monitors.remove(&id);
                Some((ip, post))
            } else {
                None
            }
        };

        if let Some((ip, failures)) = transition {
            if let Err(err) = self.storage.update_monitor_status(id, MonitorStatus::Down).await {
                warn!(monitor_id = %id, error = %err, "failed to persist down status");
            }
            self.events.send_monitor_state(MonitorStateEvent {
                monitor_id: id,
                ip,
                event_type: MonitorEventType::Down,
                failures,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netmon_events::{EventPlaneCapacities, ShutdownHandle};
    use netmon_protocol::{
        CredentialProfile, DiscoveredDevice, DiscoveryProfile, DiscoveryRunStatus, MetricSample, Monitor, MonitorWithCredential,
        NewDiscoveredDevice, NewMonitor, Protocol,
    };
    use netmon_storage::StorageError;
    use netmon_vault::CredentialVault;
    use netmon_writer::BatchWriterConfig;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeGateway {
        seed: StdMutex<Vec<MonitorWithCredential>>,
        status_updates: StdMutex<Vec<(Uuid, MonitorStatus)>>,
    }

    #[async_trait]
    impl PersistenceGateway for FakeGateway {
        async fn load_active_monitors(&self) -> Result<Vec<MonitorWithCredential>, StorageError> {
            Ok(self.seed.lock().unwrap().clone())
        }
        async fn load_discovery_profile(&self, _id: Uuid) -> Result<Option<DiscoveryProfile>, StorageError> {
            Ok(None)
        }
        async fn load_credential_profile(&self, _id: Uuid) -> Result<Option<CredentialProfile>, StorageError> {
            Ok(None)
        }
        async fn upsert_discovered_device(&self, _device: &NewDiscoveredDevice) -> Result<DiscoveredDevice, StorageError> {
            unimplemented!()
        }
        async fn create_monitor(&self, _monitor: &NewMonitor) -> Result<MonitorWithCredential, StorageError> {
            unimplemented!()
        }
        async fn update_monitor_status(&self, id: Uuid, status: MonitorStatus) -> Result<(), StorageError> {
            self.status_updates.lock().unwrap().push((id, status));
            Ok(())
        }
        async fn update_discovery_run_status(&self, _id: Uuid, _status: DiscoveryRunStatus, _devices_found: u32) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn insert_metric_samples(&self, samples: &[MetricSample]) -> Result<usize, StorageError> {
            Ok(samples.len())
        }
    }

    fn seeded_monitor(id: Uuid) -> MonitorWithCredential {
        MonitorWithCredential {
            monitor: Monitor {
                id,
                ip: "10.0.0.5".parse().unwrap(),
                port: 22,
                plugin_id: "ssh-metrics".into(),
                credential_profile_id: Uuid::new_v4(),
                discovery_profile_id: Uuid::new_v4(),
                polling_interval_seconds: 5,
                status: MonitorStatus::Active,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            credential_ciphertext: "cipher".into(),
            credential_protocol: Protocol::Ssh,
        }
    }

    fn test_scheduler(gateway: Arc<FakeGateway>, down_threshold: u32) -> Arc<Scheduler> {
        let vault = Arc::new(CredentialVault::new(&[7u8; 32]).unwrap());
        let registry = Arc::new(PluginRegistry::default());
        let executor = Arc::new(PluginExecutor::new());
        let (events, _receivers) = EventPlane::new(EventPlaneCapacities::default());
        let (_writer_handle, _writer_join) = netmon_writer::spawn(
            gateway.clone(),
            BatchWriterConfig { batch_size: 10, flush_interval: Duration::from_secs(60), max_consecutive_failures: 3 },
            ShutdownHandle::new().1,
        );
        Scheduler::new(
            gateway,
            vault,
            registry,
            executor,
            events,
            _writer_handle,
            SchedulerConfig {
                tick_interval: Duration::from_millis(50),
                liveness_timeout: Duration::from_millis(50),
                liveness_slots: 4,
                plugin_slots: 2,
                down_threshold,
            },
        )
    }

    #[tokio::test]
    async fn tick_marks_due_monitors_polling_and_reschedules() {
        let id = Uuid::new_v4();
        let gateway = Arc::new(FakeGateway { seed: StdMutex::new(vec![seeded_monitor(id)]), ..Default::default() });
        let scheduler = test_scheduler(gateway, 3);
        scheduler.load_active_monitors().await.unwrap();

        Arc::clone(&scheduler).tick().await;

        let state = scheduler.state.lock().unwrap();
        let sched = state.monitors.get(&id).expect("monitor still tracked");
        assert!(sched.is_polling);
        assert_eq!(state.heap.len(), 1, "monitor rescheduled onto the heap for its next deadline");
    }

    #[tokio::test]
    async fn tick_discards_stale_heap_entries() {
        let gateway = Arc::new(FakeGateway::default());
        let scheduler = test_scheduler(gateway, 3);
        {
            let mut state = scheduler.state.lock().unwrap();
            state.heap.push(HeapItem { monitor_id: Uuid::new_v4(), deadline: Instant::now() });
        }

        Arc::clone(&scheduler).tick().await;

        let state = scheduler.state.lock().unwrap();
        assert!(state.heap.is_empty());
        assert!(state.monitors.is_empty());
    }

    #[tokio::test]
    async fn apply_failure_below_threshold_keeps_monitor_scheduled() {
        let id = Uuid::new_v4();
        let gateway = Arc::new(FakeGateway { seed: StdMutex::new(vec![seeded_monitor(id)]), ..Default::default() });
        let scheduler = test_scheduler(gateway, 3);
        scheduler.load_active_monitors().await.unwrap();

        scheduler.apply_failure(id).await;

        let state = scheduler.state.lock().unwrap();
        let sched = state.monitors.get(&id).expect("monitor still tracked below threshold");
        assert_eq!(sched.consecutive_failures, 1);
        assert!(!sched.is_polling);
    }

    #[tokio::test]
    async fn apply_failure_reaching_threshold_removes_monitor_and_emits_down() {
        let id = Uuid::new_v4();
        let gateway = Arc::new(FakeGateway { seed: StdMutex::new(vec![seeded_monitor(id)]), ..Default::default() });
        let scheduler = test_scheduler(gateway.clone(), 3);
        scheduler.load_active_monitors().await.unwrap();

        scheduler.apply_failure(id).await;
        scheduler.apply_failure(id).await;
        scheduler.apply_failure(id).await;

        {
            let state = scheduler.state.lock().unwrap();
            assert!(state.monitors.get(&id).is_none(), "monitor removed once down threshold is reached");
        }
        let updates = gateway.status_updates.lock().unwrap();
        assert_eq!(updates.last(), Some(&(id, MonitorStatus::Down)));
    }

    #[tokio::test]
    async fn apply_success_after_down_emits_recovered_and_persists_active() {
        let id = Uuid::new_v4();
        let gateway = Arc::new(FakeGateway { seed: StdMutex::new(vec![seeded_monitor(id)]), ..Default::default() });
        let scheduler = test_scheduler(gateway.clone(), 3);
        scheduler.load_active_monitors().await.unwrap();

        {
            let mut state = scheduler.state.lock().unwrap();
            state.monitors.get_mut(&id).unwrap().consecutive_failures = 3;
        }

        scheduler.apply_success(id).await;

        let state = scheduler.state.lock().unwrap();
        let sched = state.monitors.get(&id).expect("monitor still tracked");
        assert_eq!(sched.consecutive_failures, 0);
        let updates = gateway.status_updates.lock().unwrap();
        assert_eq!(updates.last(), Some(&(id, MonitorStatus::Active)));
    }

    #[tokio::test]
    async fn run_batch_with_unregistered_plugin_fails_every_monitor() {
        let id = Uuid::new_v4();
        let gateway = Arc::new(FakeGateway { seed: StdMutex::new(vec![seeded_monitor(id)]), ..Default::default() });
        let scheduler = test_scheduler(gateway.clone(), 1);
        scheduler.load_active_monitors().await.unwrap();

        scheduler.run_batch("ssh-metrics".into(), vec![id]).await;

        let state = scheduler.state.lock().unwrap();
        assert!(state.monitors.get(&id).is_none(), "down threshold of 1 removes the monitor on first failure");
        let updates = gateway.status_updates.lock().unwrap();
        assert_eq!(updates.last(), Some(&(id, MonitorStatus::Down)));
    }
}
