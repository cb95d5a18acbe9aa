// [libs/netmon-writer/src/batch_writer.rs]
//! Batch Writer: coalesces submitted metric samples into bulk inserts.
//! A write triggers on size or on a timer, whichever comes first. Failed
//! flushes are requeued up to a bounded buffer; beyond the consecutive
//! failure cutoff the batch is dropped with a loud log rather than
//! retried forever.

use netmon_events::ShutdownSignal;
use netmon_protocol::MetricSample;
use netmon_storage::PersistenceGateway;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy)]
pub struct BatchWriterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_consecutive_failures: u32,
}

/// Producer-facing handle. `submit` blocks only if the channel (sized
/// `batch_size * 2`) is full, never on storage I/O.
#[derive(Clone)]
pub struct BatchWriterHandle {
    tx: mpsc::Sender<MetricSample>,
}

impl BatchWriterHandle {
    pub async fn submit(&self, sample: MetricSample) -> Result<(), MetricSample> {
        self.tx.send(sample).await.map_err(|e| e.0)
    }
}

pub fn spawn(
    storage: Arc<dyn PersistenceGateway>,
    config: BatchWriterConfig,
    shutdown: ShutdownSignal,
) -> (BatchWriterHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.batch_size.max(1) * 2);
    let join = tokio::spawn(netmon_telemetry::supervise("batch_writer", run(storage, config, rx, shutdown)));
    (BatchWriterHandle { tx }, join)
}

struct WriterState {
    current_batch: Vec<MetricSample>,
    requeue: VecDeque<MetricSample>,
    consecutive_failures: u32,
}

async fn run(
    storage: Arc<dyn PersistenceGateway>,
    config: BatchWriterConfig,
    mut rx: mpsc::Receiver<MetricSample>,
    mut shutdown: ShutdownSignal,
) {
    let mut state = WriterState { current_batch: Vec::new(), requeue: VecDeque::new(), consecutive_failures: 0 };
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.tick().await; // first tick fires immediately; consume it so the real period starts now

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("batch writer shutting down, performing final flush");
                flush(&storage, &mut state, &config).await;
                break;
            }
            _ = ticker.tick() => {
                flush(&storage, &mut state, &config).await;
            }
            maybe_sample = rx.recv() => {
                match maybe_sample {
                    Some(sample) => {
                        state.current_batch.push(sample);
                        if state.current_batch.len() >= config.batch_size {
                            flush(&storage, &mut state, &config).await;
                        }
                    }
                    None => {
                        flush(&storage, &mut state, &config).await;
                        break;
                    }
                }
            }
        }
    }
}

#[instrument(skip(storage, state, config))]
async fn flush(storage: &Arc<dyn PersistenceGateway>, state: &mut WriterState, config: &BatchWriterConfig) {
    if state.current_batch.is_empty() && state.requeue.is_empty() {
        return;
    }

    let mut to_write: Vec<MetricSample> = state.requeue.drain(..).collect();
    to_write.append(&mut state.current_batch);

    match storage.insert_metric_samples(&to_write).await {
        Ok(count) => {
            state.consecutive_failures = 0;
            info!(count, "flushed metric batch");
        }
        Err(err) => {
            state.consecutive_failures += 1;
            if state.consecutive_failures < config.max_consecutive_failures {
                let cap = config.batch_size * 10;
                let dropped = to_write.len().saturating_sub(cap);
                if dropped > 0 {
                    warn!(dropped, "requeue buffer cap exceeded, dropping tail of failed batch");
                    to_write.truncate(cap);
                }
                warn!(error = %err, consecutive_failures = state.consecutive_failures, "flush failed, requeuing");
                state.requeue.extend(to_write);
            } else {
                error!(error = %err, count = to_write.len(), "batch dropped after exceeding max consecutive flush failures");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use netmon_protocol::{
        CredentialProfile, DiscoveredDevice, DiscoveryProfile, DiscoveryRunStatus, Monitor, MonitorStatus, MonitorWithCredential,
        NewDiscoveredDevice, NewMonitor,
    };
    use netmon_storage::StorageError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    struct CountingGateway {
        calls: AtomicU32,
        fail_first_n: u32,
        received: StdMutex<Vec<usize>>,
    }

    #[async_trait]
    impl PersistenceGateway for CountingGateway {
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
            unimplemented!()
        }
        async fn create_monitor(&self, _monitor: &NewMonitor) -> Result<MonitorWithCredential, StorageError> {
            unimplemented!()
        }
        async fn update_monitor_status(&self, _id: Uuid, _status: MonitorStatus) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn update_discovery_run_status(&self, _id: Uuid, _status: DiscoveryRunStatus, _devices_found: u32) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn insert_metric_samples(&self, samples: &[MetricSample]) -> Result<usize, StorageError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                return Err(StorageError::Transaction("simulated failure".into()));
            }
            self.received.lock().unwrap().push(samples.len());
            Ok(samples.len())
        }
    }

    fn sample() -> MetricSample {
        MetricSample { monitor_id: Uuid::new_v4(), timestamp: Utc::now(), name: "system.cpu.usage".into(), value: 1.0, sample_type: Default::default() }
    }

    #[tokio::test]
    async fn size_trigger_flushes_without_waiting_for_the_timer() {
        let gateway = Arc::new(CountingGateway { calls: AtomicU32::new(0), fail_first_n: 0, received: StdMutex::new(vec![]) });
        let config = BatchWriterConfig { batch_size: 2, flush_interval: Duration::from_secs(3600), max_consecutive_failures: 3 };
        let (handle_shutdown, shutdown) = netmon_events::ShutdownHandle::new();
        let (handle, join) = spawn(gateway.clone(), config, shutdown);

        handle.submit(sample()).await.unwrap();
        handle.submit(sample()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*gateway.received.lock().unwrap(), vec![2]);

        handle_shutdown.trigger();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn failed_flush_is_requeued_and_retried_on_next_flush() {
        let gateway = Arc::new(CountingGateway { calls: AtomicU32::new(0), fail_first_n: 1, received: StdMutex::new(vec![]) });
        let config = BatchWriterConfig { batch_size: 1, flush_interval: Duration::from_secs(3600), max_consecutive_failures: 3 };
        let (handle_shutdown, shutdown) = netmon_events::ShutdownHandle::new();
        let (handle, join) = spawn(gateway.clone(), config, shutdown);

        handle.submit(sample()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.submit(sample()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(*gateway.received.lock().unwrap(), vec![2]);

        handle_shutdown.trigger();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_performs_a_final_flush() {
        let gateway = Arc::new(CountingGateway { calls: AtomicU32::new(0), fail_first_n: 0, received: StdMutex::new(vec![]) });
        let config = BatchWriterConfig { batch_size: 100, flush_interval: Duration::from_secs(3600), max_consecutive_failures: 3 };
        let (handle_shutdown, shutdown) = netmon_events::ShutdownHandle::new();
        let (handle, join) = spawn(gateway.clone(), config, shutdown);

        handle.submit(sample()).await.unwrap();
        handle_shutdown.trigger();
        join.await.unwrap();

        assert_eq!(*gateway.received.lock().unwrap(), vec![1]);
    }
}
