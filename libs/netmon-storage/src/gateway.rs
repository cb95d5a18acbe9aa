// [libs/netmon-storage/src/gateway.rs]
//! The `PersistenceGateway` trait and its libSQL-backed implementation.
//! Every SQL statement the core issues lives here; no other crate embeds
//! a query string.

use crate::client::StorageClient;
use crate::errors::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use netmon_protocol::{
    CredentialProfile, DiscoveredDevice, DiscoveryProfile, DiscoveryRunStatus, DeviceStatus, MetricSample, MetricType,
    Monitor, MonitorStatus, MonitorWithCredential, NewDiscoveredDevice, NewMonitor, Protocol,
};
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{info, instrument};
use uuid::Uuid;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load_active_monitors(&self) -> Result<Vec<MonitorWithCredential>, StorageError>;
    async fn load_discovery_profile(&self, id: Uuid) -> Result<Option<DiscoveryProfile>, StorageError>;
    async fn load_credential_profile(&self, id: Uuid) -> Result<Option<CredentialProfile>, StorageError>;
    async fn upsert_discovered_device(&self, device: &NewDiscoveredDevice) -> Result<DiscoveredDevice, StorageError>;
    async fn create_monitor(&self, monitor: &NewMonitor) -> Result<MonitorWithCredential, StorageError>;
    async fn update_monitor_status(&self, id: Uuid, status: MonitorStatus) -> Result<(), StorageError>;
    async fn update_discovery_run_status(
        &self,
        id: Uuid,
        status: DiscoveryRunStatus,
        devices_found: u32,
    ) -> Result<(), StorageError>;
    async fn insert_metric_samples(&self, samples: &[MetricSample]) -> Result<usize, StorageError>;
}

pub struct LibsqlGateway {
    client: StorageClient,
}

impl LibsqlGateway {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }
}

fn monitor_status_str(status: MonitorStatus) -> &'static str {
    match status {
        MonitorStatus::Active => "active",
        MonitorStatus::Down => "down",
        MonitorStatus::Paused => "paused",
    }
}

fn parse_monitor_status(raw: &str) -> Result<MonitorStatus, StorageError> {
    match raw {
        "active" => Ok(MonitorStatus::Active),
        "down" => Ok(MonitorStatus::Down),
        "paused" => Ok(MonitorStatus::Paused),
        other => Err(StorageError::Mapping(format!("unknown monitor status `{other}`"))),
    }
}

fn device_status_str(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Validated => "validated",
        DeviceStatus::Provisioned => "provisioned",
    }
}

fn discovery_run_status_str(status: DiscoveryRunStatus) -> &'static str {
    match status {
        DiscoveryRunStatus::Success => "success",
        DiscoveryRunStatus::Partial => "partial",
        DiscoveryRunStatus::Failed => "failed",
    }
}

fn parse_discovery_run_status(raw: &str) -> Result<DiscoveryRunStatus, StorageError> {
    match raw {
        "success" => Ok(DiscoveryRunStatus::Success),
        "partial" => Ok(DiscoveryRunStatus::Partial),
        "failed" => Ok(DiscoveryRunStatus::Failed),
        other => Err(StorageError::Mapping(format!("unknown discovery run status `{other}`"))),
    }
}

fn parse_protocol(raw: &str) -> Result<Protocol, StorageError> {
    Protocol::parse(raw).ok_or_else(|| StorageError::Mapping(format!("unknown protocol `{raw}`")))
}

fn metric_type_str(t: MetricType) -> &'static str {
    match t {
        MetricType::Gauge => "gauge",
        MetricType::Counter => "counter",
        MetricType::Derive => "derive",
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr, StorageError> {
    IpAddr::from_str(raw).map_err(|e| StorageError::Mapping(format!("invalid IP address `{raw}`: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Mapping(format!("invalid timestamp `{raw}`: {e}")))
}

#[async_trait]
impl PersistenceGateway for LibsqlGateway {
    #[instrument(skip(self))]
    async fn load_active_monitors(&self) -> Result<Vec<MonitorWithCredential>, StorageError> {
        let connection = self.client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT m.id, m.ip, m.port, m.plugin_id, m.credential_profile_id, m.discovery_profile_id,
                        m.polling_interval_seconds, m.status, m.created_at, m.updated_at,
                        c.payload_ciphertext, c.protocol
                 FROM monitors m
                 JOIN credential_profiles c ON c.id = m.credential_profile_id
                 WHERE m.status = 'active'",
                (),
            )
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            let monitor = Monitor {
                id: Uuid::parse_str(&row.get::<String>(0)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
                ip: parse_ip(&row.get::<String>(1)?)?,
                port: row.get::<i64>(2)? as u16,
                plugin_id: row.get::<String>(3)?,
                credential_profile_id: Uuid::parse_str(&row.get::<String>(4)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
                discovery_profile_id: Uuid::parse_str(&row.get::<String>(5)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
                polling_interval_seconds: row.get::<i64>(6)? as u64,
                status: parse_monitor_status(&row.get::<String>(7)?)?,
                created_at: parse_timestamp(&row.get::<String>(8)?)?,
                updated_at: parse_timestamp(&row.get::<String>(9)?)?,
            };
            monitors.push(MonitorWithCredential {
                monitor,
                credential_ciphertext: row.get::<String>(10)?,
                credential_protocol: parse_protocol(&row.get::<String>(11)?)?,
            });
        }
        Ok(monitors)
    }

    #[instrument(skip(self))]
    async fn load_discovery_profile(&self, id: Uuid) -> Result<Option<DiscoveryProfile>, StorageError> {
        let connection = self.client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, target_ciphertext, port, handshake_timeout_ms, credential_profile_id,
                        auto_provision, auto_run, last_run_status, devices_discovered, created_at, updated_at
                 FROM discovery_profiles WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let last_run_status: Option<String> = row.get(8)?;
        Ok(Some(DiscoveryProfile {
            id: Uuid::parse_str(&row.get::<String>(0)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
            name: row.get(1)?,
            target_ciphertext: row.get(2)?,
            port: row.get::<i64>(3)? as u16,
            handshake_timeout_ms: row.get::<i64>(4)? as u64,
            credential_profile_id: Uuid::parse_str(&row.get::<String>(5)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
            auto_provision: row.get::<i64>(6)? != 0,
            auto_run: row.get::<i64>(7)? != 0,
            last_run_status: last_run_status.map(|s| parse_discovery_run_status(&s)).transpose()?,
            devices_discovered: row.get::<i64>(9)? as u32,
            created_at: parse_timestamp(&row.get::<String>(10)?)?,
            updated_at: parse_timestamp(&row.get::<String>(11)?)?,
        }))
    }

    #[instrument(skip(self))]
    async fn load_credential_profile(&self, id: Uuid) -> Result<Option<CredentialProfile>, StorageError> {
        let connection = self.client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, protocol, payload_ciphertext FROM credential_profiles WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        Ok(Some(CredentialProfile {
            id: Uuid::parse_str(&row.get::<String>(0)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
            name: row.get(1)?,
            protocol: parse_protocol(&row.get::<String>(2)?)?,
            payload_ciphertext: row.get(3)?,
        }))
    }

    #[instrument(skip(self, device))]
    async fn upsert_discovered_device(&self, device: &NewDiscoveredDevice) -> Result<DiscoveredDevice, StorageError> {
        let connection = self.client.get_connection()?;
        let id = Uuid::new_v4();

        connection
            .execute(
                "INSERT INTO discovered_devices (id, discovery_profile_id, ip, port, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(discovery_profile_id, ip, port) DO UPDATE SET status = excluded.status",
                params![
                    id.to_string(),
                    device.discovery_profile_id.to_string(),
                    device.ip.to_string(),
                    device.port as i64,
                    device_status_str(device.status),
                ],
            )
            .await?;

        let mut rows = connection
            .query(
                "SELECT id, discovery_profile_id, ip, port, status, created_at
                 FROM discovered_devices WHERE discovery_profile_id = ?1 AND ip = ?2 AND port = ?3",
                params![device.discovery_profile_id.to_string(), device.ip.to_string(), device.port as i64],
            )
            .await?;

        let row = rows.next().await?.ok_or_else(|| StorageError::Mapping("device vanished after upsert".into()))?;
        Ok(DiscoveredDevice {
            id: Uuid::parse_str(&row.get::<String>(0)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
            discovery_profile_id: Uuid::parse_str(&row.get::<String>(1)?).map_err(|e| StorageError::Mapping(e.to_string()))?,
            ip: parse_ip(&row.get::<String>(2)?)?,
            port: row.get::<i64>(3)? as u16,
            status: match row.get::<String>(4)?.as_str() {
                "validated" => DeviceStatus::Validated,
                "provisioned" => DeviceStatus::Provisioned,
                other => return Err(StorageError::Mapping(format!("unknown device status `{other}`"))),
            },
            created_at: parse_timestamp(&row.get::<String>(5)?)?,
        })
    }

    #[instrument(skip(self, monitor))]
    async fn create_monitor(&self, monitor: &NewMonitor) -> Result<MonitorWithCredential, StorageError> {
        let connection = self.client.get_connection()?;
        let id = Uuid::new_v4();

        connection
            .execute(
                "INSERT INTO monitors (id, ip, port, plugin_id, credential_profile_id, discovery_profile_id, polling_interval_seconds, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active')",
                params![
                    id.to_string(),
                    monitor.ip.to_string(),
                    monitor.port as i64,
                    monitor.plugin_id.clone(),
                    monitor.credential_profile_id.to_string(),
                    monitor.discovery_profile_id.to_string(),
                    monitor.polling_interval_or_default() as i64,
                ],
            )
            .await?;

        let mut rows = connection
            .query(
                "SELECT c.payload_ciphertext, c.protocol FROM credential_profiles c WHERE c.id = ?1",
                params![monitor.credential_profile_id.to_string()],
            )
            .await?;
        let ciphertext_row = rows
            .next()
            .await?
            .ok_or_else(|| StorageError::CredentialProfileNotFound(monitor.credential_profile_id))?;

        info!(monitor_id = %id, "monitor created");
        Ok(MonitorWithCredential {
            monitor: Monitor {
                id,
                ip: monitor.ip,
                port: monitor.port,
                plugin_id: monitor.plugin_id.clone(),
                credential_profile_id: monitor.credential_profile_id,
                discovery_profile_id: monitor.discovery_profile_id,
                polling_interval_seconds: monitor.polling_interval_or_default(),
                status: MonitorStatus::Active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            credential_ciphertext: ciphertext_row.get::<String>(0)?,
            credential_protocol: parse_protocol(&ciphertext_row.get::<String>(1)?)?,
        })
    }

    #[instrument(skip(self))]
    async fn update_monitor_status(&self, id: Uuid, status: MonitorStatus) -> Result<(), StorageError> {
        let connection = self.client.get_connection()?;
        connection
            .execute(
                "UPDATE monitors SET status = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![monitor_status_str(status), id.to_string()],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_discovery_run_status(
        &self,
        id: Uuid,
        status: DiscoveryRunStatus,
        devices_found: u32,
    ) -> Result<(), StorageError> {
        let connection = self.client.get_connection()?;
        connection
            .execute(
                "UPDATE discovery_profiles
                 SET last_run_status = ?1, devices_discovered = ?2, last_run_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?3",
                params![discovery_run_status_str(status), devices_found as i64, id.to_string()],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn insert_metric_samples(&self, samples: &[MetricSample]) -> Result<usize, StorageError> {
        if samples.is_empty() {
            return Ok(0);
        }

        let connection = self.client.get_connection()?;
        let transaction = connection
            .transaction()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        let sql = "INSERT INTO metrics (monitor_id, timestamp, name, value, type) VALUES (?1, ?2, ?3, ?4, ?5)";
        for sample in samples {
            transaction
                .execute(
                    sql,
                    params![
                        sample.monitor_id.to_string(),
                        sample.timestamp.to_rfc3339(),
                        sample.name.clone(),
                        sample.value,
                        metric_type_str(sample.sample_type),
                    ],
                )
                .await?;
        }

        transaction.commit().await.map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn in_memory_gateway() -> LibsqlGateway {
        let client = StorageClient::connect("file::memory:?cache=shared", None).await.unwrap();
        LibsqlGateway::new(client)
    }

    async fn seed_credential(gateway: &LibsqlGateway) -> Uuid {
        let connection = gateway.client.get_connection().unwrap();
        let id = Uuid::new_v4();
        connection
            .execute(
                "INSERT INTO credential_profiles (id, name, protocol, payload_ciphertext) VALUES (?1, 'seed', 'ssh', 'cipher')",
                params![id.to_string()],
            )
            .await
            .unwrap();
        id
    }

    async fn seed_discovery_profile(gateway: &LibsqlGateway, credential_id: Uuid) -> Uuid {
        let connection = gateway.client.get_connection().unwrap();
        let id = Uuid::new_v4();
        connection
            .execute(
                "INSERT INTO discovery_profiles (id, name, target_ciphertext, port, handshake_timeout_ms, credential_profile_id)
                 VALUES (?1, 'seed', 'cipher', 22, 3000, ?2)",
                params![id.to_string(), credential_id.to_string()],
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn upsert_discovered_device_is_idempotent_per_unique_key() {
        let gateway = in_memory_gateway().await;
        let credential_id = seed_credential(&gateway).await;
        let profile_id = seed_discovery_profile(&gateway, credential_id).await;

        let new_device = NewDiscoveredDevice {
            discovery_profile_id: profile_id,
            ip: "10.0.0.1".parse().unwrap(),
            port: 22,
            status: DeviceStatus::Validated,
        };

        let first = gateway.upsert_discovered_device(&new_device).await.unwrap();
        let second = gateway.upsert_discovered_device(&new_device).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn create_monitor_returns_credential_ciphertext() {
        let gateway = in_memory_gateway().await;
        let credential_id = seed_credential(&gateway).await;
        let profile_id = seed_discovery_profile(&gateway, credential_id).await;

        let new_monitor = NewMonitor {
            ip: "10.0.0.1".parse().unwrap(),
            port: 22,
            plugin_id: "ssh-metrics".into(),
            credential_profile_id: credential_id,
            discovery_profile_id: profile_id,
            polling_interval_seconds: 60,
        };

        let created = gateway.create_monitor(&new_monitor).await.unwrap();
        assert_eq!(created.credential_ciphertext, "cipher");
        assert_eq!(created.credential_protocol, Protocol::Ssh);
        assert_eq!(created.monitor.status, MonitorStatus::Active);
    }

    #[tokio::test]
    async fn insert_metric_samples_reports_count_and_skips_on_empty() {
        let gateway = in_memory_gateway().await;
        assert_eq!(gateway.insert_metric_samples(&[]).await.unwrap(), 0);

        let sample = MetricSample {
            monitor_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            name: "system.cpu.usage".into(),
            value: 12.5,
            sample_type: MetricType::Gauge,
        };
        assert_eq!(gateway.insert_metric_samples(&[sample]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_discovery_run_status_persists_counts() {
        let gateway = in_memory_gateway().await;
        let credential_id = seed_credential(&gateway).await;
        let profile_id = seed_discovery_profile(&gateway, credential_id).await;

        gateway
            .update_discovery_run_status(profile_id, DiscoveryRunStatus::Partial, 3)
            .await
            .unwrap();

        let loaded = gateway.load_discovery_profile(profile_id).await.unwrap().unwrap();
        assert_eq!(loaded.last_run_status, Some(DiscoveryRunStatus::Partial));
        assert_eq!(loaded.devices_discovered, 3);
    }
}
