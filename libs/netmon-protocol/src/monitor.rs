// [libs/netmon-protocol/src/monitor.rs]
//! A monitor — the persistent unit of work the Scheduler polls.

use crate::credential::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

pub const DEFAULT_POLLING_INTERVAL_SECONDS: u64 = 60;
pub const MIN_POLLING_INTERVAL_SECONDS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Active,
    Down,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub ip: IpAddr,
    pub port: u16,
    pub plugin_id: String,
    pub credential_profile_id: Uuid,
    pub discovery_profile_id: Uuid,
    pub polling_interval_seconds: u64,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitor {
    pub ip: IpAddr,
    pub port: u16,
    pub plugin_id: String,
    pub credential_profile_id: Uuid,
    pub discovery_profile_id: Uuid,
    pub polling_interval_seconds: u64,
}

impl NewMonitor {
    pub fn polling_interval_or_default(&self) -> u64 {
        self.polling_interval_seconds.max(MIN_POLLING_INTERVAL_SECONDS)
    }
}

/// The join row the Scheduler actually loads and caches: a monitor plus
/// the still-encrypted credential blob it will lazily decrypt, and the
/// protocol that blob decrypts into (carried alongside since the vault's
/// `decrypt_container` needs it and it isn't recoverable from the
/// ciphertext alone).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorWithCredential {
    pub monitor: Monitor,
    pub credential_ciphertext: String,
    pub credential_protocol: Protocol,
}
