// [libs/netmon-protocol/src/device.rs]
//! A device that answered a handshake during discovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Validated,
    Provisioned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: Uuid,
    pub discovery_profile_id: Uuid,
    pub ip: IpAddr,
    pub port: u16,
    pub status: DeviceStatus,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload. Uniqueness key is `(discovery_profile_id, ip, port)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDiscoveredDevice {
    pub discovery_profile_id: Uuid,
    pub ip: IpAddr,
    pub port: u16,
    pub status: DeviceStatus,
}
