// [libs/netmon-protocol/src/events.rs]
//! Payloads carried on the Event Plane's five typed channels.
//! See `netmon-events` for the channels themselves.

use crate::credential::{CredentialProfile, Protocol};
use crate::discovery::{DiscoveryProfile, DiscoveryRunStatus};
use crate::monitor::MonitorWithCredential;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DiscoveryRequestEvent {
    pub profile_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Identifies the plugin a validated device should ultimately be polled
/// with. When the registry has no binary for the protocol yet, a
/// placeholder carrying only the protocol name is synthesized so the
/// event can still reach the Provisioner — see Discovery Worker step 5.
#[derive(Debug, Clone)]
pub struct PluginRef {
    pub id: Option<String>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone)]
pub struct DeviceValidatedEvent {
    pub discovery_profile: DiscoveryProfile,
    pub credential_profile: CredentialProfile,
    pub plugin_info: PluginRef,
    pub ip: IpAddr,
    pub port: u16,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryStatusEvent {
    pub profile_id: Uuid,
    pub status: DiscoveryRunStatus,
    pub devices_found: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Sent from the API layer or the Provisioner to the Scheduler.
/// `Update` must be delivered with backpressure, never dropped.
#[derive(Debug, Clone)]
pub enum CacheInvalidate {
    Update(Vec<MonitorWithCredential>),
    Delete(Vec<Uuid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEventType {
    Down,
    Recovered,
}

#[derive(Debug, Clone)]
pub struct MonitorStateEvent {
    pub monitor_id: Uuid,
    pub ip: IpAddr,
    pub event_type: MonitorEventType,
    pub failures: u32,
    pub timestamp: DateTime<Utc>,
}
