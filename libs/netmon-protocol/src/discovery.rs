// [libs/netmon-protocol/src/discovery.rs]
//! Discovery profile — the operator-facing configuration for one
//! expand-and-validate run over a target expression.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryRunStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryProfile {
    pub id: Uuid,
    pub name: String,
    /// Ciphertext of the target expression (single address / range / CIDR).
    pub target_ciphertext: String,
    pub port: u16,
    pub handshake_timeout_ms: u64,
    pub credential_profile_id: Uuid,
    pub auto_provision: bool,
    pub auto_run: bool,
    pub last_run_status: Option<DiscoveryRunStatus>,
    pub devices_discovered: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
