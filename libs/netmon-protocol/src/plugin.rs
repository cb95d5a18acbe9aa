// [libs/netmon-protocol/src/plugin.rs]
//! Wire contract between the core and an out-of-process plugin binary.
//!
//! Stdin carries one JSON array of [`PluginTask`]; stdout carries one
//! JSON array of [`PluginResult`] on EOF. Nothing else crosses that
//! boundary — see `netmon-plugin` for the process that speaks it.

use crate::metric::MetricType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub protocol: String,
    #[serde(rename = "default_port")]
    pub default_port: u16,
    #[serde(rename = "timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginTask {
    pub request_id: String,
    pub target: String,
    pub port: u16,
    /// Plaintext, protocol-specific credential fields. Never logged.
    pub credentials: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PluginResultStatus {
    Success,
    Failed,
}

/// Shape the Result Writer expects a metrics array element to deserialize
/// into. `metrics` on [`PluginResult`] is kept as raw [`Value`]s rather
/// than `Vec<RawMetric>` so one malformed element fails only its own
/// `serde_json::from_value` call, not the whole result's deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMetric {
    pub name: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub sample_type: Option<MetricType>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResult {
    pub request_id: String,
    pub status: PluginResultStatus,
    pub metrics: Option<Vec<Value>>,
    pub error: Option<String>,
}
