// [libs/netmon-protocol/src/metric.rs]
//! A single time-series sample, the unit the Batch Writer bulk-inserts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Gauge,
    Counter,
    Derive,
}

impl Default for MetricType {
    fn default() -> Self {
        MetricType::Gauge
    }
}

/// Dimensionality lives entirely in `name` (a dotted path, e.g.
/// `system.cpu.usage`) — there is no tag map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub monitor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub sample_type: MetricType,
}
