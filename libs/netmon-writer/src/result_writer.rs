// [libs/netmon-writer/src/result_writer.rs]
//! Translates one plugin result's raw metric array into typed
//! `MetricSample`s. Each element is parsed independently — a malformed
//! element is dropped with a warning, never the whole batch.

use chrono::{DateTime, Utc};
use netmon_protocol::{MetricSample, PluginResult, RawMetric};
use tracing::warn;
use uuid::Uuid;

pub fn parse_plugin_result(monitor_id: Uuid, result: &PluginResult, batch_time: DateTime<Utc>) -> Vec<MetricSample> {
    let Some(raw_metrics) = &result.metrics else {
        return Vec::new();
    };

    let mut samples = Vec::with_capacity(raw_metrics.len());
    for raw in raw_metrics {
        match serde_json::from_value::<RawMetric>(raw.clone()) {
            Ok(metric) => {
                let timestamp = metric
                    .timestamp
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(batch_time);

                samples.push(MetricSample {
                    monitor_id,
                    timestamp,
                    name: metric.name,
                    value: metric.value,
                    sample_type: metric.sample_type.unwrap_or_default(),
                });
            }
            Err(err) => {
                warn!(error = %err, raw = %raw, "dropping malformed metric sample");
            }
        }
    }
    samples
}
