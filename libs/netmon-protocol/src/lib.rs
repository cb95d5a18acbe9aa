//! Shared domain types and wire contracts for the Netmon monitoring core.
//!
//! Every type here is a plain serde DTO: the protocol crate owns no
//! behavior, only the shapes that cross a component boundary (event
//! plane, plugin stdin/stdout, persistence gateway).

pub mod credential;
pub mod discovery;
pub mod device;
pub mod monitor;
pub mod metric;
pub mod plugin;
pub mod events;

pub use credential::{CredentialProfile, Protocol, TypedCredential};
pub use discovery::{DiscoveryProfile, DiscoveryRunStatus};
pub use device::{DeviceStatus, DiscoveredDevice, NewDiscoveredDevice};
pub use monitor::{Monitor, MonitorStatus, MonitorWithCredential, NewMonitor};
pub use metric::{MetricSample, MetricType};
pub use plugin::{PluginManifest, PluginResult, PluginResultStatus, PluginTask, RawMetric};
pub use events::{
    CacheInvalidate, DeviceValidatedEvent, DiscoveryRequestEvent, DiscoveryStatusEvent,
    MonitorEventType, MonitorStateEvent, PluginRef,
};
