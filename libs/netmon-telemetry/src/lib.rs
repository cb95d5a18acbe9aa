// [libs/netmon-telemetry/src/lib.rs]
/*!
 * =================================================================
 * APARATO: NETMON TELEMETRY OBSERVER
 * RESPONSABILIDAD: GESTIÓN DE TELEMETRÍA, TRAZADO Y CAPTURA DE PÁNICOS
 * =================================================================
 *
 * Every daemon (discovery worker, scheduler, batch writer) is spawned
 * on its own tokio task. A panic inside one must not silently vanish,
 * so the global panic hook below routes it through `tracing` at error
 * level before the task unwinds.
 */

use futures_util::FutureExt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

/// Initializes the global tracing subscriber and panic hook for `service_name`.
///
/// In debug builds this emits compact, colorized lines; in release builds
/// it emits flattened JSON suitable for ingestion by a log pipeline. The
/// filter defaults to `{service_name}=debug` (or `=info` in release) plus
/// quieter levels for the noisier dependency crates, and can be overridden
/// entirely via `RUST_LOG`.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
#[instrument(skip_all)]
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={level},tower_http=warn,hyper=warn,libsql=error",
            service_name,
            level = if cfg!(debug_assertions) { "debug" } else { "info" }
        )
        .into()
    });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    }

    let service_id = service_name.to_string();
    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");

        error!(
            target: "panic_monitor",
            service = %service_id,
            location = %location,
            "task panicked: {}",
            payload
        );
    }));

    info!("telemetry initialized for [{}]", service_name);
}

/// Runs `future` to completion, catching a panic at this task boundary
/// instead of letting it take down whatever spawned it. Intended for the
/// body of a `tokio::spawn` call — one misbehaving monitor batch or
/// discovery run must not kill the tick loop or the process.
pub async fn supervise<F>(task_name: &'static str, future: F)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
        let payload = panic
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        error!(target: "panic_monitor", task = task_name, "supervised task panicked: {}", payload);
    }
}
