//! Shared tracing/observability bootstrap for every Sentinel process.
//!
//! Each binary and long-running daemon calls [`init_tracing`] once, at
//! startup, before doing anything else that might log or panic.

use std::panic;

use tracing::{error, info, instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

/// Initializes the global `tracing` subscriber and installs a panic hook
/// that reports unwinds through the same pipeline as ordinary logs.
///
/// `RUST_LOG` takes precedence when set; otherwise `service_name` gets a
/// sensible per-service default (`debug` in debug builds, `info` in
/// release), with noisy infrastructure crates quieted to `warn`/`error`.
///
/// Debug builds get a compact, human-oriented formatter. Release builds
/// emit flattened JSON, suitable for ingestion by a log pipeline.
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

    install_panic_hook(service_name);

    info!("telemetry initialized for {}", service_name);
}

/// Routes panics in any thread (including spawned daemons) through
/// `tracing::error!` before the default hook unwinds the process, so a
/// panic in a background task is never silent.
fn install_panic_hook(service_name: &str) {
    let service = service_name.to_string();

    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<no panic message>");

        error!(
            target: "panic",
            service = %service,
            location = %location,
            "thread panicked: {}",
            payload
        );
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_panic_hook_does_not_panic_itself() {
        install_panic_hook("test-service");
        let _ = panic::take_hook();
    }
}
