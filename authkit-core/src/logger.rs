//! Logging initialization.
//!
//! The crate logs through the `log` facade. Embedders that want structured
//! output call [`init_logging`] once at process start; hosts with their own
//! subscriber can skip it and bridge `log` themselves.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber and routes `log` records into it.
///
/// `default_directive` is used when `RUST_LOG` is unset, e.g.
/// `"authkit_core=debug"`. Calling this more than once is a no-op, as is
/// calling it in a process that already installed a global subscriber.
pub fn init_logging(default_directive: &str) {
    let directive = default_directive.to_string();
    INIT.call_once(move || {
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("log bridge already installed: {err}");
            return;
        }
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directive));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .finish();
        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("subscriber already installed: {err}");
        }
    });
}
