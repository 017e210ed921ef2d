use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "info,photo_vault_lib=debug,tower_http=info";

/// Installs the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` overrides the default filter. Safe to call more than once.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        );

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("[photo-vault] Failed to set tracing subscriber: {}", e);
        }
    });
}
