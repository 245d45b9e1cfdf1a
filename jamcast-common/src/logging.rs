//! Tracing initialization shared by the binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the fallback filter used when `RUST_LOG` is not set
///
/// Every listed target gets `level`, e.g. `jamcast_server=info,jamcast_common=info`.
pub fn default_directives(targets: &[&str], level: &str) -> String {
    targets
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize tracing with `RUST_LOG` taking precedence over the configured level
pub fn init_tracing(targets: &[&str], level: &str) {
    let fallback = default_directives(targets, level);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
