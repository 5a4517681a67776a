//! Tracing subscriber setup for binaries embedding the gateway.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global fmt subscriber at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Returns `false` if a
/// global subscriber was already installed.
pub fn init_tracing(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).with_target(false).finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
