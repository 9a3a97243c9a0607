//! Tracing setup for embedding applications

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting this crate to
/// `info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> anyhow::Result<bool> {
    let filter = EnvFilter::from_default_env().add_directive("heartwave_node=info".parse()?);
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok())
}
