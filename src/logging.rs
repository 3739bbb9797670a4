//! `tracing` subscriber setup for embedders.

use crate::config::PreviewConfig;
use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber. `RUST_LOG` takes precedence over
/// `default_filter`. Does nothing if a global subscriber is already set.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// [`init`] with the filter configured in `log_filter`.
pub fn init_from(config: &PreviewConfig) {
    init(&config.log_filter);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("debug");
        init("not a [valid filter");
        tracing::info!("logging initialised twice without panicking");
    }

    #[test]
    fn init_from_uses_configured_filter() {
        let config = PreviewConfig::from_toml_str("log_filter = \"zerobuild_preview=debug\"").unwrap();
        assert_eq!(config.log_filter, "zerobuild_preview=debug");
        init_from(&config);
        init_from(&PreviewConfig::default());
    }
}
