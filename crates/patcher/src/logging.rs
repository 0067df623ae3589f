use std::env;

use tracing_subscriber::{filter::ParseError, fmt, prelude::*, EnvFilter};

use super::{config::PatcherConfig, error::Error};

/// Builds the filter, `env_override` winning over the configured directive when it's set.
pub fn env_filter(directive: &str, env_override: Option<&str>) -> Result<EnvFilter, ParseError> {
	match env_override.filter(|value| !value.trim().is_empty()) {
		Some(value) => EnvFilter::try_new(value),
		None => EnvFilter::try_new(directive),
	}
}

/// Installs the global subscriber: a registry with an [`EnvFilter`] and a `fmt` layer.
///
/// `RUST_LOG` takes precedence over `directive`. Fails if a global subscriber was already set.
pub fn init(directive: &str) -> Result<(), Error> {
	let from_env = env::var(EnvFilter::DEFAULT_ENV).ok();
	let filter = env_filter(directive, from_env.as_deref())?;

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_target(true).with_thread_ids(true))
		.try_init()?;

	tracing::info!("Logging initialized");

	Ok(())
}

/// [`init`] with the directive from a loaded [`PatcherConfig`], meant to be called once at
/// startup before the [`PatcherContext`](crate::PatcherContext) is built.
pub fn init_from_config(config: &PatcherConfig) -> Result<(), Error> {
	init(&config.log_filter)
}
