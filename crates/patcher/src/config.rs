//! On-disk settings for the patcher context.

use std::{
	fs, io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "patcher.json";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config I/O error: {source}; <path='{}'>", .path.display())]
	Io {
		path: Box<Path>,
		#[source]
		source: io::Error,
	},
	#[error("malformed config: {source}; <path='{}'>", .path.display())]
	Json {
		path: Box<Path>,
		#[source]
		source: serde_json::Error,
	},
}

impl ConfigError {
	fn io(path: &Path, source: io::Error) -> Self {
		Self::Io {
			path: path.into(),
			source,
		}
	}

	fn json(path: &Path, source: serde_json::Error) -> Self {
		Self::Json {
			path: path.into(),
			source,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
	/// Config schema version
	pub version: u32,

	/// Workers on the lane running the initialization job
	pub default_lane_threads: usize,

	/// Workers on the lane running patch jobs
	pub patching_lane_threads: usize,

	/// Filter directive used by [`logging::init_from_config`](crate::logging::init_from_config)
	/// when `RUST_LOG` isn't set
	pub log_filter: String,
}

impl Default for PatcherConfig {
	fn default() -> Self {
		Self {
			version: Self::CURRENT_VERSION,
			default_lane_threads: 2,
			patching_lane_threads: 2,
			log_filter: "info".to_string(),
		}
	}
}

impl PatcherConfig {
	pub const CURRENT_VERSION: u32 = 1;

	#[must_use]
	pub fn path_in(data_dir: impl AsRef<Path>) -> PathBuf {
		data_dir.as_ref().join(CONFIG_FILE_NAME)
	}

	/// Reads the config from `data_dir`, creating a default one if there is none yet.
	pub fn load_from(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let data_dir = data_dir.as_ref();
		let config_path = Self::path_in(data_dir);

		match fs::read_to_string(&config_path) {
			Ok(json) => {
				info!(path = %config_path.display(), "Loading config");

				let mut config = serde_json::from_str::<Self>(&json)
					.map_err(|e| ConfigError::json(&config_path, e))?;

				if config.version < Self::CURRENT_VERSION {
					info!(
						from = config.version,
						to = Self::CURRENT_VERSION,
						"Upgrading config schema"
					);
					config.version = Self::CURRENT_VERSION;
					config.save_to(data_dir)?;
				}

				Ok(config)
			}

			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(path = %config_path.display(), "No config found, creating default");
				let config = Self::default();
				config.save_to(data_dir)?;
				Ok(config)
			}

			Err(e) => Err(ConfigError::io(&config_path, e)),
		}
	}

	pub fn save_to(&self, data_dir: impl AsRef<Path>) -> Result<(), ConfigError> {
		let data_dir = data_dir.as_ref();
		fs::create_dir_all(data_dir).map_err(|e| ConfigError::io(data_dir, e))?;

		let config_path = Self::path_in(data_dir);
		let json =
			serde_json::to_string_pretty(self).map_err(|e| ConfigError::json(&config_path, e))?;

		fs::write(&config_path, json).map_err(|e| ConfigError::io(&config_path, e))?;
		info!(path = %config_path.display(), "Saved config");

		Ok(())
	}
}
