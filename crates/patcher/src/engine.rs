//! Contracts for the native side: the patcher engine that transforms files, and the one-time
//! initialization that prepares its data.

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw error code as reported by the engine. Its meaning is owned by the engine.
pub type ErrorCode = i32;

/// A failure reported by the engine or the initialization step.
///
/// This is data carried into a task's results, not a failure of the task machinery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error <code={code}>: {message}")]
pub struct EngineError {
	pub code: ErrorCode,
	pub message: String,
}

impl EngineError {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}
}

/// Target device descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
	pub id: String,
	#[serde(default)]
	pub codenames: Vec<String>,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub architecture: String,
}

impl Device {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}
}

/// Everything a patcher handle needs to know about the file it is about to patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
	pub path: PathBuf,
	pub device: Device,
	pub rom_id: String,
}

impl PatchTarget {
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// Receives progress while [`Patcher::patch`] runs.
///
/// Make no assumptions about current and maximum values: current may exceed maximum and
/// either may be negative.
pub trait ProgressSink: Send + Sync {
	fn on_details_updated(&self, details: &str);

	fn on_bytes_updated(&self, bytes: i64, max_bytes: i64);

	fn on_files_updated(&self, files: i64, max_files: i64);
}

/// A handle to one engine-side patcher instance.
///
/// [`Patcher::cancel`] is called from another thread while [`Patcher::patch`] is still
/// running, implementations must allow that interleaving. Whether and when patching actually
/// stops after a cancel is up to the implementation.
pub trait Patcher: Send + Sync {
	fn set_target(&self, target: &PatchTarget) -> Result<(), EngineError>;

	/// Blocks until patching is done, returning whether it succeeded.
	fn patch(&self, sink: &dyn ProgressSink) -> bool;

	fn cancel(&self);

	fn last_error(&self) -> ErrorCode;

	fn output_path(&self) -> Option<PathBuf>;

	/// Releases engine-side resources, called exactly once after patching.
	fn destroy(&self) -> Result<(), EngineError>;
}

pub trait PatcherEngine: Send + Sync + 'static {
	fn version(&self) -> String;

	fn create_patcher(&self, patcher_id: &str) -> Result<Arc<dyn Patcher>, EngineError>;
}

/// Prepares the data the engine needs, e.g. by extracting its archive.
///
/// Must be safe to call concurrently and more than once.
pub trait Initializer: Send + Sync + 'static {
	fn ensure_ready(&self) -> Result<(), EngineError>;
}
