//!
//! # Patcher
//!
//! Tracks "patch this file" jobs from creation to completion on top of
//! [`dbp_task_system`] lanes.
//!
//! A task is created QUEUED, may be reconfigured until it is started, then runs exactly once
//! on the `patching` lane through an external [`PatcherEngine`]. Progress and lifecycle
//! changes are fanned out to every [`PatcherEventListener`] subscribed to the service that is
//! currently attached to the [`PatcherContext`].
//!
//! Cancellation is cooperative: a task that hasn't started yet goes back to QUEUED, a running
//! one only asks the engine to stop and still sends [`PatcherEvent::Finished`].
//!
//! Nothing is persisted, every task is lost with the process.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod config;
pub mod logging;

mod context;
mod coordinator;
mod engine;
mod error;
mod events;
mod registry;
mod service;
mod task;

pub use config::{ConfigError, PatcherConfig};
pub use context::{PatcherContext, DEFAULT_LANE, PATCHING_LANE};
pub use coordinator::UNKNOWN_ERROR;
pub use engine::{
	Device, EngineError, ErrorCode, Initializer, PatchTarget, Patcher, PatcherEngine, ProgressSink,
};
pub use error::Error;
pub use events::{EventBus, ListenerHandle, PatcherEvent, PatcherEventListener};
pub use registry::TaskRegistry;
pub use service::PatcherService;
pub use task::{
	CancelRequest, PatchFileState, PatchFileTask, PatchOutcome, PatchParams, Progress,
	SubmissionId, TaskId, TaskSnapshot,
};
