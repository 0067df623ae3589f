use dbp_task_system::TaskSystemError;

use thiserror::Error;

use super::{
	config::ConfigError,
	task::{PatchFileState, TaskId},
};

#[derive(Debug, Error)]
pub enum Error {
	#[error("task not found <id='{0}'>")]
	TaskNotFound(TaskId),
	#[error("task already registered <id='{0}'>")]
	DuplicateTask(TaskId),
	#[error("cannot change task properties in {state} state <id='{id}'>")]
	NotQueued { id: TaskId, state: PatchFileState },
	#[error("task has already been executed <id='{0}'>")]
	AlreadyExecuted(TaskId),
	#[error("invalid task transition from {from} to {to} <id='{id}'>")]
	InvalidTransition {
		id: TaskId,
		from: PatchFileState,
		to: PatchFileState,
	},

	#[error(transparent)]
	TaskSystem(#[from] TaskSystemError),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("invalid log filter: {0}")]
	LogFilter(#[from] tracing_subscriber::filter::ParseError),
	#[error("failed to install the global tracing subscriber: {0}")]
	Logging(#[from] tracing_subscriber::util::TryInitError),
}
