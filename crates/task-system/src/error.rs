use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("worker pool must be created from within a tokio runtime")]
	NoRuntime,
	#[error("lane already exists <name='{0}'>")]
	LaneAlreadyExists(String),
	#[error("lane must have at least one worker <name='{0}'>")]
	ZeroConcurrency(String),
	#[error("lane not found <name='{0}'>")]
	UnknownLane(String),
	#[error("worker pool was shutdown")]
	PoolShutdown,
}
