use dbp_task_system::WorkTicket;

use std::{
	fmt,
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::{
	engine::{Device, EngineError, ErrorCode, PatchTarget, Patcher},
	error::Error,
};

/// Task identifier, handed out by [`TaskRegistry`](crate::TaskRegistry) and never reused.
pub type TaskId = u64;

/// Bumped on every QUEUED to PENDING transition, so a worker can tell whether the submission
/// it was given is still the current one.
pub type SubmissionId = u64;

/// Lifecycle of a patch task.
///
/// `Queued -> Pending -> InProgress -> {Completed, Cancelled}`, plus `Pending -> Queued` when
/// a task is cancelled before any worker starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchFileState {
	Queued,
	Pending,
	InProgress,
	Completed,
	Cancelled,
}

impl PatchFileState {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Cancelled)
	}
}

impl fmt::Display for PatchFileState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Queued => "QUEUED",
			Self::Pending => "PENDING",
			Self::InProgress => "IN_PROGRESS",
			Self::Completed => "COMPLETED",
			Self::Cancelled => "CANCELLED",
		})
	}
}

/// Input parameters, only mutable while the task is [`PatchFileState::Queued`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchParams {
	pub patcher_id: String,
	pub path: PathBuf,
	pub device: Device,
	pub rom_id: String,
}

impl PatchParams {
	#[must_use]
	pub fn target(&self) -> PatchTarget {
		PatchTarget {
			path: self.path.clone(),
			device: self.device.clone(),
			rom_id: self.rom_id.clone(),
		}
	}
}

/// Live progress, as last reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
	pub details: Option<String>,
	pub bytes: i64,
	pub max_bytes: i64,
	pub files: i64,
	pub max_files: i64,
}

/// Completion results, written once when the task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
	pub success: bool,
	pub error_code: ErrorCode,
	pub output_path: Option<PathBuf>,
}

impl PatchOutcome {
	#[must_use]
	pub const fn failed(error_code: ErrorCode) -> Self {
		Self {
			success: false,
			error_code,
			output_path: None,
		}
	}
}

impl From<&EngineError> for PatchOutcome {
	fn from(e: &EngineError) -> Self {
		Self::failed(e.code)
	}
}

/// Every attribute of a task, read under a single lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
	pub id: TaskId,
	pub params: PatchParams,
	pub state: PatchFileState,
	pub cancelled: bool,
	pub progress: Progress,
	pub outcome: Option<PatchOutcome>,
}

/// What a cancel request resulted in.
#[derive(Debug)]
pub enum CancelRequest {
	/// The task never started and is queued again. Carries the pool ticket to revoke, if the
	/// submission got that far.
	Withdrawn(Option<WorkTicket>),
	/// The task is running, its flag is set and the engine was asked to stop.
	Signalled,
	/// Nothing to cancel in this state.
	Ignored(PatchFileState),
}

pub(crate) enum Start {
	Run(PatchParams),
	Stale,
}

#[derive(Debug)]
struct TaskData {
	params: PatchParams,
	state: PatchFileState,
	cancelled: bool,
	progress: Progress,
	outcome: Option<PatchOutcome>,
	submission: SubmissionId,
	ticket: Option<WorkTicket>,
}

pub struct PatchFileTask {
	id: TaskId,
	data: RwLock<TaskData>,
	executed: AtomicBool,
	patcher: Mutex<Option<Arc<dyn Patcher>>>,
}

impl fmt::Debug for PatchFileTask {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let has_patcher = self.patcher.lock().is_some();
		let data = self.data.read();

		f.debug_struct("PatchFileTask")
			.field("id", &self.id)
			.field("data", &*data)
			.field("executed", &self.executed.load(Ordering::Relaxed))
			.field("has_patcher", &has_patcher)
			.finish()
	}
}

impl PatchFileTask {
	#[must_use]
	pub fn new(id: TaskId, params: PatchParams) -> Self {
		Self {
			id,
			data: RwLock::new(TaskData {
				params,
				state: PatchFileState::Queued,
				cancelled: false,
				progress: Progress::default(),
				outcome: None,
				submission: 0,
				ticket: None,
			}),
			executed: AtomicBool::new(false),
			patcher: Mutex::new(None),
		}
	}

	#[must_use]
	pub const fn id(&self) -> TaskId {
		self.id
	}

	#[must_use]
	pub fn snapshot(&self) -> TaskSnapshot {
		let data = self.data.read();

		TaskSnapshot {
			id: self.id,
			params: data.params.clone(),
			state: data.state,
			cancelled: data.cancelled,
			progress: data.progress.clone(),
			outcome: data.outcome.clone(),
		}
	}

	#[must_use]
	pub fn state(&self) -> PatchFileState {
		self.data.read().state
	}

	#[must_use]
	pub fn params(&self) -> PatchParams {
		self.data.read().params.clone()
	}

	#[must_use]
	pub fn progress(&self) -> Progress {
		self.data.read().progress.clone()
	}

	#[must_use]
	pub fn outcome(&self) -> Option<PatchOutcome> {
		self.data.read().outcome.clone()
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.data.read().cancelled
	}

	#[must_use]
	pub fn has_executed(&self) -> bool {
		self.executed.load(Ordering::Acquire)
	}

	fn update_params(&self, update: impl FnOnce(&mut PatchParams)) -> Result<(), Error> {
		let mut data = self.data.write();

		if data.state != PatchFileState::Queued {
			return Err(Error::NotQueued {
				id: self.id,
				state: data.state,
			});
		}

		update(&mut data.params);

		Ok(())
	}

	pub fn set_patcher_id(&self, patcher_id: impl Into<String>) -> Result<(), Error> {
		let patcher_id = patcher_id.into();
		self.update_params(|params| params.patcher_id = patcher_id)
	}

	pub fn set_path(&self, path: impl Into<PathBuf>) -> Result<(), Error> {
		let path = path.into();
		self.update_params(|params| params.path = path)
	}

	pub fn set_device(&self, device: Device) -> Result<(), Error> {
		self.update_params(|params| params.device = device)
	}

	pub fn set_rom_id(&self, rom_id: impl Into<String>) -> Result<(), Error> {
		let rom_id = rom_id.into();
		self.update_params(|params| params.rom_id = rom_id)
	}

	/// QUEUED -> PENDING, returning the new submission number.
	pub(crate) fn mark_pending(&self) -> Result<SubmissionId, Error> {
		let mut data = self.data.write();

		if data.state != PatchFileState::Queued {
			return Err(Error::InvalidTransition {
				id: self.id,
				from: data.state,
				to: PatchFileState::Pending,
			});
		}

		data.state = PatchFileState::Pending;
		data.submission += 1;
		data.ticket = None;

		trace!(task_id = %self.id, submission = data.submission, "Task is pending");

		Ok(data.submission)
	}

	/// Keeps the pool ticket around so a later cancel can revoke it.
	///
	/// Returns `false` if the submission was already withdrawn or picked up, in which case the
	/// ticket is of no use to the task anymore.
	pub(crate) fn attach_ticket(&self, submission: SubmissionId, ticket: WorkTicket) -> bool {
		let mut data = self.data.write();

		if data.submission == submission && data.state == PatchFileState::Pending {
			data.ticket = Some(ticket);
			true
		} else {
			false
		}
	}

	/// Undoes [`Self::mark_pending`] when the pool refused the submission.
	pub(crate) fn revert_submission(&self, submission: SubmissionId) {
		let mut data = self.data.write();

		if data.submission == submission && data.state == PatchFileState::Pending {
			data.state = PatchFileState::Queued;
			data.ticket = None;
		}
	}

	/// Requests cancellation according to the current state.
	///
	/// A PENDING task is withdrawn back to QUEUED with its cancellation flag left unset, unlike
	/// a running one where the flag is raised before the engine is asked to stop. The flag is
	/// never cleared, so a withdrawn task that is started again finishes as not cancelled.
	pub fn cancel(&self) -> CancelRequest {
		let mut data = self.data.write();

		match data.state {
			PatchFileState::Pending => {
				// Never started, so it can be submitted again later
				data.state = PatchFileState::Queued;
				trace!(task_id = %self.id, "Pending task withdrawn back to queued");
				CancelRequest::Withdrawn(data.ticket.take())
			}

			PatchFileState::InProgress => {
				data.cancelled = true;
				drop(data);

				if let Some(patcher) = &*self.patcher.lock() {
					patcher.cancel();
				}

				trace!(task_id = %self.id, "Running task flagged as cancelled");
				CancelRequest::Signalled
			}

			state => CancelRequest::Ignored(state),
		}
	}

	/// PENDING -> IN_PROGRESS, consuming the single execution attempt.
	pub(crate) fn begin_execution(&self, submission: SubmissionId) -> Result<Start, Error> {
		let mut data = self.data.write();

		if self.executed.load(Ordering::Acquire) {
			return Err(Error::AlreadyExecuted(self.id));
		}

		if data.submission != submission || data.state != PatchFileState::Pending {
			trace!(
				task_id = %self.id,
				%submission,
				current_submission = data.submission,
				state = %data.state,
				"Submission is not current anymore"
			);
			return Ok(Start::Stale);
		}

		self.executed.store(true, Ordering::Release);
		data.state = PatchFileState::InProgress;
		data.ticket = None;

		Ok(Start::Run(data.params.clone()))
	}

	/// IN_PROGRESS -> CANCELLED or COMPLETED, storing the results.
	///
	/// Returns whether the task was cancelled. The engine's own success flag is kept as is.
	pub(crate) fn finish(&self, outcome: PatchOutcome) -> Result<bool, Error> {
		let mut data = self.data.write();

		let to = if data.cancelled {
			PatchFileState::Cancelled
		} else {
			PatchFileState::Completed
		};

		if data.state != PatchFileState::InProgress || data.outcome.is_some() {
			return Err(Error::InvalidTransition {
				id: self.id,
				from: data.state,
				to,
			});
		}

		data.outcome = Some(outcome);
		data.state = to;

		trace!(task_id = %self.id, state = %to, "Task finished");

		Ok(data.cancelled)
	}

	fn update_progress(&self, update: impl FnOnce(&mut Progress)) -> bool {
		let mut data = self.data.write();

		if data.state == PatchFileState::InProgress {
			update(&mut data.progress);
			true
		} else {
			warn!(task_id = %self.id, state = %data.state, "Ignoring progress for a task that isn't running");
			false
		}
	}

	pub(crate) fn update_details(&self, details: &str) -> bool {
		self.update_progress(|progress| progress.details = Some(details.to_owned()))
	}

	pub(crate) fn update_bytes(&self, bytes: i64, max_bytes: i64) -> bool {
		self.update_progress(|progress| {
			progress.bytes = bytes;
			progress.max_bytes = max_bytes;
		})
	}

	pub(crate) fn update_files(&self, files: i64, max_files: i64) -> bool {
		self.update_progress(|progress| {
			progress.files = files;
			progress.max_files = max_files;
		})
	}

	/// Makes the handle reachable from [`Self::cancel`], forwarding a cancel that arrived
	/// before the handle existed.
	pub(crate) fn install_patcher(&self, patcher: Arc<dyn Patcher>) {
		let mut slot = self.patcher.lock();

		if self.data.read().cancelled {
			patcher.cancel();
		}

		*slot = Some(patcher);
	}

	/// Takes the handle out and destroys it, under the same lock [`Self::cancel`] uses.
	pub(crate) fn release_patcher(&self) -> Option<Result<(), EngineError>> {
		let mut slot = self.patcher.lock();

		slot.take().map(|patcher| patcher.destroy())
	}
}
