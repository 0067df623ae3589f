use dbp_task_system::FnWorkUnit;

use std::{path::PathBuf, sync::Arc};

use tracing::{debug, error, instrument, trace};

use super::{
	context::{PatcherContext, DEFAULT_LANE, PATCHING_LANE},
	coordinator::PatchJob,
	engine::{Device, ErrorCode},
	error::Error,
	events::{EventBus, ListenerHandle, PatcherEvent},
	task::{CancelRequest, PatchFileState, PatchFileTask, PatchParams, TaskId, TaskSnapshot},
};

/// The host-facing surface: create, configure, start, observe and cancel patch tasks.
///
/// A service owns its subscribers. Attaching a new service to the same context takes over
/// event delivery for every task, including those already running.
#[derive(Debug)]
pub struct PatcherService {
	context: Arc<PatcherContext>,
	bus: Arc<EventBus>,
}

impl PatcherService {
	#[must_use]
	pub fn attach(context: Arc<PatcherContext>) -> Self {
		let bus = Arc::new(EventBus::new());
		context.host().attach(&bus);

		debug!(tasks = context.registry().len(), "Service attached");

		Self { context, bus }
	}

	#[must_use]
	pub const fn context(&self) -> &Arc<PatcherContext> {
		&self.context
	}

	pub fn subscribe(&self, listener: ListenerHandle) {
		self.bus.subscribe(listener);
	}

	pub fn unsubscribe(&self, listener: &ListenerHandle) -> bool {
		self.bus.unsubscribe(listener)
	}

	/// Runs the initialization step in the background, then publishes
	/// [`PatcherEvent::Initialized`]. Patch jobs wait for it on their own, so calling this is
	/// only needed to learn when the engine becomes ready.
	pub fn initialize_patcher(&self) -> Result<(), Error> {
		let readiness = Arc::clone(self.context.readiness());
		let host = Arc::clone(self.context.host());

		self.context.pool().submit(
			DEFAULT_LANE,
			FnWorkUnit::new("initialize_patcher", move || {
				match readiness.ensure_ready() {
					Ok(()) => host.publish(&PatcherEvent::Initialized),
					Err(e) => error!(?e, "Failed to initialize patcher"),
				}
			}),
		)?;

		Ok(())
	}

	#[must_use]
	pub fn patch_file_task_ids(&self) -> Vec<TaskId> {
		self.context.registry().list_ids()
	}

	pub fn add_patch_file_task(
		&self,
		patcher_id: impl Into<String>,
		path: impl Into<PathBuf>,
		device: Device,
		rom_id: impl Into<String>,
	) -> Result<TaskId, Error> {
		let registry = self.context.registry();
		let id = registry.next_id();

		registry.create(Arc::new(PatchFileTask::new(
			id,
			PatchParams {
				patcher_id: patcher_id.into(),
				path: path.into(),
				device,
				rom_id: rom_id.into(),
			},
		)))?;

		debug!(task_id = %id, "Patch task added");

		Ok(id)
	}

	/// Cancels the task, then forgets it. Returns whether it existed.
	///
	/// A job that is already running keeps its own reference and still finishes.
	pub fn remove_patch_file_task(&self, id: TaskId) -> bool {
		if let Some(task) = self.context.registry().get(id) {
			self.cancel_task(&task);
		}

		self.context.registry().remove(id).is_some()
	}

	#[instrument(skip(self), err)]
	pub fn start_patching(&self, id: TaskId) -> Result<(), Error> {
		let task = self.task(id)?;
		let submission = task.mark_pending()?;

		let job = PatchJob::new(
			Arc::clone(&task),
			submission,
			Arc::clone(self.context.coordinator()),
		);

		match self.context.pool().submit(PATCHING_LANE, job) {
			Ok(ticket) => {
				if !task.attach_ticket(submission, ticket.clone()) {
					// Withdrawn or already picked up while we were submitting
					self.context.pool().cancel(PATCHING_LANE, &ticket)?;
				}
				Ok(())
			}
			Err(e) => {
				task.revert_submission(submission);
				Err(e.into())
			}
		}
	}

	/// Requests cancellation. Wait for [`PatcherEvent::Finished`] to learn the real outcome of
	/// a task that was already running.
	pub fn cancel_patching(&self, id: TaskId) -> Result<(), Error> {
		let task = self.task(id)?;
		self.cancel_task(&task);
		Ok(())
	}

	fn cancel_task(&self, task: &PatchFileTask) {
		match task.cancel() {
			CancelRequest::Withdrawn(Some(ticket)) => {
				match self.context.pool().cancel(PATCHING_LANE, &ticket) {
					Ok(revoked) => trace!(task_id = %task.id(), revoked, "Submission withdrawn"),
					Err(e) => error!(task_id = %task.id(), ?e, "Failed to revoke submission"),
				}
			}
			CancelRequest::Withdrawn(None) | CancelRequest::Signalled => {}
			CancelRequest::Ignored(state) => {
				trace!(task_id = %task.id(), %state, "Nothing to cancel");
			}
		}
	}

	fn task(&self, id: TaskId) -> Result<Arc<PatchFileTask>, Error> {
		self.context
			.registry()
			.get(id)
			.ok_or(Error::TaskNotFound(id))
	}

	fn with_task<T>(&self, id: TaskId, f: impl FnOnce(&PatchFileTask) -> T) -> Result<T, Error> {
		self.task(id).map(|task| f(&task))
	}

	pub fn set_patcher_id(&self, id: TaskId, patcher_id: impl Into<String>) -> Result<(), Error> {
		self.task(id)?.set_patcher_id(patcher_id)
	}

	pub fn set_path(&self, id: TaskId, path: impl Into<PathBuf>) -> Result<(), Error> {
		self.task(id)?.set_path(path)
	}

	pub fn set_device(&self, id: TaskId, device: Device) -> Result<(), Error> {
		self.task(id)?.set_device(device)
	}

	pub fn set_rom_id(&self, id: TaskId, rom_id: impl Into<String>) -> Result<(), Error> {
		self.task(id)?.set_rom_id(rom_id)
	}

	/// Every attribute of the task, read consistently.
	pub fn snapshot(&self, id: TaskId) -> Result<TaskSnapshot, Error> {
		self.with_task(id, PatchFileTask::snapshot)
	}

	pub fn patcher_id(&self, id: TaskId) -> Result<String, Error> {
		self.with_task(id, |task| task.params().patcher_id)
	}

	pub fn path(&self, id: TaskId) -> Result<PathBuf, Error> {
		self.with_task(id, |task| task.params().path)
	}

	pub fn device(&self, id: TaskId) -> Result<Device, Error> {
		self.with_task(id, |task| task.params().device)
	}

	pub fn rom_id(&self, id: TaskId) -> Result<String, Error> {
		self.with_task(id, |task| task.params().rom_id)
	}

	pub fn state(&self, id: TaskId) -> Result<PatchFileState, Error> {
		self.with_task(id, PatchFileTask::state)
	}

	pub fn is_cancelled(&self, id: TaskId) -> Result<bool, Error> {
		self.with_task(id, PatchFileTask::is_cancelled)
	}

	pub fn details(&self, id: TaskId) -> Result<Option<String>, Error> {
		self.with_task(id, |task| task.progress().details)
	}

	pub fn current_bytes(&self, id: TaskId) -> Result<i64, Error> {
		self.with_task(id, |task| task.progress().bytes)
	}

	pub fn maximum_bytes(&self, id: TaskId) -> Result<i64, Error> {
		self.with_task(id, |task| task.progress().max_bytes)
	}

	pub fn current_files(&self, id: TaskId) -> Result<i64, Error> {
		self.with_task(id, |task| task.progress().files)
	}

	pub fn maximum_files(&self, id: TaskId) -> Result<i64, Error> {
		self.with_task(id, |task| task.progress().max_files)
	}

	/// `false` until the task finished.
	pub fn is_successful(&self, id: TaskId) -> Result<bool, Error> {
		self.with_task(id, |task| task.outcome().is_some_and(|outcome| outcome.success))
	}

	/// `0` until the task finished.
	pub fn error_code(&self, id: TaskId) -> Result<ErrorCode, Error> {
		self.with_task(id, |task| task.outcome().map_or(0, |outcome| outcome.error_code))
	}

	/// Where the patched file was written, once the task finished.
	pub fn new_path(&self, id: TaskId) -> Result<Option<PathBuf>, Error> {
		self.with_task(id, |task| task.outcome().and_then(|outcome| outcome.output_path))
	}
}
