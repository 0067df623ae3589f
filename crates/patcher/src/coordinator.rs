use dbp_task_system::WorkUnit;

use std::{
	fmt,
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, error, instrument, trace, warn};

use super::{
	context::HostSlot,
	engine::{
		EngineError, ErrorCode, Initializer, PatchTarget, Patcher, PatcherEngine, ProgressSink,
	},
	error::Error,
	events::PatcherEvent,
	task::{PatchFileTask, PatchOutcome, PatchParams, Start, SubmissionId},
};

/// Reported when the engine panicked before it could tell us its own error code.
pub const UNKNOWN_ERROR: ErrorCode = -1;

/// Runs the initialization step until it succeeds once, then never again.
pub(crate) struct Readiness {
	initializer: Arc<dyn Initializer>,
	ready: Mutex<bool>,
}

impl fmt::Debug for Readiness {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Readiness")
			.field("ready", &*self.ready.lock())
			.finish_non_exhaustive()
	}
}

impl Readiness {
	pub(crate) fn new(initializer: Arc<dyn Initializer>) -> Self {
		Self {
			initializer,
			ready: Mutex::new(false),
		}
	}

	/// Concurrent callers wait for whoever is initializing instead of initializing twice.
	pub(crate) fn ensure_ready(&self) -> Result<(), EngineError> {
		let mut ready = self.ready.lock();

		if !*ready {
			self.initializer.ensure_ready()?;
			*ready = true;
			debug!("Patcher data is ready");
		}

		Ok(())
	}

	pub(crate) fn is_ready(&self) -> bool {
		*self.ready.lock()
	}
}

/// Relays engine callbacks into the task's progress and out to the current host.
struct TaskProgressSink<'a> {
	task: &'a PatchFileTask,
	host: &'a HostSlot,
}

impl ProgressSink for TaskProgressSink<'_> {
	fn on_details_updated(&self, details: &str) {
		if self.task.update_details(details) {
			self.host.publish(&PatcherEvent::DetailsUpdated {
				task_id: self.task.id(),
				details: details.to_owned(),
			});
		}
	}

	fn on_bytes_updated(&self, bytes: i64, max_bytes: i64) {
		if self.task.update_bytes(bytes, max_bytes) {
			self.host.publish(&PatcherEvent::BytesProgress {
				task_id: self.task.id(),
				bytes,
				max_bytes,
			});
		}
	}

	fn on_files_updated(&self, files: i64, max_files: i64) {
		if self.task.update_files(files, max_files) {
			self.host.publish(&PatcherEvent::FilesProgress {
				task_id: self.task.id(),
				files,
				max_files,
			});
		}
	}
}

/// Destroys the installed patcher handle on every way out of [`PatchCoordinator::drive`].
struct ReleaseGuard<'a> {
	task: &'a PatchFileTask,
}

impl Drop for ReleaseGuard<'_> {
	fn drop(&mut self) {
		// Runs while the outcome is already decided, a panic here must not replace it
		match panic::catch_unwind(AssertUnwindSafe(|| self.task.release_patcher())) {
			Ok(Some(Err(e))) => error!(task_id = %self.task.id(), ?e, "Failed to destroy patcher"),
			Ok(Some(Ok(()))) => trace!(task_id = %self.task.id(), "Patcher destroyed"),
			Ok(None) => {}
			Err(_) => error!(task_id = %self.task.id(), "Patcher panicked while being destroyed"),
		}
	}
}

pub(crate) struct PatchCoordinator {
	engine: Arc<dyn PatcherEngine>,
	readiness: Arc<Readiness>,
	host: Arc<HostSlot>,
}

impl fmt::Debug for PatchCoordinator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PatchCoordinator")
			.field("readiness", &self.readiness)
			.field("host", &self.host)
			.finish_non_exhaustive()
	}
}

impl PatchCoordinator {
	pub(crate) fn new(
		engine: Arc<dyn PatcherEngine>,
		readiness: Arc<Readiness>,
		host: Arc<HostSlot>,
	) -> Self {
		Self {
			engine,
			readiness,
			host,
		}
	}

	/// Drives a pending task to a terminal state.
	///
	/// Returns `Ok(None)` without touching the task if this submission was withdrawn in the
	/// meantime. Engine failures end up in the returned outcome, never in the error.
	#[instrument(skip(self, task), fields(task_id = %task.id()))]
	pub(crate) fn execute(
		&self,
		task: &PatchFileTask,
		submission: SubmissionId,
	) -> Result<Option<PatchOutcome>, Error> {
		let params = match task.begin_execution(submission)? {
			Start::Run(params) => params,
			Start::Stale => {
				debug!("Submission was withdrawn, skipping");
				return Ok(None);
			}
		};

		let task_id = task.id();

		self.host.publish(&PatcherEvent::Started { task_id });

		let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive(task, &params)))
			.unwrap_or_else(|_| {
				error!("Patching panicked before the patcher was driven");
				PatchOutcome::failed(UNKNOWN_ERROR)
			});

		let cancelled = task.finish(outcome.clone())?;

		self.host.publish(&PatcherEvent::Finished {
			task_id,
			cancelled,
			success: outcome.success,
			error_code: outcome.error_code,
			output_path: outcome.output_path.clone(),
		});

		debug!(
			cancelled,
			success = outcome.success,
			error_code = outcome.error_code,
			"Patching finished"
		);

		Ok(Some(outcome))
	}

	fn drive(&self, task: &PatchFileTask, params: &PatchParams) -> PatchOutcome {
		debug!(
			engine_version = %self.engine.version(),
			patcher_id = %params.patcher_id,
			path = %params.path.display(),
			device = %params.device.id,
			rom_id = %params.rom_id,
			"Patching file"
		);

		if let Err(e) = self.readiness.ensure_ready() {
			error!(?e, "Failed to prepare patcher data");
			return PatchOutcome::from(&e);
		}

		let patcher = match self.engine.create_patcher(&params.patcher_id) {
			Ok(patcher) => patcher,
			Err(e) => {
				error!(?e, patcher_id = %params.patcher_id, "Failed to create patcher");
				return PatchOutcome::from(&e);
			}
		};

		task.install_patcher(Arc::clone(&patcher));
		let _release = ReleaseGuard { task };

		let sink = TaskProgressSink {
			task,
			host: &self.host,
		};
		let target = params.target();

		panic::catch_unwind(AssertUnwindSafe(|| run_patcher(&*patcher, &target, &sink)))
			.unwrap_or_else(|_| {
				error!("Patcher panicked");
				PatchOutcome::failed(
					panic::catch_unwind(AssertUnwindSafe(|| patcher.last_error()))
						.unwrap_or(UNKNOWN_ERROR),
				)
			})
	}
}

fn run_patcher(
	patcher: &dyn Patcher,
	target: &PatchTarget,
	sink: &dyn ProgressSink,
) -> PatchOutcome {
	if let Err(e) = patcher.set_target(target) {
		warn!(?e, path = %target.path.display(), "Patcher rejected the target");
		return PatchOutcome::from(&e);
	}

	let success = patcher.patch(sink);

	PatchOutcome {
		success,
		error_code: patcher.last_error(),
		output_path: patcher.output_path(),
	}
}

/// One submission of a task to the patching lane.
#[derive(Debug)]
pub(crate) struct PatchJob {
	task: Arc<PatchFileTask>,
	submission: SubmissionId,
	coordinator: Arc<PatchCoordinator>,
}

impl PatchJob {
	pub(crate) fn new(
		task: Arc<PatchFileTask>,
		submission: SubmissionId,
		coordinator: Arc<PatchCoordinator>,
	) -> Self {
		Self {
			task,
			submission,
			coordinator,
		}
	}
}

impl WorkUnit for PatchJob {
	fn name(&self) -> &str {
		"patch_file"
	}

	fn run(self: Box<Self>) {
		if let Err(e) = self.coordinator.execute(&self.task, self.submission) {
			error!(task_id = %self.task.id(), ?e, "Failed to execute patch task");
		}
	}
}
