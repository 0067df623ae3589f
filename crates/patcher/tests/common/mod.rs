#![allow(dead_code)]

use dbp_patcher::{
	EngineError, ErrorCode, Initializer, PatchTarget, Patcher, PatcherEngine, PatcherEvent,
	PatcherEventListener, ProgressSink, TaskId,
};

use std::{
	collections::{HashMap, HashSet},
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use async_channel as chan;
use parking_lot::{Condvar, Mutex};
use tokio::time::timeout;
use tracing::info;

pub const WAIT: Duration = Duration::from_secs(5);

/// Error code reported by [`Script::Gated`] runs that were cancelled and gave up.
pub const CANCELLED_CODE: ErrorCode = 7;

/// How a patcher behaves for a given target path. Paths without a script behave like
/// `Immediate { success: true }`.
#[derive(Debug, Clone, Copy)]
pub enum Script {
	/// Reports some progress and returns right away.
	Immediate { success: bool, error_code: ErrorCode },
	/// Announces itself on [`ScriptedEngine::began`], then blocks until released (success) or
	/// cancelled (returns `on_cancel`).
	Gated { on_cancel: bool },
	/// Like `Gated` but only a release ends it, cancel is acknowledged and ignored.
	IgnoresCancel,
	/// Sets its error code, then panics inside `patch`.
	Panic { error_code: ErrorCode },
	/// Refuses the target.
	RejectTarget,
}

#[derive(Debug, Default)]
struct GateState {
	released: bool,
	cancelled: bool,
}

#[derive(Debug, Default)]
struct Gate {
	state: Mutex<GateState>,
	changed: Condvar,
}

impl Gate {
	fn release(&self) {
		self.state.lock().released = true;
		self.changed.notify_all();
	}

	fn cancel(&self) {
		self.state.lock().cancelled = true;
		self.changed.notify_all();
	}

	/// Returns whether it was released, as opposed to cancelled.
	fn wait(&self, honor_cancel: bool) -> bool {
		let mut state = self.state.lock();

		loop {
			if state.released {
				return true;
			}
			if honor_cancel && state.cancelled {
				return false;
			}
			self.changed.wait(&mut state);
		}
	}
}

#[derive(Debug, Default)]
struct Shared {
	scripts: Mutex<HashMap<PathBuf, (Script, Arc<Gate>)>>,
	fail_create: Mutex<HashSet<String>>,
	fail_destroy: AtomicBool,
	panic_on_destroy: AtomicBool,
	created: AtomicUsize,
	destroyed: AtomicUsize,
	cancel_calls: AtomicUsize,
	began: Mutex<Option<chan::Sender<PathBuf>>>,
}

impl Shared {
	fn script(&self, path: &Path) -> (Script, Arc<Gate>) {
		self.scripts.lock().get(path).cloned().unwrap_or_else(|| {
			(
				Script::Immediate {
					success: true,
					error_code: 0,
				},
				Arc::default(),
			)
		})
	}
}

#[derive(Debug)]
pub struct ScriptedEngine {
	shared: Arc<Shared>,
	began_rx: chan::Receiver<PathBuf>,
}

impl ScriptedEngine {
	pub fn new() -> Arc<Self> {
		let (began_tx, began_rx) = chan::unbounded();
		let shared = Arc::new(Shared::default());
		*shared.began.lock() = Some(began_tx);

		Arc::new(Self { shared, began_rx })
	}

	pub fn script(&self, path: impl Into<PathBuf>, script: Script) {
		self.shared
			.scripts
			.lock()
			.insert(path.into(), (script, Arc::default()));
	}

	pub fn release(&self, path: impl AsRef<Path>) {
		self.shared.script(path.as_ref()).1.release();
	}

	pub fn fail_create(&self, patcher_id: &str) {
		self.shared.fail_create.lock().insert(patcher_id.to_owned());
	}

	pub fn fail_destroy(&self) {
		self.shared.fail_destroy.store(true, Ordering::SeqCst);
	}

	pub fn panic_on_destroy(&self) {
		self.shared.panic_on_destroy.store(true, Ordering::SeqCst);
	}

	/// Waits for a gated patcher to start blocking, returning its path.
	pub async fn began(&self) -> PathBuf {
		recv(&self.began_rx).await
	}

	pub fn created(&self) -> usize {
		self.shared.created.load(Ordering::SeqCst)
	}

	pub fn destroyed(&self) -> usize {
		self.shared.destroyed.load(Ordering::SeqCst)
	}

	pub fn cancel_calls(&self) -> usize {
		self.shared.cancel_calls.load(Ordering::SeqCst)
	}
}

impl PatcherEngine for ScriptedEngine {
	fn version(&self) -> String {
		"9.3.0-test".to_string()
	}

	fn create_patcher(&self, patcher_id: &str) -> Result<Arc<dyn Patcher>, EngineError> {
		if self.shared.fail_create.lock().contains(patcher_id) {
			return Err(EngineError::new(3, format!("unknown patcher '{patcher_id}'")));
		}

		self.shared.created.fetch_add(1, Ordering::SeqCst);

		Ok(Arc::new(ScriptedPatcher {
			shared: Arc::clone(&self.shared),
			slot: Mutex::new(Slot::default()),
			last_error: AtomicI32::new(0),
		}))
	}
}

#[derive(Debug, Default)]
struct Slot {
	target: Option<(PatchTarget, Script, Arc<Gate>)>,
	cancelled: bool,
}

#[derive(Debug)]
struct ScriptedPatcher {
	shared: Arc<Shared>,
	slot: Mutex<Slot>,
	last_error: AtomicI32,
}

impl ScriptedPatcher {
	fn announce(&self, path: &Path) {
		if let Some(began_tx) = &*self.shared.began.lock() {
			let _ = began_tx.try_send(path.to_owned());
		}
	}
}

impl Patcher for ScriptedPatcher {
	fn set_target(&self, target: &PatchTarget) -> Result<(), EngineError> {
		let (script, gate) = self.shared.script(&target.path);

		if matches!(script, Script::RejectTarget) {
			return Err(EngineError::new(22, "not a flashable zip"));
		}

		let mut slot = self.slot.lock();
		if slot.cancelled {
			gate.cancel();
		}
		slot.target = Some((target.clone(), script, gate));

		Ok(())
	}

	fn patch(&self, sink: &dyn ProgressSink) -> bool {
		let Some((target, script, gate)) = self.slot.lock().target.clone() else {
			self.last_error.store(1, Ordering::SeqCst);
			return false;
		};

		info!(path = %target.path.display(), ?script, "Scripted patcher running");

		sink.on_details_updated("Patching system.img");
		// Current past maximum and negative values are both legal
		sink.on_bytes_updated(12, 10);
		sink.on_files_updated(-1, 3);

		match script {
			Script::Immediate {
				success,
				error_code,
			} => {
				self.last_error.store(error_code, Ordering::SeqCst);
				success
			}

			Script::Gated { on_cancel } => {
				self.announce(&target.path);
				if gate.wait(true) {
					true
				} else {
					if !on_cancel {
						self.last_error.store(CANCELLED_CODE, Ordering::SeqCst);
					}
					on_cancel
				}
			}

			Script::IgnoresCancel => {
				self.announce(&target.path);
				gate.wait(false)
			}

			Script::Panic { error_code } => {
				self.last_error.store(error_code, Ordering::SeqCst);
				panic!("scripted engine panic");
			}

			Script::RejectTarget => unreachable!("rejected in set_target"),
		}
	}

	fn cancel(&self) {
		self.shared.cancel_calls.fetch_add(1, Ordering::SeqCst);

		let mut slot = self.slot.lock();
		slot.cancelled = true;
		if let Some((_, _, gate)) = &slot.target {
			gate.cancel();
		}
	}

	fn last_error(&self) -> ErrorCode {
		self.last_error.load(Ordering::SeqCst)
	}

	fn output_path(&self) -> Option<PathBuf> {
		self.slot.lock().target.as_ref().map(|(target, _, _)| {
			let mut name = target.path.file_stem().unwrap_or_default().to_os_string();
			name.push(format!("_{}.zip", target.rom_id));
			target.path.with_file_name(name)
		})
	}

	fn destroy(&self) -> Result<(), EngineError> {
		self.shared.destroyed.fetch_add(1, Ordering::SeqCst);

		if self.shared.panic_on_destroy.load(Ordering::SeqCst) {
			panic!("scripted destroy panic");
		}

		if self.shared.fail_destroy.load(Ordering::SeqCst) {
			Err(EngineError::new(99, "native handle leaked"))
		} else {
			Ok(())
		}
	}
}

#[derive(Debug, Default)]
pub struct CountingInitializer {
	calls: AtomicUsize,
	failing: AtomicBool,
}

impl CountingInitializer {
	pub fn new() -> Arc<Self> {
		Arc::default()
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl Initializer for CountingInitializer {
	fn ensure_ready(&self) -> Result<(), EngineError> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		if self.failing.load(Ordering::SeqCst) {
			Err(EngineError::new(4, "patcher archive missing"))
		} else {
			Ok(())
		}
	}
}

/// Blocks in `ensure_ready` until released, announcing on [`GatedInitializer::entered`]
/// first.
#[derive(Debug)]
pub struct GatedInitializer {
	released: Mutex<bool>,
	changed: Condvar,
	entered_tx: chan::Sender<()>,
	entered_rx: chan::Receiver<()>,
}

impl GatedInitializer {
	pub fn new() -> Arc<Self> {
		let (entered_tx, entered_rx) = chan::unbounded();

		Arc::new(Self {
			released: Mutex::new(false),
			changed: Condvar::new(),
			entered_tx,
			entered_rx,
		})
	}

	pub async fn entered(&self) {
		recv(&self.entered_rx).await;
	}

	pub fn release(&self) {
		*self.released.lock() = true;
		self.changed.notify_all();
	}
}

impl Initializer for GatedInitializer {
	fn ensure_ready(&self) -> Result<(), EngineError> {
		let _ = self.entered_tx.try_send(());

		let mut released = self.released.lock();
		while !*released {
			self.changed.wait(&mut released);
		}

		Ok(())
	}
}

/// Panics on lifecycle events and byte progress.
#[derive(Debug, Default)]
pub struct PanickingListener;

impl PatcherEventListener for PanickingListener {
	fn on_event(&self, event: &PatcherEvent) {
		if matches!(
			event,
			PatcherEvent::Started { .. }
				| PatcherEvent::BytesProgress { .. }
				| PatcherEvent::Finished { .. }
		) {
			panic!("listener bug");
		}
	}
}

/// Forwards every event it sees into a channel.
#[derive(Debug)]
pub struct EventRecorder {
	events_tx: chan::Sender<PatcherEvent>,
}

impl EventRecorder {
	pub fn new() -> (Arc<Self>, chan::Receiver<PatcherEvent>) {
		let (events_tx, events_rx) = chan::unbounded();
		(Arc::new(Self { events_tx }), events_rx)
	}
}

impl PatcherEventListener for EventRecorder {
	fn on_event(&self, event: &PatcherEvent) {
		let _ = self.events_tx.try_send(event.clone());
	}
}

pub async fn recv<T>(rx: &chan::Receiver<T>) -> T {
	timeout(WAIT, rx.recv())
		.await
		.expect("timed out waiting on channel")
		.expect("channel closed")
}

/// Collects events until `task_id` finishes, returning everything seen on the way, the
/// finished event included.
pub async fn until_finished(
	rx: &chan::Receiver<PatcherEvent>,
	task_id: TaskId,
) -> Vec<PatcherEvent> {
	let mut seen = Vec::new();

	loop {
		let event = recv(rx).await;
		let done = matches!(event, PatcherEvent::Finished { task_id: id, .. } if id == task_id);
		seen.push(event);

		if done {
			return seen;
		}
	}
}

/// Only the events concerning `task_id`.
pub fn for_task(events: &[PatcherEvent], task_id: TaskId) -> Vec<PatcherEvent> {
	events
		.iter()
		.filter(|event| event.task_id() == Some(task_id))
		.cloned()
		.collect()
}
