use dbp_task_system::WorkerPool;

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use super::{
	config::PatcherConfig,
	coordinator::{PatchCoordinator, Readiness},
	engine::{Initializer, PatcherEngine},
	error::Error,
	events::{EventBus, PatcherEvent},
	registry::TaskRegistry,
};

/// Lane for the one-time initialization job.
pub const DEFAULT_LANE: &str = "default";

/// Lane for patch jobs.
pub const PATCHING_LANE: &str = "patching";

/// Points at the event bus of whichever service is currently attached.
///
/// Only a weak reference is held, a task never keeps a detached service alive.
#[derive(Debug, Default)]
pub(crate) struct HostSlot {
	bus: RwLock<Weak<EventBus>>,
}

impl HostSlot {
	pub(crate) fn attach(&self, bus: &Arc<EventBus>) {
		*self.bus.write() = Arc::downgrade(bus);
	}

	pub(crate) fn current(&self) -> Option<Arc<EventBus>> {
		self.bus.read().upgrade()
	}

	pub(crate) fn publish(&self, event: &PatcherEvent) {
		if let Some(bus) = self.current() {
			bus.publish(event);
		} else {
			trace!(?event, "No service attached, dropping event");
		}
	}
}

/// State that outlives any single [`PatcherService`](crate::PatcherService).
///
/// Build it once at startup and hand it to every service that gets attached. Dropping it, or
/// a process restart, loses every task.
#[derive(Debug)]
pub struct PatcherContext {
	config: PatcherConfig,
	registry: TaskRegistry,
	pool: WorkerPool,
	readiness: Arc<Readiness>,
	host: Arc<HostSlot>,
	coordinator: Arc<PatchCoordinator>,
}

impl PatcherContext {
	/// Must be called from within a tokio runtime, the pool's workers are spawned on it.
	pub fn new(
		config: PatcherConfig,
		engine: Arc<dyn PatcherEngine>,
		initializer: Arc<dyn Initializer>,
	) -> Result<Arc<Self>, Error> {
		let pool = WorkerPool::new()?;
		pool.add_lane(DEFAULT_LANE, config.default_lane_threads)?;
		pool.add_lane(PATCHING_LANE, config.patching_lane_threads)?;

		let readiness = Arc::new(Readiness::new(initializer));
		let host = Arc::new(HostSlot::default());
		let coordinator = Arc::new(PatchCoordinator::new(
			engine,
			Arc::clone(&readiness),
			Arc::clone(&host),
		));

		info!(
			default_lane_threads = config.default_lane_threads,
			patching_lane_threads = config.patching_lane_threads,
			"Patcher context created"
		);

		Ok(Arc::new(Self {
			config,
			registry: TaskRegistry::new(),
			pool,
			readiness,
			host,
			coordinator,
		}))
	}

	#[must_use]
	pub const fn config(&self) -> &PatcherConfig {
		&self.config
	}

	#[must_use]
	pub const fn registry(&self) -> &TaskRegistry {
		&self.registry
	}

	#[must_use]
	pub const fn pool(&self) -> &WorkerPool {
		&self.pool
	}

	/// Whether the initialization step has completed.
	#[must_use]
	pub fn is_ready(&self) -> bool {
		self.readiness.is_ready()
	}

	pub(crate) const fn readiness(&self) -> &Arc<Readiness> {
		&self.readiness
	}

	pub(crate) const fn host(&self) -> &Arc<HostSlot> {
		&self.host
	}

	pub(crate) const fn coordinator(&self) -> &Arc<PatchCoordinator> {
		&self.coordinator
	}

	/// Revokes queued jobs and waits for running ones. Tasks they leave behind stay readable.
	pub async fn shutdown(&self) {
		debug!(tasks = self.registry.len(), "Shutting down patcher context");
		self.pool.shutdown().await;
	}
}
