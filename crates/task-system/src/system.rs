use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc,
	},
};

use futures_concurrency::future::Join;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, instrument, trace, warn};

use super::{
	error::Error,
	task::{IntoWorkUnit, WorkTicket},
	worker::Lane,
};

/// A fixed set of named lanes, each one a bounded pool of workers.
///
/// Lanes are configured once with [`WorkerPool::add_lane`] and never resized. Units submitted
/// to the same lane start in submission order as workers become free, so with more than one
/// worker they may overlap and finish in any order.
#[derive(Debug)]
pub struct WorkerPool {
	runtime: Handle,
	lanes: RwLock<HashMap<Arc<str>, Arc<Lane>>>,
	next_ticket_id: AtomicU64,
	is_shutdown: AtomicBool,
}

impl WorkerPool {
	/// Creates a pool whose workers live on the tokio runtime we're currently running on.
	pub fn new() -> Result<Self, Error> {
		Handle::try_current()
			.map(Self::with_runtime)
			.map_err(|_| Error::NoRuntime)
	}

	#[must_use]
	pub fn with_runtime(runtime: Handle) -> Self {
		Self {
			runtime,
			lanes: RwLock::new(HashMap::with_capacity(2)),
			next_ticket_id: AtomicU64::new(0),
			is_shutdown: AtomicBool::new(false),
		}
	}

	#[instrument(skip(self), err)]
	pub fn add_lane(&self, name: &str, concurrency: usize) -> Result<(), Error> {
		if concurrency == 0 {
			return Err(Error::ZeroConcurrency(name.to_owned()));
		}

		if self.is_shutdown.load(Ordering::Acquire) {
			return Err(Error::PoolShutdown);
		}

		let mut lanes = self.lanes.write();

		if lanes.contains_key(name) {
			return Err(Error::LaneAlreadyExists(name.to_owned()));
		}

		let name = Arc::<str>::from(name);

		lanes.insert(
			Arc::clone(&name),
			Arc::new(Lane::spawn(name, concurrency, &self.runtime)),
		);

		debug!("Lane added");

		Ok(())
	}

	/// Enqueues a unit on the given lane, never blocks.
	pub fn submit(&self, lane: &str, unit: impl IntoWorkUnit) -> Result<WorkTicket, Error> {
		let lane = self.lane(lane)?;

		let ticket = WorkTicket::new(
			self.next_ticket_id.fetch_add(1, Ordering::Relaxed),
			Arc::clone(lane.name()),
		);

		lane.enqueue(ticket.clone(), unit.into_work_unit())?;

		trace!(lane = %lane.name(), ticket_id = ticket.id(), "Work unit submitted");

		Ok(ticket)
	}

	/// Tries to take a unit out of its lane before a worker picks it up.
	///
	/// Returns `true` if the unit was still waiting and will now never run. Units that already
	/// started are left alone, they have to notice cancellation on their own.
	pub fn cancel(&self, lane: &str, ticket: &WorkTicket) -> Result<bool, Error> {
		let lane = self.lane(lane)?;

		if ticket.lane() != &**lane.name() {
			warn!(
				lane = %lane.name(),
				ticket_lane = ticket.lane(),
				ticket_id = ticket.id(),
				"Tried to cancel a work unit on a lane it was never submitted to"
			);
			return Ok(false);
		}

		Ok(lane.revoke(ticket))
	}

	/// How many units on this lane are still waiting for a worker.
	pub fn pending_count(&self, lane: &str) -> Result<usize, Error> {
		self.lane(lane).map(|lane| lane.pending())
	}

	pub fn concurrency(&self, lane: &str) -> Result<usize, Error> {
		self.lane(lane).map(|lane| lane.concurrency())
	}

	#[must_use]
	pub fn lane_names(&self) -> Vec<String> {
		self.lanes.read().keys().map(|name| name.to_string()).collect()
	}

	/// Closes every lane, revoking what is still queued, and waits for running units to finish.
	pub async fn shutdown(&self) {
		if self.is_shutdown.swap(true, Ordering::AcqRel) {
			warn!("Trying to shutdown the worker pool that was already shutdown");
			return;
		}

		let lanes = self.lanes.read().values().cloned().collect::<Vec<_>>();

		lanes
			.iter()
			.map(|lane| lane.shutdown())
			.collect::<Vec<_>>()
			.join()
			.await;
	}

	fn lane(&self, name: &str) -> Result<Arc<Lane>, Error> {
		self.lanes
			.read()
			.get(name)
			.cloned()
			.ok_or_else(|| Error::UnknownLane(name.to_owned()))
	}
}
