use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

use async_channel as chan;
use futures_concurrency::future::Join;
use parking_lot::Mutex;
use tokio::{
	runtime::Handle,
	task::{spawn_blocking, JoinHandle},
};
use tracing::{error, info, instrument, trace, warn, Instrument, Span};

use super::{
	error::Error,
	task::{WorkTicket, WorkUnit},
};

pub type WorkerId = usize;

#[derive(Debug)]
pub(crate) struct QueuedUnit {
	ticket: WorkTicket,
	unit: Box<dyn WorkUnit>,
}

/// A named queue served by a fixed number of workers.
#[derive(Debug)]
pub(crate) struct Lane {
	name: Arc<str>,
	concurrency: usize,
	queue_tx: chan::Sender<QueuedUnit>,
	queue_rx: chan::Receiver<QueuedUnit>,
	pending: Arc<AtomicUsize>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Lane {
	pub fn spawn(name: Arc<str>, concurrency: usize, runtime: &Handle) -> Self {
		let (queue_tx, queue_rx) = chan::unbounded();
		let pending = Arc::new(AtomicUsize::new(0));

		let workers = (0..concurrency)
			.map(|worker_id| {
				runtime.spawn(
					run(worker_id, queue_rx.clone(), Arc::clone(&pending)).instrument(
						tracing::trace_span!("lane_worker", lane = %name, worker_id),
					),
				)
			})
			.collect();

		Self {
			name,
			concurrency,
			queue_tx,
			queue_rx,
			pending,
			workers: Mutex::new(workers),
		}
	}

	pub const fn name(&self) -> &Arc<str> {
		&self.name
	}

	pub const fn concurrency(&self) -> usize {
		self.concurrency
	}

	pub fn pending(&self) -> usize {
		self.pending.load(Ordering::Acquire)
	}

	pub fn enqueue(&self, ticket: WorkTicket, unit: Box<dyn WorkUnit>) -> Result<(), Error> {
		// Counted before sending so a fast worker never decrements below zero
		self.pending.fetch_add(1, Ordering::AcqRel);

		self.queue_tx
			.try_send(QueuedUnit { ticket, unit })
			.map_err(|_| {
				self.pending.fetch_sub(1, Ordering::AcqRel);
				Error::PoolShutdown
			})
	}

	pub fn revoke(&self, ticket: &WorkTicket) -> bool {
		if ticket.try_revoke() {
			self.pending.fetch_sub(1, Ordering::AcqRel);
			trace!(lane = %self.name, ticket_id = ticket.id(), "Revoked queued work unit");
			true
		} else {
			trace!(
				lane = %self.name,
				ticket_id = ticket.id(),
				status = ?ticket.status(),
				"Work unit is not queued anymore, nothing to revoke"
			);
			false
		}
	}

	#[instrument(skip(self), fields(lane = %self.name))]
	pub async fn shutdown(&self) {
		self.queue_tx.close();

		while let Ok(QueuedUnit { ticket, unit }) = self.queue_rx.try_recv() {
			if self.revoke(&ticket) {
				trace!(name = unit.name(), "Dropping work unit that never started");
			}
		}

		let workers = std::mem::take(&mut *self.workers.lock());

		workers
			.into_iter()
			.map(|handle| async move {
				if let Err(e) = handle.await {
					if e.is_panic() {
						error!("Lane worker critically failed: {e:#?}");
					}
				}
			})
			.collect::<Vec<_>>()
			.join()
			.await;

		info!("Lane gracefully shutdown");
	}
}

async fn run(worker_id: WorkerId, queue_rx: chan::Receiver<QueuedUnit>, pending: Arc<AtomicUsize>) {
	trace!("Lane worker starting...");

	while let Ok(QueuedUnit { ticket, unit }) = queue_rx.recv().await {
		if !ticket.try_start() {
			trace!(ticket_id = ticket.id(), "Skipping revoked work unit");
			continue;
		}

		pending.fetch_sub(1, Ordering::AcqRel);

		let name = unit.name().to_owned();
		trace!(%worker_id, ticket_id = ticket.id(), %name, "Running work unit");

		let span = Span::current();

		if let Err(e) = spawn_blocking(move || span.in_scope(|| unit.run())).await {
			if e.is_panic() {
				error!(ticket_id = ticket.id(), %name, "Work unit panicked: {e:#?}");
			} else {
				warn!(ticket_id = ticket.id(), %name, "Work unit was cancelled by the runtime");
			}
		}

		ticket.set_finished();
	}

	trace!("Lane queue closed, worker exiting");
}
