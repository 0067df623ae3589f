use std::{
	fmt,
	sync::{
		atomic::{AtomicU8, Ordering},
		Arc,
	},
};

/// A unique identifier for a single submission to a [`WorkerPool`](crate::WorkerPool).
pub type TicketId = u64;

/// A unit of blocking work that runs exactly once on one of a lane's workers.
///
/// The pool never propagates what happens inside [`WorkUnit::run`] back to whoever submitted
/// it. Units that need to report success or failure must do it through their own channels.
/// A panicking unit is caught and logged by the worker, which keeps serving its lane.
pub trait WorkUnit: Send + 'static {
	/// Human readable name, only used for logging.
	fn name(&self) -> &str {
		"work_unit"
	}

	/// Runs the unit to completion on a blocking thread.
	fn run(self: Box<Self>);
}

impl fmt::Debug for Box<dyn WorkUnit> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<WorkUnit name='{}'>", self.name())
	}
}

/// A helper trait to convert any type that implements [`WorkUnit`] into a [`Box<dyn WorkUnit>`], boxing it.
pub trait IntoWorkUnit: Send {
	fn into_work_unit(self) -> Box<dyn WorkUnit>;
}

/// Blanket implementation for all types that implements [`WorkUnit`]
impl<T: WorkUnit> IntoWorkUnit for T {
	fn into_work_unit(self) -> Box<dyn WorkUnit> {
		Box::new(self)
	}
}

/// Adapts a named closure into a [`WorkUnit`].
pub struct FnWorkUnit<F> {
	name: String,
	f: F,
}

impl<F: FnOnce() + Send + 'static> FnWorkUnit<F> {
	pub fn new(name: impl Into<String>, f: F) -> Self {
		Self {
			name: name.into(),
			f,
		}
	}
}

impl<F: FnOnce() + Send + 'static> WorkUnit for FnWorkUnit<F> {
	fn name(&self) -> &str {
		&self.name
	}

	fn run(self: Box<Self>) {
		(self.f)();
	}
}

/// Where a submitted unit currently stands.
///
/// `Queued` can move to `Running` (a worker picked it up) or `Revoked` (cancelled before any
/// worker got to it). `Running` only moves to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TicketStatus {
	Queued = 0,
	Running = 1,
	Finished = 2,
	Revoked = 3,
}

impl TicketStatus {
	const fn from_u8(value: u8) -> Self {
		match value {
			0 => Self::Queued,
			1 => Self::Running,
			2 => Self::Finished,
			_ => Self::Revoked,
		}
	}
}

/// Returned by [`WorkerPool::submit`](crate::WorkerPool::submit), identifies one submission
/// and allows revoking it while it is still waiting for a worker.
#[derive(Debug, Clone)]
pub struct WorkTicket {
	id: TicketId,
	lane: Arc<str>,
	status: Arc<AtomicU8>,
}

impl WorkTicket {
	pub(crate) fn new(id: TicketId, lane: Arc<str>) -> Self {
		Self {
			id,
			lane,
			status: Arc::new(AtomicU8::new(TicketStatus::Queued as u8)),
		}
	}

	#[must_use]
	pub const fn id(&self) -> TicketId {
		self.id
	}

	#[must_use]
	pub fn lane(&self) -> &str {
		&self.lane
	}

	#[must_use]
	pub fn status(&self) -> TicketStatus {
		TicketStatus::from_u8(self.status.load(Ordering::Acquire))
	}

	#[must_use]
	pub fn is_finished(&self) -> bool {
		self.status() == TicketStatus::Finished
	}

	#[must_use]
	pub fn is_revoked(&self) -> bool {
		self.status() == TicketStatus::Revoked
	}

	fn transition(&self, from: TicketStatus, to: TicketStatus) -> bool {
		self.status
			.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	pub(crate) fn try_start(&self) -> bool {
		self.transition(TicketStatus::Queued, TicketStatus::Running)
	}

	pub(crate) fn try_revoke(&self) -> bool {
		self.transition(TicketStatus::Queued, TicketStatus::Revoked)
	}

	pub(crate) fn set_finished(&self) {
		self.status
			.store(TicketStatus::Finished as u8, Ordering::Release);
	}
}
