use std::{
	fmt,
	panic::{self, AssertUnwindSafe},
	path::PathBuf,
	sync::Arc,
};

use parking_lot::RwLock;
use tracing::{error, trace, warn};

use super::{engine::ErrorCode, task::TaskId};

/// Lifecycle and progress notifications fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatcherEvent {
	/// The shared initialization step completed.
	Initialized,
	DetailsUpdated {
		task_id: TaskId,
		details: String,
	},
	/// No ordering between `bytes` and `max_bytes` is guaranteed, nor that they're positive.
	BytesProgress {
		task_id: TaskId,
		bytes: i64,
		max_bytes: i64,
	},
	/// Same caveats as [`PatcherEvent::BytesProgress`].
	FilesProgress {
		task_id: TaskId,
		files: i64,
		max_files: i64,
	},
	Started {
		task_id: TaskId,
	},
	/// `cancelled` and `success` are independent, a cancelled run may still report success.
	Finished {
		task_id: TaskId,
		cancelled: bool,
		success: bool,
		error_code: ErrorCode,
		output_path: Option<PathBuf>,
	},
}

impl PatcherEvent {
	#[must_use]
	pub const fn task_id(&self) -> Option<TaskId> {
		match self {
			Self::Initialized => None,
			Self::DetailsUpdated { task_id, .. }
			| Self::BytesProgress { task_id, .. }
			| Self::FilesProgress { task_id, .. }
			| Self::Started { task_id }
			| Self::Finished { task_id, .. } => Some(*task_id),
		}
	}
}

/// An observer of [`PatcherEvent`]s.
///
/// Called synchronously on whatever thread published the event, usually a patching worker,
/// so implementations must not block.
pub trait PatcherEventListener: Send + Sync {
	fn on_event(&self, event: &PatcherEvent);
}

pub type ListenerHandle = Arc<dyn PatcherEventListener>;

fn same_listener(a: &ListenerHandle, b: &ListenerHandle) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Ordered set of listeners. The same handle may be subscribed more than once.
#[derive(Default)]
pub struct EventBus {
	listeners: RwLock<Vec<ListenerHandle>>,
}

impl fmt::Debug for EventBus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventBus")
			.field("listeners", &self.listeners.read().len())
			.finish()
	}
}

impl EventBus {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&self, listener: ListenerHandle) {
		self.listeners.write().push(listener);
	}

	/// Removes the first registration of this handle, returning whether there was one.
	pub fn unsubscribe(&self, listener: &ListenerHandle) -> bool {
		let mut listeners = self.listeners.write();

		if let Some(idx) = listeners
			.iter()
			.position(|subscribed| same_listener(subscribed, listener))
		{
			listeners.remove(idx);
			true
		} else {
			warn!("Listener was never subscribed");
			false
		}
	}

	/// Delivers the event to every listener present when the read lock was taken.
	///
	/// Publishers don't exclude each other, only subscribe and unsubscribe wait for them. A
	/// listener that panics is logged and skipped, the remaining ones still get the event.
	pub fn publish(&self, event: &PatcherEvent) {
		// Recursive read so a listener that publishes from its callback can't deadlock
		// against a waiting writer
		let listeners = self.listeners.read_recursive();

		trace!(?event, listeners = listeners.len(), "Publishing event");

		for (idx, listener) in listeners.iter().enumerate() {
			if panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
				error!(listener = idx, ?event, "Listener panicked while handling event");
			}
		}
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.listeners.read().len()
	}
}
