use std::{
	collections::{hash_map::Entry, HashMap},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use parking_lot::RwLock;
use tracing::trace;

use super::{
	error::Error,
	task::{PatchFileTask, TaskId},
};

/// Table of every patch task known to the process, plus the id counter.
///
/// Nothing here is persisted: a process restart loses every entry.
#[derive(Debug, Default)]
pub struct TaskRegistry {
	tasks: RwLock<HashMap<TaskId, Arc<PatchFileTask>>>,
	next_id: AtomicU64,
}

impl TaskRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Issues a fresh id, never handed out before.
	pub fn next_id(&self) -> TaskId {
		self.next_id.fetch_add(1, Ordering::Relaxed)
	}

	pub fn create(&self, task: Arc<PatchFileTask>) -> Result<(), Error> {
		let id = task.id();

		match self.tasks.write().entry(id) {
			Entry::Occupied(_) => Err(Error::DuplicateTask(id)),
			Entry::Vacant(entry) => {
				entry.insert(task);
				trace!(task_id = %id, "Task registered");
				Ok(())
			}
		}
	}

	#[must_use]
	pub fn get(&self, id: TaskId) -> Option<Arc<PatchFileTask>> {
		self.tasks.read().get(&id).cloned()
	}

	pub fn remove(&self, id: TaskId) -> Option<Arc<PatchFileTask>> {
		let removed = self.tasks.write().remove(&id);

		if removed.is_some() {
			trace!(task_id = %id, "Task unregistered");
		}

		removed
	}

	/// Snapshot of the registered ids, in no particular order.
	#[must_use]
	pub fn list_ids(&self) -> Vec<TaskId> {
		self.tasks.read().keys().copied().collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.tasks.read().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.tasks.read().is_empty()
	}
}
