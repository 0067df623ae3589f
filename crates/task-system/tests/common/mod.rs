use dbp_task_system::WorkUnit;

use async_channel as chan;
use tracing::info;

/// Reports its label as soon as it runs.
#[derive(Debug)]
pub struct SignalUnit {
	label: &'static str,
	done_tx: chan::Sender<&'static str>,
}

impl SignalUnit {
	pub const fn new(label: &'static str, done_tx: chan::Sender<&'static str>) -> Self {
		Self { label, done_tx }
	}
}

impl WorkUnit for SignalUnit {
	fn name(&self) -> &str {
		self.label
	}

	fn run(self: Box<Self>) {
		info!(label = self.label, "SignalUnit running");
		let _ = self.done_tx.send_blocking(self.label);
	}
}

/// Holds its worker until the returned release sender fires or gets dropped.
#[derive(Debug)]
pub struct BlockingUnit {
	began_tx: chan::Sender<()>,
	release_rx: chan::Receiver<()>,
}

impl BlockingUnit {
	pub fn new() -> (Self, chan::Receiver<()>, chan::Sender<()>) {
		let (began_tx, began_rx) = chan::bounded(1);
		let (release_tx, release_rx) = chan::bounded(1);

		(
			Self {
				began_tx,
				release_rx,
			},
			began_rx,
			release_tx,
		)
	}
}

impl WorkUnit for BlockingUnit {
	fn name(&self) -> &str {
		"blocking"
	}

	fn run(self: Box<Self>) {
		let _ = self.began_tx.send_blocking(());
		let _ = self.release_rx.recv_blocking();
	}
}

#[derive(Debug)]
pub struct PanicUnit;

impl WorkUnit for PanicUnit {
	fn name(&self) -> &str {
		"panic"
	}

	fn run(self: Box<Self>) {
		panic!("PanicUnit always panics");
	}
}
