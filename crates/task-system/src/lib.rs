//!
//! # Task System
//!
//! A small pool of named lanes for running blocking units of work in the background.
//!
//! Each lane is configured once with a fixed number of workers. Submitting never blocks the
//! caller, the unit is queued and started by the first free worker of its lane. Lanes are
//! independent from each other, so a lane full of long running units never delays what is
//! queued on another one.
//!
//! Cancellation at this level only covers units that are still waiting: a queued unit can be
//! revoked through its [`WorkTicket`], a running one must observe cancellation by itself.
//!
//! ## Basic example
//!
//! ```
//! use dbp_task_system::{FnWorkUnit, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = WorkerPool::new().unwrap();
//!     pool.add_lane("default", 2).unwrap();
//!
//!     let (tx, rx) = async_channel::bounded(1);
//!
//!     pool.submit(
//!         "default",
//!         FnWorkUnit::new("hello", move || {
//!             tx.send_blocking("hello").unwrap();
//!         }),
//!     )
//!     .unwrap();
//!
//!     assert_eq!(rx.recv().await.unwrap(), "hello");
//!
//!     pool.shutdown().await;
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod system;
mod task;
mod worker;

pub use error::Error as TaskSystemError;
pub use system::WorkerPool;
pub use task::{FnWorkUnit, IntoWorkUnit, TicketId, TicketStatus, WorkTicket, WorkUnit};
