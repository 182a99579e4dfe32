//! Deferred work handed to the main flow
//!
//! Any thread may submit a job through a `DeferredSender`. Jobs only run when
//! the owner of the engine calls `SettingsEngine::run_deferred`.

use std::fmt;

use crate::engine::SettingsEngine;
use crate::prelude::*;

pub type DeferredJob = Box<dyn FnOnce(&mut SettingsEngine) -> StResult<()> + Send>;

#[derive(Clone)]
pub struct DeferredSender {
	tx: flume::Sender<DeferredJob>,
}

impl fmt::Debug for DeferredSender {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeferredSender").field("pending", &self.tx.len()).finish()
	}
}

impl DeferredSender {
	/// Queues a job. Fails once the engine has been dropped.
	pub fn submit<F>(&self, job: F) -> StResult<()>
	where
		F: FnOnce(&mut SettingsEngine) -> StResult<()> + Send + 'static,
	{
		self.tx.send(Box::new(job)).map_err(|_| Error::Internal("deferred queue is closed".into()))
	}

	pub fn pending(&self) -> usize {
		self.tx.len()
	}
}

pub(crate) struct DeferredQueue {
	tx: flume::Sender<DeferredJob>,
	rx: flume::Receiver<DeferredJob>,
}

impl fmt::Debug for DeferredQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeferredQueue").field("pending", &self.rx.len()).finish()
	}
}

impl DeferredQueue {
	pub(crate) fn new() -> Self {
		let (tx, rx) = flume::unbounded();
		Self { tx, rx }
	}

	pub(crate) fn sender(&self) -> DeferredSender {
		DeferredSender { tx: self.tx.clone() }
	}

	/// Takes the jobs queued so far. Jobs submitted while these run wait for the next drain.
	pub(crate) fn take_pending(&self) -> Vec<DeferredJob> {
		let pending = self.rx.len();
		self.rx.try_iter().take(pending).collect()
	}
}

// vim: ts=4
