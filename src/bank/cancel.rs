use tokio::sync::watch;

/// Cancels the operations holding the paired [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

impl CancelHandle {
	pub fn cancel(&self) {
		self.tx.send_replace(true);
	}
}

/// Checked by the engine before each suspension point
#[derive(Debug, Clone)]
pub struct CancelSignal {
	rx: watch::Receiver<bool>,
}

impl CancelSignal {
	/// A signal that never fires
	pub fn never() -> Self {
		let (_, rx) = watch::channel(false);
		CancelSignal { rx }
	}

	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle { tx }, CancelSignal { rx })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancel_reaches_every_clone() {
		let (handle, signal) = cancellation();
		let other = signal.clone();
		assert!(!signal.is_cancelled());

		handle.cancel();
		assert!(signal.is_cancelled());
		assert!(other.is_cancelled());
	}

	#[test]
	fn never_fires() {
		assert!(!CancelSignal::never().is_cancelled());
	}
}
