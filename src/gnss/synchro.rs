use serde::{Serialize, Deserialize};
use tokio::sync::watch;

/// Result of a successful acquisition as handed to the tracking stage.  Only the acquisition channel writes it, and
/// a published record is never modified; readers get their own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizationRecord {
	pub channel: usize,
	pub prn: usize,
	pub signal: String,
	pub acq_doppler_hz: f64,
	pub acq_delay_samples: usize,
	pub acq_samplestamp_samples: usize,
	pub peak_statistic: f64,
	pub threshold: f64,
	pub dwells_used: usize,
	pub acquired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOutcome {
	Acquired,
	NotAcquired,
}

/// Pushed once per terminal transition so a channel pool can reuse the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
	pub channel: usize,
	pub outcome: ChannelOutcome,
}

impl ChannelEvent {

	// Integer convention of the legacy channel queue
	pub fn code(&self) -> i32 { match self.outcome {
		ChannelOutcome::Acquired    => 1,
		ChannelOutcome::NotAcquired => 2,
	}}

}

pub type SynchroReceiver = watch::Receiver<Option<SynchronizationRecord>>;

/// Single-writer side of the acquisition-to-tracking handoff
pub struct SynchroHandoff {
	tx: watch::Sender<Option<SynchronizationRecord>>,
	rx: SynchroReceiver,
}

impl SynchroHandoff {

	pub fn new() -> Self {
		let (tx, rx) = watch::channel(None);
		Self { tx, rx }
	}

	pub fn subscribe(&self) -> SynchroReceiver { self.rx.clone() }

	pub fn latest(&self) -> Option<SynchronizationRecord> { self.rx.borrow().clone() }

	/// Replaces the published record as a whole; readers never see a partially written record
	pub fn publish(&self, record:SynchronizationRecord) -> Result<(), &'static str> {
		self.tx.broadcast(Some(record)).map_err(|_| "No receivers left for the synchronization record")
	}

}

impl Default for SynchroHandoff {
	fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(doppler:f64) -> SynchronizationRecord {
		SynchronizationRecord{ channel: 3, prn: 11, signal: "1B".to_string(), acq_doppler_hz: doppler, acq_delay_samples: 1000,
			acq_samplestamp_samples: 0, peak_statistic: 0.9, threshold: 0.02, dwells_used: 1, acquired: true }
	}

	#[test]
	fn readers_get_copies_of_latest_record() {
		let handoff = SynchroHandoff::new();
		let reader = handoff.subscribe();
		assert_eq!(*reader.borrow(), None);

		handoff.publish(record(2500.0)).unwrap();
		let copy = reader.borrow().clone().unwrap();
		assert_eq!(copy.acq_doppler_hz, 2500.0);

		handoff.publish(record(-500.0)).unwrap();
		assert_eq!(copy.acq_doppler_hz, 2500.0);
		assert_eq!(handoff.latest().unwrap().acq_doppler_hz, -500.0);
	}

	#[test]
	fn legacy_event_codes() {
		assert_eq!(ChannelEvent{ channel: 0, outcome: ChannelOutcome::Acquired }.code(), 1);
		assert_eq!(ChannelEvent{ channel: 0, outcome: ChannelOutcome::NotAcquired }.code(), 2);
	}
}
