use serde::{Serialize, Deserialize};

use crate::gnss::synchro::SynchronizationRecord;

pub mod config;
pub mod replica;
pub mod search;
pub mod threshold;
pub mod quicksync;

#[cfg(test)]
pub(crate) mod test_signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcqState {
	Idle,
	Configuring,
	Searching,
	Verifying,
	Acquired,
	NotAcquired,
}

impl AcqState {

	pub fn is_terminal(&self) -> bool { match self {
		AcqState::Acquired | AcqState::NotAcquired => true,
		_ => false,
	}}

}

/// Best hypothesis for one Doppler bin.  `magnitude` is the normalized power of the folded (coarse) correlation,
/// which is what the threshold is derived for; `refined_magnitude` is the unfolded power at `code_phase`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
	pub doppler_hz: f64,
	pub coarse_index: usize,
	pub magnitude: f64,
	pub ambiguity_index: usize,
	pub fine_offset: usize,
	pub code_phase: usize,
	pub refined_magnitude: f64,
}

impl CorrelationResult {

	pub fn empty(doppler_hz:f64) -> Self {
		Self { doppler_hz, coarse_index: 0, magnitude: 0.0, ambiguity_index: 0, fine_offset: 0, code_phase: 0,
			refined_magnitude: 0.0 }
	}

}

/// Running grid-wide maximum over the dwells of one search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionStatistic {
	pub best: Option<CorrelationResult>,
	pub dwells: usize,
}

impl AcquisitionStatistic {

	pub fn peak_magnitude(&self) -> f64 { self.best.as_ref().map(|r| r.magnitude).unwrap_or(0.0) }

	/// Folds one dwell's best result into the statistic.  Returns true if it became the new maximum.
	pub fn update(&mut self, dwell_best:&CorrelationResult) -> bool {
		self.dwells += 1;
		if dwell_best.magnitude > self.peak_magnitude() || self.best.is_none() {
			self.best = Some(dwell_best.clone());
			true
		} else { false }
	}

	pub fn clear(&mut self) {
		self.best = None;
		self.dwells = 0;
	}

}

#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
	Acquired(SynchronizationRecord),
	NotAcquired{ mag:f64, threshold:f64, dwells:usize },
}

#[cfg(test)]
mod tests {
	use super::*;

	fn result(magnitude:f64) -> CorrelationResult {
		CorrelationResult{ magnitude, ..CorrelationResult::empty(0.0) }
	}

	#[test]
	fn statistic_peak_never_decreases() {
		let mut stat = AcquisitionStatistic::default();
		assert_eq!(stat.peak_magnitude(), 0.0);

		let mut last = 0.0;
		for (mag, expect_new) in [(0.2, true), (0.1, false), (0.5, true), (0.5, false), (0.3, false)].iter() {
			assert_eq!(stat.update(&result(*mag)), *expect_new);
			assert!(stat.peak_magnitude() >= last);
			last = stat.peak_magnitude();
		}
		assert_eq!(stat.dwells, 5);
		assert_eq!(stat.peak_magnitude(), 0.5);

		stat.clear();
		assert_eq!(stat, AcquisitionStatistic::default());
	}
}
