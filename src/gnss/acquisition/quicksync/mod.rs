use std::collections::VecDeque;
use std::sync::Arc;

use num_complex::Complex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::{AcquisitionErr, SampleBlock};
use crate::block::{BlockFunctionality, BlockResult};
use crate::gnss::galileo_e1;
use crate::gnss::synchro::{ChannelEvent, ChannelOutcome, SynchroHandoff, SynchroReceiver, SynchronizationRecord};
use crate::io;
use super::{AcqState, AcquisitionOutcome, AcquisitionStatistic, CorrelationResult};
use super::config::{AcquisitionConfig, ConfirmationPolicy, DerivedParams};
use super::replica::LocalReplica;
use super::search::{DwellSearch, SearchEngine, SearchGrid};
use super::threshold::{self, Decision};


pub const IMPLEMENTATION:&str = "Galileo_E1_PCPS_QuickSync_Ambiguous_Acquisition";

/// Control messages understood through `BlockFunctionality::control`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqControl {
	Init,
	Reset,
	Deadline,
}

/// Parameters frozen by `init`
#[derive(Debug, Clone)]
struct Frozen {
	config: AcquisitionConfig,
	derived: DerivedParams,
	grid: SearchGrid,
	threshold: f64,
}

/// QuickSync acquisition for one channel.  The search runs dwell by dwell as sample blocks arrive; the first sample
/// block after `init` and `set_local_code` starts it.
pub struct QuickSyncAcquisition {
	channel: usize,
	config: AcquisitionConfig,
	frozen: Option<Frozen>,
	engine: Option<SearchEngine>,
	state: AcqState,
	buffer: Vec<Complex<f64>>,
	buffer_first_idx: usize,
	dwells_used: usize,
	positive_dwells: usize,
	statistic: AcquisitionStatistic,
	peak_threshold: Option<f64>,
	underruns: usize,
	handoff: SynchroHandoff,
	channel_queue: Option<mpsc::Sender<ChannelEvent>>,
	pending_events: VecDeque<ChannelEvent>,
}

impl QuickSyncAcquisition {

	pub fn new(channel:usize, config:AcquisitionConfig) -> Self {
		Self { channel, config, frozen: None, engine: None, state: AcqState::Idle, buffer: vec![], buffer_first_idx: 0,
			dwells_used: 0, positive_dwells: 0, statistic: AcquisitionStatistic::default(), peak_threshold: None, underruns: 0,
			handoff: SynchroHandoff::new(), channel_queue: None, pending_events: VecDeque::new() }
	}

	// Read-only getter methods
	pub fn implementation(&self) -> &'static str { IMPLEMENTATION }
	pub fn channel(&self) -> usize { self.channel }
	pub fn state(&self) -> AcqState { self.state }
	pub fn config(&self) -> &AcquisitionConfig { &self.config }
	pub fn statistic(&self) -> &AcquisitionStatistic { &self.statistic }
	pub fn dwells_used(&self) -> usize { self.dwells_used }
	pub fn underruns(&self) -> usize { self.underruns }
	pub fn threshold(&self) -> Option<f64> { self.frozen.as_ref().map(|f| f.threshold) }
	pub fn code_length(&self) -> Option<usize> { self.frozen.as_ref().map(|f| f.derived.code_length) }
	pub fn has_local_code(&self) -> bool { self.engine.is_some() }
	pub fn synchro(&self) -> Option<SynchronizationRecord> { self.handoff.latest() }
	pub fn subscribe(&self) -> SynchroReceiver { self.handoff.subscribe() }

	/// Best normalized peak power seen since the last reset, whether or not it crossed the threshold.  A partial
	/// dwell run by `on_deadline` is judged against a threshold for fewer blocks, so compare `mag` with
	/// `peak_threshold` rather than `threshold` once one has run.
	pub fn mag(&self) -> f64 { self.statistic.peak_magnitude() }

	/// Threshold of the dwell that produced `mag`
	pub fn peak_threshold(&self) -> Option<f64> { self.peak_threshold }

	fn setter_allowed(&mut self, op:&'static str) -> Result<(), AcquisitionErr> {
		match self.state {
			AcqState::Idle | AcqState::Configuring => {
				// Changing a parameter means init has to run again
				self.frozen = None;
				self.state = AcqState::Idle;
				Ok(())
			},
			state => Err(AcquisitionErr::InvalidTransition{ op, state }),
		}
	}

	pub fn set_channel(&mut self, channel:usize) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_channel")?;
		self.channel = channel;
		Ok(())
	}

	/// Uses `threshold` directly and stops deriving it from a false alarm probability
	pub fn set_threshold(&mut self, threshold:f64) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_threshold")?;
		self.config.threshold = threshold;
		self.config.pfa = None;
		Ok(())
	}

	pub fn set_pfa(&mut self, pfa:f64) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_pfa")?;
		self.config.pfa = Some(pfa);
		Ok(())
	}

	pub fn set_doppler_max(&mut self, doppler_max_hz:u32) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_doppler_max")?;
		self.config.doppler_max_hz = doppler_max_hz;
		Ok(())
	}

	pub fn set_doppler_step(&mut self, doppler_step_hz:u32) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_doppler_step")?;
		self.config.doppler_step_hz = doppler_step_hz;
		Ok(())
	}

	pub fn set_sampled_ms(&mut self, sampled_ms:u32) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_sampled_ms")?;
		self.config.sampled_ms = sampled_ms;
		Ok(())
	}

	pub fn set_max_dwells(&mut self, max_dwells:usize) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_max_dwells")?;
		self.config.max_dwells = max_dwells;
		Ok(())
	}

	pub fn set_folding_factor(&mut self, folding_factor:usize) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_folding_factor")?;
		self.config.folding_factor = folding_factor;
		Ok(())
	}

	pub fn set_shift_resolution(&mut self, shift_resolution:usize) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_shift_resolution")?;
		self.config.shift_resolution = shift_resolution;
		Ok(())
	}

	pub fn set_dump(&mut self, dump:bool, dump_filename:&str) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_dump")?;
		self.config.dump = dump;
		self.config.dump_filename = dump_filename.to_string();
		Ok(())
	}

	pub fn set_channel_queue(&mut self, queue:mpsc::Sender<ChannelEvent>) -> Result<(), AcquisitionErr> {
		self.setter_allowed("set_channel_queue")?;
		self.channel_queue = Some(queue);
		Ok(())
	}

	/// Validates and freezes the configuration.  A bound local code survives if it still has the right length.
	pub fn init(&mut self) -> Result<(), AcquisitionErr> {
		match self.state {
			AcqState::Idle | AcqState::Configuring => {},
			state => return Err(AcquisitionErr::InvalidTransition{ op: "init", state }),
		}

		let derived = self.config.validate()?;
		let grid = SearchGrid::new(self.config.doppler_max_hz, self.config.doppler_step_hz)?;
		let threshold = match self.config.pfa {
			Some(pfa) => match threshold::calculate_threshold(pfa, derived.fold_len, grid.len(), derived.blocks_per_dwell) {
				Ok(t) => t,
				Err(e) => {
					self.frozen = None;
					self.reset();
					return Err(e);
				}
			},
			None => self.config.threshold,
		};

		let replica_fits = self.engine.as_ref().map(|e| {
			let r = e.replica();
			r.code_length() == derived.code_length && r.folding_factor == self.config.folding_factor
				&& e.shift_resolution == self.config.shift_resolution && e.fs == self.config.fs_in_hz && e.if_hz == self.config.if_hz
		}).unwrap_or(false);
		if !replica_fits && self.engine.is_some() {
			debug!(channel = self.channel, "dropping local code bound under a different configuration");
			self.engine = None;
		}

		debug!(channel = self.channel, code_length = derived.code_length, fold_len = derived.fold_len, bins = grid.len(),
			threshold, "acquisition initialized");

		self.frozen = Some(Frozen{ config: self.config.clone(), derived, grid, threshold });
		self.state = AcqState::Configuring;
		Ok(())
	}

	/// Generates the local replica of `chips` for the frozen sampling configuration.  Not allowed while searching.
	pub fn set_local_code(&mut self, prn:usize, chips:&[i8]) -> Result<(), AcquisitionErr> {
		match self.state {
			AcqState::Idle | AcqState::Configuring => {},
			state => return Err(AcquisitionErr::InvalidTransition{ op: "set_local_code", state }),
		}

		let frozen = self.frozen.as_ref().ok_or(AcquisitionErr::InvalidTransition{ op: "set_local_code", state: self.state })?;
		let cfg = &frozen.config;
		let replica = LocalReplica::from_chips(prn, chips, cfg.modulation, cfg.fs_in_hz, frozen.derived.code_length, cfg.folding_factor)?;
		let engine = SearchEngine::new(Arc::new(replica), cfg.fs_in_hz, cfg.if_hz, cfg.shift_resolution, cfg.workers)?;

		debug!(channel = self.channel, prn, "local code bound");
		self.engine = Some(engine);
		Ok(())
	}

	/// Returns to Idle from any state.  Frozen parameters and the local code are kept so the same signal can be
	/// searched again after another `init`.
	pub fn reset(&mut self) {
		self.flush_pending_events();
		self.state = AcqState::Idle;
		self.buffer.clear();
		self.buffer_first_idx = 0;
		self.dwells_used = 0;
		self.positive_dwells = 0;
		self.statistic.clear();
		self.peak_threshold = None;
	}

	/// Accepts one block of samples and runs every dwell it completes
	pub fn provide_block(&mut self, block:&SampleBlock) -> Result<Option<AcquisitionOutcome>, AcquisitionErr> {
		self.flush_pending_events();

		match self.state {
			AcqState::Idle => return Err(AcquisitionErr::InvalidTransition{ op: "apply", state: AcqState::Idle }),
			AcqState::Verifying => return Err(AcquisitionErr::InvalidTransition{ op: "apply", state: AcqState::Verifying }),
			AcqState::Acquired | AcqState::NotAcquired => return Ok(None),
			AcqState::Configuring => {
				if self.engine.is_none() { return Err(AcquisitionErr::ReplicaNotBound); }
				self.state = AcqState::Searching;
			},
			AcqState::Searching => {},
		}

		if self.buffer.is_empty() { self.buffer_first_idx = block.first_idx; }
		self.buffer.extend_from_slice(&block.samples);

		let dwell_len = self.frozen_ref()?.derived.dwell_len();
		while self.state == AcqState::Searching && self.buffer.len() >= dwell_len {
			if let Some(outcome) = self.run_dwell(dwell_len)? {
				return Ok(Some(outcome));
			}
		}
		Ok(None)
	}

	/// External deadline for the current dwell.  Whatever whole code periods have arrived are searched as a partial
	/// dwell; with less than one code period buffered the channel keeps accumulating.
	pub fn on_deadline(&mut self) -> Result<Option<AcquisitionOutcome>, AcquisitionErr> {
		self.flush_pending_events();
		if self.state != AcqState::Searching { return Ok(None); }

		let derived = self.frozen_ref()?.derived;
		let (available, required) = (self.buffer.len(), derived.dwell_len());
		if available >= required {
			return self.run_dwell(required);
		}

		self.underruns += 1;
		let underrun = AcquisitionErr::StreamUnderrun{ available, required };
		warn!(channel = self.channel, "{}", underrun);

		let usable = (available / derived.code_length) * derived.code_length;
		if usable == 0 { Ok(None) } else { self.run_dwell(usable) }
	}

	fn frozen_ref(&self) -> Result<&Frozen, AcquisitionErr> {
		self.frozen.as_ref().ok_or(AcquisitionErr::InvalidTransition{ op: "search", state: self.state })
	}

	fn threshold_for(&self, blocks:usize) -> Result<f64, AcquisitionErr> {
		let frozen = self.frozen_ref()?;
		match frozen.config.pfa {
			Some(pfa) if blocks != frozen.derived.blocks_per_dwell =>
				threshold::calculate_threshold(pfa, frozen.derived.fold_len, frozen.grid.len(), blocks),
			_ => Ok(frozen.threshold),
		}
	}

	fn run_dwell(&mut self, len:usize) -> Result<Option<AcquisitionOutcome>, AcquisitionErr> {
		let samples:Vec<Complex<f64>> = self.buffer.drain(..len).collect();
		let samplestamp = self.buffer_first_idx;
		self.buffer_first_idx += len;

		let search:DwellSearch = {
			let frozen = self.frozen_ref()?;
			let engine = self.engine.as_ref().ok_or(AcquisitionErr::ReplicaNotBound)?;
			engine.search(&samples, &frozen.grid, frozen.config.dump)?
		};

		let threshold = match self.threshold_for(search.blocks) {
			Ok(t) => t,
			Err(e) => {
				self.reset();
				return Err(e);
			}
		};

		self.state = AcqState::Verifying;
		self.dwells_used += 1;
		if self.statistic.update(&search.best) { self.peak_threshold = Some(threshold); }
		self.dump_grid(&search);

		let decision = threshold::decide(search.best.magnitude, threshold);
		debug!(channel = self.channel, dwell = self.dwells_used, blocks = search.blocks, doppler_hz = search.best.doppler_hz,
			code_phase = search.best.code_phase, magnitude = search.best.magnitude, threshold, ?decision, "dwell complete");

		let (max_dwells, policy) = {
			let cfg = &self.frozen_ref()?.config;
			(cfg.max_dwells, cfg.confirmation)
		};

		let acquired:Option<CorrelationResult> = match (decision, policy) {
			(Decision::Positive, ConfirmationPolicy::SingleDwell) => Some(search.best.clone()),
			(Decision::Positive, ConfirmationPolicy::AllDwells) => {
				self.positive_dwells += 1;
				if self.positive_dwells >= max_dwells { self.statistic.best.clone() } else { None }
			},
			(Decision::Negative, _) => None,
		};

		let exhausted = match (decision, policy) {
			(Decision::Negative, ConfirmationPolicy::AllDwells) => true,
			_ => self.dwells_used >= max_dwells,
		};

		match acquired {
			Some(best) => Ok(Some(self.finish_acquired(best, samplestamp, threshold))),
			None if exhausted => Ok(Some(self.finish_not_acquired(threshold))),
			None => {
				self.state = AcqState::Searching;
				Ok(None)
			}
		}
	}

	fn finish_acquired(&mut self, best:CorrelationResult, samplestamp:usize, threshold:f64) -> AcquisitionOutcome {
		let prn = self.engine.as_ref().map(|e| e.replica().prn).unwrap_or(0);
		let record = SynchronizationRecord {
			channel: self.channel,
			prn,
			signal: galileo_e1::SIGNAL_E1B.to_string(),
			acq_doppler_hz: best.doppler_hz,
			acq_delay_samples: best.code_phase,
			acq_samplestamp_samples: samplestamp,
			peak_statistic: best.magnitude,
			threshold,
			dwells_used: self.dwells_used,
			acquired: true,
		};

		info!(channel = self.channel, prn, doppler_hz = best.doppler_hz, code_phase = best.code_phase,
			magnitude = best.magnitude, dwells = self.dwells_used, "signal acquired");

		if let Err(msg) = self.handoff.publish(record.clone()) {
			warn!(channel = self.channel, "{}", msg);
		}
		self.buffer.clear();
		self.state = AcqState::Acquired;
		self.push_event(ChannelOutcome::Acquired);
		AcquisitionOutcome::Acquired(record)
	}

	fn finish_not_acquired(&mut self, threshold:f64) -> AcquisitionOutcome {
		info!(channel = self.channel, mag = self.mag(), threshold, dwells = self.dwells_used, "signal not acquired");

		self.buffer.clear();
		self.state = AcqState::NotAcquired;
		self.push_event(ChannelOutcome::NotAcquired);
		AcquisitionOutcome::NotAcquired{ mag: self.mag(), threshold, dwells: self.dwells_used }
	}

	fn push_event(&mut self, outcome:ChannelOutcome) {
		self.pending_events.push_back(ChannelEvent{ channel: self.channel, outcome });
		self.flush_pending_events();
	}

	// Events the queue has no room for wait in order for the next call
	fn flush_pending_events(&mut self) {
		let queue = match self.channel_queue.as_mut() {
			Some(queue) => queue,
			None => {
				self.pending_events.clear();
				return;
			},
		};

		while let Some(event) = self.pending_events.pop_front() {
			match queue.try_send(event) {
				Ok(()) => {},
				Err(TrySendError::Full(event)) => {
					warn!(channel = self.channel, pending = self.pending_events.len() + 1, "channel queue full, event deferred");
					self.pending_events.push_front(event);
					return;
				},
				Err(TrySendError::Closed(_)) => {
					warn!(channel = self.channel, dropped = self.pending_events.len() + 1, "channel queue closed, events dropped");
					self.pending_events.clear();
					return;
				},
			}
		}
	}

	fn dump_grid(&self, search:&DwellSearch) {
		let (frozen, grid) = match (self.frozen.as_ref(), search.grid.as_ref()) {
			(Some(frozen), Some(grid)) => (frozen, grid),
			_ => return,
		};

		let path = format!("{}_ch{}_dwell{}.dat", frozen.config.dump_filename, self.channel, self.dwells_used);
		let dopplers:Vec<f64> = search.bins.iter().map(|r| r.doppler_hz).collect();
		if let Err(e) = io::write_grid_dump(&path, &dopplers, grid) {
			warn!(channel = self.channel, path = path.as_str(), "{}", e);
		}
	}

}

impl BlockFunctionality<AcqControl, Option<AcquisitionOutcome>, SampleBlock, AcquisitionOutcome> for QuickSyncAcquisition {

	fn control(&mut self, control:&AcqControl) -> Result<Option<AcquisitionOutcome>, AcquisitionErr> {
		match control {
			AcqControl::Init     => self.init().map(|_| None),
			AcqControl::Reset    => { self.reset(); Ok(None) },
			AcqControl::Deadline => self.on_deadline(),
		}
	}

	fn apply(&mut self, input:&SampleBlock) -> BlockResult<AcquisitionOutcome> {
		match self.provide_block(input) {
			Ok(Some(outcome)) => BlockResult::Ready(outcome),
			Ok(None)          => BlockResult::NotReady,
			Err(e)            => BlockResult::Err(e),
		}
	}

}
