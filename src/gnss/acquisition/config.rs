use serde::{Serialize, Deserialize};

use crate::AcquisitionErr;
use crate::gnss::galileo_e1::{self, signal_modulation::{self, Modulation}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationPolicy {
	/// The first dwell above threshold is a detection
	SingleDwell,
	/// Every one of `max_dwells` dwells must be above threshold
	AllDwells,
}

impl Default for ConfirmationPolicy {
	fn default() -> Self { ConfirmationPolicy::SingleDwell }
}

/// Recognized acquisition options.  Loaded from JSON with defaults for anything missing, then validated once by
/// `validate` when the channel is initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
	pub fs_in_hz: f64,
	pub if_hz: f64,
	/// Used as-is when `pfa` is None
	pub threshold: f64,
	pub pfa: Option<f64>,
	pub doppler_max_hz: u32,
	pub doppler_step_hz: u32,
	pub sampled_ms: u32,
	pub code_period_ms: u32,
	pub max_dwells: usize,
	pub folding_factor: usize,
	pub shift_resolution: usize,
	pub bit_transition_flag: bool,
	pub confirmation: ConfirmationPolicy,
	pub modulation: Modulation,
	pub workers: Option<usize>,
	pub dump: bool,
	pub dump_filename: String,
}

impl Default for AcquisitionConfig {
	fn default() -> Self {
		Self {
			fs_in_hz: 4.0e6,
			if_hz: 0.0,
			threshold: 0.0,
			pfa: Some(0.01),
			doppler_max_hz: 5000,
			doppler_step_hz: 250,
			sampled_ms: galileo_e1::CODE_PERIOD_MS,
			code_period_ms: galileo_e1::CODE_PERIOD_MS,
			max_dwells: 1,
			folding_factor: 2,
			shift_resolution: 4,
			bit_transition_flag: false,
			confirmation: ConfirmationPolicy::SingleDwell,
			modulation: Modulation::SinBoc11,
			workers: None,
			dump: false,
			dump_filename: "./acquisition".to_string(),
		}
	}
}

/// Quantities derived from a validated configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedParams {
	pub code_length: usize,
	pub fold_len: usize,
	pub blocks_per_dwell: usize,
}

impl DerivedParams {
	pub fn dwell_len(&self) -> usize { self.code_length * self.blocks_per_dwell }
}

fn config_err<T>(msg:String) -> Result<T, AcquisitionErr> { Err(AcquisitionErr::Configuration(msg)) }

impl AcquisitionConfig {

	pub fn from_json(s:&str) -> Result<Self, AcquisitionErr> {
		serde_json::from_str(s).map_err(|e| AcquisitionErr::Configuration(format!("unable to parse configuration: {}", e)))
	}

	pub fn code_length(&self) -> usize { signal_modulation::samples_per_code(self.fs_in_hz, self.code_period_ms) }

	/// Checks every option and their combinations.  Nothing is clamped; the first problem found is reported.
	pub fn validate(&self) -> Result<DerivedParams, AcquisitionErr> {
		if !(self.fs_in_hz.is_finite() && self.fs_in_hz > 0.0) {
			return config_err(format!("sampling rate must be positive, got {}", self.fs_in_hz));
		}
		if !self.if_hz.is_finite() {
			return config_err(format!("intermediate frequency must be finite, got {}", self.if_hz));
		}
		if self.code_period_ms == 0 {
			return config_err("code period must be at least 1 ms".to_string());
		}

		let code_length = self.code_length();
		if code_length == 0 {
			return config_err(format!("sampling rate {} yields an empty code period", self.fs_in_hz));
		}
		if self.doppler_step_hz == 0 {
			return config_err("Doppler step must be positive".to_string());
		}
		if self.sampled_ms == 0 || self.sampled_ms % self.code_period_ms != 0 {
			return config_err(format!("sampled_ms ({}) must be a positive multiple of the {} ms code period", self.sampled_ms, self.code_period_ms));
		}
		if self.max_dwells == 0 {
			return config_err("max_dwells must be at least 1".to_string());
		}
		if self.bit_transition_flag && self.max_dwells != 2 {
			return config_err(format!("bit_transition_flag requires max_dwells = 2, got {}", self.max_dwells));
		}
		if self.folding_factor == 0 || code_length % self.folding_factor != 0 {
			return config_err(format!("folding factor {} does not divide the code length {}", self.folding_factor, code_length));
		}

		let fold_len = code_length / self.folding_factor;
		if self.shift_resolution == 0 || self.shift_resolution >= fold_len {
			return config_err(format!("shift resolution {} must be in 1..{}", self.shift_resolution, fold_len));
		}
		if self.pfa.is_none() && !(self.threshold.is_finite() && self.threshold >= 0.0) {
			return config_err(format!("threshold must be finite and non-negative, got {}", self.threshold));
		}
		if self.workers == Some(0) {
			return config_err("workers must be at least 1 when given".to_string());
		}

		let blocks_per_dwell = (self.sampled_ms / self.code_period_ms) as usize;
		Ok(DerivedParams{ code_length, fold_len, blocks_per_dwell })
	}

}
