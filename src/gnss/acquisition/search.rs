use std::f64::consts;
use std::sync::Arc;

use num_complex::Complex;
use num_traits::Zero;
use rayon::prelude::*;
use rustfft::{FFT, FFTplanner};
use tracing::trace;

use crate::AcquisitionErr;
use super::CorrelationResult;
use super::replica::{self, LocalReplica};

/// Doppler hypotheses from -doppler_max to +doppler_max.  Both ends are searched when the step reaches them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchGrid {
	pub doppler_max_hz: u32,
	pub doppler_step_hz: u32,
	bins: Vec<f64>,
}

impl SearchGrid {

	pub fn new(doppler_max_hz:u32, doppler_step_hz:u32) -> Result<Self, AcquisitionErr> {
		if doppler_step_hz == 0 {
			return Err(AcquisitionErr::Configuration("Doppler step must be positive".to_string()));
		}
		let max = doppler_max_hz as i64;
		let bins:Vec<f64> = (-max..=max).step_by(doppler_step_hz as usize).map(|f| f as f64).collect();
		Ok(Self { doppler_max_hz, doppler_step_hz, bins })
	}

	pub fn bins(&self) -> &[f64] { &self.bins }
	pub fn len(&self) -> usize { self.bins.len() }
	pub fn is_empty(&self) -> bool { self.bins.is_empty() }

	pub fn nearest_bin(&self, doppler_hz:f64) -> f64 {
		self.bins.iter().cloned()
			.fold((std::f64::INFINITY, 0.0), |(best_err, best), f| {
				let err = (f - doppler_hz).abs();
				if err < best_err { (err, f) } else { (best_err, best) }
			}).1
	}

}

/// Output of one dwell over the whole grid
#[derive(Debug, Clone, PartialEq)]
pub struct DwellSearch {
	pub bins: Vec<CorrelationResult>,
	pub best: CorrelationResult,
	pub blocks: usize,
	/// Folded power per bin, kept only when a dump was requested
	pub grid: Option<Vec<Vec<f64>>>,
}

pub struct SearchEngine {
	pub fs:f64,
	pub if_hz:f64,
	pub shift_resolution:usize,
	replica:Arc<LocalReplica>,
	fft:Arc<dyn FFT<f64>>,
	ifft:Arc<dyn FFT<f64>>,
	pool:Option<rayon::ThreadPool>,
}

impl SearchEngine {

	/// `workers` of None or Some(1) searches the bins on the calling thread
	pub fn new(replica:Arc<LocalReplica>, fs:f64, if_hz:f64, shift_resolution:usize, workers:Option<usize>) -> Result<Self, AcquisitionErr> {
		if shift_resolution == 0 || shift_resolution >= replica.fold_len() {
			return Err(AcquisitionErr::Configuration(format!("shift resolution {} must be in 1..{}", shift_resolution, replica.fold_len())));
		}

		let fold_len = replica.fold_len();
		let fft  = FFTplanner::new(false).plan_fft(fold_len);
		let ifft = FFTplanner::new(true).plan_fft(fold_len);

		let pool = match workers {
			Some(n) if n > 1 => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()
				.map_err(|e| AcquisitionErr::Configuration(format!("unable to start {} search workers: {}", n, e)))?),
			_ => None,
		};

		Ok(Self { fs, if_hz, shift_resolution, replica, fft, ifft, pool })
	}

	pub fn replica(&self) -> &LocalReplica { &self.replica }

	/// Searches every bin of `grid` over `dwell`, which must hold a whole number of code periods.  Bins are reduced
	/// in grid order, so the result doesn't depend on how many workers ran them.
	pub fn search(&self, dwell:&[Complex<f64>], grid:&SearchGrid, keep_grid:bool) -> Result<DwellSearch, AcquisitionErr> {
		let n = self.replica.code_length();
		if dwell.is_empty() || dwell.len() % n != 0 {
			return Err(AcquisitionErr::StreamUnderrun{ available: dwell.len(), required: n * ((dwell.len() / n) + 1) });
		}
		if grid.is_empty() {
			return Err(AcquisitionErr::Configuration("empty Doppler grid".to_string()));
		}

		// Carrier wipeoff doesn't change the power, so it's measured once per block for all bins
		let block_power:Vec<f64> = dwell.chunks_exact(n)
			.map(|blk| blk.iter().map(|c| c.norm_sqr()).sum())
			.collect();

		let per_bin = |doppler_hz:&f64| self.search_bin(dwell, &block_power, *doppler_hz, keep_grid);
		let results:Vec<(CorrelationResult, Option<Vec<f64>>)> = match &self.pool {
			Some(pool) => pool.install(|| grid.bins().par_iter().map(per_bin).collect()),
			None       => grid.bins().iter().map(per_bin).collect(),
		};

		let mut best = CorrelationResult::empty(grid.bins()[0]);
		let mut best_idx:Option<usize> = None;
		for (idx, (result, _)) in results.iter().enumerate() {
			if best_idx.is_none() || result.magnitude > best.magnitude {
				best = result.clone();
				best_idx = Some(idx);
			}
		}

		let (bins, grids):(Vec<CorrelationResult>, Vec<Option<Vec<f64>>>) = results.into_iter().unzip();
		let grid_out = if keep_grid { grids.into_iter().collect::<Option<Vec<Vec<f64>>>>() } else { None };

		Ok(DwellSearch{ bins, best, blocks: block_power.len(), grid: grid_out })
	}

	fn search_bin(&self, dwell:&[Complex<f64>], block_power:&[f64], doppler_hz:f64, keep_grid:bool) -> (CorrelationResult, Option<Vec<f64>>) {
		let n:usize = self.replica.code_length();
		let fold_len:usize = self.replica.fold_len();
		let n_blocks:f64 = block_power.len() as f64;

		// Wipe the carrier off the whole dwell with a continuous phase
		let phase_step_rad:f64 = (-2.0 * consts::PI * (self.if_hz + doppler_hz)) / self.fs;
		let wiped:Vec<Complex<f64>> = dwell.iter().enumerate()
			.map(|(idx, x)| {
				let phase = phase_step_rad * (idx as f64);
				x * Complex{ re: phase.cos(), im: phase.sin() }
			}).collect();

		// Coarse pass: folded correlation of every block, averaged non-coherently
		let mut folded_power:Vec<f64> = vec![0.0; fold_len];
		let mut fft_out:Vec<Complex<f64>> = vec![Complex::zero(); fold_len];
		let mut ifft_out:Vec<Complex<f64>> = vec![Complex::zero(); fold_len];
		for (blk, power) in wiped.chunks_exact(n).zip(block_power) {
			if *power <= 0.0 { continue; }

			let mut folded = replica::fold(blk, fold_len);
			self.fft.process(&mut folded, &mut fft_out);

			let mut product:Vec<Complex<f64>> = fft_out.iter()
				.zip(self.replica.folded_freq_conj())
				.map(|(a, b)| a * b)
				.collect();
			self.ifft.process(&mut product, &mut ifft_out);

			// The unnormalized inverse FFT carries a factor of fold_len
			let scale:f64 = 1.0 / ((fold_len * fold_len) as f64 * power * (n as f64) * n_blocks);
			for (acc, c) in folded_power.iter_mut().zip(&ifft_out) {
				*acc += c.norm_sqr() * scale;
			}
		}

		let mut coarse_index:usize = 0;
		for (idx, p) in folded_power.iter().enumerate() {
			if *p > folded_power[coarse_index] { coarse_index = idx; }
		}

		let mut result = CorrelationResult::empty(doppler_hz);
		result.coarse_index = coarse_index;
		result.magnitude = folded_power[coarse_index];

		// Fine pass: the true code phase is one of folding_factor positions congruent to the coarse index
		let half_window = self.shift_resolution / 2;
		let mut best_refined:f64 = -1.0;
		for candidate in 0..self.replica.folding_factor {
			let centre = coarse_index + candidate * fold_len;
			for offset in 0..self.shift_resolution {
				let pos = (centre + n - half_window + offset) % n;
				let refined = self.refined_power(&wiped, block_power, pos);
				if refined > best_refined {
					best_refined = refined;
					result.ambiguity_index = candidate;
					result.fine_offset = offset;
					result.code_phase = pos;
					result.refined_magnitude = refined;
				}
			}
		}

		trace!(doppler_hz, coarse_index, code_phase = result.code_phase, magnitude = result.magnitude, "bin searched");

		let grid = if keep_grid { Some(folded_power) } else { None };
		(result, grid)
	}

	/// Unfolded correlation power at a single code phase, normalized like the coarse pass
	fn refined_power(&self, wiped:&[Complex<f64>], block_power:&[f64], pos:usize) -> f64 {
		let full = self.replica.full();
		let n = full.len();
		let split = (n - pos) % n;
		let n_blocks = block_power.len() as f64;

		let mut power:f64 = 0.0;
		for (blk, blk_power) in wiped.chunks_exact(n).zip(block_power) {
			if *blk_power <= 0.0 { continue; }

			// Sample i lines up with code sample (i - pos) mod n
			let code = full[split..].iter().chain(full[..split].iter());
			let corr:Complex<f64> = blk.iter().zip(code).fold(Complex::zero(), |acc, (x, c)| acc + x * c.conj());

			power += corr.norm_sqr() / (blk_power * (n as f64) * n_blocks);
		}
		power
	}

}
