use num_complex::Complex;
use num_traits::Zero;
use rustfft::FFTplanner;

use crate::AcquisitionErr;
use crate::gnss::galileo_e1::signal_modulation::{self, Modulation};

/// Sums `x` over contiguous segments of length `fold_len`.  Trailing samples that don't fill a segment are ignored.
pub fn fold(x:&[Complex<f64>], fold_len:usize) -> Vec<Complex<f64>> {
	let mut folded:Vec<Complex<f64>> = vec![Complex::zero(); fold_len];
	for segment in x.chunks_exact(fold_len) {
		for (acc, s) in folded.iter_mut().zip(segment) { *acc += *s; }
	}
	folded
}

/// Local copy of one code period and its folded version.  Built once per signal and sampling configuration and
/// then shared read-only by every Doppler bin.
#[derive(Debug, Clone)]
pub struct LocalReplica {
	pub prn: usize,
	pub folding_factor: usize,
	full: Vec<Complex<f64>>,
	folded: Vec<Complex<f64>>,
	folded_freq_conj: Vec<Complex<f64>>,
}

impl LocalReplica {

	pub fn new(prn:usize, full:Vec<Complex<f64>>, folding_factor:usize) -> Result<Self, AcquisitionErr> {
		if full.is_empty() || folding_factor == 0 || full.len() % folding_factor != 0 {
			return Err(AcquisitionErr::Configuration(format!("folding factor {} does not divide the replica length {}", folding_factor, full.len())));
		}

		let fold_len = full.len() / folding_factor;
		let folded = fold(&full, fold_len);

		// Conjugate spectrum of the folded code, so a product with the input spectrum is a correlation
		let mut planner = FFTplanner::new(false);
		let fft = planner.plan_fft(fold_len);
		let mut time_domain = folded.clone();
		let mut fft_out:Vec<Complex<f64>> = vec![Complex::zero(); fold_len];
		fft.process(&mut time_domain, &mut fft_out);
		let folded_freq_conj = fft_out.into_iter().map(|p| p.conj()).collect();

		Ok(Self { prn, folding_factor, full, folded, folded_freq_conj })
	}

	pub fn from_chips(prn:usize, chips:&[i8], modulation:Modulation, fs:f64, code_length:usize, folding_factor:usize) -> Result<Self, AcquisitionErr> {
		if chips.is_empty() {
			return Err(AcquisitionErr::Configuration(format!("empty primary code for PRN {}", prn)));
		}
		let full = signal_modulation::code_complex_sampled(chips, modulation, fs, code_length);
		Self::new(prn, full, folding_factor)
	}

	pub fn code_length(&self) -> usize { self.full.len() }
	pub fn fold_len(&self) -> usize { self.folded.len() }

	pub fn full(&self) -> &[Complex<f64>] { &self.full }
	pub fn folded(&self) -> &[Complex<f64>] { &self.folded }
	pub fn folded_freq_conj(&self) -> &[Complex<f64>] { &self.folded_freq_conj }

}

#[cfg(test)]
mod tests {
	use super::*;

	fn c(re:f64) -> Complex<f64> { Complex{ re, im: 0.0 } }

	#[test]
	fn folding_sums_contiguous_segments() {
		let x:Vec<Complex<f64>> = (0..12).map(|i| c(i as f64)).collect();
		let folded = fold(&x, 4);
		assert_eq!(folded, vec![c(12.0), c(15.0), c(18.0), c(21.0)]);

		assert_eq!(fold(&x, 5), vec![c(5.0), c(7.0), c(9.0), c(11.0), c(13.0)]);
	}

	#[test]
	fn replica_keeps_full_and_folded_copies() {
		let chips:Vec<i8> = vec![1, -1, 1, 1, -1, -1, 1, -1];
		let replica = LocalReplica::from_chips(7, &chips, Modulation::Bpsk, 1.023e6, 8, 2).unwrap();
		assert_eq!(replica.code_length(), 8);
		assert_eq!(replica.fold_len(), 4);
		assert_eq!(replica.folded(), &[c(0.0), c(-2.0), c(2.0), c(0.0)][..]);
		assert_eq!(replica.folded_freq_conj().len(), 4);

		// DC bin of the spectrum is the sum of the folded code
		let dc:Complex<f64> = replica.folded_freq_conj()[0];
		assert!((dc.re - 0.0).abs() < 1e-12);
	}

	#[test]
	fn folding_factor_must_divide_length() {
		let full:Vec<Complex<f64>> = vec![c(1.0); 10];
		assert!(LocalReplica::new(1, full.clone(), 3).is_err());
		assert!(LocalReplica::new(1, full.clone(), 0).is_err());
		assert!(LocalReplica::new(1, full, 5).is_ok());
	}
}
