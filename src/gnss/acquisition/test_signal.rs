// Synthetic inputs shared by the acquisition tests

use std::f64::consts;

use num_complex::Complex;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// One sample per chip, so a 4 ms E1 code period is 4092 samples
pub const FS:f64 = 1.023e6;

pub fn random_code(len:usize, seed:u64) -> Vec<i8> {
	let mut rng = StdRng::seed_from_u64(seed);
	(0..len).map(|_| if rng.gen::<bool>() { 1 } else { -1 }).collect()
}

/// `periods` code periods delayed by `code_phase` samples and shifted by `doppler_hz`, plus complex Gaussian noise
/// with standard deviation `noise_sigma` on each component
pub fn signal(chips:&[i8], doppler_hz:f64, code_phase:usize, periods:usize, amplitude:f64, noise_sigma:f64, seed:u64) -> Vec<Complex<f64>> {
	let n = chips.len();
	let mut rng = StdRng::seed_from_u64(seed);
	let normal = Normal::new(0.0, if noise_sigma > 0.0 { noise_sigma } else { 1.0 }).unwrap();
	let phase_step_rad:f64 = (2.0 * consts::PI * doppler_hz) / FS;

	(0..(n * periods)).map(|idx| {
		let chip = chips[(idx + n - (code_phase % n)) % n] as f64;
		let phase = phase_step_rad * (idx as f64);
		let clean = Complex{ re: phase.cos(), im: phase.sin() } * (amplitude * chip);
		if noise_sigma > 0.0 {
			clean + Complex{ re: normal.sample(&mut rng), im: normal.sample(&mut rng) }
		} else { clean }
	}).collect()
}

pub fn noise(len:usize, noise_sigma:f64, seed:u64) -> Vec<Complex<f64>> {
	let mut rng = StdRng::seed_from_u64(seed);
	let normal = Normal::new(0.0, noise_sigma).unwrap();
	(0..len).map(|_| Complex{ re: normal.sample(&mut rng), im: normal.sample(&mut rng) }).collect()
}
