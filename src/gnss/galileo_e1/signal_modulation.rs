use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::AcquisitionErr;
use super::{CODE_CHIP_RATE_HZ, CODE_LENGTH_CHIPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
	/// Sine-phased BOC(1,1) sub-carrier, the reference replica for E1B acquisition
	SinBoc11,
	Bpsk,
}

impl Default for Modulation {
	fn default() -> Self { Modulation::SinBoc11 }
}

/// Parses a memory code given as hexadecimal digits, most significant bit first.  Logical ones map to -1 and
/// logical zeros to +1.  The last digit may be padded, so the result is truncated to `length` chips.
pub fn code_from_hex(hex:&str, length:usize) -> Result<Vec<i8>, AcquisitionErr> {
	let mut chips:Vec<i8> = Vec::with_capacity(hex.len() * 4);
	for c in hex.trim().chars() {
		let nibble = c.to_digit(16).ok_or_else(|| AcquisitionErr::Configuration(format!("invalid hex digit {:?} in code", c)))?;
		for bit in (0..4).rev() {
			chips.push(if (nibble >> bit) & 1 == 1 { -1 } else { 1 });
		}
	}

	if chips.len() < length {
		return Err(AcquisitionErr::Configuration(format!("code has {} chips, expected {}", chips.len(), length)));
	}
	chips.truncate(length);
	Ok(chips)
}

pub fn e1b_code_from_hex(hex:&str) -> Result<Vec<i8>, AcquisitionErr> { code_from_hex(hex, CODE_LENGTH_CHIPS) }

/// Number of samples in one code period, rounded to the nearest sample
pub fn samples_per_code(fs:f64, code_period_ms:u32) -> usize {
	((fs * code_period_ms as f64) / 1000.0).round() as usize
}

/// Resamples one period of `chips` at `fs`.  Sample `i` takes the chip under the instant `i/fs`; for BOC(1,1) the
/// sub-carrier is +1 over the first half of each chip and -1 over the second.
pub fn code_complex_sampled(chips:&[i8], modulation:Modulation, fs:f64, n_samples:usize) -> Vec<Complex<f64>> {
	let chips_per_sample:f64 = CODE_CHIP_RATE_HZ / fs;

	(0..n_samples).map(|i| {
		let chip_pos:f64 = (i as f64) * chips_per_sample;
		let chip_idx:usize = (chip_pos.floor() as usize) % chips.len();
		let subcarrier:f64 = match modulation {
			Modulation::Bpsk     => 1.0,
			Modulation::SinBoc11 => if chip_pos - chip_pos.floor() < 0.5 { 1.0 } else { -1.0 },
		};
		Complex{ re: chips[chip_idx] as f64 * subcarrier, im: 0.0 }
	}).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_digits_expand_msb_first() {
		let chips = code_from_hex("A3", 8).unwrap();
		assert_eq!(chips, vec![-1, 1, -1, 1, 1, 1, -1, -1]);
	}

	#[test]
	fn hex_code_is_truncated_and_validated() {
		assert_eq!(code_from_hex("F0", 6).unwrap(), vec![-1, -1, -1, -1, 1, 1]);
		assert!(code_from_hex("F0", 9).is_err());
		assert!(code_from_hex("G0", 4).is_err());
	}

	#[test]
	fn one_sample_per_chip_reproduces_code() {
		let chips:Vec<i8> = vec![1, -1, -1, 1, 1, -1];
		let sampled = code_complex_sampled(&chips, Modulation::Bpsk, CODE_CHIP_RATE_HZ, 12);
		for (i, s) in sampled.iter().enumerate() {
			assert_eq!(s.re, chips[i % 6] as f64);
			assert_eq!(s.im, 0.0);
		}
	}

	#[test]
	fn boc_subcarrier_flips_mid_chip() {
		let chips:Vec<i8> = vec![1, -1];
		let sampled = code_complex_sampled(&chips, Modulation::SinBoc11, 4.0 * CODE_CHIP_RATE_HZ, 8);
		let re:Vec<f64> = sampled.iter().map(|c| c.re).collect();
		assert_eq!(re, vec![1.0, 1.0, -1.0, -1.0, -1.0, -1.0, 1.0, 1.0]);
	}

	#[test]
	fn code_period_length() {
		assert_eq!(samples_per_code(1.023e6, 4), 4092);
		assert_eq!(samples_per_code(4.0e6, 4), 16000);
	}
}
