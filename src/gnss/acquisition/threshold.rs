use serde::{Serialize, Deserialize};

use crate::AcquisitionErr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
	Positive,
	Negative,
}

pub fn decide(magnitude:f64, threshold:f64) -> Decision {
	if magnitude > threshold { Decision::Positive } else { Decision::Negative }
}

/// Natural log of the Erlang survival function, P(Gamma(k, 1) > y)
fn ln_erlang_survival(k:usize, y:f64) -> f64 {
	// log of each term y^i / i! e^-y, summed with log-sum-exp
	let ln_y = y.ln();
	let mut ln_terms:Vec<f64> = Vec::with_capacity(k);
	let mut ln_term = -y;
	ln_terms.push(ln_term);
	for i in 1..k {
		ln_term += ln_y - (i as f64).ln();
		ln_terms.push(ln_term);
	}

	let max = ln_terms.iter().cloned().fold(std::f64::NEG_INFINITY, f64::max);
	max + ln_terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// Threshold on the normalized folded correlation power that the grid-wide maximum of a noise-only dwell exceeds
/// with probability `pfa`.
///
/// Each folded cell of a noise-only block is exponential with mean 1/`fold_len`.  Averaging `blocks` coherent
/// blocks gives Gamma(blocks, 1/(blocks·fold_len)).  The grid has `fold_len · n_bins` cells, so each cell may exceed
/// the threshold with probability `1 - (1 - pfa)^(1/ncells)`.
pub fn calculate_threshold(pfa:f64, fold_len:usize, n_bins:usize, blocks:usize) -> Result<f64, AcquisitionErr> {
	if !(pfa > 0.0 && pfa < 1.0) {
		return Err(AcquisitionErr::NumericDegeneracy("false alarm probability must be in (0, 1)"));
	}
	if fold_len == 0 || n_bins == 0 || blocks == 0 {
		return Err(AcquisitionErr::NumericDegeneracy("threshold needs a non-empty grid and at least one block"));
	}

	let ncells = (fold_len * n_bins) as f64;
	let p_cell:f64 = -((-pfa).ln_1p() / ncells).exp_m1();
	let ln_p_cell = p_cell.ln();

	let y:f64 = if blocks == 1 {
		-ln_p_cell
	} else {
		// Bisection on the survival function, which decreases monotonically in y
		let mut lo = 0.0;
		let mut hi = blocks as f64;
		while ln_erlang_survival(blocks, hi) > ln_p_cell {
			hi *= 2.0;
			if !hi.is_finite() {
				return Err(AcquisitionErr::NumericDegeneracy("threshold search diverged"));
			}
		}
		for _ in 0..200 {
			let mid = 0.5 * (lo + hi);
			if ln_erlang_survival(blocks, mid) > ln_p_cell { lo = mid; } else { hi = mid; }
		}
		0.5 * (lo + hi)
	};

	let threshold = y / ((blocks * fold_len) as f64);
	if threshold.is_finite() && threshold >= 0.0 { Ok(threshold) }
	else { Err(AcquisitionErr::NumericDegeneracy("threshold is not a finite, non-negative number")) }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_block_matches_exponential_quantile() {
		let (pfa, fold_len, n_bins) = (0.001, 1023, 41);
		let ncells = (fold_len * n_bins) as f64;
		let val = (1.0 - pfa as f64).powf(1.0 / ncells);
		let expected = -(1.0 - val).ln() / (fold_len as f64);

		let t = calculate_threshold(pfa, fold_len, n_bins, 1).unwrap();
		assert!((t - expected).abs() / expected < 1e-6, "{} vs {}", t, expected);
		assert!(t > 0.017 && t < 0.018);
	}

	#[test]
	fn threshold_decreases_as_pfa_increases() {
		for blocks in [1, 2, 5].iter() {
			let mut last = std::f64::INFINITY;
			for pfa in [1e-6, 1e-4, 1e-3, 0.01, 0.05, 0.1, 0.5].iter() {
				let t = calculate_threshold(*pfa, 1023, 41, *blocks).unwrap();
				assert!(t < last, "blocks={} pfa={} gives {} after {}", blocks, pfa, t, last);
				last = t;
			}
		}
	}

	#[test]
	fn more_blocks_tighten_threshold() {
		// Averaging more blocks narrows the noise distribution around its mean of 1/fold_len
		let t1 = calculate_threshold(0.01, 1023, 41, 1).unwrap();
		let t4 = calculate_threshold(0.01, 1023, 41, 4).unwrap();
		assert!(t4 < t1);
		assert!(t4 > 1.0 / 1023.0);
	}

	#[test]
	fn erlang_survival_reduces_to_exponential() {
		for y in [0.1, 1.0, 7.5, 30.0].iter() {
			assert!((ln_erlang_survival(1, *y) + y).abs() < 1e-12);
		}
		// k = 2: e^-y (1 + y)
		let y = 3.0_f64;
		assert!((ln_erlang_survival(2, y) - (-y + (1.0 + y).ln())).abs() < 1e-12);
	}

	#[test]
	fn degenerate_pfa_is_rejected() {
		for pfa in [0.0, -0.1, 1.0, 1.5, std::f64::NAN].iter() {
			assert_eq!(calculate_threshold(*pfa, 1023, 41, 1).err().map(|e| match e {
				AcquisitionErr::NumericDegeneracy(_) => true,
				_ => false,
			}), Some(true));
		}
	}

	#[test]
	fn decision_is_strict() {
		assert_eq!(decide(0.5, 0.4), Decision::Positive);
		assert_eq!(decide(0.4, 0.4), Decision::Negative);
		assert_eq!(decide(0.0, 0.4), Decision::Negative);
	}
}
