use std::fmt;

use num_complex::Complex;

pub mod block;
pub mod gnss;
pub mod io;
pub mod tracing_init;

use crate::gnss::acquisition::AcqState;

#[derive(Debug, Clone)]
pub struct Sample {
	pub val: Complex<f64>,
	pub idx: usize,
}

/// One unit of work delivered to an acquisition channel by the scheduler.  The length is whatever the
/// source had available; short blocks are accumulated by the receiver rather than discarded.
#[derive(Debug, Clone)]
pub struct SampleBlock {
	pub samples: Vec<Complex<f64>>,
	pub first_idx: usize,
}

impl SampleBlock {

	pub fn new(samples:Vec<Complex<f64>>, first_idx:usize) -> Self { Self { samples, first_idx } }

	pub fn len(&self) -> usize { self.samples.len() }
	pub fn is_empty(&self) -> bool { self.samples.is_empty() }

}

#[derive(Debug, PartialEq, Clone)]
pub enum AcquisitionErr {
	Configuration(String),
	ReplicaNotBound,
	StreamUnderrun{ available:usize, required:usize },
	NumericDegeneracy(&'static str),
	InvalidTransition{ op:&'static str, state:AcqState },
	Io(String),
}

impl fmt::Display for AcquisitionErr {

	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Configuration(msg)      => write!(f, "configuration error: {}", msg),
			Self::ReplicaNotBound         => write!(f, "search requested before a local code was bound"),
			Self::StreamUnderrun{ available, required } => write!(f, "stream underrun: {} of {} samples available for the dwell", available, required),
			Self::NumericDegeneracy(msg)  => write!(f, "numeric degeneracy: {}", msg),
			Self::InvalidTransition{ op, state } => write!(f, "operation {} is not valid in state {:?}", op, state),
			Self::Io(msg)                 => write!(f, "I/O error: {}", msg),
		}
	}

}

impl std::error::Error for AcquisitionErr {}
