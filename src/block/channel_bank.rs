use std::collections::VecDeque;
use std::marker::PhantomData;

use tracing::warn;

use crate::AcquisitionErr;
use crate::block::{BlockFunctionality as BlkFunc, BlockResult};

/// Hands every input to each of its channels and merges their outputs into one queue
pub struct ChannelBank<C: Clone, D, T: Clone, U, A: BlkFunc<C, D, T, U>> {
	channels:Vec<A>,
	output_buffer:VecDeque<U>,
	pc: PhantomData<C>,
	pd: PhantomData<D>,
	pt: PhantomData<T>,
}

impl<C: Clone, D, T: Clone, U, A: BlkFunc<C, D, T, U>> ChannelBank<C, D, T, U, A> {

	pub fn from_iter<I: Iterator<Item=A>>(iter:I) -> Self {
		let channels = iter.collect();
		Self { channels, output_buffer: VecDeque::new(), pc: PhantomData, pd: PhantomData, pt: PhantomData }
	}

	pub fn len(&self) -> usize { self.channels.len() }
	pub fn is_empty(&self) -> bool { self.channels.is_empty() }

	pub fn channels(&self) -> &[A] { &self.channels }

	// Channels usually return NotReady, so outputs shouldn't pile up faster than they're drained; this shows
	// how many are waiting
	pub fn output_buffer_len(&self) -> usize { self.output_buffer.len() }

	/// Sends a control message to a single channel
	pub fn control_one(&mut self, idx:usize, c:&C) -> Result<D, AcquisitionErr> {
		let len = self.channels.len();
		match self.channels.get_mut(idx) {
			Some(channel) => channel.control(c),
			None => Err(AcquisitionErr::Configuration(format!("no channel {} in a bank of {}", idx, len))),
		}
	}

	/// Removes every output that's waiting
	pub fn drain_outputs(&mut self) -> Vec<U> { self.output_buffer.drain(..).collect() }

}

impl<C: Clone, D, T: Clone, U, A: BlkFunc<C, D, T, U>> BlkFunc<C, Vec<D>, T, U> for ChannelBank<C, D, T, U, A> {

	// The control input is applied to all channels and a vector of all responses is returned
	fn control(&mut self, c:&C) -> Result<Vec<D>, AcquisitionErr> {
		let mut ans = vec![];
		for channel in self.channels.iter_mut() {
			ans.push(channel.control(c)?);
		}
		Ok(ans)
	}

	// Every channel sees the input even when one of them fails; the first error is returned and the rest are logged
	fn apply(&mut self, input:&T) -> BlockResult<U> {
		let mut first_err:Option<AcquisitionErr> = None;
		for (idx, channel) in self.channels.iter_mut().enumerate() {
			match channel.apply(input) {
				BlockResult::NotReady => (),
				BlockResult::Ready(u) => self.output_buffer.push_back(u),
				BlockResult::Err(e)   => match first_err {
					None    => first_err = Some(e),
					Some(_) => warn!(channel = idx, "{}", e),
				},
			}
		}

		if let Some(e) = first_err { return BlockResult::Err(e); }

		match self.output_buffer.pop_front() {
			Some(u) => BlockResult::Ready(u),
			None    => BlockResult::NotReady,
		}
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	// Emits the running sum every `every` inputs and fails on anything above `max`
	struct Summer { every:usize, max:i64, count:usize, sum:i64 }

	impl BlkFunc<bool, i64, i64, i64> for Summer {
		fn control(&mut self, clear:&bool) -> Result<i64, AcquisitionErr> {
			if *clear { self.sum = 0; self.count = 0; }
			Ok(self.sum)
		}

		fn apply(&mut self, input:&i64) -> BlockResult<i64> {
			if *input < 0 || *input > self.max { return BlockResult::Err(AcquisitionErr::ReplicaNotBound); }
			self.sum += input;
			self.count += 1;
			if self.count % self.every == 0 { BlockResult::Ready(self.sum) } else { BlockResult::NotReady }
		}
	}

	fn bank() -> ChannelBank<bool, i64, i64, i64, Summer> {
		ChannelBank::from_iter((1..=3).map(|every| Summer{ every, max: std::i64::MAX, count: 0, sum: 0 }))
	}

	#[test]
	fn outputs_are_merged_in_channel_order() {
		let mut bank = bank();
		assert_eq!(bank.len(), 3);

		// Input 1: only the first channel is ready
		assert_eq!(bank.apply(&1).into_result().unwrap(), Some(1));
		assert_eq!(bank.output_buffer_len(), 0);

		// Input 2: channels 0 and 1 are ready; one comes out now, the other waits
		assert_eq!(bank.apply(&2).into_result().unwrap(), Some(3));
		assert_eq!(bank.output_buffer_len(), 1);
		assert_eq!(bank.drain_outputs(), vec![3]);
	}

	#[test]
	fn control_reaches_every_channel() {
		let mut bank = bank();
		for x in 1..=6 { let _ = bank.apply(&x); }
		assert_eq!(bank.control(&false).unwrap(), vec![21, 21, 21]);
		assert_eq!(bank.control_one(1, &true).unwrap(), 0);
		assert_eq!(bank.control(&false).unwrap(), vec![21, 0, 21]);
		assert!(bank.control_one(7, &true).is_err());
	}

	#[test]
	fn channel_error_is_propagated() {
		let mut bank = bank();
		match bank.apply(&-1) {
			BlockResult::Err(AcquisitionErr::ReplicaNotBound) => {},
			_ => panic!("expected the channel error"),
		}
	}

	#[test]
	fn failing_channel_does_not_starve_the_rest() {
		let mut bank = ChannelBank::from_iter(vec![
			Summer{ every: 1, max: 5, count: 0, sum: 0 },
			Summer{ every: 1, max: std::i64::MAX, count: 0, sum: 0 },
			Summer{ every: 2, max: std::i64::MAX, count: 0, sum: 0 },
		].into_iter());

		match bank.apply(&10) {
			BlockResult::Err(AcquisitionErr::ReplicaNotBound) => {},
			_ => panic!("expected the first channel's error"),
		}

		// The later channels still took the input and the ready one's output is waiting
		assert_eq!(bank.control(&false).unwrap(), vec![0, 10, 10]);
		assert_eq!(bank.drain_outputs(), vec![10]);
	}
}
