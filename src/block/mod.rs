use crate::AcquisitionErr;

pub mod channel_bank;

pub use channel_bank::ChannelBank;

pub enum BlockResult<U> {
	NotReady,
	Ready(U),
	Err(AcquisitionErr)
}

impl<U> BlockResult<U> {

	pub fn is_ready(&self) -> bool { match self {
		Self::Ready(_) => true,
		_ => false,
	}}

	pub fn into_result(self) -> Result<Option<U>, AcquisitionErr> {
		match self {
			Self::Ready(u) => Ok(Some(u)),
			Self::NotReady => Ok(None),
			Self::Err(e)   => Err(e),
		}
	}

}

// A type that implements BlockFunctionality consumes instances of T and produces Ready(U) if an output is ready,
// NotReady if it isn't, or Err(_) if the operation fails.  Control messages of type C get a response of type D.
pub trait BlockFunctionality<C: Clone, D, T: Clone, U> {

	fn control(&mut self, control:&C) -> Result<D, AcquisitionErr>;
	fn apply(&mut self, input:&T) -> BlockResult<U>;

}
