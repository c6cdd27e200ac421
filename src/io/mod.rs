use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_complex::Complex;
use serde::{Serialize, Deserialize};

use crate::{AcquisitionErr, Sample, SampleBlock};

/// Pairs interleaved I/Q bytes into complex samples.  A trailing byte without a partner is dropped.
pub fn interleaved_byte_to_complex(bytes:&[i8]) -> Vec<Complex<i8>> {
	bytes.chunks_exact(2).map(|iq| Complex{ re: iq[0], im: iq[1] }).collect()
}

/// Sample formats a file source can be read as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
	/// Interleaved signed bytes
	I8,
	/// Interleaved little-endian signed 16-bit integers
	I16,
}

impl std::str::FromStr for ItemType {
	type Err = AcquisitionErr;

	fn from_str(s:&str) -> Result<Self, Self::Err> {
		match s {
			"i8" | "ibyte" => Ok(ItemType::I8),
			"i16"          => Ok(ItemType::I16),
			other => Err(AcquisitionErr::Configuration(format!("unsupported item type {}", other))),
		}
	}
}

/// Yields complex samples with their stream index from a reader of interleaved I/Q
pub struct IqSource<R: Read> {
	src: R,
	item_type: ItemType,
	idx: usize,
}

impl<R: Read> IqSource<R> {

	pub fn new(src:R, item_type:ItemType) -> Self { Self { src, item_type, idx: 0 } }

	pub fn item_type(&self) -> ItemType { self.item_type }

	fn read_pair(&mut self) -> std::io::Result<Complex<f64>> {
		match self.item_type {
			ItemType::I8 => {
				let mut bytes = [0i8; 2];
				self.src.read_i8_into(&mut bytes)?;
				let c = interleaved_byte_to_complex(&bytes)[0];
				Ok(Complex{ re: c.re as f64, im: c.im as f64 })
			},
			ItemType::I16 => {
				let re = self.src.read_i16::<LittleEndian>()?;
				let im = self.src.read_i16::<LittleEndian>()?;
				Ok(Complex{ re: re as f64, im: im as f64 })
			},
		}
	}

}

impl IqSource<std::io::BufReader<File>> {

	pub fn from_file(filename:&str, item_type:ItemType) -> Result<Self, AcquisitionErr> {
		let file = File::open(filename).map_err(|e| AcquisitionErr::Io(format!("unable to open {}: {}", filename, e)))?;
		Ok(Self::new(std::io::BufReader::new(file), item_type))
	}

}

impl<R: Read> Iterator for IqSource<R> {
	type Item = Sample;

	// Ends at the end of the stream, on a partial sample or on a read error
	fn next(&mut self) -> Option<Sample> {
		match self.read_pair() {
			Ok(val) => {
				let ans = Sample{ val, idx: self.idx };
				self.idx += 1;
				Some(ans)
			},
			Err(_) => None,
		}
	}
}

/// Groups a sample stream into `SampleBlock`s of `block_len` samples.  The last block may be shorter.
pub struct SampleBlocks<I: Iterator<Item=Sample>> {
	src: I,
	block_len: usize,
}

impl<I: Iterator<Item=Sample>> SampleBlocks<I> {

	pub fn new(src:I, block_len:usize) -> Result<Self, AcquisitionErr> {
		if block_len == 0 {
			return Err(AcquisitionErr::Configuration("block length must be positive".to_string()));
		}
		Ok(Self { src, block_len })
	}

}

impl<I: Iterator<Item=Sample>> Iterator for SampleBlocks<I> {
	type Item = SampleBlock;

	fn next(&mut self) -> Option<SampleBlock> {
		let first = self.src.next()?;
		let mut samples:Vec<Complex<f64>> = Vec::with_capacity(self.block_len);
		samples.push(first.val);
		while samples.len() < self.block_len {
			match self.src.next() {
				Some(s) => samples.push(s.val),
				None => break,
			}
		}
		Some(SampleBlock::new(samples, first.idx))
	}
}

/// Writes one dwell's folded correlation grid: u32 bin count, u32 cells per bin, then for each bin its Doppler
/// as f64 followed by the cells as f32, all little-endian
pub fn write_grid_dump(path:&str, dopplers_hz:&[f64], grid:&[Vec<f64>]) -> Result<(), AcquisitionErr> {
	let io_err = |e:std::io::Error| AcquisitionErr::Io(format!("unable to write {}: {}", path, e));

	let file = File::create(path).map_err(io_err)?;
	let mut out = BufWriter::new(file);
	write_grid(&mut out, dopplers_hz, grid).map_err(io_err)?;
	out.flush().map_err(io_err)
}

fn write_grid<W: Write>(out:&mut W, dopplers_hz:&[f64], grid:&[Vec<f64>]) -> std::io::Result<()> {
	if dopplers_hz.len() != grid.len() {
		return Err(std::io::Error::new(ErrorKind::InvalidInput, "one Doppler value is needed per grid row"));
	}

	let cells = grid.first().map(|row| row.len()).unwrap_or(0);
	out.write_u32::<LittleEndian>(grid.len() as u32)?;
	out.write_u32::<LittleEndian>(cells as u32)?;
	for (doppler, row) in dopplers_hz.iter().zip(grid) {
		if row.len() != cells {
			return Err(std::io::Error::new(ErrorKind::InvalidInput, "grid rows differ in length"));
		}
		out.write_f64::<LittleEndian>(*doppler)?;
		for p in row { out.write_f32::<LittleEndian>(*p as f32)?; }
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn interleaved_bytes_pair_up() {
		let bytes:Vec<i8> = vec![1, -2, 3, -4, 5];
		assert_eq!(interleaved_byte_to_complex(&bytes), vec![Complex{ re: 1, im: -2 }, Complex{ re: 3, im: -4 }]);
		assert!(interleaved_byte_to_complex(&[]).is_empty());
	}

	#[test]
	fn i16_source_reads_little_endian_pairs() {
		let mut raw:Vec<u8> = vec![];
		for v in [100i16, -100, -32768, 32767].iter() { raw.write_i16::<LittleEndian>(*v).unwrap(); }
		raw.push(0x7f);

		let samples:Vec<Sample> = IqSource::new(Cursor::new(raw), ItemType::I16).collect();
		assert_eq!(samples.len(), 2);
		assert_eq!(samples[0].val, Complex{ re: 100.0, im: -100.0 });
		assert_eq!(samples[1].val, Complex{ re: -32768.0, im: 32767.0 });
		assert_eq!(samples[1].idx, 1);
	}

	#[test]
	fn i8_source_uses_byte_adapter() {
		let raw:Vec<u8> = vec![0x01, 0xff, 0x80, 0x7f];
		let samples:Vec<Sample> = IqSource::new(Cursor::new(raw), ItemType::I8).collect();
		assert_eq!(samples.iter().map(|s| s.val).collect::<Vec<_>>(),
			vec![Complex{ re: 1.0, im: -1.0 }, Complex{ re: -128.0, im: 127.0 }]);
	}

	#[test]
	fn blocks_carry_first_index_and_short_tail() {
		let src = (0..10).map(|idx| Sample{ val: Complex{ re: idx as f64, im: 0.0 }, idx });
		let blocks:Vec<SampleBlock> = SampleBlocks::new(src, 4).unwrap().collect();
		assert_eq!(blocks.iter().map(|b| (b.first_idx, b.len())).collect::<Vec<_>>(), vec![(0, 4), (4, 4), (8, 2)]);
		assert_eq!(blocks[2].samples[1].re, 9.0);

		assert!(SampleBlocks::new(std::iter::empty::<Sample>(), 0).is_err());
	}

	#[test]
	fn grid_dump_layout() {
		let mut out:Vec<u8> = vec![];
		write_grid(&mut out, &[-250.0, 250.0], &[vec![0.5, 0.25, 0.0], vec![1.0, 0.0, 0.125]]).unwrap();
		assert_eq!(out.len(), 4 + 4 + 2 * (8 + 3 * 4));

		let mut rdr = Cursor::new(out);
		assert_eq!(rdr.read_u32::<LittleEndian>().unwrap(), 2);
		assert_eq!(rdr.read_u32::<LittleEndian>().unwrap(), 3);
		assert_eq!(rdr.read_f64::<LittleEndian>().unwrap(), -250.0);
		assert_eq!(rdr.read_f32::<LittleEndian>().unwrap(), 0.5);

		assert!(write_grid(&mut vec![], &[0.0], &[]).is_err());
	}

	#[test]
	fn item_type_parses_cli_names() {
		assert_eq!("i16".parse::<ItemType>().unwrap(), ItemType::I16);
		assert_eq!("ibyte".parse::<ItemType>().unwrap(), ItemType::I8);
		assert!("f32".parse::<ItemType>().is_err());
	}
}
