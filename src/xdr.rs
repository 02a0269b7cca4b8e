
use std::io::{self, Cursor, Error, ErrorKind, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

#[derive(Default)]
pub struct Packer {
	pub buff:Vec<u8>
}

// Reading walks a cursor over the buffer instead of shifting bytes out of the front of it, since a
// single device_read reply can carry a few hundred kilobytes of waveform data
#[derive(Default)]
pub struct Unpacker {
	buff:Vec<u8>,
	pos:usize,
}

impl Packer {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	// Every method here adds a multiple of four bytes, so alignment is preserved as long as we start aligned
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }
	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }
	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.write_all(data)?;

		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

}

impl Unpacker {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }
	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	fn skip(&mut self, n:usize) -> io::Result<()> {
		if n > self.remaining() {
			return Err(err("Tried to skip past the end of the XDR buffer"));
		}
		self.pos += n;
		Ok(())
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> {
		let ans:u32 = Cursor::new(&self.buff[self.pos..]).read_u32::<BigEndian>()?;
		self.skip(4)?;
		Ok(ans)
	}

	pub fn unpack_i32(&mut self) -> io::Result<i32> {
		let ans:i32 = Cursor::new(&self.buff[self.pos..]).read_i32::<BigEndian>()?;
		self.skip(4)?;
		Ok(ans)
	}

	// The set of legal values depends on the caller, so at this level an enum is just an i32
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(err("Expected 0 or 1 for an XDR bool")),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		if n > self.remaining() {
			return Err(err("XDR opaque length runs past the end of the buffer"));
		}
		let ans:Vec<u8> = self.buff[self.pos..self.pos + n].to_vec();

		let padded = (n + 3) & !3;
		self.skip(padded.min(self.remaining()))?;
		Ok(ans)
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opaque_is_padded_to_four_bytes() {
		let mut packer = Packer::new();
		packer.pack_variable_len_opaque(b"inst0").unwrap();
		assert_eq!(packer.as_bytes(), &[0, 0, 0, 5, b'i', b'n', b's', b't', b'0', 0, 0, 0]);

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		assert_eq!(unpacker.unpack_variable_len_opaque().unwrap(), b"inst0".to_vec());
		assert!(unpacker.all_data_consumed());
	}

	#[test]
	fn integers_are_big_endian() {
		let mut packer = Packer::new();
		packer.pack_u32(0x0607af).unwrap();
		packer.pack_i32(-2).unwrap();
		packer.pack_bool(true).unwrap();
		assert_eq!(&packer.as_bytes()[..4], &[0x00, 0x06, 0x07, 0xaf]);

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		assert_eq!(unpacker.unpack_u32().unwrap(), 0x0607af);
		assert_eq!(unpacker.unpack_i32().unwrap(), -2);
		assert!(unpacker.unpack_bool().unwrap());
		assert!(unpacker.unpack_u32().is_err());
	}

	#[test]
	fn bad_bool_is_an_error() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0, 0, 0, 7]);
		assert!(unpacker.unpack_bool().is_err());
	}
}
