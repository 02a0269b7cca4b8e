//! The link an instrument driver talks through.
//!
//! Drivers only need three primitives: send a command, read a text reply, and read an IEEE 488.2
//! definite-length binary block. Anything that can move bytes to and from an instrument implements
//! [`Transport`] by providing `write` and `read_raw`; the query helpers come for free.

use std::str;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::debug;

use crate::error::{Result, ScopeError};

/// Byte order of 16-bit words in a binary block, named the way SCPI names it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder { LsbFirst, MsbFirst }

impl WordOrder {
	pub fn is_big_endian(self) -> bool { self == WordOrder::MsbFirst }

	pub fn scpi(self) -> &'static str {
		match self {
			WordOrder::LsbFirst => "LSBFirst",
			WordOrder::MsbFirst => "MSBFirst",
		}
	}
}

pub trait Transport {

	/// Sends one command. No reply is read.
	fn write(&mut self, command:&str) -> Result<()>;

	/// Reads one complete reply message
	fn read_raw(&mut self) -> Result<Vec<u8>>;

	fn query(&mut self, command:&str) -> Result<String> {
		self.write(command)?;
		let raw:Vec<u8> = self.read_raw()?;
		match str::from_utf8(&raw) {
			Ok(s)  => Ok(s.trim().to_owned()),
			Err(_) => Err(ScopeError::MalformedResponse{
				command: command.to_owned(),
				response: String::from_utf8_lossy(&raw).into_owned(),
			}),
		}
	}

	/// Sends a query whose reply is a binary block of signed 16-bit words
	fn query_binary_values(&mut self, command:&str, order:WordOrder) -> Result<Vec<i16>> {
		self.write(command)?;
		let raw:Vec<u8> = self.read_raw()?;
		let body:&[u8] = parse_block(&raw)?;
		let words = decode_words(body, order)?;
		debug!("{} -> {} words", command, words.len());
		Ok(words)
	}

}

impl<T: Transport + ?Sized> Transport for &mut T {
	fn write(&mut self, command:&str) -> Result<()> { (**self).write(command) }
	fn read_raw(&mut self) -> Result<Vec<u8>> { (**self).read_raw() }
}

/// Strips the `#<n><length>` header (and whatever trails the payload) from a binary block.
///
/// `#0` introduces an indefinite-length block, which runs to the end of the message. Its trailing
/// newline is only dropped when it leaves an even number of bytes, so a last word whose high byte
/// is 0x0A survives.
pub fn parse_block(raw:&[u8]) -> Result<&[u8]> {
	let start = raw.iter().position(|b| !b.is_ascii_whitespace())
		.ok_or_else(|| ScopeError::MalformedBlock("empty reply".to_owned()))?;
	let raw = &raw[start..];

	if raw.len() < 2 || raw[0] != b'#' {
		return Err(ScopeError::MalformedBlock("reply does not start with '#'".to_owned()));
	}

	let n_digits = match (raw[1] as char).to_digit(10) {
		Some(n) => n as usize,
		None    => return Err(ScopeError::MalformedBlock(format!("invalid length digit count {:?}", raw[1] as char))),
	};

	if n_digits == 0 {
		let body = &raw[2..];
		return Ok(match body.last() {
			Some(b'\n') if body.len() % 2 == 1 => &body[..body.len() - 1],
			_                                   => body,
		});
	}

	let header_len = 2 + n_digits;
	if raw.len() < header_len {
		return Err(ScopeError::MalformedBlock("header is truncated".to_owned()));
	}

	let len:usize = str::from_utf8(&raw[2..header_len]).ok()
		.and_then(|s| s.parse::<usize>().ok())
		.ok_or_else(|| ScopeError::MalformedBlock("length field is not a number".to_owned()))?;

	if raw.len() < header_len + len {
		return Err(ScopeError::MalformedBlock(format!("expected {} data bytes, got {}", len, raw.len() - header_len)));
	}

	Ok(&raw[header_len..header_len + len])
}

pub fn decode_words(body:&[u8], order:WordOrder) -> Result<Vec<i16>> {
	if body.len() % 2 != 0 {
		return Err(ScopeError::MalformedBlock(format!("odd byte count {} for 16-bit words", body.len())));
	}

	let mut ans:Vec<i16> = vec![0; body.len() / 2];
	match order {
		WordOrder::LsbFirst => LittleEndian::read_i16_into(body, &mut ans),
		WordOrder::MsbFirst => BigEndian::read_i16_into(body, &mut ans),
	}
	Ok(ans)
}

/// Builds a definite-length block around `body`, the way an instrument sends one
pub fn encode_block(body:&[u8]) -> Vec<u8> {
	let len:String = body.len().to_string();
	let mut ans:Vec<u8> = format!("#{}{}", len.len(), len).into_bytes();
	ans.extend_from_slice(body);
	ans.push(b'\n');
	ans
}
