
use std::io::{self, Error, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::xdr::{Packer, Unpacker};
use super::{pack_callheader_no_auth, unpack_replyheader};

const LAST_FRAGMENT:u32 = 0x8000_0000;

/// Sends one RPC message as a single record-marked fragment
pub fn write_record<W: Write>(wtr:&mut W, msg:&[u8]) -> io::Result<()> {
	let mut send_bytes:Vec<u8> = Vec::with_capacity(msg.len() + 4);
	send_bytes.write_u32::<BigEndian>(msg.len() as u32 | LAST_FRAGMENT)?;
	send_bytes.extend_from_slice(msg);
	wtr.write_all(&send_bytes)?;
	wtr.flush()
}

/// Reads fragments until one carries the last-fragment bit and returns the reassembled record
pub fn read_record<R: Read>(rdr:&mut R) -> io::Result<Vec<u8>> {
	let mut reply:Vec<u8> = vec![];

	let mut last:bool = false;
	while !last {
		let x:u32 = rdr.read_u32::<BigEndian>()?;
		last = (x & LAST_FRAGMENT) != 0;
		let n = (x & !LAST_FRAGMENT) as usize;

		let start = reply.len();
		reply.resize(start + n, 0);
		rdr.read_exact(&mut reply[start..])?;
	}

	Ok(reply)
}

pub struct TcpClient<S = TcpStream> {
	stream: S,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: Packer,
	pub unpacker: Unpacker,
}

impl TcpClient<TcpStream> {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_nodelay(true)?;
		Ok(Self::over(stream, prog, vers))
	}

}

impl<S: Read + Write> TcpClient<S> {

	pub fn over(stream:S, prog:u32, vers:u32) -> Self {
		Self{ stream, prog, vers, lastxid: 0, packer: Packer::new(), unpacker: Unpacker::new() }
	}

	/// Starts a new call: bumps the xid and packs the header. Arguments get packed after this.
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	/// Sends the packed call and loads the matching reply body into the unpacker
	pub fn do_call(&mut self) -> io::Result<()> {
		write_record(&mut self.stream, self.packer.as_bytes())?;

		loop {
			let reply = read_record(&mut self.stream)?;
			self.unpacker.reset(&reply);

			let xid = unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Stale reply to an earlier call
				debug!("Discarding RPC reply with stale xid {} (expected {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::Other, "Somehow got an RPC reply from the future"));
			}
		}
	}

}
