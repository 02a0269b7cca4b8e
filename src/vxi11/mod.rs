// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;
pub const DEFAULT_IO_TIMEOUT:u32 = 10000;

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::io::{self, Error, ErrorKind};

use log::{debug, warn};

use crate::error::Result;
use crate::rpc::port_mapping::{Mapping, TcpPortMapperClient};
use crate::rpc::tcp_client::TcpClient;
use crate::transport::Transport;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

fn device_error(code:i32) -> io::Result<()> {
	let msg = match code {
		0  => return Ok(()),
		1  => "Syntax error",
		3  => "Device not accessible",
		4  => "Invalid link identifier",
		5  => "Parameter error",
		6  => "Channel not established",
		8  => "Operation not supported",
		9  => "Out of resources",
		11 => "Device locked by another link",
		12 => "No lock held by this link",
		15 => return Err(Error::new(ErrorKind::TimedOut, "I/O timeout")),
		17 => "I/O error",
		21 => "Invalid address",
		23 => "Abort",
		29 => "Channel already established",
		_  => "Unknown VXI-11 device error",
	};
	Err(err(msg))
}

pub struct Link {
	pub link_id: i32,
	pub abort_port: u32,
	pub max_recv_size: u32,
}

/// A client for the VXI-11 core channel of one instrument
pub struct CoreClient {
	client: TcpClient,
	opt_link: Option<Link>,
}

impl CoreClient {

	fn get_link(&self) -> io::Result<&Link> {
		self.opt_link.as_ref().ok_or_else(|| err("No link"))
	}

	pub fn new(host:&str) -> io::Result<Self> {
		// Find the port to use for the core program
		let port:u16 = TcpPortMapperClient::new(host)?.get_port(&Mapping::tcp(DEVICE_CORE_PROG, DEVICE_CORE_VERS))?;

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS)?;
		debug!("Connected to VXI-11 core channel at {}:{}", host, port);

		Ok(CoreClient{ client, opt_link: None })
	}

	pub fn create_link(&mut self, device:&str) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(err("Already connected to a link"));
		}
		if !device.is_ascii() {
			return Err(Error::new(ErrorKind::InvalidInput, "VXI-11 device names are ASCII"));
		}

		self.client.start_call(CREATE_LINK)?;
		self.client.packer.pack_i32(CLIENT_ID)?;
		self.client.packer.pack_bool(false)?;
		self.client.packer.pack_u32(DEFAULT_LOCK_TIMEOUT)?;
		self.client.packer.pack_variable_len_opaque(device.as_bytes())?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;
		device_error(error)?;

		debug!("Created link {} to {:?}, max_recv_size={}", link_id, device, max_recv_size);
		self.opt_link = Some(Link{ link_id, abort_port, max_recv_size });
		Ok(())
	}

	/// Writes one message, split into chunks the device can take, with END set on the last one
	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let (link_id, max_recv_size) = {
			let link = self.get_link()?;
			(link.link_id, link.max_recv_size.max(1) as usize)
		};

		let chunks:Vec<&[u8]> = if data.is_empty() { vec![data] } else { data.chunks(max_recv_size).collect() };
		let n_chunks = chunks.len();
		for (idx, chunk) in chunks.into_iter().enumerate() {
			let flags:i32 = if idx + 1 == n_chunks { OPERATION_FLAGS_END } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			self.client.packer.pack_i32(link_id)?;
			self.client.packer.pack_u32(DEFAULT_IO_TIMEOUT)?;
			self.client.packer.pack_u32(DEFAULT_LOCK_TIMEOUT)?;
			self.client.packer.pack_i32(flags)?;
			self.client.packer.pack_variable_len_opaque(chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			device_error(error)?;

			if size as usize != chunk.len() {
				return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
			}
		}

		Ok(())
	}

	/// Reads until the device flags the end of the message
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link_id:i32 = self.get_link()?.link_id;
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			self.client.packer.pack_i32(link_id)?;
			self.client.packer.pack_u32(u32::MAX)?;
			self.client.packer.pack_u32(DEFAULT_IO_TIMEOUT)?;
			self.client.packer.pack_u32(DEFAULT_LOCK_TIMEOUT)?;
			self.client.packer.pack_i32(0)?;
			self.client.packer.pack_i32(0)?;
			self.client.do_call()?;

			let error:i32  = self.client.unpacker.unpack_i32()?;
			let reason:i32 = self.client.unpacker.unpack_i32()?;
			let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
			device_error(error)?;

			ans.extend_from_slice(&data);

			if reason & !(REASON_REQCNT | REASON_CHR | REASON_END) != 0 {
				return Err(err("Bits in reason code that should be zero aren't zero"));
			}
			if reason & REASON_END != 0 { return Ok(ans); }
			if data.is_empty() && reason == 0 {
				return Err(err("Device returned neither data nor an end-of-message reason"));
			}
		}
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link_id:i32 = self.get_link()?.link_id;

		self.client.start_call(DESTROY_LINK)?;
		self.client.packer.pack_i32(link_id)?;
		self.client.do_call()?;

		let error:i32 = self.client.unpacker.unpack_i32()?;
		self.opt_link = None;
		debug!("Destroyed link {}", link_id);
		device_error(error)
	}

}

impl Transport for CoreClient {

	fn write(&mut self, command:&str) -> Result<()> {
		debug!("> {}", command);
		CoreClient::write(self, command.as_bytes())?;
		Ok(())
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		Ok(CoreClient::read(self)?)
	}

}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if self.opt_link.is_some() {
			if let Err(e) = self.destroy_link() {
				warn!("Unable to destroy VXI-11 link: {}", e);
			}
		}
	}

}
