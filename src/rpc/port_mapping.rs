
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};

use log::debug;

use super::IPPROTO_TCP;
use super::tcp_client::TcpClient;

#[derive(Debug)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: u32,
	pub port: u32,
}

impl Mapping {
	pub fn tcp(program:u32, version:u32) -> Self { Self{ program, version, protocol: IPPROTO_TCP, port: 0 } }
}

pub struct TcpPortMapperClient {
	client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str) -> io::Result<Self> {
		Ok(Self{ client: TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS)? })
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.client.start_call(PMAPPROC_GETPORT)?;
		self.client.packer.pack_u32(m.program)?;
		self.client.packer.pack_u32(m.version)?;
		self.client.packer.pack_u32(m.protocol)?;
		self.client.packer.pack_u32(m.port)?;
		self.client.do_call()?;

		let port:u32 = self.client.unpacker.unpack_u32()?;
		debug!("Portmapper reports program {:#x} v{} on port {}", m.program, m.version, port);

		if !self.client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::Other, "Data unexpectedly left over in unpacker after unpacking port"));
		}
		match port {
			0 => Err(Error::new(ErrorKind::NotFound, "Program not registered with the portmapper")),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::Other, "Portmapper returned an out-of-range port")),
			p => Ok(p as u16),
		}
	}

}
