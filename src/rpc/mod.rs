// ONC RPC version 2 (RFC 5531), only the client side and only AUTH_NONE, which is all a VXI-11
// instrument asks for

pub const RPCVERSION:u32 = 2;

pub const CALL:i32  = 0;
pub const REPLY:i32 = 1;

pub const MSG_ACCEPTED:i32 = 0;
pub const MSG_DENIED:i32   = 1;

pub const RPC_MISMATCH:i32 = 0;
pub const AUTH_ERROR:i32   = 1;

pub const SUCCESS:i32       = 0;      // RPC executed successfully
pub const PROG_UNAVAIL:i32  = 1;      // remote hasn't exported program
pub const PROG_MISMATCH:i32 = 2;      // remote can't support version #
pub const PROC_UNAVAIL:i32  = 3;      // program can't support procedure
pub const GARBAGE_ARGS:i32  = 4;      // procedure can't decode params

pub const AUTH_NONE:i32 = 0;

pub const IPPROTO_TCP:u32 = 6;

use std::io::{self, Error, ErrorKind};

use crate::xdr::{Packer, Unpacker};

pub mod port_mapping;
pub mod tcp_client;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn pack_callheader_no_auth(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32) -> io::Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prc)?;

	// Credentials and verifier, both AUTH_NONE with an empty body
	for _ in 0..2 {
		packer.pack_enum(AUTH_NONE)?;
		packer.pack_variable_len_opaque(&[])?;
	}
	Ok(())
}

/// Consumes an accepted, successful reply header and returns its transaction id. Everything else
/// the server can say at this level is turned into an error.
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<u32> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(err("Expected REPLY message type in RPC reply header")); }

	match unpacker.unpack_enum()? {
		MSG_ACCEPTED => { },
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => Err(err("RPC call denied due to RPC_MISMATCH")),
				AUTH_ERROR   => Err(err("RPC call denied due to AUTH_ERROR")),
				_            => Err(err("RPC call denied for an unknown reason")),
			};
		},
		_ => return Err(err("Neither MSG_DENIED nor MSG_ACCEPTED in RPC reply header")),
	}

	// Verifier; nothing to check with AUTH_NONE
	unpacker.unpack_enum()?;
	unpacker.unpack_variable_len_opaque()?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(xid),
		PROG_UNAVAIL  => Err(err("RPC program unavailable")),
		PROG_MISMATCH => Err(err("RPC program version mismatch")),
		PROC_UNAVAIL  => Err(err("RPC procedure unavailable")),
		GARBAGE_ARGS  => Err(err("RPC server could not decode the arguments")),
		_             => Err(err("RPC call failed for an unknown reason")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn accepted_reply(xid:u32, stat:i32) -> Unpacker {
		let mut p = Packer::new();
		p.pack_u32(xid).unwrap();
		p.pack_enum(REPLY).unwrap();
		p.pack_enum(MSG_ACCEPTED).unwrap();
		p.pack_enum(AUTH_NONE).unwrap();
		p.pack_variable_len_opaque(&[]).unwrap();
		p.pack_enum(stat).unwrap();
		p.pack_u32(42).unwrap();

		let mut u = Unpacker::new();
		u.reset(p.as_bytes());
		u
	}

	#[test]
	fn call_header_layout() {
		let mut p = Packer::new();
		pack_callheader_no_auth(&mut p, 7, 0x0607af, 1, 10).unwrap();
		// xid, CALL, version, prog, vers, proc, two empty auths
		assert_eq!(p.as_bytes().len(), 6*4 + 2*8);
		assert_eq!(&p.as_bytes()[8..12], &[0, 0, 0, 2]);
	}

	#[test]
	fn successful_reply_leaves_the_body() {
		let mut u = accepted_reply(9, SUCCESS);
		assert_eq!(unpack_replyheader(&mut u).unwrap(), 9);
		assert_eq!(u.unpack_u32().unwrap(), 42);
	}

	#[test]
	fn unsuccessful_reply_is_an_error() {
		let mut u = accepted_reply(9, PROG_UNAVAIL);
		assert!(unpack_replyheader(&mut u).is_err());
	}
}
