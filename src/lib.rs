
// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol built on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// What a driver needs from a link: commands, text queries and binary block queries
pub mod transport;

pub mod error;
pub mod config;

// Drivers for specific instruments
pub mod devices;

pub use error::{Result, ScopeError};
pub use transport::{Transport, WordOrder};
