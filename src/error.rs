use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScopeError>;

/// Everything that can end a driver call early.
///
/// None of these are retried. Instrument state (segment cursor, export format) is changed a step at
/// a time, so after any of them the caller starts the capture readout over.
#[derive(Debug, Error)]
pub enum ScopeError {
	/// The link to the instrument failed
	#[error("transport error: {0}")]
	Transport(#[from] io::Error),

	/// The instrument reports that no segment has been acquired yet
	#[error("no segments have been acquired")]
	AcquisitionIncomplete,

	/// Channels 1 to 4 are all either off or empty
	#[error("no channel is on and holding data")]
	NoAcquiredChannels,

	#[error("malformed waveform preamble ({reason}): {response:?}")]
	MalformedPreamble {
		reason: String,
		response: String,
	},

	#[error("unexpected response to {command:?}: {response:?}")]
	MalformedResponse {
		command: String,
		response: String,
	},

	#[error("malformed binary block: {0}")]
	MalformedBlock(String),

	#[error("channel {channel} returned {found} samples for segment {segment}, expected {expected}")]
	SampleCountMismatch {
		channel: u8,
		segment: usize,
		expected: usize,
		found: usize,
	},

	#[error("channel {0} does not exist, the InfiniiVision 2000 X-Series has channels 1 to 4")]
	InvalidChannel(u8),

	#[error("connected to a device that is not an InfiniiVision 2000 X-Series oscilloscope: {0:?}")]
	UnexpectedInstrument(String),

	/// Formatting a capture as CSV failed before anything reached the disk
	#[error("unable to render CSV artifact: {0}")]
	Render(#[from] csv::Error),

	#[error("unable to write {path:?}: {source}")]
	Export {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("invalid configuration: {0}")]
	Config(String),
}

impl ScopeError {
	pub(crate) fn response(command:&str, response:&str) -> Self {
		ScopeError::MalformedResponse{ command: command.to_owned(), response: response.to_owned() }
	}
}
