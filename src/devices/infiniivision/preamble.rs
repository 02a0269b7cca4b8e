//! `:WAVeform:PREamble?` and the scaling constants it carries.
//!
//! The reply is ten comma-separated fields:
//!
//! | idx | field      | notes                                      |
//! |-----|------------|--------------------------------------------|
//! | 0   | format     | 0 BYTE, 1 WORD, 4 ASCii                    |
//! | 1   | type       | 0 NORMal, 1 PEAK, 2 AVERage, 3 HRESolution |
//! | 2   | points     |                                            |
//! | 3   | count      | averages, 1 otherwise                      |
//! | 4   | xincrement | seconds between points                     |
//! | 5   | xorigin    | time of the first point                    |
//! | 6   | xreference | always 0                                   |
//! | 7   | yincrement | volts per ADC code                         |
//! | 8   | yorigin    | volts at center screen                     |
//! | 9   | yreference | ADC code at yorigin                        |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};

pub const PREAMBLE_FIELDS:usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformFormat { Byte, Word, Ascii }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionType {
	Normal,
	/// A low and a high sample for every point
	Peak,
	Average,
	HighResolution,
	Other(u32),
}

impl AcquisitionType {
	pub fn from_code(code:u32) -> Self {
		match code {
			0 => AcquisitionType::Normal,
			1 => AcquisitionType::Peak,
			2 => AcquisitionType::Average,
			3 => AcquisitionType::HighResolution,
			c => AcquisitionType::Other(c),
		}
	}

	pub fn is_peak_detect(self) -> bool { self == AcquisitionType::Peak }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preamble {
	pub format: WaveformFormat,
	pub acquisition_type: AcquisitionType,
	pub points: usize,
	pub count: u32,
	pub x_increment: f64,
	pub x_origin: f64,
	pub x_reference: f64,
	pub y_increment: f64,
	pub y_origin: f64,
	pub y_reference: f64,
}

fn malformed(reason:String, response:&str) -> ScopeError {
	ScopeError::MalformedPreamble{ reason, response: response.to_owned() }
}

// Integer fields come back either as "+62500" or in exponent notation depending on firmware
fn int_field(fields:&[f64], idx:usize, response:&str) -> Result<u32> {
	let x:f64 = fields[idx];
	if x.fract() != 0.0 || x < 0.0 || x > u32::MAX as f64 {
		return Err(malformed(format!("field {} is not a non-negative integer", idx), response));
	}
	Ok(x as u32)
}

impl FromStr for Preamble {
	type Err = ScopeError;

	fn from_str(response:&str) -> Result<Self> {
		let fields:Vec<f64> = response.trim().split(',')
			.enumerate()
			.map(|(idx, s)| s.trim().parse::<f64>()
				.map_err(|_| malformed(format!("field {} ({:?}) is not a number", idx, s.trim()), response)))
			.collect::<Result<Vec<f64>>>()?;

		if fields.len() != PREAMBLE_FIELDS {
			return Err(malformed(format!("expected {} fields, found {}", PREAMBLE_FIELDS, fields.len()), response));
		}

		// f64 parsing accepts "NaN" and "inf"
		if let Some(idx) = (4..PREAMBLE_FIELDS).find(|idx| !fields[*idx].is_finite()) {
			return Err(malformed(format!("field {} ({}) is not finite", idx, fields[idx]), response));
		}

		let format = match int_field(&fields, 0, response)? {
			0 => WaveformFormat::Byte,
			1 => WaveformFormat::Word,
			4 => WaveformFormat::Ascii,
			x => return Err(malformed(format!("unknown waveform format {}", x), response)),
		};

		Ok(Preamble{
			format,
			acquisition_type: AcquisitionType::from_code(int_field(&fields, 1, response)?),
			points:      int_field(&fields, 2, response)? as usize,
			count:       int_field(&fields, 3, response)?,
			x_increment: fields[4],
			x_origin:    fields[5],
			x_reference: fields[6],
			y_increment: fields[7],
			y_origin:    fields[8],
			y_reference: fields[9],
		})
	}
}

/// Vertical scaling for one channel: `volts = (code - y_reference) * y_increment + y_origin`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
	pub y_increment: f64,
	pub y_origin: f64,
	pub y_reference: f64,
}

impl ChannelCalibration {
	pub fn scale(&self, raw:i16) -> f64 {
		(raw as f64 - self.y_reference) * self.y_increment + self.y_origin
	}

	/// The ADC code a scaled value came from
	pub fn unscale(&self, volts:f64) -> i32 {
		((volts - self.y_origin) / self.y_increment + self.y_reference).round() as i32
	}
}

impl From<&Preamble> for ChannelCalibration {
	fn from(p:&Preamble) -> Self {
		ChannelCalibration{ y_increment: p.y_increment, y_origin: p.y_origin, y_reference: p.y_reference }
	}
}

/// Horizontal scaling, shared by every channel and segment of a capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimebaseCalibration {
	pub x_increment: f64,
	pub x_origin: f64,
	pub x_reference: f64,
	pub acquisition_type: AcquisitionType,
}

impl TimebaseCalibration {
	pub fn is_peak_detect(&self) -> bool { self.acquisition_type.is_peak_detect() }

	/// Samples the instrument sends per reported point
	pub fn samples_per_point(&self) -> usize { if self.is_peak_detect() { 2 } else { 1 } }

	/// Timestamps for `points` points. In peak detect mode the data alternates low(t0), high(t0),
	/// low(t1), ... so every timestamp is repeated.
	pub fn time_axis(&self, points:usize) -> Vec<f64> {
		let reps = self.samples_per_point();
		let mut ans:Vec<f64> = Vec::with_capacity(points * reps);
		for i in 0..points {
			let t:f64 = (i as f64 - self.x_reference) * self.x_increment + self.x_origin;
			for _ in 0..reps { ans.push(t); }
		}
		ans
	}
}

impl From<&Preamble> for TimebaseCalibration {
	fn from(p:&Preamble) -> Self {
		TimebaseCalibration{
			x_increment: p.x_increment,
			x_origin: p.x_origin,
			x_reference: p.x_reference,
			acquisition_type: p.acquisition_type,
		}
	}
}
