//! Capture settings, read from a JSON file. Every field has a default, so `{}` is a valid config.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::devices::infiniivision::Channel;
use crate::devices::infiniivision::segmented::ExtractOptions;
use crate::error::{Result, ScopeError};

pub const DEFAULT_OUTPUT:&str = "segments";
pub const DEFAULT_POLL_INTERVAL_MS:u64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRange {
	pub channel: Channel,
	pub volts_per_division: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
	/// Address of the oscilloscope's VXI-11 server
	pub host: Option<String>,
	/// Artifact base name, see `export::artifact_paths`
	pub output: PathBuf,
	pub time_per_division: Option<f64>,
	pub channel_ranges: Vec<ChannelRange>,
	/// Arm a segmented acquisition of this many segments and wait for it before reading out
	pub segment_count: Option<u32>,
	pub poll_interval_ms: u64,
	/// Stop waiting for segments after this long and read out whatever was acquired
	pub acquisition_timeout_s: Option<f64>,
	pub throttle_ms: u64,
	pub blank_unacquired_channels: bool,
}

impl Default for CaptureConfig {
	fn default() -> Self {
		Self{
			host: None,
			output: PathBuf::from(DEFAULT_OUTPUT),
			time_per_division: None,
			channel_ranges: vec![],
			segment_count: None,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			acquisition_timeout_s: None,
			throttle_ms: 0,
			blank_unacquired_channels: true,
		}
	}
}

impl CaptureConfig {

	pub fn load<P: AsRef<Path>>(path:P) -> Result<Self> {
		let path = path.as_ref();
		let text:String = fs::read_to_string(path)
			.map_err(|e| ScopeError::Config(format!("unable to read {}: {}", path.display(), e)))?;
		Self::from_json(&text)
	}

	pub fn from_json(text:&str) -> Result<Self> {
		let cfg:CaptureConfig = serde_json::from_str(text).map_err(|e| ScopeError::Config(e.to_string()))?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<()> {
		if let Some(dt) = self.time_per_division {
			if !(dt.is_finite() && dt > 0.0) {
				return Err(ScopeError::Config(format!("time_per_division must be positive, got {}", dt)));
			}
		}
		for r in &self.channel_ranges {
			if !(r.volts_per_division.is_finite() && r.volts_per_division > 0.0) {
				return Err(ScopeError::Config(format!("volts_per_division for {} must be positive", r.channel)));
			}
		}
		if self.segment_count == Some(0) {
			return Err(ScopeError::Config("segment_count must be at least 1".to_owned()));
		}
		if let Some(t) = self.acquisition_timeout_s {
			if !(t.is_finite() && t >= 0.0) {
				return Err(ScopeError::Config(format!("acquisition_timeout_s must not be negative, got {}", t)));
			}
		}
		if self.output.as_os_str().is_empty() {
			return Err(ScopeError::Config("output must not be empty".to_owned()));
		}
		Ok(())
	}

	pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
	pub fn throttle(&self) -> Duration { Duration::from_millis(self.throttle_ms) }
	pub fn acquisition_timeout(&self) -> Option<Duration> { self.acquisition_timeout_s.map(Duration::from_secs_f64) }

	pub fn extract_options(&self) -> ExtractOptions {
		ExtractOptions{ blank_unacquired_channels: self.blank_unacquired_channels }
	}

}
