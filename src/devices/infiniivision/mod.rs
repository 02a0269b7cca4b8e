
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};
use crate::transport::{Transport, WordOrder};
use crate::vxi11::CoreClient;

pub mod export;
pub mod preamble;
pub mod segmented;

use self::preamble::Preamble;

lazy_static! {
	static ref IDN_RE: Regex   = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
	static ref MODEL_RE: Regex = Regex::new("^[DM]SO-?X\\s?2\\d{3}[AG]?$").unwrap();
}

pub const DEFAULT_TX_THROTTLE_DURATION_SEC:f32 = 0.0;
pub const DEFAULT_DEVICE_NAME:&str = "inst0";

pub const N_CHANNELS:u8 = 4;
pub const VERTICAL_DIVISIONS:f64 = 8.0;
pub const HORIZONTAL_DIVISIONS:f64 = 10.0;

/// An analog input, 1 through 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
	pub const ALL:[Channel; N_CHANNELS as usize] = [Channel(1), Channel(2), Channel(3), Channel(4)];

	pub fn new(n:u8) -> Result<Self> {
		if (1..=N_CHANNELS).contains(&n) { Ok(Channel(n)) }
		else { Err(ScopeError::InvalidChannel(n)) }
	}

	pub fn number(self) -> u8 { self.0 }
}

impl TryFrom<u8> for Channel {
	type Error = ScopeError;
	fn try_from(n:u8) -> Result<Self> { Channel::new(n) }
}

impl From<Channel> for u8 {
	fn from(ch:Channel) -> u8 { ch.0 }
}

// The SCPI source name
impl fmt::Display for Channel {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { write!(f, "CHANnel{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquireMode { RealTime, Segmented }

impl AcquireMode {
	fn scpi(self) -> &'static str {
		match self {
			AcquireMode::RealTime  => "RTIMe",
			AcquireMode::Segmented => "SEGMented",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct State {
	pub identity: Identity,
	pub time_per_division: f64,
	pub acquire_mode: AcquireMode,
	pub segment_count: u32,
	pub segments_acquired: u32,
	pub channels: Vec<ChannelState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelState {
	pub channel: Channel,
	pub display_enabled: bool,
	pub volts_per_division: f64,
}

fn parse<F: FromStr>(command:&str, response:&str) -> Result<F> {
	response.trim().parse::<F>().map_err(|_| ScopeError::response(command, response))
}

// Integer replies are usually "+5" but some firmware answers "+5.00000E+00"
fn parse_count(command:&str, response:&str) -> Result<u32> {
	if let Ok(n) = response.trim().parse::<u32>() { return Ok(n); }
	let x:f64 = parse(command, response)?;
	if x.fract() == 0.0 && x >= 0.0 && x <= u32::MAX as f64 { Ok(x as u32) }
	else { Err(ScopeError::response(command, response)) }
}

fn parse_bool(command:&str, response:&str) -> Result<bool> {
	match response.trim() {
		"1" | "+1" | "ON"  => Ok(true),
		"0" | "+0" | "OFF" => Ok(false),
		_                  => Err(ScopeError::response(command, response)),
	}
}

/// A Keysight InfiniiVision 2000 X-Series oscilloscope.
///
/// Each method is one transaction: a single command, or a single command plus its reply. Nothing is
/// cached, so every getter goes to the instrument.
pub struct Infiniivision<T: Transport> {
	link: T,
	tx_throttle_duration: Duration,
}

impl Infiniivision<CoreClient> {

	/// Opens a VXI-11 link and checks that the instrument on the other end is one we know how to drive
	pub fn connect(host:&str) -> Result<Self> {
		let mut core = CoreClient::new(host)?;
		core.create_link(DEFAULT_DEVICE_NAME)?;

		let mut scope = Self::new(core);
		let identity = scope.identify()?;
		if !MODEL_RE.is_match(&identity.model) {
			return Err(ScopeError::UnexpectedInstrument(identity.model));
		}
		info!("Connected to {} {} (serial {}, firmware {}) at {}",
			identity.manufacturer, identity.model, identity.serial_num, identity.fw_version, host);

		Ok(scope)
	}

}

impl<T: Transport> Infiniivision<T> {

	pub fn new(link:T) -> Self {
		let tx_throttle_duration = Duration::from_secs_f32(DEFAULT_TX_THROTTLE_DURATION_SEC);
		Self{ link, tx_throttle_duration }
	}

	/// Waits this long before every transaction. Some firmware drops commands that arrive back to back.
	pub fn with_throttle(mut self, throttle:Duration) -> Self {
		self.tx_throttle_duration = throttle;
		self
	}

	pub fn into_inner(self) -> T { self.link }

	fn throttle(&self) {
		if !self.tx_throttle_duration.is_zero() { thread::sleep(self.tx_throttle_duration); }
	}

	pub fn write(&mut self, command:&str) -> Result<()> {
		self.throttle();
		debug!("write {}", command);
		self.link.write(command)
	}

	pub fn query(&mut self, command:&str) -> Result<String> {
		self.throttle();
		let response:String = self.link.query(command)?;
		debug!("query {} -> {}", command, response);
		Ok(response)
	}

	pub fn identify(&mut self) -> Result<Identity> {
		let res:String = self.query("*IDN?")?;
		let caps = IDN_RE.captures(&res).ok_or_else(|| ScopeError::response("*IDN?", &res))?;
		let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();

		Ok(Identity{ manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
	}

	// Horizontal
	pub fn set_time_per_division(&mut self, dt:f64) -> Result<()> {
		self.write(&format!(":TIMebase:RANGe {}", dt*HORIZONTAL_DIVISIONS))
	}

	pub fn get_time_per_division(&mut self) -> Result<f64> {
		let cmd = ":TIMebase:RANGe?";
		let res:String = self.query(cmd)?;
		Ok(parse::<f64>(cmd, &res)? / HORIZONTAL_DIVISIONS)
	}

	// Vertical
	pub fn set_range(&mut self, channel:Channel, dv:f64) -> Result<()> {
		self.set_range_divisions(channel, dv, VERTICAL_DIVISIONS)
	}

	/// Sets the full-scale range to `dv * divisions`. Legal full-scale ranges at 1:1 probe
	/// attenuation are 16 mV to 40 V.
	pub fn set_range_divisions(&mut self, channel:Channel, dv:f64, divisions:f64) -> Result<()> {
		self.write(&format!(":CHANnel{}:RANGe {}", channel.number(), dv*divisions))
	}

	/// Volts per division, assuming the usual eight divisions
	pub fn get_range(&mut self, channel:Channel) -> Result<f64> {
		let cmd:String = format!(":CHANnel{}:RANGe?", channel.number());
		let res:String = self.query(&cmd)?;
		Ok(parse::<f64>(&cmd, &res)? / VERTICAL_DIVISIONS)
	}

	pub fn get_channel_display(&mut self, channel:Channel) -> Result<bool> {
		let cmd:String = format!(":CHANnel{}:DISPlay?", channel.number());
		let res:String = self.query(&cmd)?;
		parse_bool(&cmd, &res)
	}

	pub fn set_channel_display(&mut self, channel:Channel, on:bool) -> Result<()> {
		self.write(&format!(":CHANnel{}:DISPlay {}", channel.number(), if on {"ON"} else {"OFF"}))
	}

	// Acquisition
	pub fn get_acq_mode(&mut self) -> Result<AcquireMode> {
		let cmd = ":ACQuire:MODE?";
		let res:String = self.query(cmd)?;
		match res.as_str() {
			"RTIM" | "RTIME" => Ok(AcquireMode::RealTime),
			"SEGM" | "SGMT"  => Ok(AcquireMode::Segmented),
			_                => Err(ScopeError::response(cmd, &res)),
		}
	}

	pub fn set_acq_mode(&mut self, mode:AcquireMode) -> Result<()> {
		self.write(&format!(":ACQuire:MODE {}", mode.scpi()))
	}

	pub fn set_seg_count(&mut self, count:u32) -> Result<()> {
		self.write(&format!(":ACQuire:SEGMented:COUNt {}", count))
	}

	/// Selects segment `idx` (1-based) for every waveform query that follows
	pub fn set_current_seg(&mut self, idx:usize) -> Result<()> {
		self.write(&format!(":ACQuire:SEGMented:INDex {}", idx))
	}

	/// The number of segments the instrument was told to acquire
	pub fn get_seg_count(&mut self) -> Result<u32> {
		let cmd = ":ACQuire:SEGMented:COUNt?";
		let res:String = self.query(cmd)?;
		parse_count(cmd, &res)
	}

	/// The number of segments acquired so far. Safe to call while an acquisition is running.
	pub fn get_current_seg_number(&mut self) -> Result<u32> {
		let cmd = ":WAVeform:SEGMented:COUNt?";
		let res:String = self.query(cmd)?;
		parse_count(cmd, &res)
	}

	/// Time tag of the selected segment, in seconds
	pub fn get_current_seg_timetag(&mut self) -> Result<f64> {
		let cmd = ":WAVeform:SEGMented:TTAG?";
		let res:String = self.query(cmd)?;
		parse(cmd, &res)
	}

	// One-liners
	pub fn run(&mut self)  -> Result<()> { self.write(":RUN")  }
	pub fn stop(&mut self) -> Result<()> { self.write(":STOP") }

	/// Switches to segmented memory, sets the segment count and starts acquiring
	pub fn arm_segmented(&mut self, count:u32) -> Result<()> {
		self.set_acq_mode(AcquireMode::Segmented)?;
		self.set_seg_count(count)?;
		self.run()
	}

	/// Polls until `target` segments have been acquired or `timeout` runs out, and returns the count
	/// reached. Fewer segments than asked for is not an error: stopping early is how a segmented
	/// acquisition with rare triggers ends.
	pub fn wait_for_segments(&mut self, target:u32, poll:Duration, timeout:Option<Duration>) -> Result<u32> {
		let start = Instant::now();
		loop {
			let acquired:u32 = self.get_current_seg_number()?;
			if acquired >= target {
				return Ok(acquired);
			}
			if let Some(t) = timeout {
				if start.elapsed() >= t {
					info!("Gave up waiting after {:?} with {} of {} segments", t, acquired, target);
					return Ok(acquired);
				}
			}
			thread::sleep(poll);
		}
	}

	// Waveform export
	/// Points available for `channel`. Selecting a channel as the waveform source turns it on.
	pub fn get_waveform_points(&mut self, channel:Channel) -> Result<usize> {
		let cmd:String = format!(":WAVeform:SOURce {};:WAVeform:POINts?", channel);
		let res:String = self.query(&cmd)?;
		Ok(parse_count(&cmd, &res)? as usize)
	}

	/// Points per segment for the current source and point mode
	pub fn get_points(&mut self) -> Result<usize> {
		let cmd = ":WAVeform:POINts?";
		let res:String = self.query(cmd)?;
		Ok(parse_count(cmd, &res)? as usize)
	}

	pub fn get_waveform_preamble(&mut self, channel:Channel) -> Result<Preamble> {
		let res:String = self.query(&format!(":WAVeform:SOURce {};:WAVeform:PREamble?", channel))?;
		res.parse()
	}

	/// Preamble of the current source
	pub fn get_preamble(&mut self) -> Result<Preamble> {
		let res:String = self.query(":WAVeform:PREamble?")?;
		res.parse()
	}

	/// Sets up signed 16-bit little-endian transfers of every raw point, with `source` as the
	/// waveform source. `POINts MAX` has to come before `POINts:MODE` or it switches the mode to MAX.
	pub fn configure_word_export(&mut self, source:Channel) -> Result<()> {
		self.write(":WAVeform:FORMat WORD")?;
		self.write(&format!(":WAVeform:BYTeorder {}", WordOrder::LsbFirst.scpi()))?;
		self.write(":WAVeform:UNSigned 0")?;
		self.write(&format!(":WAVeform:SOURce {}", source))?;
		self.write(":WAVeform:POINts MAX")?;
		self.write(":WAVeform:POINts:MODE RAW")
	}

	/// Raw ADC codes of `channel` for the selected segment
	pub fn get_waveform_words(&mut self, channel:Channel) -> Result<Vec<i16>> {
		self.throttle();
		let cmd:String = format!(":WAVeform:SOURce {};DATA?", channel);
		debug!("query {}", cmd);
		self.link.query_binary_values(&cmd, WordOrder::LsbFirst)
	}

	pub fn get_channel_state(&mut self, channel:Channel) -> Result<ChannelState> {
		let display_enabled:bool = self.get_channel_display(channel)?;
		let volts_per_division:f64 = self.get_range(channel)?;
		Ok(ChannelState{ channel, display_enabled, volts_per_division })
	}

	pub fn get_full_state(&mut self) -> Result<State> {
		let identity = self.identify()?;
		let time_per_division:f64 = self.get_time_per_division()?;
		let acquire_mode:AcquireMode = self.get_acq_mode()?;
		let segment_count:u32 = self.get_seg_count()?;
		let segments_acquired:u32 = self.get_current_seg_number()?;

		let channels = Channel::ALL.iter()
			.map(|ch| self.get_channel_state(*ch))
			.collect::<Result<Vec<ChannelState>>>()?;

		Ok(State{ identity, time_per_division, acquire_mode, segment_count, segments_acquired, channels })
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::VecDeque;

	#[derive(Default)]
	struct Recorder {
		sent: Vec<String>,
		replies: VecDeque<Vec<u8>>,
	}

	impl Transport for Recorder {
		fn write(&mut self, command:&str) -> Result<()> {
			self.sent.push(command.to_owned());
			Ok(())
		}

		fn read_raw(&mut self) -> Result<Vec<u8>> {
			self.replies.pop_front().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply").into())
		}
	}

	fn scope(replies:&[&str]) -> Infiniivision<Recorder> {
		let mut rec = Recorder::default();
		rec.replies = replies.iter().map(|r| format!("{}\n", r).into_bytes()).collect();
		Infiniivision::new(rec)
	}

	#[test]
	fn command_strings() {
		let mut s = scope(&[]);
		s.set_time_per_division(1e-3).unwrap();
		s.set_range(Channel::new(2).unwrap(), 0.5).unwrap();
		s.set_range_divisions(Channel::new(3).unwrap(), 0.5, 10.0).unwrap();
		s.set_seg_count(25).unwrap();
		s.set_current_seg(3).unwrap();
		s.run().unwrap();
		s.stop().unwrap();
		s.set_channel_display(Channel::new(4).unwrap(), false).unwrap();
		s.set_acq_mode(AcquireMode::Segmented).unwrap();

		assert_eq!(s.into_inner().sent, vec![
			":TIMebase:RANGe 0.01",
			":CHANnel2:RANGe 4",
			":CHANnel3:RANGe 5",
			":ACQuire:SEGMented:COUNt 25",
			":ACQuire:SEGMented:INDex 3",
			":RUN",
			":STOP",
			":CHANnel4:DISPlay OFF",
			":ACQuire:MODE SEGMented",
		]);
	}

	#[test]
	fn typed_replies() {
		let mut s = scope(&["+4.00000E+00", "SGMT", "RTIM", "+250", "+17", "+1.234500E-03", "1", "+1.00000E-02", "+62500"]);
		let ch1 = Channel::new(1).unwrap();
		assert_eq!(s.get_range(ch1).unwrap(), 0.5);
		assert_eq!(s.get_acq_mode().unwrap(), AcquireMode::Segmented);
		assert_eq!(s.get_acq_mode().unwrap(), AcquireMode::RealTime);
		assert_eq!(s.get_seg_count().unwrap(), 250);
		assert_eq!(s.get_current_seg_number().unwrap(), 17);
		assert_eq!(s.get_current_seg_timetag().unwrap(), 1.2345e-3);
		assert!(s.get_channel_display(ch1).unwrap());
		assert!((s.get_time_per_division().unwrap() - 1e-3).abs() < 1e-15);
		assert_eq!(s.get_waveform_points(ch1).unwrap(), 62500);

		let sent = s.into_inner().sent;
		assert_eq!(sent[0], ":CHANnel1:RANGe?");
		assert_eq!(sent.last().unwrap(), ":WAVeform:SOURce CHANnel1;:WAVeform:POINts?");
	}

	#[test]
	fn unparseable_reply() {
		let mut s = scope(&["banana", "AVER"]);
		assert!(matches!(s.get_current_seg_number(), Err(ScopeError::MalformedResponse{ .. })));
		assert!(matches!(s.get_acq_mode(), Err(ScopeError::MalformedResponse{ .. })));
	}

	#[test]
	fn word_export_order() {
		let mut s = scope(&[]);
		s.configure_word_export(Channel::new(2).unwrap()).unwrap();
		let sent = s.into_inner().sent;

		assert_eq!(sent, vec![
			":WAVeform:FORMat WORD",
			":WAVeform:BYTeorder LSBFirst",
			":WAVeform:UNSigned 0",
			":WAVeform:SOURce CHANnel2",
			":WAVeform:POINts MAX",
			":WAVeform:POINts:MODE RAW",
		]);
	}

	#[test]
	fn identity_and_model() {
		let mut s = scope(&["KEYSIGHT TECHNOLOGIES,DSO-X 2024A,MY12345678,02.50.2019022736"]);
		let idn = s.identify().unwrap();
		assert_eq!(idn.manufacturer, "KEYSIGHT TECHNOLOGIES");
		assert_eq!(idn.model, "DSO-X 2024A");
		assert_eq!(idn.fw_version, "02.50.2019022736");
		assert!(MODEL_RE.is_match(&idn.model));
		assert!(MODEL_RE.is_match("MSO-X 2012A"));
		assert!(!MODEL_RE.is_match("SDS1202X"));
	}

	#[test]
	fn channel_bounds() {
		assert!(Channel::new(0).is_err());
		assert!(Channel::new(5).is_err());
		assert_eq!(Channel::new(4).unwrap().to_string(), "CHANnel4");
		assert!(serde_json::from_str::<Channel>("7").is_err());
		assert_eq!(serde_json::from_str::<Channel>("3").unwrap(), Channel::new(3).unwrap());
	}

	#[test]
	fn wait_returns_once_target_reached() {
		let mut s = scope(&["+1", "+3", "+5"]);
		let n = s.wait_for_segments(5, Duration::from_millis(1), None).unwrap();
		assert_eq!(n, 5);
	}

	#[test]
	fn wait_gives_up_at_timeout() {
		let mut s = scope(&["+1", "+1"]);
		let n = s.wait_for_segments(5, Duration::from_millis(1), Some(Duration::from_millis(0))).unwrap();
		assert_eq!(n, 1);
	}
}
