// A simulated InfiniiVision 2000 X-Series holding a finished segmented acquisition. It answers the
// subset of SCPI the driver uses, keeps the instrument's habit of turning a channel on when it is
// made the waveform source, and logs every command it receives.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;

use byteorder::{LittleEndian, WriteBytesExt};

use infiniivision::transport::encode_block;
use infiniivision::{Result, ScopeError, Transport};

pub const IDN:&str = "KEYSIGHT TECHNOLOGIES,DSO-X 2024A,MY00000001,02.50.2019022736";

#[derive(Debug, Clone)]
pub struct SimChannel {
	pub display: bool,
	pub y_increment: f64,
	pub y_origin: f64,
	pub y_reference: f64,
	/// Raw codes per segment, empty when the channel captured nothing
	pub segments: Vec<Vec<i16>>,
}

impl Default for SimChannel {
	fn default() -> Self {
		Self{ display: false, y_increment: 1.0, y_origin: 0.0, y_reference: 0.0, segments: vec![] }
	}
}

pub struct SimScope {
	pub channels: Vec<SimChannel>,
	pub time_tags: Vec<f64>,
	pub segments_acquired: u32,
	pub points: usize,
	pub acquisition_type: u32,
	pub x_increment: f64,
	pub x_origin: f64,
	pub x_reference: f64,
	/// Replaces the preamble reply when set
	pub preamble_override: Option<String>,
	/// Writes after this many succeed, then the link drops
	pub fail_after: Option<usize>,

	pub source: u8,
	pub current_segment: usize,
	pub points_mode: String,
	pub format: String,
	pub byte_order: String,
	pub unsigned: bool,
	pub log: Vec<String>,
	pending: VecDeque<Vec<u8>>,
}

impl SimScope {

	pub fn new(points:usize, time_tags:Vec<f64>) -> Self {
		Self{
			channels: vec![SimChannel::default(); 4],
			segments_acquired: time_tags.len() as u32,
			time_tags,
			points,
			acquisition_type: 0,
			x_increment: 1e-9,
			x_origin: 0.0,
			x_reference: 0.0,
			preamble_override: None,
			fail_after: None,
			source: 1,
			current_segment: 1,
			points_mode: "NORMal".to_owned(),
			format: "BYTE".to_owned(),
			byte_order: "MSBFirst".to_owned(),
			unsigned: true,
			log: vec![],
			pending: VecDeque::new(),
		}
	}

	pub fn with_channel(mut self, n:usize, cal:(f64, f64, f64), segments:Vec<Vec<i16>>) -> Self {
		self.channels[n - 1] = SimChannel{ display: true, y_increment: cal.0, y_origin: cal.1, y_reference: cal.2, segments };
		self
	}

	/// Displayed but never captured anything
	pub fn with_empty_channel(mut self, n:usize) -> Self {
		self.channels[n - 1].display = true;
		self.channels[n - 1].segments = vec![];
		self
	}

	pub fn peak_detect(mut self) -> Self {
		self.acquisition_type = 1;
		self
	}

	pub fn writes_matching(&self, pat:&str) -> usize {
		self.log.iter().filter(|c| c.contains(pat)).count()
	}

	pub fn position(&self, cmd:&str) -> Option<usize> {
		self.log.iter().position(|c| c == cmd)
	}

	fn reply(&mut self, s:String) {
		self.pending.push_back(format!("{}\n", s).into_bytes());
	}

	fn source_channel(&self) -> &SimChannel { &self.channels[self.source as usize - 1] }

	fn has_data(&self, ch:&SimChannel) -> bool { !ch.segments.is_empty() }

	fn preamble(&self) -> String {
		if let Some(p) = &self.preamble_override { return p.clone(); }
		let ch = self.source_channel();
		let points = if self.has_data(ch) { self.points } else { 0 };
		format!("+1,+{},+{},+1,{:E},{:E},{:E},{:E},{:E},{:E}",
			self.acquisition_type, points, self.x_increment, self.x_origin, self.x_reference,
			ch.y_increment, ch.y_origin, ch.y_reference)
	}

	fn handle(&mut self, cmd:&str) -> Result<()> {
		let (head, arg) = match cmd.find(' ') {
			Some(i) => (&cmd[..i], Some(cmd[i + 1..].trim())),
			None    => (cmd, None),
		};
		let bad = || ScopeError::MalformedResponse{ command: cmd.to_owned(), response: "simulator does not know this".to_owned() };

		if let Some(rest) = head.strip_prefix(":CHANnel") {
			let n:usize = rest[..1].parse().map_err(|_| bad())?;
			match (&rest[1..], arg) {
				(":DISPlay?", None)  => { let on = self.channels[n - 1].display; self.reply((if on {"1"} else {"0"}).to_owned()) },
				(":DISPlay", Some(a)) => self.channels[n - 1].display = a == "ON" || a == "1",
				(":RANGe?", None)    => self.reply("+8.00000E+00".to_owned()),
				(":RANGe", Some(_))  => { },
				_ => return Err(bad()),
			}
			return Ok(());
		}

		match (head, arg) {
			("*IDN?", None)                       => self.reply(IDN.to_owned()),
			(":WAVeform:SEGMented:COUNt?", None)  => { let n = self.segments_acquired; self.reply(format!("+{}", n)) },
			(":ACQuire:SEGMented:INDex", Some(a)) => {
				let idx:usize = a.parse().map_err(|_| bad())?;
				if idx == 0 || idx > self.time_tags.len() { return Err(bad()); }
				self.current_segment = idx;
			},
			(":WAVeform:SEGMented:TTAG?", None)   => { let t = self.time_tags[self.current_segment - 1]; self.reply(format!("{:E}", t)) },
			(":WAVeform:SOURce", Some(a))         => {
				let n:u8 = a.strip_prefix("CHANnel").and_then(|s| s.parse().ok()).ok_or_else(bad)?;
				self.source = n;
				// Same as the real thing: a source channel is switched on
				self.channels[n as usize - 1].display = true;
			},
			(":WAVeform:POINts?", None)           => {
				let points = if self.has_data(self.source_channel()) { self.points } else { 0 };
				self.reply(format!("+{}", points))
			},
			(":WAVeform:POINts", Some(a))         => { if a == "MAX" { self.points_mode = "MAXimum".to_owned(); } },
			(":WAVeform:POINts:MODE", Some(a))    => self.points_mode = a.to_owned(),
			(":WAVeform:FORMat", Some(a))         => self.format = a.to_owned(),
			(":WAVeform:BYTeorder", Some(a))      => self.byte_order = a.to_owned(),
			(":WAVeform:UNSigned", Some(a))       => self.unsigned = a != "0",
			(":WAVeform:PREamble?", None)         => { let p = self.preamble(); self.reply(p) },
			(":WAVeform:DATA?", None)             => {
				let words:Vec<i16> = self.source_channel().segments.get(self.current_segment - 1).cloned().unwrap_or_default();
				let mut body:Vec<u8> = Vec::with_capacity(words.len() * 2);
				for w in words { body.write_i16::<LittleEndian>(w).map_err(ScopeError::from)?; }
				self.pending.push_back(encode_block(&body));
			},
			(":ACQuire:MODE", Some(_)) | (":ACQuire:SEGMented:COUNt", Some(_)) | (":RUN", None) | (":STOP", None) => { },
			_ => return Err(bad()),
		}
		Ok(())
	}

}

impl Transport for SimScope {

	fn write(&mut self, command:&str) -> Result<()> {
		if let Some(n) = self.fail_after {
			if self.log.len() >= n {
				return Err(io::Error::new(io::ErrorKind::ConnectionReset, "link dropped").into());
			}
		}
		self.log.push(command.to_owned());

		// ";DATA?" after a :WAVeform command stays in the WAVeform subsystem
		let mut subsystem:String = String::new();
		for part in command.split(';') {
			let full:String = if part.starts_with(':') || part.starts_with('*') {
				part.to_owned()
			} else {
				format!("{}:{}", subsystem, part)
			};
			if let Some(i) = full[1..].find(':') { subsystem = full[..i + 1].to_owned(); }
			self.handle(&full)?;
		}
		Ok(())
	}

	fn read_raw(&mut self) -> Result<Vec<u8>> {
		self.pending.pop_front()
			.ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "query timed out").into())
	}

}
