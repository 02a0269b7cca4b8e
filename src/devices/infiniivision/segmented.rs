//! Reading a segmented-memory acquisition back out of the scope.
//!
//! Readout is split in two phases. [`ExtractionSetup::probe`] runs once: it works out which channels
//! hold data, reads their vertical calibration and the shared timebase, and configures the waveform
//! export. [`ExtractionSetup::read_segment`] then runs once per segment against that fixed setup.
//! [`extract`] strings the two together and writes the artifacts.
//!
//! Segment 1 is selected before the probe, because the point count and preamble describe the
//! selected segment. `read_segment` selects its segment again before reading the time tag, so
//! segment 1 is selected twice and its time tag is read after setup rather than before it.
//!
//! Every step is a synchronous transaction that depends on instrument state left by the previous
//! one (the waveform source, the segment cursor), so nothing here may be reordered.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{Result, ScopeError};
use crate::transport::Transport;
use super::{Channel, Infiniivision};
use super::export;
use super::preamble::{ChannelCalibration, TimebaseCalibration};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
	/// Turn off every channel that holds no data once the survey is done. Asking a channel for its
	/// point count makes it the waveform source, and that turns it on.
	pub blank_unacquired_channels: bool,
}

impl Default for ExtractOptions {
	fn default() -> Self { Self{ blank_unacquired_channels: true } }
}

/// Which channels hold data for the selected segment
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSurvey {
	pub acquired: Vec<(Channel, ChannelCalibration)>,
	/// Off, or on with zero points
	pub excluded: Vec<Channel>,
}

impl ChannelSurvey {
	pub fn first_acquired(&self) -> Option<Channel> { self.acquired.first().map(|(ch, _)| *ch) }
}

/// Checks channels 1 to 4 in order. A channel is acquired when it is displayed and has at least one
/// point, and only then is its preamble read.
pub fn survey_channels<T: Transport>(scope:&mut Infiniivision<T>) -> Result<ChannelSurvey> {
	let mut acquired:Vec<(Channel, ChannelCalibration)> = vec![];
	let mut excluded:Vec<Channel> = vec![];

	for ch in Channel::ALL.iter().copied() {
		let on:bool = scope.get_channel_display(ch)?;
		let points:usize = scope.get_waveform_points(ch)?;

		if on && points > 0 {
			let cal = ChannelCalibration::from(&scope.get_waveform_preamble(ch)?);
			debug!("{} acquired, {} points, {:?}", ch, points, cal);
			acquired.push((ch, cal));
		} else {
			if on { warn!("{} is on but holds no data, leaving it out", ch); }
			excluded.push(ch);
		}
	}

	Ok(ChannelSurvey{ acquired, excluded })
}

pub fn blank_channels<T: Transport>(scope:&mut Infiniivision<T>, channels:&[Channel]) -> Result<()> {
	for ch in channels {
		scope.set_channel_display(*ch, false)?;
	}
	Ok(())
}

/// One segment: its time tag and the scaled samples of every acquired channel, in channel order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
	/// 1-based, as the instrument counts
	pub index: usize,
	pub time_tag: f64,
	pub waveforms: Vec<Vec<f64>>,
}

/// Everything fixed for the duration of one readout
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSetup {
	channels: Vec<Channel>,
	calibrations: BTreeMap<Channel, ChannelCalibration>,
	timebase: TimebaseCalibration,
	points_per_segment: usize,
	segment_count: usize,
	time_axis: Vec<f64>,
}

impl ExtractionSetup {

	/// Runs the one-time part of a readout. The instrument should already have a segment selected.
	pub fn probe<T: Transport>(scope:&mut Infiniivision<T>, segment_count:usize, options:&ExtractOptions) -> Result<Self> {
		let survey = survey_channels(scope)?;
		if options.blank_unacquired_channels {
			blank_channels(scope, &survey.excluded)?;
		}

		let first:Channel = survey.first_acquired().ok_or(ScopeError::NoAcquiredChannels)?;
		scope.configure_word_export(first)?;

		let points_per_segment:usize = scope.get_points()?;
		info!("{} points were acquired for each channel for each segment", points_per_segment);

		// The timebase doesn't change from channel to channel or segment to segment
		let timebase = TimebaseCalibration::from(&scope.get_preamble()?);
		if timebase.is_peak_detect() {
			info!("Peak detect mode, expecting {} samples per segment", 2*points_per_segment);
		}

		let time_axis:Vec<f64> = timebase.time_axis(points_per_segment);
		let channels:Vec<Channel> = survey.acquired.iter().map(|(ch, _)| *ch).collect();
		let calibrations:BTreeMap<Channel, ChannelCalibration> = survey.acquired.into_iter().collect();

		Ok(Self{ channels, calibrations, timebase, points_per_segment, segment_count, time_axis })
	}

	pub fn channels(&self) -> &[Channel] { &self.channels }
	pub fn timebase(&self) -> &TimebaseCalibration { &self.timebase }
	pub fn points_per_segment(&self) -> usize { self.points_per_segment }
	pub fn segment_count(&self) -> usize { self.segment_count }
	pub fn time_axis(&self) -> &[f64] { &self.time_axis }

	pub fn calibration(&self, channel:Channel) -> Option<&ChannelCalibration> { self.calibrations.get(&channel) }

	/// Samples per channel per segment, twice the point count in peak detect mode
	pub fn samples_per_segment(&self) -> usize { self.points_per_segment * self.timebase.samples_per_point() }

	/// Selects segment `index` (1-based), reads its time tag, then pulls and scales every acquired channel
	pub fn read_segment<T: Transport>(&self, scope:&mut Infiniivision<T>, index:usize) -> Result<SegmentRecord> {
		scope.set_current_seg(index)?;
		let time_tag:f64 = scope.get_current_seg_timetag()?;

		let mut waveforms:Vec<Vec<f64>> = Vec::with_capacity(self.channels.len());
		for ch in self.channels.iter().copied() {
			let raw:Vec<i16> = scope.get_waveform_words(ch)?;
			if raw.len() != self.samples_per_segment() {
				return Err(ScopeError::SampleCountMismatch{
					channel: ch.number(),
					segment: index,
					expected: self.samples_per_segment(),
					found: raw.len(),
				});
			}

			let cal:&ChannelCalibration = &self.calibrations[&ch];
			waveforms.push(raw.into_iter().map(|r| cal.scale(r)).collect());
		}

		Ok(SegmentRecord{ index, time_tag, waveforms })
	}

	pub fn into_capture(self, segments:Vec<SegmentRecord>) -> Capture {
		Capture{
			channels: self.channels,
			calibrations: self.calibrations,
			timebase: self.timebase,
			points_per_segment: self.points_per_segment,
			time_axis: self.time_axis,
			segments,
		}
	}

}

/// A complete segmented readout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capture {
	channels: Vec<Channel>,
	calibrations: BTreeMap<Channel, ChannelCalibration>,
	timebase: TimebaseCalibration,
	points_per_segment: usize,
	time_axis: Vec<f64>,
	segments: Vec<SegmentRecord>,
}

impl Capture {
	pub fn channels(&self) -> &[Channel] { &self.channels }
	pub fn timebase(&self) -> &TimebaseCalibration { &self.timebase }
	pub fn points_per_segment(&self) -> usize { self.points_per_segment }
	pub fn time_axis(&self) -> &[f64] { &self.time_axis }
	pub fn segments(&self) -> &[SegmentRecord] { &self.segments }
	pub fn segment_count(&self) -> usize { self.segments.len() }

	pub fn calibration(&self, channel:Channel) -> Option<&ChannelCalibration> { self.calibrations.get(&channel) }

	pub fn time_tags(&self) -> Vec<f64> { self.segments.iter().map(|s| s.time_tag).collect() }

	/// Scaled samples of `channel` for every segment, in segment order
	pub fn waveforms(&self, channel:Channel) -> Option<Vec<&[f64]>> {
		let pos:usize = self.channels.iter().position(|c| *c == channel)?;
		Some(self.segments.iter().map(|s| &s.waveforms[pos][..]).collect())
	}
}

/// Reads every acquired segment without touching the filesystem
pub fn read_capture<T: Transport>(scope:&mut Infiniivision<T>, options:&ExtractOptions) -> Result<Capture> {
	// What was actually acquired, which is less than the configured count if the scope was stopped early
	let segment_count = scope.get_current_seg_number()? as usize;
	if segment_count == 0 {
		return Err(ScopeError::AcquisitionIncomplete);
	}
	info!("{} segments were acquired", segment_count);

	scope.set_current_seg(1)?;
	let setup = ExtractionSetup::probe(scope, segment_count, options)?;

	let mut segments:Vec<SegmentRecord> = Vec::with_capacity(segment_count);
	for n in 1..=segment_count {
		segments.push(setup.read_segment(scope, n)?);
	}

	Ok(setup.into_capture(segments))
}

/// Reads every acquired segment and writes one CSV per acquired channel next to `target`. Nothing is
/// written unless the whole readout succeeds.
pub fn extract<T: Transport, P: AsRef<Path>>(scope:&mut Infiniivision<T>, target:P) -> Result<Capture> {
	extract_with(scope, target, &ExtractOptions::default()).map(|(capture, _)| capture)
}

pub fn extract_with<T: Transport, P: AsRef<Path>>(scope:&mut Infiniivision<T>, target:P, options:&ExtractOptions) -> Result<(Capture, Vec<PathBuf>)> {
	let capture = read_capture(scope, options)?;
	let paths = export::write_capture(&capture, target.as_ref())?;
	Ok((capture, paths))
}
