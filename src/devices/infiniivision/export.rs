//! CSV artifacts, one per acquired channel:
//!
//! ```text
//! Timestamp (s):,<tag 1>,<tag 2>,...
//! Segment Index:,1,2,...
//! Time (s), Waveforms...
//! <t0>,<segment 1 sample 0>,<segment 2 sample 0>,...
//! ```

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::NamedTempFile;

use crate::error::{Result, ScopeError};
use super::Channel;
use super::segmented::Capture;

pub const TIMESTAMP_LABEL:&str = "Timestamp (s):";
pub const SEGMENT_INDEX_LABEL:&str = "Segment Index:";
pub const TABLE_HEADER:[&str; 2] = ["Time (s)", " Waveforms..."];

/// Where each channel's artifact goes. A lone channel gets `<base>.csv`, several get `<base>_ch<N>.csv`.
pub fn artifact_paths(base:&Path, channels:&[Channel]) -> Vec<PathBuf> {
	let base:PathBuf = match base.extension() {
		Some(ext) if ext == "csv" => base.with_extension(""),
		_ => base.to_path_buf(),
	};

	if channels.len() == 1 {
		let mut name = base.into_os_string();
		name.push(".csv");
		return vec![PathBuf::from(name)];
	}

	channels.iter().map(|ch| {
		let mut name = base.clone().into_os_string();
		name.push(format!("_ch{}.csv", ch.number()));
		PathBuf::from(name)
	}).collect()
}

fn csv_writer<W: io::Write>(wtr:W) -> csv::Writer<W> {
	csv::WriterBuilder::new()
		.has_headers(false)
		.flexible(true)
		.from_writer(wtr)
}

/// Renders one channel's artifact into memory
pub fn render_channel(capture:&Capture, channel:Channel) -> Result<Vec<u8>> {
	let columns:Vec<&[f64]> = capture.waveforms(channel).ok_or(ScopeError::InvalidChannel(channel.number()))?;

	let mut wtr = csv_writer(vec![]);
	let mut record:Vec<String> = Vec::with_capacity(columns.len() + 1);

	record.push(TIMESTAMP_LABEL.to_owned());
	record.extend(capture.segments().iter().map(|s| s.time_tag.to_string()));
	wtr.write_record(&record)?;

	record.clear();
	record.push(SEGMENT_INDEX_LABEL.to_owned());
	record.extend(capture.segments().iter().map(|s| s.index.to_string()));
	wtr.write_record(&record)?;

	wtr.write_record(&TABLE_HEADER)?;

	for (i, t) in capture.time_axis().iter().enumerate() {
		record.clear();
		record.push(t.to_string());
		record.extend(columns.iter().map(|col| col[i].to_string()));
		wtr.write_record(&record)?;
	}

	wtr.into_inner().map_err(|e| ScopeError::Render(csv::Error::from(e.into_error())))
}

// Temporary files are created next to their destination so that persisting them is a rename
fn staging_dir(path:&Path) -> &Path {
	match path.parent() {
		Some(dir) if !dir.as_os_str().is_empty() => dir,
		_ => Path::new("."),
	}
}

/// Writes every channel's artifact. All of them are rendered and staged in temporary files before
/// the first one is moved into place, and if moving any of them fails the ones already in place are
/// removed again.
pub fn write_capture(capture:&Capture, base:&Path) -> Result<Vec<PathBuf>> {
	let paths:Vec<PathBuf> = artifact_paths(base, capture.channels());

	let rendered:Vec<Vec<u8>> = capture.channels().iter()
		.map(|ch| render_channel(capture, *ch))
		.collect::<Result<Vec<Vec<u8>>>>()?;

	let mut staged:Vec<NamedTempFile> = Vec::with_capacity(paths.len());
	for (path, bytes) in paths.iter().zip(rendered.iter()) {
		let export_err = |source:io::Error| ScopeError::Export{ path: path.clone(), source };
		let mut tmp = NamedTempFile::new_in(staging_dir(path)).map_err(export_err)?;
		tmp.write_all(bytes).map_err(export_err)?;
		tmp.as_file().sync_all().map_err(export_err)?;
		staged.push(tmp);
	}

	let mut persisted:Vec<&PathBuf> = Vec::with_capacity(paths.len());
	for ((tmp, path), ch) in staged.into_iter().zip(paths.iter()).zip(capture.channels()) {
		if let Err(e) = tmp.persist(path) {
			for done in persisted {
				if let Err(rm) = fs::remove_file(done) {
					warn!("Unable to remove {} after a failed export: {}", done.display(), rm);
				}
			}
			return Err(ScopeError::Export{ path: path.clone(), source: e.error });
		}
		persisted.push(path);
		info!("Wrote {} ({} segments) to {}", ch, capture.segment_count(), path.display());
	}

	Ok(paths)
}

/// An artifact read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
	pub time_tags: Vec<f64>,
	pub segment_indices: Vec<usize>,
	pub time_axis: Vec<f64>,
	/// One column per segment
	pub waveforms: Vec<Vec<f64>>,
}

fn malformed(path:&Path, msg:String) -> ScopeError {
	ScopeError::Export{ path: path.to_path_buf(), source: io::Error::new(io::ErrorKind::InvalidData, msg) }
}

fn labelled_row<T: std::str::FromStr>(record:Option<csv::StringRecord>, label:&str, path:&Path) -> Result<Vec<T>> {
	let record = record.ok_or_else(|| malformed(path, format!("missing {:?} row", label)))?;
	if record.get(0) != Some(label) {
		return Err(malformed(path, format!("expected {:?} row, found {:?}", label, record.get(0))));
	}
	record.iter().skip(1)
		.map(|s| s.trim().parse::<T>().map_err(|_| malformed(path, format!("bad value {:?} in {:?} row", s, label))))
		.collect()
}

pub fn parse_artifact<R: Read>(rdr:R, path:&Path) -> Result<Artifact> {
	let mut rdr = csv::ReaderBuilder::new()
		.has_headers(false)
		.flexible(true)
		.from_reader(rdr);

	let mut records = rdr.records().map(|r| r.map_err(|e| malformed(path, e.to_string())));
	let mut next = || records.next().transpose();

	let time_tags:Vec<f64> = labelled_row(next()?, TIMESTAMP_LABEL, path)?;
	let segment_indices:Vec<usize> = labelled_row(next()?, SEGMENT_INDEX_LABEL, path)?;
	if time_tags.len() != segment_indices.len() {
		return Err(malformed(path, "time tag and segment index rows differ in length".to_owned()));
	}

	match next()? {
		Some(ref r) if r.get(0) == Some(TABLE_HEADER[0]) => { },
		_ => return Err(malformed(path, "missing table header".to_owned())),
	}

	let mut time_axis:Vec<f64> = vec![];
	let mut waveforms:Vec<Vec<f64>> = vec![vec![]; time_tags.len()];
	while let Some(record) = next()? {
		if record.len() != waveforms.len() + 1 {
			return Err(malformed(path, format!("row {} has {} columns, expected {}", time_axis.len(), record.len(), waveforms.len() + 1)));
		}
		let values:Vec<f64> = record.iter()
			.map(|s| s.trim().parse::<f64>().map_err(|_| malformed(path, format!("bad value {:?}", s))))
			.collect::<Result<Vec<f64>>>()?;

		time_axis.push(values[0]);
		for (col, v) in waveforms.iter_mut().zip(values.into_iter().skip(1)) { col.push(v); }
	}

	Ok(Artifact{ time_tags, segment_indices, time_axis, waveforms })
}

pub fn read_artifact<P: AsRef<Path>>(path:P) -> Result<Artifact> {
	let path = path.as_ref();
	let file = fs::File::open(path).map_err(|source| ScopeError::Export{ path: path.to_path_buf(), source })?;
	parse_artifact(io::BufReader::new(file), path)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ch(n:u8) -> Channel { Channel::new(n).unwrap() }

	#[test]
	fn single_channel_keeps_base_name() {
		assert_eq!(artifact_paths(Path::new("out/run1"), &[ch(3)]), vec![PathBuf::from("out/run1.csv")]);
		assert_eq!(artifact_paths(Path::new("run1.csv"), &[ch(1)]), vec![PathBuf::from("run1.csv")]);
	}

	#[test]
	fn several_channels_get_suffixes() {
		assert_eq!(
			artifact_paths(Path::new("run1.csv"), &[ch(1), ch(4)]),
			vec![PathBuf::from("run1_ch1.csv"), PathBuf::from("run1_ch4.csv")]
		);
	}

	#[test]
	fn parses_hand_written_artifact() {
		let text = "Timestamp (s):,0,0.25\nSegment Index:,1,2\nTime (s), Waveforms...\n0,1,0.1\n1e-9,2,0.2\n";
		let art = parse_artifact(text.as_bytes(), Path::new("x.csv")).unwrap();
		assert_eq!(art.time_tags, vec![0.0, 0.25]);
		assert_eq!(art.segment_indices, vec![1, 2]);
		assert_eq!(art.time_axis, vec![0.0, 1e-9]);
		assert_eq!(art.waveforms, vec![vec![1.0, 2.0], vec![0.1, 0.2]]);
	}

	#[test]
	fn ragged_table_is_rejected() {
		let text = "Timestamp (s):,0,0.25\nSegment Index:,1,2\nTime (s), Waveforms...\n0,1\n";
		assert!(parse_artifact(text.as_bytes(), Path::new("x.csv")).is_err());
	}

	#[test]
	fn csv_failures_are_render_errors() {
		let mut rdr = csv::ReaderBuilder::new().has_headers(false).from_reader("a,b\nc\n".as_bytes());
		let err:csv::Error = rdr.records().find_map(|r| r.err()).unwrap();
		assert!(matches!(ScopeError::from(err), ScopeError::Render(_)));
	}

	#[test]
	fn staging_dir_of_bare_name_is_cwd() {
		assert_eq!(staging_dir(Path::new("run.csv")), Path::new("."));
		assert_eq!(staging_dir(Path::new("out/run.csv")), Path::new("out"));
	}

	#[test]
	fn missing_rows_are_rejected() {
		assert!(parse_artifact("Segment Index:,1\n".as_bytes(), Path::new("x.csv")).is_err());
		assert!(parse_artifact("".as_bytes(), Path::new("x.csv")).is_err());
	}
}
