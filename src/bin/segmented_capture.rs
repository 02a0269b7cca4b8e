use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use infiniivision::config::CaptureConfig;
use infiniivision::devices::infiniivision::Infiniivision;
use infiniivision::devices::infiniivision::segmented;

/// Read a segmented-memory acquisition out of an InfiniiVision 2000 X-Series scope, one CSV per channel
#[derive(Debug, Parser)]
struct Args {
	/// JSON capture config
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Scope address, overrides the config
	#[arg(long)]
	host: Option<String>,

	/// Artifact base name, overrides the config
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Arm this many segments and wait for them before reading out, overrides the config
	#[arg(short, long)]
	segments: Option<u32>,

	/// Print the scope state as JSON and exit
	#[arg(long)]
	state: bool,
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	let mut cfg:CaptureConfig = match &args.config {
		Some(path) => CaptureConfig::load(path)?,
		None       => CaptureConfig::default(),
	};
	if let Some(host) = args.host { cfg.host = Some(host); }
	if let Some(output) = args.output { cfg.output = output; }
	if let Some(n) = args.segments { cfg.segment_count = Some(n); }
	cfg.validate()?;

	let host:String = cfg.host.clone().context("no scope address given, use --host or set \"host\" in the config")?;
	let mut scope = Infiniivision::connect(&host)
		.with_context(|| format!("unable to connect to {}", host))?
		.with_throttle(cfg.throttle());

	if args.state {
		println!("{}", serde_json::to_string_pretty(&scope.get_full_state()?)?);
		return Ok(());
	}

	if let Some(dt) = cfg.time_per_division { scope.set_time_per_division(dt)?; }
	for r in &cfg.channel_ranges { scope.set_range(r.channel, r.volts_per_division)?; }

	if let Some(n) = cfg.segment_count {
		scope.arm_segmented(n)?;
		let acquired:u32 = scope.wait_for_segments(n, cfg.poll_interval(), cfg.acquisition_timeout())?;
		scope.stop()?;
		info!("Acquisition stopped with {} of {} segments", acquired, n);
	}

	let (capture, paths) = segmented::extract_with(&mut scope, &cfg.output, &cfg.extract_options())
		.context("segmented readout failed")?;

	info!("Read {} segments of {} channels", capture.segment_count(), capture.channels().len());
	for path in paths {
		println!("{}", path.display());
	}

	Ok(())
}
