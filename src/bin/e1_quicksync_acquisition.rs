extern crate clap;
extern crate colored;
extern crate e1_quicksync;
extern crate serde;

use std::error::Error;

use clap::{Arg, App};
use colored::*;
use e1_quicksync::io::{IqSource, ItemType, SampleBlocks};
use e1_quicksync::block::{BlockFunctionality, BlockResult, ChannelBank};
use e1_quicksync::gnss::acquisition::{AcqState, AcquisitionOutcome};
use e1_quicksync::gnss::acquisition::config::AcquisitionConfig;
use e1_quicksync::gnss::acquisition::quicksync::{AcqControl, QuickSyncAcquisition};
use e1_quicksync::gnss::galileo_e1::signal_modulation;
use e1_quicksync::gnss::synchro::{ChannelEvent, ChannelOutcome, SynchronizationRecord};
use e1_quicksync::{tracing_init, AcquisitionErr, SampleBlock};
use serde::{Serialize, Deserialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

type Bank = ChannelBank<AcqControl, Option<AcquisitionOutcome>, SampleBlock, AcquisitionOutcome, QuickSyncAcquisition>;

#[derive(Debug, Serialize, Deserialize)]
struct ChannelSummary {
	pub channel:usize,
	pub prn:usize,
	pub state:AcqState,
	pub mag:f64,
	pub threshold:Option<f64>,
	pub dwells:usize,
	pub underruns:usize,
	pub record:Option<SynchronizationRecord>,
}

/// Reads `<prn> <hex code>` lines; blank lines and lines starting with # are skipped
fn load_codes(filename:&str) -> Result<Vec<(usize, Vec<i8>)>, AcquisitionErr> {
	let text = std::fs::read_to_string(filename).map_err(|e| AcquisitionErr::Io(format!("unable to read {}: {}", filename, e)))?;

	let mut codes = vec![];
	for line in text.lines().map(|l| l.trim()).filter(|l| !l.is_empty() && !l.starts_with('#')) {
		let mut fields = line.split_whitespace();
		let prn:usize = fields.next().and_then(|p| p.parse().ok())
			.ok_or_else(|| AcquisitionErr::Configuration(format!("bad PRN in code line {:?}", line)))?;
		let hex:&str = fields.next()
			.ok_or_else(|| AcquisitionErr::Configuration(format!("no code for PRN {}", prn)))?;
		codes.push((prn, signal_modulation::e1b_code_from_hex(hex)?));
	}
	Ok(codes)
}

fn new_channel(channel:usize, prn:usize, chips:&[i8], config:&AcquisitionConfig, queue:mpsc::Sender<ChannelEvent>) -> Result<QuickSyncAcquisition, AcquisitionErr> {
	let mut acq = QuickSyncAcquisition::new(channel, config.clone());
	acq.set_channel_queue(queue)?;
	acq.init()?;
	acq.set_local_code(prn, chips)?;
	Ok(acq)
}

fn report(outcome:&AcquisitionOutcome) {
	match outcome {
		AcquisitionOutcome::Acquired(r) => eprintln!("{}", format!("Channel {} PRN {}: acquired at {:.1} [Hz] doppler, {} [samples] delay, {:.4} test statistic",
			r.channel, r.prn, r.acq_doppler_hz, r.acq_delay_samples, r.peak_statistic).green()),
		AcquisitionOutcome::NotAcquired{ mag, threshold, dwells } => eprintln!("{}", format!("Not acquired after {} dwell(s), peak {:.4} vs threshold {:.4}",
			dwells, mag, threshold).yellow()),
	}
}

fn all_done(bank:&Bank) -> bool { bank.channels().iter().all(|acq| acq.state().is_terminal()) }

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {

	tracing_init::init_tracing();

	let matches = App::new("Galileo E1 QuickSync Acquisition")
		.version("0.1.0")
		.about("Takes IQ samples centered on 1575.42 MHz and searches for Galileo E1B primary codes")
		.arg(Arg::with_name("filename")
			.short("f").long("filename")
			.help("Input filename")
			.required(true).takes_value(true))
		.arg(Arg::with_name("input_type")
			.short("t").long("type")
			.takes_value(true)
			.possible_values(&["i8", "i16"])
			.default_value("i16"))
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.takes_value(true).required(true))
		.arg(Arg::with_name("config")
			.short("c").long("config")
			.help("JSON acquisition configuration; missing fields take their defaults")
			.takes_value(true))
		.arg(Arg::with_name("codes")
			.short("p").long("codes")
			.help("Text file of '<prn> <hex code>' lines")
			.required(true).takes_value(true))
		.arg(Arg::with_name("block_len")
			.short("b").long("block_len")
			.help("Samples per delivered block")
			.takes_value(true)
			.default_value("4096"))
		.get_matches();

	let fname:&str = matches.value_of("filename").ok_or("filename is required")?;
	let item_type:ItemType = matches.value_of("input_type").unwrap_or("i16").parse()?;
	let fs:f64 = matches.value_of("sample_rate_sps").ok_or("sample rate is required")?.parse()?;
	let block_len:usize = matches.value_of("block_len").unwrap_or("4096").parse()?;

	let mut config = match matches.value_of("config") {
		Some(path) => AcquisitionConfig::from_json(&std::fs::read_to_string(path)?)?,
		None => AcquisitionConfig::default(),
	};
	config.fs_in_hz = fs;

	let codes = load_codes(matches.value_of("codes").ok_or("codes file is required")?)?;
	info!(filename = fname, fs, channels = codes.len(), "starting acquisition");

	// One slot per channel, since each channel reports at most one terminal transition per run
	let (tx_events, mut rx_events) = mpsc::channel::<ChannelEvent>(codes.len().max(1));
	let coordinator = tokio::spawn(async move {
		let mut acquired:Vec<usize> = vec![];
		while let Some(event) = rx_events.recv().await {
			match event.outcome {
				ChannelOutcome::Acquired    => acquired.push(event.channel),
				ChannelOutcome::NotAcquired => info!(channel = event.channel, "channel free for another signal"),
			}
		}
		acquired
	});

	let mut channels = vec![];
	for (channel, (prn, chips)) in codes.iter().enumerate() {
		channels.push(new_channel(channel, *prn, chips, &config, tx_events.clone())?);
	}
	drop(tx_events);
	let mut bank:Bank = ChannelBank::from_iter(channels.into_iter());

	let source = IqSource::from_file(fname, item_type)?;
	for block in SampleBlocks::new(source, block_len)? {
		match bank.apply(&block) {
			BlockResult::Ready(outcome) => report(&outcome),
			BlockResult::NotReady => {},
			// The bank has already handed the block to every channel
			BlockResult::Err(e) => warn!("{}", e),
		}
		for outcome in bank.drain_outputs() { report(&outcome); }

		if all_done(&bank) { break; }
	}

	// End of file acts as the dwell deadline for channels still searching
	for outcome in bank.control(&AcqControl::Deadline)?.into_iter().flatten() { report(&outcome); }

	let summaries:Vec<ChannelSummary> = bank.channels().iter().zip(&codes).map(|(acq, (prn, _))| ChannelSummary {
		channel: acq.channel(),
		prn: *prn,
		state: acq.state(),
		mag: acq.mag(),
		threshold: acq.threshold(),
		dwells: acq.dwells_used(),
		underruns: acq.underruns(),
		record: acq.synchro(),
	}).collect();

	// Dropping the channels closes the event queue so the coordinator finishes
	drop(bank);
	let acquired = coordinator.await?;
	info!(acquired = acquired.len(), "acquisition finished");

	// Output data in JSON format
	println!("{}", serde_json::to_string_pretty(&summaries)?);

	Ok(())
}
