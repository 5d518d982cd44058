//! Transmit the [DCF77] time signal from NTP or system time.
//!
//! This application emulates the DCF77 longwave transmitter in Mainflingen: it encodes Berlin
//! civil time into the 59-bit minute frame and drives a 77.5 kHz carrier with the standard
//! amplitude envelope (and optionally the pseudo-random phase modulation) on a differential
//! GPIO pin pair. A ferrite rod or small loop antenna on the pins is enough to set
//! radio-controlled clocks nearby.
//!
//! [DCF77]: https://en.wikipedia.org/wiki/DCF77
//!
//! # Command Line Arguments
//!
//! General form: `dcf77tx [options...]`
//!
//! | Short form | Long form  | Argument        | Default     | Description                          |
//! | ---------- | ---------- | --------------- | ----------- | ------------------------------------ |
//! |            | `--ntp`    | Hostname or IP  | None        | Fetch time over [NTP]                |
//! |            | `--system` |                 | Off         | Use the system clock                 |
//! | `-p`       | `--pins`   | `P,N` BCM pins  | None (null) | The GPIO pin pair to drive           |
//! |            | `--phase`  |                 | Off         | Enable phase modulation              |
//! | `-s`       | `--stale`  | Integer >= 0    | 5           | Stale minutes tolerated before halt  |
//! | `-n`, `-c` | `--count`  | Integer > 0     | Unlimited   | Number of complete minutes to send   |
//!
//! One of `--ntp` or `--system` is required. With `--ntp`, the time source is re-queried at
//! every minute boundary; transient failures reuse the previous frame for up to `--stale`
//! minutes before the transmitter halts with a flat carrier.
//!
//! Driving GPIO pins requires building with the `hardware` cargo feature (Raspberry Pi).
//! Without `--pins`, the waveform is computed and discarded, which still exercises the whole
//! pipeline and prints each transmitted frame.
//!
//! [NTP]: sntp
//!
//! # Examples
//!
//! Transmit from an NTP pool on GPIO 17/27 for 8 minutes
//! ```sh
//! dcf77tx --ntp pool.ntp.org -p 17,27 -n 8
//! ```
//!
//! Dry run from the system clock, with phase modulation
//! ```sh
//! dcf77tx --system --phase
//! ```

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use dcf77::{BitScheduler, CarrierDriver, Envelope, EnvelopeCell, Levels, State, TimeSource, TimeUnavailable};
use time::{berlin, clock, CivilTime};

use args::{Arguments, ArgumentsError};

mod args;
mod output;

/// The configured civil time source.
enum Source {
	/// Query an NTP server, retrying once after a short pause.
	Ntp(String),
	/// Read the system clock.
	System
}

impl TimeSource for Source {
	fn fetch(&mut self) -> Result<CivilTime, TimeUnavailable> {
		let utc = match self {
			Source::Ntp(server) => {
				let mut result = sntp::fetch_time(server);
				if result.is_err() {
					thread::sleep(Duration::from_millis(200));
					result = sntp::fetch_time(server);
				}
				result
					.inspect_err(|e| eprintln!("Warning: {}", e))
					.map_err(|_| TimeUnavailable)?
			}
			Source::System => clock::now().ok_or(TimeUnavailable)?
		};
		berlin::civil_time(utc).ok_or(TimeUnavailable)
	}
}

/// Flatten a clock reading into nanoseconds, for the carrier tick clock.
#[inline(always)]
fn total_ns(t: clock::TimeSpec) -> u64 {
	t.sec as u64 * 1_000_000_000 + t.nsec as u64
}

/// Run the transmitter until `--count` minutes are sent, the scheduler halts, or time cannot
/// be read at all.
///
/// The carrier runs on its own thread, reading envelopes from a shared [`EnvelopeCell`] and
/// pushing levels to the output backend; the main thread sleeps to each second boundary and
/// steps the scheduler. On any exit path the carrier is left flat before the thread stops, so
/// the antenna never keeps radiating a stale signal.
///
/// # Errors
///
/// This function can generate a variety of errors, all wrapped in `Box<dyn Error>`:
/// - [`output::OutputError`] from opening the GPIO backend.
/// - `&str` for untyped errors (system clock unavailable, transmission halted).
fn run(args: Arguments) -> Result<ExitCode, Box<dyn Error>> {
	let mut out = output::open(args.pins)?;
	let cell = Arc::new(EnvelopeCell::new());
	let stop = Arc::new(AtomicBool::new(false));

	let carrier = {
		let cell = Arc::clone(&cell);
		let stop = Arc::clone(&stop);
		thread::spawn(move || {
			let mut driver = CarrierDriver::new(&cell);
			let mut last_p = None;
			while !stop.load(Ordering::Relaxed) {
				// The monotonic clock: an ntpd step must never run the bit clock backwards
				let Some(t) = clock::monotonic() else { continue };
				let levels = driver.tick(total_ns(t));
				// Only touch the pins on an edge
				if last_p != Some(levels.p) {
					out.set(levels);
					last_p = Some(levels.p);
				}
			}
			// De-energize both legs on the way out
			out.set(Levels { p: false, n: false });
		})
	};

	let source = match args.ntp {
		Some(server) => Source::Ntp(server),
		None => Source::System
	};
	let mut scheduler = BitScheduler::new(source, args.stale, args.phase);

	let mut minutes = 0u32;
	let mut last_state = State::Uninitialized;
	let mut last_seq = 0u8;
	let result = loop {
		let Some(now) = clock::now() else {
			break Err("Failed to get current system time");
		};
		thread::sleep(Duration::from_nanos(now.nanos_to_boundary() as u64));
		let Some(now) = clock::now() else {
			break Err("Failed to get current system time");
		};

		let step = scheduler.on_second(now);
		cell.publish(step.envelope);
		last_seq = step.envelope.seq;

		if let Some(e) = step.encode_error {
			eprintln!("Warning: {}", e);
		}
		if let Some(n) = step.stale_minutes {
			eprintln!("Warning: no valid time for {} minute(s), reusing previous frame", n);
		}
		if let Some(d) = step.drift_ns {
			eprintln!("Warning: woke {} ms away from the second boundary", d / 1_000_000);
		}

		match step.state {
			State::Running | State::Degraded => {
				if last_state != State::Running && last_state != State::Degraded {
					println!("Synchronized at second {:02}", step.second);
				}
				if let Some(c) = berlin::civil_time(now) {
					println!("{:02}:{:02}:{:02} {}", c.hour, c.minute, c.second, step.frame);
				}
			}
			State::Halted => {
				break Err("Time source lost, transmission halted");
			}
			_ => ()
		}
		last_state = step.state;

		if step.second == 59 {
			minutes += 1;
			if args.count.is_some_and(|c| minutes >= c.get()) {
				break Ok(());
			}
		}
	};

	// Flatten the carrier before stopping it
	cell.publish(Envelope::idle(last_seq.wrapping_add(1)));
	thread::sleep(Duration::from_millis(20));
	stop.store(true, Ordering::Relaxed);
	if carrier.join().is_err() {
		return Err("Carrier thread panicked".into());
	}

	result?;
	Ok(ExitCode::SUCCESS)
}

/// Main program entry point.
///
/// Parses input arguments and runs the transmitter. See [`crate`] documentation for details.
fn main() -> ExitCode {
	let args = match Arguments::parse(std::env::args_os().skip(1)) {
		Ok(a) => a,
		Err(e) => {
			return if let ArgumentsError::Help = e {
				println!("\
Transmit the DCF77 time signal on a differential GPIO pin pair.

Usage: dcf77tx [OPTIONS]

Options:
  --ntp <SERVER>        fetch time from this NTP server or pool
  --system              use the system clock as the time source
  -p, --pins <P,N>      the BCM pin pair to drive, default none (dry run)
  --phase               enable the pseudo-random phase modulation
  -s, --stale <N>       stale minutes tolerated before halting, default 5
  -n, -c, --count <N>   stop after N complete minutes, default unlimited

One of --ntp or --system is required. Driving pins needs a build with
--features hardware.

Examples:
  dcf77tx --ntp pool.ntp.org -p 17,27 -n 8
  dcf77tx --system --phase\n");
				ExitCode::SUCCESS
			} else {
				eprintln!("{}", e);
				ExitCode::FAILURE
			}
		}
	};

	if args.ntp.is_some() && args.system {
		println!("Warning: --system does nothing when --ntp is set");
	}

	run(args)
		.inspect_err(|e| eprintln!("{}", e))
		.unwrap_or(ExitCode::FAILURE)
}
