//! The DCF77 time-to-waveform pipeline.
//!
//! This crate turns civil time into the waveform a radio-controlled clock expects from the
//! [DCF77](https://en.wikipedia.org/wiki/DCF77) transmitter in Mainflingen: a 77.5 kHz carrier
//! whose amplitude drops to 12.5 % for 100 ms (bit 0) or 200 ms (bit 1) at the start of every
//! second, with the 59th second left unmodulated as the minute marker.
//!
//! The pipeline has three stages, one module each:
//! - [`frame`] encodes a [`CivilTime`] into the 59-bit minute frame (BCD, parity, control bits).
//! - [`scheduler`] runs the 1 Hz cadence: an explicit state machine that picks the bit for each
//!   second, rebuilds the frame at minute boundaries, and degrades safely when the time source
//!   disappears.
//! - [`carrier`] generates the carrier and applies the per-bit [`envelope`], at its own tick
//!   rate, decoupled from the scheduler through a single-word atomic handoff
//!   ([`envelope::EnvelopeCell`]).
//!
//! This crate is `no_std` and performs no allocation, so the carrier path can run on a dedicated
//! real-time thread (or bare-metal core) without blocking.
//!
//! # Examples
//!
//! ```
//! # use dcf77::frame;
//! # use time::{berlin, clock::TimeSpec};
//! // Sat, Jun 3, 2023. 21:17:00 CEST.
//! let civil = berlin::civil_time(TimeSpec { sec: 1685819820, nsec: 0 }).unwrap();
//! let frame = frame::build(&civil).unwrap();
//! assert_eq!(
//! 	frame.to_string(),
//! 	"0-00000000000000-001001-11101000-1000010-110000-011-01100-110001001"
//! );
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

use core::{error, fmt};

pub mod frame;
pub mod envelope;
pub mod scheduler;
pub mod carrier;

pub use frame::Frame;
pub use envelope::{Envelope, EnvelopeCell};
pub use scheduler::{BitScheduler, State, Step};
pub use carrier::{CarrierDriver, Levels};

use time::CivilTime;

/// The error type for encoding frames from malformed calendar input.
///
/// Each variant carries the offending field value. An invalid time is fatal to the single
/// [`frame::build`] call that saw it, never to the scheduler: the previously built frame stays
/// active.
#[derive(Clone, Copy)]
#[cfg_attr(test, derive(PartialEq))]
pub enum InvalidTimeError {
	/// The year is outside the range encodable by DCF77's year-of-century field, [2000, 2099].
	Year(u16),
	/// The month is outside [1, 12].
	Month(u8),
	/// The day is outside the bounds of the given month.
	Day(u8),
	/// The hour is outside [0, 23].
	Hour(u8),
	/// The minute is outside [0, 59].
	Minute(u8),
	/// The second is nonzero. Frames are built for the start of the upcoming minute, so the
	/// caller must advance the timestamp before encoding.
	Second(u8),
	/// The weekday is outside [1, 7].
	Weekday(u8)
}

impl fmt::Display for InvalidTimeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			InvalidTimeError::Year(x) => write!(f, "Year not encodable by DCF77: {}", x),
			InvalidTimeError::Month(x) => write!(f, "Invalid month: {}", x),
			InvalidTimeError::Day(x) => write!(f, "Invalid day of month: {}", x),
			InvalidTimeError::Hour(x) => write!(f, "Invalid hour: {}", x),
			InvalidTimeError::Minute(x) => write!(f, "Invalid minute: {}", x),
			InvalidTimeError::Second(x) => write!(f, "Frame time not at a minute boundary: second {}", x),
			InvalidTimeError::Weekday(x) => write!(f, "Invalid weekday: {}", x)
		}
	}
}

impl fmt::Debug for InvalidTimeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for InvalidTimeError {}

/// The error type for a failed time source read.
///
/// Implementations of [`TimeSource`] must report failure rather than silently returning stale
/// data; the scheduler decides how to degrade.
#[derive(Clone, Copy)]
#[cfg_attr(test, derive(PartialEq))]
pub struct TimeUnavailable;

impl fmt::Display for TimeUnavailable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Time source unavailable")
	}
}

impl fmt::Debug for TimeUnavailable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for TimeUnavailable {}

/// Trait for civil time sources.
///
/// The scheduler calls [`fetch`](TimeSource::fetch) roughly once per minute, from the scheduling
/// domain only, so implementations may block on network I/O and retry internally with bounded
/// backoff.
pub trait TimeSource {
	/// Get the current Berlin civil time.
	fn fetch(&mut self) -> Result<CivilTime, TimeUnavailable>;
}
