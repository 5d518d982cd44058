//! German civil time (CET/CEST), the time encoded by DCF77.
//!
//! DCF77 always transmits the legal time of Germany: UTC+1 in winter (CET) and UTC+2 during
//! European summer time (CEST). Summer time runs from 01:00 UTC on the last Sunday of March to
//! 01:00 UTC on the last Sunday of October. The rule is fixed in EU law, so this module hardcodes
//! it instead of parsing zoneinfo data; the frame encoder downstream never re-derives any
//! timezone rules.
//!
//! # Examples
//!
//! ```
//! # use time::{berlin, clock::TimeSpec};
//! // Sat, Jun 3, 2023. 19:17:00 UTC -> 21:17:00 CEST.
//! let civil = berlin::civil_time(TimeSpec { sec: 1685819820, nsec: 0 }).unwrap();
//! assert_eq!((civil.year, civil.month, civil.day), (2023, 6, 3));
//! assert_eq!((civil.hour, civil.minute, civil.second), (21, 17, 0));
//! assert_eq!(civil.weekday, 6); // Saturday
//! assert!(civil.dst);
//! assert!(!civil.dst_change);
//! ```

use crate::calendar::{Date, last_sunday, unix_from_ymd};
use crate::clock::TimeSpec;

/// Seconds in one hour.
const HOUR: i64 = 3600;

/// A civil (wall clock) time in Germany, with the DST flags DCF77 transmits.
///
/// Invariant: a valid Gregorian calendar date. Produced here, consumed read-only by the frame
/// encoder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CivilTime {
	/// Absolute Gregorian year, e.g. 2023.
	pub year: u16,
	/// Month of the year, ranged [1, 12].
	pub month: u8,
	/// Day of the month, ranged [1, 31].
	pub day: u8,
	/// Hours, ranged [0, 23].
	pub hour: u8,
	/// Minutes, ranged [0, 59].
	pub minute: u8,
	/// Seconds, ranged [0, 59].
	pub second: u8,
	/// Nanoseconds within the current second.
	pub nanos: u32,
	/// Day of the week, ranged [1, 7] = [Monday, Sunday].
	pub weekday: u8,
	/// Whether summer time (CEST) is in effect.
	pub dst: bool,
	/// Whether a DST change occurs within the hour following this time.
	pub dst_change: bool
}

impl CivilTime {
	/// Advance to the start of the next minute, recomputing all calendar fields and DST flags.
	///
	/// DCF77 frames encode the minute *about to begin*, so the scheduler calls this on the
	/// latest time reading before building a frame.
	///
	/// # Examples
	///
	/// ```
	/// # use time::{berlin, clock::TimeSpec};
	/// // Dec 31, 2023. 23:59:30 CET (22:59:30 UTC).
	/// let civil = berlin::civil_time(TimeSpec { sec: 1704063570, nsec: 0 }).unwrap();
	/// let next = civil.next_minute().unwrap();
	/// assert_eq!((next.year, next.month, next.day), (2024, 1, 1));
	/// assert_eq!((next.hour, next.minute, next.second), (0, 0, 0));
	/// ```
	pub fn next_minute(&self) -> Option<CivilTime> {
		civil_time(TimeSpec {
			sec: self.to_unix() + (60 - self.second as i64),
			nsec: 0
		})
	}

	/// Convert back to a Unix timestamp (whole seconds).
	pub fn to_unix(&self) -> i64 {
		let offset = if self.dst { 2 * HOUR } else { HOUR };
		unix_from_ymd(self.year, self.month, self.day)
			+ self.hour as i64 * HOUR
			+ self.minute as i64 * 60
			+ self.second as i64
			- offset
	}
}

/// Check whether summer time (CEST) is in effect at a given UTC timestamp.
fn summer_time(utc: i64) -> bool {
	let Some(date) = Date::from_unix(utc) else { return false };
	let start = unix_from_ymd(date.year, 3, last_sunday(date.year, 3)) + HOUR;
	let end = unix_from_ymd(date.year, 10, last_sunday(date.year, 10)) + HOUR;
	utc >= start && utc < end
}

/// Convert a UTC timestamp into Berlin civil time.
///
/// The `dst_change` flag mirrors the DCF77 summer time announcement bit: it is set for the 60
/// frames preceding a change, i.e. whenever the DST state one minute earlier differs from the
/// state 59 minutes later. Returns `None` for timestamps before the Unix epoch.
pub fn civil_time(utc: TimeSpec) -> Option<CivilTime> {
	let dst = summer_time(utc.sec);
	let offset = if dst { 2 * HOUR } else { HOUR };
	let date = Date::from_unix(utc.sec + offset)?;

	Some(CivilTime {
		year: date.year,
		month: date.month,
		day: date.day,
		hour: date.hour,
		minute: date.minute,
		second: date.second,
		nanos: utc.nsec as u32,
		weekday: date.weekday,
		dst,
		dst_change: summer_time(utc.sec - 60) != summer_time(utc.sec + 59 * 60)
	})
}
