//! Encoding civil time into the 59-bit DCF77 minute frame.
//!
//! Frame layout, bit 0 transmitted first:
//!
//! | Bits  | Meaning                                            |
//! | ----- | -------------------------------------------------- |
//! | 0     | Start of minute, always 0                          |
//! | 1-14  | Civil warning bits, unimplemented, 0               |
//! | 15    | Call bit, unused, 0                                |
//! | 16    | Summer time announcement, set the hour before      |
//! | 17    | CEST in effect                                     |
//! | 18    | CET in effect                                      |
//! | 19    | Leap second announcement, unimplemented, 0         |
//! | 20    | Start of encoded time, always 1                    |
//! | 21-27 | Minute in BCD (1, 2, 4, 8, 10, 20, 40)             |
//! | 28    | Even parity over bits 21-27                        |
//! | 29-34 | Hour in BCD                                        |
//! | 35    | Even parity over bits 29-34                        |
//! | 36-41 | Day of month in BCD                                |
//! | 42-44 | Day of week (1 = Monday)                           |
//! | 45-49 | Month in BCD                                       |
//! | 50-57 | Year of century in BCD                             |
//! | 58    | Even parity over bits 36-57                        |
//!
//! Second 59 carries no bit at all: the missing amplitude drop is the minute marker, handled by
//! the scheduler rather than encoded here.
//!
//! The encoded time is the minute *about to begin*, so [`build`] must be called with an
//! already-advanced timestamp (see [`time::berlin::CivilTime::next_minute`]).

use core::fmt;
use time::{CivilTime, calendar};
use crate::InvalidTimeError;

/// Number of transmitted bits per minute frame.
pub const FRAME_BITS: u8 = 59;

/// An immutable DCF77 minute frame.
///
/// The 59 bits are packed LSB-first in a `u64`: bit `i` of the integer is the bit transmitted
/// during second `i`. The top five bits are unused and always zero.
///
/// The `Display` impl renders the frame as the diagnostic bit string used in the transmit log,
/// grouped `start-weather-flags-minute-hour-day-weekday-month-year` (the call bit is printed
/// with the flag group, each parity bit with its own group).
#[derive(Clone, Copy, Default)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Frame(u64);

impl Frame {
	/// Get the bit transmitted during second `i` of the minute.
	///
	/// Indices at or above [`FRAME_BITS`] return `false`; second 59 has no bit on air at all.
	#[inline(always)]
	pub fn bit(&self, i: u8) -> bool {
		(self.0 >> (i & 0x3f)) & 1 > 0 && i < FRAME_BITS
	}

	/// The raw packed frame, LSB transmitted first.
	pub fn packed(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Group widths for bit 0, weather, call+flags, minute, hour, day, weekday, month, year
		const GROUPS: [u8; 9] = [1, 14, 6, 8, 7, 6, 3, 5, 9];
		let mut i = 0;
		for (g, &width) in GROUPS.iter().enumerate() {
			if g > 0 {
				write!(f, "-")?;
			}
			for _ in 0..width {
				write!(f, "{}", self.bit(i) as u8)?;
				i += 1;
			}
		}
		Ok(())
	}
}

/// Convert a two-digit value to BCD, ones digit in the low nibble.
#[inline(always)]
fn bcd(value: u8) -> u8 {
	(value / 10) << 4 | (value % 10)
}

/// Even parity bit for a group: 1 iff the group has an odd number of set bits.
#[inline(always)]
fn parity(group: u32) -> u64 {
	(group.count_ones() & 1) as u64
}

/// Validate that `civil` describes a calendar time this encoder can represent.
fn validate(civil: &CivilTime) -> Result<(), InvalidTimeError> {
	if !(2000..=2099).contains(&civil.year) {
		return Err(InvalidTimeError::Year(civil.year));
	}
	if !(1..=12).contains(&civil.month) {
		return Err(InvalidTimeError::Month(civil.month));
	}
	if civil.day < 1 || civil.day > calendar::days_in_month(civil.year, civil.month) {
		return Err(InvalidTimeError::Day(civil.day));
	}
	if civil.hour > 23 {
		return Err(InvalidTimeError::Hour(civil.hour));
	}
	if civil.minute > 59 {
		return Err(InvalidTimeError::Minute(civil.minute));
	}
	if civil.second != 0 {
		return Err(InvalidTimeError::Second(civil.second));
	}
	if !(1..=7).contains(&civil.weekday) {
		return Err(InvalidTimeError::Weekday(civil.weekday));
	}
	Ok(())
}

/// Build the frame for the minute beginning at `civil`.
///
/// Pure and deterministic: identical input yields a bit-identical frame, and each call returns a
/// new immutable [`Frame`]. `civil.second` must be zero; callers encode the *upcoming* minute,
/// advancing the timestamp first so hour, day, and year rollovers are already resolved.
///
/// # Errors
///
/// Returns [`InvalidTimeError`] if any calendar field is out of bounds or the year falls outside
/// [2000, 2099].
///
/// # Examples
///
/// ```
/// # use dcf77::frame;
/// # use time::{berlin, clock::TimeSpec};
/// // Sat, Jun 3, 2023. 21:17:00 CEST.
/// let civil = berlin::civil_time(TimeSpec { sec: 1685819820, nsec: 0 }).unwrap();
/// let frame = frame::build(&civil).unwrap();
/// assert!(!frame.bit(0));
/// assert!(frame.bit(20));
/// ```
pub fn build(civil: &CivilTime) -> Result<Frame, InvalidTimeError> {
	validate(civil)?;

	let minute = (bcd(civil.minute) & 0x7f) as u32;
	let hour = (bcd(civil.hour) & 0x3f) as u32;
	let date = (bcd(civil.day) & 0x3f) as u32
			 | (civil.weekday as u32) << 6
			 | ((bcd(civil.month) & 0x1f) as u32) << 9
			 | (bcd((civil.year % 100) as u8) as u32) << 14;

	// Bit 20 always set, indicates the start of encoded time
	let mut r: u64 = 1 << 20;
	r |= (civil.dst_change as u64) << 16;
	r |= if civil.dst { 1 << 17 } else { 1 << 18 };
	r |= (minute as u64) << 21;
	r |= parity(minute) << 28;
	r |= (hour as u64) << 29;
	r |= parity(hour) << 35;
	r |= (date as u64) << 36;
	r |= parity(date) << 58;

	Ok(Frame(r))
}

#[cfg(test)]
mod tests {
	use std::string::ToString;
	use time::{berlin, clock::TimeSpec};
	use super::*;
	use crate::InvalidTimeError;

	fn civil(sec: i64) -> CivilTime {
		berlin::civil_time(TimeSpec { sec, nsec: 0 }).unwrap()
	}

	// Sat, Jun 3, 2023. 21:17:00 CEST.
	const REFERENCE: i64 = 1685819820;

	#[test]
	fn reference_scenario() {
		let frame = build(&civil(REFERENCE)).unwrap();
		assert_eq!(
			frame.to_string(),
			"0-00000000000000-001001-11101000-1000010-110000-011-01100-110001001"
		);
	}

	#[test]
	fn fixed_bits() {
		for &sec in &[REFERENCE, 946684800, 4102441200 - 3600] {
			let frame = build(&civil(sec)).unwrap();
			assert!(!frame.bit(0), "bit 0 must be 0");
			for i in 1..=15 {
				assert!(!frame.bit(i), "bit {} must be 0", i);
			}
			assert!(!frame.bit(19), "leap second announcement unimplemented");
			assert!(frame.bit(20), "bit 20 must be 1");
			// Exactly one of CEST/CET
			assert!(frame.bit(17) ^ frame.bit(18));
			// No bits beyond the frame
			assert_eq!(frame.packed() >> FRAME_BITS, 0);
			assert!(!frame.bit(59));
			assert!(!frame.bit(255));
		}
	}

	fn group_parity(frame: &Frame, from: u8, to: u8) -> bool {
		let mut ones = 0;
		for i in from..=to {
			ones += frame.bit(i) as u32;
		}
		ones % 2 == 0
	}

	#[test]
	fn parity_groups_even() {
		// Sweep a day's worth of minutes
		for minute in 0..1440 {
			let frame = build(&civil(REFERENCE - 17 * 60 + minute * 60)).unwrap();
			assert!(group_parity(&frame, 21, 28), "minute parity at offset {}", minute);
			assert!(group_parity(&frame, 29, 35), "hour parity at offset {}", minute);
			assert!(group_parity(&frame, 36, 58), "date parity at offset {}", minute);
		}
	}

	#[test]
	fn idempotent() {
		let c = civil(REFERENCE);
		assert_eq!(build(&c).unwrap(), build(&c).unwrap());
	}

	#[test]
	fn decode_round_trip() {
		// Recover every field from the packed frame and compare with the input
		let c = civil(REFERENCE);
		let packed = build(&c).unwrap().packed();
		let unbcd = |v: u64, mask: u64| ((v & mask) >> 4) * 10 + (v & 0xf);
		assert_eq!(unbcd(packed >> 21 & 0x7f, 0x70), c.minute as u64);
		assert_eq!(unbcd(packed >> 29 & 0x3f, 0x30), c.hour as u64);
		assert_eq!(unbcd(packed >> 36 & 0x3f, 0x30), c.day as u64);
		assert_eq!(packed >> 42 & 0x7, c.weekday as u64);
		assert_eq!(unbcd(packed >> 45 & 0x1f, 0x10), c.month as u64);
		assert_eq!(unbcd(packed >> 50 & 0xff, 0xf0), (c.year % 100) as u64);
	}

	#[test]
	fn year_rollover() {
		// Dec 31, 2023. 23:59:00 CET -> next frame is Jan 1, 2024
		let next = civil(1704063540).next_minute().unwrap();
		let packed = build(&next).unwrap().packed();
		assert_eq!(packed >> 36 & 0x3f, 0x01); // day 1
		assert_eq!(packed >> 42 & 0x7, 1);     // Monday
		assert_eq!(packed >> 45 & 0x1f, 0x01); // January
		assert_eq!(packed >> 50 & 0xff, 0x24); // year 24
	}

	#[test]
	fn hour_rollover() {
		// Minute 59 -> 0 advances the hour in the encoded frame
		let next = civil(REFERENCE + 42 * 60).next_minute().unwrap();
		let packed = build(&next).unwrap().packed();
		assert_eq!(packed >> 21 & 0x7f, 0);    // minute 0
		assert_eq!(packed >> 29 & 0x3f, 0x22); // hour 22
	}

	#[test]
	fn dst_announcement() {
		// 01:00 UTC, last Sunday of March 2023; flag set through the preceding hour
		let change = 1679792400;
		let frame = build(&civil(change - 30 * 60)).unwrap();
		assert!(frame.bit(16));
		assert!(!frame.bit(17), "CEST not yet in effect");
		assert!(frame.bit(18));

		// First frame after the switch: announcement still set, zone bits flipped
		let frame = build(&civil(change)).unwrap();
		assert!(frame.bit(16));
		assert!(frame.bit(17));
		assert!(!frame.bit(18));

		// An hour later everything is settled
		let frame = build(&civil(change + 3600)).unwrap();
		assert!(!frame.bit(16));
		assert!(frame.bit(17));
	}

	#[test]
	fn rejects_invalid_input() {
		let mut c = civil(REFERENCE);
		c.second = 30;
		assert_eq!(build(&c), Err(InvalidTimeError::Second(30)));

		let mut c = civil(REFERENCE);
		c.year = 1999;
		assert_eq!(build(&c), Err(InvalidTimeError::Year(1999)));
		c.year = 2100;
		assert_eq!(build(&c), Err(InvalidTimeError::Year(2100)));

		let mut c = civil(REFERENCE);
		c.month = 13;
		assert_eq!(build(&c), Err(InvalidTimeError::Month(13)));

		let mut c = civil(REFERENCE);
		c.day = 31; // June has 30 days
		assert_eq!(build(&c), Err(InvalidTimeError::Day(31)));

		let mut c = civil(REFERENCE);
		c.hour = 24;
		assert_eq!(build(&c), Err(InvalidTimeError::Hour(24)));

		let mut c = civil(REFERENCE);
		c.weekday = 0;
		assert_eq!(build(&c), Err(InvalidTimeError::Weekday(0)));
	}

	#[test]
	fn feb_29_bounds() {
		let mut c = civil(REFERENCE);
		c.year = 2024;
		c.month = 2;
		c.day = 29;
		c.weekday = 4;
		assert!(build(&c).is_ok());
		c.year = 2023;
		c.weekday = 3;
		assert_eq!(build(&c), Err(InvalidTimeError::Day(29)));
	}
}
