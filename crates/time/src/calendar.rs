//! Conversion between Unix timestamps and UTC calendar time.
//!
//! The conversions here use the era-based algorithms described by Howard Hinnant
//! (<http://howardhinnant.github.io/date_algorithms.html>): the Gregorian calendar repeats every
//! 400 years, and rotating the year to run March through February puts the leap day at the end of
//! the rotated year, which makes the per-year math branchless. Nothing in this module calls into
//! libc, so everything is thread safe.

/// Days from March 1, year 0 to January 1, 1970.
const EPOCH_SHIFT: i64 = 719468;
/// Days per 400-year era.
const DAYS_PER_ERA: i64 = 146097;
/// Seconds per day.
const SECONDS_PER_DAY: i64 = 86400;

/// A UTC calendar date and time.
///
/// `weekday` is ISO style, 1 = Monday through 7 = Sunday, matching the DCF77 day-of-week
/// encoding.
///
/// # Examples
///
/// ```
/// # use time::calendar::Date;
/// let date = Date::from_unix(1718617807).unwrap();
/// assert_eq!(date, Date {
/// 	year: 2024,
/// 	month: 6,
/// 	day: 17,
/// 	hour: 9,
/// 	minute: 50,
/// 	second: 7,
/// 	weekday: 1
/// });
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Date {
	/// Absolute Gregorian year, e.g. 2024.
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
	/// Day of the week, ranged [1, 7] = [Monday, Sunday].
	pub weekday: u8
}

impl Date {
	/// Convert a Unix timestamp into a UTC calendar date.
	///
	/// Only timestamps on or after the Unix epoch (Jan 1, 1970) are supported; negative inputs
	/// return `None`.
	pub fn from_unix(unixtimestamp: i64) -> Option<Date> {
		if unixtimestamp < 0 { return None }
		let days = unixtimestamp / SECONDS_PER_DAY;
		let rem = unixtimestamp % SECONDS_PER_DAY;

		let z = days + EPOCH_SHIFT;
		let era = z / DAYS_PER_ERA;
		let doe = z % DAYS_PER_ERA;
		let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
		let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
		// Linear equations mapping rotated day-of-year to month and day-of-month
		let mp = (5 * doy + 2) / 153;
		let d = doy - (153 * mp + 2) / 5 + 1;
		// Un-rotate from Mar-Feb back to Jan-Dec
		let m = if mp < 10 { mp + 3 } else { mp - 9 };
		let y = yoe + era * 400 + (m <= 2) as i64;

		Some(Date {
			year: y as u16,
			month: m as u8,
			day: d as u8,
			hour: (rem / 3600) as u8,
			minute: (rem / 60 % 60) as u8,
			second: (rem % 60) as u8,
			weekday: ((days + 3) % 7 + 1) as u8 // Jan 1, 1970 was a Thursday
		})
	}
}

/// Get the Unix timestamp for 00:00:00 UTC on a given year, month, and day.
///
/// `y` must be the absolute Gregorian calendar year, `m` the 1-indexed month, and `d` the day of
/// the month.
///
/// # Examples
///
/// ```
/// # use time::calendar::unix_from_ymd;
/// assert_eq!(unix_from_ymd(2024, 2, 29), 1709164800);
/// assert_eq!(unix_from_ymd(2024, 3, 1), 1709251200);
/// ```
pub fn unix_from_ymd(y: u16, m: u8, d: u8) -> i64 {
	let y = y as i64 - (m <= 2) as i64;
	let era = y / 400;
	let yoe = y - era * 400;
	let mp = if m > 2 { m as i64 - 3 } else { m as i64 + 9 };
	let doy = (153 * mp + 2) / 5 + d as i64 - 1;
	let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
	SECONDS_PER_DAY * (era * DAYS_PER_ERA + doe - EPOCH_SHIFT)
}

/// Check whether a given absolute Gregorian `year` is a leap year.
///
/// # Examples
///
/// ```
/// # use time::calendar::is_leap_year;
/// assert_eq!(is_leap_year(1900), false);
/// assert_eq!(is_leap_year(2000), true);
/// assert_eq!(is_leap_year(2024), true);
/// ```
#[inline(always)]
pub fn is_leap_year(year: u16) -> bool {
	year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// The number of days in a given month.
pub fn days_in_month(year: u16, month: u8) -> u8 {
	match month {
		2 => if is_leap_year(year) { 29 } else { 28 },
		4 | 6 | 9 | 11 => 30,
		_ => 31
	}
}

/// Day of the week (1 = Monday, 7 = Sunday) for a given year, month, and day.
pub fn weekday_from_ymd(y: u16, m: u8, d: u8) -> u8 {
	let days = unix_from_ymd(y, m, d) / SECONDS_PER_DAY;
	((days + 3).rem_euclid(7) + 1) as u8
}

/// Day of the month of the last Sunday in a given month.
///
/// European daylight saving time switches on the last Sunday of March and October, so this is the
/// only "nth weekday" rule the transmitter needs.
///
/// # Examples
///
/// ```
/// # use time::calendar::last_sunday;
/// assert_eq!(last_sunday(2023, 3), 26);
/// assert_eq!(last_sunday(2023, 10), 29);
/// assert_eq!(last_sunday(2024, 3), 31);
/// ```
pub fn last_sunday(year: u16, month: u8) -> u8 {
	let last = days_in_month(year, month);
	last - weekday_from_ymd(year, month, last) % 7
}
