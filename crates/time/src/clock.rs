//! Unix timestamps with nanosecond granularity.
//!
//! This module provides the [`TimeSpec`] type used throughout the transmitter, plus a helper to
//! read the system clock when the `now` feature is enabled.

#[cfg(feature = "now")]
use core::mem::MaybeUninit;
#[cfg(feature = "now")]
use libc::{CLOCK_MONOTONIC, CLOCK_REALTIME, clock_gettime, timespec};

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Unix time with nanosecond granularity.
///
/// # Examples
///
/// ```
/// # use time::clock::TimeSpec;
/// // Jan 1, 2025. 12:00:00.999999999 UTC.
/// let c = TimeSpec { sec: 1735732800, nsec: 999999999 };
/// assert_eq!(c.add_nanos(10), TimeSpec { sec: c.sec + 1, nsec: 9 });
/// assert_eq!(c.add_secs(-10).sec, c.sec - 10);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeSpec {
	/// Seconds since the Unix epoch.
	pub sec: i64,
	/// Nanoseconds since the beginning of `sec`, ranged [0, 999999999].
	pub nsec: i64
}

impl TimeSpec {
	/// Add `s` seconds to `self`. Negative values subtract.
	pub fn add_secs(mut self, s: i64) -> TimeSpec {
		self.sec += s;
		self
	}

	/// Add `ns` nanoseconds to `self`, rolling over seconds as needed to keep `nsec` in
	/// [0, 999999999]. Negative values subtract.
	pub fn add_nanos(mut self, ns: i64) -> TimeSpec {
		self.nsec += ns;
		self.sec += self.nsec.div_euclid(NANOS_PER_SEC);
		self.nsec = self.nsec.rem_euclid(NANOS_PER_SEC);
		self
	}

	/// Nanoseconds until the next whole-second boundary.
	///
	/// Returns [`NANOS_PER_SEC`] when `self` sits exactly on a boundary, so sleeping by the
	/// returned amount always lands on the *next* second.
	pub fn nanos_to_boundary(&self) -> i64 {
		NANOS_PER_SEC - self.nsec
	}

	/// Distance to the nearest whole-second boundary, in nanoseconds.
	///
	/// Useful for measuring scheduling drift: a wakeup intended for a second boundary should
	/// report a small value here.
	pub fn boundary_error(&self) -> i64 {
		self.nsec.min(NANOS_PER_SEC - self.nsec)
	}
}

#[cfg(feature = "now")]
impl From<timespec> for TimeSpec {
	fn from(value: timespec) -> Self {
		TimeSpec {
			sec: value.tv_sec,
			nsec: value.tv_nsec
		}
	}
}

/// Get the current time as a Unix timestamp with nanosecond granularity.
///
/// This function will return `None` if `libc::clock_gettime` fails. It is thread safe.
///
/// # Examples
///
/// ```
/// # use time::clock::now;
/// let c = now().expect("Failed to get current time");
/// assert!(c.sec > 0);
/// ```
#[cfg(feature = "now")]
pub fn now() -> Option<TimeSpec> {
	read_clock(CLOCK_REALTIME)
}

/// Get the monotonic clock as a [`TimeSpec`] with an arbitrary origin.
///
/// Unlike [`now`], this reading never steps backwards when the system time is adjusted, which
/// makes it the right timebase for measuring elapsed time. It will return `None` if
/// `libc::clock_gettime` fails. It is thread safe.
#[cfg(feature = "now")]
pub fn monotonic() -> Option<TimeSpec> {
	read_clock(CLOCK_MONOTONIC)
}

#[cfg(feature = "now")]
fn read_clock(clock: libc::clockid_t) -> Option<TimeSpec> {
	let mut time = MaybeUninit::<timespec>::uninit();
	// Safety:
	// - clock_gettime does not read time, only writes
	// - if clock_gettime returns zero, time is successfully initialized
	unsafe {
		match clock_gettime(clock, time.as_mut_ptr()) {
			0 => Some(time.assume_init().into()),
			_ => None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_nanos_rollover() {
		let c = TimeSpec { sec: 100, nsec: 999999999 };
		assert_eq!(c.add_nanos(1), TimeSpec { sec: 101, nsec: 0 });
		assert_eq!(c.add_nanos(2), TimeSpec { sec: 101, nsec: 1 });
		assert_eq!(c.add_nanos(-999999999), TimeSpec { sec: 100, nsec: 0 });
		assert_eq!(c.add_nanos(-1000000000), TimeSpec { sec: 99, nsec: 999999999 });
		assert_eq!(c.add_nanos(NANOS_PER_SEC * 3 + 1), TimeSpec { sec: 104, nsec: 0 });
	}

	#[test]
	fn boundary_math() {
		let c = TimeSpec { sec: 5, nsec: 0 };
		assert_eq!(c.nanos_to_boundary(), NANOS_PER_SEC);
		assert_eq!(c.boundary_error(), 0);

		let c = TimeSpec { sec: 5, nsec: 4000000 };
		assert_eq!(c.nanos_to_boundary(), 996000000);
		assert_eq!(c.boundary_error(), 4000000);

		let c = TimeSpec { sec: 5, nsec: 996000000 };
		assert_eq!(c.boundary_error(), 4000000);
	}

	#[cfg(feature = "now")]
	#[test]
	fn monotonic_never_decreases() {
		let a = monotonic().unwrap();
		let b = monotonic().unwrap();
		assert!((b.sec, b.nsec) >= (a.sec, a.nsec));
	}
}
