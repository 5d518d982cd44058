//! Time utilities for the DCF77 transmitter.
//!
//! This crate is divided into three modules: [`clock`] deals with Unix timestamps at nanosecond
//! granularity, [`calendar`] converts between Unix timestamps and UTC calendar time, and
//! [`berlin`] converts Unix timestamps into German civil time (CET/CEST), which is the time
//! actually encoded by DCF77.
//!
//! The calendar functions do not rely on libc's `mktime` and `gmtime` functions, so they are
//! completely thread safe. This crate supports `no_std`; if the `now` feature is enabled, the
//! [`clock`] module adds a helper function to read the system clock ([`clock::now`]).
//!
//! # Examples
//!
//! Basic conversion from Unix time to UTC calendar time.
//! ```
//! # use time::calendar::Date;
//! let date = Date::from_unix(1718617807).unwrap();
//! assert_eq!(date, Date {
//! 	year: 2024,
//! 	month: 6,
//! 	day: 17,
//! 	hour: 9,
//! 	minute: 50,
//! 	second: 7,
//! 	weekday: 1
//! });
//! ```
//!
//! Conversion from Unix time to Berlin civil time.
//! ```
//! # use time::{clock::TimeSpec, berlin};
//! // Sat, Jun 3, 2023. 19:17:00 UTC -> 21:17:00 CEST.
//! let civil = berlin::civil_time(TimeSpec { sec: 1685819820, nsec: 0 }).unwrap();
//! assert_eq!((civil.hour, civil.minute), (21, 17));
//! assert!(civil.dst);
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

pub mod clock;
pub mod calendar;
pub mod berlin;

pub use clock::*;
pub use berlin::CivilTime;
