//! Support for command line argument parsing.
//!
//! See [crate] documentation for details on command line arguments and examples.

use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Debug};
use std::num::NonZero;

/// Default number of consecutive stale minutes tolerated before halting.
const DEFAULT_STALE: u8 = 5;

/// The error type for parsing command line arguments.
#[cfg_attr(test, derive(PartialEq))]
pub enum ArgumentsError {
	/// The option was unrecognized. The option is returned as the payload of this variant.
	UnrecognizedOption(String),
	/// Error converting an option or parameter to UTF-8. The argument index and original
	/// [`OsString`] that could not be converted are returned as the payload of this variant.
	InvalidUTF8(usize, OsString),
	/// Neither `--ntp` nor `--system` was supplied, so there is no time source to transmit.
	MissingTimeSource,
	/// The provided minute count was invalid. The supplied count argument is returned as the
	/// payload of this variant.
	InvalidCount(String),
	/// The provided stale-minute budget was invalid. The supplied argument is returned as the
	/// payload of this variant.
	InvalidStale(String),
	/// The provided GPIO pin pair was invalid. The supplied argument is returned as the payload
	/// of this variant.
	InvalidPins(String),
	/// The parameter for an option was not supplied. The option is returned as the payload for
	/// this variant.
	MissingParameter(String),
	/// Help option (-h) was included, so print help details and exit.
	Help
}

impl Display for ArgumentsError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ArgumentsError::UnrecognizedOption(s) => write!(f, "Unrecognized option: {}", s),
			ArgumentsError::InvalidUTF8(i, v) => write!(f, "Invalid UTF-8 in argument {}: {:?}", i, v),
			ArgumentsError::MissingTimeSource => write!(f, "Missing time source: supply --ntp <server> or --system"),
			ArgumentsError::InvalidCount(s) => write!(f, "Invalid count: {}", s),
			ArgumentsError::InvalidStale(s) => write!(f, "Invalid stale minute budget: {}", s),
			ArgumentsError::InvalidPins(s) => write!(f, "Invalid pin pair (expected e.g. 17,27): {}", s),
			ArgumentsError::MissingParameter(s) => write!(f, "Missing parameter for option {}", s),
			ArgumentsError::Help => write!(f, "Help requested")
		}
	}
}

impl Debug for ArgumentsError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		Display::fmt(self, f)
	}
}

impl Error for ArgumentsError {}

/// Convert an argument to [`&str`].
///
/// The function takes the argument index `i`, optional argument name `a`, and the argument `s`.
///
/// # Errors
///
/// Returns [`ArgumentsError::InvalidUTF8`] if the argument could not be converted to UTF-8 or
/// [`ArgumentsError::MissingParameter`] if the argument is `None`.
fn arg_to_str<'a, 'b>(i: usize, a: Option<&'a str>, s: Option<&'b OsString>)
	-> Result<&'b str, ArgumentsError>
{
	match s {
		Some(v) => v.to_str().ok_or_else(|| ArgumentsError::InvalidUTF8(i, v.clone())),
		None => Err(ArgumentsError::MissingParameter(a.map(String::from).unwrap_or_default()))
	}
}

/// Parse a `P,N` pin pair. The two BCM pin numbers must differ.
fn parse_pins(s: &str) -> Result<(u8, u8), ArgumentsError> {
	let err = || ArgumentsError::InvalidPins(s.to_string());
	let (p, n) = s.split_once(',').ok_or_else(err)?;
	let p: u8 = p.trim().parse().map_err(|_| err())?;
	let n: u8 = n.trim().parse().map_err(|_| err())?;
	if p == n {
		return Err(err());
	}
	Ok((p, n))
}

/// Parsed command line arguments.
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Arguments {
	/// The NTP server to fetch time from (if provided).
	pub ntp: Option<String>,
	/// Whether to use the system clock as the time source.
	pub system: bool,
	/// The GPIO pin pair to drive (if provided). Without it, levels go to a null output.
	pub pins: Option<(u8, u8)>,
	/// Whether to enable the phase modulation chip sequence.
	pub phase: bool,
	/// Consecutive stale minutes tolerated before halting.
	pub stale: u8,
	/// The number of complete minutes to transmit. `None` runs until interrupted.
	pub count: Option<NonZero<u32>>
}

impl Arguments {
	/// Parse command line arguments.
	///
	/// The input can be any type that implements [`Iterator`] that yields [`OsString`], though
	/// typically this would be [`std::env::args_os`]. This function assumes that the application
	/// name is **not** supplied as the first item yielded by `args`.
	///
	/// # Errors
	///
	/// This function can return any of the variants in [`ArgumentsError`]. See that
	/// documentation for more details.
	///
	/// # Examples
	///
	/// ```
	/// let args = match Arguments::parse(std::env::args_os().skip(1)) {
	/// 	Ok(a) => a,
	/// 	Err(e) => {
	/// 		// Handle error
	/// 		panic!("{}", e);
	/// 	}
	/// };
	/// ```
	pub fn parse(mut args: impl Iterator<Item = OsString>) -> Result<Arguments, ArgumentsError>
	{
		let mut ntp: Option<String> = None;
		let mut system = false;
		let mut pins: Option<(u8, u8)> = None;
		let mut phase = false;
		let mut stale: Option<u8> = None;
		let mut count: Option<NonZero<u32>> = None;
		let mut arg = args.next();
		let mut i = 0;
		loop {
			if arg.is_none() { break; }
			match arg_to_str(i, None, arg.as_ref())? {
				"--ntp" => {
					ntp = Some(String::from(arg_to_str(i+1, Some("--ntp"), args.next().as_ref())?));
					// Increment because we called args.next()
					i += 1;
				},
				"--system" => system = true,
				p @ ("-p" | "--pins") => {
					pins = Some(parse_pins(arg_to_str(i+1, Some(p), args.next().as_ref())?)?);
					i += 1;
				},
				"--phase" => phase = true,
				s @ ("-s" | "--stale") => {
					stale = Some(
						arg_to_str(i+1, Some(s), args.next().as_ref())
						.and_then(
							|v| v.parse().map_err(|_| ArgumentsError::InvalidStale(v.to_string()))
						)?
					);
					i += 1;
				},
				n @ ("-n" | "-c" | "--count") => {
					count = Some(
						arg_to_str(i+1, Some(n), args.next().as_ref())
						.and_then(
							|v| v.parse().map_err(|_| ArgumentsError::InvalidCount(v.to_string()))
						)?
					);
					i += 1;
				},
				"-h" | "--help" => return Err(ArgumentsError::Help),
				v => return Err(ArgumentsError::UnrecognizedOption(v.to_string()))
			}
			arg = args.next();
			// Increment because we called args.next()
			i += 1;
		}

		if ntp.is_none() && !system {
			return Err(ArgumentsError::MissingTimeSource);
		}

		Ok(Arguments {
			ntp,
			system,
			pins,
			phase,
			stale: stale.unwrap_or(DEFAULT_STALE),
			count
		})
	}
}
