//! Output backends for the differential pin pair.
//!
//! The carrier thread pushes [`Levels`] through the [`OutputPair`] trait, which keeps the tick
//! loop independent of what the levels drive. Two backends exist:
//!
//! - [`GpioOutput`]: a pair of Raspberry Pi GPIO pins via `rppal`, behind the `hardware` cargo
//!   feature so the binary builds and tests on any host.
//! - [`NullOutput`]: discards levels. Used when no pins are configured, which is useful for
//!   validating frames and timing from the log output alone.

use std::{error, fmt};
use dcf77::Levels;

/// The error type for opening an output backend.
pub enum OutputError {
	/// GPIO is unavailable on this build. Payload is the requested pin pair.
	Unsupported(u8, u8),
	/// The GPIO controller rejected the request. Payload is the underlying error message.
	Gpio(String)
}

impl fmt::Display for OutputError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OutputError::Unsupported(p, n) => {
				write!(f, "GPIO pins {},{} requested but this build has no GPIO support \
				           (rebuild with --features hardware)", p, n)
			}
			OutputError::Gpio(e) => write!(f, "GPIO error: {}", e)
		}
	}
}

impl fmt::Debug for OutputError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for OutputError {}

/// A sink for differential output levels.
///
/// Implementations must be cheap: [`set`](OutputPair::set) is called from the carrier tick loop.
pub trait OutputPair: Send {
	/// Drive both legs to the given levels.
	fn set(&mut self, levels: Levels);
}

/// Discards all levels.
pub struct NullOutput;

impl OutputPair for NullOutput {
	fn set(&mut self, _levels: Levels) {}
}

#[cfg(feature = "hardware")]
mod gpio {
	use rppal::gpio::{Gpio, OutputPin};
	use super::*;

	/// Drives a pair of BCM GPIO pins.
	pub struct GpioOutput {
		p: OutputPin,
		n: OutputPin
	}

	impl GpioOutput {
		/// Claim the two pins and drive them to a known state (p low, n high).
		pub fn new(p: u8, n: u8) -> Result<GpioOutput, OutputError> {
			let gpio = Gpio::new().map_err(|e| OutputError::Gpio(e.to_string()))?;
			let mut p = gpio.get(p)
				.map_err(|e| OutputError::Gpio(e.to_string()))?
				.into_output();
			let mut n = gpio.get(n)
				.map_err(|e| OutputError::Gpio(e.to_string()))?
				.into_output();
			p.set_low();
			n.set_high();
			Ok(GpioOutput { p, n })
		}
	}

	impl OutputPair for GpioOutput {
		fn set(&mut self, levels: Levels) {
			if levels.p { self.p.set_high() } else { self.p.set_low() }
			if levels.n { self.n.set_high() } else { self.n.set_low() }
		}
	}
}

#[cfg(feature = "hardware")]
pub use gpio::GpioOutput;

/// Open the output backend for the configured pin pair.
///
/// With no pins configured, levels go to a [`NullOutput`]. Requesting pins on a build without
/// the `hardware` feature is an error rather than a silent no-op.
pub fn open(pins: Option<(u8, u8)>) -> Result<Box<dyn OutputPair>, OutputError> {
	match pins {
		None => Ok(Box::new(NullOutput)),
		#[cfg(feature = "hardware")]
		Some((p, n)) => Ok(Box::new(GpioOutput::new(p, n)?)),
		#[cfg(not(feature = "hardware"))]
		Some((p, n)) => Err(OutputError::Unsupported(p, n))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_accepts_levels() {
		let mut out = NullOutput;
		out.set(Levels { p: true, n: false });
		out.set(Levels { p: false, n: true });
	}

	#[cfg(not(feature = "hardware"))]
	#[test]
	fn pins_require_hardware_build() {
		assert!(matches!(open(Some((17, 27))), Err(OutputError::Unsupported(17, 27))));
		assert!(open(None).is_ok());
	}
}
