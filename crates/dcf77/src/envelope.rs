//! Per-bit modulation envelopes and the lock-free handoff to the carrier domain.
//!
//! The scheduler computes one [`Envelope`] per second and publishes it through an
//! [`EnvelopeCell`]: a single `AtomicU64` holding the packed envelope. The scheduling domain is
//! the only writer, the carrier domain the only reader, and a whole-word swap means the carrier
//! can never observe a half-updated envelope. No locks exist anywhere on the carrier path.
//!
//! Envelopes are recomputed every second and never persisted. A sequence number distinguishes
//! consecutive envelopes so the carrier can re-anchor its bit clock even when two seconds in a
//! row carry the same shape.

use core::sync::atomic::{AtomicU64, Ordering};

/// Duration of the low-amplitude window for a 0 bit, in milliseconds.
pub const LOW_MS_ZERO: u16 = 100;
/// Duration of the low-amplitude window for a 1 bit, in milliseconds.
pub const LOW_MS_ONE: u16 = 200;

/// The amplitude and phase shape of one transmitted second.
///
/// A `low_ms` of zero means constant full carrier: used for the missing 59th pulse (the minute
/// marker) and for the safe idle output in the halted state.
#[derive(Clone, Copy, Default)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Envelope {
	/// Low-amplitude duration from the start of the second, in milliseconds.
	pub low_ms: u16,
	/// Whether the phase-modulation chip window is active this second.
	pub phase: bool,
	/// The bit value, used as the phase-modulation polarity.
	pub bit: bool,
	/// Sequence number, wrapping. Changes every published envelope.
	pub seq: u8
}

impl Envelope {
	/// Envelope for a data bit: 100 ms low for a 0, 200 ms low for a 1.
	pub fn data(bit: bool, phase: bool, seq: u8) -> Envelope {
		Envelope {
			low_ms: if bit { LOW_MS_ONE } else { LOW_MS_ZERO },
			phase,
			bit,
			seq
		}
	}

	/// Envelope for the 59th second: no amplitude drop, phase chips carry a 0 bit.
	pub fn marker(phase: bool, seq: u8) -> Envelope {
		Envelope { low_ms: 0, phase, bit: false, seq }
	}

	/// Safe idle envelope: constant full carrier, no modulation of any kind.
	///
	/// Unambiguously non-decodable, used while synchronizing and after halting.
	pub fn idle(seq: u8) -> Envelope {
		Envelope { low_ms: 0, phase: false, bit: false, seq }
	}

	/// The low-amplitude window duration in nanoseconds.
	#[inline(always)]
	pub fn low_ns(&self) -> u64 {
		self.low_ms as u64 * 1_000_000
	}

	/// Pack into the single-word wire format used by [`EnvelopeCell`].
	fn pack(&self) -> u64 {
		self.low_ms as u64
			| (self.phase as u64) << 16
			| (self.bit as u64) << 17
			| (self.seq as u64) << 24
	}

	/// Unpack from the [`EnvelopeCell`] wire format.
	fn unpack(v: u64) -> Envelope {
		Envelope {
			low_ms: v as u16,
			phase: v >> 16 & 1 > 0,
			bit: v >> 17 & 1 > 0,
			seq: (v >> 24) as u8
		}
	}
}

/// Single-writer, single-reader atomic envelope handoff.
///
/// # Examples
///
/// ```
/// # use dcf77::envelope::{Envelope, EnvelopeCell};
/// let cell = EnvelopeCell::new();
/// cell.publish(Envelope::data(true, false, 7));
/// assert_eq!(cell.current().low_ms, 200);
/// assert_eq!(cell.current().seq, 7);
/// ```
pub struct EnvelopeCell(AtomicU64);

impl EnvelopeCell {
	/// Create a cell holding the idle envelope.
	pub const fn new() -> EnvelopeCell {
		EnvelopeCell(AtomicU64::new(0))
	}

	/// Publish a new envelope. Called from the scheduling domain only.
	pub fn publish(&self, envelope: Envelope) {
		self.0.store(envelope.pack(), Ordering::Release);
	}

	/// Read the current envelope. Wait-free; called from the carrier tick path.
	pub fn current(&self) -> Envelope {
		Envelope::unpack(self.0.load(Ordering::Acquire))
	}
}

impl Default for EnvelopeCell {
	fn default() -> Self {
		Self::new()
	}
}
