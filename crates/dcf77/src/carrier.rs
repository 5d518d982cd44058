//! The 77.5 kHz carrier generator.
//!
//! [`CarrierDriver`] is the hot path of the transmitter: ticked from a dedicated thread, it
//! produces the instantaneous level of a differential output pair. Each tick reads the current
//! [`Envelope`](crate::Envelope) from the shared cell, advances an integer phase accumulator by
//! the elapsed time, and derives the output from the phase alone. There is no per-cycle state to
//! corrupt: a late tick produces a late edge, never a wrong frequency.
//!
//! Amplitude modulation is carried in the duty cycle. Full carrier is a 50 % square wave; the
//! low-amplitude window at the start of a data second narrows the duty to 12.5 %, which an RC
//! filter or a ferrite-rod antenna smooths into the reduced-amplitude pulse a receiver expects.
//!
//! Phase modulation, when enabled, applies the DCF77 pseudo-random chip sequence: starting
//! 200 ms into the second the carrier phase is shifted by +/-15.6 degrees, one chip per
//! 120 carrier cycles, 512 chips total. A 1 bit inverts the chip sequence.
//!
//! The accumulator works in billionths of a carrier cycle so that one nanosecond advances it by
//! exactly 77 500 units. All arithmetic is exact; the generated frequency drifts only as much
//! as the clock driving the ticks.

use crate::envelope::{Envelope, EnvelopeCell};

/// Nominal carrier frequency in Hz.
pub const CARRIER_HZ: u64 = 77_500;

/// One full carrier cycle, in accumulator units (billionths of a cycle).
const CYCLE: u64 = 1_000_000_000;
/// Duty threshold for full amplitude: 50 %.
const DUTY_FULL: u64 = CYCLE / 2;
/// Duty threshold inside the low-amplitude window: 12.5 %.
const DUTY_LOW: u64 = CYCLE / 8;
/// Phase modulation offset: 15.6 degrees of carrier, in accumulator units.
const CHIP_OFFSET: u64 = 43_333_333;
/// Phase modulation starts this many nanoseconds into the second.
const CHIP_START_NS: u64 = 200_000_000;
/// Each chip spans this many carrier cycles.
const CHIP_CYCLES: u64 = 120;
/// Number of chips per second.
const CHIP_COUNT: u64 = 512;

/// The 512-chip pseudo-random phase sequence, from the 9-stage LFSR x^9 + x^5 + 1 seeded with
/// all ones. Bit i of the table is chip i.
const CHIPS: [u64; 8] = generate_chips();

const fn generate_chips() -> [u64; 8] {
	let mut table = [0u64; 8];
	let mut lfsr: u16 = 0x1ff;
	let mut i = 0;
	while i < 512 {
		table[i >> 6] |= ((lfsr & 1) as u64) << (i & 0x3f);
		let fb = (lfsr ^ (lfsr >> 4)) & 1;
		lfsr = (lfsr >> 1) | (fb << 8);
		i += 1;
	}
	table
}

#[inline(always)]
fn chip(i: u64) -> bool {
	CHIPS[(i >> 6) as usize] >> (i & 0x3f) & 1 > 0
}

/// Instantaneous levels for the differential output pair.
///
/// The two legs are always complementary, so the pair carries no common-mode step and can drive
/// a small loop antenna directly.
#[derive(Clone, Copy)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Levels {
	/// The positive leg.
	pub p: bool,
	/// The negative leg, always `!p`.
	pub n: bool
}

/// The carrier tick state machine.
///
/// Holds a reference to the [`EnvelopeCell`] the scheduler publishes into. A change of envelope
/// sequence number re-anchors the bit clock to the tick that observed it, so the low-amplitude
/// window always starts at the published second boundary regardless of accumulated tick jitter.
///
/// # Examples
///
/// ```
/// # use dcf77::{CarrierDriver, Envelope, EnvelopeCell};
/// let cell = EnvelopeCell::new();
/// cell.publish(Envelope::data(false, false, 1));
/// let mut driver = CarrierDriver::new(&cell);
/// let mut t = 0;
/// loop {
/// 	let levels = driver.tick(t);
/// 	// ... write levels to the output pair ...
/// 	t += 1_000;
/// 	# if t > 100_000 { break; }
/// }
/// ```
pub struct CarrierDriver<'a> {
	cell: &'a EnvelopeCell,
	envelope: Envelope,
	/// Carrier phase in billionths of a cycle, [0, CYCLE).
	acc: u64,
	/// Tick timestamp of the last call, for the accumulator delta.
	last_ns: u64,
	/// Tick timestamp at which the current envelope was first observed.
	bit_start_ns: u64,
	started: bool
}

impl<'a> CarrierDriver<'a> {
	/// Create a driver reading envelopes from `cell`.
	pub fn new(cell: &'a EnvelopeCell) -> CarrierDriver<'a> {
		CarrierDriver {
			cell,
			envelope: Envelope::idle(0),
			acc: 0,
			last_ns: 0,
			bit_start_ns: 0,
			started: false
		}
	}

	/// Advance to `now_ns` and return the output levels.
	///
	/// `now_ns` should be a monotonic nanosecond timestamp; the origin does not matter. A
	/// timestamp earlier than the previous one is tolerated (the phase holds until time moves
	/// forward again), so a stepped clock cannot stop the carrier. Wait-free and infallible:
	/// whatever the scheduler's state, this keeps producing a toggling carrier.
	pub fn tick(&mut self, now_ns: u64) -> Levels {
		if !self.started {
			self.started = true;
			self.last_ns = now_ns;
			self.bit_start_ns = now_ns;
			self.envelope = self.cell.current();
		}

		let envelope = self.cell.current();
		if envelope.seq != self.envelope.seq {
			// New second: re-anchor the bit clock to this tick
			self.bit_start_ns = now_ns;
		}
		self.envelope = envelope;

		// A backwards clock step yields zero deltas: the carrier holds phase for that tick
		// instead of wrapping into a huge jump, and resumes once time moves forward again
		let dt = now_ns.saturating_sub(self.last_ns);
		self.last_ns = now_ns;
		self.acc = (self.acc + dt % CYCLE * CARRIER_HZ) % CYCLE;

		let t_in_bit = now_ns.saturating_sub(self.bit_start_ns);
		let duty = if t_in_bit < self.envelope.low_ns() {
			DUTY_LOW
		} else {
			DUTY_FULL
		};

		let mut phase = self.acc;
		if self.envelope.phase && t_in_bit >= CHIP_START_NS {
			let i = (t_in_bit - CHIP_START_NS) * CARRIER_HZ / (CHIP_CYCLES * CYCLE);
			if i < CHIP_COUNT {
				// A 1 bit inverts the chip sequence
				phase = if chip(i) != self.envelope.bit {
					(phase + CHIP_OFFSET) % CYCLE
				} else {
					(phase + CYCLE - CHIP_OFFSET) % CYCLE
				};
			}
		}

		let p = phase < duty;
		Levels { p, n: !p }
	}
}
