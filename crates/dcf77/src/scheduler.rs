//! The 1 Hz bit scheduler.
//!
//! [`BitScheduler`] owns the per-second cadence of the transmitter. It is deliberately passive:
//! the caller wakes it once per UTC second boundary with [`BitScheduler::on_second`], and it
//! returns the [`Envelope`] to publish for the second about to be transmitted plus any
//! diagnostics. Keeping the loop outside makes every state transition testable with a synthetic
//! clock and a scripted time source, with no hardware or sleeping involved.
//!
//! The state machine:
//!
//! ```text
//! Uninitialized -> Synchronizing -> Running <-> Degraded -> Halted
//! ```
//!
//! - `Synchronizing`: waiting for the first valid time reading. Output is the idle envelope
//!   (constant full carrier, nothing a receiver could mistake for a frame).
//! - `Running`: normal operation. At each minute boundary the frame for the minute about to
//!   begin is built from a fresh time reading; seconds 0-58 transmit frame bits, second 59
//!   transmits the missing-pulse minute marker. Between fetches the bit index is derived from
//!   the wall clock (plus the source offset learned at the last fetch), so a wakeup delayed by
//!   a slow fetch resumes at the correct index instead of drifting behind real time.
//! - `Degraded`: the time source failed at a minute boundary. The previous frame keeps being
//!   transmitted and a stale-frame warning is reported.
//! - `Halted`: the stale-minute budget ran out. Terminal until [`BitScheduler::reset`]; output
//!   is the idle envelope, so a stale (and by now wrong) time is never presented as valid.

use time::clock::TimeSpec;
use crate::envelope::Envelope;
use crate::frame::{self, Frame, FRAME_BITS};
use crate::{InvalidTimeError, TimeSource};

/// Maximum tolerated distance between a wakeup and the true second boundary, in nanoseconds.
pub const MAX_DRIFT_NS: i64 = 10_000_000;

/// Scheduler states. See the [module documentation](self) for the transition diagram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum State {
	/// Created, never stepped.
	Uninitialized,
	/// Waiting for the first valid time reading.
	Synchronizing,
	/// Normal per-second operation.
	Running,
	/// Transmitting a stale frame after a time source failure.
	Degraded,
	/// Time source lost beyond tolerance. Terminal; output is safe idle.
	Halted
}

/// The outcome of one scheduler step.
///
/// `envelope` is always valid to publish, whatever happened: error handling ends here and never
/// reaches the carrier tick path.
#[derive(Clone, Copy)]
pub struct Step {
	/// The envelope for the second about to be transmitted.
	pub envelope: Envelope,
	/// Scheduler state after this step.
	pub state: State,
	/// Second index within the current minute, [0, 59].
	pub second: u8,
	/// The frame currently on air (meaningful in `Running` / `Degraded`).
	pub frame: Frame,
	/// Set when the wakeup missed the second boundary by more than [`MAX_DRIFT_NS`]: the
	/// boundary error in nanoseconds. Recoverable; alignment resynchronizes on the next valid
	/// time reading.
	pub drift_ns: Option<i64>,
	/// Set when this step had to reuse a stale frame: the number of stale minutes so far.
	pub stale_minutes: Option<u8>,
	/// Set when the time source returned a time the encoder rejected.
	pub encode_error: Option<InvalidTimeError>
}

/// The per-second scheduling state machine.
///
/// # Examples
///
/// ```no_run
/// # use dcf77::{BitScheduler, EnvelopeCell, TimeSource, TimeUnavailable};
/// # use time::{berlin, clock};
/// # struct SystemSource;
/// # impl TimeSource for SystemSource {
/// # 	fn fetch(&mut self) -> Result<time::CivilTime, TimeUnavailable> {
/// # 		clock::now().and_then(berlin::civil_time).ok_or(TimeUnavailable)
/// # 	}
/// # }
/// let cell = EnvelopeCell::new();
/// let mut scheduler = BitScheduler::new(SystemSource, 5, false);
/// loop {
/// 	// ... sleep to the next second boundary ...
/// 	let now = clock::now().unwrap();
/// 	let step = scheduler.on_second(now);
/// 	cell.publish(step.envelope);
/// }
/// ```
pub struct BitScheduler<S: TimeSource> {
	source: S,
	state: State,
	frame: Frame,
	second: u8,
	/// Source second-of-minute minus wall second-of-minute, learned at the last good fetch.
	/// Lets the bit index follow the wall clock between fetches even when the system clock
	/// and the time source disagree.
	offset: u8,
	stale_minutes: u8,
	max_stale: u8,
	phase: bool,
	seq: u8
}

/// Second-of-minute of a wall-clock reading. The CET/CEST offsets are whole hours, so this
/// matches the civil second.
fn wall_second(now: TimeSpec) -> u8 {
	now.sec.rem_euclid(60) as u8
}

impl<S: TimeSource> BitScheduler<S> {
	/// Create a scheduler in the `Uninitialized` state.
	///
	/// `max_stale` is the number of consecutive stale minutes tolerated before the scheduler
	/// halts. `phase` enables the phase-modulation chip window in emitted envelopes.
	pub fn new(source: S, max_stale: u8, phase: bool) -> BitScheduler<S> {
		BitScheduler {
			source,
			state: State::Uninitialized,
			frame: Frame::default(),
			second: 0,
			offset: 0,
			stale_minutes: 0,
			max_stale,
			phase,
			// A fresh cell holds idle with sequence 0; the first published envelope must differ
			seq: 1
		}
	}

	/// The current state.
	pub fn state(&self) -> State {
		self.state
	}

	/// The frame currently on air.
	pub fn frame(&self) -> Frame {
		self.frame
	}

	/// Mutable access to the time source, e.g. to reconfigure it at runtime.
	pub fn source_mut(&mut self) -> &mut S {
		&mut self.source
	}

	/// External reset: return a halted scheduler to `Uninitialized` so it can resynchronize.
	pub fn reset(&mut self) {
		self.state = State::Uninitialized;
		self.stale_minutes = 0;
	}

	/// Record a minute that had to reuse the previous frame, halting past the budget.
	fn stale_minute(&mut self) -> Option<u8> {
		self.stale_minutes = self.stale_minutes.saturating_add(1);
		self.state = if self.stale_minutes > self.max_stale {
			State::Halted
		} else {
			State::Degraded
		};
		Some(self.stale_minutes)
	}

	/// Advance the scheduler by one second.
	///
	/// `now` is the UTC wall-clock reading taken at the wakeup for this second boundary; it
	/// drives drift detection and the bit index within the minute, but never the encoded time
	/// (that comes from the [`TimeSource`]). Returns the envelope to publish and any
	/// diagnostics. Never panics and
	/// never propagates an error: a failed time reading degrades, a rejected time keeps the
	/// previous frame.
	pub fn on_second(&mut self, now: TimeSpec) -> Step {
		let on_air = matches!(self.state, State::Running | State::Degraded);
		let err = now.boundary_error();
		let drift_ns = (on_air && err > MAX_DRIFT_NS).then_some(err);
		let mut stale_minutes = None;
		let mut encode_error = None;

		match self.state {
			State::Uninitialized | State::Synchronizing => {
				self.state = State::Synchronizing;
				if let Ok(civil) = self.source.fetch() {
					match civil.next_minute().map(|next| frame::build(&next)) {
						Some(Ok(frame)) => {
							self.frame = frame;
							self.second = civil.second;
							self.offset = (civil.second + 60 - wall_second(now)) % 60;
							self.state = State::Running;
						}
						Some(Err(e)) => encode_error = Some(e),
						None => ()
					}
				}
			}
			State::Running | State::Degraded => {
				// The bit index follows the wall clock, not a step count: a wakeup delayed
				// past one or more boundaries (e.g. by a stalled fetch) lands on the index
				// the receiver expects, and a wrap past index 0 is the minute boundary even
				// when index 0 itself was skipped
				let second = (wall_second(now) + self.offset) % 60;
				let new_minute = second < self.second;
				self.second = second;
				if new_minute {
					// Minute boundary: encode the minute about to begin from a fresh reading
					match self.source.fetch() {
						Ok(civil) => match civil.next_minute().map(|next| frame::build(&next)) {
							Some(Ok(frame)) => {
								self.frame = frame;
								self.second = civil.second;
								self.offset = (civil.second + 60 - wall_second(now)) % 60;
								self.stale_minutes = 0;
								self.state = State::Running;
							}
							Some(Err(e)) => {
								encode_error = Some(e);
								stale_minutes = self.stale_minute();
							}
							None => stale_minutes = self.stale_minute()
						},
						Err(_) => stale_minutes = self.stale_minute()
					}
				}
			}
			State::Halted => ()
		}

		let seq = self.seq;
		self.seq = self.seq.wrapping_add(1);
		let envelope = match self.state {
			State::Running | State::Degraded => {
				if self.second >= FRAME_BITS {
					Envelope::marker(self.phase, seq)
				} else {
					Envelope::data(self.frame.bit(self.second), self.phase, seq)
				}
			}
			_ => Envelope::idle(seq)
		};

		Step {
			envelope,
			state: self.state,
			second: self.second,
			frame: self.frame,
			drift_ns,
			stale_minutes,
			encode_error
		}
	}
}

#[cfg(test)]
mod tests {
	use std::string::ToString;
	use time::berlin;
	use super::*;
	use crate::TimeUnavailable;
	use crate::envelope::{LOW_MS_ONE, LOW_MS_ZERO};

	// Sat, Jun 3, 2023. 21:16:17 CEST (19:16:17 UTC).
	const START: i64 = 1685819777;

	struct FakeSource {
		sec: i64,
		fail: bool
	}

	impl TimeSource for FakeSource {
		fn fetch(&mut self) -> Result<time::CivilTime, TimeUnavailable> {
			if self.fail {
				Err(TimeUnavailable)
			} else {
				berlin::civil_time(TimeSpec { sec: self.sec, nsec: 0 }).ok_or(TimeUnavailable)
			}
		}
	}

	fn scheduler(sec: i64, max_stale: u8) -> BitScheduler<FakeSource> {
		BitScheduler::new(FakeSource { sec, fail: false }, max_stale, false)
	}

	// Drive one step with the fake clock sitting exactly on the boundary of `sec`
	fn step_at(s: &mut BitScheduler<FakeSource>, sec: i64) -> Step {
		s.source_mut().sec = sec;
		s.on_second(TimeSpec { sec, nsec: 0 })
	}

	#[test]
	fn synchronizes_mid_minute() {
		let mut s = scheduler(START, 3);
		assert_eq!(s.state(), State::Uninitialized);

		let step = step_at(&mut s, START);
		assert_eq!(step.state, State::Running);
		assert_eq!(step.second, 17);
		// Frame encodes 21:17, the minute about to begin
		assert_eq!(
			step.frame.to_string(),
			"0-00000000000000-001001-11101000-1000010-110000-011-01100-110001001"
		);
		assert!(step.envelope.low_ms > 0);
	}

	#[test]
	fn stays_synchronizing_without_time() {
		let mut s = scheduler(START, 3);
		s.source_mut().fail = true;
		for i in 0..5 {
			let step = step_at_failing(&mut s, START + i);
			assert_eq!(step.state, State::Synchronizing);
			assert_eq!(step.envelope.low_ms, 0, "idle output while synchronizing");
			assert!(!step.envelope.phase);
		}
	}

	fn step_at_failing(s: &mut BitScheduler<FakeSource>, sec: i64) -> Step {
		s.on_second(TimeSpec { sec, nsec: 0 })
	}

	#[test]
	fn ten_minute_run() {
		// Deterministic clock stepping exact second boundaries for 10 minutes
		let mut s = scheduler(START, 3);
		let mut minute_marks = 0;
		for i in 0..600 {
			let sec = START + i;
			let step = step_at(&mut s, sec);
			assert_eq!(step.state, State::Running);
			assert!(step.drift_ns.is_none(), "no drift on exact boundaries");
			let expected_second = ((sec + 2 * 3600) % 60) as u8;
			assert_eq!(step.second, expected_second);
			if expected_second == 59 {
				minute_marks += 1;
				assert_eq!(step.envelope.low_ms, 0, "missing 59th pulse");
			} else {
				let expected = if step.frame.bit(expected_second) { LOW_MS_ONE } else { LOW_MS_ZERO };
				assert_eq!(step.envelope.low_ms, expected, "second {}", expected_second);
			}
		}
		assert_eq!(minute_marks, 10);
	}

	#[test]
	fn rebuilds_frame_each_minute() {
		let mut s = scheduler(START, 3);
		let first = step_at(&mut s, START).frame;
		// Walk to the next minute boundary (second 0 at 21:18)
		let mut frame = first;
		for i in 1..=43 {
			frame = step_at(&mut s, START + i).frame;
		}
		// 21:17:00 local -> new frame encodes 21:18
		assert_ne!(frame.packed(), first.packed());
		assert_eq!(frame.packed() >> 21 & 0x7f, 0x18); // minute 18 BCD
	}

	#[test]
	fn degrades_and_recovers() {
		let mut s = scheduler(START, 3);
		step_at(&mut s, START);

		// Fail the source at the next minute boundary
		s.source_mut().fail = true;
		let mut stale_seen = false;
		for i in 1..=60 {
			let step = step_at_failing(&mut s, START + i);
			if step.second == 0 {
				assert_eq!(step.state, State::Degraded);
				assert_eq!(step.stale_minutes, Some(1));
				stale_seen = true;
			}
		}
		assert!(stale_seen);
		// Bits keep flowing from the stale frame while degraded
		assert_eq!(s.state(), State::Degraded);

		// Source comes back: next minute boundary returns to Running
		s.source_mut().fail = false;
		for i in 61..=120 {
			let step = step_at(&mut s, START + i);
			if step.second == 0 {
				assert_eq!(step.state, State::Running);
				assert_eq!(step.stale_minutes, None);
			}
		}
		assert_eq!(s.state(), State::Running);
	}

	#[test]
	fn stalled_fetch_keeps_wall_alignment() {
		let mut s = scheduler(START, 3);
		for i in 0..=42 {
			step_at(&mut s, START + i);
		}
		// The fetch at the 21:17 boundary fails after blocking for 21 seconds
		s.source_mut().fail = true;
		let step = step_at_failing(&mut s, START + 43);
		assert_eq!(step.second, 0);
		assert_eq!(step.state, State::Degraded);

		// The wakeup after the stall lands 21 seconds into the minute; the bit index must
		// match real time, not continue counting from where the stall began
		let step = step_at_failing(&mut s, START + 64);
		assert_eq!(step.second, 21);
		assert_eq!(step.state, State::Degraded);
		let step = step_at_failing(&mut s, START + 65);
		assert_eq!(step.second, 22);

		// A stall that skips past the next boundary entirely still triggers the minute
		// fetch and recovery
		s.source_mut().fail = false;
		let step = step_at(&mut s, START + 110);
		assert_eq!(step.second, 7);
		assert_eq!(step.state, State::Running);
		assert_eq!(step.stale_minutes, None);
	}

	#[test]
	fn halts_past_stale_budget() {
		let mut s = scheduler(START, 2);
		step_at(&mut s, START);
		s.source_mut().fail = true;

		let mut halted_at = None;
		for i in 1..=300 {
			let step = step_at_failing(&mut s, START + i);
			if step.state == State::Halted && halted_at.is_none() {
				halted_at = Some(i);
				// Idle output within the same step as the transition
				assert_eq!(step.envelope.low_ms, 0);
				assert!(!step.envelope.phase);
			}
		}
		// Boundaries at i = 43, 103, 163: the third stale minute exceeds the budget of 2
		assert_eq!(halted_at, Some(163));

		// Halted is terminal, even with the source back
		s.source_mut().fail = false;
		let step = step_at(&mut s, START + 301);
		assert_eq!(step.state, State::Halted);
		assert_eq!(step.envelope.low_ms, 0);

		// Until externally reset
		s.reset();
		let step = step_at(&mut s, START + 302);
		assert_eq!(step.state, State::Running);
	}

	#[test]
	fn reports_drift() {
		let mut s = scheduler(START, 3);
		step_at(&mut s, START);

		// 5 ms late: inside tolerance
		let step = s.on_second(TimeSpec { sec: START + 1, nsec: 5_000_000 });
		assert_eq!(step.drift_ns, None);

		// 20 ms late: reported, not fatal
		let step = s.on_second(TimeSpec { sec: START + 2, nsec: 20_000_000 });
		assert_eq!(step.drift_ns, Some(20_000_000));
		assert_eq!(step.state, State::Running);

		// 8 ms early reads as nsec close to the next boundary
		let step = s.on_second(TimeSpec { sec: START + 2, nsec: 992_000_000 });
		assert_eq!(step.drift_ns, None);
	}

	#[test]
	fn invalid_time_keeps_previous_frame() {
		// A source stuck before year 2000 is rejected by the encoder
		let mut s = scheduler(START, 3);
		let first = step_at(&mut s, START).frame;

		s.source_mut().sec = 631152000; // Jan 1, 1990
		let mut saw_encode_error = false;
		for i in 1..=43 {
			let step = s.on_second(TimeSpec { sec: START + i, nsec: 0 });
			if step.second == 0 {
				assert!(step.encode_error.is_some());
				assert_eq!(step.state, State::Degraded);
				assert_eq!(step.frame.packed(), first.packed());
				saw_encode_error = true;
			}
		}
		assert!(saw_encode_error);
	}

	#[test]
	fn envelope_sequence_always_changes() {
		let mut s = scheduler(START, 3);
		let mut last = step_at(&mut s, START).envelope.seq;
		for i in 1..=120 {
			let seq = step_at(&mut s, START + i).envelope.seq;
			assert_ne!(seq, last);
			last = seq;
		}
	}
}
