//! A minimal SNTP (RFC 4330) client.
//!
//! [`fetch_time`] queries an NTP server or pool and returns the current Unix time. It takes
//! five samples and keeps the one with the smallest round-trip delay, which bounds the offset
//! error by half that delay. If the address resolves to multiple IPs the samples are spread
//! across them. Expect accuracy in the tens of milliseconds against a nearby pool.
//!
//! # Examples
//!
//! ```
//! # use sntp::fetch_time;
//! match fetch_time("pool.ntp.org") {
//! 	Ok(t) => assert!(t.sec > 0),
//! 	Err(e) => eprintln!("pool.ntp.org: {e}")
//! }
//! assert!(fetch_time("").is_err());
//! ```

use std::{
	error, fmt, io,
	net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
	ops::{Add, Sub},
	string::String,
	time::Duration
};
use time::{clock::now, clock::TimeSpec};

/// Seconds between the NTP epoch (Jan 1, 1900) and the Unix epoch (Jan 1, 1970).
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// SNTP message size. Requests and replies use the same 48-byte layout.
const PACKET_LEN: usize = 48;

/// Number of samples taken per [`fetch_time`] call.
const SAMPLES: usize = 5;

/// The error type for SNTP queries.
pub enum SntpError {
	/// A socket operation failed, including timeouts waiting for a reply.
	Io(io::Error),
	/// The server address was empty or resolved to no usable IP.
	Resolve(String),
	/// The reply was truncated, unsolicited, or a kiss-of-death packet.
	BadReply,
	/// The local clock could not be read.
	ClockUnavailable
}

impl fmt::Display for SntpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SntpError::Io(e) => write!(f, "SNTP query failed: {}", e),
			SntpError::Resolve(a) => write!(f, "Cannot resolve SNTP server: {}", a),
			SntpError::BadReply => write!(f, "Invalid reply from SNTP server"),
			SntpError::ClockUnavailable => write!(f, "Failed to read the system clock")
		}
	}
}

impl fmt::Debug for SntpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl error::Error for SntpError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			SntpError::Io(e) => Some(e),
			_ => None
		}
	}
}

impl From<io::Error> for SntpError {
	fn from(e: io::Error) -> Self {
		SntpError::Io(e)
	}
}

/// An NTP timestamp: unsigned 32.32 fixed-point seconds since Jan 1, 1900.
///
/// The format rolls over every 136 years (first in February 2036); only differences between
/// nearby timestamps are meaningful across a rollover, which is all the offset math below uses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Timestamp(u64);

impl Timestamp {
	fn from_unix(t: TimeSpec) -> Timestamp {
		let sec = (t.sec + NTP_UNIX_OFFSET) as u64;
		let frac = ((t.nsec as u64) << 32) / 1_000_000_000;
		Timestamp(sec << 32 | frac)
	}
}

impl Sub for Timestamp {
	type Output = Span;

	/// The signed difference between two timestamps. Wrapping, so a pair of timestamps
	/// straddling the 2036 rollover still produces the right small difference.
	fn sub(self, rhs: Timestamp) -> Span {
		Span(self.0.wrapping_sub(rhs.0) as i64)
	}
}

/// A signed 32.32 fixed-point duration, the result of subtracting two [`Timestamp`]s.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Span(i64);

impl Span {
	fn halved(self) -> Span {
		Span(self.0 / 2)
	}

	/// Split into whole seconds and positive nanoseconds.
	///
	/// The arithmetic shift keeps the fractional part positive for negative spans, so
	/// -0.25 s becomes `sec: -1, nsec: 750000000`, which is what [`TimeSpec`] addition expects.
	fn to_timespec(self) -> TimeSpec {
		let sec = self.0 >> 32;
		let nsec = ((self.0 & 0xffff_ffff) * 1_000_000_000) >> 32;
		TimeSpec { sec, nsec }
	}
}

impl Add for Span {
	type Output = Span;

	fn add(self, rhs: Span) -> Span {
		Span(self.0.wrapping_add(rhs.0))
	}
}

impl Sub for Span {
	type Output = Span;

	fn sub(self, rhs: Span) -> Span {
		Span(self.0.wrapping_sub(rhs.0))
	}
}

/// One server measurement: clock offset and the round-trip delay that bounds its error.
#[derive(Clone, Copy)]
struct Sample {
	offset: Span,
	delay: Span
}

/// Build a client request carrying `transmit` in the transmit timestamp field.
fn request(transmit: Timestamp) -> [u8; PACKET_LEN] {
	let mut p = [0u8; PACKET_LEN];
	p[0] = 0x23; // version 4, mode 3 (client)
	p[40..48].copy_from_slice(&transmit.0.to_be_bytes());
	p
}

/// Read a big-endian timestamp at byte offset `at`.
fn timestamp_at(p: &[u8; PACKET_LEN], at: usize) -> Timestamp {
	let mut b = [0u8; 8];
	b.copy_from_slice(&p[at..at + 8]);
	Timestamp(u64::from_be_bytes(b))
}

/// Lazily initialized sockets, one per address family.
struct Sockets {
	v4: Option<UdpSocket>,
	v6: Option<UdpSocket>
}

impl Sockets {
	fn new() -> Sockets {
		Sockets { v4: None, v6: None }
	}

	fn for_addr(&mut self, addr: &SocketAddr) -> Result<&UdpSocket, io::Error> {
		let slot = if addr.is_ipv4() { &mut self.v4 } else { &mut self.v6 };
		if slot.is_none() {
			let socket = if addr.is_ipv4() {
				UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
			} else {
				UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?
			};
			socket.set_read_timeout(Some(Duration::from_secs(1)))?;
			socket.set_write_timeout(Some(Duration::from_secs(1)))?;
			*slot = Some(socket);
		}
		// The slot was just filled if it was empty
		slot.as_ref().ok_or(io::Error::new(io::ErrorKind::Other, "socket missing"))
	}
}

/// Take one sample from `addr`.
///
/// Performs the four-timestamp exchange of RFC 4330: t1 request departs, t2 request arrives at
/// the server, t3 reply departs, t4 reply arrives. Offset is `((t2 - t1) + (t3 - t4)) / 2`,
/// delay is `(t4 - t1) - (t3 - t2)`.
fn query(sockets: &mut Sockets, addr: &SocketAddr) -> Result<Sample, SntpError> {
	let socket = sockets.for_addr(addr)?;
	socket.connect(addr)?;

	let t1 = Timestamp::from_unix(now().ok_or(SntpError::ClockUnavailable)?);
	socket.send(&request(t1))?;

	let mut reply = [0u8; PACKET_LEN];
	let len = socket.recv(&mut reply)?;
	let t4 = Timestamp::from_unix(now().ok_or(SntpError::ClockUnavailable)?);

	// Mode must be 4 (server); stratum 0 is a kiss-of-death packet. The origin timestamp must
	// echo our transmit timestamp or the reply was not for this request.
	if len != PACKET_LEN || reply[0] & 0x07 != 4 || reply[1] == 0 {
		return Err(SntpError::BadReply);
	}
	if timestamp_at(&reply, 24) != t1 {
		return Err(SntpError::BadReply);
	}

	let t2 = timestamp_at(&reply, 32);
	let t3 = timestamp_at(&reply, 40);
	Ok(Sample {
		offset: ((t2 - t1) + (t3 - t4)).halved(),
		delay: (t4 - t1) - (t3 - t2)
	})
}

/// Append the NTP port to an address that does not carry one.
///
/// Handles bare IPv6 addresses by bracketing them first.
fn with_port(addr: &str) -> String {
	match (addr.find(':'), addr.rfind(':')) {
		(None, _) => format!("{}:123", addr),
		(Some(a), Some(b)) if a != b => {
			// More than one colon: IPv6. Bracketed input with a trailing port passes through.
			match addr.rfind(']') {
				Some(k) if k < b => String::from(addr),
				Some(_) => format!("{}:123", addr),
				None => format!("[{}]:123", addr)
			}
		}
		_ => String::from(addr)
	}
}

/// Get the current Unix time according to an NTP server.
///
/// Takes five samples, spread across the resolved IPs, and applies the offset of the sample
/// with the smallest round-trip delay to the local clock. Fails only if every sample fails.
///
/// # Examples
///
/// ```no_run
/// # use sntp::fetch_time;
/// let t = fetch_time("pool.ntp.org")?;
/// # Ok::<(), sntp::SntpError>(())
/// ```
pub fn fetch_time(server: &str) -> Result<TimeSpec, SntpError> {
	if server.is_empty() {
		return Err(SntpError::Resolve(String::from(server)));
	}
	let addrs: Vec<SocketAddr> = with_port(server).to_socket_addrs()?.collect();
	if addrs.is_empty() {
		return Err(SntpError::Resolve(String::from(server)));
	}

	let mut sockets = Sockets::new();
	let mut best: Option<Sample> = None;
	let mut last_err = SntpError::BadReply;
	for addr in addrs.iter().cycle().take(SAMPLES) {
		match query(&mut sockets, addr) {
			Ok(sample) => match best {
				Some(b) if b.delay <= sample.delay => (),
				_ => best = Some(sample)
			},
			Err(e) => last_err = e
		}
	}

	let Some(sample) = best else {
		return Err(last_err);
	};
	let offset = sample.offset.to_timespec();
	let local = now().ok_or(SntpError::ClockUnavailable)?;
	Ok(local.add_secs(offset.sec).add_nanos(offset.nsec))
}

#[cfg(test)]
mod tests {
	use std::thread;
	use super::*;

	#[test]
	fn fixed_point_spans() {
		let t1 = Timestamp(0x1_80000000); // 1.500 s
		let t2 = Timestamp(0x2_60000000); // 2.375 s
		let d = t2 - t1;
		assert_eq!(d.0, 0xE0000000); // 0.875 s
		assert_eq!(d.to_timespec(), TimeSpec { sec: 0, nsec: 875_000_000 });

		let d = t1 - t2;
		assert_eq!(d.0, 0xFFFFFFFF_20000000u64 as i64); // -0.875 s
		assert_eq!(d.to_timespec(), TimeSpec { sec: -1, nsec: 125_000_000 });
		assert_eq!(d.halved().to_timespec(), TimeSpec { sec: -1, nsec: 562_500_000 });
	}

	#[test]
	fn span_survives_era_rollover() {
		let before = Timestamp(u64::MAX - (1u64 << 31)); // 0.5 s before rollover
		let after = Timestamp(1u64 << 31); // 0.5 s after
		assert_eq!((after - before).to_timespec(), TimeSpec { sec: 1, nsec: 0 });
	}

	#[test]
	fn unix_conversion() {
		let t = Timestamp::from_unix(TimeSpec { sec: 0, nsec: 500_000_000 });
		assert_eq!(t.0 >> 32, NTP_UNIX_OFFSET as u64);
		assert_eq!(t.0 & 0xffff_ffff, 0x7fff_ffff);
	}

	#[test]
	fn request_layout() {
		let p = request(Timestamp(0x1122334455667788));
		assert_eq!(p.len(), 48);
		assert_eq!(p[0], 0x23);
		assert!(p[1..40].iter().all(|&b| b == 0));
		assert_eq!(&p[40..48], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
		assert_eq!(timestamp_at(&p, 40), Timestamp(0x1122334455667788));
	}

	#[test]
	fn port_defaulting() {
		assert_eq!(with_port("pool.ntp.org"), "pool.ntp.org:123");
		assert_eq!(with_port("pool.ntp.org:321"), "pool.ntp.org:321");
		assert_eq!(with_port("127.0.0.1"), "127.0.0.1:123");
		assert_eq!(with_port("127.0.0.1:321"), "127.0.0.1:321");
		assert_eq!(with_port("::1"), "[::1]:123");
		assert_eq!(with_port("[::1]"), "[::1]:123");
		assert_eq!(with_port("[::1]:321"), "[::1]:321");
	}

	#[test]
	fn rejects_empty_and_unresolvable() {
		assert!(matches!(fetch_time(""), Err(SntpError::Resolve(_))));
		assert!(fetch_time("no such host name").is_err());
	}

	// A loopback server applying a fixed clock offset to every reply
	fn spawn_server(offset_secs: u64, stratum: u8) -> SocketAddr {
		let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
		let addr = socket.local_addr().unwrap();
		thread::spawn(move || {
			let mut buf = [0u8; PACKET_LEN];
			for _ in 0..SAMPLES {
				let Ok((len, peer)) = socket.recv_from(&mut buf) else { return };
				if len != PACKET_LEN {
					continue;
				}
				let client_tx = timestamp_at(&buf, 40);
				let server_now = Timestamp(client_tx.0.wrapping_add(offset_secs << 32));
				let mut reply = [0u8; PACKET_LEN];
				reply[0] = 0x24; // version 4, mode 4 (server)
				reply[1] = stratum;
				reply[24..32].copy_from_slice(&client_tx.0.to_be_bytes());
				reply[32..40].copy_from_slice(&server_now.0.to_be_bytes());
				reply[40..48].copy_from_slice(&server_now.0.to_be_bytes());
				let _ = socket.send_to(&reply, peer);
			}
		});
		addr
	}

	#[test]
	fn applies_server_offset() {
		let addr = spawn_server(2, 2);
		let local = now().unwrap();
		let fetched = fetch_time(&addr.to_string()).unwrap();
		// The server runs 2 s ahead; allow generous slack for the test machine
		let diff = (fetched.sec - local.sec) as f64 + (fetched.nsec - local.nsec) as f64 / 1e9;
		assert!((diff - 2.0).abs() < 0.5, "diff {}", diff);
	}

	#[test]
	fn rejects_kiss_of_death() {
		let addr = spawn_server(0, 0);
		assert!(matches!(fetch_time(&addr.to_string()), Err(SntpError::BadReply)));
	}
}
