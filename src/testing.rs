//! Test doubles for [`crate::session::Port`] and [`crate::timer::Clock`].
//!
//! Per `DESIGN.md`, these are explicitly not a KISS/SLIP/AGW implementation
//! — just the minimum needed to drive [`crate::session::Session`] end to end
//! without a real transport, used by this crate's own test suite and
//! available to downstream crates writing their own `Port` adapter tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::PortError;
use crate::session::Port;
use crate::timer::Clock;

type Queue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// An in-memory, infallible [`Port`] backed by two `VecDeque`s: one the
/// session reads from, one it writes to.
///
/// [`LoopbackPort::new`] returns a lone port plus a [`LoopbackHandle`] the
/// test keeps to inject received datagrams and drain sent ones.
/// [`LoopbackPort::pair`] wires two ports directly to each other, for
/// end-to-end session-to-session tests.
pub struct LoopbackPort {
	inbound: Queue,
	outbound: Queue,
}

impl LoopbackPort {
	/// A lone port with no peer: a [`LoopbackHandle`] is returned so the
	/// caller can inject datagrams as if a peer had sent them, and drain
	/// what the session sent.
	pub fn new() -> (Self, LoopbackHandle) {
		let inbound: Queue = Rc::new(RefCell::new(VecDeque::new()));
		let outbound: Queue = Rc::new(RefCell::new(VecDeque::new()));
		let handle = LoopbackHandle {
			inbound: inbound.clone(),
			outbound: outbound.clone(),
		};
		(Self { inbound, outbound }, handle)
	}

	/// Two ports wired directly to each other: whatever one sends, the
	/// other receives on its next `poll()`.
	pub fn pair() -> (Self, Self) {
		let a_to_b: Queue = Rc::new(RefCell::new(VecDeque::new()));
		let b_to_a: Queue = Rc::new(RefCell::new(VecDeque::new()));
		(
			Self {
				inbound: b_to_a.clone(),
				outbound: a_to_b.clone(),
			},
			Self {
				inbound: a_to_b,
				outbound: b_to_a,
			},
		)
	}
}

impl Port for LoopbackPort {
	fn send_data_frame(&mut self, bytes: &[u8]) -> Result<(), PortError> {
		self.outbound.borrow_mut().push_back(bytes.to_vec());
		Ok(())
	}

	fn try_recv_data_frame(&mut self) -> Result<Option<Vec<u8>>, PortError> {
		Ok(self.inbound.borrow_mut().pop_front())
	}
}

/// The test-side handle for a lone [`LoopbackPort`] (see [`LoopbackPort::new`]).
#[derive(Clone)]
pub struct LoopbackHandle {
	inbound: Queue,
	outbound: Queue,
}

impl LoopbackHandle {
	/// Queues `bytes` as if received from the peer; visible to the session
	/// on its next `poll()`.
	pub fn inject(&self, bytes: Vec<u8>) {
		self.inbound.borrow_mut().push_back(bytes);
	}

	/// Drains every datagram the session has sent so far.
	pub fn take_sent(&self) -> Vec<Vec<u8>> {
		self.outbound.borrow_mut().drain(..).collect()
	}
}

/// A [`Clock`] whose `now()` only advances when the test calls
/// [`TestClock::advance`], for deterministic timer expiry without sleeping.
#[derive(Clone)]
pub struct TestClock {
	now: Rc<Cell<Instant>>,
}

impl TestClock {
	pub fn new() -> Self {
		Self {
			now: Rc::new(Cell::new(Instant::now())),
		}
	}

	pub fn advance(&self, by: Duration) {
		self.now.set(self.now.get() + by);
	}
}

impl Default for TestClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for TestClock {
	fn now(&self) -> Instant {
		self.now.get()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lone_port_round_trips_injected_and_sent_bytes() {
		let (mut port, handle) = LoopbackPort::new();
		handle.inject(b"hello".to_vec());
		assert_eq!(port.try_recv_data_frame().unwrap(), Some(b"hello".to_vec()));
		assert_eq!(port.try_recv_data_frame().unwrap(), None);

		port.send_data_frame(b"world").unwrap();
		assert_eq!(handle.take_sent(), vec![b"world".to_vec()]);
		assert!(handle.take_sent().is_empty());
	}

	#[test]
	fn paired_ports_deliver_to_each_other() {
		let (mut a, mut b) = LoopbackPort::pair();
		a.send_data_frame(b"ping").unwrap();
		assert_eq!(b.try_recv_data_frame().unwrap(), Some(b"ping".to_vec()));
		b.send_data_frame(b"pong").unwrap();
		assert_eq!(a.try_recv_data_frame().unwrap(), Some(b"pong".to_vec()));
	}

	#[test]
	fn test_clock_only_advances_explicitly() {
		let clock = TestClock::new();
		let t0 = clock.now();
		assert_eq!(clock.now(), t0);
		clock.advance(Duration::from_secs(5));
		assert_eq!(clock.now(), t0 + Duration::from_secs(5));
	}
}
