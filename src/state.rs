//! The ABM (Asynchronous Balanced Mode) connection state machine, modeled as
//! a pure transition function: `step(state, input) -> (state', outputs, log)`.
//!
//! [`SessionState::step`] performs no I/O and never blocks; [`crate::session::Session`]
//! is the side-effecting shell that feeds it inputs and applies its outputs.

use std::collections::VecDeque;
use std::time::Instant;

use log::Level;

use crate::config::Config;
use crate::control::{Control, SFrameType, UFrameType};
use crate::frame::Frame;
use crate::timer::Timer;

/// PID value meaning "no layer 3 protocol", used on every I-frame this core
/// emits.
pub const PID_NO_LAYER3: u8 = 0xF0;

/// Observable connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
	/// Sending SABM, awaiting UA.
	Connecting,
	/// Information transfer.
	Connected,
	/// Sending DISC, awaiting UA.
	Disconnecting,
	/// Closed.
	Disconnected,
}

/// An event fed into [`SessionState::step`].
#[derive(Debug, Clone)]
pub enum Input {
	/// Bytes the user wants to send.
	UserWrite(Vec<u8>),
	/// The user asked to close the connection.
	UserDisconnect,
	/// A frame arrived from the peer, already address-filtered by the driver.
	ReceivedFrame(Frame),
	/// No new input; give timer-driven actions a chance to fire.
	None,
}

/// An effect produced by [`SessionState::step`].
#[derive(Debug, Clone)]
pub enum Output {
	/// A frame that must be encoded and handed to the transport.
	TxFrame(Frame),
	/// Bytes delivered to the user, in order.
	UserOutput(Vec<u8>),
}

/// A transition's log line, paired with the severity the driver should log
/// it at (see `DESIGN.md` for the level conventions).
pub type StepLog = Option<(Level, &'static str)>;

/// The full persistent state of one AX.25 connected-mode session.
///
/// Created in [`ConnState::Connecting`] with all sequence variables at zero
/// and the retransmit timer pre-expired, so the very first `step` call emits
/// SABM.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
	config: Config,
	conn_state: ConnState,
	vs: u8,
	vr: u8,
	va: u8,
	outstanding_frame: Option<Vec<u8>>,
	queued_bytes: VecDeque<u8>,
	retransmit: Timer,
	keepalive: Timer,
	burst_receive: Timer,
}

impl SessionState {
	pub fn new(config: Config, now: Instant) -> Self {
		let retransmit = Timer::new_pre_expired("retransmit", config.retransmit_timeout, now);
		let keepalive = Timer::new("keepalive", config.keepalive_timeout);
		let burst_receive = Timer::new("burst_receive", config.burst_receive_timeout);
		Self {
			config,
			conn_state: ConnState::Connecting,
			vs: 0,
			vr: 0,
			va: 0,
			outstanding_frame: None,
			queued_bytes: VecDeque::new(),
			retransmit,
			keepalive,
			burst_receive,
		}
	}

	pub fn conn_state(&self) -> ConnState {
		self.conn_state
	}

	pub fn vs(&self) -> u8 {
		self.vs
	}

	pub fn vr(&self) -> u8 {
		self.vr
	}

	pub fn va(&self) -> u8 {
		self.va
	}

	pub fn outstanding_frame(&self) -> Option<&[u8]> {
		self.outstanding_frame.as_deref()
	}

	pub fn queued_bytes_len(&self) -> usize {
		self.queued_bytes.len()
	}

	pub fn retransmit_running(&self) -> bool {
		self.retransmit.running()
	}

	pub fn keepalive_running(&self) -> bool {
		self.keepalive.running()
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	fn modn(&self, n: u8) -> u8 {
		n % self.config.window_size
	}

	/// `n - 1 mod window_size`, always masked. The reference this crate was
	/// distilled from intermittently computed `vs - 1` unmasked in its resend
	/// path; this helper exists so that mistake can't happen here.
	fn mod_dec(&self, n: u8) -> u8 {
		(n + self.config.window_size - 1) % self.config.window_size
	}

	fn base_frame(&self, source_c: bool, dest_c: bool, control: Control, pid: Vec<u8>, payload: Vec<u8>) -> Frame {
		Frame {
			source: self.config.mycall.clone().with_c_bit(source_c),
			dest: self.config.theircall.clone().with_c_bit(dest_c),
			repeaters: Vec::new(),
			control,
			pid,
			payload,
		}
	}

	/// A command we send: `source.C = 0, dest.C = 1`.
	fn cmd(&self, control: Control, pid: Vec<u8>, payload: Vec<u8>) -> Output {
		Output::TxFrame(self.base_frame(false, true, control, pid, payload))
	}

	/// A response we send: `source.C = 1, dest.C = 0`.
	fn resp(&self, control: Control, pid: Vec<u8>, payload: Vec<u8>) -> Output {
		Output::TxFrame(self.base_frame(true, false, control, pid, payload))
	}

	/// Advances the state machine by exactly one input. Callers loop this to
	/// run-to-completion (see [`crate::session::Session::poll`]): keep
	/// stepping while the input queue is non-empty or the state just
	/// changed, with a final `Input::None` pass so timer-driven transitions
	/// fire.
	pub fn step(mut self, input: Input, now: Instant) -> (Self, Vec<Output>, StepLog) {
		match input {
			Input::UserWrite(bytes) => {
				self.queued_bytes.extend(bytes);
				(self, Vec::new(), None)
			}
			Input::UserDisconnect => {
				self.conn_state = ConnState::Disconnecting;
				let force_expired = -(self.config.retransmit_timeout.as_secs_f64()) - 1.0;
				self.retransmit = self.retransmit.start_with_bonus(now, force_expired);
				self.keepalive = self.keepalive.stop();
				self.burst_receive = self.burst_receive.stop();
				(self, Vec::new(), Some((Level::Info, "User requested disconnect")))
			}
			Input::ReceivedFrame(frame) => {
				self.keepalive = self.keepalive.start(now);
				match frame.control {
					Control::Information { .. } => self.step_iframe(frame, now),
					Control::Supervisory { .. } => self.step_sframe(frame, now),
					Control::Unnumbered { .. } => self.step_uframe(frame, now),
				}
			}
			Input::None => self.step_timers(now),
		}
	}

	fn step_iframe(mut self, frame: Frame, now: Instant) -> (Self, Vec<Output>, StepLog) {
		if self.conn_state != ConnState::Connected {
			return (self, Vec::new(), Some((Level::Warn, "I-frame while not CONNECTED, ignore")));
		}
		let Control::Information { ns, nr, pf } = frame.control else {
			unreachable!("step_iframe only called for Information control")
		};
		self.va = nr;

		if ns == self.vr {
			self.vr = self.modn(self.vr + 1);
			let bonus = if pf {
				0.0
			} else {
				self.config.nonfinal_i_frame_burst_rx_offset.as_secs_f64()
			};
			self.burst_receive = self.burst_receive.start_with_bonus(now, bonus);
			(self, vec![Output::UserOutput(frame.payload)], Some((Level::Trace, "Accept I-frame")))
		} else if pf {
			self.burst_receive = self.burst_receive.stop();
			let out = self.resp(
				Control::Supervisory {
					ss: SFrameType::REJ,
					nr: self.vr,
					pf: true,
				},
				Vec::new(),
				Vec::new(),
			);
			(self, vec![out], Some((Level::Warn, "Reject out-of-order I-frame")))
		} else {
			(self, Vec::new(), Some((Level::Trace, "Ignoring out-of-order I-frame with PF=0")))
		}
	}

	fn step_sframe(mut self, frame: Frame, now: Instant) -> (Self, Vec<Output>, StepLog) {
		if self.conn_state != ConnState::Connected {
			return (self, Vec::new(), Some((Level::Warn, "Ignore S-frame when not CONNECTED")));
		}
		let Control::Supervisory { ss, nr, pf: _ } = frame.control else {
			unreachable!("step_sframe only called for Supervisory control")
		};

		match ss {
			SFrameType::RR => {
				self.va = nr;
				let mut outputs = Vec::new();
				let polled = frame.dest.c_bit();
				if polled {
					self.burst_receive = self.burst_receive.stop();
					outputs.push(self.resp(
						Control::Supervisory {
							ss: SFrameType::RR,
							nr: self.vr,
							pf: true,
						},
						Vec::new(),
						Vec::new(),
					));
				}
				let stale = self.va != self.vs;
				if !stale {
					self.outstanding_frame = None;
					self.retransmit = self.retransmit.stop();
				}
				let level = if stale { Level::Warn } else { Level::Trace };
				let why = if polled {
					"Polling ACK request"
				} else if stale {
					"Stale ACK, leaving retransmit running"
				} else {
					"My I-frame was ACKed"
				};
				(self, outputs, Some((level, why)))
			}
			SFrameType::RNR => (self, Vec::new(), Some((Level::Warn, "Don't support RNR yet"))),
			SFrameType::REJ => {
				if self.outstanding_frame.is_some() {
					self.retransmit_outstanding(now, Level::Warn, "REJ for pending frame")
				} else {
					(self, Vec::new(), Some((Level::Trace, "REJ for already-ACKed frame, ignore")))
				}
			}
			SFrameType::SREJ => (self, Vec::new(), Some((Level::Warn, "Don't support SREJ"))),
		}
	}

	fn step_uframe(self, frame: Frame, now: Instant) -> (Self, Vec<Output>, StepLog) {
		let Control::Unnumbered { m, pf: _ } = frame.control else {
			unreachable!("step_uframe only called for Unnumbered control")
		};

		if m == UFrameType::DISC {
			return self.disconnect(true, Level::Info, "Got DISC");
		}

		match self.conn_state {
			ConnState::Connecting => match m {
				UFrameType::UA => {
					let mut next = self;
					next.conn_state = ConnState::Connected;
					next.retransmit = next.retransmit.clone().stop();
					next.keepalive = next.keepalive.clone().start(now);
					(next, Vec::new(), Some((Level::Info, "Got UA, now CONNECTED")))
				}
				UFrameType::DM => self.disconnect(false, Level::Info, "Got DM while CONNECTING"),
				_ => (self, Vec::new(), Some((Level::Warn, "Ignore unexpected U-frame while CONNECTING"))),
			},
			ConnState::Disconnecting => match m {
				UFrameType::UA => self.disconnect(false, Level::Info, "Got UA while DISCONNECTING, done"),
				_ => (self, Vec::new(), Some((Level::Warn, "Ignore unexpected U-frame while DISCONNECTING"))),
			},
			ConnState::Connected | ConnState::Disconnected => {
				(self, Vec::new(), Some((Level::Warn, "Ignore unrecognized U-frame")))
			}
		}
	}

	/// Forces the terminal state directly, bypassing the DISC/UA handshake.
	/// Used by [`crate::session::Session`] when the transport itself fails:
	/// there is no point sending DISC over a port that just errored.
	pub(crate) fn force_disconnected(self) -> Self {
		let (next, _, _) = self.disconnect(false, Level::Error, "Transport failure, forcing DISCONNECTED");
		next
	}

	fn disconnect(mut self, send_ua: bool, level: Level, why: &'static str) -> (Self, Vec<Output>, StepLog) {
		self.conn_state = ConnState::Disconnected;
		self.retransmit = self.retransmit.stop();
		self.keepalive = self.keepalive.stop();
		self.burst_receive = self.burst_receive.stop();
		let outputs = if send_ua {
			vec![self.resp(
				Control::Unnumbered {
					m: UFrameType::UA,
					pf: true,
				},
				Vec::new(),
				Vec::new(),
			)]
		} else {
			Vec::new()
		};
		(self, outputs, Some((level, why)))
	}

	/// Resends the single outstanding I-frame with a correctly-masked
	/// `ns = vs - 1 mod window`, used both by REJ recovery and by retransmit
	/// timer expiry.
	fn retransmit_outstanding(mut self, now: Instant, level: Level, why: &'static str) -> (Self, Vec<Output>, StepLog) {
		let ns = self.mod_dec(self.vs);
		let payload = self.outstanding_frame.clone().unwrap_or_default();
		self.retransmit = self.retransmit.start(now);
		let out = self.cmd(
			Control::Information {
				ns,
				nr: self.vr,
				pf: true,
			},
			vec![PID_NO_LAYER3],
			payload,
		);
		(self, vec![out], Some((level, why)))
	}

	fn step_timers(mut self, now: Instant) -> (Self, Vec<Output>, StepLog) {
		match self.conn_state {
			ConnState::Connecting => {
				if self.retransmit.expired(now) {
					self.retransmit = self.retransmit.start(now);
					let out = self.cmd(
						Control::Unnumbered {
							m: UFrameType::SABM,
							pf: true,
						},
						Vec::new(),
						Vec::new(),
					);
					return (self, vec![out], Some((Level::Debug, "re/transmit SABM")));
				}
			}
			ConnState::Disconnecting => {
				if self.retransmit.expired(now) {
					self.retransmit = self.retransmit.start(now);
					let out = self.cmd(
						Control::Unnumbered {
							m: UFrameType::DISC,
							pf: true,
						},
						Vec::new(),
						Vec::new(),
					);
					return (self, vec![out], Some((Level::Debug, "Send DISC")));
				}
			}
			ConnState::Connected => {
				if self.retransmit.expired(now) {
					return self.retransmit_outstanding(now, Level::Warn, "Retransmit");
				}
				if self.burst_receive.expired(now) {
					self.burst_receive = self.burst_receive.stop();
					let out = self.resp(
						Control::Supervisory {
							ss: SFrameType::RR,
							nr: self.vr,
							pf: true,
						},
						Vec::new(),
						Vec::new(),
					);
					return (self, vec![out], Some((Level::Trace, "Send delayed ACK")));
				}
				if self.keepalive.expired(now) {
					self.keepalive = self.keepalive.start(now);
					let out = self.cmd(
						Control::Supervisory {
							ss: SFrameType::RR,
							nr: self.vr,
							pf: true,
						},
						Vec::new(),
						Vec::new(),
					);
					return (self, vec![out], Some((Level::Debug, "Send keep-alive")));
				}
				if !self.queued_bytes.is_empty() && self.vs == self.va {
					let n = self.config.mtu.min(self.queued_bytes.len());
					let data: Vec<u8> = self.queued_bytes.drain(..n).collect();
					let vs_before = self.vs;
					self.vs = self.modn(self.vs + 1);
					self.outstanding_frame = Some(data.clone());
					self.burst_receive = self.burst_receive.stop();
					self.retransmit = self.retransmit.start(now);
					let out = self.cmd(
						Control::Information {
							ns: vs_before,
							nr: self.vr,
							pf: true,
						},
						vec![PID_NO_LAYER3],
						data,
					);
					return (self, vec![out], Some((Level::Trace, "Transmit queued data")));
				}
			}
			ConnState::Disconnected => {}
		}
		(self, Vec::new(), None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::address::Address;
	use crate::control::Control;

	fn config() -> Config {
		Config::new(
			Address::new("N0CALL", 1).unwrap(),
			Address::new("N0CALL", 2).unwrap(),
		)
	}

	fn incoming(control: Control, payload: &[u8]) -> Frame {
		Frame {
			source: Address::new("N0CALL", 2).unwrap().with_c_bit(false),
			dest: Address::new("N0CALL", 1).unwrap().with_c_bit(true),
			repeaters: Vec::new(),
			control,
			pid: if matches!(control, Control::Information { .. }) {
				vec![PID_NO_LAYER3]
			} else {
				Vec::new()
			},
			payload: payload.to_vec(),
		}
	}

	#[test]
	fn fresh_session_fires_sabm_immediately() {
		let now = Instant::now();
		let state = SessionState::new(config(), now);
		let (state, outputs, _) = state.step(Input::None, now);
		assert_eq!(state.conn_state(), ConnState::Connecting);
		assert_eq!(outputs.len(), 1);
		assert!(matches!(
			outputs[0],
			Output::TxFrame(Frame {
				control: Control::Unnumbered {
					m: UFrameType::SABM,
					pf: true
				},
				..
			})
		));
	}

	#[test]
	fn ua_while_connecting_completes_handshake() {
		let now = Instant::now();
		let state = SessionState::new(config(), now);
		let (state, _, _) = state.step(Input::None, now);
		let (state, _, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Unnumbered {
					m: UFrameType::UA,
					pf: true,
				},
				&[],
			)),
			now,
		);
		assert_eq!(state.conn_state(), ConnState::Connected);
		assert!(!state.retransmit_running());
		assert!(state.keepalive_running());
	}

	fn connected(now: Instant) -> SessionState {
		let state = SessionState::new(config(), now);
		let (state, _, _) = state.step(Input::None, now);
		let (state, _, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Unnumbered {
					m: UFrameType::UA,
					pf: true,
				},
				&[],
			)),
			now,
		);
		state
	}

	#[test]
	fn out_of_order_iframe_triggers_reject() {
		let now = Instant::now();
		let state = connected(now);
		let (_, outputs, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Information {
					ns: 1,
					nr: 0,
					pf: true,
				},
				b"X",
			)),
			now,
		);
		assert_eq!(outputs.len(), 1);
		assert!(matches!(
			outputs[0],
			Output::TxFrame(Frame {
				control: Control::Supervisory {
					ss: SFrameType::REJ,
					nr: 0,
					pf: true
				},
				..
			})
		));
	}

	#[test]
	fn write_then_poll_emits_single_iframe() {
		let now = Instant::now();
		let state = connected(now);
		let (state, _, _) = state.step(Input::UserWrite(b"HELLO\r".to_vec()), now);
		let (state, outputs, _) = state.step(Input::None, now);
		assert_eq!(state.vs(), 1);
		assert_eq!(state.va(), 0);
		assert_eq!(outputs.len(), 1);
		match &outputs[0] {
			Output::TxFrame(frame) => {
				assert_eq!(frame.payload, b"HELLO\r");
				assert_eq!(frame.pid, vec![PID_NO_LAYER3]);
				assert!(matches!(
					frame.control,
					Control::Information {
						ns: 0,
						nr: 0,
						pf: true
					}
				));
			}
			_ => panic!("expected TxFrame"),
		}
	}

	#[test]
	fn rr_ack_clears_outstanding_frame() {
		let now = Instant::now();
		let state = connected(now);
		let (state, _, _) = state.step(Input::UserWrite(b"X".to_vec()), now);
		let (state, _, _) = state.step(Input::None, now);
		assert!(state.outstanding_frame().is_some());
		let (state, _, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Supervisory {
					ss: SFrameType::RR,
					nr: 1,
					pf: false,
				},
				&[],
			)),
			now,
		);
		assert_eq!(state.va(), 1);
		assert!(state.outstanding_frame().is_none());
		assert!(!state.retransmit_running());
	}

	#[test]
	fn retransmit_fires_after_timeout_with_masked_ns() {
		let now = Instant::now();
		let state = connected(now);
		let (state, _, _) = state.step(Input::UserWrite(b"X".to_vec()), now);
		let (state, _, _) = state.step(Input::None, now);
		assert_eq!(state.vs(), 1);
		let later = now + state.config().retransmit_timeout + std::time::Duration::from_secs(1);
		let (state, outputs, _) = state.step(Input::None, later);
		assert_eq!(outputs.len(), 1);
		match &outputs[0] {
			Output::TxFrame(frame) => {
				assert!(matches!(
					frame.control,
					Control::Information {
						ns: 0,
						pf: true,
						..
					}
				));
				assert_eq!(frame.payload, b"X");
			}
			_ => panic!("expected retransmit TxFrame"),
		}
		assert!(state.retransmit_running());
	}

	#[test]
	fn disconnect_requests_disc_and_completes_on_ua() {
		let now = Instant::now();
		let state = connected(now);
		let (state, _, _) = state.step(Input::UserDisconnect, now);
		assert_eq!(state.conn_state(), ConnState::Disconnecting);
		let (state, outputs, _) = state.step(Input::None, now);
		assert!(matches!(
			outputs[0],
			Output::TxFrame(Frame {
				control: Control::Unnumbered {
					m: UFrameType::DISC,
					pf: true
				},
				..
			})
		));
		let (state, _, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Unnumbered {
					m: UFrameType::UA,
					pf: true,
				},
				&[],
			)),
			now,
		);
		assert_eq!(state.conn_state(), ConnState::Disconnected);
		assert!(!state.retransmit_running());
		assert!(!state.keepalive_running());
	}

	#[test]
	fn disc_from_peer_is_acknowledged_and_idempotent() {
		let now = Instant::now();
		let state = connected(now);
		let (state, outputs, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Unnumbered {
					m: UFrameType::DISC,
					pf: true,
				},
				&[],
			)),
			now,
		);
		assert_eq!(state.conn_state(), ConnState::Disconnected);
		assert!(matches!(
			outputs[0],
			Output::TxFrame(Frame {
				control: Control::Unnumbered {
					m: UFrameType::UA,
					..
				},
				..
			})
		));

		// A second DISC after we're already DISCONNECTED still gets a UA.
		let (_, outputs2, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Unnumbered {
					m: UFrameType::DISC,
					pf: true,
				},
				&[],
			)),
			now,
		);
		assert!(matches!(
			outputs2[0],
			Output::TxFrame(Frame {
				control: Control::Unnumbered {
					m: UFrameType::UA,
					..
				},
				..
			})
		));
	}

	#[test]
	fn delayed_ack_batches_within_burst_window() {
		let now = Instant::now();
		let state = connected(now);
		let (state, outputs, _) = state.step(
			Input::ReceivedFrame(incoming(
				Control::Information {
					ns: 0,
					nr: 0,
					pf: false,
				},
				b"A",
			)),
			now,
		);
		assert!(outputs.iter().all(|o| !matches!(o, Output::TxFrame(_))));
		assert_eq!(state.vr(), 1);

		let later = now + std::time::Duration::from_secs(4);
		let (state, outputs, _) = state.step(Input::None, later);
		assert_eq!(outputs.len(), 1);
		assert!(matches!(
			outputs[0],
			Output::TxFrame(Frame {
				control: Control::Supervisory {
					ss: SFrameType::RR,
					nr: 1,
					pf: true
				},
				..
			})
		));
		assert_eq!(state.vr(), 1);
	}

	#[test]
	fn sequence_variables_stay_within_window() {
		let now = Instant::now();
		let mut state = connected(now);
		for i in 0..20u8 {
			let (next, _, _) = state.step(Input::UserWrite(vec![i]), now);
			let (next, _, _) = next.step(Input::None, now);
			let nr = next.vr();
			let (next, _, _) = next.step(
				Input::ReceivedFrame(incoming(
					Control::Supervisory {
						ss: SFrameType::RR,
						nr: next.vs(),
						pf: false,
					},
					&[],
				)),
				now,
			);
			assert!(next.vs() < next.config().window_size);
			assert!(next.vr() < next.config().window_size);
			assert!(next.va() < next.config().window_size);
			let _ = nr;
			state = next;
		}
	}
}
