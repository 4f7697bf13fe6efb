//! The side-effecting driver shell: owns a [`Port`], the current
//! [`SessionState`], a queue of pending [`Input`]s, and a byte buffer of
//! data delivered to the user.
//!
//! [`Session::poll`] is the only suspension point: it takes at most one
//! non-blocking read from the port, then runs [`SessionState::step`] to a
//! fixed point, applying each [`Output`] as it is produced.

use std::collections::VecDeque;

use crate::address::Address;
use crate::config::Config;
use crate::control::Modulus;
use crate::error::PortError;
use crate::frame::Frame;
use crate::state::{ConnState, Input, Output, SessionState};
use crate::timer::{Clock, SystemClock};

/// The datagram transport a [`Session`] sends and receives AX.25 frames
/// over. Deliberately minimal: KISS/SLIP byte-stuffing, AGW envelopes, or a
/// plain TCP socket all implement this trait the same way, and the session
/// core does not care which.
pub trait Port {
	/// Sends one already-encoded frame. May block or be best-effort; the
	/// session does not retry a send itself (that's the job of the
	/// retransmit timer one layer up).
	fn send_data_frame(&mut self, bytes: &[u8]) -> Result<(), PortError>;

	/// Non-blockingly checks for one received datagram. `Ok(None)` means
	/// nothing is available right now, not an error.
	fn try_recv_data_frame(&mut self) -> Result<Option<Vec<u8>>, PortError>;

	/// Observer hook called with every frame handed to [`Port::send_data_frame`].
	/// Default no-op; overridden by callers wanting a raw packet trace.
	fn on_tx(&mut self, _bytes: &[u8]) {}

	/// Observer hook called with every frame returned by
	/// [`Port::try_recv_data_frame`]. Default no-op.
	fn on_rx(&mut self, _bytes: &[u8]) {}
}

/// The user-facing AX.25 connected-mode session endpoint.
///
/// `new` creates the session in [`ConnState::Connecting`]; the first
/// [`Session::poll`] call emits the initial SABM.
pub struct Session<P: Port, C: Clock = SystemClock> {
	port: P,
	clock: C,
	state: Option<SessionState>,
	inputs: VecDeque<Input>,
	output: Vec<u8>,
}

impl<P: Port> Session<P, SystemClock> {
	/// Builds a session with default [`Config`] and the real wall clock.
	pub fn new(port: P, mycall: Address, theircall: Address) -> Self {
		Self::with_config(port, Config::new(mycall, theircall))
	}

	/// As [`Session::new`], but with an explicit [`Config`].
	pub fn with_config(port: P, config: Config) -> Self {
		Self::with_config_and_clock(port, config, SystemClock)
	}
}

impl<P: Port, C: Clock> Session<P, C> {
	/// Builds a session with an injectable clock, for deterministic tests
	/// (see `crate::testing` and `tests/scenarios.rs`).
	pub fn with_config_and_clock(port: P, config: Config, clock: C) -> Self {
		let now = clock.now();
		let mycall = config.mycall.clone();
		let theircall = config.theircall.clone();
		info!("session {mycall} <-> {theircall}: CONNECTING");
		Self {
			port,
			clock,
			state: Some(SessionState::new(config, now)),
			inputs: VecDeque::new(),
			output: Vec::new(),
		}
	}

	/// The observable connection lifecycle state.
	pub fn conn_state(&self) -> ConnState {
		self.state().conn_state()
	}

	fn state(&self) -> &SessionState {
		self.state.as_ref().expect("state taken and not restored")
	}

	/// Queues `bytes` for transmission. Actual I-frame emission happens on a
	/// later `poll()`, subject to the single-outstanding-frame rule.
	pub fn write(&mut self, bytes: impl Into<Vec<u8>>) {
		self.inputs.push_back(Input::UserWrite(bytes.into()));
	}

	/// Queues a graceful disconnect. The next `poll()` sends DISC
	/// immediately; the session reaches [`ConnState::Disconnected`] once the
	/// peer acknowledges with UA (or the retransmit timer gives up and the
	/// port reports a fatal I/O failure).
	pub fn disconnect(&mut self) {
		self.inputs.push_back(Input::UserDisconnect);
	}

	/// Drains and returns all bytes delivered to the user since the last
	/// call.
	pub fn read(&mut self) -> Vec<u8> {
		std::mem::take(&mut self.output)
	}

	/// Drives one round of I/O and timers: takes at most one non-blocking
	/// read from the port, then runs the state machine to a fixed point.
	///
	/// A [`PortError`] from the transport is fatal (see the error design in
	/// `DESIGN.md`): the session drops straight to [`ConnState::Disconnected`]
	/// without attempting the DISC/UA handshake, and the error is returned
	/// to the caller.
	pub fn poll(&mut self) -> Result<(), PortError> {
		match self.port.try_recv_data_frame() {
			Ok(Some(bytes)) => {
				self.port.on_rx(&bytes);
				self.handle_received_datagram(&bytes);
			}
			Ok(None) => {}
			Err(err) => {
				warn!("transport I/O failure, disconnecting without handshake: {err}");
				self.force_disconnected();
				return Err(err);
			}
		}
		self.run_to_completion()
	}

	fn handle_received_datagram(&mut self, bytes: &[u8]) {
		let frame = match Frame::decode(bytes, Modulus::Mod8) {
			Ok(frame) => frame,
			Err(err) => {
				warn!("dropping malformed frame ({err}), {} bytes", bytes.len());
				return;
			}
		};
		let config = self.state().config();
		if !frame.dest.same_station(&config.mycall) || !frame.source.same_station(&config.theircall) {
			warn!(
				"dropping frame not addressed to this session: {} -> {}",
				frame.source, frame.dest
			);
			return;
		}
		debug!("RX {frame}");
		self.inputs.push_back(Input::ReceivedFrame(frame));
	}

	fn run_to_completion(&mut self) -> Result<(), PortError> {
		loop {
			let input = self.inputs.pop_front().unwrap_or(Input::None);
			let had_input = !matches!(input, Input::None) || !self.inputs.is_empty();
			let now = self.clock.now();
			let prev_state = self.state.take().expect("state taken and not restored");
			let was_connected = prev_state.conn_state();
			let (next_state, outputs, log) = prev_state.clone().step(input, now);
			let changed = next_state.conn_state() != was_connected;

			if let Some((level, message)) = log {
				log::log!(level, "{message}");
			}
			if changed {
				info!("session: {was_connected:?} -> {:?}", next_state.conn_state());
			}

			for out in outputs {
				match out {
					Output::TxFrame(frame) => {
						debug!("TX {frame}");
						let bytes = frame.encode(Modulus::Mod8);
						self.port.on_tx(&bytes);
						if let Err(err) = self.port.send_data_frame(&bytes) {
							warn!("transport I/O failure sending frame, disconnecting: {err}");
							self.state = Some(next_state);
							self.force_disconnected();
							return Err(err);
						}
					}
					Output::UserOutput(bytes) => self.output.extend(bytes),
				}
			}

			let state_changed = next_state != prev_state;
			self.state = Some(next_state);
			if !had_input && !state_changed {
				break;
			}
		}
		Ok(())
	}

	fn force_disconnected(&mut self) {
		let state = self.state.take().expect("state taken and not restored");
		let was_connected = state.conn_state();
		let next = state.force_disconnected();
		if next.conn_state() != was_connected {
			info!("session: {was_connected:?} -> {:?}", next.conn_state());
		}
		self.state = Some(next);
	}
}
