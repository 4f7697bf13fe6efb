//! A bit-exact AX.25 v2 frame codec and a connected-mode (ABM) link-layer
//! session endpoint.
//!
//! This crate terminates one point-to-point session between two stations
//! identified by callsign+SSID, carrying a reliable byte stream over a
//! lossy, half-duplex datagram transport such as a KISS TNC. It does not
//! implement KISS/AGW framing, digipeater routing, SREJ, XID/TEST
//! negotiation, or modulo-128 sequencing at the session level — see
//! [`control::Modulus`] for what the codec alone supports.
//!
//! The core is split in two:
//! - [`address`], [`control`], [`frame`]: a pure, allocation-light codec for
//!   the AX.25 wire format.
//! - [`state`]: a pure transition function driving link establishment,
//!   reliable transfer, retransmission, and disconnect.
//!
//! [`session::Session`] is the side-effecting shell tying the state machine
//! to a [`session::Port`] transport.

#![warn(rust_2018_idioms)]

#[macro_use]
extern crate log;

pub mod address;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod session;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timer;

pub use address::Address;
pub use config::Config;
pub use control::{Control, Modulus, SFrameType, UFrameType};
pub use error::{FrameError, PortError};
pub use frame::Frame;
pub use session::{Port, Session};
pub use state::{ConnState, Input, Output, SessionState};
pub use timer::{Clock, SystemClock, Timer};
