//! Typed error hierarchy for the codec and transport layers.
//!
//! Per the design notes, a malformed frame or a frame addressed to someone
//! else is *not* escalated out of [`crate::session::Session::poll`] as an
//! error — the driver logs it and drops the frame. [`FrameError`] exists so
//! the codec stays honest and usable on its own (e.g. from a monitor/sniffer
//! binary), not because the session needs to react to it.

use thiserror::Error;

/// A failure decoding or encoding an AX.25 address, control field, or frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
	/// The byte stream ran out while a fixed-width field was still being read.
	#[error("truncated {field}: expected more bytes")]
	Truncated { field: &'static str },

	/// A control byte's low bits decoded to a frame type but a required
	/// sub-field (for example the 5-bit `mmmmm` U-frame type) does not name
	/// any known value.
	#[error("reserved or unrecognized control encoding (byte {byte:#04x})")]
	ReservedControl { byte: u8 },

	/// An I-frame control field was decoded but no PID byte followed it.
	#[error("I-frame is missing its PID byte")]
	MissingPid,

	/// A modulus value other than 8 or 128 was requested.
	#[error("unsupported sequence modulus: {got}")]
	UnsupportedModulus { got: u16 },

	/// A callsign failed the 1-6 character alphanumeric ASCII rule, or an
	/// SSID was outside 0..=15.
	#[error("invalid callsign/SSID: {reason}")]
	InvalidAddress { reason: &'static str },
}

/// A failure reported by a [`crate::session::Port`] implementation.
///
/// Opaque by design: the session core does not know or care which transport
/// (KISS-over-serial, KISS-over-TCP, AGW, loopback) backs the port, only
/// that it failed. Per the error handling design, a `PortError` reaching the
/// session is treated as fatal: the session transitions straight to
/// `Disconnected` without attempting the DISC/UA handshake.
#[derive(Error, Debug)]
#[error("transport port failure: {0}")]
pub struct PortError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>);

impl PortError {
	pub fn new<E>(source: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self(Box::new(source))
	}
}

impl From<std::io::Error> for PortError {
	fn from(err: std::io::Error) -> Self {
		Self::new(err)
	}
}
