//! Typed session configuration.
//!
//! A plain struct of compiled-in values, not an options-file parser: parsing
//! CLI arguments or config files is left to the application embedding this
//! crate.

use std::time::Duration;

use crate::address::Address;

/// Configuration for one AX.25 connected-mode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub mycall: Address,
	pub theircall: Address,

	/// Sequence-number modulus. The session core only supports 8.
	pub window_size: u8,
	/// Maximum I-frame payload bytes peeled off the queued byte stream per
	/// frame.
	pub mtu: usize,

	pub retransmit_timeout: Duration,
	pub keepalive_timeout: Duration,
	pub burst_receive_timeout: Duration,
	/// Extra seconds granted to the burst-receive timer when accepting an
	/// I-frame with `pf == 0` (not the final frame of a burst, so batch the
	/// ack rather than sending it immediately).
	pub nonfinal_i_frame_burst_rx_offset: Duration,
}

impl Config {
	pub fn new(mycall: Address, theircall: Address) -> Self {
		Self {
			mycall,
			theircall,
			window_size: 8,
			mtu: 200,
			retransmit_timeout: Duration::from_secs(10),
			keepalive_timeout: Duration::from_secs(30),
			burst_receive_timeout: Duration::from_secs(3),
			nonfinal_i_frame_burst_rx_offset: Duration::from_secs(3),
		}
	}
}
