//! AX.25 address field: a 7-byte shifted-ASCII callsign, SSID, and a pair of
//! role-dependent flag bits.

use crate::error::FrameError;

/// One 7-byte AX.25 address field (destination, source, or repeater).
///
/// The role-dependent flag bit is stored uninterpreted as `flag`: callers
/// that build a source/destination address read and write it as the
/// command/response (C) bit via [`Address::c_bit`]/[`Address::with_c_bit`];
/// callers building a repeater address use the has-been-repeated (H) bit via
/// [`Address::h_bit`]/[`Address::with_h_bit`]. Both accessor pairs touch the
/// same underlying bit — the wire format does not distinguish them, only the
/// address's position in the frame does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
	callsign: String,
	ssid: u8,
	/// Reserved bits, conventionally `0b11`.
	rr: u8,
	flag: bool,
}

impl Address {
	/// Builds an address with `rr = 0b11` and `flag = false`.
	///
	/// Returns [`FrameError::InvalidAddress`] if `callsign` is not 1-6 ASCII
	/// alphanumeric characters or `ssid` exceeds 15.
	pub fn new(callsign: &str, ssid: u8) -> Result<Self, FrameError> {
		Self::with_flag(callsign, ssid, false)
	}

	/// As [`Address::new`], additionally setting the role-dependent flag bit.
	pub fn with_flag(callsign: &str, ssid: u8, flag: bool) -> Result<Self, FrameError> {
		if callsign.is_empty() || callsign.len() > 6 {
			return Err(FrameError::InvalidAddress {
				reason: "callsign must be 1-6 characters",
			});
		}
		if !callsign.bytes().all(|b| b.is_ascii_alphanumeric()) {
			return Err(FrameError::InvalidAddress {
				reason: "callsign must be ASCII alphanumeric",
			});
		}
		if ssid > 15 {
			return Err(FrameError::InvalidAddress {
				reason: "SSID must be 0-15",
			});
		}
		Ok(Self {
			callsign: callsign.to_string(),
			ssid,
			rr: 0b11,
			flag,
		})
	}

	pub fn callsign(&self) -> &str {
		&self.callsign
	}

	pub fn ssid(&self) -> u8 {
		self.ssid
	}

	pub fn rr(&self) -> u8 {
		self.rr
	}

	/// Command/response bit, for source and destination addresses.
	pub fn c_bit(&self) -> bool {
		self.flag
	}

	pub fn with_c_bit(mut self, c: bool) -> Self {
		self.flag = c;
		self
	}

	/// Has-been-repeated bit, for repeater addresses.
	pub fn h_bit(&self) -> bool {
		self.flag
	}

	pub fn with_h_bit(mut self, h: bool) -> Self {
		self.flag = h;
		self
	}

	/// Routing equality: true iff `callsign` and `ssid` match. Unlike
	/// [`PartialEq`], ignores the flag bit and `rr`.
	pub fn same_station(&self, other: &Address) -> bool {
		self.callsign == other.callsign && self.ssid == other.ssid
	}

	/// Encodes this address into its 7-byte wire form. `end` marks this as
	/// the last address field in the frame's address list.
	pub fn encode(&self, end: bool) -> [u8; 7] {
		let mut out = [0u8; 7];
		let mut padded = self.callsign.clone();
		while padded.len() < 6 {
			padded.push(' ');
		}
		for (i, b) in padded.bytes().enumerate() {
			out[i] = b << 1;
		}
		out[6] = ((self.flag as u8) << 7) | (self.rr << 5) | (self.ssid << 1) | (end as u8);
		out
	}

	/// Decodes a 7-byte address field, returning the address and whether its
	/// `end` bit was set.
	pub fn decode(bytes: &[u8; 7]) -> (Address, bool) {
		let callsign: String = bytes[0..6]
			.iter()
			.map(|&b| (b >> 1) as char)
			.collect::<String>()
			.trim_end_matches(' ')
			.to_string();
		let last = bytes[6];
		let end = (last & 0b1) != 0;
		let ssid = (last >> 1) & 0b1111;
		let rr = (last >> 5) & 0b11;
		let flag = (last >> 7) & 0b1 != 0;
		(
			Address {
				callsign,
				ssid,
				rr,
				flag,
			},
			end,
		)
	}
}

impl std::fmt::Display for Address {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}-{}", self.callsign, self.ssid)
	}
}
