//! AX.25 control field codec: the tagged I/S/U control union, in both
//! modulo-8 and modulo-128 width.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::FrameError;

/// Sequence-number modulus selecting the control field's wire width.
///
/// The session core (see [`crate::state`]) only ever operates in [`Modulus::Mod8`];
/// [`Modulus::Mod128`] is supported here at the codec level only, since
/// modulo-128 operation is out of scope for the state machine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulus {
	Mod8,
	Mod128,
}

impl Modulus {
	pub fn window_size(self) -> u8 {
		match self {
			Modulus::Mod8 => 8,
			Modulus::Mod128 => 128,
		}
	}
}

/// Supervisory frame sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SFrameType {
	RR = 0b00,
	RNR = 0b01,
	REJ = 0b10,
	SREJ = 0b11,
}

/// Unnumbered frame sub-type, encoded as the 5-bit `mmmmm` field
/// (`(mmm << 2) | mm`). Values grounded in the reference AX.25 prototype this
/// crate was distilled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UFrameType {
	UI = 0b00000,
	DM = 0b00011,
	SABM = 0b00111,
	DISC = 0b01000,
	UA = 0b01100,
	SABME = 0b01111,
	FRMR = 0b10001,
	XID = 0b10111,
	TEST = 0b11100,
}

/// A decoded AX.25 control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
	Information { ns: u8, nr: u8, pf: bool },
	Supervisory { ss: SFrameType, nr: u8, pf: bool },
	Unnumbered { m: UFrameType, pf: bool },
}

impl Control {
	/// Encodes the control field. Returns 1 byte for U-frames (regardless of
	/// modulus) and for I/S frames under [`Modulus::Mod8`]; 2 bytes for I/S
	/// frames under [`Modulus::Mod128`].
	///
	/// Bit layout (see `DESIGN.md` for the modulo-128 I/S rationale):
	/// - Mod8 I: `[nr:3][pf:1][ns:3][0]`
	/// - Mod8 S: `[nr:3][pf:1][ss:2][01]`
	/// - Mod8/Mod128 U: `[mmm:3][pf:1][mm:2][11]`
	/// - Mod128 I: byte0 `[nr:7][0]`, byte1 `[ns:7][pf:1]`
	/// - Mod128 S: byte0 `[ss:2][01]` (top 4 bits reserved, zero), byte1 `[nr:7][pf:1]`
	pub fn encode(&self, modulus: Modulus) -> Vec<u8> {
		match (*self, modulus) {
			(Control::Information { ns, nr, pf }, Modulus::Mod8) => {
				vec![(nr << 5) | ((pf as u8) << 4) | (ns << 1)]
			}
			(Control::Information { ns, nr, pf }, Modulus::Mod128) => {
				vec![nr << 1, (ns << 1) | (pf as u8)]
			}
			(Control::Supervisory { ss, nr, pf }, Modulus::Mod8) => {
				let ss: u8 = ss.into();
				vec![(nr << 5) | ((pf as u8) << 4) | (ss << 2) | 0b01]
			}
			(Control::Supervisory { ss, nr, pf }, Modulus::Mod128) => {
				let ss: u8 = ss.into();
				vec![(ss << 2) | 0b01, (nr << 1) | (pf as u8)]
			}
			(Control::Unnumbered { m, pf }, _) => {
				let mmmmm: u8 = m.into();
				let mmm = mmmmm >> 2;
				let mm = mmmmm & 0b11;
				vec![(mmm << 5) | ((pf as u8) << 4) | (mm << 2) | 0b11]
			}
		}
	}

	/// Decodes a control field from the front of `bytes`, returning the
	/// control value and the number of bytes consumed (1 or 2).
	///
	/// The low bits of the first byte select the frame type exactly as in
	/// modulo-8 (`xxxxxxx0` = I, `xxxxxx01` = S, `xxxxxx11` = U) for both
	/// moduli, so the byte count can always be determined having read only
	/// the first byte.
	pub fn decode(bytes: &[u8], modulus: Modulus) -> Result<(Control, usize), FrameError> {
		let b0 = *bytes
			.first()
			.ok_or(FrameError::Truncated { field: "control" })?;

		if b0 & 0b1 == 0 {
			// I-frame.
			match modulus {
				Modulus::Mod8 => {
					let nr = b0 >> 5;
					let pf = (b0 >> 4) & 0b1 != 0;
					let ns = (b0 >> 1) & 0b111;
					Ok((Control::Information { ns, nr, pf }, 1))
				}
				Modulus::Mod128 => {
					let b1 = *bytes
						.get(1)
						.ok_or(FrameError::Truncated { field: "control" })?;
					let nr = b0 >> 1;
					let ns = b1 >> 1;
					let pf = b1 & 0b1 != 0;
					Ok((Control::Information { ns, nr, pf }, 2))
				}
			}
		} else if b0 & 0b11 == 0b01 {
			// S-frame.
			match modulus {
				Modulus::Mod8 => {
					let nr = b0 >> 5;
					let pf = (b0 >> 4) & 0b1 != 0;
					let ss = SFrameType::try_from((b0 >> 2) & 0b11)
						.map_err(|_| FrameError::ReservedControl { byte: b0 })?;
					Ok((Control::Supervisory { ss, nr, pf }, 1))
				}
				Modulus::Mod128 => {
					let b1 = *bytes
						.get(1)
						.ok_or(FrameError::Truncated { field: "control" })?;
					let ss = SFrameType::try_from((b0 >> 2) & 0b11)
						.map_err(|_| FrameError::ReservedControl { byte: b0 })?;
					let nr = b1 >> 1;
					let pf = b1 & 0b1 != 0;
					Ok((Control::Supervisory { ss, nr, pf }, 1 + 1))
				}
			}
		} else {
			// U-frame: always a single byte, independent of modulus.
			let mmm = b0 >> 5;
			let pf = (b0 >> 4) & 0b1 != 0;
			let mm = (b0 >> 2) & 0b11;
			let mmmmm = (mmm << 2) | mm;
			let m = UFrameType::try_from(mmmmm)
				.map_err(|_| FrameError::ReservedControl { byte: b0 })?;
			Ok((Control::Unnumbered { m, pf }, 1))
		}
	}

	pub fn pf(&self) -> bool {
		match *self {
			Control::Information { pf, .. } => pf,
			Control::Supervisory { pf, .. } => pf,
			Control::Unnumbered { pf, .. } => pf,
		}
	}
}

impl std::fmt::Display for Control {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match *self {
			Control::Information { ns, nr, pf } => {
				write!(f, "I: N(S)={ns}, N(R)={nr}, PF={}", pf as u8)
			}
			Control::Supervisory { ss, nr, pf } => {
				write!(f, "S: {ss:?}, N(R)={nr}, PF={}", pf as u8)
			}
			Control::Unnumbered { m, pf } => write!(f, "U: {m:?}, PF={}", pf as u8),
		}
	}
}
