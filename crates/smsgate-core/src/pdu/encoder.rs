//! SMS-SUBMIT encoder.
//!
//! Layout produced by [`SubmitPduEncoder`] (all fields one octet unless noted):
//!
//! ```text
//! [smsc_len=0][first=0x11][mr=0][da_len][da_toa][da_digits:N][pid=0][dcs][vp=0xAA][udl][ud:M]
//! ```
//!
//! The SMSC length of zero tells the modem to use the service centre stored on
//! the SIM.  The validity period is relative (four days).

use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::gsm7;
use crate::domain::request::{EncodingMode, SendRequest};

/// TP-MTI = SMS-SUBMIT, TP-VPF = relative.
const FIRST_OCTET: u8 = 0x11;
/// Type of address: international number, ISDN numbering plan.
const TOA_INTERNATIONAL: u8 = 0x91;
/// Type of address: unknown number type, ISDN numbering plan.
const TOA_UNKNOWN: u8 = 0x81;
/// Relative validity period of four days.
const VALIDITY_PERIOD: u8 = 0xAA;
/// Longest destination accepted, in digits.
const MAX_ADDRESS_DIGITS: usize = 20;
/// Maximum user data length in septets for the default alphabet.
pub const MAX_GSM7_SEPTETS: usize = 160;
/// Maximum user data length in octets for UCS-2.
pub const MAX_UCS2_OCTETS: usize = 140;

/// Errors raised while building a message unit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("invalid destination number: {0:?}")]
    InvalidDestination(String),

    #[error("message too long: {length} units, maximum is {max}")]
    MessageTooLong { length: usize, max: usize },
}

/// An encoded outbound unit ready to hand to the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPdu {
    /// Correlates driver notifications with the call that produced the unit.
    pub reference: Uuid,
    pub destination: String,
    pub message: String,
    pub encoding: EncodingMode,
    /// Full PDU including the leading SMSC field.
    pub bytes: Vec<u8>,
}

impl OutgoingPdu {
    /// The TP-DCS value carried by the unit.
    pub fn data_coding_scheme(&self) -> u8 {
        self.encoding.data_coding_scheme()
    }

    /// Length of the TPDU (everything after the SMSC field), as `AT+CMGS`
    /// expects it.
    pub fn tpdu_len(&self) -> usize {
        let smsc_len = self.bytes.first().copied().unwrap_or(0) as usize;
        self.bytes.len().saturating_sub(1 + smsc_len)
    }

    /// Uppercase hex rendering of [`Self::bytes`].
    pub fn to_hex(&self) -> String {
        self.bytes.iter().fold(
            String::with_capacity(self.bytes.len() * 2),
            |mut out, byte| {
                let _ = write!(out, "{byte:02X}");
                out
            },
        )
    }
}

/// Builds the unit the modem transmits for a send request.
pub trait PduEncoder: Send + Sync {
    /// Encodes `request` into an [`OutgoingPdu`] with a fresh reference.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the destination or message cannot be encoded.
    fn encode(&self, request: &SendRequest) -> Result<OutgoingPdu, EncodeError>;
}

/// GSM 03.40 SMS-SUBMIT encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubmitPduEncoder;

impl SubmitPduEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl PduEncoder for SubmitPduEncoder {
    fn encode(&self, request: &SendRequest) -> Result<OutgoingPdu, EncodeError> {
        let (toa, digits) = parse_destination(&request.destination)?;
        let (udl, user_data) = encode_user_data(&request.message, request.encoding)?;

        let mut bytes = Vec::with_capacity(8 + digits.len() / 2 + user_data.len());
        bytes.push(0x00);
        bytes.push(FIRST_OCTET);
        bytes.push(0x00);
        bytes.push(digits.len() as u8);
        bytes.push(toa);
        bytes.extend_from_slice(&semi_octets(&digits));
        bytes.push(0x00);
        bytes.push(request.encoding.data_coding_scheme());
        bytes.push(VALIDITY_PERIOD);
        bytes.push(udl);
        bytes.extend_from_slice(&user_data);

        Ok(OutgoingPdu {
            reference: Uuid::new_v4(),
            destination: request.destination.clone(),
            message: request.message.clone(),
            encoding: request.encoding,
            bytes,
        })
    }
}

/// Splits a destination into its type-of-address and bare digits.
///
/// Spaces and dashes are ignored; a leading `+` marks an international number.
fn parse_destination(destination: &str) -> Result<(u8, Vec<u8>), EncodeError> {
    let trimmed = destination.trim();
    let (toa, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (TOA_INTERNATIONAL, rest),
        None => (TOA_UNKNOWN, trimmed),
    };

    let mut digits = Vec::with_capacity(rest.len());
    for ch in rest.chars() {
        match ch {
            ' ' | '-' => continue,
            '0'..='9' => digits.push(ch as u8 - b'0'),
            _ => return Err(EncodeError::InvalidDestination(destination.to_string())),
        }
    }

    if digits.is_empty() || digits.len() > MAX_ADDRESS_DIGITS {
        return Err(EncodeError::InvalidDestination(destination.to_string()));
    }
    Ok((toa, digits))
}

/// Swapped-nibble BCD, padded with `F` for odd digit counts.
fn semi_octets(digits: &[u8]) -> Vec<u8> {
    digits
        .chunks(2)
        .map(|pair| {
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0x0F);
            (high << 4) | low
        })
        .collect()
}

/// Returns the TP-UDL value and the encoded user data.
fn encode_user_data(message: &str, encoding: EncodingMode) -> Result<(u8, Vec<u8>), EncodeError> {
    match encoding {
        EncodingMode::Default => {
            let septets = gsm7::to_septets(message);
            if septets.substituted > 0 {
                debug!(
                    "{} character(s) outside the GSM default alphabet replaced",
                    septets.substituted
                );
            }
            let length = septets.values.len();
            if length > MAX_GSM7_SEPTETS {
                return Err(EncodeError::MessageTooLong {
                    length,
                    max: MAX_GSM7_SEPTETS,
                });
            }
            Ok((length as u8, gsm7::pack_septets(&septets.values)))
        }
        EncodingMode::Unicode => {
            let data: Vec<u8> = message.encode_utf16().flat_map(u16::to_be_bytes).collect();
            if data.len() > MAX_UCS2_OCTETS {
                return Err(EncodeError::MessageTooLong {
                    length: data.len(),
                    max: MAX_UCS2_OCTETS,
                });
            }
            Ok((data.len() as u8, data))
        }
    }
}
