//! Outbound send requests.

use serde::{Deserialize, Serialize};

/// Selects the data coding scheme of an outbound message unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// GSM 7-bit default alphabet (DCS `0x00`).
    #[default]
    Default,
    /// UCS-2 (DCS `0x08`).
    Unicode,
}

impl EncodingMode {
    /// Maps the wire-level `unicode` flag onto an encoding mode.
    pub fn from_unicode_flag(unicode: bool) -> Self {
        if unicode {
            Self::Unicode
        } else {
            Self::Default
        }
    }

    /// The TP-DCS octet written into the SMS-SUBMIT unit.
    pub fn data_coding_scheme(self) -> u8 {
        match self {
            Self::Default => 0x00,
            Self::Unicode => 0x08,
        }
    }
}

/// One request to transmit a short message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub message: String,
    pub destination: String,
    pub encoding: EncodingMode,
}

impl SendRequest {
    /// Creates a request using the default encoding.
    pub fn new(message: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            destination: destination.into(),
            encoding: EncodingMode::Default,
        }
    }

    /// Selects UCS-2 when `unicode` is `true`, the default alphabet otherwise.
    pub fn unicode(mut self, unicode: bool) -> Self {
        self.encoding = EncodingMode::from_unicode_flag(unicode);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_uses_default_encoding() {
        let req = SendRequest::new("hi", "+491701234567");
        assert_eq!(req.encoding, EncodingMode::Default);
        assert_eq!(req.encoding.data_coding_scheme(), 0);
    }

    #[test]
    fn test_unicode_flag_selects_dcs_8() {
        let req = SendRequest::new("hi", "+491701234567").unicode(true);
        assert_eq!(req.encoding, EncodingMode::Unicode);
        assert_eq!(req.encoding.data_coding_scheme(), 8);
    }

    #[test]
    fn test_unicode_false_keeps_default() {
        let req = SendRequest::new("hi", "+491701234567").unicode(false);
        assert_eq!(req.encoding, EncodingMode::Default);
    }
}
