//! GSM 03.38 default alphabet and septet packing.

/// Escape septet announcing a character from the extension table.
pub const ESCAPE: u8 = 0x1B;

/// Septet used for characters the alphabet cannot represent (`?`).
pub const REPLACEMENT: u8 = 0x3F;

/// Basic character set, indexed by septet value.  `0x1B` is the escape slot.
const BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1B}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Extension table entries reachable through [`ESCAPE`].
const EXTENSION: [(char, u8); 10] = [
    ('\u{0C}', 0x0A),
    ('^', 0x14),
    ('{', 0x28),
    ('}', 0x29),
    ('\\', 0x2F),
    ('[', 0x3C),
    ('~', 0x3D),
    (']', 0x3E),
    ('|', 0x40),
    ('€', 0x65),
];

/// Result of mapping a text onto the default alphabet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Septets {
    pub values: Vec<u8>,
    /// Characters that had no representation and were replaced by `?`.
    pub substituted: usize,
}

/// Maps `text` onto default-alphabet septets.
///
/// Extension characters take two septets.  Unrepresentable characters are
/// replaced with `?` and counted in [`Septets::substituted`].
pub fn to_septets(text: &str) -> Septets {
    let mut values = Vec::with_capacity(text.len());
    let mut substituted = 0;

    for ch in text.chars() {
        if ch == '\u{1B}' {
            values.push(REPLACEMENT);
            substituted += 1;
        } else if let Some(pos) = BASIC.iter().position(|&c| c == ch) {
            values.push(pos as u8);
        } else if let Some(&(_, code)) = EXTENSION.iter().find(|(c, _)| *c == ch) {
            values.push(ESCAPE);
            values.push(code);
        } else {
            values.push(REPLACEMENT);
            substituted += 1;
        }
    }

    Septets {
        values,
        substituted,
    }
}

/// Packs 7-bit septets into octets, least significant bit first.
pub fn pack_septets(septets: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((septets.len() * 7).div_ceil(8));
    let mut acc: u32 = 0;
    let mut bits = 0;

    for &septet in septets {
        acc |= u32::from(septet & 0x7F) << bits;
        bits += 7;
        while bits >= 8 {
            out.push((acc & 0xFF) as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push((acc & 0xFF) as u8);
    }
    out
}
