// UTF-8 decoding for the lexer.
//
// Invalid sequences never stop the lexer: they decode as one replacement
// character that is one byte wide, so every step makes progress.

/// The result of decoding one code point at the front of a byte slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    /// `None` when the bytes do not start with a valid UTF-8 sequence.
    pub char: Option<char>,
    /// Number of bytes consumed. Zero only for an empty slice.
    pub size: u32,
}

/// Decode one UTF-8 code point from the start of `string`.
#[inline]
pub fn utf8_next(string: &[u8]) -> Decoded {
    let Some(&b0) = string.first() else {
        return Decoded { char: None, size: 0 };
    };

    if b0 < 0x80 {
        return Decoded {
            char: Some(char::from(b0)),
            size: 1,
        };
    }

    let invalid = Decoded { char: None, size: 1 };

    // Expected length from the lead byte
    let (expected_len, mut code_point) = match b0 {
        0xC2..=0xDF => (2, u32::from(b0 & 0x1F)),
        0xE0..=0xEF => (3, u32::from(b0 & 0x0F)),
        0xF0..=0xF4 => (4, u32::from(b0 & 0x07)),
        _ => return invalid,
    };

    if string.len() < expected_len {
        return invalid;
    }

    for &b in &string[1..expected_len] {
        if (b & 0xC0) != 0x80 {
            return invalid;
        }
        code_point = (code_point << 6) | u32::from(b & 0x3F);
    }

    // Overlong encodings and surrogates
    let in_range = match expected_len {
        2 => code_point >= 0x80,
        3 => code_point >= 0x800,
        _ => (0x10000..=0x10FFFF).contains(&code_point),
    };

    match char::from_u32(code_point) {
        Some(c) if in_range => Decoded {
            char: Some(c),
            size: expected_len as u32,
        },
        _ => invalid,
    }
}
