//! Charset whitelist and conversion to UTF-8.
//!
//! Grounded on `original_source/encoding.c`'s `enc_allowed_charset` /
//! `enc_to_utf8` pair, and on the teacher's `decoders/charsets` module for
//! the general shape of a charset-name-to-decoder lookup. Unlike the
//! teacher, conversion here is not optional: every text part that reaches
//! the renderer goes through [`to_utf8`].

use crate::buffer::ByteBuffer;

/// Canonicalizes a MIME charset label (case-insensitive, alias-folding) and
/// reports whether this crate will decode it. UTF-7 is handled separately
/// ([`decode_utf7`]) since `encoding_rs` deliberately excludes it as a
/// non-WHATWG encoding; every other label whitelisted by spec.md §4.2
/// (`iso-8859-*`, `windows-*`/`cp*`, the CJK and Cyrillic encodings, …) is
/// resolved through `encoding_rs`'s own WHATWG label table, so any alias it
/// recognizes (`iso-8859-5`, `iso-8859-7`, `windows-1253`, `cp866`, …) is
/// decoded correctly rather than collapsed to Latin-1. Anything neither
/// handles falls back to Windows-1252 at the call site, mirroring
/// `enc_allowed_charset`'s default-to-`us-ascii`-compatible behavior for
/// truly unknown labels.
pub fn normalize_charset(label: &str) -> Option<&'static str> {
    let lower = label.trim().to_ascii_lowercase();
    if lower == "utf-7" || lower == "unicode-1-1-utf-7" {
        return Some("utf-7");
    }
    encoding_rs::Encoding::for_label(lower.as_bytes()).map(|enc| enc.name())
}

/// Decodes `bytes` as `charset` into `out`, appending UTF-8. Unknown or
/// malformed input never fails outright: unrecognized charsets fall back to
/// Windows-1252 (a superset of Latin-1 covering the common mis-labeled
/// case), and undecodable byte sequences become U+FFFD, mirroring
/// `enc_to_utf8`'s "never refuse to render" guarantee.
pub fn to_utf8(bytes: &[u8], charset: &str, out: &mut ByteBuffer) {
    let canon = normalize_charset(charset).unwrap_or("windows-1252");
    if canon == "utf-7" {
        decode_utf7(bytes, out);
        return;
    }
    let encoding = encoding_rs::Encoding::for_label(canon.as_bytes())
        .unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    out.append_str(&decoded);
}

/// Strips a trailing incomplete UTF-8 sequence from `s`, returning the
/// longest valid-UTF-8 prefix. Used after truncating a text part at a byte
/// boundary that might land mid-codepoint (mirrors
/// `enc_utf8_remove_partial`).
pub fn remove_partial_utf8(s: &[u8]) -> &[u8] {
    if std::str::from_utf8(s).is_ok() {
        return s;
    }
    // Back up at most 3 bytes looking for a valid boundary; a UTF-8
    // sequence is never more than 4 bytes, so if we haven't found a clean
    // cut by then the leading bytes are themselves malformed and we just
    // truncate harder.
    for cut in 1..=3.min(s.len()) {
        let candidate = &s[..s.len() - cut];
        if std::str::from_utf8(candidate).is_ok() {
            return candidate;
        }
    }
    &[]
}

/// Modified UTF-7 decoder (RFC 2152 subset used by mail headers), since
/// `encoding_rs` deliberately excludes UTF-7 as a non-WHATWG encoding.
/// Shaped after the teacher's `decoders/charsets/utf7.rs` state machine: a
/// base64 run (entered on `+`, exited on a non-base64 byte or `-`) feeding a
/// pending-bits accumulator that drains into UTF-16 code units, which are
/// then decoded (with surrogate pairing) into UTF-8.
fn decode_utf7(bytes: &[u8], out: &mut ByteBuffer) {
    const B64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    fn b64_value(b: u8) -> Option<u32> {
        B64.iter().position(|&c| c == b).map(|p| p as u32)
    }

    let mut in_b64 = false;
    let mut bit_buf: u32 = 0;
    let mut bit_count: u32 = 0;
    let mut pending_high: Option<u16> = None;
    let mut i = 0;

    let mut flush_unit = |unit: u16, out: &mut ByteBuffer, pending_high: &mut Option<u16>| {
        if let Some(high) = pending_high.take() {
            if (0xDC00..=0xDFFF).contains(&unit) {
                let c = 0x10000
                    + ((high as u32 - 0xD800) << 10)
                    + (unit as u32 - 0xDC00);
                out.append_scalar(c);
                return;
            }
            out.append_scalar(0xFFFD);
        }
        if (0xD800..=0xDBFF).contains(&unit) {
            *pending_high = Some(unit);
        } else {
            out.append_scalar(unit as u32);
        }
    };

    while i < bytes.len() {
        let b = bytes[i];
        if !in_b64 {
            if b == b'+' {
                in_b64 = true;
                bit_buf = 0;
                bit_count = 0;
                i += 1;
                // "+-" is a literal plus sign.
                if i < bytes.len() && bytes[i] == b'-' {
                    out.append_byte(b'+');
                    in_b64 = false;
                    i += 1;
                }
                continue;
            }
            out.append_byte(b);
            i += 1;
            continue;
        }
        match b64_value(b) {
            Some(v) => {
                bit_buf = (bit_buf << 6) | v;
                bit_count += 6;
                if bit_count >= 16 {
                    bit_count -= 16;
                    let unit = ((bit_buf >> bit_count) & 0xFFFF) as u16;
                    flush_unit(unit, out, &mut pending_high);
                }
                i += 1;
            }
            None => {
                in_b64 = false;
                if b == b'-' {
                    i += 1;
                }
                if pending_high.take().is_some() {
                    out.append_scalar(0xFFFD);
                }
            }
        }
    }
    if pending_high.take().is_some() {
        out.append_scalar(0xFFFD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passthrough() {
        let mut out = ByteBuffer::with_capacity(0);
        to_utf8(b"hello world", "us-ascii", &mut out);
        assert_eq!(out.as_slice(), b"hello world");
    }

    #[test]
    fn latin1_high_bytes() {
        let mut out = ByteBuffer::with_capacity(0);
        to_utf8(&[0xE9], "iso-8859-1", &mut out); // e-acute
        assert_eq!(out.as_slice(), "\u{e9}".as_bytes());
    }

    #[test]
    fn charsets_without_a_hardcoded_alias_still_resolve() {
        // These have no entry in normalize_charset's own match arms but are
        // real encoding_rs/WHATWG labels; they must not collapse to None
        // (and thus to a wrong windows-1252 decode) like a truly made-up one.
        for label in ["iso-8859-5", "iso-8859-7", "windows-1253", "windows-1256", "cp866"] {
            assert!(normalize_charset(label).is_some(), "{label} should resolve");
        }
    }

    #[test]
    fn unknown_charset_falls_back() {
        let mut out = ByteBuffer::with_capacity(0);
        to_utf8(b"plain", "x-made-up-charset", &mut out);
        assert_eq!(out.as_slice(), b"plain");
    }

    #[test]
    fn utf7_decodes_unicode_escape() {
        // "Hi Mom -☺-!" is the canonical RFC 2152 example.
        let mut out = ByteBuffer::with_capacity(0);
        decode_utf7(b"Hi Mom +Jjo--!", &mut out);
        assert_eq!(
            String::from_utf8(out.into_vec()).unwrap(),
            "Hi Mom \u{263a}-!"
        );
    }

    #[test]
    fn utf7_literal_plus() {
        let mut out = ByteBuffer::with_capacity(0);
        decode_utf7(b"1 +- 1 = 2", &mut out);
        assert_eq!(String::from_utf8(out.into_vec()).unwrap(), "1 + 1 = 2");
    }

    #[test]
    fn remove_partial_utf8_trims_trailing_lead_byte() {
        let full = "héllo".as_bytes(); // 'é' is 0xC3 0xA9
        let truncated = &full[..full.len() - 1]; // cuts mid-sequence
        assert_eq!(remove_partial_utf8(truncated), &full[..3]);
    }
}
