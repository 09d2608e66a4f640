//! Header-line folding and RFC 2047 encoded-word decoding (spec.md §4.4
//! "Header skipping" / "Header decoding"). The encoded-word state machine is
//! grounded on the teacher's `decoders/encoded_word.rs` (`Rfc2047State`:
//! Init/Charset/Encoding/Data), adapted to operate on a plain `&[u8]` header
//! buffer instead of `MessageStream`, to add the spec's 75-byte width cap and
//! malformed-word literal fallback, and to route through [`crate::encoding`]
//! instead of the teacher's own charset table.

use crate::decoders::base64::decode_base64;
use crate::decoders::quoted_printable::quoted_printable_decode;
use crate::encoding;

const MAX_ENCODED_WORD_LEN: usize = 75;

/// Splits off the next header line (including folded continuations starting
/// with TAB/SPACE) from `src` starting at `pos`. Returns `(raw_line, next_pos)`
/// or `None` at an empty line (end of headers) or end of buffer.
pub fn next_header<'a>(src: &'a [u8], mut pos: usize) -> Option<(&'a [u8], usize)> {
    if pos >= src.len() {
        return None;
    }
    // An immediate CR/LF at `pos` is a blank line: end of headers.
    if src[pos] == b'\n' || (src[pos] == b'\r' && src.get(pos + 1) == Some(&b'\n')) {
        return None;
    }
    let start = pos;
    loop {
        let nl = match memchr(b'\n', &src[pos..]) {
            Some(i) => pos + i,
            None => src.len(),
        };
        pos = (nl + 1).min(src.len());
        match src.get(pos) {
            Some(b' ') | Some(b'\t') => continue, // folded continuation
            _ => break,
        }
    }
    Some((&src[start..pos], pos))
}

fn memchr(needle: u8, hay: &[u8]) -> Option<usize> {
    hay.iter().position(|&b| b == needle)
}

/// Splits a raw header line into `(name, value)`, trimming the leading
/// colon-space and trailing newline. `name` is lowercased for matching.
pub fn split_header(line: &[u8]) -> Option<(String, &[u8])> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = String::from_utf8_lossy(&line[..colon]).to_ascii_lowercase();
    let mut value = &line[colon + 1..];
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    let mut end = value.len();
    while end > 0 && (value[end - 1] == b'\n' || value[end - 1] == b'\r') {
        end -= 1;
    }
    Some((name, &value[..end]))
}

/// Decodes a header's raw value, expanding RFC 2047 encoded words and
/// converting everything else verbatim (headers are expected to be mostly
/// ASCII outside of encoded words). Adjacent encoded words separated only by
/// linear whitespace are concatenated without the whitespace between them.
pub fn decode_text(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut last_was_encoded_word = false;

    while i < bytes.len() {
        if bytes[i] == b'=' && bytes.get(i + 1) == Some(&b'?') {
            if let Some((decoded, consumed)) = decode_one_encoded_word(&bytes[i..]) {
                out.push_str(&decoded);
                i += consumed;
                last_was_encoded_word = true;
                continue;
            }
        }
        // Track runs of linear whitespace so we can drop them when they sit
        // only between two encoded words.
        if last_was_encoded_word && (bytes[i] == b' ' || bytes[i] == b'\t') {
            let start = i;
            while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'=' && bytes.get(i + 1) == Some(&b'?') {
                if let Some((decoded, consumed)) = decode_one_encoded_word(&bytes[i..]) {
                    out.push_str(&decoded);
                    i += consumed;
                    continue;
                }
            }
            out.push_str(&text[start..i]);
            last_was_encoded_word = false;
            continue;
        }
        last_was_encoded_word = false;
        let ch = text[i..].chars().next().unwrap_or('\u{FFFD}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Attempts to decode a single `=?CHARSET?E?TEXT?=` token starting at
/// `input[0..]`. On success returns `(decoded_text, bytes_consumed)`; widths
/// over 75 bytes or malformed fields report `None`, in which case the caller
/// emits the literal source text (spec.md §4.4).
fn decode_one_encoded_word(input: &[u8]) -> Option<(String, usize)> {
    let end = find_terminator(input)?;
    if end + 2 > MAX_ENCODED_WORD_LEN {
        return None;
    }
    let body = &input[2..end]; // between "=?" and "?="
    let mut fields = body.splitn(3, |&b| b == b'?');
    let charset = fields.next()?;
    let enc = fields.next()?;
    let text = fields.next()?;
    if enc.len() != 1 {
        return None;
    }

    let raw_bytes = match enc[0] {
        b'q' | b'Q' => {
            let qp_text: Vec<u8> = text
                .iter()
                .map(|&b| if b == b'_' { b' ' } else { b })
                .collect();
            quoted_printable_decode(&qp_text)?
        }
        b'b' | b'B' => decode_base64(text)?,
        _ => return None,
    };

    let mut out = String::new();
    let mut buf = crate::buffer::ByteBuffer::with_capacity(raw_bytes.len() * 2);
    let charset_str = String::from_utf8_lossy(charset);
    encoding::to_utf8(&raw_bytes, &charset_str, &mut buf);
    out.push_str(&String::from_utf8_lossy(buf.as_slice()));
    Some((out, end + 2))
}

/// Finds the index of the `?=` that terminates the encoded word (the
/// position of `?`), scanning no further than [`MAX_ENCODED_WORD_LEN`] bytes.
fn find_terminator(input: &[u8]) -> Option<usize> {
    let limit = input.len().min(MAX_ENCODED_WORD_LEN + 2);
    let mut i = 2;
    let mut q_count = 0;
    while i + 1 < limit {
        if input[i] == b'?' {
            q_count += 1;
            if input[i + 1] == b'=' && q_count >= 3 {
                return Some(i);
            }
        }
        if input[i] == b'\n' {
            return None;
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_header_handles_folding() {
        let src = b"Subject: line1\n continuation\nFrom: a\n\nbody";
        let (line, pos) = next_header(src, 0).unwrap();
        assert_eq!(line, &src[0..28]);
        let (line2, pos2) = next_header(src, pos).unwrap();
        assert_eq!(line2, b"From: a\n");
        assert!(next_header(src, pos2).is_none());
    }

    #[test]
    fn decode_text_encoded_word() {
        let decoded = decode_text(b"=?KOI8-R?Q?=D4=C5=D3=D4?=");
        assert_eq!(decoded, "\u{0442}\u{0435}\u{0441}\u{0442}"); // "тест"
    }

    #[test]
    fn decode_text_concatenates_adjacent_words() {
        let decoded = decode_text(b"=?utf-8?q?Hello,_?= =?utf-8?q?World!?=");
        assert_eq!(decoded, "Hello, World!");
    }

    #[test]
    fn decode_text_leaves_plain_whitespace_between_plain_words() {
        let decoded = decode_text(b"Hello World");
        assert_eq!(decoded, "Hello World");
    }

    #[test]
    fn malformed_encoded_word_is_literal() {
        let decoded = decode_text(b"=?utf-8?X?bad?=");
        assert_eq!(decoded, "=?utf-8?X?bad?=");
    }

    #[test]
    fn oversized_encoded_word_is_literal() {
        let long = format!("=?utf-8?q?{}?=", "a".repeat(80));
        let decoded = decode_text(long.as_bytes());
        assert_eq!(decoded, long);
    }
}
