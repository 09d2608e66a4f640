//! HTML escaping with auto-linking and address obfuscation (spec.md §4.7
//! "HTML escaping / URL detection / address obfuscation"). Grounded on
//! `original_source/html.c`'s `buffer_append_html_generic`/`detect_url`/
//! `match_domain`/`detect_email`/`buffer_append_filename`, reworked to
//! operate on an immutable source slice and a [`ByteBuffer`] sink instead of
//! a pair of raw pointers, using [`ByteBuffer::truncate`] to unwind bytes
//! already emitted for what turns out to be a URL's scheme.

use crate::buffer::ByteBuffer;
use crate::config::Config;

pub const QUOTE: u8 = 1;
pub const DETECT_URLS: u8 = 2;
pub const OBFUSCATE: u8 = 4;

const MAX_FILENAME_LENGTH: usize = 128;

/// Escapes `what` into `dst` per `flags`, optionally auto-linking URLs and
/// obfuscating email addresses.
pub fn append_html(dst: &mut ByteBuffer, what: &[u8], flags: u8, config: &Config) {
    let end = what.len();
    let mut i = 0;
    while i < end {
        let c = what[i];
        i += 1;
        match c {
            b'<' => {
                dst.append_str("&lt;");
            }
            b'>' => {
                dst.append_str("&gt;");
            }
            b'&' => {
                dst.append_str("&amp;");
            }
            b'"' => {
                if flags & QUOTE != 0 {
                    dst.append_str("&quot;");
                } else {
                    dst.append_byte(c);
                }
            }
            b':' => {
                let mut linked = false;
                if flags & DETECT_URLS != 0 && what.get(i) == Some(&b'/') {
                    if let Some((url_start, url_len, safe)) = detect_url(what, i - 1, end, config)
                    {
                        let scheme_len = (i - 1) - url_start;
                        if url_len <= config.max_url_length && dst.len() >= scheme_len {
                            dst.truncate(dst.len() - scheme_len);
                            dst.append_str("<a href=\"");
                            append_html(dst, &what[url_start..url_start + url_len], QUOTE, config);
                            if safe {
                                dst.append_str("\">");
                            } else {
                                dst.append_str("\" rel=\"nofollow\">");
                            }
                            append_html(dst, &what[url_start..url_start + url_len], 0, config);
                            dst.append_str("</a>");
                            i = url_start + url_len;
                            linked = true;
                        }
                    }
                }
                if !linked {
                    dst.append_byte(c);
                }
            }
            b'@' => {
                if detect_email(what, i - 1, end) {
                    if flags & OBFUSCATE != 0 {
                        dst.append_str("&#64;...");
                        i += 3;
                    } else {
                        dst.append_str("&#64;");
                    }
                } else {
                    dst.append_byte(c);
                }
            }
            b'\t' | b'\n' => {
                dst.append_byte(c);
            }
            b'\r' => {}
            _ => {
                if c >= 0x20 {
                    dst.append_byte(c);
                } else {
                    dst.append_byte(b'.');
                }
            }
        }
    }
}

/// `buffer_append_html`: always-obfuscating, no URL detection, no quoting.
pub fn append_html_default(dst: &mut ByteBuffer, what: &[u8], config: &Config) {
    append_html(dst, what, OBFUSCATE, config);
}

/// `buffer_append_header`: an obfuscated line plus a trailing newline.
pub fn append_header(dst: &mut ByteBuffer, what: &str, config: &Config) {
    append_html_default(dst, what.as_bytes(), config);
    dst.append_byte(b'\n');
}

fn detect_email(what: &[u8], at: usize, end: usize) -> bool {
    at > 0
        && end - at > 4
        && what[at - 1] > b' '
        && what.get(at + 1).is_some_and(|&b| b > b' ')
        && what.get(at + 2).is_some_and(|&b| b > b' ')
        && what.get(at + 3).is_some_and(|&b| b > b' ')
}

/// Checks whether the hostname ending at `end` belongs to `domain`
/// (exact match or a dot-delimited suffix of it).
fn match_domain(host: &[u8], domain: &str) -> bool {
    let domain = domain.as_bytes();
    if host.len() < domain.len() {
        return false;
    }
    let tail = &host[host.len() - domain.len()..];
    if !tail.eq_ignore_ascii_case(domain) {
        return false;
    }
    host.len() == domain.len() || host[host.len() - domain.len() - 1] == b'.'
}

fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'/' | b'-'
                | b'.'
                | b'_'
                | b'~'
                | b'%'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b':'
                | b'@'
                | b'?'
                | b'#'
        )
}

/// Looks backward from `colon` (the index of a `:` known to be followed by
/// `/`) for an `http`/`https`/`ftp` scheme, then forward through `://` and a
/// hostname and (optionally) a path. Returns `(url_start, url_len, safe)`.
fn detect_url(what: &[u8], colon: usize, end: usize, config: &Config) -> Option<(usize, usize, bool)> {
    let url_start = if colon >= 5 && &what[colon - 5..colon] == b"https" {
        colon - 5
    } else if colon >= 4 && &what[colon - 4..colon] == b"http" {
        colon - 4
    } else if colon >= 3 && &what[colon - 3..colon] == b"ftp" {
        colon - 3
    } else {
        return None;
    };

    if end - colon <= 3 || &what[colon..colon + 3] != b"://" {
        return None;
    }

    let hostname = colon + 3;
    let mut ptr = hostname;
    while ptr < end
        && (what[ptr].is_ascii_alphanumeric()
            || ((what[ptr] == b'-' || what[ptr] == b'.') && ptr > hostname))
    {
        ptr += 1;
    }
    while ptr > hostname && what[ptr - 1] == b'.' {
        ptr -= 1;
    }
    if ptr <= hostname {
        return None;
    }

    let safe = config
        .safe_domains
        .iter()
        .any(|d| match_domain(&what[hostname..ptr], d));

    if ptr == end || what[ptr] != b'/' {
        // Don't detect URLs with userinfo or a port.
        if ptr < end && (what[ptr] == b'@' || what[ptr] == b':') {
            return None;
        }
        return Some((url_start, ptr - url_start, safe));
    }

    while ptr < end && is_path_char(what[ptr]) {
        ptr += 1;
    }
    // Trailing punctuation is unlikely to be part of the URL in practice.
    while ptr > hostname
        && matches!(
            what[ptr - 1],
            b'.' | b'!' | b')' | b',' | b';' | b':' | b'?'
        )
    {
        ptr -= 1;
    }

    Some((url_start, ptr - url_start, safe))
}

/// Sanitizes an attachment's claimed filename: ASCII alphanumerics pass
/// through, any run of other bytes collapses to a single underscore, and the
/// result gets a `.txt`/`.bin` extension depending on whether the part's
/// content type is textual (`buffer_append_filename`).
pub fn append_filename(dst: &mut ByteBuffer, filename: Option<&str>, text: bool) {
    let fn_str = match filename {
        Some(f) if !f.is_empty() => f,
        _ => "attachment",
    };
    let mut prev: u8 = 0;
    for &b in fn_str.as_bytes().iter().take(MAX_FILENAME_LENGTH) {
        if b.is_ascii_alphanumeric() {
            dst.append_byte(b);
            prev = b;
        } else if prev != b'_' {
            dst.append_byte(b'_');
            prev = b'_';
        }
    }
    dst.append_str(if text { ".txt" } else { ".bin" });
}
