//! The packed, fixed-size message record (spec.md §3). Serialization is
//! hand-rolled rather than relying on `#[repr(C)]` struct layout, since the
//! on-disk format must be byte-exact regardless of the host compiler's
//! padding choices — the one place this crate deliberately does NOT mirror
//! the teacher's approach of deriving `rkyv`/`serde` layouts, because the
//! wire format here is a fixed legacy layout, not a format this crate gets
//! to design.

use crate::digest::Hash;

pub const STRINGS_SIZE: usize = 160;
pub const RECORD_SIZE: usize = 8 + 8 + 16 + 16 + 4 + 4 + 6 + 3 + 1 + STRINGS_SIZE;

pub const FLAG_HAVE_MSGID: u8 = 1;
pub const FLAG_HAVE_IRT: u8 = 2;
pub const FLAG_FROM_TRUNC: u8 = 4;
pub const FLAG_SUBJECT_TRUNC: u8 = 8;

/// Thread-link neighbors: ordinal 0 means "none".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadLink {
    pub pn: u32,
    pub nn: u32,
    pub py: u8,
    pub pm: u8,
    pub pd: u8,
    pub ny: u8,
    pub nm: u8,
    pub nd: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub offset: u64,
    pub size: u64,
    pub msgid_hash: Hash,
    pub irt_hash: Hash,
    pub thread: ThreadLink,
    pub y: u8,
    pub m: u8,
    pub d: u8,
    pub flags: u8,
    pub strings: [u8; STRINGS_SIZE],
}

impl Default for MessageRecord {
    fn default() -> Self {
        MessageRecord {
            offset: 0,
            size: 0,
            msgid_hash: [0; 16],
            irt_hash: [0; 16],
            thread: ThreadLink::default(),
            y: 0,
            m: 1,
            d: 1,
            flags: 0,
            strings: [0; STRINGS_SIZE],
        }
    }
}

impl MessageRecord {
    pub fn has_msgid(&self) -> bool {
        self.flags & FLAG_HAVE_MSGID != 0
    }

    pub fn has_irt(&self) -> bool {
        self.flags & FLAG_HAVE_IRT != 0
    }

    /// Packs the `From`/`Subject` short fields into `strings`, NUL-separated
    /// and NUL-terminated, truncating (and flagging truncation) rather than
    /// overflowing the fixed 160-byte field.
    pub fn set_strings(&mut self, from: &str, subject: &str) {
        self.strings = [0; STRINGS_SIZE];
        let half = STRINGS_SIZE / 2 - 1;
        let (from_fit, from_trunc) = fit(from, half);
        let (subj_fit, subj_trunc) = fit(subject, STRINGS_SIZE - from_fit.len() - 2);

        let mut pos = 0;
        self.strings[pos..pos + from_fit.len()].copy_from_slice(from_fit.as_bytes());
        pos += from_fit.len();
        self.strings[pos] = 0;
        pos += 1;
        self.strings[pos..pos + subj_fit.len()].copy_from_slice(subj_fit.as_bytes());

        if from_trunc {
            self.flags |= FLAG_FROM_TRUNC;
        }
        if subj_trunc {
            self.flags |= FLAG_SUBJECT_TRUNC;
        }
    }

    pub fn from_and_subject(&self) -> (String, String) {
        let mut parts = self.strings.splitn(2, |&b| b == 0);
        let from = parts.next().unwrap_or(b"");
        let rest = parts.next().unwrap_or(b"");
        let subject = rest.split(|&b| b == 0).next().unwrap_or(b"");
        (
            String::from_utf8_lossy(from).into_owned(),
            String::from_utf8_lossy(subject).into_owned(),
        )
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut w = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let b = $bytes;
                buf[w..w + b.len()].copy_from_slice(&b);
                w += b.len();
            }};
        }
        put!(self.offset.to_ne_bytes());
        put!(self.size.to_ne_bytes());
        put!(self.msgid_hash);
        put!(self.irt_hash);
        put!(self.thread.pn.to_ne_bytes());
        put!(self.thread.nn.to_ne_bytes());
        put!([
            self.thread.py,
            self.thread.pm,
            self.thread.pd,
            self.thread.ny,
            self.thread.nm,
            self.thread.nd,
        ]);
        put!([self.y, self.m, self.d]);
        put!([self.flags]);
        put!(self.strings);
        debug_assert_eq!(w, RECORD_SIZE);
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut r = 0;
        macro_rules! take {
            ($n:expr) => {{
                let s = &buf[r..r + $n];
                r += $n;
                s
            }};
        }
        let offset = u64::from_ne_bytes(take!(8).try_into().unwrap());
        let size = u64::from_ne_bytes(take!(8).try_into().unwrap());
        let msgid_hash: Hash = take!(16).try_into().unwrap();
        let irt_hash: Hash = take!(16).try_into().unwrap();
        let pn = u32::from_ne_bytes(take!(4).try_into().unwrap());
        let nn = u32::from_ne_bytes(take!(4).try_into().unwrap());
        let ymd6 = take!(6);
        let (py, pm, pd, ny, nm, nd) = (ymd6[0], ymd6[1], ymd6[2], ymd6[3], ymd6[4], ymd6[5]);
        let ymd3 = take!(3);
        let (y, m, d) = (ymd3[0], ymd3[1], ymd3[2]);
        let flags = take!(1)[0];
        let mut strings = [0u8; STRINGS_SIZE];
        strings.copy_from_slice(take!(STRINGS_SIZE));
        debug_assert_eq!(r, RECORD_SIZE);

        MessageRecord {
            offset,
            size,
            msgid_hash,
            irt_hash,
            thread: ThreadLink {
                pn,
                nn,
                py,
                pm,
                pd,
                ny,
                nm,
                nd,
            },
            y,
            m,
            d,
            flags,
            strings,
        }
    }
}

/// Truncates `s` to at most `max` bytes on a UTF-8 boundary, reporting
/// whether truncation occurred.
fn fit(s: &str, max: usize) -> (&str, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (&s[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut r = MessageRecord {
            offset: 1234,
            size: 56,
            y: 31,
            m: 1,
            d: 1,
            flags: FLAG_HAVE_MSGID,
            ..Default::default()
        };
        r.set_strings("Jane Doe", "hi");
        let bytes = r.to_bytes();
        let back = MessageRecord::from_bytes(&bytes);
        assert_eq!(r, back);
        assert_eq!(back.from_and_subject(), ("Jane Doe".to_string(), "hi".to_string()));
    }

    #[test]
    fn set_strings_flags_truncation() {
        let mut r = MessageRecord::default();
        let long_subject = "x".repeat(200);
        r.set_strings("a", &long_subject);
        assert_ne!(r.flags & FLAG_SUBJECT_TRUNC, 0);
    }
}
