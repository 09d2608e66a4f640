//! Streaming mbox parser (spec.md §4.5). Walks the mbox one line at a time
//! over a `BufRead`, so a multi-gigabyte mailbox is never materialized in
//! memory; only the current message's recognized header values are held at
//! once. Grounded on `original_source/mailbox.c`'s state machine shape
//! (`blank`/`header`/`body` flags driving a "From " line detector) but
//! restructured as an explicit loop over line fragments rather than a
//! pointer-walking C state machine.

use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::Config;
use crate::digest::{self, Hash};
use crate::error::{BlistsError, Result};
use crate::index::record::{
    MessageRecord, ThreadLink, FLAG_FROM_TRUNC, FLAG_HAVE_IRT, FLAG_HAVE_MSGID,
};
use crate::mime::header::decode_text;

/// Opens `path`, validates its size against [`Config::max_mailbox_bytes`],
/// and streams it from `resume_offset` through [`parse`]. Returns the
/// records produced by this run and the mbox's end-of-file offset (the next
/// header's `next_offset`).
pub fn index_from(
    path: &Path,
    config: &Config,
    list_name: &str,
    resume_offset: u64,
) -> Result<(Vec<MessageRecord>, u64)> {
    let mut file = std::fs::File::open(path).map_err(BlistsError::MailboxOpen)?;
    let len = file
        .metadata()
        .map_err(BlistsError::MailboxOpen)?
        .len();
    if len > config.max_mailbox_bytes {
        return Err(BlistsError::MailboxTooLarge(config.max_mailbox_bytes));
    }
    file.seek(SeekFrom::Start(resume_offset))
        .map_err(BlistsError::MailboxRead)?;
    let mut reader = std::io::BufReader::with_capacity(crate::config::FILE_BUFFER_SIZE, file);
    parse(&mut reader, resume_offset, config, list_name)
}

struct InProgress {
    offset: u64,
    y: u8,
    m: u8,
    d: u8,
    msgid_hash: Hash,
    irt_hash: Hash,
    flags: u8,
    from: String,
    subject: String,
    seen_irt: bool,
    was_in_body: bool,
}

impl InProgress {
    fn new(offset: u64) -> Self {
        InProgress {
            offset,
            y: 0,
            m: 1,
            d: 1,
            msgid_hash: [0; 16],
            irt_hash: [0; 16],
            flags: 0,
            from: String::new(),
            subject: String::new(),
            seen_irt: false,
            was_in_body: false,
        }
    }

    fn into_record(self, size: u64) -> MessageRecord {
        let mut rec = MessageRecord {
            offset: self.offset,
            size,
            msgid_hash: self.msgid_hash,
            irt_hash: self.irt_hash,
            thread: ThreadLink::default(),
            y: self.y,
            m: self.m,
            d: self.d,
            flags: self.flags,
            strings: [0; crate::index::record::STRINGS_SIZE],
        };
        rec.set_strings(&self.from, &self.subject);
        rec
    }
}

/// Drives the line-fragment state machine over `reader`, whose first byte is
/// at absolute mbox offset `start_offset`. Returns the records produced and
/// the absolute offset of EOF.
pub fn parse<R: BufRead>(
    reader: &mut R,
    start_offset: u64,
    config: &Config,
    list_name: &str,
) -> Result<(Vec<MessageRecord>, u64)> {
    let mut records: Vec<MessageRecord> = Vec::with_capacity(4096);
    let mut pos = start_offset;
    let mut prev_blank = true; // the position just before `start_offset` counts as blank
    let mut in_headers = false;
    let mut in_body = false;
    let mut current: Option<InProgress> = None;
    let mut last_blank_start: Option<u64> = None;
    let mut cur_header_name: Option<String> = None;
    let mut cur_header_value: Vec<u8> = Vec::new();

    let mut line = Vec::new();
    loop {
        line.clear();
        let line_start = pos;
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(BlistsError::MailboxRead)?;
        if n == 0 {
            flush_header(&mut current, &cur_header_name, &cur_header_value, list_name);
            if let Some(msg) = current.take() {
                finalize(&mut records, msg, pos, last_blank_start, config)?;
            }
            return Ok((records, pos));
        }
        pos += n as u64;

        if prev_blank && line.starts_with(b"From ") {
            flush_header(&mut current, &cur_header_name, &cur_header_value, list_name);
            if let Some(msg) = current.take() {
                finalize(&mut records, msg, line_start, last_blank_start, config)?;
            }
            if records.len() >= config.max_mailbox_messages {
                return Err(BlistsError::TooManyMessages(config.max_mailbox_messages));
            }
            let mut msg = InProgress::new(pos);
            let (y, m, d) = parse_from_date(&line, config);
            msg.y = y;
            msg.m = m;
            msg.d = d;
            current = Some(msg);
            in_headers = true;
            in_body = false;
            cur_header_name = None;
            cur_header_value.clear();
            last_blank_start = None;
            prev_blank = false;
            continue;
        }

        let is_continuation =
            in_headers && cur_header_name.is_some() && matches!(line.first(), Some(b' ') | Some(b'\t'));
        if is_continuation {
            let trimmed = trim_leading_ws(&line);
            cur_header_value.push(b' ');
            cur_header_value.extend_from_slice(trimmed);
            prev_blank = false;
            continue;
        }

        let is_blank = is_blank_line(&line);
        if is_blank {
            last_blank_start = Some(line_start);
        } else {
            last_blank_start = None;
        }

        if in_headers {
            flush_header(&mut current, &cur_header_name, &cur_header_value, list_name);
            cur_header_name = None;
            cur_header_value.clear();
            if is_blank {
                in_headers = false;
                in_body = true;
            } else if let Some((name, value)) = crate::mime::header::split_header(&line) {
                cur_header_name = Some(name);
                cur_header_value = value.to_vec();
            }
            prev_blank = is_blank;
            continue;
        }

        prev_blank = is_blank;
        let _ = in_body; // only consulted at finalize time via InProgress.was_in_body
        if let Some(msg) = current.as_mut() {
            msg.was_in_body = in_body;
        }
    }
}

fn is_blank_line(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n") || line.is_empty()
}

fn trim_leading_ws(line: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < line.len() && (line[i] == b' ' || line[i] == b'\t') {
        i += 1;
    }
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[i..end.max(i)]
}

fn finalize(
    records: &mut Vec<MessageRecord>,
    msg: InProgress,
    here: u64,
    last_blank_start: Option<u64>,
    config: &Config,
) -> Result<()> {
    let was_in_body = msg.was_in_body;
    let offset = msg.offset;
    // `last_blank_start` is `Some` only when the line immediately before `here`
    // was blank (see the `parse` loop), so it strips exactly one trailing
    // separator line — never the body of a message that ends at EOF/the next
    // "From " line without a blank line first.
    let size = if was_in_body {
        last_blank_start.unwrap_or(here).saturating_sub(offset)
    } else {
        here.saturating_sub(offset)
    };
    if size == 0 {
        return Ok(());
    }
    let _ = config;
    records.push(msg.into_record(size));
    Ok(())
}

fn flush_header(
    current: &mut Option<InProgress>,
    name: &Option<String>,
    value: &[u8],
    list_name: &str,
) {
    let (Some(msg), Some(name)) = (current.as_mut(), name.as_deref()) else {
        return;
    };
    match name {
        "message-id" => {
            if let Some(tok) = first_angle_token(value) {
                msg.msgid_hash = digest::hash_id(tok);
                msg.flags |= FLAG_HAVE_MSGID;
            }
        }
        "in-reply-to" => {
            if let Some(tok) = first_angle_token(value) {
                msg.irt_hash = digest::hash_id(tok);
                msg.flags |= FLAG_HAVE_IRT;
                msg.seen_irt = true;
            }
        }
        "references" => {
            if !msg.seen_irt {
                if let Some(tok) = last_angle_token(value) {
                    msg.irt_hash = digest::hash_id(tok);
                    msg.flags |= FLAG_HAVE_IRT;
                }
            }
        }
        "from" => {
            msg.from = decode_text(value);
        }
        "subject" => {
            let decoded = decode_text(value);
            msg.subject = strip_list_prefix(&decoded, list_name);
        }
        _ => {}
    }
}

/// First `<...>` token with inner content of at least 4 bytes (spec.md §4.5:
/// "extract the first `<…>` token of ≥ 4 bytes").
fn first_angle_token(value: &[u8]) -> Option<&[u8]> {
    let start = value.iter().position(|&b| b == b'<')?;
    let rel_end = value[start + 1..].iter().position(|&b| b == b'>')?;
    let inner = &value[start + 1..start + 1 + rel_end];
    if inner.len() >= 4 {
        Some(inner)
    } else {
        None
    }
}

/// Last `<...>` token with inner content of at least 4 bytes, used for
/// `References:` (spec.md §4.5).
fn last_angle_token(value: &[u8]) -> Option<&[u8]> {
    let mut result = None;
    let mut i = 0;
    while i < value.len() {
        if value[i] == b'<' {
            if let Some(rel_end) = value[i + 1..].iter().position(|&b| b == b'>') {
                let end = i + 1 + rel_end;
                let inner = &value[i + 1..end];
                if inner.len() >= 4 {
                    result = Some(inner);
                }
                i = end + 1;
                continue;
            } else {
                break;
            }
        }
        i += 1;
    }
    result
}

/// Strips every occurrence of `[LISTNAME]` or `[LISTNAME] ` from `subject`,
/// matching `original_source/html.c`'s `while ((p = strchr(p, '[')))` loop
/// (spec.md §4.5, Open Question #3).
pub(crate) fn strip_list_prefix(subject: &str, list_name: &str) -> String {
    if list_name.is_empty() {
        return subject.to_string();
    }
    let mut out = String::with_capacity(subject.len());
    let bytes = subject.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            let rest = &subject[i + 1..];
            if rest.len() > list_name.len()
                && rest.is_char_boundary(list_name.len())
                && rest[..list_name.len()].eq_ignore_ascii_case(list_name)
                && rest.as_bytes()[list_name.len()] == b']'
            {
                let mut skip = 1 + list_name.len() + 1;
                if rest.as_bytes().get(list_name.len() + 1) == Some(&b' ') {
                    skip += 1;
                }
                i += skip;
                continue;
            }
        }
        let ch = subject[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Parses the date tail of a `"From "` separator line (format ` %a %b %d %T
/// %Y`), returning `(y, m, d)` relative to [`Config::min_year`]. Any parse
/// failure or out-of-[min_year,max_year] result yields the sentinel
/// `(0, 1, 1)` (spec.md §4.5).
fn parse_from_date(line: &[u8], config: &Config) -> (u8, u8, u8) {
    let text = String::from_utf8_lossy(line);
    let tokens: Vec<&str> = text.trim_end().split_whitespace().collect();
    if tokens.len() < 5 {
        return (0, 1, 1);
    }
    let n = tokens.len();
    let year_tok = tokens[n - 1];
    let time_tok = tokens[n - 2];
    let day_tok = tokens[n - 3];
    let month_tok = tokens[n - 4];

    let month = month_from_name(month_tok);
    let day: Option<u32> = day_tok.parse().ok();
    let year: Option<i32> = year_tok.parse().ok();
    let time_ok = time_tok.splitn(3, ':').count() == 3;

    match (month, day, year) {
        (Some(m), Some(d), Some(y)) if time_ok && (1..=31).contains(&d) => {
            if y < config.min_year || y > config.max_year {
                (0, 1, 1)
            } else {
                ((y - config.min_year) as u8, m, d as u8)
            }
        }
        _ => (0, 1, 1),
    }
}

fn month_from_name(name: &str) -> Option<u8> {
    if name.len() < 3 {
        return None;
    }
    let lower = name[..3].to_ascii_lowercase();
    const NAMES: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    NAMES.iter().position(|&m| m == lower).map(|i| i as u8 + 1)
}

/// Sorts the record array by `(y, m, d)` (spec.md §3 invariant 3, §4.5
/// "records may be out of chronological order"). Stable so that messages
/// sharing a day keep their parse order, which determines their within-day
/// ordinal.
pub fn sort_records(records: &mut [MessageRecord]) {
    records.sort_by_key(|r| (r.y, r.m, r.d));
}

/// Builds the per-day slot array from a sorted record array (spec.md §4.5
/// "Per-day slot construction", §3 encoding).
pub fn build_slots(records: &[MessageRecord], config: &Config) -> Vec<i32> {
    let mut slots = vec![0i32; config.n_aday() as usize + 1];
    let mut i = 0;
    while i < records.len() {
        let r = &records[i];
        let aday = config.ymd_to_aday(r.y as i32, r.m, r.d) as usize;
        let day_start = i;
        while i < records.len() && (records[i].y, records[i].m, records[i].d) == (r.y, r.m, r.d) {
            i += 1;
        }
        let count = i - day_start;
        if aday < slots.len() {
            slots[aday] = (day_start + 1) as i32;
        }
        if aday + 1 < slots.len() {
            slots[aday + 1] = -(count as i32);
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn test_config() -> Config {
        Config {
            min_year: 2000,
            max_year: 2010,
            ..Config::default()
        }
    }

    #[test]
    fn s1_simple_message() {
        let mbox = b"From a@x Mon Jan 1 00:00:00 2001\nMessage-ID: <a@x1>\nSubject: hi\n\nhello\n";
        let config = test_config();
        let (records, eof) = parse(&mut Cursor::new(&mbox[..]), 0, &config, "list").unwrap();
        assert_eq!(eof, mbox.len() as u64);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!((r.y, r.m, r.d), (1, 1, 1));
        assert!(r.has_msgid());
        assert_eq!(digest::hash_id(b"a@x1"), r.msgid_hash);
        let (_, subject) = r.from_and_subject();
        assert_eq!(subject, "hi");
        // The body is not preceded by a blank line at EOF (no trailing blank
        // line after "hello\n"), so its bytes must not be dropped from `size`.
        assert_eq!(r.size, b"hello\n".len() as u64);
    }

    #[test]
    fn two_messages_split_correctly() {
        let mbox = b"From a@x Mon Jan 1 00:00:00 2001\nSubject: one\n\nbody one\n\nFrom b@x Tue Jan 2 00:00:00 2001\nSubject: two\n\nbody two\n";
        let config = test_config();
        let (records, _eof) = parse(&mut Cursor::new(&mbox[..]), 0, &config, "list").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].from_and_subject().1, "one");
        assert_eq!(records[1].from_and_subject().1, "two");
        assert_eq!((records[0].y, records[0].m, records[0].d), (1, 1, 1));
        assert_eq!((records[1].y, records[1].m, records[1].d), (1, 1, 2));
    }

    #[test]
    fn bad_date_falls_back_to_sentinel() {
        let mbox = b"From a@x garbage\nSubject: s\n\nb\n";
        let config = test_config();
        let (records, _) = parse(&mut Cursor::new(&mbox[..]), 0, &config, "list").unwrap();
        assert_eq!((records[0].y, records[0].m, records[0].d), (0, 1, 1));
    }

    #[test]
    fn out_of_range_year_falls_back_to_sentinel() {
        let mbox = b"From a@x Mon Jan 1 00:00:00 1970\nSubject: s\n\nb\n";
        let config = test_config(); // min_year 2000
        let (records, _) = parse(&mut Cursor::new(&mbox[..]), 0, &config, "list").unwrap();
        assert_eq!((records[0].y, records[0].m, records[0].d), (0, 1, 1));
    }

    #[test]
    fn strip_list_prefix_removes_all_occurrences() {
        assert_eq!(strip_list_prefix("[list] [list] hi", "list"), "hi");
        assert_eq!(strip_list_prefix("Re: [list] hi", "list"), "Re: hi");
        assert_eq!(strip_list_prefix("[other] hi", "list"), "[other] hi");
    }

    #[test]
    fn references_used_only_without_in_reply_to() {
        let mbox = b"From a@x Mon Jan 1 00:00:00 2001\nIn-Reply-To: <irt@x>\nReferences: <ref1@x> <ref2@x>\n\nb\n";
        let config = test_config();
        let (records, _) = parse(&mut Cursor::new(&mbox[..]), 0, &config, "list").unwrap();
        assert_eq!(records[0].irt_hash, digest::hash_id(b"irt@x"));

        let mbox2 = b"From a@x Mon Jan 1 00:00:00 2001\nReferences: <ref1@x> <ref2@x>\n\nb\n";
        let (records2, _) = parse(&mut Cursor::new(&mbox2[..]), 0, &config, "list").unwrap();
        assert_eq!(records2[0].irt_hash, digest::hash_id(b"ref2@x"));
    }

    #[test]
    fn slots_encode_first_ordinal_and_negated_count() {
        let mut records = vec![
            {
                let mut r = MessageRecord {
                    y: 0,
                    m: 1,
                    d: 1,
                    ..Default::default()
                };
                r.set_strings("a", "s1");
                r
            },
            {
                let mut r = MessageRecord {
                    y: 0,
                    m: 1,
                    d: 1,
                    ..Default::default()
                };
                r.set_strings("b", "s2");
                r
            },
            {
                let mut r = MessageRecord {
                    y: 0,
                    m: 1,
                    d: 2,
                    ..Default::default()
                };
                r.set_strings("c", "s3");
                r
            },
        ];
        sort_records(&mut records);
        let config = test_config();
        let slots = build_slots(&records, &config);
        let aday0 = config.ymd_to_aday(0, 1, 1) as usize;
        let aday1 = config.ymd_to_aday(0, 1, 2) as usize;
        assert_eq!(slots[aday0], 1);
        assert_eq!(slots[aday1], -2);
    }

    #[test]
    fn unchanged_message_flag_truncation_preserved() {
        let mut r = MessageRecord::default();
        r.set_strings("x".repeat(200).as_str(), "s");
        assert_ne!(r.flags & FLAG_FROM_TRUNC, 0);
    }
}
