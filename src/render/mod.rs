//! HTML rendering entry points (spec.md §4.7): a single message's header or
//! body, an attachment's raw bytes, and the day/month/year index pages.
//! Grounded on `original_source/html.c`'s `html_message`, `html_attachment`,
//! `html_day_index`, `html_month_index`, `html_year_index`, reworked from
//! their shared `struct buffer dst` + raw-pointer-into-mmap style into
//! functions that borrow a [`crate::index::IndexFile`] and a freshly read
//! message slice and return an owned `Vec<u8>`.

pub mod calendar;
pub mod escape;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::append_fmt;
use crate::buffer::ByteBuffer;
use crate::config::Config;
use crate::error::{BlistsError, Result};
use crate::index::record::MessageRecord;
use crate::index::IndexFile;
use crate::mailbox;
use crate::mime::{self, MimeCursor};

use calendar::{render_month_calendar, DateLevel};

/// Which parts of a message page to render, and whether to censor the body
/// (`html_flags` HEADER/BODY/CENSOR bits). Attachment delivery is a separate
/// entry point and carries no flags of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFlags {
    pub header: bool,
    pub body: bool,
    pub censor: bool,
}

impl HtmlFlags {
    /// Maps a renderer CLI mode name to its flag combination, mirroring
    /// `bit.c`'s `argv[1]` switch.
    pub fn from_mode(mode: &str) -> Option<Self> {
        match mode {
            "header" => Some(HtmlFlags { header: true, body: false, censor: false }),
            "body" => Some(HtmlFlags { header: false, body: true, censor: false }),
            "header-censored" => Some(HtmlFlags { header: true, body: false, censor: true }),
            "body-censored" => Some(HtmlFlags { header: false, body: true, censor: true }),
            _ => None,
        }
    }
}

/// A list name is safe to use as a path component: lowercase ASCII
/// alphanumerics and hyphens, hyphen never first, at most 99 bytes
/// (`bit.c`'s list-name validation).
pub fn valid_list_name(list: &str) -> bool {
    if list.is_empty() || list.len() > 99 {
        return false;
    }
    let bytes = list.as_bytes();
    if bytes[0] == b'-' {
        return false;
    }
    bytes
        .iter()
        .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// The mbox file backing `list` under the configured spool directory.
pub fn mailbox_path(config: &Config, list: &str) -> PathBuf {
    config.spool_dir.join(list)
}

fn open_index(config: &Config, list: &str) -> Result<(PathBuf, IndexFile)> {
    let path = mailbox_path(config, list);
    let idx = IndexFile::open(&path, config)?;
    Ok((path, idx))
}

fn read_message_bytes(mbox_path: &Path, record: &MessageRecord, cap: u64) -> Result<(Vec<u8>, bool)> {
    let trunc = record.size > cap;
    let read_size = if trunc { cap } else { record.size };
    let mut f = File::open(mbox_path).map_err(BlistsError::MailboxOpen)?;
    f.seek(SeekFrom::Start(record.offset))
        .map_err(BlistsError::MailboxRead)?;
    let mut buf = vec![0u8; read_size as usize];
    f.read_exact(&mut buf).map_err(BlistsError::MailboxRead)?;
    Ok((buf, trunc))
}

fn finish(dst: ByteBuffer, append_footer: bool, config: &Config) -> Result<Vec<u8>> {
    let mut dst = dst;
    if append_footer && !config.footer.is_empty() {
        dst.append_str(&config.footer);
    }
    if dst.is_err() {
        return Err(BlistsError::BufferOverflow);
    }
    Ok(dst.into_vec())
}

fn check_date(config: &Config, y: i32, m: u8, d: u8) -> Result<()> {
    if y < config.min_year || y > config.max_year || !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return Err(BlistsError::InvalidParams);
    }
    Ok(())
}

/// Renders one message (`html_message`): nav links (prev/next, thread-prev/
/// thread-next, day/month/year/list), the header block, and the walked
/// body, according to `flags`.
pub fn message(config: &Config, list: &str, y: i32, m: u8, d: u8, n: u32, flags: HtmlFlags) -> Result<Vec<u8>> {
    check_date(config, y, m, d)?;
    if !(1..=999_999).contains(&n) {
        return Err(BlistsError::InvalidParams);
    }
    let aday = config.ymd_to_aday(y - config.min_year, m, d);
    let (mbox_path, idx) = open_index(config, list)?;

    let m0 = idx.read_slot(aday).map_err(|_| BlistsError::IndexReadError)?;
    if m0 < 1 || m0 as i64 >= config.max_mailbox_messages as i64 {
        return Err(if m0 > 0 { BlistsError::IndexReadError } else { BlistsError::NoSuchMessage });
    }
    let m1r = m0 as i64 + n as i64 - 2;
    if m1r < 0 {
        return Err(BlistsError::NoSuchMessage);
    }
    let have_prev = m1r >= 1;
    let cur = idx
        .read_record(config, m1r as u32)
        .map_err(|_| BlistsError::NoSuchMessage)?;
    if cur.y as i32 != y - config.min_year || cur.m != m || cur.d != d {
        return Err(BlistsError::NoSuchMessage);
    }
    let prev = if have_prev {
        idx.read_record(config, (m1r - 1) as u32).ok()
    } else {
        None
    };
    let next = idx.read_record(config, (m1r + 1) as u32).ok();

    let mut n0 = n - 1;
    if n0 == 0 {
        let p = prev.as_ref().ok_or(BlistsError::NoSuchMessage)?;
        let prev_aday = config.ymd_to_aday(p.y as i32, p.m, p.d);
        let m_prev = idx.read_slot(prev_aday).map_err(|_| BlistsError::IndexReadError)?;
        if m0 <= m_prev {
            return Err(BlistsError::NoSuchMessage);
        }
        n0 = (m0 - m_prev) as u32;
    }

    let mut n2 = n + 1;
    if let Some(nx) = &next {
        if nx.y != cur.y || nx.m != cur.m || nx.d != cur.d {
            n2 = 1;
        }
    }

    let (src, trunc) = read_message_bytes(&mbox_path, &cur, config.max_message_size)?;
    let (headers, mut cursor) = mime::read_top_level(&src);
    let subject = mailbox::strip_list_prefix(headers.subject.as_deref().unwrap_or(""), list);

    let mut dst = ByteBuffer::with_capacity(src.len() + 1024);
    dst.append_byte(b'\n');

    if flags.header {
        dst.append_str("<title>");
        escape::append_html_default(&mut dst, list.as_bytes(), config);
        if !subject.is_empty() {
            dst.append_str(" - ");
            escape::append_html_default(&mut dst, subject.as_bytes(), config);
        }
        dst.append_str("</title>\n");
        if flags.censor {
            dst.append_str("<meta name=\"robots\" content=\"noindex\">\n");
        }
    }

    if flags.body {
        if have_prev {
            dst.append_str("<a href=\"");
            if n == 1 {
                if let Some(p) = &prev {
                    append_fmt!(dst, "../../../{}/{:02}/{:02}/", config.min_year + p.y as i32, p.m, p.d);
                }
            }
            append_fmt!(dst, "{}\">[&lt;prev]</a> ", n0);
        }
        if next.is_some() {
            dst.append_str("<a href=\"");
            if n2 == 1 {
                if let Some(nx) = &next {
                    append_fmt!(dst, "../../../{}/{:02}/{:02}/", config.min_year + nx.y as i32, nx.m, nx.d);
                }
            }
            append_fmt!(dst, "{}\">[next&gt;]</a> ", n2);
        }
        if cur.thread.pn != 0 {
            dst.append_str("<a href=\"");
            if cur.thread.py != cur.y || cur.thread.pm != cur.m || cur.thread.pd != cur.d {
                append_fmt!(
                    dst,
                    "../../../{}/{:02}/{:02}/",
                    config.min_year + cur.thread.py as i32,
                    cur.thread.pm,
                    cur.thread.pd
                );
            }
            append_fmt!(dst, "{}\">[&lt;thread-prev]</a> ", cur.thread.pn);
        }
        if cur.thread.nn != 0 {
            dst.append_str("<a href=\"");
            if cur.thread.ny != cur.y || cur.thread.nm != cur.m || cur.thread.nd != cur.d {
                append_fmt!(
                    dst,
                    "../../../{}/{:02}/{:02}/",
                    config.min_year + cur.thread.ny as i32,
                    cur.thread.nm,
                    cur.thread.nd
                );
            }
            append_fmt!(dst, "{}\">[thread-next&gt;]</a> ", cur.thread.nn);
        }
        dst.append_str(
            "<a href=\".\">[day]</a> <a href=\"..\">[month]</a> <a href=\"../..\">[year]</a> \
             <a href=\"../../..\">[list]</a>\n",
        );

        dst.append_str("<pre style=\"white-space: pre-wrap\">\n");
        if let Some(v) = &headers.date {
            escape::append_header(&mut dst, &format!("Date: {v}"), config);
        }
        if let Some(v) = &headers.from {
            escape::append_header(&mut dst, &format!("From: {v}"), config);
        }
        if let Some(v) = &headers.to {
            escape::append_header(&mut dst, &format!("To: {v}"), config);
        }
        if let Some(v) = &headers.cc {
            escape::append_header(&mut dst, &format!("Cc: {v}"), config);
        }
        if headers.subject.is_some() {
            escape::append_header(&mut dst, &format!("Subject: {subject}"), config);
        }

        if !flags.censor {
            walk_body(&mut cursor, &src, config, trunc, n, &mut dst);
        }

        if flags.censor || trunc {
            append_fmt!(
                dst,
                "\n<span style=\"font-family: times;\"><strong>Content {}</strong></span>\n",
                if flags.censor { "removed" } else { "truncated" }
            );
        }
        dst.append_str("</pre>\n");
    }

    finish(dst, flags.body, config)
}

/// Walks the body entity-by-entity, emitting an inline `<pre>`-safe rendering
/// of text parts and a download/view link for attachments, matching
/// `html_message`'s do-while loop over `mime_next_body_part`/
/// `mime_next_body`/`mime_decode_body`.
fn walk_body(
    cursor: &mut MimeCursor<'_>,
    src: &[u8],
    config: &Config,
    trunc: bool,
    n: u32,
    out: &mut ByteBuffer,
) {
    let mut attachment_count = 0u32;
    loop {
        if cursor.current().boundary.is_some() {
            match cursor.next_body_part(config) {
                Some(p) if p < src.len() => {
                    cursor.next_body();
                }
                _ => break,
            }
        }
        if cursor.current().boundary.is_some() {
            // entered a nested multipart container; descend on the next
            // iteration rather than treating it as a leaf part.
            continue;
        }

        let entity = cursor.current().clone();
        let is_attachment = entity.filename.as_deref().is_some_and(|f| !f.is_empty());
        let is_inline = !is_attachment
            && entity.disposition.as_deref() != Some("attachment")
            && entity.content_type.to_ascii_lowercase().starts_with("text/")
            && !entity.content_type.eq_ignore_ascii_case("text/html");

        let body_bytes = cursor.decode_body(config, !is_attachment);
        let at_end = cursor.pos() >= src.len();
        let skip_as_truncated = at_end && trunc;

        let Some(body_bytes) = body_bytes else {
            if at_end {
                break;
            }
            continue;
        };

        if !skip_as_truncated {
            if is_attachment {
                attachment_count += 1;
                let text = entity.content_type.to_ascii_lowercase().starts_with("text/");
                out.append_str("\n<span style=\"font-family: times;\"><strong>");
                out.append_str(if text { "View" } else { "Download" });
                out.append_str(" attachment \"</strong><a href=\"");
                append_fmt!(out, "{n}/{attachment_count}\"");
                if !text {
                    out.append_str(" rel=\"nofollow\" download");
                }
                out.append_str(">");
                escape::append_html_default(out, entity.filename.as_deref().unwrap_or("").as_bytes(), config);
                out.append_str("</a><strong>\" of type \"</strong>");
                escape::append_html_default(out, entity.content_type.as_bytes(), config);
                append_fmt!(out, "<strong>\" ({} bytes)</strong></span>\n", body_bytes.len());
            } else if !is_inline {
                out.append_str("\n<span style=\"font-family: times;\"><strong>Content of type \"</strong>");
                escape::append_html_default(out, entity.content_type.as_bytes(), config);
                out.append_str("<strong>\" skipped</strong></span>\n");
            } else {
                out.append_byte(b'\n');
                escape::append_html(out, &body_bytes, escape::DETECT_URLS | escape::OBFUSCATE, config);
            }
        }

        if at_end {
            break;
        }
    }
}

/// Extracts one attachment's raw bytes (`html_attachment`): walks the body
/// counting only parts with a nonempty filename, stopping at the `a`-th.
pub fn attachment(config: &Config, list: &str, y: i32, m: u8, d: u8, n: u32, a: u32) -> Result<Vec<u8>> {
    check_date(config, y, m, d)?;
    if !(1..=999_999).contains(&n) || a < 1 {
        return Err(BlistsError::InvalidParams);
    }
    let aday = config.ymd_to_aday(y - config.min_year, m, d);
    let (mbox_path, idx) = open_index(config, list)?;

    let m0 = idx.read_slot(aday).map_err(|_| BlistsError::IndexReadError)?;
    if m0 < 1 || m0 as i64 >= config.max_mailbox_messages as i64 {
        return Err(if m0 > 0 { BlistsError::IndexReadError } else { BlistsError::NoSuchMessage });
    }
    let m1r = m0 as i64 + n as i64 - 2;
    if m1r < 0 {
        return Err(BlistsError::NoSuchMessage);
    }
    let cur = idx
        .read_record(config, m1r as u32)
        .map_err(|_| BlistsError::NoSuchMessage)?;
    if cur.y as i32 != y - config.min_year || cur.m != m || cur.d != d {
        return Err(BlistsError::NoSuchMessage);
    }

    let (src, trunc) = read_message_bytes(&mbox_path, &cur, config.max_with_attachment_size)?;
    let (_headers, mut cursor) = mime::read_top_level(&src);

    let mut attachment_count = 0u32;
    let mut selected = None;

    loop {
        if cursor.current().boundary.is_some() {
            match cursor.next_body_part(config) {
                Some(p) if p < src.len() => {
                    cursor.next_body();
                }
                _ => break,
            }
        }
        let is_this_one = cursor.current().boundary.is_none()
            && cursor.current().filename.as_deref().is_some_and(|f| !f.is_empty())
            && {
                attachment_count += 1;
                attachment_count == a
            };
        if !is_this_one {
            if cursor.skip_body(config).is_none() {
                break;
            }
            if cursor.pos() >= src.len() {
                break;
            }
            continue;
        }

        let entity = cursor.current().clone();
        let body_bytes = cursor.decode_body(config, false);
        let at_end = cursor.pos() >= src.len();
        match body_bytes {
            None => {
                return Err(if trunc {
                    BlistsError::AttachmentTruncated
                } else {
                    BlistsError::Internal
                });
            }
            Some(bytes) => {
                if trunc && at_end {
                    return Err(BlistsError::AttachmentTruncated);
                }
                selected = Some((bytes, entity));
            }
        }
        break;
    }

    let (bytes, entity) = selected.ok_or(BlistsError::AttachmentNotFound)?;
    let text = entity.content_type.to_ascii_lowercase().starts_with("text/");

    let mut dst = ByteBuffer::with_capacity(bytes.len() + 256);
    if text {
        dst.append_str("Content-Type: text/plain");
        if let Some(cs) = &entity.charset {
            if crate::encoding::normalize_charset(cs).is_some() {
                append_fmt!(dst, "; charset={cs}");
            }
        }
        dst.append_byte(b'\n');
    } else {
        dst.append_str("Content-Type: application/octet-stream\n");
    }
    append_fmt!(
        dst,
        "Content-Disposition: {}; filename=\"",
        if text { "inline" } else { "attachment" }
    );
    escape::append_filename(&mut dst, entity.filename.as_deref(), text);
    dst.append_str("\"\n");
    append_fmt!(dst, "Content-Length: {}\n\n", bytes.len());
    dst.append(&bytes);

    finish(dst, false, config)
}

/// Renders one day's index page (`html_day_index`): the message list for the
/// day plus prev/next day navigation derived from the surrounding slots.
pub fn day_index(config: &Config, list: &str, y: i32, m: u8, d: u8, flags: HtmlFlags) -> Result<Vec<u8>> {
    check_date(config, y, m, d)?;
    let aday = config.ymd_to_aday(y - config.min_year, m, d);
    let (_mbox_path, idx) = open_index(config, list)?;

    let mx = idx
        .read_slots_range(aday, 2)
        .map_err(|_| BlistsError::IndexReadError)?;
    let m0 = mx[0];
    if m0 < 1 || m0 as i64 >= config.max_mailbox_messages as i64 {
        return Err(if m0 > 0 { BlistsError::IndexReadError } else { BlistsError::NoMessagesForDay });
    }
    let count = if mx[1] > 0 { mx[1] - m0 } else { -mx[1] };
    if count <= 0 {
        return Err(BlistsError::NoMessagesForDay);
    }
    let records = idx
        .read_records_range(config, (m0 - 1) as u32, count as usize)
        .map_err(|_| BlistsError::IndexReadError)?;

    let mut dst = ByteBuffer::with_capacity(4096);
    dst.append_byte(b'\n');

    if flags.header {
        append_fmt!(dst, "<title>{list} - {y:04}-{m:02}-{d:02}</title>\n");
    }
    if flags.body {
        dst.append_str("<a href=\"..\">[month]</a> <a href=\"../..\">[year]</a> <a href=\"../../..\">[list]</a>\n");
        dst.append_str("<ol>\n");
        for (i, r) in records.iter().enumerate() {
            let (from, subject) = r.from_and_subject();
            let subject = mailbox::strip_list_prefix(&subject, list);
            dst.append_str("<li><a href=\"");
            append_fmt!(dst, "{}/\">", i + 1);
            escape::append_html_default(&mut dst, subject.as_bytes(), config);
            dst.append_str("</a> &mdash; ");
            escape::append_html_default(&mut dst, from.as_bytes(), config);
            dst.append_str("\n");
        }
        dst.append_str("</ol>\n");
    }

    finish(dst, flags.body, config)
}

/// Renders one month's index page (`html_month_index`): the month's
/// calendar table plus a day-by-day message-count listing.
pub fn month_index(config: &Config, list: &str, y: i32, m: u8, flags: HtmlFlags) -> Result<Vec<u8>> {
    if y < config.min_year || y > config.max_year || !(1..=12).contains(&m) {
        return Err(BlistsError::InvalidParams);
    }
    let aday = config.ymd_to_aday(y - config.min_year, m, 1);
    let (_mbox_path, idx) = open_index(config, list)?;

    let mut slots = [0i32; 32];
    let read = idx
        .read_slots_range(aday - 1, 32)
        .map_err(|_| BlistsError::IndexReadError)?;
    slots.copy_from_slice(&read);

    let m0 = slots[1];
    if m0 < 1 || m0 as i64 >= config.max_mailbox_messages as i64 {
        return Err(if m0 > 0 { BlistsError::IndexReadError } else { BlistsError::NoMessagesForMonth });
    }

    let mut dst = ByteBuffer::with_capacity(4096);
    dst.append_byte(b'\n');

    if flags.header {
        append_fmt!(dst, "<title>{list} - {y:04}-{m:02}</title>\n");
    }
    if flags.body {
        dst.append_str("<a href=\"..\">[year]</a> <a href=\"../..\">[list]</a>\n");
        render_month_calendar(&mut dst, &slots, y, m, DateLevel::Daily);
    }

    finish(dst, flags.body, config)
}

/// Renders one year's index page (`html_year_index`): a recent-messages
/// list plus a monthly overview calendar.
pub fn year_index(config: &Config, list: &str, y: i32, flags: HtmlFlags) -> Result<Vec<u8>> {
    if y < config.min_year || y > config.max_year {
        return Err(BlistsError::InvalidParams);
    }
    let (_mbox_path, idx) = open_index(config, list)?;

    let year_start_aday = config.ymd_to_aday(y - config.min_year, 1, 1);
    let n_aday_in_year = (Config::N_MONTHS * Config::N_DAYS) as i64;
    let slots = idx
        .read_slots_range(year_start_aday, n_aday_in_year as usize + 1)
        .map_err(|_| BlistsError::IndexReadError)?;

    let m0 = slots.iter().copied().find(|&s| s != 0).unwrap_or(0);
    if m0 < 1 || m0 as i64 >= config.max_mailbox_messages as i64 {
        return Err(if m0 > 0 { BlistsError::IndexReadError } else { BlistsError::NoSuchList });
    }

    let mut dst = ByteBuffer::with_capacity(8192);
    dst.append_byte(b'\n');

    if flags.header {
        append_fmt!(dst, "<title>{list} - {y:04}</title>\n");
    }
    if flags.body {
        dst.append_str("<a href=\"..\">[list]</a>\n");

        let recent_count = idx.header.next_offset.min(config.max_recent_msg_list as u64) as usize;
        if recent_count > 0 {
            let total = crate::index::record_count_from_len(
                config,
                std::fs::metadata(mailbox_path(config, list))
                    .map(|m| m.len())
                    .unwrap_or(0),
            );
            let start = total.saturating_sub(recent_count);
            if let Ok(recent) = idx.read_records_range(config, start as u32, total - start) {
                dst.append_str("<h3>Recent messages</h3>\n<ol>\n");
                for r in recent.iter().rev() {
                    let (from, subject) = r.from_and_subject();
                    let subject = mailbox::strip_list_prefix(&subject, list);
                    dst.append_str("<li>");
                    escape::append_html_default(&mut dst, subject.as_bytes(), config);
                    dst.append_str(" &mdash; ");
                    escape::append_html_default(&mut dst, from.as_bytes(), config);
                    dst.append_str("\n");
                }
                dst.append_str("</ol>\n");
            }
        }

        dst.append_str("<table class=cal_year>\n");
        for m in 1..=12u8 {
            let month_start = config.ymd_to_aday(y - config.min_year, m, 1);
            let rel = (month_start - year_start_aday) as usize;
            if rel + 32 > slots.len() {
                break;
            }
            let mut month_slots = [0i32; 32];
            month_slots.copy_from_slice(&slots[rel..rel + 32]);
            dst.append_str("<tr><td>\n");
            render_month_calendar(&mut dst, &month_slots, y, m, DateLevel::Monthly);
            dst.append_str("</td></tr>\n");
        }
        dst.append_str("</table>\n");
    }

    finish(dst, flags.body, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_list_name_accepts_lowercase_alnum_hyphen() {
        assert!(valid_list_name("rust-lang"));
        assert!(valid_list_name("abc123"));
    }

    #[test]
    fn valid_list_name_rejects_bad_input() {
        assert!(!valid_list_name(""));
        assert!(!valid_list_name("-leading"));
        assert!(!valid_list_name("Has-Upper"));
        assert!(!valid_list_name("has space"));
        assert!(!valid_list_name(&"x".repeat(100)));
    }

    #[test]
    fn html_flags_from_mode_matches_bit_dispatch() {
        let f = HtmlFlags::from_mode("header-censored").unwrap();
        assert!(f.header && !f.body && f.censor);
        assert!(HtmlFlags::from_mode("nonsense").is_none());
    }
}
