//! Entity stack and multipart body walker (spec.md §4.4 "Body walking").
//! Grounded on `original_source/mime.c`'s `mime_entity`/`mime_ctx`,
//! `process_header`, `find_next_boundary`, `mime_next_body_part`,
//! `mime_next_body`, `mime_skip_body`, `mime_decode_body` — reworked from a
//! pointer-walking linked list over a mutated shared buffer into a `Vec`-
//! backed stack of owned entities walking an immutable `&[u8]` message.

use crate::buffer::ByteBuffer;
use crate::config::Config;
use crate::decoders::base64::decode_base64;
use crate::decoders::quoted_printable::quoted_printable_decode;
use crate::encoding;
use crate::mime::header::{decode_text, next_header, split_header};

/// One entry in the entity stack: the content-type/boundary/encoding/
/// charset/filename/disposition currently in effect for a nested multipart
/// level (spec.md §4.4, §9 "Linked list of MIME entities... model as a stack
/// with each entity owning its copied strings").
#[derive(Debug, Clone)]
pub struct Entity {
    pub content_type: String,
    pub boundary: Option<String>,
    pub encoding: Option<String>,
    pub charset: Option<String>,
    pub name: Option<String>,
    pub filename: Option<String>,
    pub disposition: Option<String>,
}

impl Default for Entity {
    fn default() -> Self {
        Entity {
            content_type: "text/plain".to_string(),
            boundary: None,
            encoding: None,
            charset: None,
            name: None,
            filename: None,
            disposition: None,
        }
    }
}

impl Entity {
    pub fn is_multipart(&self) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .starts_with("multipart/")
    }
}

/// A cursor walking a whole in-memory message (headers + body), carrying the
/// bounded entity stack. Used only at render time, where the selected
/// message has already been read into memory (spec.md §4.7 step 5).
pub struct MimeCursor<'a> {
    src: &'a [u8],
    pos: usize,
    entities: Vec<Entity>,
    pub error: bool,
}

impl<'a> MimeCursor<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        MimeCursor {
            src,
            pos: 0,
            entities: vec![Entity::default()],
            error: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.entities.len()
    }

    pub fn current(&self) -> &Entity {
        self.entities.last().expect("entity stack never empty")
    }

    fn push_entity(&mut self, config: &Config) -> bool {
        if self.entities.len() >= config.mime_depth_max() {
            self.error = true;
            return false;
        }
        self.entities.push(Entity::default());
        true
    }

    fn pop_entities_to(&mut self, keep: usize) {
        self.entities.truncate(keep.max(1));
    }

    /// `mime_skip_header`: advances past one (possibly folded) header line,
    /// returning its raw bytes. `None` at a blank line (end of headers) or
    /// end of message.
    pub fn skip_header(&mut self) -> Option<&'a [u8]> {
        let (line, next) = next_header(self.src, self.pos)?;
        self.pos = next;
        Some(line)
    }

    /// `mime_decode_header` + `decode_header`: decodes the next header's
    /// value (RFC 2047 expansion) and, for `Content-Type:`/
    /// `Content-Disposition:`/`Content-Transfer-Encoding:`, updates the top
    /// of the entity stack. Returns `(lowercased name, decoded value)`.
    pub fn decode_header(&mut self) -> Option<(String, String)> {
        let line = self.skip_header()?;
        let (name, raw_value) = split_header(line)?;
        let decoded = decode_text(raw_value);

        match name.as_str() {
            "content-transfer-encoding" => {
                self.entities.last_mut().unwrap().encoding = Some(decoded.trim().to_lowercase());
            }
            "content-type" => {
                process_content_type(self.entities.last_mut().unwrap(), &decoded);
            }
            "content-disposition" => {
                process_content_disposition(self.entities.last_mut().unwrap(), &decoded);
            }
            _ => {}
        }
        Some((name, decoded))
    }

    /// `mime_next_body_part`: locates the next `--boundary` line belonging to
    /// any enclosing entity (non-consuming of the body it precedes). `pre`
    /// matches the C flag of the same name: when true, the cursor is left
    /// positioned just before the boundary line (used by `skip_body`); when
    /// false, positioned just after it, with a fresh entity pushed for the
    /// part that follows (used by `next_body_part`).
    fn find_next_boundary(&mut self, config: &Config, pre: bool) -> Option<usize> {
        if self.entities.is_empty() {
            return Some(self.src.len());
        }
        let end = self.src.len();
        let mut p = self.pos;
        loop {
            if end.saturating_sub(p) < 3 {
                break;
            }
            if self.src[p] == b'-' && self.src[p + 1] == b'-' {
                let after_dashes = p + 2;
                let mut idx = self.entities.len();
                while idx > 0 {
                    idx -= 1;
                    let boundary = match &self.entities[idx].boundary {
                        Some(b) => b.clone(),
                        None => {
                            self.error = true;
                            return None;
                        }
                    };
                    let blen = boundary.len();
                    if blen > end - after_dashes
                        || self.src[after_dashes..after_dashes + blen] != *boundary.as_bytes()
                    {
                        continue;
                    }
                    let after_boundary = after_dashes + blen;
                    let terminating = blen + 2 <= end - after_dashes
                        && self.src[after_boundary] == b'-'
                        && self.src[after_boundary + 1] == b'-';
                    if terminating {
                        self.pop_entities_to(idx);
                        if pre {
                            self.pos = p;
                            return Some(p);
                        }
                        if !self.entities.is_empty() && self.entities.len() > 1 {
                            break;
                        }
                        self.pos = end;
                        return Some(end);
                    }
                    self.pop_entities_to(idx + 1);
                    if pre {
                        self.pos = p;
                        return Some(p);
                    }
                    if !self.push_entity(config) {
                        return None;
                    }
                    self.pos = after_boundary.min(end);
                    if let Some(nl) = self.src[self.pos..end].iter().position(|&b| b == b'\n') {
                        self.pos += nl + 1;
                    } else {
                        self.pos = end;
                    }
                    return Some(self.pos);
                }
            }
            match self.src[p..end].iter().position(|&b| b == b'\n') {
                Some(rel) => p = p + rel + 1,
                None => break,
            }
        }
        Some(end)
    }

    /// `mime_next_body_part`: advance to and enter the next sibling/nested
    /// part, or `None` once the enclosing multipart has closed entirely.
    pub fn next_body_part(&mut self, config: &Config) -> Option<usize> {
        let before_depth = self.entities.len();
        let result = self.find_next_boundary(config, false)?;
        if result >= self.src.len() && self.entities.len() <= before_depth {
            return None;
        }
        Some(result)
    }

    /// `mime_next_body`: parses the current part's headers, returning the
    /// body start offset.
    pub fn next_body(&mut self) -> usize {
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'C' | b'c' => {
                    self.decode_header();
                    continue;
                }
                b'\n' => {
                    self.pos += 1;
                    return self.pos;
                }
                _ => {}
            }
            if self.skip_header().is_none() {
                break;
            }
        }
        self.pos
    }

    /// `mime_skip_body`: advances past the current body without decoding,
    /// returning the body's end offset.
    pub fn skip_body(&mut self, config: &Config) -> Option<usize> {
        if self.current().boundary.is_none() {
            let keep = self.entities.len().saturating_sub(1).max(1);
            self.pop_entities_to(keep);
        }
        self.find_next_boundary(config, true)
    }

    /// `mime_decode_body`: decodes the current body's transfer encoding and,
    /// if `recode` and a whitelisted non-UTF-8 charset is set, converts to
    /// UTF-8. Returns the decoded bytes (already UTF-8 when `recode`).
    pub fn decode_body(&mut self, config: &Config, recode: bool) -> Option<Vec<u8>> {
        let body_start = self.pos;
        let entity = self.current().clone();
        let body_end = self.skip_body(config)?;
        let raw = &self.src[body_start..body_end.min(self.src.len())];

        let transfer_decoded = match entity.encoding.as_deref() {
            Some("quoted-printable") => quoted_printable_decode(raw).unwrap_or_default(),
            Some("base64") => decode_base64(raw).unwrap_or_default(),
            _ => raw.to_vec(),
        };

        if !recode {
            return Some(transfer_decoded);
        }
        let mut out = ByteBuffer::with_capacity(transfer_decoded.len() + 16);
        let charset = entity.charset.as_deref().unwrap_or("us-ascii");
        encoding::to_utf8(&transfer_decoded, charset, &mut out);
        if out.is_err() {
            self.error = true;
            return None;
        }
        Some(out.into_vec())
    }

    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl Config {
    pub fn mime_depth_max(&self) -> usize {
        crate::config::MIME_DEPTH_MAX
    }
}

/// `process_header`'s `Content-Type:` branch: `type/subtype; attr=value;
/// ...`, pulling `boundary=` (multipart only) and `charset=`.
fn process_content_type(entity: &mut Entity, decoded: &str) {
    let mut parts = decoded.splitn(2, ';');
    let content_type = parts.next().unwrap_or("").trim().to_string();
    if !content_type.is_empty() {
        entity.content_type = content_type;
    }
    entity.boundary = None;
    let is_multipart = entity.is_multipart();
    let rest = parts.next().unwrap_or("");
    for (attr, value) in iter_attributes(rest) {
        match attr.to_ascii_lowercase().as_str() {
            "boundary" if is_multipart => entity.boundary = Some(value),
            "charset" => entity.charset = Some(value),
            "name" => entity.name = Some(value),
            _ => {}
        }
    }
}

/// `Content-Disposition: inline|attachment; filename="..."`.
fn process_content_disposition(entity: &mut Entity, decoded: &str) {
    let mut parts = decoded.splitn(2, ';');
    let disposition = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if !disposition.is_empty() {
        entity.disposition = Some(disposition);
    }
    let rest = parts.next().unwrap_or("");
    for (attr, value) in iter_attributes(rest) {
        if attr.eq_ignore_ascii_case("filename") {
            entity.filename = Some(value);
        }
    }
}

/// Iterates `attr=value` or `attr="value"` pairs separated by `;`.
fn iter_attributes(rest: &str) -> impl Iterator<Item = (String, String)> + '_ {
    rest.split(';').filter_map(|segment| {
        let segment = segment.trim();
        let eq = segment.find('=')?;
        let attr = segment[..eq].trim().to_string();
        let mut value = segment[eq + 1..].trim();
        if value.starts_with('"') {
            value = value.trim_start_matches('"');
            value = value.trim_end_matches('"');
        }
        Some((attr, value.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_text_body_decodes() {
        let config = Config::default();
        let msg = b"Content-Type: text/plain; charset=us-ascii\n\nhello world";
        let mut c = MimeCursor::new(msg);
        c.next_body();
        let body = c.decode_body(&config, true).unwrap();
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn quoted_printable_body_decodes() {
        let config = Config::default();
        let msg = b"Content-Type: text/plain\nContent-Transfer-Encoding: quoted-printable\n\nhi=20there";
        let mut c = MimeCursor::new(msg);
        c.next_body();
        let body = c.decode_body(&config, true).unwrap();
        assert_eq!(body, b"hi there");
    }

    #[test]
    fn multipart_walks_two_parts() {
        let config = Config::default();
        let msg = concat!(
            "Content-Type: multipart/mixed; boundary=XYZ\n",
            "\n",
            "--XYZ\n",
            "Content-Type: text/plain\n",
            "\n",
            "first part\n",
            "--XYZ\n",
            "Content-Type: text/plain\n",
            "\n",
            "second part\n",
            "--XYZ--\n",
        )
        .as_bytes();
        let mut c = MimeCursor::new(msg);
        c.next_body();
        assert!(c.current().is_multipart());

        assert!(c.next_body_part(&config).is_some());
        c.next_body();
        let first = c.decode_body(&config, true).unwrap();
        assert_eq!(String::from_utf8(first).unwrap().trim_end(), "first part");

        assert!(c.next_body_part(&config).is_some());
        c.next_body();
        let second = c.decode_body(&config, true).unwrap();
        assert_eq!(String::from_utf8(second).unwrap().trim_end(), "second part");
    }

    #[test]
    fn content_type_attributes_parsed() {
        let mut entity = Entity::default();
        process_content_type(
            &mut entity,
            "multipart/mixed; boundary=\"abc123\"; charset=utf-8",
        );
        assert_eq!(entity.content_type, "multipart/mixed");
        assert_eq!(entity.boundary.as_deref(), Some("abc123"));
        assert_eq!(entity.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn disposition_filename_parsed() {
        let mut entity = Entity::default();
        process_content_disposition(&mut entity, "attachment; filename=\"report.pdf\"");
        assert_eq!(entity.disposition.as_deref(), Some("attachment"));
        assert_eq!(entity.filename.as_deref(), Some("report.pdf"));
    }
}
