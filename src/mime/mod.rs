//! MIME decoding (spec.md §4.4): header folding/RFC 2047 in [`header`], the
//! entity stack and multipart walker in [`body`]. [`TopLevelHeaders`] pulls
//! out the handful of headers the renderer shows above the body (spec.md
//! §4.7 step 6) without requiring callers to drive the full entity stack
//! themselves.

pub mod body;
pub mod header;

pub use body::{Entity, MimeCursor};

/// The message-level headers the renderer displays (spec.md §4.7 step 6:
/// "pull out Date/From/To/Cc/Subject headers (mime-decoded)").
#[derive(Debug, Clone, Default)]
pub struct TopLevelHeaders {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub subject: Option<String>,
}

/// Reads headers off the front of `msg` (without consuming the cursor's
/// entity stack state beyond header parsing) and returns both the decoded
/// top-level headers and the offset where the body begins.
pub fn read_top_level(msg: &[u8]) -> (TopLevelHeaders, MimeCursor<'_>) {
    let mut cursor = MimeCursor::new(msg);
    let mut headers = TopLevelHeaders::default();
    while let Some((name, value)) = cursor.decode_header() {
        match name.as_str() {
            "date" => headers.date = Some(value),
            "from" => headers.from = Some(value),
            "to" => headers.to = Some(value),
            "cc" => headers.cc = Some(value),
            "subject" => headers.subject = Some(value),
            _ => {}
        }
    }
    cursor.next_body();
    (headers, cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_top_level_headers() {
        let msg = b"Date: Mon, 1 Jan 2001 00:00:00 +0000\nFrom: a@x\nSubject: hi\n\nbody text";
        let (headers, cursor) = read_top_level(msg);
        assert_eq!(headers.from.as_deref(), Some("a@x"));
        assert_eq!(headers.subject.as_deref(), Some("hi"));
        assert_eq!(&msg[cursor.pos()..], b"body text");
    }
}
