//! Error taxonomy shared by the indexer and the renderer.
//!
//! Covers input validation, not-found, stale/corrupt index, I/O failure and
//! resource exhaustion. Non-fatal parse anomalies are handled inline by
//! falling back to a literal or U+FFFD rather than surfacing here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the indexing and rendering pipelines.
#[derive(Debug, Error)]
pub enum BlistsError {
    #[error("invalid date or message number")]
    InvalidParams,

    #[error("no such mailing list")]
    NoSuchList,

    #[error("index needs rebuild")]
    IndexNeedsRebuild,

    #[error("no such message")]
    NoSuchMessage,

    #[error("no messages for this day")]
    NoMessagesForDay,

    #[error("no messages for this month")]
    NoMessagesForMonth,

    #[error("index error")]
    IndexReadError,

    #[error("attachment not found")]
    AttachmentNotFound,

    #[error("attachment is truncated")]
    AttachmentTruncated,

    #[error("index is corrupt")]
    IndexCorrupt,

    #[error("mailbox open error")]
    MailboxOpen(#[source] io::Error),

    #[error("mailbox read error")]
    MailboxRead(#[source] io::Error),

    #[error("mailbox exceeds the configured size limit ({0} bytes)")]
    MailboxTooLarge(u64),

    #[error("too many messages in mailbox (limit is {0})")]
    TooManyMessages(usize),

    #[error("buffer exceeded the growth cap")]
    BufferOverflow,

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("internal server error")]
    Internal,
}

impl BlistsError {
    /// The user-visible message for each distinct failure ("Invalid date or
    /// message number", "No such mailing list", ...). Returns `None` for
    /// errors that should be reported as a generic failure, mirroring
    /// `html_error(NULL)` in the original renderer.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            BlistsError::InvalidParams => Some("Invalid date or message number"),
            BlistsError::NoSuchList => Some("No such mailing list"),
            BlistsError::IndexNeedsRebuild => Some("Index needs rebuild"),
            BlistsError::NoSuchMessage => Some("No such message"),
            BlistsError::NoMessagesForDay => Some("No messages for this day"),
            BlistsError::NoMessagesForMonth => Some("No messages for this month"),
            BlistsError::IndexReadError => Some("Index error"),
            BlistsError::AttachmentNotFound => Some("Attachment not found"),
            BlistsError::AttachmentTruncated => Some("Attachment is truncated"),
            BlistsError::IndexCorrupt => Some("Index corrupt"),
            BlistsError::MailboxOpen(_) => Some("mbox open error"),
            BlistsError::MailboxRead(_) => Some("mbox read error"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BlistsError>;
