//! `blists` indexes mbox-format mailing list archives and renders the
//! resulting threads as HTML.
//!
//! Two pipelines share a common on-disk index format (see [`index`]):
//!
//! - The indexer ([`mailbox::index_from`]) streams a mailbox without ever
//!   materializing a whole message in memory, extracts per-message metadata,
//!   and hands it to the thread linker ([`thread::link`]) before the result
//!   is flushed to disk.
//! - The renderer ([`render`]) opens that index, decodes the MIME structure
//!   of one message at a time ([`mime`]), and produces the HTML a web server
//!   would serve for a given `list/year/month/day/number` path.
//!
//! [`config::Config`] holds the handful of deployment knobs (spool
//! directory, safe-domain allowlist, footer text) both pipelines need;
//! [`error::BlistsError`] is the shared error taxonomy.

pub mod buffer;
pub mod config;
pub mod decoders;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod index;
pub mod lock;
pub mod mailbox;
pub mod mime;
pub mod render;
pub mod thread;

pub use config::Config;
pub use error::{BlistsError, Result};
