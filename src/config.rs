//! Compile-time-ish parameters, kept as a value so tests can override them
//! instead of relying on `#define`-style globals or global mutable flags.

use std::env;
use std::path::PathBuf;

pub const MIN_YEAR_DEFAULT: i32 = 1970;
pub const MAX_YEAR_DEFAULT: i32 = 2038;

/// `Config` bundles the handful of limits and paths that the original C
/// sources hard-coded in `params.h`.
#[derive(Debug, Clone)]
pub struct Config {
    pub min_year: i32,
    pub max_year: i32,
    pub max_message_size: u64,
    pub max_with_attachment_size: u64,
    pub max_url_length: usize,
    pub max_mailbox_messages: usize,
    pub max_mailbox_bytes: u64,
    pub max_short_msg_list: usize,
    pub max_recent_msg_list: usize,
    pub spool_dir: PathBuf,
    pub safe_domains: Vec<String>,
    pub footer: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_year: MIN_YEAR_DEFAULT,
            max_year: MAX_YEAR_DEFAULT,
            max_message_size: 1024 * 1024,
            max_with_attachment_size: 30 * 1024 * 1024,
            max_url_length: 1024,
            max_mailbox_messages: 100_000_000,
            max_mailbox_bytes: 100 * 1024 * 1024 * 1024,
            max_short_msg_list: 20,
            max_recent_msg_list: 20,
            spool_dir: env::var_os("BLISTS_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            safe_domains: env::var("BLISTS_SAFE_DOMAINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            footer: env::var("BLISTS_FOOTER").unwrap_or_default(),
        }
    }
}

impl Config {
    pub const N_MONTHS: i32 = 12;
    pub const N_DAYS: i32 = 31;

    /// `(MAX_YEAR - MIN_YEAR + 1) * 12 * 31`, the size of the per-day slot
    /// array minus the trailing terminator slot.
    pub fn n_aday(&self) -> i64 {
        (self.max_year - self.min_year + 1) as i64 * (Self::N_MONTHS * Self::N_DAYS) as i64
    }

    /// Absolute day number for a 0-based year offset and 1-based month/day.
    pub fn ymd_to_aday(&self, y0: i32, m: u8, d: u8) -> i64 {
        (y0 as i64 * Self::N_MONTHS as i64 + (m as i64 - 1)) * Self::N_DAYS as i64
            + (d as i64 - 1)
    }
}

/// Suffix appended to a mailbox filename to form its index file's name.
pub const INDEX_FILENAME_SUFFIX: &str = ".idx";

/// Minimum growth step and cap for `ByteBuffer`.
pub const BUFFER_GROW_STEP: usize = 0x8000;
pub const BUFFER_GROW_MAX: usize = 0x1000000;

/// Depth cap for nested multipart entities.
pub const MIME_DEPTH_MAX: usize = 10;

/// File buffer / line-tail buffer sizes for the streaming mbox parser.
pub const FILE_BUFFER_SIZE: usize = 0x10000;
pub const LINE_BUFFER_SIZE: usize = 0x1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_aday_matches_naive_calendar() {
        let c = Config::default();
        assert_eq!(c.n_aday(), (2038 - 1970 + 1) * 12 * 31);
    }

    #[test]
    fn ymd_to_aday_is_branch_free_naive() {
        let c = Config::default();
        assert_eq!(c.ymd_to_aday(0, 1, 1), 0);
        assert_eq!(c.ymd_to_aday(0, 2, 1), 31);
        assert_eq!(c.ymd_to_aday(1, 1, 1), 12 * 31);
    }
}
