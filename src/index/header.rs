//! The fixed 32-byte index header: magic tag, revision, year range, the host
//! endianness sentinel, and the resume offset. Grounded on
//! `original_source/index.c`'s `idx_check_header` / `idx_write_header` pair;
//! the padding fields exist only to round the header up to a 32-byte
//! boundary, matching the on-disk layout in spec.md §6.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::config::Config;
use crate::error::{BlistsError, Result};

pub const HEADER_SIZE: usize = 32;
pub const MAGIC: &[u8; 6] = b"blists";
pub const REVISION: u16 = 2;
pub const ENDIANNESS_SENTINEL: u16 = 0x1234;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub min_year: i16,
    pub max_year: i16,
    pub next_offset: u64,
}

impl Header {
    pub fn new(config: &Config, next_offset: u64) -> Self {
        Header {
            min_year: config.min_year as i16,
            max_year: config.max_year as i16,
            next_offset,
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..6].copy_from_slice(MAGIC);
        buf[6..8].copy_from_slice(&REVISION.to_ne_bytes());
        buf[8..10].copy_from_slice(&self.min_year.to_ne_bytes());
        buf[10..12].copy_from_slice(&self.max_year.to_ne_bytes());
        buf[12..14].copy_from_slice(&ENDIANNESS_SENTINEL.to_ne_bytes());
        // buf[14..16] left zeroed (pad)
        buf[16..24].copy_from_slice(&self.next_offset.to_ne_bytes());
        // buf[24..32] left zeroed (pad, rounds header to 32 bytes)
        buf
    }

    /// Validates a header against the configured year range; any mismatch
    /// (magic, revision, endianness or year range) is the "needs rebuild"
    /// signal of spec.md §4.3/§7.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE], config: &Config) -> Result<Self> {
        if &buf[0..6] != MAGIC {
            return Err(BlistsError::IndexNeedsRebuild);
        }
        let revision = u16::from_ne_bytes(buf[6..8].try_into().unwrap());
        let min_year = i16::from_ne_bytes(buf[8..10].try_into().unwrap());
        let max_year = i16::from_ne_bytes(buf[10..12].try_into().unwrap());
        let endianness = u16::from_ne_bytes(buf[12..14].try_into().unwrap());
        let next_offset = u64::from_ne_bytes(buf[16..24].try_into().unwrap());

        if revision != REVISION
            || endianness != ENDIANNESS_SENTINEL
            || min_year as i32 != config.min_year
            || max_year as i32 != config.max_year
        {
            return Err(BlistsError::IndexNeedsRebuild);
        }

        Ok(Header {
            min_year,
            max_year,
            next_offset,
        })
    }

    pub fn read_from<R: Read>(r: &mut R, config: &Config) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)
            .map_err(|_| BlistsError::IndexNeedsRebuild)?;
        Header::from_bytes(&buf, config)
    }

    pub fn write_to<W: Write + Seek>(self, w: &mut W) -> io::Result<()> {
        w.seek(SeekFrom::Start(0))?;
        w.write_all(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let config = Config::default();
        let h = Header::new(&config, 12345);
        let bytes = h.to_bytes();
        let back = Header::from_bytes(&bytes, &config).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn rejects_wrong_magic() {
        let config = Config::default();
        let mut bytes = Header::new(&config, 0).to_bytes();
        bytes[0] = b'x';
        assert!(matches!(
            Header::from_bytes(&bytes, &config),
            Err(BlistsError::IndexNeedsRebuild)
        ));
    }

    #[test]
    fn rejects_year_range_mismatch() {
        let config = Config::default();
        let bytes = Header::new(&config, 0).to_bytes();
        let mut other = config.clone();
        other.min_year += 1;
        assert!(matches!(
            Header::from_bytes(&bytes, &other),
            Err(BlistsError::IndexNeedsRebuild)
        ));
    }
}
