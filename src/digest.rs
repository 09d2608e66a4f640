//! The "128-bit content digest" spec.md abstracts away as an external
//! collaborator (historically MD5). Message-ID and In-Reply-To/References
//! tokens are hashed into a fixed 16-byte array used as the index record's
//! `msgid_hash`/`irt_hash` and as the thread linker's hash-table key.

use md5::{Digest, Md5};

pub type Hash = [u8; 16];

/// Hashes the stripped content of an angle-bracketed id token (the bytes
/// between `<` and `>`, already extracted by the caller).
pub fn hash_id(bytes: &[u8]) -> Hash {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// The hash-table bucket for the thread linker: the first two bytes of the
/// digest, per spec.md §4.6 ("Allocate a 65536-bucket hash table keyed by the
/// first two bytes of the Message-ID digest").
pub fn bucket_of(hash: &Hash) -> u16 {
    u16::from_be_bytes([hash[0], hash[1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_id(b"a@x"), hash_id(b"a@x"));
        assert_ne!(hash_id(b"a@x"), hash_id(b"b@x"));
    }

    #[test]
    fn bucket_uses_leading_bytes() {
        let h: Hash = [0x12, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(bucket_of(&h), 0x1234);
    }
}
