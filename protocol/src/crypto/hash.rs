//! # Hashing Utilities
//!
//! Two hash functions, each with a fixed job:
//!
//! - **SHA-256**: the structured-message digest `H` used for signing loan
//!   terms and collateral permits. Signers outside this codebase must
//!   reproduce it byte-for-byte, so it stays on the boring, universally
//!   available choice.
//! - **BLAKE3**: address derivation and anything internal where nobody
//!   else needs to agree with us on the bytes.

use sha2::{Digest, Sha256};

/// SHA-256 returning a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// SHA-256 over several slices fed sequentially, no concatenation buffer.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// BLAKE3 of the input.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 in `derive_key` mode.
///
/// Two different contexts never collide even on identical data, because the
/// context selects a different internal IV. Don't prepend tags by hand.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-2.
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_multi_matches_concatenation() {
        let joined = sha256(b"loanterms");
        let parts = sha256_multi(&[b"loan", b"terms"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn blake3_is_deterministic() {
        assert_eq!(blake3_hash(b"pledge"), blake3_hash(b"pledge"));
        assert_ne!(blake3_hash(b"pledge"), blake3_hash(b"pledgf"));
    }

    #[test]
    fn domain_separation_changes_output() {
        let a = domain_separated_hash("context-a", b"same bytes");
        let b = domain_separated_hash("context-b", b"same bytes");
        assert_ne!(a, b);
    }
}
