//! Object identifiers: 20-byte SHA-1 digests over the canonical
//! `"<type> <len>\0<payload>"` framing, printed as 40 lowercase hex chars.

use crate::error::{Error, Result};
use crate::object::ObjectKind;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::Read;

pub const ID_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId([u8; ID_LEN]);

impl ObjectId {
    pub const ZERO: ObjectId = ObjectId([0; ID_LEN]);

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        ObjectId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ID_LEN]
    }

    /// Parses a 40-hex-digit id, trimming ASCII whitespace first.
    /// Abbreviated ids are rejected with `UnsupportedOperation` rather than
    /// guessed at — this core never disambiguates a short prefix.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim_matches(|c: char| c.is_ascii_whitespace());
        if trimmed.len() != 40 {
            if trimmed.len() < 40 && trimmed.len() >= 4 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::UnsupportedOperation(
                    "abbreviated object ids are not supported".into(),
                ));
            }
            return Err(Error::InvalidLength);
        }
        let mut out = [0u8; ID_LEN];
        hex::decode_to_slice(trimmed, &mut out).map_err(|_| Error::InvalidHex)?;
        Ok(ObjectId(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The 7-character abbreviated form used for display only, e.g. in
    /// `ls-tree` output — never accepted back as input.
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// Computes `sha1("<kind> <len>\0<payload>")`.
pub fn compute_id(kind: ObjectKind, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(payload);
    ObjectId(hasher.finalize().into())
}

/// Streams `payload` through SHA-1 without buffering it, writing
/// `declared_size` into the header verbatim (it need not equal the number
/// of bytes actually read from `payload`; callers are responsible for that
/// invariant when it matters).
pub fn hash_stream<R: Read>(
    kind: ObjectKind,
    declared_size: u64,
    mut payload: R,
) -> Result<ObjectId> {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(declared_size.to_string().as_bytes());
    hasher.update(b"\0");
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = payload.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ObjectId(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_zero() {
        assert!(ObjectId::ZERO.is_zero());
        assert!(!ObjectId::parse("3b18e512dba79e4c8300dd08aeb37f8e728b8dad")
            .unwrap()
            .is_zero());
    }

    #[test]
    fn parse_requires_exactly_40_hex() {
        assert!(matches!(ObjectId::parse("abc"), Err(Error::InvalidLength)));
        assert!(matches!(
            ObjectId::parse("abcd1234"),
            Err(Error::UnsupportedOperation(_))
        ));
        assert!(matches!(
            ObjectId::parse(&"z".repeat(40)),
            Err(Error::InvalidHex)
        ));
    }

    #[test]
    fn parse_trims_whitespace() {
        let hex = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";
        let id = ObjectId::parse(&format!("  {hex}\n")).unwrap();
        assert_eq!(id.to_hex(), hex);
    }

    #[test]
    fn short_is_first_seven_hex_chars() {
        let id = ObjectId::parse("3b18e512dba79e4c8300dd08aeb37f8e728b8dad").unwrap();
        assert_eq!(id.short(), "3b18e51");
    }

    #[test]
    fn compute_id_matches_hash_stream() {
        let payload = b"hello world\n";
        let a = compute_id(ObjectKind::Blob, payload);
        let b = hash_stream(ObjectKind::Blob, payload.len() as u64, &payload[..]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_blob_hash_matches_git() {
        let id = compute_id(ObjectKind::Blob, b"");
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn hello_world_blob_hash_matches_git() {
        let id = compute_id(ObjectKind::Blob, b"hello world\n");
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    }
}
