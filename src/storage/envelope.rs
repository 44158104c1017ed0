//! Checksummed binary envelope for artifacts.
//!
//! Layout (little-endian):
//!
//! | bytes | field                   |
//! |-------|-------------------------|
//! | 4     | magic `ICAF`            |
//! | 4     | format version (u32)    |
//! | 1     | artifact kind (u8)      |
//! | 8     | payload length (u64)    |
//! | 4     | CRC32 of payload (u32)  |
//! | n     | bincode payload         |

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{IntentError, Result};

pub const MAGIC: [u8; 4] = *b"ICAF";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 1 + 8 + 4;

/// What an envelope holds; a file of the wrong kind is rejected on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Classifier,
    Vocabulary,
    Labels,
}

impl ArtifactKind {
    fn tag(self) -> u8 {
        match self {
            ArtifactKind::Classifier => 1,
            ArtifactKind::Vocabulary => 2,
            ArtifactKind::Labels => 3,
        }
    }
}

/// Serialize a value into an envelope.
pub fn encode<T: Serialize>(kind: ArtifactKind, value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| IntentError::serialization(format!("Failed to encode {kind:?}: {e}")))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    bytes.write_u8(kind.tag())?;
    bytes.write_u64::<LittleEndian>(payload.len() as u64)?;
    bytes.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Check an envelope and deserialize its payload. `path` is used for error reporting.
pub fn decode<T: DeserializeOwned>(kind: ArtifactKind, bytes: &[u8], path: &Path) -> Result<T> {
    let corrupt = |reason: String| IntentError::corrupt_artifact(path, reason);

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
    }

    let mut reader = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }

    let tag = reader.read_u8()?;
    if tag != kind.tag() {
        return Err(corrupt(format!("expected a {kind:?} artifact, found kind {tag}")));
    }

    let length = reader.read_u64::<LittleEndian>()? as usize;
    let checksum = reader.read_u32::<LittleEndian>()?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != length {
        return Err(corrupt(format!(
            "payload length {} does not match header ({length})",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != checksum {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    let (value, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map_err(|e| corrupt(format!("failed to decode payload: {e}")))?;
    Ok(value)
}

/// Write a value to `path` as an envelope.
pub fn write_artifact<T: Serialize>(path: &Path, kind: ArtifactKind, value: &T) -> Result<()> {
    fs::write(path, encode(kind, value)?)?;
    Ok(())
}

/// Read an envelope from `path`.
pub fn read_artifact<T: DeserializeOwned>(path: &Path, kind: ArtifactKind) -> Result<T> {
    let bytes = fs::read(path)?;
    decode(kind, &bytes, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::LabelIndex;

    fn labels() -> LabelIndex {
        LabelIndex::fit(["greeting", "goodbye", "pricing"])
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode(ArtifactKind::Labels, &labels()).unwrap();
        assert_eq!(&bytes[..4], b"ICAF");

        let decoded: LabelIndex = decode(ArtifactKind::Labels, &bytes, Path::new("x")).unwrap();
        assert_eq!(decoded, labels());
    }

    #[test]
    fn test_detects_corruption() {
        let bytes = encode(ArtifactKind::Labels, &labels()).unwrap();
        let path = Path::new("labels.bin");

        let mut flipped = bytes.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xFF;
        assert!(matches!(
            decode::<LabelIndex>(ArtifactKind::Labels, &flipped, path),
            Err(IntentError::CorruptArtifact { .. })
        ));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(decode::<LabelIndex>(ArtifactKind::Labels, &bad_magic, path).is_err());

        assert!(decode::<LabelIndex>(ArtifactKind::Labels, &bytes[..bytes.len() - 1], path).is_err());
        assert!(decode::<LabelIndex>(ArtifactKind::Labels, &bytes[..5], path).is_err());
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let bytes = encode(ArtifactKind::Labels, &labels()).unwrap();
        let err = decode::<LabelIndex>(ArtifactKind::Vocabulary, &bytes, Path::new("v.bin"))
            .unwrap_err();
        assert!(err.to_string().contains("Vocabulary"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.bin");

        write_artifact(&path, ArtifactKind::Labels, &labels()).unwrap();
        let loaded: LabelIndex = read_artifact(&path, ArtifactKind::Labels).unwrap();
        assert_eq!(loaded, labels());
    }
}
