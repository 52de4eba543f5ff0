//! Encoding of the whole-store image written by persistent backends.

use std::{
    collections::BTreeMap,
    io::{self, Read},
    sync::Arc,
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{FORMAT_VERSION, HEADER_SIZE, MAGIC};
use crate::{
    error::{Error, Result},
    tables::TableId,
};

/// Ordered contents of a single table.
pub type TableMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Fixed-size header preceding the image body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Format version of the body.
    pub version: u16,
    /// Snapshot id of the commit that produced this image.
    pub snapshot_id: u64,
    /// Length of the body in bytes.
    pub body_len: u64,
    /// XXH3-64 checksum of the body.
    pub checksum: u64,
}

impl ImageHeader {
    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        LittleEndian::write_u16(&mut buf[8..10], self.version);
        LittleEndian::write_u64(&mut buf[16..24], self.snapshot_id);
        LittleEndian::write_u64(&mut buf[24..32], self.body_len);
        LittleEndian::write_u64(&mut buf[32..40], self.checksum);
        buf
    }

    /// Parses and validates a header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if `buf` is shorter than [`HEADER_SIZE`],
    /// [`Error::InvalidMagic`] if the magic does not match, and
    /// [`Error::UnsupportedVersion`] for an unknown format version.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Corrupted {
                reason: format!("image is {} bytes, header needs {HEADER_SIZE}", buf.len()),
            });
        }
        if &buf[0..8] != MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = LittleEndian::read_u16(&buf[8..10]);
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { version });
        }
        Ok(Self {
            version,
            snapshot_id: LittleEndian::read_u64(&buf[16..24]),
            body_len: LittleEndian::read_u64(&buf[24..32]),
            checksum: LittleEndian::read_u64(&buf[32..40]),
        })
    }
}

/// Encodes every table into a checksummed image.
///
/// Body layout, per table in id order:
/// `table_id:u8 entry_count:u64 (key_len:u32 key value_len:u32 value)*`
///
/// # Errors
///
/// Returns [`Error::Io`] only if writing into the in-memory buffer fails.
pub fn encode_image(snapshot_id: u64, tables: &[Arc<TableMap>; TableId::COUNT]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for table_id in TableId::all() {
        let table = &tables[table_id as usize];
        body.write_u8(table_id as u8)?;
        body.write_u64::<LittleEndian>(table.len() as u64)?;
        for (key, value) in table.iter() {
            write_chunk(&mut body, key)?;
            write_chunk(&mut body, value)?;
        }
    }

    let header = ImageHeader {
        version: FORMAT_VERSION,
        snapshot_id,
        body_len: body.len() as u64,
        checksum: xxhash_rust::xxh3::xxh3_64(&body),
    };

    let mut image = Vec::with_capacity(HEADER_SIZE + body.len());
    image.extend_from_slice(&header.to_bytes());
    image.extend_from_slice(&body);
    Ok(image)
}

/// Decodes and verifies an image produced by [`encode_image`].
///
/// Returns the snapshot id and the contents of every table.
///
/// # Errors
///
/// Returns the header errors of [`ImageHeader::from_bytes`],
/// [`Error::ChecksumMismatch`] if the body does not match its checksum, and
/// [`Error::Corrupted`] if the body is truncated or malformed.
pub fn decode_image(bytes: &[u8]) -> Result<(u64, Vec<TableMap>)> {
    let header = ImageHeader::from_bytes(bytes)?;
    let body = &bytes[HEADER_SIZE..];
    if body.len() as u64 != header.body_len {
        return Err(Error::Corrupted {
            reason: format!("image body is {} bytes, header says {}", body.len(), header.body_len),
        });
    }

    let actual = xxhash_rust::xxh3::xxh3_64(body);
    if actual != header.checksum {
        return Err(Error::ChecksumMismatch { expected: header.checksum, actual });
    }

    let mut tables: Vec<TableMap> = (0..TableId::COUNT).map(|_| TableMap::new()).collect();
    let mut reader = body;
    while !reader.is_empty() {
        let raw_id = reader.read_u8().map_err(truncated)?;
        let table_id = TableId::from_u8(raw_id)
            .ok_or_else(|| Error::Corrupted { reason: format!("unknown table id {raw_id}") })?;
        let count = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let table = &mut tables[table_id as usize];
        for _ in 0..count {
            let key = read_chunk(&mut reader)?;
            let value = read_chunk(&mut reader)?;
            table.insert(key, value);
        }
    }

    Ok((header.snapshot_id, tables))
}

fn write_chunk(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::Corrupted {
        reason: format!("record of {} bytes exceeds image limit", bytes.len()),
    })?;
    buf.write_u32::<LittleEndian>(len)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_chunk(reader: &mut &[u8]) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    if reader.len() < len {
        return Err(Error::Corrupted { reason: "truncated image record".to_string() });
    }
    let mut chunk = vec![0u8; len];
    reader.read_exact(&mut chunk).map_err(truncated)?;
    Ok(chunk)
}

fn truncated(_: io::Error) -> Error {
    Error::Corrupted { reason: "truncated image body".to_string() }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn sample_tables() -> [Arc<TableMap>; TableId::COUNT] {
        let mut tables: [Arc<TableMap>; TableId::COUNT] = Default::default();
        Arc::make_mut(&mut tables[TableId::Targets as usize]).insert(vec![1], vec![0xAA; 3]);
        Arc::make_mut(&mut tables[TableId::DocumentTargets as usize]).insert(vec![2, 0], vec![]);
        Arc::make_mut(&mut tables[TableId::TargetGlobal as usize])
            .insert(b"target_global".to_vec(), vec![7]);
        tables
    }

    #[test]
    fn test_image_restores_every_table() {
        let tables = sample_tables();
        let image = encode_image(42, &tables).expect("encode");

        let (snapshot_id, decoded) = decode_image(&image).expect("decode");
        assert_eq!(snapshot_id, 42);
        for table_id in TableId::all() {
            assert_eq!(&decoded[table_id as usize], tables[table_id as usize].as_ref());
        }
    }

    #[test]
    fn test_empty_tables_produce_valid_image() {
        let tables: [Arc<TableMap>; TableId::COUNT] = Default::default();
        let image = encode_image(0, &tables).expect("encode");
        let (_, decoded) = decode_image(&image).expect("decode");
        assert!(decoded.iter().all(BTreeMap::is_empty));
    }

    #[test]
    fn test_flipped_body_byte_fails_checksum() {
        let mut image = encode_image(1, &sample_tables()).expect("encode");
        let last = image.len() - 1;
        image[last] ^= 0xFF;

        assert!(matches!(decode_image(&image), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut image = encode_image(1, &sample_tables()).expect("encode");
        image[0] = b'X';
        assert!(matches!(decode_image(&image), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut image = encode_image(1, &sample_tables()).expect("encode");
        LittleEndian::write_u16(&mut image[8..10], FORMAT_VERSION + 1);
        assert!(matches!(
            decode_image(&image),
            Err(Error::UnsupportedVersion { version }) if version == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_truncated_image_is_corrupted() {
        let image = encode_image(1, &sample_tables()).expect("encode");
        assert!(matches!(decode_image(&image[..image.len() - 2]), Err(Error::Corrupted { .. })));
        assert!(matches!(decode_image(&image[..10]), Err(Error::Corrupted { .. })));
    }
}
