//! Chunk store (§3, §6): a key→bytes container for serialized weights,
//! biases and (optionally) the cached textual model listing.
//!
//! File format: a sequence of records `<id_len:u32><id:bytes><size:u32>
//! <data:bytes>`, little-endian. Readers index every record by ID on
//! open; writers append record by record (§6).

use crate::error::{IOError, Result};
use lattice_nnets::ops::ChunkSource;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// The well-known chunk ID that optionally holds the textual model
/// serialization (§6: "the empty-id chunk").
pub const MODEL_LISTING_CHUNK_ID: &str = "";

/// A fully-indexed, read-only view of a chunk collection (§3, §6).
pub struct ChunkStore {
    chunks: HashMap<String, Vec<u8>>,
}

impl ChunkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(IOError::from)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        let mut chunks = HashMap::new();
        while !bytes.is_empty() {
            let id_len = read_u32(&mut bytes)? as usize;
            let id = read_exact(&mut bytes, id_len)?;
            let id = String::from_utf8(id).map_err(|e| IOError(e.to_string()))?;
            let size = read_u32(&mut bytes)? as usize;
            let data = read_exact(&mut bytes, size)?;
            chunks.insert(id, data);
        }
        Ok(Self { chunks })
    }

    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.chunks.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Reads the well-known empty-id chunk as the textual model listing,
    /// if present (§3: "`ChunkStore::model_listing()` reads it on
    /// demand").
    pub fn model_listing(&self) -> Option<&str> {
        self.get(MODEL_LISTING_CHUNK_ID).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

impl ChunkSource for ChunkStore {
    fn chunk(&self, id: &str) -> Option<&[u8]> {
        self.get(id)
    }
}

fn read_u32(bytes: &mut &[u8]) -> Result<u32> {
    if bytes.len() < 4 {
        return Err(IOError("truncated chunk store: expected a 4-byte length".into()).into());
    }
    let (head, rest) = bytes.split_at(4);
    *bytes = rest;
    Ok(u32::from_le_bytes(head.try_into().unwrap()))
}

fn read_exact(bytes: &mut &[u8], len: usize) -> Result<Vec<u8>> {
    if bytes.len() < len {
        return Err(IOError(format!("truncated chunk store: expected {len} more bytes")).into());
    }
    let (head, rest) = bytes.split_at(len);
    *bytes = rest;
    Ok(head.to_vec())
}

/// Appends chunk records to any `Write` destination, one `write_chunk`
/// call per record (§6: "writers append record by record").
pub struct ChunkWriter<W> {
    writer: W,
}

impl ChunkWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path).map_err(IOError::from)?;
        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_chunk(&mut self, id: &str, data: &[u8]) -> Result<()> {
        let id_bytes = id.as_bytes();
        self.writer.write_all(&(id_bytes.len() as u32).to_le_bytes()).map_err(IOError::from)?;
        self.writer.write_all(id_bytes).map_err(IOError::from)?;
        self.writer.write_all(&(data.len() as u32).to_le_bytes()).map_err(IOError::from)?;
        self.writer.write_all(data).map_err(IOError::from)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(IOError::from)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trip() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.write_chunk("conv1/w", &[1, 2, 3, 4]).unwrap();
        writer.write_chunk("conv1/b", &[5, 6]).unwrap();
        writer.write_chunk(MODEL_LISTING_CHUNK_ID, b"ops: []").unwrap();
        let bytes = writer.into_inner();

        let store = ChunkStore::from_bytes(&bytes).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("conv1/w"), Some(&[1, 2, 3, 4][..]));
        assert_eq!(store.get("conv1/b"), Some(&[5, 6][..]));
        assert_eq!(store.model_listing(), Some("ops: []"));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn truncated_record_is_an_io_error() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.write_chunk("a", &[1, 2, 3]).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() - 1);
        assert!(ChunkStore::from_bytes(&bytes).is_err());
    }
}
