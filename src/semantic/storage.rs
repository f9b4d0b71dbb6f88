//! Binary storage for vector embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - document_id: u64 (little-endian)
//! - content_hash: u64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{VectorEntry, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Offset of the checksum within the header
const CHECKSUM_OFFSET: usize = 43;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// File header structure. The version byte is validated on decode and
/// always written as `FORMAT_VERSION`.
#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = FORMAT_VERSION;
        bytes[1..33].copy_from_slice(&self.model_id);
        bytes[33..35].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[35..43].copy_from_slice(&self.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());

        bytes
    }

    fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, VectorStorageError> {
        let version = bytes[0];

        // Version check first
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes(bytes[CHECKSUM_OFFSET..].try_into().unwrap());
        let computed_checksum = crc32fast::hash(&bytes[..CHECKSUM_OFFSET]);
        if stored_checksum != computed_checksum {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&bytes[1..33]);

        Ok(Header {
            model_id,
            dimensions: u16::from_le_bytes(bytes[33..35].try_into().unwrap()),
            entry_count: u64::from_le_bytes(bytes[35..43].try_into().unwrap()),
        })
    }
}

/// Storage manager for vector embeddings.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the vector index from storage.
    ///
    /// Validates the header against the expected model hash and dimensions;
    /// an incompatible file is an error, never silently reinterpreted.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = Header::decode(&header_bytes)?;

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let dimensions = header.dimensions as usize;
        let mut index = VectorIndex::with_capacity(dimensions, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (id, content_hash, embedding) = read_entry(&mut reader, dimensions)?;
            if let Err(err) = index.insert(id, content_hash, embedding) {
                log::warn!("skipping bad vector entry for document {id}: {err}");
            }
        }

        Ok(index)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            model_id: *model_id,
            dimensions: index.dimensions() as u16,
            entry_count: index.len() as u64,
        };
        writer.write_all(&header.encode())?;

        for entry in index.iter() {
            write_entry(&mut writer, entry)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        Ok(())
    }
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimensions: usize,
) -> Result<(u64, u64, Vec<f32>), VectorStorageError> {
    let mut word = [0u8; 8];

    reader.read_exact(&mut word)?;
    let id = u64::from_le_bytes(word);

    reader.read_exact(&mut word)?;
    let content_hash = u64::from_le_bytes(word);

    let mut buffer = vec![0u8; dimensions * 4];
    reader.read_exact(&mut buffer)?;
    let embedding = buffer
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();

    Ok((id, content_hash, embedding))
}

fn write_entry(writer: &mut BufWriter<File>, entry: &VectorEntry) -> Result<(), VectorStorageError> {
    writer.write_all(&entry.id.to_le_bytes())?;
    writer.write_all(&entry.content_hash.to_le_bytes())?;

    let mut buffer = Vec::with_capacity(entry.embedding.len() * 4);
    for &value in &entry.embedding {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    writer.write_all(&buffer)?;

    Ok(())
}
