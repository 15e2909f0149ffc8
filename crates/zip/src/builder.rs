//! Tiny archive writer for generating APK-shaped fixtures.
//!
//! Produces single-disk archives without data descriptors, zip64 records or
//! comments, which is all the reader side needs to be exercised.

use std::io::Write;

use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;

struct PendingEntry {
    name: String,
    method: u16,
    crc32: u32,
    uncompressed_size: u32,
    data: Vec<u8>,
}

#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<PendingEntry>,
}

impl ZipBuilder {
    pub fn new() -> ZipBuilder {
        ZipBuilder::default()
    }

    /// Add an entry without compression
    pub fn stored(mut self, name: &str, data: &[u8]) -> ZipBuilder {
        self.entries.push(PendingEntry {
            name: name.to_owned(),
            method: 0,
            crc32: Self::crc(data),
            uncompressed_size: data.len() as u32,
            data: data.to_vec(),
        });
        self
    }

    /// Add an entry compressed with raw deflate
    pub fn deflated(mut self, name: &str, data: &[u8]) -> ZipBuilder {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        // writing into a Vec can't fail
        let _ = encoder.write_all(data);
        let compressed = encoder.finish().unwrap_or_default();

        self.entries.push(PendingEntry {
            name: name.to_owned(),
            method: 8,
            crc32: Self::crc(data),
            uncompressed_size: data.len() as u32,
            data: compressed,
        });
        self
    }

    /// Add an entry with an arbitrary method id, `data` is written as is
    pub fn raw_entry(mut self, name: &str, method: u16, data: &[u8]) -> ZipBuilder {
        self.entries.push(PendingEntry {
            name: name.to_owned(),
            method,
            crc32: Self::crc(data),
            uncompressed_size: data.len() as u32,
            data: data.to_vec(),
        });
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            offsets.push(out.len() as u32);

            out.extend_from_slice(&0x04034b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&entry.method.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // mod time
            out.extend_from_slice(&0u16.to_le_bytes()); // mod date
            out.extend_from_slice(&entry.crc32.to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra length
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.data);
        }

        let central_dir_offset = out.len() as u32;

        for (entry, offset) in self.entries.iter().zip(offsets) {
            out.extend_from_slice(&0x02014b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes()); // version made by
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&entry.method.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // mod time
            out.extend_from_slice(&0u16.to_le_bytes()); // mod date
            out.extend_from_slice(&entry.crc32.to_le_bytes());
            out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra length
            out.extend_from_slice(&0u16.to_le_bytes()); // comment length
            out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
        }

        let central_dir_size = out.len() as u32 - central_dir_offset;
        let count = self.entries.len() as u16;

        out.extend_from_slice(&0x06054b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number
        out.extend_from_slice(&0u16.to_le_bytes()); // central dir start disk
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&central_dir_size.to_le_bytes());
        out.extend_from_slice(&central_dir_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length

        out
    }

    fn crc(data: &[u8]) -> u32 {
        let mut crc = Crc::new();
        crc.update(data);
        crc.sum()
    }
}
