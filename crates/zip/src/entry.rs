use std::collections::HashMap;

use flate2::Decompress;
use flate2::FlushDecompress;
use flate2::Status;
use log::warn;

use crate::errors::{FileCompressionType, ZipError};
use crate::structs::{
    central_directory::CentralDirectory, eocd::EndOfCentralDirectory,
    local_file_header::LocalFileHeader,
};

/// Represents a parsed ZIP archive
pub struct ZipEntry {
    input: Vec<u8>,
    central_directory: CentralDirectory,
    local_headers: HashMap<String, LocalFileHeader>,
}

/// Implementation of common methods
impl ZipEntry {
    pub fn new(input: Vec<u8>) -> Result<ZipEntry, ZipError> {
        // perform basic sanity check
        if !input.starts_with(b"PK\x03\x04") {
            return Err(ZipError::InvalidHeader);
        }

        let eocd_offset =
            EndOfCentralDirectory::find_eocd(&input, 4096).ok_or(ZipError::NotFoundEOCD)?;

        let eocd = EndOfCentralDirectory::parse(&mut &input[eocd_offset..])
            .map_err(|_| ZipError::ParseError)?;

        let central_directory =
            CentralDirectory::parse(&input, &eocd).map_err(|_| ZipError::ParseError)?;

        if central_directory.entries.len() != eocd.total_entries as usize {
            warn!(
                "central directory holds {} entries, but EOCD declares {}",
                central_directory.entries.len(),
                eocd.total_entries
            );
        }

        let local_headers = central_directory
            .entries
            .iter()
            .filter_map(|(filename, entry)| {
                LocalFileHeader::parse(&input, entry.local_header_offset as usize)
                    .ok()
                    .map(|header| (filename.clone(), header))
            })
            .collect();

        Ok(ZipEntry {
            input,
            central_directory,
            local_headers,
        })
    }

    /// Get list of the filenames from zip archive
    pub fn namelist(&self) -> impl Iterator<Item = &str> + '_ {
        self.central_directory.entries.keys().map(String::as_str)
    }

    /// CRC-32 of the uncompressed entry as recorded in the central directory
    pub fn crc32(&self, filename: &str) -> Result<u32, ZipError> {
        self.central_directory
            .entries
            .get(filename)
            .map(|entry| entry.crc32)
            .ok_or_else(|| ZipError::FileNotFound(filename.to_owned()))
    }

    /// Compression method declared by the local header of the entry
    pub fn compression_type(&self, filename: &str) -> Result<FileCompressionType, ZipError> {
        let local_header = self
            .local_headers
            .get(filename)
            .ok_or_else(|| ZipError::FileNotFound(filename.to_owned()))?;

        FileCompressionType::from_method(local_header.compression_method)
    }

    /// Read (and inflate if needed) a file from zip archive
    pub fn read(&self, filename: &str) -> Result<(Vec<u8>, FileCompressionType), ZipError> {
        let local_header = self
            .local_headers
            .get(filename)
            .ok_or_else(|| ZipError::FileNotFound(filename.to_owned()))?;

        let central_directory_entry = self
            .central_directory
            .entries
            .get(filename)
            .ok_or_else(|| ZipError::FileNotFound(filename.to_owned()))?;

        if local_header.compression_method != central_directory_entry.compression_method {
            warn!(
                "{filename}: compression method differs between local header ({}) and central directory ({})",
                local_header.compression_method, central_directory_entry.compression_method
            );
        }

        let compression = FileCompressionType::from_method(local_header.compression_method)?;

        // sizes in the local header are zero when a data descriptor is used
        let (compressed_size, uncompressed_size) =
            if local_header.compressed_size == 0 || local_header.uncompressed_size == 0 {
                (
                    central_directory_entry.compressed_size as usize,
                    central_directory_entry.uncompressed_size as usize,
                )
            } else {
                (
                    local_header.compressed_size as usize,
                    local_header.uncompressed_size as usize,
                )
            };

        let offset = central_directory_entry.local_header_offset as usize + local_header.size();
        // helper to safely get a slice from input
        let get_slice = |start: usize, len: usize| {
            let end = start.checked_add(len).ok_or(ZipError::EOF)?;
            self.input.get(start..end).ok_or(ZipError::EOF)
        };

        match compression {
            FileCompressionType::Stored => {
                let slice = get_slice(offset, uncompressed_size)?;
                Ok((slice.to_vec(), compression))
            }
            FileCompressionType::Deflated => {
                let compressed_data = get_slice(offset, compressed_size)?;
                let mut uncompressed_data = Vec::with_capacity(uncompressed_size);

                let status = Decompress::new(false)
                    .decompress_vec(
                        compressed_data,
                        &mut uncompressed_data,
                        FlushDecompress::Finish,
                    )
                    .map_err(|_| ZipError::DecompressionError)?;

                if status != Status::StreamEnd || uncompressed_data.len() != uncompressed_size {
                    return Err(ZipError::DecompressionError);
                }

                Ok((uncompressed_data, compression))
            }
        }
    }
}
