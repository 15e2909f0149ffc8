//! Fixed size idmap header
//!
//! ```text
//! offset 0    u32      magic
//! offset 4    u32      version
//! offset 8    u32      target crc32
//! offset 12   u32      overlay crc32
//! offset 16   u8[256]  target path (NUL padded)
//! offset 272  u8[256]  overlay path (NUL padded)
//! offset 528  mapping section
//! ```
//!
//! All fields use the native byte order, the runtime resource loader maps
//! the file and reads it as an array of words.

use std::ffi::OsStr;
use std::fs::File;
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use winnow::binary::{Endianness, u32 as ne_u32};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::{HeaderError, IdmapError};

/// `IDMP` when read as little endian u32
pub const IDMAP_MAGIC: u32 = 0x504D4449;

/// Files are auto-generated, so no backwards compatibility is kept
pub const IDMAP_CURRENT_VERSION: u32 = 0x00000001;

/// Size of a path slot, terminating NUL included
pub const IDMAP_PATH_SIZE: usize = 256;

pub const IDMAP_HEADER_SIZE: usize = 4 * size_of::<u32>() + 2 * IDMAP_PATH_SIZE;

/// Word aligned storage for a header read from disk
#[repr(C, align(4))]
pub struct HeaderBuffer(pub [u8; IDMAP_HEADER_SIZE]);

impl HeaderBuffer {
    pub fn zeroed() -> HeaderBuffer {
        HeaderBuffer([0; IDMAP_HEADER_SIZE])
    }

    /// Copy the first `IDMAP_HEADER_SIZE` bytes of `input`
    pub fn from_slice(input: &[u8]) -> Result<HeaderBuffer, HeaderError> {
        let bytes = input.get(..IDMAP_HEADER_SIZE).ok_or(HeaderError::Truncated {
            needed: IDMAP_HEADER_SIZE,
            actual: input.len(),
        })?;

        let mut buffer = HeaderBuffer::zeroed();
        buffer.0.copy_from_slice(bytes);
        Ok(buffer)
    }

    #[inline]
    pub fn parse(&self) -> Result<IdmapHeader, HeaderError> {
        IdmapHeader::parse(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdmapHeader {
    pub magic: u32,
    pub version: u32,
    pub target_crc32: u32,
    pub overlay_crc32: u32,
    pub target_path: [u8; IDMAP_PATH_SIZE],
    pub overlay_path: [u8; IDMAP_PATH_SIZE],
}

impl IdmapHeader {
    /// Header for the current format version
    pub fn new(
        target_crc32: u32,
        overlay_crc32: u32,
        target_path: &Path,
        overlay_path: &Path,
    ) -> Result<IdmapHeader, HeaderError> {
        Ok(IdmapHeader {
            magic: IDMAP_MAGIC,
            version: IDMAP_CURRENT_VERSION,
            target_crc32,
            overlay_crc32,
            target_path: Self::encode_path(target_path.as_os_str())?,
            overlay_path: Self::encode_path(overlay_path.as_os_str())?,
        })
    }

    /// Decode the header from the start of `input`
    ///
    /// Checks alignment, size and magic. The version is left to the caller,
    /// see [`IdmapHeader::validate_version`].
    pub fn parse(input: &[u8]) -> Result<IdmapHeader, HeaderError> {
        if (input.as_ptr() as usize) % align_of::<u32>() != 0 {
            return Err(HeaderError::Misaligned);
        }

        if input.len() < IDMAP_HEADER_SIZE {
            return Err(HeaderError::Truncated {
                needed: IDMAP_HEADER_SIZE,
                actual: input.len(),
            });
        }

        let mut input = &input[..IDMAP_HEADER_SIZE];
        let (magic, version, target_crc32, overlay_crc32, target_path, overlay_path) = (
            ne_u32::<_, ContextError>(Endianness::Native), // magic
            ne_u32(Endianness::Native),                    // version
            ne_u32(Endianness::Native),                    // target crc32
            ne_u32(Endianness::Native),                    // overlay crc32
            take(IDMAP_PATH_SIZE),                         // target path
            take(IDMAP_PATH_SIZE),                         // overlay path
        )
            .parse_next(&mut input)
            .map_err(|_| HeaderError::Truncated {
                needed: IDMAP_HEADER_SIZE,
                actual: input.len(),
            })?;

        if magic != IDMAP_MAGIC {
            return Err(HeaderError::BadMagic(magic));
        }

        let mut header = IdmapHeader {
            magic,
            version,
            target_crc32,
            overlay_crc32,
            target_path: [0; IDMAP_PATH_SIZE],
            overlay_path: [0; IDMAP_PATH_SIZE],
        };
        header.target_path.copy_from_slice(target_path);
        header.overlay_path.copy_from_slice(overlay_path);

        Ok(header)
    }

    /// Read the header of an idmap file, version included
    pub fn read(path: &Path) -> Result<IdmapHeader, IdmapError> {
        let mut buffer = HeaderBuffer::zeroed();
        File::open(path)?.read_exact(&mut buffer.0)?;

        let header = buffer.parse()?;
        header.validate_version()?;
        Ok(header)
    }

    #[inline]
    pub fn validate_version(&self) -> Result<(), HeaderError> {
        if self.version != IDMAP_CURRENT_VERSION {
            return Err(HeaderError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Encode into exactly `IDMAP_HEADER_SIZE` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IDMAP_HEADER_SIZE);
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_ne_bytes());
        out.extend_from_slice(&self.version.to_ne_bytes());
        out.extend_from_slice(&self.target_crc32.to_ne_bytes());
        out.extend_from_slice(&self.overlay_crc32.to_ne_bytes());
        out.extend_from_slice(&self.target_path);
        out.extend_from_slice(&self.overlay_path);
    }

    /// Target path bytes up to the first NUL
    #[inline]
    pub fn target_path_bytes(&self) -> &[u8] {
        Self::trim_nul(&self.target_path)
    }

    /// Overlay path bytes up to the first NUL
    #[inline]
    pub fn overlay_path_bytes(&self) -> &[u8] {
        Self::trim_nul(&self.overlay_path)
    }

    pub fn target_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.target_path_bytes()))
    }

    pub fn overlay_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.overlay_path_bytes()))
    }

    fn encode_path(path: &OsStr) -> Result<[u8; IDMAP_PATH_SIZE], HeaderError> {
        let bytes = path.as_bytes();
        if bytes.len() >= IDMAP_PATH_SIZE {
            return Err(HeaderError::PathTooLong(bytes.len()));
        }

        let mut slot = [0; IDMAP_PATH_SIZE];
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(slot)
    }

    #[inline]
    fn trim_nul(slot: &[u8]) -> &[u8] {
        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        &slot[..end]
    }
}
