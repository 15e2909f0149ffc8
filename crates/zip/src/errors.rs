use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZipError {
    /// Input doesn't start with a local file header
    #[error("invalid zip header")]
    InvalidHeader,

    /// Got error while decompressing object
    #[error("got error while decompressing object")]
    DecompressionError,

    /// Got EOF while reading data
    #[error("got EOF while parsing zip")]
    EOF,

    /// Provided file not found in zip
    #[error("file not exist in zip: {0}")]
    FileNotFound(String),

    /// Can't operate without EOCD
    #[error("can't find EOCD in zip")]
    NotFoundEOCD,

    /// Only stored (0) and deflated (8) entries can be read
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Generic parsing error
    #[error("got error while parsing zip archive")]
    ParseError,
}

/// Provide information about compression type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCompressionType {
    /// Used stored method for decompression
    Stored,

    /// Used deflated method for decompression
    Deflated,
}

impl FileCompressionType {
    pub(crate) const STORED: u16 = 0;
    pub(crate) const DEFLATED: u16 = 8;

    pub fn from_method(method: u16) -> Result<FileCompressionType, ZipError> {
        match method {
            Self::STORED => Ok(FileCompressionType::Stored),
            Self::DEFLATED => Ok(FileCompressionType::Deflated),
            other => Err(ZipError::UnsupportedCompression(other)),
        }
    }
}
