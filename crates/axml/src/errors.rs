use thiserror::Error;

/// Problems decoding a compiled xml document
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AXMLError {
    /// Input can't hold even the document chunk header
    #[error("input is too small for a compiled xml document")]
    TooSmallError,

    /// Document chunk header can't be decoded
    #[error("can't decode xml document header")]
    HeaderError,

    /// Document chunk declares a header size other than 8, plain text xml ends up here
    #[error("invalid xml chunk header size: expected 8, got {0}")]
    HeaderSizeError(u16),

    #[error("malformed resource map chunk")]
    ResourceMapError,

    #[error("malformed string pool chunk")]
    StringPoolError,

    /// Node chunk is truncated or references a missing string
    #[error("malformed xml tree node")]
    XmlTreeError,
}
