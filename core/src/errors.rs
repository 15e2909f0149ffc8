use std::io;
use std::path::PathBuf;

use idmap_axml::AXMLError;
use idmap_zip::ZipError;
use thiserror::Error;

/// Problems with the fixed idmap header or the mapping section after it
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    /// Buffer is shorter than the structure being decoded
    #[error("idmap truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// The runtime maps idmaps as u32 words, buffers must be word aligned
    #[error("idmap buffer is not word aligned")]
    Misaligned,

    #[error("no magic found in header (is 0x{0:08x}, expected 0x{expected:08x})", expected = crate::header::IDMAP_MAGIC)]
    BadMagic(u32),

    #[error("version mismatch in header (is 0x{0:08x}, expected 0x{expected:08x})", expected = crate::header::IDMAP_CURRENT_VERSION)]
    UnsupportedVersion(u32),

    /// Paths are stored in fixed 256 byte slots including the terminating NUL
    #[error("path exceeds expected 255 characters ({0} bytes)")]
    PathTooLong(usize),

    /// Mapping section doesn't follow the type block layout
    #[error("invalid mapping section: {0}")]
    InvalidPayload(&'static str),
}

#[derive(Error, Debug)]
pub enum IdmapError {
    /// Generic I/O error while trying to read, write or lock a file
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Idmap bytes don't follow the binary format
    #[error("got malformed idmap")]
    Header(#[from] HeaderError),

    /// Error occurred while reading apk as zip archive
    #[error("got error while reading apk archive")]
    Zip(#[from] ZipError),

    /// Error occurred while parsing AndroidManifest.xml
    #[error("got error while parsing AndroidManifest.xml")]
    Manifest(#[from] AXMLError),

    /// Manifest parsed fine, but the `<overlay>` tag is unusable
    #[error("malformed overlay manifest: {0}")]
    MalformedManifest(String),

    /// Resource index collaborator refused to build the mapping
    #[error("can't build resource mapping: {0}")]
    ResourceIndex(String),

    /// Overlay directory itself can't be listed, aborts the whole scan
    #[error("can't read overlay directory {path:?}")]
    OverlayDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Catalog file can't be published
    #[error("can't persist overlay catalog {path:?}")]
    CatalogPersist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
