//! Decide whether an idmap on disk still describes a target/overlay pair
//!
//! Checks run cheapest first and stop at the first failing one. Every
//! failure, including I/O and archive errors, means "stale": regenerating
//! is always safe, trusting a bad idmap is not.

use std::fmt;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::Path;

use log::debug;

use crate::header::{HeaderBuffer, IDMAP_HEADER_SIZE, IdmapHeader};
use crate::zip_reader::ZipReader;

/// First check that failed for an idmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// Idmap can't be opened, stat'ed or read
    Unreadable(String),
    /// File is smaller than a header
    Truncated(u64),
    /// Header bytes don't decode
    Malformed(String),
    VersionMismatch(u32),
    TargetPathMismatch,
    OverlayPathMismatch,
    /// Either apk can't be read, or its resource table CRC changed
    ResourcesChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Unreadable(e) => write!(f, "idmap unreadable: {e}"),
            StaleReason::Truncated(size) => {
                write!(f, "idmap is {size} bytes, header needs {IDMAP_HEADER_SIZE}")
            }
            StaleReason::Malformed(e) => write!(f, "idmap header malformed: {e}"),
            StaleReason::VersionMismatch(v) => write!(f, "idmap version 0x{v:08x} is outdated"),
            StaleReason::TargetPathMismatch => f.write_str("target path differs"),
            StaleReason::OverlayPathMismatch => f.write_str("overlay path differs"),
            StaleReason::ResourcesChanged => f.write_str("resource table crc differs"),
        }
    }
}

/// Run the staleness checks against an open idmap
///
/// Returns `None` if the idmap is fresh. Never modifies `idmap`.
pub fn check_file(
    zip: &dyn ZipReader,
    target_apk: &Path,
    overlay_apk: &Path,
    idmap: &File,
) -> Option<StaleReason> {
    let size = match idmap.metadata() {
        Ok(metadata) => metadata.len(),
        Err(e) => return Some(StaleReason::Unreadable(e.to_string())),
    };

    if size < IDMAP_HEADER_SIZE as u64 {
        return Some(StaleReason::Truncated(size));
    }

    let mut buffer = HeaderBuffer::zeroed();
    if let Err(e) = idmap.read_exact_at(&mut buffer.0, 0) {
        return Some(StaleReason::Unreadable(e.to_string()));
    }

    let header = match buffer.parse() {
        Ok(header) => header,
        Err(e) => return Some(StaleReason::Malformed(e.to_string())),
    };

    check_header(zip, target_apk, overlay_apk, &header)
}

fn check_header(
    zip: &dyn ZipReader,
    target_apk: &Path,
    overlay_apk: &Path,
    header: &IdmapHeader,
) -> Option<StaleReason> {
    if header.validate_version().is_err() {
        return Some(StaleReason::VersionMismatch(header.version));
    }

    if header.target_path_bytes() != target_apk.as_os_str().as_bytes() {
        return Some(StaleReason::TargetPathMismatch);
    }

    if header.overlay_path_bytes() != overlay_apk.as_os_str().as_bytes() {
        return Some(StaleReason::OverlayPathMismatch);
    }

    let crcs = zip
        .resource_table_crc(target_apk)
        .and_then(|target| Ok((target, zip.resource_table_crc(overlay_apk)?)));

    match crcs {
        Ok((target, overlay)) if target == header.target_crc32 && overlay == header.overlay_crc32 => {
            None
        }
        Ok(_) => Some(StaleReason::ResourcesChanged),
        Err(e) => {
            debug!("can't read resource table crc: {e}");
            Some(StaleReason::ResourcesChanged)
        }
    }
}

/// `true` if the idmap behind `idmap` must be regenerated
pub fn is_idmap_stale(
    zip: &dyn ZipReader,
    target_apk: &Path,
    overlay_apk: &Path,
    idmap: &File,
) -> bool {
    match check_file(zip, target_apk, overlay_apk, idmap) {
        Some(reason) => {
            debug!("idmap for {overlay_apk:?} is stale: {reason}");
            true
        }
        None => false,
    }
}

/// Path flavor of [`is_idmap_stale`], a missing file is stale
pub fn is_idmap_stale_path(
    zip: &dyn ZipReader,
    target_apk: &Path,
    overlay_apk: &Path,
    idmap_path: &Path,
) -> bool {
    match File::open(idmap_path) {
        Ok(file) => is_idmap_stale(zip, target_apk, overlay_apk, &file),
        Err(e) => {
            debug!("idmap {idmap_path:?} is stale: {e}");
            true
        }
    }
}
