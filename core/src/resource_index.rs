use std::path::Path;

use crate::errors::IdmapError;
use crate::header::IdmapHeader;
use crate::idmap::IdmapPayload;

/// Builds the complete idmap bytes (header and mapping) for a pair of apks
///
/// Matching target resources against overlay resources happens behind this
/// trait, the lifecycle code only stores what it gets.
pub trait ResourceIndex {
    fn create_idmap(
        &self,
        target_apk: &Path,
        overlay_apk: &Path,
        target_crc: u32,
        overlay_crc: u32,
    ) -> Result<Vec<u8>, IdmapError>;
}

/// Emits a valid header followed by a mapping section without type blocks
///
/// Enough for the staleness checks, which only look at the header. The
/// runtime resource loader rejects a mapping section without type blocks,
/// so these idmaps are not loadable and [`crate::Idmap::parse`] refuses them too.
#[derive(Debug, Clone, Copy)]
pub struct HeaderOnlyIndex {
    pub target_package_id: u16,
}

impl Default for HeaderOnlyIndex {
    fn default() -> Self {
        // application packages are always assigned 0x7f
        HeaderOnlyIndex {
            target_package_id: 0x7f,
        }
    }
}

impl ResourceIndex for HeaderOnlyIndex {
    fn create_idmap(
        &self,
        target_apk: &Path,
        overlay_apk: &Path,
        target_crc: u32,
        overlay_crc: u32,
    ) -> Result<Vec<u8>, IdmapError> {
        let header = IdmapHeader::new(target_crc, overlay_crc, target_apk, overlay_apk)?;
        let payload = IdmapPayload {
            target_package_id: self.target_package_id,
            types: Vec::new(),
        };

        let mut out = header.to_bytes();
        payload.write_to(&mut out)?;
        Ok(out)
    }
}
