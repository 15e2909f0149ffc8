use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use idmap_zip::ZipEntry;

use crate::errors::IdmapError;

pub const ANDROID_MANIFEST_PATH: &str = "AndroidManifest.xml";
pub const RESOURCE_TABLE_PATH: &str = "resources.arsc";

/// Read access to apk archives
///
/// Passed around explicitly, so staleness and scanning can run against fakes
pub trait ZipReader {
    /// CRC-32 of an entry as recorded by the archive
    fn entry_crc(&self, archive: &Path, entry: &str) -> Result<u32, IdmapError>;

    /// Uncompressed content of an entry
    fn read_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>, IdmapError>;

    /// CRC of the compiled resource table, the change signal for idmaps
    fn resource_table_crc(&self, apk: &Path) -> Result<u32, IdmapError> {
        self.entry_crc(apk, RESOURCE_TABLE_PATH)
    }
}

/// [`ZipReader`] over the file system
#[derive(Debug, Default, Clone, Copy)]
pub struct ApkZipReader;

impl ApkZipReader {
    fn open(path: &Path) -> Result<ZipEntry, IdmapError> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);
        let mut input = Vec::new();
        reader.read_to_end(&mut input)?;

        Ok(ZipEntry::new(input)?)
    }
}

impl ZipReader for ApkZipReader {
    fn entry_crc(&self, archive: &Path, entry: &str) -> Result<u32, IdmapError> {
        Ok(Self::open(archive)?.crc32(entry)?)
    }

    fn read_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>, IdmapError> {
        let (data, _) = Self::open(archive)?.read(entry)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use idmap_zip::{ZipBuilder, ZipError};

    use super::*;

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        let bytes = ZipBuilder::new()
            .stored(RESOURCE_TABLE_PATH, b"table v1")
            .deflated(ANDROID_MANIFEST_PATH, b"manifest bytes")
            .finish();
        std::fs::write(&apk, &bytes).unwrap();

        let expected = ZipEntry::new(bytes).unwrap();
        let reader = ApkZipReader;
        assert_eq!(
            reader.resource_table_crc(&apk).unwrap(),
            expected.crc32(RESOURCE_TABLE_PATH).unwrap()
        );
        assert_eq!(
            reader.read_entry(&apk, ANDROID_MANIFEST_PATH).unwrap(),
            b"manifest bytes"
        );
    }

    #[test]
    fn errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.apk");
        assert!(matches!(
            ApkZipReader.resource_table_crc(&missing),
            Err(IdmapError::Io(_))
        ));

        let garbage = dir.path().join("garbage.apk");
        std::fs::write(&garbage, b"definitely not a zip").unwrap();
        assert!(matches!(
            ApkZipReader.resource_table_crc(&garbage),
            Err(IdmapError::Zip(ZipError::InvalidHeader))
        ));
    }
}
