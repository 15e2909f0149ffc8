//! Build idmap files on disk
//!
//! Two entry points with different ownership of the artifact:
//! [`IdmapManager::create_path`] owns the file and unlinks it on failure,
//! [`IdmapManager::create_fd`] writes into a file owned by the caller and
//! leaves it alone on failure.

use std::fs::{self, File, OpenOptions, Permissions};
use std::os::unix::fs::{FileExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use log::{debug, error, info, warn};

use crate::errors::IdmapError;
use crate::lock::{FileLock, LockMode, retry_interrupted};
use crate::resource_index::ResourceIndex;
use crate::staleness::{is_idmap_stale, is_idmap_stale_path};
use crate::zip_reader::ZipReader;

/// rw-r--r--, the runtime resource loader reads idmaps as another user
pub const IDMAP_FILE_MODE: u32 = 0o644;

pub struct IdmapManager<'a> {
    zip: &'a dyn ZipReader,
    index: &'a dyn ResourceIndex,
    lock_mode: LockMode,
}

impl<'a> IdmapManager<'a> {
    pub fn new(zip: &'a dyn ZipReader, index: &'a dyn ResourceIndex) -> IdmapManager<'a> {
        IdmapManager {
            zip,
            index,
            lock_mode: LockMode::Blocking,
        }
    }

    pub fn with_lock_mode(mut self, lock_mode: LockMode) -> IdmapManager<'a> {
        self.lock_mode = lock_mode;
        self
    }

    /// Make sure `idmap_path` holds a fresh idmap for the pair
    ///
    /// A fresh file is left untouched. On any failure after the file was
    /// opened for writing, the file is removed.
    pub fn create_path(
        &self,
        target_apk: &Path,
        overlay_apk: &Path,
        idmap_path: &Path,
    ) -> Result<(), IdmapError> {
        if !is_idmap_stale_path(self.zip, target_apk, overlay_apk, idmap_path) {
            debug!("idmap {idmap_path:?} is up to date");
            return Ok(());
        }

        let result = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(IDMAP_FILE_MODE)
            .open(idmap_path)
            .and_then(|file| {
                // open() mode is masked by the umask and ignored for existing files
                file.set_permissions(Permissions::from_mode(IDMAP_FILE_MODE))?;
                Ok(file)
            })
            .map_err(IdmapError::from)
            .and_then(|file| self.write_locked(target_apk, overlay_apk, &file));

        if let Err(e) = &result {
            error!("failed to create idmap {idmap_path:?}: {e}");
            if let Err(unlink) = fs::remove_file(idmap_path) {
                // open itself may have failed, nothing to remove then
                debug!("can't remove {idmap_path:?}: {unlink}");
            }
        } else {
            info!("created idmap {idmap_path:?} for {overlay_apk:?}");
        }

        result
    }

    /// Same as [`IdmapManager::create_path`] for a descriptor handed down by the caller
    ///
    /// The file is never removed here, whoever opened it decides what to do
    /// with it on failure. `idmap` must be open for reading and writing.
    pub fn create_fd(
        &self,
        target_apk: &Path,
        overlay_apk: &Path,
        idmap: &File,
    ) -> Result<(), IdmapError> {
        if !is_idmap_stale(self.zip, target_apk, overlay_apk, idmap) {
            debug!("idmap for {overlay_apk:?} is up to date");
            return Ok(());
        }

        self.write_locked(target_apk, overlay_apk, idmap)
            .inspect_err(|e| warn!("failed to write idmap for {overlay_apk:?}: {e}"))
    }

    /// `true` if the idmap behind `idmap` is fresh, takes no lock
    pub fn verify_fd(&self, target_apk: &Path, overlay_apk: &Path, idmap: &File) -> bool {
        !is_idmap_stale(self.zip, target_apk, overlay_apk, idmap)
    }

    fn write_locked(
        &self,
        target_apk: &Path,
        overlay_apk: &Path,
        idmap: &File,
    ) -> Result<(), IdmapError> {
        let lock = FileLock::exclusive(idmap, self.lock_mode)?;

        retry_interrupted(|| idmap.set_len(0))?;

        let target_crc = self.zip.resource_table_crc(target_apk)?;
        let overlay_crc = self.zip.resource_table_crc(overlay_apk)?;
        let bytes = self
            .index
            .create_idmap(target_apk, overlay_apk, target_crc, overlay_crc)?;

        // positional writes, the descriptor offset may be anywhere
        idmap.write_all_at(&bytes, 0)?;

        lock.unlock()?;
        Ok(())
    }
}
