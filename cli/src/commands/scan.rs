use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use idmap::{
    ApkZipReader, CatalogWriter, HeaderOnlyIndex, IdmapManager, LockMode, OverlayScanner,
    PropertyFile,
};
use log::info;

pub(crate) fn command_scan(args: &[String], properties: &Path, lock_mode: LockMode) -> Result<()> {
    let [target_package, target_apk, idmap_dir, overlay_dirs @ ..] = args else {
        bail!("--scan expects TARGET_PACKAGE TARGET_APK IDMAP_DIR OVERLAY_DIR...");
    };
    if overlay_dirs.is_empty() {
        bail!("--scan expects at least one overlay directory");
    }

    let properties = PropertyFile::load_or_empty(properties)
        .with_context(|| format!("can't read system properties from {:?}", properties))?;
    let overlay_dirs: Vec<PathBuf> = overlay_dirs.iter().map(PathBuf::from).collect();

    let index = HeaderOnlyIndex::default();
    let scanner = OverlayScanner::new(&ApkZipReader, &properties);
    let manager = IdmapManager::new(&ApkZipReader, &index).with_lock_mode(lock_mode);

    let entries = CatalogWriter::new(&scanner, &manager)
        .with_lock_mode(lock_mode)
        .run(
            target_package,
            Path::new(target_apk),
            Path::new(idmap_dir),
            &overlay_dirs,
        )
        .with_context(|| format!("failed to scan overlays for {}", target_package))?;

    for entry in &entries {
        info!("{:?} (priority {})", entry.apk_path, entry.priority);
    }

    Ok(())
}
