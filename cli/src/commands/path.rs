use std::path::PathBuf;

use anyhow::{Context, Result};
use idmap::{ApkZipReader, HeaderOnlyIndex, IdmapManager, LockMode};

pub(crate) fn command_path(args: &[PathBuf], lock_mode: LockMode) -> Result<()> {
    let [target, overlay, idmap_path] = args else {
        anyhow::bail!("--path expects exactly 3 arguments, got {}", args.len());
    };

    let index = HeaderOnlyIndex::default();
    let manager = IdmapManager::new(&ApkZipReader, &index).with_lock_mode(lock_mode);

    manager
        .create_path(target, overlay, idmap_path)
        .with_context(|| format!("failed to create idmap {:?} for {:?}", idmap_path, overlay))
}
