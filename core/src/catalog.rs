//! `overlays.list`: priority ordered overlays of a target with their idmaps
//!
//! ```text
//! /vendor/overlay/High.apk /data/resource-cache/vendor@overlay@High.apk.idmap
//! /vendor/overlay/Low.apk /data/resource-cache/vendor@overlay@Low.apk.idmap
//! ```
//!
//! Line order is the order the runtime applies overlays in. Writers and
//! readers serialize on `flock`, the file is rewritten in place. A reader
//! that skips the shared lock can observe a half written catalog.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::errors::IdmapError;
use crate::lock::{FileLock, LockMode, retry_interrupted};
use crate::manager::IdmapManager;
use crate::models::CatalogEntry;
use crate::scanner::OverlayScanner;

pub const CATALOG_FILE_NAME: &str = "overlays.list";

/// Appended to the flattened overlay path
pub const IDMAP_SUFFIX: &str = ".idmap";

/// Stands in for `/` in flattened paths
const FLATTEN_SEPARATOR: u8 = b'@';

const CATALOG_FILE_MODE: u32 = 0o644;

/// `/vendor/overlay/a.apk` -> `vendor@overlay@a.apk`
///
/// Works on raw bytes, non UTF-8 paths stay distinct. A `@` inside a path
/// component is kept as is, so `/a@b/c` and `/a/b/c` share a name.
pub fn flatten_path(path: &Path) -> OsString {
    let bytes = path.as_os_str().as_bytes();
    let bytes = bytes.strip_prefix(b"/").unwrap_or(bytes);

    let flat: Vec<u8> = bytes
        .iter()
        .map(|&b| if b == b'/' { FLATTEN_SEPARATOR } else { b })
        .collect();
    OsString::from_vec(flat)
}

/// Where the idmap of `overlay_apk` lives inside `idmap_dir`
pub fn idmap_path_for(idmap_dir: &Path, overlay_apk: &Path) -> PathBuf {
    let mut name = flatten_path(overlay_apk);
    name.push(IDMAP_SUFFIX);
    idmap_dir.join(name)
}

pub struct CatalogWriter<'s, 'a> {
    scanner: &'s OverlayScanner<'a>,
    manager: &'s IdmapManager<'a>,
    lock_mode: LockMode,
}

impl<'s, 'a> CatalogWriter<'s, 'a> {
    pub fn new(scanner: &'s OverlayScanner<'a>, manager: &'s IdmapManager<'a>) -> Self {
        CatalogWriter {
            scanner,
            manager,
            lock_mode: LockMode::Blocking,
        }
    }

    pub fn with_lock_mode(mut self, lock_mode: LockMode) -> Self {
        self.lock_mode = lock_mode;
        self
    }

    /// Scan, build idmaps, publish `idmap_dir/overlays.list`
    ///
    /// Overlays whose idmap can't be built are left out. Fails if an overlay
    /// directory can't be listed or the catalog can't be written.
    pub fn run(
        &self,
        target_package: &str,
        target_apk: &Path,
        idmap_dir: &Path,
        overlay_dirs: &[PathBuf],
    ) -> Result<Vec<CatalogEntry>, IdmapError> {
        let mut entries = Vec::new();

        for candidate in self.scanner.scan(target_package, overlay_dirs) {
            let candidate = candidate?;
            let idmap_path = idmap_path_for(idmap_dir, &candidate.apk_path);

            if let Err(e) = self
                .manager
                .create_path(target_apk, &candidate.apk_path, &idmap_path)
            {
                warn!("leaving {:?} out of the catalog: {e}", candidate.apk_path);
                continue;
            }

            entries.push(CatalogEntry {
                apk_path: candidate.apk_path,
                idmap_path,
                priority: candidate.priority,
            });
        }

        sort_by_priority(&mut entries);

        let catalog_path = idmap_dir.join(CATALOG_FILE_NAME);
        persist_catalog(&catalog_path, &entries, self.lock_mode)?;
        info!(
            "published {} overlays for {target_package} to {catalog_path:?}",
            entries.len()
        );

        Ok(entries)
    }
}

/// Highest priority first, equal priorities keep discovery order
pub fn sort_by_priority(entries: &mut [CatalogEntry]) {
    // stable sort
    entries.sort_by(|a, b| b.priority.cmp(&a.priority));
}

/// Rewrite `path` with one line per entry and make it world readable
///
/// The file is removed if it can't be made world readable.
pub fn persist_catalog(
    path: &Path,
    entries: &[CatalogEntry],
    lock_mode: LockMode,
) -> Result<(), IdmapError> {
    persist_catalog_with(path, entries, lock_mode, |p| {
        fs::set_permissions(p, Permissions::from_mode(CATALOG_FILE_MODE))
    })
}

fn persist_catalog_with(
    path: &Path,
    entries: &[CatalogEntry],
    lock_mode: LockMode,
    chmod: impl Fn(&Path) -> io::Result<()>,
) -> Result<(), IdmapError> {
    let persist_error = |source| IdmapError::CatalogPersist {
        path: path.to_path_buf(),
        source,
    };

    write_locked(path, entries, lock_mode).map_err(persist_error)?;

    if let Err(e) = retry_interrupted(|| chmod(path)) {
        warn!("can't make {path:?} world readable, removing it");
        if let Err(unlink) = fs::remove_file(path) {
            warn!("can't remove {path:?}: {unlink}");
        }
        return Err(persist_error(e));
    }

    Ok(())
}

fn write_locked(path: &Path, entries: &[CatalogEntry], lock_mode: LockMode) -> io::Result<()> {
    // append keeps the old content intact until the lock is held
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let lock = FileLock::exclusive(&file, lock_mode)?;

    retry_interrupted(|| file.set_len(0))?;

    let mut writer = io::BufWriter::new(&file);
    for entry in entries {
        writer.write_all(entry.apk_path.as_os_str().as_bytes())?;
        writer.write_all(b" ")?;
        writer.write_all(entry.idmap_path.as_os_str().as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    drop(writer);

    lock.unlock()
}

/// Read a catalog under a shared lock, priorities are not stored and come back as 0
pub fn read_catalog(path: &Path, lock_mode: LockMode) -> Result<Vec<CatalogEntry>, IdmapError> {
    let file = File::open(path)?;
    let _lock = FileLock::shared(&file, lock_mode)?;

    let mut entries = Vec::new();
    for line in BufReader::new(&file).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let (apk, idmap) = line.split_once(' ').ok_or_else(|| {
            IdmapError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed catalog line: {line:?}"),
            ))
        })?;

        entries.push(CatalogEntry {
            apk_path: PathBuf::from(apk),
            idmap_path: PathBuf::from(idmap),
            priority: 0,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::ffi::OsStr;

    use super::*;
    use crate::header::IdmapHeader;
    use crate::models::OverlayCandidate;
    use crate::resource_index::{HeaderOnlyIndex, ResourceIndex};
    use crate::scanner::tests::{OverlayManifest, TARGET_PACKAGE, overlay_apk};
    use crate::zip_reader::{ApkZipReader, RESOURCE_TABLE_PATH};

    fn entry(name: &str, priority: i32) -> CatalogEntry {
        CatalogEntry {
            apk_path: PathBuf::from(format!("/vendor/overlay/{name}")),
            idmap_path: PathBuf::from(format!("/data/idmap/{name}.idmap")),
            priority,
        }
    }

    #[test]
    fn flattening() {
        assert_eq!(
            flatten_path(Path::new("/vendor/overlay/Theme.apk")),
            "vendor@overlay@Theme.apk"
        );
        assert_eq!(flatten_path(Path::new("relative/a.apk")), "relative@a.apk");

        // invalid UTF-8 must not collapse into the same replacement character
        let first = flatten_path(Path::new(OsStr::from_bytes(b"/overlay/\xff.apk")));
        let second = flatten_path(Path::new(OsStr::from_bytes(b"/overlay/\xfe.apk")));
        assert_ne!(first, second);
        assert_eq!(first.as_bytes(), b"overlay@\xff.apk");
        assert_eq!(
            idmap_path_for(Path::new("/data/resource-cache"), Path::new("/system/overlay/x.apk")),
            Path::new("/data/resource-cache/system@overlay@x.apk.idmap")
        );
    }

    #[test]
    fn ties_keep_discovery_order() {
        let mut entries = vec![entry("a", 10), entry("b", 5), entry("c", 5), entry("d", 20)];
        sort_by_priority(&mut entries);

        let order: Vec<_> = entries.iter().map(|x| (x.priority, x.apk_path.clone())).collect();
        assert_eq!(
            order,
            [
                (20, PathBuf::from("/vendor/overlay/d")),
                (10, PathBuf::from("/vendor/overlay/a")),
                (5, PathBuf::from("/vendor/overlay/b")),
                (5, PathBuf::from("/vendor/overlay/c")),
            ]
        );
    }

    #[test]
    fn persist_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE_NAME);
        fs::write(&path, "stale content that is much longer than the new catalog\n".repeat(10))
            .unwrap();

        let entries = [entry("high.apk", 2), entry("low.apk", 1)];
        persist_catalog(&path, &entries, LockMode::Blocking).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "/vendor/overlay/high.apk /data/idmap/high.apk.idmap\n\
             /vendor/overlay/low.apk /data/idmap/low.apk.idmap\n"
        );
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o644);

        let read = read_catalog(&path, LockMode::Blocking).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].apk_path, entries[0].apk_path);
        assert_eq!(read[1].idmap_path, entries[1].idmap_path);
    }

    #[test]
    fn failed_chmod_removes_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE_NAME);

        let err = persist_catalog_with(&path, &[entry("a.apk", 1)], LockMode::Blocking, |_| {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .unwrap_err();

        assert!(matches!(err, IdmapError::CatalogPersist { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn empty_catalog_is_still_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE_NAME);
        persist_catalog(&path, &[], LockMode::Blocking).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"");
        assert!(read_catalog(&path, LockMode::Blocking).unwrap().is_empty());
    }

    #[test]
    fn malformed_catalog_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE_NAME);
        fs::write(&path, "/vendor/overlay/a.apk\n").unwrap();

        assert!(read_catalog(&path, LockMode::Blocking).is_err());
    }

    /// Resource index that refuses selected overlays
    struct PickyIndex {
        refuse: Vec<PathBuf>,
        seen: RefCell<Vec<PathBuf>>,
    }

    impl ResourceIndex for PickyIndex {
        fn create_idmap(
            &self,
            target: &Path,
            overlay: &Path,
            target_crc: u32,
            overlay_crc: u32,
        ) -> Result<Vec<u8>, IdmapError> {
            self.seen.borrow_mut().push(overlay.to_path_buf());
            if self.refuse.iter().any(|x| x == overlay) {
                return Err(IdmapError::ResourceIndex("refused".into()));
            }
            HeaderOnlyIndex::default().create_idmap(target, overlay, target_crc, overlay_crc)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        target_apk: PathBuf,
        overlay_dir: PathBuf,
        idmap_dir: PathBuf,
    }

    fn fixture(overlays: &[(&str, i32)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target_apk = dir.path().join("Target.apk");
        fs::write(
            &target_apk,
            idmap_zip::ZipBuilder::new().stored(RESOURCE_TABLE_PATH, b"target table").finish(),
        )
        .unwrap();

        let overlay_dir = dir.path().join("overlay");
        let idmap_dir = dir.path().join("idmap");
        fs::create_dir(&overlay_dir).unwrap();
        fs::create_dir(&idmap_dir).unwrap();

        for (name, priority) in overlays {
            let overlay = OverlayManifest {
                priority: Some(*priority),
                ..Default::default()
            };
            fs::write(overlay_dir.join(name), overlay_apk(overlay, name.as_bytes())).unwrap();
        }

        Fixture {
            _dir: dir,
            target_apk,
            overlay_dir,
            idmap_dir,
        }
    }

    #[test]
    fn run_orders_by_priority() {
        let fx = fixture(&[("a.apk", 10), ("b.apk", 5), ("c.apk", 5), ("d.apk", 20)]);
        let properties: HashMap<String, String> = HashMap::new();
        let index = HeaderOnlyIndex::default();
        let scanner = OverlayScanner::new(&ApkZipReader, &properties);
        let manager = IdmapManager::new(&ApkZipReader, &index);

        let entries = CatalogWriter::new(&scanner, &manager)
            .run(TARGET_PACKAGE, &fx.target_apk, &fx.idmap_dir, &[fx.overlay_dir.clone()])
            .unwrap();

        let priorities: Vec<_> = entries.iter().map(|x| x.priority).collect();
        assert_eq!(priorities, [20, 10, 5, 5]);

        let on_disk = read_catalog(&fx.idmap_dir.join(CATALOG_FILE_NAME), LockMode::Blocking)
            .unwrap();
        let names: Vec<_> = on_disk
            .iter()
            .map(|x| x.apk_path.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["d.apk", "a.apk", "b.apk", "c.apk"]);

        for entry in &on_disk {
            assert_eq!(entry.idmap_path, idmap_path_for(&fx.idmap_dir, &entry.apk_path));
            let header = IdmapHeader::read(&entry.idmap_path).unwrap();
            assert_eq!(header.overlay_path(), entry.apk_path);
        }
    }

    #[test]
    fn failed_idmap_leaves_overlay_out() {
        let fx = fixture(&[("a.apk", 1), ("b.apk", 2)]);
        fs::write(fx.overlay_dir.join("broken.apk"), b"not an apk").unwrap();

        let properties: HashMap<String, String> = HashMap::new();
        let index = PickyIndex {
            refuse: vec![fx.overlay_dir.join("a.apk")],
            seen: RefCell::default(),
        };
        let scanner = OverlayScanner::new(&ApkZipReader, &properties);
        let manager = IdmapManager::new(&ApkZipReader, &index);

        let entries = CatalogWriter::new(&scanner, &manager)
            .run(TARGET_PACKAGE, &fx.target_apk, &fx.idmap_dir, &[fx.overlay_dir.clone()])
            .unwrap();

        assert_eq!(index.seen.borrow().len(), 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].apk_path, fx.overlay_dir.join("b.apk"));
        assert!(!idmap_path_for(&fx.idmap_dir, &fx.overlay_dir.join("a.apk")).exists());
    }

    #[test]
    fn missing_overlay_dir_fails_run() {
        let fx = fixture(&[("a.apk", 1)]);
        let properties: HashMap<String, String> = HashMap::new();
        let index = HeaderOnlyIndex::default();
        let scanner = OverlayScanner::new(&ApkZipReader, &properties);
        let manager = IdmapManager::new(&ApkZipReader, &index);

        let err = CatalogWriter::new(&scanner, &manager)
            .run(
                TARGET_PACKAGE,
                &fx.target_apk,
                &fx.idmap_dir,
                &[fx.overlay_dir.clone(), fx.overlay_dir.join("nope")],
            )
            .unwrap_err();

        assert!(matches!(err, IdmapError::OverlayDirectory { .. }));
        assert!(!fx.idmap_dir.join(CATALOG_FILE_NAME).exists());
    }

    #[test]
    fn candidate_is_serializable() {
        let candidate = OverlayCandidate {
            apk_path: PathBuf::from("/vendor/overlay/a.apk"),
            priority: 1,
            is_static: true,
            required_property: None,
        };
        let json = serde_json::to_string(&candidate).unwrap();
        assert!(json.contains("\"apk_path\":\"/vendor/overlay/a.apk\""));
    }
}
