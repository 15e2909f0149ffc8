//! Discovery of static overlays for a target package
//!
//! Every regular file directly inside an overlay directory is treated as a
//! candidate apk. Broken candidates are skipped with a warning, an overlay
//! directory that can't be listed fails the whole scan.

use std::io;
use std::path::{Path, PathBuf};

use idmap_axml::{AxmlParser, StartTag};
use idmap_zip::ZipError;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::errors::IdmapError;
use crate::models::OverlayCandidate;
use crate::properties::SystemPropertyStore;
use crate::zip_reader::{ANDROID_MANIFEST_PATH, ZipReader};

/// Highest priority an `<overlay>` may declare
pub const MAX_OVERLAY_PRIORITY: i32 = 9999;

/// Priority of an `<overlay>` without the attribute, never emitted
const NO_PRIORITY: i32 = -1;

pub struct OverlayScanner<'a> {
    zip: &'a dyn ZipReader,
    properties: &'a dyn SystemPropertyStore,
}

impl<'a> OverlayScanner<'a> {
    pub fn new(
        zip: &'a dyn ZipReader,
        properties: &'a dyn SystemPropertyStore,
    ) -> OverlayScanner<'a> {
        OverlayScanner { zip, properties }
    }

    /// Lazily walk `overlay_dirs` in order, entries of a directory sorted by name
    pub fn scan(&self, target_package: &str, overlay_dirs: &[PathBuf]) -> OverlayScan<'_, 'a> {
        OverlayScan {
            scanner: self,
            target_package: target_package.to_owned(),
            dirs: overlay_dirs.to_vec().into_iter(),
            current: None,
            failed: false,
        }
    }

    /// Decide on a single apk
    ///
    /// `Ok(None)` means the apk is fine but not an eligible overlay for the target.
    pub fn inspect(
        &self,
        target_package: &str,
        apk: &Path,
    ) -> Result<Option<OverlayCandidate>, IdmapError> {
        let manifest = self.zip.read_entry(apk, ANDROID_MANIFEST_PATH)?;
        let mut parser = AxmlParser::new(&manifest)?;

        let Some(tag) = parser.find_start_tag("overlay")? else {
            debug!("{apk:?}: no <overlay> tag");
            return Ok(None);
        };

        let candidate = Self::candidate_from_tag(apk, &tag)?;

        if !candidate.is_static {
            debug!("{apk:?}: overlay is not static");
            return Ok(None);
        }

        if tag.attr("targetPackage").and_then(|x| x.as_str()) != Some(target_package) {
            debug!("{apk:?}: overlay targets another package");
            return Ok(None);
        }

        if let Some((name, required)) = &candidate.required_property {
            let actual = self.properties.get(name);
            if actual.as_deref() != Some(required.as_str()) {
                debug!("{apk:?}: property {name} is {actual:?}, overlay requires {required:?}");
                return Ok(None);
            }
        }

        if candidate.priority == NO_PRIORITY {
            debug!("{apk:?}: overlay declares no priority");
            return Ok(None);
        }

        Ok(Some(candidate))
    }

    fn candidate_from_tag(apk: &Path, tag: &StartTag) -> Result<OverlayCandidate, IdmapError> {
        let priority = match tag.attr("priority") {
            None => NO_PRIORITY,
            Some(attr) => {
                let priority = attr.as_int().ok_or_else(|| {
                    IdmapError::MalformedManifest(format!("priority is not a number: {attr}"))
                })?;

                if !(0..=MAX_OVERLAY_PRIORITY).contains(&priority) {
                    return Err(IdmapError::MalformedManifest(format!(
                        "priority {priority} is outside 0..={MAX_OVERLAY_PRIORITY}"
                    )));
                }
                priority
            }
        };

        let string_attr = |name: &str| {
            tag.attr(name)
                .and_then(|x| x.as_str())
                .filter(|x| !x.is_empty())
                .map(str::to_owned)
        };

        let required_property = string_attr("requiredSystemPropertyName")
            .zip(string_attr("requiredSystemPropertyValue"));

        Ok(OverlayCandidate {
            apk_path: apk.to_path_buf(),
            priority,
            is_static: tag
                .attr("isStatic")
                .and_then(|x| x.as_bool())
                .unwrap_or(false),
            required_property,
        })
    }
}

/// Single pass over the overlay directories of one scan
pub struct OverlayScan<'s, 'a> {
    scanner: &'s OverlayScanner<'a>,
    target_package: String,
    dirs: std::vec::IntoIter<PathBuf>,
    current: Option<(PathBuf, walkdir::IntoIter)>,
    failed: bool,
}

impl OverlayScan<'_, '_> {
    fn directory_error(&mut self, path: PathBuf, source: io::Error) -> IdmapError {
        self.failed = true;
        self.current = None;
        IdmapError::OverlayDirectory { path, source }
    }
}

impl Iterator for OverlayScan<'_, '_> {
    type Item = Result<OverlayCandidate, IdmapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if self.current.is_none() {
                let dir = self.dirs.next()?;
                let walker = WalkDir::new(&dir)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter();
                self.current = Some((dir, walker));
            }

            let (dir, walker) = self.current.as_mut()?;

            let entry = match walker.next() {
                None => {
                    self.current = None;
                    continue;
                }
                Some(Err(e)) if e.depth() == 0 => {
                    let dir = dir.clone();
                    return Some(Err(self.directory_error(dir, e.into())));
                }
                Some(Err(e)) => {
                    warn!("skipping unreadable entry in {dir:?}: {e}");
                    continue;
                }
                Some(Ok(entry)) => entry,
            };

            if entry.depth() == 0 {
                if !entry.file_type().is_dir() {
                    let dir = dir.clone();
                    return Some(Err(
                        self.directory_error(dir, io::Error::other("not a directory"))
                    ));
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            match self.scanner.inspect(&self.target_package, entry.path()) {
                Ok(Some(candidate)) => return Some(Ok(candidate)),
                Ok(None) => {}
                Err(IdmapError::Zip(ZipError::UnsupportedCompression(method))) => {
                    warn!(
                        "{:?}: {ANDROID_MANIFEST_PATH} uses unsupported compression method {method}, skipping",
                        entry.path()
                    );
                }
                Err(e) => warn!("{:?}: skipping overlay candidate: {e}", entry.path()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::fs;

    use idmap_axml::{AxmlBuilder, BuilderValue};
    use idmap_zip::ZipBuilder;

    use super::*;
    use crate::zip_reader::{ApkZipReader, RESOURCE_TABLE_PATH};

    pub(crate) const TARGET_PACKAGE: &str = "com.example.target";

    /// Overlay `<manifest>` with every attribute the scanner looks at
    #[derive(Clone, Copy)]
    pub(crate) struct OverlayManifest<'a> {
        pub target: &'a str,
        pub priority: Option<i32>,
        pub is_static: bool,
        pub property: Option<(&'a str, &'a str)>,
    }

    impl Default for OverlayManifest<'_> {
        fn default() -> Self {
            OverlayManifest {
                target: TARGET_PACKAGE,
                priority: Some(1),
                is_static: true,
                property: None,
            }
        }
    }

    pub(crate) fn manifest(overlay: OverlayManifest<'_>) -> Vec<u8> {
        let mut attrs = vec![
            ("targetPackage", BuilderValue::String(overlay.target)),
            ("isStatic", BuilderValue::Bool(overlay.is_static)),
        ];
        if let Some(priority) = overlay.priority {
            attrs.push(("priority", BuilderValue::Int(priority)));
        }
        if let Some((name, value)) = overlay.property {
            attrs.push(("requiredSystemPropertyName", BuilderValue::String(name)));
            attrs.push(("requiredSystemPropertyValue", BuilderValue::String(value)));
        }

        AxmlBuilder::new()
            .start("manifest", &[("package", BuilderValue::String("com.example.overlay"))])
            .start("overlay", &attrs)
            .end("overlay")
            .end("manifest")
            .finish()
    }

    pub(crate) fn overlay_apk(overlay: OverlayManifest<'_>, table: &[u8]) -> Vec<u8> {
        ZipBuilder::new()
            .deflated(ANDROID_MANIFEST_PATH, &manifest(overlay))
            .stored(RESOURCE_TABLE_PATH, table)
            .finish()
    }

    fn scan_all(
        properties: &HashMap<String, String>,
        dirs: &[PathBuf],
    ) -> Vec<Result<OverlayCandidate, IdmapError>> {
        let scanner = OverlayScanner::new(&ApkZipReader, properties);
        scanner.scan(TARGET_PACKAGE, dirs).collect()
    }

    fn names(results: Vec<Result<OverlayCandidate, IdmapError>>) -> Vec<String> {
        results
            .into_iter()
            .map(|x| {
                x.unwrap()
                    .apk_path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[test]
    fn picks_static_overlays_for_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.apk"), overlay_apk(OverlayManifest::default(), b"b")).unwrap();
        fs::write(root.join("a.apk"), overlay_apk(OverlayManifest { priority: Some(9999), ..Default::default() }, b"a")).unwrap();
        fs::write(
            root.join("c.apk"),
            overlay_apk(OverlayManifest { is_static: false, ..Default::default() }, b"c"),
        )
        .unwrap();
        fs::write(
            root.join("d.apk"),
            overlay_apk(OverlayManifest { target: "com.example.other", ..Default::default() }, b"d"),
        )
        .unwrap();

        let results = scan_all(&HashMap::new(), &[root.to_path_buf()]);
        assert_eq!(names(results), ["a.apk", "b.apk"]);
    }

    #[test]
    fn reads_every_overlay_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("o.apk");
        let overlay = OverlayManifest {
            priority: Some(42),
            property: Some(("ro.boot.vendor.overlay.theme", "dark")),
            ..Default::default()
        };
        fs::write(&apk, overlay_apk(overlay, b"table")).unwrap();

        let properties = HashMap::from([(
            "ro.boot.vendor.overlay.theme".to_owned(),
            "dark".to_owned(),
        )]);
        let scanner = OverlayScanner::new(&ApkZipReader, &properties);
        let candidate = scanner.inspect(TARGET_PACKAGE, &apk).unwrap().unwrap();

        assert_eq!(
            candidate,
            OverlayCandidate {
                apk_path: apk,
                priority: 42,
                is_static: true,
                required_property: Some((
                    "ro.boot.vendor.overlay.theme".to_owned(),
                    "dark".to_owned()
                )),
            }
        );
    }

    #[test]
    fn required_property_gates_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = OverlayManifest {
            property: Some(("persist.overlay.variant", "blue")),
            ..Default::default()
        };
        fs::write(dir.path().join("o.apk"), overlay_apk(overlay, b"table")).unwrap();
        let dirs = [dir.path().to_path_buf()];

        let mismatch = HashMap::from([("persist.overlay.variant".to_owned(), "red".to_owned())]);
        assert!(scan_all(&mismatch, &dirs).is_empty());
        assert!(scan_all(&HashMap::new(), &dirs).is_empty());

        let matching = HashMap::from([("persist.overlay.variant".to_owned(), "blue".to_owned())]);
        assert_eq!(names(scan_all(&matching, &dirs)), ["o.apk"]);

        // a name without a value is no requirement at all
        let overlay = OverlayManifest {
            property: Some(("persist.overlay.variant", "")),
            ..Default::default()
        };
        fs::write(dir.path().join("o.apk"), overlay_apk(overlay, b"table")).unwrap();
        assert_eq!(names(scan_all(&mismatch, &dirs)), ["o.apk"]);
    }

    #[test]
    fn bad_priorities_reject_only_that_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("high.apk"), overlay_apk(OverlayManifest { priority: Some(10000), ..Default::default() }, b"")).unwrap();
        fs::write(root.join("negative.apk"), overlay_apk(OverlayManifest { priority: Some(-5), ..Default::default() }, b"")).unwrap();
        fs::write(root.join("missing.apk"), overlay_apk(OverlayManifest { priority: None, ..Default::default() }, b"")).unwrap();
        fs::write(root.join("zero.apk"), overlay_apk(OverlayManifest { priority: Some(0), ..Default::default() }, b"")).unwrap();

        let properties: HashMap<String, String> = HashMap::new();
        let scanner = OverlayScanner::new(&ApkZipReader, &properties);
        assert!(matches!(
            scanner.inspect(TARGET_PACKAGE, &root.join("high.apk")),
            Err(IdmapError::MalformedManifest(_))
        ));
        assert!(matches!(
            scanner.inspect(TARGET_PACKAGE, &root.join("missing.apk")),
            Ok(None)
        ));

        let results = scan_all(&HashMap::new(), &[root.to_path_buf()]);
        assert_eq!(names(results), ["zero.apk"]);
    }

    #[test]
    fn broken_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("0-corrupt.apk"), b"PK\x03\x04 but nothing else").unwrap();
        fs::write(
            root.join("1-lzma.apk"),
            ZipBuilder::new()
                .raw_entry(ANDROID_MANIFEST_PATH, 14, &manifest(OverlayManifest::default()))
                .finish(),
        )
        .unwrap();
        fs::write(
            root.join("2-no-manifest.apk"),
            ZipBuilder::new().stored(RESOURCE_TABLE_PATH, b"t").finish(),
        )
        .unwrap();
        fs::write(
            root.join("3-plain-xml.apk"),
            ZipBuilder::new()
                .stored(ANDROID_MANIFEST_PATH, b"<manifest><overlay/></manifest>")
                .finish(),
        )
        .unwrap();
        fs::create_dir(root.join("4-subdir")).unwrap();
        fs::write(
            root.join("4-subdir").join("nested.apk"),
            overlay_apk(OverlayManifest::default(), b""),
        )
        .unwrap();
        fs::write(root.join("5-good.apk"), overlay_apk(OverlayManifest::default(), b"")).unwrap();

        let properties: HashMap<String, String> = HashMap::new();
        let scanner = OverlayScanner::new(&ApkZipReader, &properties);
        assert!(matches!(
            scanner.inspect(TARGET_PACKAGE, &root.join("1-lzma.apk")),
            Err(IdmapError::Zip(ZipError::UnsupportedCompression(14)))
        ));

        let results = scan_all(&HashMap::new(), &[root.to_path_buf()]);
        assert_eq!(names(results), ["5-good.apk"]);
    }

    #[test]
    fn unreadable_directory_fails_scan() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        fs::create_dir(&good).unwrap();
        fs::write(good.join("o.apk"), overlay_apk(OverlayManifest::default(), b"")).unwrap();
        let missing = dir.path().join("missing");

        let results = scan_all(&HashMap::new(), &[good.clone(), missing.clone(), good.clone()]);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(IdmapError::OverlayDirectory { path, .. }) if *path == missing
        ));

        let not_a_dir = good.join("o.apk");
        let results = scan_all(&HashMap::new(), &[not_a_dir]);
        assert!(matches!(results[..], [Err(IdmapError::OverlayDirectory { .. })]));
    }

    #[test]
    fn directories_are_visited_in_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("z-first");
        let second = dir.path().join("a-second");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::write(first.join("y.apk"), overlay_apk(OverlayManifest::default(), b"")).unwrap();
        fs::write(second.join("x.apk"), overlay_apk(OverlayManifest::default(), b"")).unwrap();

        let results = scan_all(&HashMap::new(), &[first, second]);
        assert_eq!(names(results), ["y.apk", "x.apk"]);
    }
}
