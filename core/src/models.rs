use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::idmap::{Idmap, TypeBlock};

/// Overlay apk that passed the scan filters
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OverlayCandidate {
    #[serde(serialize_with = "lossy_path")]
    pub apk_path: PathBuf,

    /// 0..=9999, higher wins
    pub priority: i32,

    pub is_static: bool,

    /// `(requiredSystemPropertyName, requiredSystemPropertyValue)` if both are set
    pub required_property: Option<(String, String)>,
}

/// One line of `overlays.list`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    #[serde(serialize_with = "lossy_path")]
    pub apk_path: PathBuf,

    #[serde(serialize_with = "lossy_path")]
    pub idmap_path: PathBuf,

    /// Not persisted, the line order carries it
    #[serde(skip)]
    pub priority: i32,
}

/// Dump of an idmap file for `--inspect`
#[derive(Serialize, Debug)]
pub struct IdmapJson {
    pub magic: u32,

    pub version: u32,

    pub target_crc32: u32,

    pub overlay_crc32: u32,

    #[serde(serialize_with = "lossy_path")]
    pub target_path: PathBuf,

    #[serde(serialize_with = "lossy_path")]
    pub overlay_path: PathBuf,

    pub target_package_id: u16,

    pub types: Vec<TypeBlock>,
}

impl From<&Idmap> for IdmapJson {
    fn from(idmap: &Idmap) -> Self {
        IdmapJson {
            magic: idmap.header.magic,
            version: idmap.header.version,
            target_crc32: idmap.header.target_crc32,
            overlay_crc32: idmap.header.overlay_crc32,
            target_path: idmap.header.target_path().to_path_buf(),
            overlay_path: idmap.header.overlay_path().to_path_buf(),
            target_package_id: idmap.payload.target_package_id,
            types: idmap.payload.types.clone(),
        }
    }
}

fn lossy_path<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::IdmapHeader;
    use crate::idmap::{IdmapPayload, NO_ENTRY};

    #[test]
    fn idmap_json_shape() {
        let idmap = Idmap {
            header: IdmapHeader::new(
                7,
                8,
                Path::new("/system/app/T.apk"),
                Path::new("/vendor/overlay/O.apk"),
            )
            .unwrap(),
            payload: IdmapPayload {
                target_package_id: 0x7f,
                types: vec![TypeBlock {
                    target_type_id: 2,
                    overlay_type_id: 1,
                    entry_offset: 0,
                    entries: vec![0, NO_ENTRY],
                }],
            },
        };

        let json = serde_json::to_value(IdmapJson::from(&idmap)).unwrap();
        assert_eq!(json["target_path"], "/system/app/T.apk");
        assert_eq!(json["overlay_path"], "/vendor/overlay/O.apk");
        assert_eq!(json["target_crc32"], 7);
        assert_eq!(json["target_package_id"], 0x7f);
        assert_eq!(
            json["types"],
            serde_json::json!([{
                "target_type_id": 2,
                "overlay_type_id": 1,
                "entry_offset": 0,
                "entries": [0, NO_ENTRY],
            }])
        );
    }

    #[test]
    fn catalog_entry_hides_priority() {
        let entry = CatalogEntry {
            apk_path: PathBuf::from("/vendor/overlay/a.apk"),
            idmap_path: PathBuf::from("/data/idmap/vendor@overlay@a.apk.idmap"),
            priority: 3,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("priority").is_none());
        assert_eq!(json["idmap_path"], "/data/idmap/vendor@overlay@a.apk.idmap");
    }
}
