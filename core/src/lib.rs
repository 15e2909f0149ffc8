//! Lifecycle of Android resource overlay idmaps
//!
//! Builds idmap files for (target, overlay) apk pairs, decides when an
//! existing idmap is stale, discovers static overlays in overlay directories
//! and publishes the priority ordered `overlays.list` catalog.

pub mod catalog;
pub mod errors;
pub mod header;
pub mod idmap;
pub mod lock;
pub mod manager;
pub mod models;
pub mod properties;
pub mod resource_index;
pub mod scanner;
pub mod staleness;
pub mod zip_reader;

pub use catalog::{CatalogWriter, idmap_path_for, persist_catalog, read_catalog};
pub use errors::{HeaderError, IdmapError};
pub use header::IdmapHeader;
pub use idmap::{Idmap, IdmapPayload, TypeBlock};
pub use lock::LockMode;
pub use manager::IdmapManager;
pub use models::{CatalogEntry, IdmapJson, OverlayCandidate};
pub use properties::{PropertyFile, SystemPropertyStore};
pub use resource_index::{HeaderOnlyIndex, ResourceIndex};
pub use scanner::OverlayScanner;
pub use staleness::{StaleReason, is_idmap_stale, is_idmap_stale_path};
pub use zip_reader::{ApkZipReader, ZipReader};
