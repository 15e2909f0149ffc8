use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use log::debug;

/// Read-only view of the system properties
pub trait SystemPropertyStore {
    fn get(&self, name: &str) -> Option<String>;
}

impl SystemPropertyStore for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Properties loaded from a `build.prop` style file
///
/// One `key=value` pair per line, `#` starts a comment line. Later
/// definitions override earlier ones.
#[derive(Debug, Default, Clone)]
pub struct PropertyFile {
    properties: HashMap<String, String>,
}

impl PropertyFile {
    pub fn load(path: &Path) -> io::Result<PropertyFile> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Like [`PropertyFile::load`], but a missing file yields an empty store
    pub fn load_or_empty(path: &Path) -> io::Result<PropertyFile> {
        match Self::load(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("property file {path:?} not found, using empty store");
                Ok(PropertyFile::default())
            }
            other => other,
        }
    }

    pub fn parse(content: &str) -> PropertyFile {
        let properties = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
            .collect();

        PropertyFile { properties }
    }
}

impl SystemPropertyStore for PropertyFile {
    fn get(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }
}
