//! Image catalog
//!
//! Images live in one directory, named `ClarityNow-<version>.ova`.

use crate::error::{LifecycleError, Result};
use claritynow_common::COMPONENT;
use claritynow_platform::{Ova, PlatformError};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const EXTENSION: &str = ".ova";

/// File name of the image holding `version`
pub fn name_from_version(version: &str) -> String {
    format!("{}-{}{}", COMPONENT, version, EXTENSION)
}

/// Version held by the image file `name`
pub fn version_from_name(name: &str) -> String {
    let stem = name.strip_suffix(EXTENSION).unwrap_or(name);
    stem.rsplit('-').next().unwrap_or_default().to_string()
}

/// Installable images on disk
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    dir: PathBuf,
}

impl ImageCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Versions available right now; the directory is re-read on every call
    pub fn list_images(&self) -> Result<BTreeSet<String>> {
        let mut versions = BTreeSet::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            versions.insert(version_from_name(&entry.file_name().to_string_lossy()));
        }

        debug!("Found {} images in {}", versions.len(), self.dir.display());
        Ok(versions)
    }

    pub fn image_path(&self, version: &str) -> PathBuf {
        self.dir.join(name_from_version(version))
    }

    /// Open the image for `version`
    pub fn open(&self, version: &str) -> Result<Ova> {
        let invalid = || LifecycleError::Validation(format!("Invalid version: {}", version));

        let path = self.image_path(version);
        if !path.is_file() {
            return Err(invalid());
        }

        match Ova::open(&path) {
            Ok(ova) => Ok(ova),
            Err(PlatformError::Io(e)) if e.kind() == ErrorKind::NotFound => Err(invalid()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_ova, DESCRIPTOR};

    #[test]
    fn test_name_from_version() {
        assert_eq!(name_from_version("2.11.0"), "ClarityNow-2.11.0.ova");
    }

    #[test]
    fn test_version_round_trip() {
        for version in ["2.11.0", "3.28", "1", "2019.6.20", "rc1"] {
            assert_eq!(version_from_name(&name_from_version(version)), version);
        }
    }

    #[test]
    fn test_version_from_empty_name() {
        assert_eq!(version_from_name(""), "");
    }

    #[test]
    fn test_version_strips_one_suffix_only() {
        assert_eq!(version_from_name("ClarityNow-1.ova.ova"), "1.ova");
        assert_eq!(version_from_name("2.11.0"), "2.11.0");
    }

    #[test]
    fn test_list_images() {
        let dir = tempfile::tempdir().unwrap();
        for version in ["2.11.0", "3.28", "1.0.0"] {
            std::fs::write(dir.path().join(name_from_version(version)), b"").unwrap();
        }

        let catalog = ImageCatalog::new(dir.path());
        let expected: BTreeSet<String> = ["1.0.0", "2.11.0", "3.28"]
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(catalog.list_images().unwrap(), expected);

        // No caching: new files show up on the next call
        std::fs::write(dir.path().join(name_from_version("4.0")), b"").unwrap();
        assert!(catalog.list_images().unwrap().contains("4.0"));
    }

    #[test]
    fn test_list_images_missing_directory() {
        let catalog = ImageCatalog::new("/definitely/not/an/image/dir");
        assert!(matches!(
            catalog.list_images().unwrap_err(),
            LifecycleError::Io(_)
        ));
    }

    #[test]
    fn test_open_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ImageCatalog::new(dir.path());

        let err = catalog.open("9.9.9").unwrap_err();
        assert!(matches!(&err, LifecycleError::Validation(_)));
        assert!(err.to_string().contains("9.9.9"));
    }

    #[test]
    fn test_open_known_version() {
        let dir = tempfile::tempdir().unwrap();
        write_ova(&dir.path().join(name_from_version("2.11.0")), DESCRIPTOR);
        let catalog = ImageCatalog::new(dir.path());

        let ova = catalog.open("2.11.0").unwrap();
        assert_eq!(ova.networks(), ["frontend".to_string()]);
        ova.close();
    }
}
