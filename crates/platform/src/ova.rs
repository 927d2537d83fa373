//! OVA image handle
//!
//! An OVA is a tar archive whose OVF descriptor lists, among other things, the
//! virtual networks the appliance expects to be attached to.

use crate::error::{PlatformError, Result};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

fn network_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<(?:ovf:)?Network\s+ovf:name="([^"]+)""#).expect("network regex is valid")
    })
}

/// An opened OVA. The underlying file stays open until the handle is closed
/// or dropped.
#[derive(Debug)]
pub struct Ova {
    path: PathBuf,
    descriptor: String,
    networks: Vec<String>,
    file: File,
}

impl Ova {
    /// Open an OVA and read its descriptor
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        let (descriptor, contents) = read_descriptor(&file, &path)?;
        let networks = parse_networks(&contents);
        debug!(
            "Opened {} ({}), networks: {:?}",
            path.display(),
            descriptor,
            networks
        );

        Ok(Self {
            path,
            descriptor,
            networks,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the `.ovf` entry inside the archive
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Network labels declared by the descriptor, in document order
    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    /// Release the file handle
    pub fn close(self) {
        debug!("Closing {}", self.path.display());
        drop(self.file);
    }
}

fn read_descriptor(file: &File, path: &Path) -> Result<(String, String)> {
    let invalid = |reason: String| PlatformError::InvalidOva {
        path: path.display().to_string(),
        reason,
    };

    let mut archive = tar::Archive::new(file);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_path_buf();
        if entry_path.extension().and_then(|ext| ext.to_str()) == Some("ovf") {
            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .map_err(|e| invalid(format!("unreadable descriptor: {}", e)))?;
            return Ok((entry_path.display().to_string(), contents));
        }
    }

    Err(invalid("no .ovf descriptor in archive".to_string()))
}

fn parse_networks(descriptor: &str) -> Vec<String> {
    network_regex()
        .captures_iter(descriptor)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns="http://schemas.dmtf.org/ovf/envelope/1" xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1">
  <NetworkSection>
    <Info>The list of logical networks</Info>
    <Network ovf:name="frontend">
      <Description>The frontend network</Description>
    </Network>
  </NetworkSection>
</Envelope>
"#;

    /// Write a minimal OVA containing `descriptor` to `path`
    pub(crate) fn write_ova(path: &Path, descriptor: Option<&str>) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);

        if let Some(descriptor) = descriptor {
            let mut header = tar::Header::new_ustar();
            header.set_size(descriptor.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "ClarityNow.ovf", descriptor.as_bytes())
                .unwrap();
        }

        let disk = b"not really a disk";
        let mut header = tar::Header::new_ustar();
        header.set_size(disk.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "ClarityNow-disk1.vmdk", &disk[..])
            .unwrap();

        builder.finish().unwrap();
    }

    #[test]
    fn test_parse_networks() {
        assert_eq!(parse_networks(DESCRIPTOR), vec!["frontend"]);
        assert_eq!(
            parse_networks(r#"<ovf:Network ovf:name="a"/><ovf:Network ovf:name="b"/>"#),
            vec!["a", "b"]
        );
        assert!(parse_networks("<Envelope/>").is_empty());
    }

    #[test]
    fn test_open_reads_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ClarityNow-2.11.0.ova");
        write_ova(&path, Some(DESCRIPTOR));

        let ova = Ova::open(&path).unwrap();
        assert_eq!(ova.descriptor(), "ClarityNow.ovf");
        assert_eq!(ova.networks(), ["frontend".to_string()]);
        assert_eq!(ova.path(), path.as_path());
        ova.close();
    }

    #[test]
    fn test_open_without_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ClarityNow-2.11.0.ova");
        write_ova(&path, None);

        let err = Ova::open(&path).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidOva { .. }));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Ova::open("/definitely/not/here.ova").unwrap_err();
        assert!(matches!(err, PlatformError::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
