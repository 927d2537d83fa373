//! Fixtures shared by the worker's unit tests

use claritynow_platform::VmMeta;
use std::fs::File;
use std::path::Path;

pub(crate) const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1">
  <NetworkSection>
    <Network ovf:name="frontend"/>
  </NetworkSection>
</Envelope>
"#;

pub(crate) const NO_NETWORK_DESCRIPTOR: &str = r#"<Envelope><NetworkSection/></Envelope>"#;

/// Write a minimal OVA whose only entry is `descriptor`
pub(crate) fn write_ova(path: &Path, descriptor: &str) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    let mut header = tar::Header::new_ustar();
    header.set_size(descriptor.len() as u64);
    header.set_mode(0o644);
    builder
        .append_data(&mut header, "ClarityNow.ovf", descriptor.as_bytes())
        .unwrap();
    builder.finish().unwrap();
}

pub(crate) fn meta(component: &str, version: &str) -> VmMeta {
    VmMeta {
        component: component.to_string(),
        created: 1234,
        version: version.to_string(),
        configured: true,
        generation: 1,
    }
}

/// Number of file descriptors this process holds open on `path`
#[cfg(target_os = "linux")]
pub(crate) fn open_handles(path: &Path) -> usize {
    let target = std::fs::canonicalize(path).unwrap();
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .filter(|link| *link == target)
        .count()
}
