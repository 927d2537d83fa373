//! ClarityNow Worker
//!
//! Executes queued ClarityNow tasks against the virtualization platform:
//! listing, creating, deleting and re-networking appliance instances, and
//! listing the image versions that can be deployed.

pub mod catalog;
pub mod config;
pub mod configurator;
pub mod error;
pub mod lifecycle;
pub mod tasks;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{name_from_version, version_from_name, ImageCatalog};
pub use config::Config;
pub use error::{LifecycleError, Result};
pub use lifecycle::{ClarityNow, IpWait, Lookup};
pub use worker::{start_workers, Worker, WorkerConfig};
