//! Appliance lifecycle operations
//!
//! Every operation opens its own platform session and closes it on every
//! exit path. A user's instances live in a folder named after the user; an
//! instance belongs to this service when its metadata carries the
//! `ClarityNow` component tag.

use crate::catalog::ImageCatalog;
use crate::configurator;
use crate::error::{LifecycleError, Result};
use chrono::Utc;
use claritynow_common::COMPONENT;
use claritynow_platform::{
    NetworkMapping, Ova, Platform, PlatformError, PowerState, Session, VmInfo, VmMeta, VmRef,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long `create` waits for a new instance to report an IP address
#[derive(Debug, Clone, Copy)]
pub struct IpWait {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for IpWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Result of looking an instance up by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(VmRef),
    /// The namespace exists but holds no matching instance
    Missing,
    /// The user has no namespace at all
    NoNamespace,
}

impl Lookup {
    fn into_vm(self, username: &str, machine_name: &str) -> Result<VmRef> {
        match self {
            Lookup::Found(vm) => Ok(vm),
            Lookup::Missing => Err(LifecycleError::Validation(format!(
                "No claritynow named {} found",
                machine_name
            ))),
            Lookup::NoNamespace => Err(no_namespace(username)),
        }
    }
}

fn no_namespace(username: &str) -> LifecycleError {
    LifecycleError::Validation(format!("No namespace named {} found", username))
}

/// Find the instance named `machine_name` in `username`'s namespace.
/// Names match exactly; the first VM with a matching name and tag wins.
pub async fn find_machine(
    session: &dyn Session,
    username: &str,
    machine_name: &str,
) -> Result<Lookup> {
    let children = match session.folder_children(username).await {
        Ok(children) => children,
        Err(PlatformError::NotFound { .. }) => return Ok(Lookup::NoNamespace),
        Err(e) => return Err(e.into()),
    };

    for entity in children
        .iter()
        .filter(|entity| entity.is_vm() && entity.name == machine_name)
    {
        let vm = VmRef::from(entity);
        let info = session.vm_info(&vm).await?;
        if info.component() == Some(COMPONENT) {
            return Ok(Lookup::Found(vm));
        }
        debug!("Skipping {}: not a {} instance", entity.name, COMPONENT);
    }

    Ok(Lookup::Missing)
}

/// Close a session, keeping the operation's own result
async fn finish<T>(session: Box<dyn Session>, result: Result<T>) -> Result<T> {
    if let Err(e) = session.disconnect().await {
        warn!("Failed to disconnect platform session: {}", e);
    }
    result
}

/// ClarityNow lifecycle operations against one platform
pub struct ClarityNow {
    platform: Arc<dyn Platform>,
    catalog: ImageCatalog,
    ip_wait: IpWait,
}

impl ClarityNow {
    pub fn new(platform: Arc<dyn Platform>, catalog: ImageCatalog, ip_wait: IpWait) -> Self {
        Self {
            platform,
            catalog,
            ip_wait,
        }
    }

    pub fn catalog(&self) -> &ImageCatalog {
        &self.catalog
    }

    /// Versions that can be deployed
    pub fn list_images(&self) -> Result<BTreeSet<String>> {
        self.catalog.list_images()
    }

    /// Every ClarityNow instance `username` owns, keyed by name
    pub async fn show(&self, username: &str) -> Result<BTreeMap<String, VmInfo>> {
        let session = self.platform.connect().await?;
        let result = show_in(session.as_ref(), username).await;
        finish(session, result).await
    }

    /// Deploy, configure and tag a new instance
    pub async fn create(
        &self,
        username: &str,
        machine_name: &str,
        version: &str,
        network: &str,
    ) -> Result<BTreeMap<String, VmInfo>> {
        let session = self.platform.connect().await?;
        let result = self
            .create_in(session.as_ref(), username, machine_name, version, network)
            .await;
        finish(session, result).await
    }

    /// Power off and destroy an instance
    pub async fn delete(&self, username: &str, machine_name: &str) -> Result<()> {
        let session = self.platform.connect().await?;
        let result = delete_in(session.as_ref(), username, machine_name).await;
        finish(session, result).await
    }

    /// Re-point an instance's network adapter
    pub async fn update_network(
        &self,
        username: &str,
        machine_name: &str,
        new_network: &str,
    ) -> Result<()> {
        let session = self.platform.connect().await?;
        let result =
            update_network_in(session.as_ref(), username, machine_name, new_network).await;
        finish(session, result).await
    }

    async fn create_in(
        &self,
        session: &dyn Session,
        username: &str,
        machine_name: &str,
        version: &str,
        network: &str,
    ) -> Result<BTreeMap<String, VmInfo>> {
        let ova = self.catalog.open(version)?;
        info!("Deploying {} as {}", ova.path().display(), machine_name);

        // The image is released before anything else can fail
        let deployed = deploy(session, &ova, username, machine_name, network).await;
        ova.close();
        let vm = deployed?;

        configurator::setup_vm(session, &vm).await?;

        let meta = VmMeta {
            component: COMPONENT.to_string(),
            created: Utc::now().timestamp(),
            version: version.to_string(),
            configured: true,
            generation: 1,
        };
        session.set_meta(&vm, &meta).await?;

        let info = self.wait_for_ip(session, &vm).await?;
        Ok(BTreeMap::from([(machine_name.to_string(), info)]))
    }

    /// Poll the VM's info until the guest reports an IP address
    async fn wait_for_ip(&self, session: &dyn Session, vm: &VmRef) -> Result<VmInfo> {
        let deadline = Instant::now() + self.ip_wait.timeout;

        loop {
            let info = session.vm_info(vm).await?;
            if !info.ips.is_empty() {
                return Ok(info);
            }
            if Instant::now() >= deadline {
                return Err(PlatformError::Timeout(format!("an IP address on {}", vm.name)).into());
            }

            debug!("Waiting for {} to report an IP address", vm.name);
            tokio::time::sleep(self.ip_wait.interval).await;
        }
    }
}

async fn deploy(
    session: &dyn Session,
    ova: &Ova,
    username: &str,
    machine_name: &str,
    network: &str,
) -> Result<VmRef> {
    let label = ova.networks().first().ok_or_else(|| {
        LifecycleError::InvalidImage(format!("{} declares no network", ova.path().display()))
    })?;

    let live = session
        .network(network)
        .await?
        .ok_or_else(|| LifecycleError::Validation(format!("No such network named {}", network)))?;

    let mapping = NetworkMapping {
        name: label.clone(),
        network: live,
    };

    Ok(session
        .deploy_from_ova(ova, &[mapping], username, machine_name)
        .await?)
}

async fn show_in(session: &dyn Session, username: &str) -> Result<BTreeMap<String, VmInfo>> {
    let children = match session.folder_children(username).await {
        Ok(children) => children,
        Err(PlatformError::NotFound { .. }) => return Err(no_namespace(username)),
        Err(e) => return Err(e.into()),
    };

    let mut instances = BTreeMap::new();
    for entity in children.iter().filter(|entity| entity.is_vm()) {
        let info = session.vm_info(&VmRef::from(entity)).await?;
        if info.component() == Some(COMPONENT) {
            instances.insert(entity.name.clone(), info);
        }
    }

    Ok(instances)
}

async fn delete_in(session: &dyn Session, username: &str, machine_name: &str) -> Result<()> {
    let vm = find_machine(session, username, machine_name)
        .await?
        .into_vm(username, machine_name)?;

    debug!("Powering off {}", vm.name);
    session.power(&vm, PowerState::PoweredOff).await?;

    debug!("Blocking while {} is being destroyed", vm.name);
    session.destroy(&vm).await?;

    info!("Destroyed {}", vm.name);
    Ok(())
}

async fn update_network_in(
    session: &dyn Session,
    username: &str,
    machine_name: &str,
    new_network: &str,
) -> Result<()> {
    let vm = find_machine(session, username, machine_name)
        .await?
        .into_vm(username, machine_name)?;

    let network = session.network(new_network).await?.ok_or_else(|| {
        LifecycleError::Validation(format!("No such network named {}", new_network))
    })?;

    session.change_network(&vm, &network).await?;
    info!("Moved {} to network {}", vm.name, network.name);
    Ok(())
}
