//! Virtualization platform capabilities
//!
//! The ClarityNow worker never talks to a hypervisor directly. Everything it
//! needs is expressed by [`Platform`] (open a session) and [`Session`] (the
//! operations available while connected). Two implementations ship here:
//!
//! - [`SimulatedPlatform`]: in-memory, for development and tests
//! - [`GatewayPlatform`]: JSON over HTTP to a platform gateway

pub mod error;
pub mod gateway;
pub mod models;
pub mod ova;
pub mod simulated;

use async_trait::async_trait;

pub use error::{PlatformError, Result};
pub use gateway::GatewayPlatform;
pub use models::{
    CommandResult, Entity, EntityKind, GuestCommand, Network, NetworkMapping, PowerState,
    VmInfo, VmMeta, VmRef,
};
pub use ova::Ova;
pub use simulated::SimulatedPlatform;

/// Entry point to the virtualization platform
#[async_trait]
pub trait Platform: Send + Sync {
    /// Open a new session. Callers must `disconnect` it when done.
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// Operations available on an open platform session
#[async_trait]
pub trait Session: Send + Sync {
    /// Children of the folder named `folder`.
    /// Fails with [`PlatformError::NotFound`] when the folder does not exist.
    async fn folder_children(&self, folder: &str) -> Result<Vec<Entity>>;

    /// Descriptive info for a VM
    async fn vm_info(&self, vm: &VmRef) -> Result<VmInfo>;

    /// Resolve a network by name in the live network table
    async fn network(&self, name: &str) -> Result<Option<Network>>;

    /// Deploy `ova` as `name` inside `folder`, blocking until the VM exists
    async fn deploy_from_ova(
        &self,
        ova: &Ova,
        mappings: &[NetworkMapping],
        folder: &str,
        name: &str,
    ) -> Result<VmRef>;

    async fn power(&self, vm: &VmRef, state: PowerState) -> Result<()>;

    /// Destroy a VM, blocking until the platform reports completion
    async fn destroy(&self, vm: &VmRef) -> Result<()>;

    /// Run a command in the guest and wait for it to exit
    async fn run_command(&self, vm: &VmRef, command: &GuestCommand) -> Result<CommandResult>;

    /// Replace the VM's metadata tags
    async fn set_meta(&self, vm: &VmRef, meta: &VmMeta) -> Result<()>;

    /// Re-point the VM's network adapter at `network`
    async fn change_network(&self, vm: &VmRef, network: &Network) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}
