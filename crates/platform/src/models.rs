//! Data models exchanged with the virtualization platform

use serde::{Deserialize, Serialize};

/// Kind of object found inside a namespace folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    VirtualMachine,
    Folder,
}

/// A child of a namespace folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Platform object id
    pub id: String,

    /// Display name, unique within the folder
    pub name: String,

    pub kind: EntityKind,
}

impl Entity {
    pub fn is_vm(&self) -> bool {
        self.kind == EntityKind::VirtualMachine
    }
}

/// Reference to a deployed virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRef {
    pub id: String,
    pub name: String,
}

impl From<&Entity> for VmRef {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
        }
    }
}

/// Power state of a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
}

/// Structured metadata tagged onto a managed VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmMeta {
    /// Which appliance type owns the VM
    pub component: String,

    /// Unix timestamp of creation
    pub created: i64,

    /// Appliance version
    pub version: String,

    /// Whether post-provision configuration finished
    pub configured: bool,

    pub generation: u32,
}

/// Descriptive info the platform reports for a VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    pub state: PowerState,

    /// Web console URL
    pub console: String,

    /// Guest IP addresses, empty until the guest reports them
    pub ips: Vec<String>,

    /// Names of attached networks
    pub networks: Vec<String>,

    /// Platform object id
    pub moid: String,

    /// Metadata tags; `None` for VMs this service never tagged
    pub meta: Option<VmMeta>,
}

impl VmInfo {
    /// Component tag, if the VM carries metadata
    pub fn component(&self) -> Option<&str> {
        self.meta.as_ref().map(|meta| meta.component.as_str())
    }
}

/// A live network from the platform's network table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
}

/// Binds a network label declared by an image to a live network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMapping {
    /// Network label from the image descriptor
    pub name: String,
    pub network: Network,
}

/// A program to run inside a guest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCommand {
    pub program: String,
    pub arguments: String,
    pub user: String,
    pub password: String,
}

impl GuestCommand {
    /// Command line as it would appear in the guest's process table
    pub fn cmd_line(&self) -> String {
        format!("\"{}\" {}", self.program, self.arguments)
    }
}

/// Outcome of a guest command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status; `None` while the platform has no status to report
    pub exit_code: Option<i32>,
    pub cmd_line: String,
}

impl CommandResult {
    /// A command failed only when it reported a non-zero status
    pub fn failed(&self) -> bool {
        matches!(self.exit_code, Some(code) if code != 0)
    }
}
