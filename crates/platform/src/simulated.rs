//! In-memory virtualization platform for development and testing
//!
//! Simulates folders, networks and VMs without a hypervisor. Every call is
//! recorded so tests can assert on what the worker asked for.

use crate::error::{PlatformError, Result};
use crate::models::{
    CommandResult, Entity, EntityKind, GuestCommand, Network, NetworkMapping, PowerState,
    VmInfo, VmMeta, VmRef,
};
use crate::ova::Ova;
use crate::{Platform, Session};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A simulated VM
#[derive(Debug, Clone, PartialEq)]
pub struct SimVm {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub state: PowerState,
    pub networks: Vec<String>,
    pub meta: Option<VmMeta>,
    /// Polls of `vm_info` left before the guest reports an IP
    pub ip_delay: u32,
}

#[derive(Debug, Default)]
struct State {
    folders: BTreeMap<String, Vec<SimVm>>,
    networks: BTreeMap<String, Network>,
    exit_codes: VecDeque<Option<i32>>,
    ip_delay: u32,
    next_id: u32,
    calls: Vec<String>,
    commands: Vec<GuestCommand>,
    open_sessions: usize,
    sessions_opened: usize,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("vm-{}", self.next_id)
    }

    fn find_vm(&mut self, vm: &VmRef) -> Result<&mut SimVm> {
        self.folders
            .values_mut()
            .flat_map(|children| children.iter_mut())
            .find(|child| child.id == vm.id)
            .ok_or_else(|| PlatformError::NotFound {
                kind: "virtual machine",
                name: vm.name.clone(),
            })
    }
}

/// Simulated platform. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<State>>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty namespace folder
    pub fn add_folder(&self, folder: &str) -> &Self {
        self.lock().folders.entry(folder.to_string()).or_default();
        self
    }

    /// Add a network to the live network table
    pub fn add_network(&self, name: &str) -> &Self {
        let mut state = self.lock();
        let id = format!("network-{}", state.networks.len() + 1);
        state.networks.insert(
            name.to_string(),
            Network {
                id,
                name: name.to_string(),
            },
        );
        self
    }

    /// Place an existing, powered-on VM in `folder`
    pub fn add_vm(&self, folder: &str, name: &str, meta: Option<VmMeta>) -> VmRef {
        let mut state = self.lock();
        let id = state.next_id();
        let vm = SimVm {
            id: id.clone(),
            name: name.to_string(),
            kind: EntityKind::VirtualMachine,
            state: PowerState::PoweredOn,
            networks: Vec::new(),
            meta,
            ip_delay: 0,
        };
        state.folders.entry(folder.to_string()).or_default().push(vm);
        VmRef {
            id,
            name: name.to_string(),
        }
    }

    /// Place a sub-folder in `folder`
    pub fn add_subfolder(&self, folder: &str, name: &str) {
        let mut state = self.lock();
        let id = format!("group-{}", name);
        let child = SimVm {
            id,
            name: name.to_string(),
            kind: EntityKind::Folder,
            state: PowerState::PoweredOff,
            networks: Vec::new(),
            meta: None,
            ip_delay: 0,
        };
        state.folders.entry(folder.to_string()).or_default().push(child);
    }

    /// Exit codes for upcoming guest commands, consumed in order.
    /// Commands beyond the queue exit with 0.
    pub fn queue_exit_codes(&self, codes: impl IntoIterator<Item = Option<i32>>) {
        self.lock().exit_codes.extend(codes);
    }

    /// Number of `vm_info` polls a newly deployed VM needs before it has an IP
    pub fn set_ip_delay(&self, polls: u32) {
        self.lock().ip_delay = polls;
    }

    /// Look up a VM by folder and name
    pub fn vm(&self, folder: &str, name: &str) -> Option<SimVm> {
        self.lock()
            .folders
            .get(folder)
            .and_then(|children| children.iter().find(|vm| vm.name == name).cloned())
    }

    /// Every operation issued, in order, e.g. `power:vm-1:poweredOff`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Guest commands issued, in order
    pub fn commands(&self) -> Vec<GuestCommand> {
        self.lock().commands.clone()
    }

    /// Sessions currently connected
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// Sessions opened over the platform's lifetime
    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }
}

#[async_trait]
impl Platform for SimulatedPlatform {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let mut state = self.lock();
        state.open_sessions += 1;
        state.sessions_opened += 1;
        debug!("Simulated platform: session opened");

        Ok(Box::new(SimulatedSession {
            platform: self.clone(),
        }))
    }
}

/// Session on a [`SimulatedPlatform`]
pub struct SimulatedSession {
    platform: SimulatedPlatform,
}

impl SimulatedSession {
    fn record(&self, call: String) -> MutexGuard<'_, State> {
        let mut state = self.platform.lock();
        debug!("Simulated platform: {}", call);
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl Session for SimulatedSession {
    async fn folder_children(&self, folder: &str) -> Result<Vec<Entity>> {
        let state = self.record(format!("folder_children:{}", folder));
        let children = state.folders.get(folder).ok_or_else(|| PlatformError::NotFound {
            kind: "folder",
            name: folder.to_string(),
        })?;

        Ok(children
            .iter()
            .map(|child| Entity {
                id: child.id.clone(),
                name: child.name.clone(),
                kind: child.kind,
            })
            .collect())
    }

    async fn vm_info(&self, vm: &VmRef) -> Result<VmInfo> {
        let mut state = self.record(format!("vm_info:{}", vm.id));
        let sim = state.find_vm(vm)?;

        let ips = if sim.ip_delay > 0 {
            sim.ip_delay -= 1;
            Vec::new()
        } else if sim.state == PowerState::PoweredOn {
            let suffix: u32 = sim.id.trim_start_matches("vm-").parse().unwrap_or(0);
            vec![format!("192.168.1.{}", 10 + suffix % 240)]
        } else {
            Vec::new()
        };

        Ok(VmInfo {
            state: sim.state,
            console: format!("https://vcenter.local/ui/webconsole.html?vmId={}", sim.id),
            ips,
            networks: sim.networks.clone(),
            moid: sim.id.clone(),
            meta: sim.meta.clone(),
        })
    }

    async fn network(&self, name: &str) -> Result<Option<Network>> {
        let state = self.record(format!("network:{}", name));
        Ok(state.networks.get(name).cloned())
    }

    async fn deploy_from_ova(
        &self,
        ova: &Ova,
        mappings: &[NetworkMapping],
        folder: &str,
        name: &str,
    ) -> Result<VmRef> {
        let mut state = self.record(format!("deploy:{}:{}", folder, name));
        if !state.folders.contains_key(folder) {
            return Err(PlatformError::NotFound {
                kind: "folder",
                name: folder.to_string(),
            });
        }

        let id = state.next_id();
        let ip_delay = state.ip_delay;
        let vm = SimVm {
            id: id.clone(),
            name: name.to_string(),
            kind: EntityKind::VirtualMachine,
            state: PowerState::PoweredOn,
            networks: mappings.iter().map(|m| m.network.name.clone()).collect(),
            meta: None,
            ip_delay,
        };
        debug!(
            "Simulated platform: deployed {} from {}",
            name,
            ova.path().display()
        );

        if let Some(children) = state.folders.get_mut(folder) {
            children.push(vm);
        }

        Ok(VmRef {
            id,
            name: name.to_string(),
        })
    }

    async fn power(&self, vm: &VmRef, power_state: PowerState) -> Result<()> {
        let call = format!(
            "power:{}:{}",
            vm.id,
            serde_json::to_value(power_state)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        );
        let mut state = self.record(call);
        state.find_vm(vm)?.state = power_state;
        Ok(())
    }

    async fn destroy(&self, vm: &VmRef) -> Result<()> {
        let mut state = self.record(format!("destroy:{}", vm.id));
        state.find_vm(vm)?;
        for children in state.folders.values_mut() {
            children.retain(|child| child.id != vm.id);
        }
        Ok(())
    }

    async fn run_command(&self, vm: &VmRef, command: &GuestCommand) -> Result<CommandResult> {
        let mut state = self.record(format!("run_command:{}", vm.id));
        state.find_vm(vm)?;
        state.commands.push(command.clone());
        let exit_code = state.exit_codes.pop_front().unwrap_or(Some(0));

        Ok(CommandResult {
            exit_code,
            cmd_line: command.cmd_line(),
        })
    }

    async fn set_meta(&self, vm: &VmRef, meta: &VmMeta) -> Result<()> {
        let mut state = self.record(format!("set_meta:{}", vm.id));
        state.find_vm(vm)?.meta = Some(meta.clone());
        Ok(())
    }

    async fn change_network(&self, vm: &VmRef, network: &Network) -> Result<()> {
        let mut state = self.record(format!("change_network:{}:{}", vm.id, network.name));
        state.find_vm(vm)?.networks = vec![network.name.clone()];
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.platform.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        debug!("Simulated platform: session closed");
        Ok(())
    }
}
