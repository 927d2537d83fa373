//! Post-provision configuration
//!
//! A ClarityNow license is only valid for a limited window after the date it
//! was issued, so a fresh instance has NTP turned off and its clock pinned to
//! a fixed date before anyone can use it.

use crate::error::{LifecycleError, Result};
use claritynow_platform::{GuestCommand, Session, VmRef};
use tracing::{error, info};

/// Service account that owns the guest commands
pub const GUEST_USER: &str = "administrator";
const GUEST_PASSWORD: &str = "a";

/// Date the guest clock is pinned to
pub const LICENSE_DATE: &str = "2018-09-28";

const SUDO: &str = "/usr/bin/sudo";

struct Step {
    arguments: String,
    started: String,
    failure: String,
}

fn steps() -> [Step; 2] {
    [
        Step {
            arguments: "/usr/bin/timedatectl set-ntp 0".to_string(),
            started: "Disabling NTP on server".to_string(),
            failure: "Failed to disable NTP on the server".to_string(),
        },
        Step {
            arguments: format!("/usr/bin/timedatectl set-time {}", LICENSE_DATE),
            started: format!("Setting date to {}", LICENSE_DATE),
            failure: format!("Failed to set the date to {}", LICENSE_DATE),
        },
    ]
}

/// Run the configuration sequence against a freshly deployed VM.
/// Stops at the first failing step.
pub async fn setup_vm(session: &dyn Session, vm: &VmRef) -> Result<()> {
    for step in steps() {
        info!("{}", step.started);

        let command = GuestCommand {
            program: SUDO.to_string(),
            arguments: step.arguments,
            user: GUEST_USER.to_string(),
            password: GUEST_PASSWORD.to_string(),
        };
        let result = session.run_command(vm, &command).await?;

        if result.failed() {
            error!(
                "{}: ExitCode {:?}, CMD {}",
                step.failure, result.exit_code, result.cmd_line
            );
            return Err(LifecycleError::Configuration(step.failure));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claritynow_platform::{Platform, SimulatedPlatform};

    async fn run(platform: &SimulatedPlatform, vm: &VmRef) -> Result<()> {
        let session = platform.connect().await.unwrap();
        let result = setup_vm(session.as_ref(), vm).await;
        session.disconnect().await.unwrap();
        result
    }

    #[tokio::test]
    async fn test_runs_both_steps_in_order() {
        let platform = SimulatedPlatform::new();
        let vm = platform.add_vm("alice", "box1", None);

        run(&platform, &vm).await.unwrap();

        let commands = platform.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].arguments, "/usr/bin/timedatectl set-ntp 0");
        assert_eq!(commands[1].arguments, "/usr/bin/timedatectl set-time 2018-09-28");
        assert!(commands.iter().all(|c| c.program == "/usr/bin/sudo"));
        assert!(commands.iter().all(|c| c.user == "administrator"));
    }

    #[tokio::test]
    async fn test_first_failure_skips_second_step() {
        let platform = SimulatedPlatform::new();
        let vm = platform.add_vm("alice", "box1", None);
        platform.queue_exit_codes([Some(1)]);

        let err = run(&platform, &vm).await.unwrap_err();
        assert!(matches!(
            &err,
            LifecycleError::Configuration(msg) if msg == "Failed to disable NTP on the server"
        ));
        assert_eq!(platform.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_second_failure_is_fatal() {
        let platform = SimulatedPlatform::new();
        let vm = platform.add_vm("alice", "box1", None);
        platform.queue_exit_codes([Some(0), Some(2)]);

        let err = run(&platform, &vm).await.unwrap_err();
        assert!(matches!(
            &err,
            LifecycleError::Configuration(msg) if msg == "Failed to set the date to 2018-09-28"
        ));
        assert_eq!(platform.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_exit_code_is_success() {
        let platform = SimulatedPlatform::new();
        let vm = platform.add_vm("alice", "box1", None);
        platform.queue_exit_codes([None, None]);

        run(&platform, &vm).await.unwrap();
        assert_eq!(platform.commands().len(), 2);
    }
}
