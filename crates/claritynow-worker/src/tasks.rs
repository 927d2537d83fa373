//! Task entry points
//!
//! Wraps each lifecycle operation in the `{content, error, params}` envelope.
//! This is the only place a validation failure is turned into an envelope
//! error; everything else propagates and fails the job.

use crate::error::{LifecycleError, Result};
use crate::lifecycle::ClarityNow;
use claritynow_common::{Task, TaskEnvelope};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

/// Run one task to completion
pub async fn run(app: &ClarityNow, task: &Task) -> Result<TaskEnvelope> {
    info!(task = task.name(), user = task.username(), "Task starting");

    let outcome = match task {
        Task::Show { username } => app.show(username).await.and_then(to_content),
        Task::Create {
            username,
            machine_name,
            image,
            network,
        } => app
            .create(username, machine_name, image, network)
            .await
            .and_then(to_content),
        Task::Delete {
            username,
            machine_name,
        } => app.delete(username, machine_name).await.map(|()| Map::new()),
        Task::ModifyNetwork {
            username,
            machine_name,
            new_network,
        } => app
            .update_network(username, machine_name, new_network)
            .await
            .map(|()| Map::new()),
        Task::Image => app.list_images().map(|images| {
            let mut content = Map::new();
            content.insert("image".to_string(), Value::from_iter(images));
            content
        }),
    };

    match outcome {
        Ok(content) => {
            info!(task = task.name(), "Task complete");
            Ok(TaskEnvelope::success(content))
        }
        Err(LifecycleError::Validation(message)) => {
            error!(task = task.name(), "Task failed: {}", message);
            Ok(TaskEnvelope::failure(message))
        }
        Err(e) => {
            error!(task = task.name(), "Task failed: {}", e);
            Err(e)
        }
    }
}

fn to_content<T: Serialize>(value: T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(content) => Ok(content),
        other => {
            let mut content = Map::new();
            content.insert("result".to_string(), other);
            Ok(content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{name_from_version, ImageCatalog};
    use crate::lifecycle::IpWait;
    use crate::test_support::{meta, write_ova, DESCRIPTOR};
    use claritynow_platform::SimulatedPlatform;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn app() -> (ClarityNow, SimulatedPlatform, TempDir) {
        let images = tempfile::tempdir().unwrap();
        write_ova(&images.path().join(name_from_version("2.11.0")), DESCRIPTOR);

        let platform = SimulatedPlatform::new();
        platform.add_folder("alice").add_network("alice_lab-net");

        let app = ClarityNow::new(
            Arc::new(platform.clone()),
            ImageCatalog::new(images.path()),
            IpWait::default(),
        );
        (app, platform, images)
    }

    fn create(image: &str, network: &str) -> Task {
        Task::Create {
            username: "alice".to_string(),
            machine_name: "box1".to_string(),
            image: image.to_string(),
            network: network.to_string(),
        }
    }

    #[tokio::test]
    async fn test_show_envelope() {
        let (app, platform, _images) = app();
        platform.add_vm("alice", "ClarityNow", Some(meta("ClarityNow", "3.28")));

        let envelope = run(
            &app,
            &Task::Show {
                username: "alice".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(envelope.error.is_none());
        assert_eq!(
            envelope.content["ClarityNow"]["meta"],
            json!({"component": "ClarityNow", "created": 1234, "version": "3.28", "configured": true, "generation": 1})
        );
        assert!(envelope.params.is_empty());
    }

    #[tokio::test]
    async fn test_create_envelope() {
        let (app, _platform, _images) = app();

        let envelope = run(&app, &create("2.11.0", "alice_lab-net")).await.unwrap();

        assert!(envelope.error.is_none());
        assert_eq!(envelope.content["box1"]["meta"]["version"], "2.11.0");
        assert_eq!(envelope.content["box1"]["meta"]["configured"], true);
    }

    #[tokio::test]
    async fn test_validation_error_goes_into_envelope() {
        let (app, _platform, _images) = app();

        let envelope = run(&app, &create("9.9.9", "alice_lab-net")).await.unwrap();

        assert!(envelope.content.is_empty());
        assert_eq!(envelope.error.as_deref(), Some("Invalid version: 9.9.9"));
    }

    #[tokio::test]
    async fn test_configuration_error_propagates() {
        let (app, platform, _images) = app();
        platform.queue_exit_codes([Some(1)]);

        let err = run(&app, &create("2.11.0", "alice_lab-net")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_delete_envelope_is_empty() {
        let (app, platform, _images) = app();
        platform.add_vm("alice", "box1", Some(meta("ClarityNow", "2.11.0")));

        let envelope = run(
            &app,
            &Task::Delete {
                username: "alice".to_string(),
                machine_name: "box1".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(envelope, TaskEnvelope::empty());
    }

    #[tokio::test]
    async fn test_modify_network_not_found() {
        let (app, _platform, _images) = app();

        let envelope = run(
            &app,
            &Task::ModifyNetwork {
                username: "alice".to_string(),
                machine_name: "box1".to_string(),
                new_network: "alice_lab-net".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            envelope.error.as_deref(),
            Some("No claritynow named box1 found")
        );
    }

    #[tokio::test]
    async fn test_image_envelope() {
        let (app, _platform, _images) = app();

        let envelope = run(&app, &Task::Image).await.unwrap();
        assert_eq!(envelope.content["image"], json!(["2.11.0"]));
    }
}
