//! Named tasks and their positional arguments

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A task as it travels over the queue: a name plus positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCall {
    pub name: String,
    pub args: Vec<String>,
}

/// Every operation a worker knows how to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// List the instances a user owns
    Show { username: String },

    /// Deploy a new instance
    Create {
        username: String,
        machine_name: String,
        image: String,
        network: String,
    },

    /// Power off and destroy an instance
    Delete {
        username: String,
        machine_name: String,
    },

    /// Re-point an instance at another network
    ModifyNetwork {
        username: String,
        machine_name: String,
        new_network: String,
    },

    /// List the versions that can be deployed
    Image,
}

impl Task {
    pub const SHOW: &'static str = "claritynow.show";
    pub const CREATE: &'static str = "claritynow.create";
    pub const DELETE: &'static str = "claritynow.delete";
    pub const MODIFY_NETWORK: &'static str = "claritynow.modify_network";
    pub const IMAGE: &'static str = "claritynow.image";

    /// Queue name of this task
    pub fn name(&self) -> &'static str {
        match self {
            Task::Show { .. } => Self::SHOW,
            Task::Create { .. } => Self::CREATE,
            Task::Delete { .. } => Self::DELETE,
            Task::ModifyNetwork { .. } => Self::MODIFY_NETWORK,
            Task::Image => Self::IMAGE,
        }
    }

    /// The user a task acts for, if any
    pub fn username(&self) -> Option<&str> {
        match self {
            Task::Show { username }
            | Task::Create { username, .. }
            | Task::Delete { username, .. }
            | Task::ModifyNetwork { username, .. } => Some(username),
            Task::Image => None,
        }
    }

    /// Flatten into the wire representation
    pub fn to_call(&self) -> TaskCall {
        let args = match self {
            Task::Show { username } => vec![username.clone()],
            Task::Create {
                username,
                machine_name,
                image,
                network,
            } => vec![
                username.clone(),
                machine_name.clone(),
                image.clone(),
                network.clone(),
            ],
            Task::Delete {
                username,
                machine_name,
            } => vec![username.clone(), machine_name.clone()],
            Task::ModifyNetwork {
                username,
                machine_name,
                new_network,
            } => vec![username.clone(), machine_name.clone(), new_network.clone()],
            Task::Image => Vec::new(),
        };

        TaskCall {
            name: self.name().to_string(),
            args,
        }
    }

    /// Rebuild a task from its wire representation
    pub fn from_call(call: &TaskCall) -> Result<Self> {
        let expected = match call.name.as_str() {
            Self::SHOW => 1,
            Self::CREATE => 4,
            Self::DELETE => 2,
            Self::MODIFY_NETWORK => 3,
            Self::IMAGE => 0,
            other => return Err(Error::UnknownTask(other.to_string())),
        };

        if call.args.len() != expected {
            return Err(Error::TaskArity {
                name: call.name.clone(),
                expected,
                actual: call.args.len(),
            });
        }

        let mut args = call.args.iter().cloned();
        let mut next = || args.next().unwrap_or_default();

        let task = match call.name.as_str() {
            Self::SHOW => Task::Show { username: next() },
            Self::CREATE => Task::Create {
                username: next(),
                machine_name: next(),
                image: next(),
                network: next(),
            },
            Self::DELETE => Task::Delete {
                username: next(),
                machine_name: next(),
            },
            Self::MODIFY_NETWORK => Task::ModifyNetwork {
                username: next(),
                machine_name: next(),
                new_network: next(),
            },
            _ => Task::Image,
        };

        Ok(task)
    }
}
