//! Client for the virtualization platform gateway
//!
//! The gateway fronts the hypervisor's control API with a small JSON surface.
//! A session is opened with the service account's credentials; every later
//! call carries the returned session id in the `X-Session-Id` header.

use crate::error::{PlatformError, Result};
use crate::models::{
    CommandResult, Entity, GuestCommand, Network, NetworkMapping, PowerState, VmInfo, VmMeta,
    VmRef,
};
use crate::ova::Ova;
use crate::{Platform, Session};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SESSION_HEADER: &str = "X-Session-Id";

/// Platform reached through the HTTP gateway
pub struct GatewayPlatform {
    base_url: Url,
    user: String,
    password: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    ova: String,
    folder: &'a str,
    name: &'a str,
    network_mappings: &'a [NetworkMapping],
}

#[derive(Debug, Serialize)]
struct PowerRequest {
    state: PowerState,
}

#[derive(Debug, Serialize)]
struct ChangeNetworkRequest<'a> {
    network: &'a Network,
}

impl GatewayPlatform {
    /// Create a new gateway client
    pub fn new(base_url: &str, user: String, password: String) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| PlatformError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PlatformError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            base_url,
            user,
            password,
            client: reqwest::Client::new(),
        })
    }
}

/// `base` with `segments` appended, each percent-encoded as a single path
/// segment
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Names that cannot stand for themselves as one path segment
fn is_plain_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

#[async_trait]
impl Platform for GatewayPlatform {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let url = endpoint(&self.base_url, &["api", "session"]);
        debug!("Opening platform session at {}", url);

        let response = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;
        let session: SessionResponse = json(response).await?;

        Ok(Box::new(GatewaySession {
            base_url: self.base_url.clone(),
            session_id: session.session_id,
            client: self.client.clone(),
        }))
    }
}

/// Session against the gateway
pub struct GatewaySession {
    base_url: Url,
    session_id: String,
    client: reqwest::Client,
}

impl GatewaySession {
    fn url(&self, segments: &[&str]) -> Url {
        endpoint(&self.base_url, segments)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        Ok(request
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await?)
    }
}

/// Fail on any non-success status, keeping the gateway's message
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(PlatformError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(check(response).await?.json().await?)
}

#[async_trait]
impl Session for GatewaySession {
    async fn folder_children(&self, folder: &str) -> Result<Vec<Entity>> {
        let not_found = || PlatformError::NotFound {
            kind: "folder",
            name: folder.to_string(),
        };
        if !is_plain_segment(folder) {
            return Err(not_found());
        }

        let response = self
            .send(self.client.get(self.url(&["api", "folders", folder, "children"])))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found());
        }

        json(response).await
    }

    async fn vm_info(&self, vm: &VmRef) -> Result<VmInfo> {
        let response = self
            .send(self.client.get(self.url(&["api", "vms", vm.id.as_str()])))
            .await?;
        json(response).await
    }

    async fn network(&self, name: &str) -> Result<Option<Network>> {
        if !is_plain_segment(name) {
            return Ok(None);
        }

        let response = self
            .send(self.client.get(self.url(&["api", "networks", name])))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        json(response).await.map(Some)
    }

    async fn deploy_from_ova(
        &self,
        ova: &Ova,
        mappings: &[NetworkMapping],
        folder: &str,
        name: &str,
    ) -> Result<VmRef> {
        let body = DeployRequest {
            ova: ova.path().display().to_string(),
            folder,
            name,
            network_mappings: mappings,
        };

        debug!("Deploying {} into {} from {}", name, folder, body.ova);
        let response = self
            .send(self.client.post(self.url(&["api", "vms"])).json(&body))
            .await?;
        json(response).await
    }

    async fn power(&self, vm: &VmRef, state: PowerState) -> Result<()> {
        let response = self
            .send(
                self.client
                    .post(self.url(&["api", "vms", vm.id.as_str(), "power"]))
                    .json(&PowerRequest { state }),
            )
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn destroy(&self, vm: &VmRef) -> Result<()> {
        let response = self
            .send(self.client.delete(self.url(&["api", "vms", vm.id.as_str()])))
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn run_command(&self, vm: &VmRef, command: &GuestCommand) -> Result<CommandResult> {
        let response = self
            .send(
                self.client
                    .post(self.url(&["api", "vms", vm.id.as_str(), "guest", "commands"]))
                    .json(command),
            )
            .await?;
        json(response).await
    }

    async fn set_meta(&self, vm: &VmRef, meta: &VmMeta) -> Result<()> {
        let response = self
            .send(
                self.client
                    .put(self.url(&["api", "vms", vm.id.as_str(), "meta"]))
                    .json(meta),
            )
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn change_network(&self, vm: &VmRef, network: &Network) -> Result<()> {
        let response = self
            .send(
                self.client
                    .put(self.url(&["api", "vms", vm.id.as_str(), "network"]))
                    .json(&ChangeNetworkRequest { network }),
            )
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let response = self
            .send(self.client.delete(self.url(&["api", "session"])))
            .await?;
        check(response).await?;
        debug!("Closed platform session");
        Ok(())
    }
}
