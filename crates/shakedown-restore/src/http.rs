//! HTTP client for the compute control plane.

use reqwest::header::LOCATION;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::compute::{ComputeApi, Image, Instance};
use crate::error::{RestoreError, Result};

/// Auth token header understood by the control plane.
const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Deserialize)]
struct InstanceList {
    servers: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct InstanceEnvelope {
    server: Instance,
}

#[derive(Debug, Deserialize)]
struct ImageList {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct ImageEnvelope {
    image: Image,
}

/// Talks to a compute REST API: list and inspect instances, capture images,
/// rebuild instances from them.
pub struct HttpComputeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpComputeClient {
    /// Creates a client for the given API endpoint.
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).header(AUTH_HEADER, &self.token).send().await?;
        check(response, &url).await
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        let url = format!("{}{path}", self.base_url);
        let response =
            self.http.post(&url).header(AUTH_HEADER, &self.token).json(&body).send().await?;
        check(response, &url).await
    }
}

async fn check(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RestoreError::Compute { url: url.to_string(), status: status.as_u16(), message })
}

#[async_trait::async_trait]
impl ComputeApi for HttpComputeClient {
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let list: InstanceList = self.get("/servers/detail").await?.json().await?;
        Ok(list.servers)
    }

    async fn instance(&self, id: &str) -> Result<Instance> {
        let envelope: InstanceEnvelope = self.get(&format!("/servers/{id}")).await?.json().await?;
        Ok(envelope.server)
    }

    async fn create_image(&self, instance_id: &str, name: &str) -> Result<String> {
        let response = self
            .post(
                &format!("/servers/{instance_id}/action"),
                json!({ "createImage": { "name": name } }),
            )
            .await?;
        // The image ID comes back in the Location header; some control
        // planes omit it, in which case the image is found by name.
        if let Some(location) = response.headers().get(LOCATION) {
            if let Ok(location) = location.to_str() {
                if let Some(id) = location.trim_end_matches('/').rsplit('/').next() {
                    debug!(image_id = %id, "image capture accepted");
                    return Ok(id.to_string());
                }
            }
        }
        match self.find_image(name).await? {
            Some(image) => Ok(image.id),
            None => Err(RestoreError::Compute {
                url: format!("{}/servers/{instance_id}/action", self.base_url),
                status: 0,
                message: format!("image '{name}' not visible after capture request"),
            }),
        }
    }

    async fn image(&self, id: &str) -> Result<Image> {
        let envelope: ImageEnvelope = self.get(&format!("/images/{id}")).await?.json().await?;
        Ok(envelope.image)
    }

    async fn find_image(&self, name: &str) -> Result<Option<Image>> {
        let list: ImageList = self.get(&format!("/images?name={name}")).await?.json().await?;
        // The name filter is a prefix match on some control planes; insist
        // on an exact match.
        Ok(list.images.into_iter().find(|i| i.name == name))
    }

    async fn rebuild(&self, instance_id: &str, image_id: &str) -> Result<()> {
        self.post(
            &format!("/servers/{instance_id}/action"),
            json!({ "rebuild": { "imageRef": image_id } }),
        )
        .await?;
        Ok(())
    }

    async fn delete_image(&self, id: &str) -> Result<()> {
        let url = format!("{}/images/{id}", self.base_url);
        let response = self.http.delete(&url).header(AUTH_HEADER, &self.token).send().await?;
        // Deleting an already-deleted image is not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response, &url).await?;
        Ok(())
    }
}
