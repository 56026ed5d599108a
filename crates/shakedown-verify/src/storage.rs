//! Client for the storage API of the test account.
//!
//! Used for two things: enumerating what exists (containers, objects) so the
//! verifier knows what to check, and populating random content at the start
//! of a scenario.

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use shakedown_core::config::StorageConfig;
use tracing::{debug, info};

use crate::error::{Result, VerifyError};

/// Auth token header understood by the storage service.
const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Deserialize)]
struct Entry {
    name: String,
}

/// HTTP client for the test account's storage endpoint.
pub struct StorageApi {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    account: String,
}

impl StorageApi {
    /// Creates a client for the configured endpoint.
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        // The account hash is the last path segment of the endpoint URL.
        let account = endpoint.rsplit('/').next().unwrap_or("").to_string();
        Self { http: reqwest::Client::new(), endpoint, token: config.token.clone(), account }
    }

    /// The account hash the endpoint addresses.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Lists all containers under the account.
    pub async fn list_containers(&self) -> Result<Vec<String>> {
        self.list(&format!("{}?format=json", self.endpoint)).await
    }

    /// Lists all objects in a container.
    pub async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        self.list(&format!("{}/{container}?format=json", self.endpoint)).await
    }

    async fn list(&self, url: &str) -> Result<Vec<String>> {
        let response = self.http.get(url).header(AUTH_HEADER, &self.token).send().await?;
        if !response.status().is_success() {
            return Err(VerifyError::Storage {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        // An empty account/container answers 204 with no body.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let entries: Vec<Entry> = response.json().await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    /// Creates a container. Creating an existing container is a no-op on the
    /// service side.
    pub async fn create_container(&self, container: &str) -> Result<()> {
        let url = format!("{}/{container}", self.endpoint);
        self.put(&url, String::new()).await
    }

    /// Uploads an object.
    pub async fn put_object(&self, container: &str, name: &str, body: String) -> Result<()> {
        let url = format!("{}/{container}/{name}", self.endpoint);
        self.put(&url, body).await
    }

    async fn put(&self, url: &str, body: String) -> Result<()> {
        let response =
            self.http.put(url).header(AUTH_HEADER, &self.token).body(body).send().await?;
        if !response.status().is_success() {
            return Err(VerifyError::Storage {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Fills the account with random content: `containers` containers of
    /// `per_container` objects each, every object holding a short random
    /// alphanumeric payload. Names are deterministic
    /// (`{prefix}container{i}` / `{prefix}file{j}.txt`) so repeated runs
    /// overwrite rather than accumulate.
    pub async fn populate(
        &self,
        prefix: &str,
        containers: usize,
        per_container: usize,
    ) -> Result<()> {
        info!(containers, per_container, "populating storage with random content");
        for c in 0..containers {
            let container = format!("{prefix}container{c}");
            self.create_container(&container).await?;
            for f in 0..per_container {
                let name = format!("{prefix}file{}.txt", c * per_container + f);
                let body = random_payload();
                debug!(container = %container, object = %name, "uploading object");
                self.put_object(&container, &name, body).await?;
            }
        }
        Ok(())
    }
}

/// A random alphanumeric payload, 1 to 20 characters plus a newline.
fn random_payload() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(1..=20);
    let mut payload: String =
        (&mut rng).sample_iter(&Alphanumeric).take(len).map(char::from).collect();
    payload.push('\n');
    payload
}
