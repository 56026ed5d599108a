//! The replica consistency verifier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::StatusCode;
use shakedown_core::config::{ServiceLayout, StorageConfig};
use shakedown_exec::Executor;
use shakedown_fleet::{Fleet, Role};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Result, VerifyError};
use crate::ring;
use crate::storage::StorageApi;

/// Parameters of one convergence wait.
#[derive(Debug, Clone)]
pub struct ConvergenceOpts {
    /// Expected number of replicas of every entity.
    pub expected: usize,
    /// Probe only the first N candidate locations. Setting this to
    /// `expected` checks primary nodes only, excluding handoffs.
    pub check_first_n: Option<usize>,
    /// Require exactly `expected` replicas: probe every candidate and fail
    /// when more are found. Used to confirm handoff cleanup.
    pub exact: bool,
    /// How long to keep polling before giving up.
    pub deadline: Duration,
}

impl ConvergenceOpts {
    /// Wait for `expected` replicas anywhere (primaries or handoffs).
    #[must_use]
    pub fn regeneration(expected: usize, deadline: Duration) -> Self {
        Self { expected, check_first_n: None, exact: false, deadline }
    }

    /// Wait for `expected` replicas on primary nodes only.
    #[must_use]
    pub fn primaries_only(expected: usize, deadline: Duration) -> Self {
        Self { expected, check_first_n: Some(expected), exact: false, deadline }
    }

    /// Wait for exactly `expected` replicas, confirming handoff copies were
    /// cleaned up.
    #[must_use]
    pub fn exact(expected: usize, deadline: Duration) -> Self {
        Self { expected, check_first_n: None, exact: true, deadline }
    }
}

/// Checks that every container and object under the test account has the
/// expected number of live replicas.
pub struct ReplicaVerifier {
    storage: StorageApi,
    proxy: Arc<dyn Executor>,
    layout: ServiceLayout,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl ReplicaVerifier {
    /// Creates a verifier using the fleet's first storage proxy for ring
    /// lookups.
    ///
    /// # Errors
    ///
    /// [`VerifyError::NoProxy`] when the fleet has no proxy node.
    pub fn new(
        fleet: &Fleet,
        storage: StorageApi,
        layout: ServiceLayout,
        config: &StorageConfig,
    ) -> Result<Self> {
        let proxy = fleet.first(Role::StorageProxy).ok_or(VerifyError::NoProxy)?.executor();
        Ok(Self::with_proxy(proxy, storage, layout, config.poll_interval()))
    }

    /// Creates a verifier with an explicit proxy executor.
    #[must_use]
    pub fn with_proxy(
        proxy: Arc<dyn Executor>,
        storage: StorageApi,
        layout: ServiceLayout,
        poll_interval: Duration,
    ) -> Self {
        Self { storage, proxy, layout, http: reqwest::Client::new(), poll_interval }
    }

    /// The storage API this verifier enumerates through.
    #[must_use]
    pub fn storage(&self) -> &StorageApi {
        &self.storage
    }

    /// Probes one candidate location. 200 and 204 mean the replica is
    /// there; any other status — and any transport error — means it is
    /// not. A replica that cannot be reached is indistinguishable from a
    /// replica that does not exist.
    async fn probe(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(response) => {
                matches!(response.status(), StatusCode::OK | StatusCode::NO_CONTENT)
            }
            Err(err) => {
                debug!(url, error = %err, "replica probe failed to connect");
                false
            }
        }
    }

    /// Checks one entity's candidate URL list.
    async fn urls_ok(
        &self,
        urls: &[String],
        label: &str,
        expected: usize,
        check_first_n: Option<usize>,
        exact: bool,
    ) -> bool {
        let candidates = match check_first_n {
            Some(n) => &urls[..urls.len().min(n)],
            None => urls,
        };
        let mut found = 0;
        for url in candidates {
            if self.probe(url).await {
                found += 1;
            } else {
                debug!(url, "replica not found");
            }
            // Once enough copies answered there is no reason to keep
            // probing, unless we must prove there are no extras.
            if !exact && found == expected {
                break;
            }
        }
        if found < expected {
            warn!(found, expected, entity = %label, "too few copies");
            false
        } else if exact && found > expected {
            warn!(found, expected, entity = %label, "more copies than there should be");
            false
        } else {
            true
        }
    }

    /// Checks whether every container and object under the test account has
    /// enough live replicas.
    ///
    /// Note: an entity whose replicas were *all* lost disappears from the
    /// account listing, so this check cannot notice it. It verifies the
    /// data that is still listed.
    pub async fn all_replicas_healthy(
        &self,
        expected: usize,
        check_first_n: Option<usize>,
        exact: bool,
    ) -> Result<bool> {
        let account = self.storage.account().to_string();
        let containers = self.storage.list_containers().await?;

        for container in &containers {
            for object in self.storage.list_objects(container).await? {
                let urls = ring::replica_urls(
                    self.proxy.as_ref(),
                    &self.layout,
                    &account,
                    Some(container),
                    Some(&object),
                )
                .await?;
                let label = format!("object {container}/{object}");
                if !self.urls_ok(&urls, &label, expected, check_first_n, exact).await {
                    return Ok(false);
                }
            }
        }

        // Containers have their own ring and their own replicas.
        for container in &containers {
            let urls = ring::replica_urls(
                self.proxy.as_ref(),
                &self.layout,
                &account,
                Some(container),
                None,
            )
            .await?;
            let label = format!("container {container}");
            if !self.urls_ok(&urls, &label, expected, check_first_n, exact).await {
                return Ok(false);
            }
        }

        info!("all replicas found");
        Ok(true)
    }

    /// Polls [`Self::all_replicas_healthy`] until it passes or the deadline
    /// elapses.
    ///
    /// This is the synchronization point that turns the cluster's
    /// asynchronous repair process into something a scenario can block on.
    ///
    /// # Errors
    ///
    /// [`VerifyError::ConsistencyTimeout`] when the deadline passes with
    /// the check still failing. A deadline of zero fails after one check,
    /// without sleeping.
    pub async fn wait_for_convergence(&self, opts: &ConvergenceOpts) -> Result<()> {
        info!(
            expected = opts.expected,
            check_first_n = ?opts.check_first_n,
            exact = opts.exact,
            deadline_secs = opts.deadline.as_secs(),
            "waiting for the right number of replicas"
        );
        let start = Instant::now();
        loop {
            if self
                .all_replicas_healthy(opts.expected, opts.check_first_n, opts.exact)
                .await?
            {
                let waited = start.elapsed();
                histogram!("shakedown_convergence_seconds").record(waited.as_secs_f64());
                info!(waited_secs = waited.as_secs(), "converged");
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed >= opts.deadline {
                counter!("shakedown_convergence_timeouts").increment(1);
                return Err(VerifyError::ConsistencyTimeout {
                    deadline: opts.deadline,
                    elapsed,
                });
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use shakedown_exec::ScriptedExecutor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn storage_config(endpoint: &str) -> StorageConfig {
        StorageConfig {
            endpoint: format!("{endpoint}/v1/AUTH_test"),
            token: "secret".to_string(),
            replica_count: 3,
            convergence_timeout_secs: 300,
            handoff_timeout_secs: 600,
            poll_interval_secs: 5,
        }
    }

    /// Mounts the account listing (one container, one object) on the mock
    /// server.
    async fn mount_listing(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/AUTH_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "container0"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/AUTH_test/container0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "file0.txt"}
            ])))
            .mount(server)
            .await;
    }

    /// Mounts a replica location that answers with `status`.
    async fn mount_replica(server: &MockServer, replica_path: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(replica_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    /// A scripted proxy whose ring lookups point every entity at the given
    /// candidate paths on the mock server.
    fn scripted_proxy(server_uri: &str, paths: &[&str]) -> Arc<ScriptedExecutor> {
        let proxy = Arc::new(ScriptedExecutor::new("proxy0"));
        let lines: Vec<String> = paths
            .iter()
            .map(|p| format!(r#"curl -g -I -XHEAD "{server_uri}{p}""#))
            .collect();
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        proxy.succeed_with("swift-get-nodes", &lines);
        proxy
    }

    fn verifier(server: &MockServer, proxy: Arc<ScriptedExecutor>) -> ReplicaVerifier {
        let config = storage_config(&server.uri());
        ReplicaVerifier::with_proxy(
            proxy,
            StorageApi::new(&config),
            ServiceLayout::default(),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_healthy_with_three_replicas() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        for p in ["/r1", "/r2", "/r3"] {
            mount_replica(&server, p, 200).await;
        }
        let v = verifier(&server, scripted_proxy(&server.uri(), &["/r1", "/r2", "/r3"]));
        assert!(v.all_replicas_healthy(3, None, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_unhealthy_with_two_replicas() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_replica(&server, "/r1", 200).await;
        mount_replica(&server, "/r2", 204).await;
        mount_replica(&server, "/r3", 404).await;
        let v = verifier(&server, scripted_proxy(&server.uri(), &["/r1", "/r2", "/r3"]));
        assert!(!v.all_replicas_healthy(3, None, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_handoff_copy_counts_unless_primaries_only() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        // Primary r2 lost its copy; handoff r4 has one.
        mount_replica(&server, "/r1", 200).await;
        mount_replica(&server, "/r2", 404).await;
        mount_replica(&server, "/r3", 200).await;
        mount_replica(&server, "/r4", 200).await;
        let proxy = scripted_proxy(&server.uri(), &["/r1", "/r2", "/r3", "/r4"]);
        let v = verifier(&server, proxy);

        // All candidates: the handoff copy completes the count.
        assert!(v.all_replicas_healthy(3, None, false).await.unwrap());
        // Primaries only: the lost primary copy is visible.
        assert!(!v.all_replicas_healthy(3, Some(3), false).await.unwrap());
    }

    #[tokio::test]
    async fn test_exact_fails_on_extra_copy() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        for p in ["/r1", "/r2", "/r3", "/r4"] {
            mount_replica(&server, p, 200).await;
        }
        let proxy = scripted_proxy(&server.uri(), &["/r1", "/r2", "/r3", "/r4"]);
        let v = verifier(&server, proxy);

        // Without exact, the extra handoff copy is fine (short-circuits at 3).
        assert!(v.all_replicas_healthy(3, None, false).await.unwrap());
        // With exact, all candidates are probed and the extra copy fails.
        assert!(!v.all_replicas_healthy(3, None, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_refused_counts_as_absent() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_replica(&server, "/r1", 200).await;
        // r2 points at a port nobody listens on.
        let proxy = Arc::new(ScriptedExecutor::new("proxy0"));
        let lines = [
            format!(r#"curl -g -I -XHEAD "{}/r1""#, server.uri()),
            r#"curl -g -I -XHEAD "http://127.0.0.1:1/r2""#.to_string(),
        ];
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        proxy.succeed_with("swift-get-nodes", &lines);
        let v = verifier(&server, proxy);

        assert!(!v.all_replicas_healthy(2, None, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_deadline_times_out_without_sleeping() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_replica(&server, "/r1", 404).await;
        let v = verifier(&server, scripted_proxy(&server.uri(), &["/r1"]));

        let start = Instant::now();
        let err = v
            .wait_for_convergence(&ConvergenceOpts::regeneration(3, Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::ConsistencyTimeout { .. }));
        // One check, no poll sleep.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_convergence_after_repair() {
        let server = MockServer::start().await;
        mount_listing(&server).await;
        mount_replica(&server, "/r2", 200).await;
        mount_replica(&server, "/r3", 200).await;
        // r1 comes back after two failing polls.
        Mock::given(method("GET"))
            .and(path("/r1"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(4)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/r1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let v = verifier(&server, scripted_proxy(&server.uri(), &["/r1", "/r2", "/r3"]));
        v.wait_for_convergence(&ConvergenceOpts::regeneration(3, Duration::from_secs(30)))
            .await
            .unwrap();
    }
}
