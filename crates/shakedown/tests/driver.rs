//! End-to-end driver tests against a scripted fleet and a mock storage
//! endpoint.
//!
//! The cluster is faked at its two seams: command execution (scripted
//! executors) and HTTP (wiremock). Everything between — the driver, the
//! restorer, the verifier, the fault injector — is the real thing.

use std::collections::HashSet;
use std::sync::Arc;

use shakedown::driver::{Driver, Outcome};
use shakedown_core::config::{Config, Role, ServiceLayout};
use shakedown_exec::{CommandOutput, ScriptedExecutor};
use shakedown_fleet::{Fleet, FleetNode, Node};
use shakedown_restore::ManualRestorer;
use shakedown_verify::{ReplicaVerifier, StorageApi};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(storage_uri: &str, convergence_secs: u64) -> Config {
    Config::parse(&format!(
        r#"
        [[nodes]]
        hostname = "127.0.0.1"
        roles = ["storage_proxy"]

        [management]
        type = "manual"

        [storage]
        endpoint = "{storage_uri}/v1/AUTH_test"
        token = "secret"
        convergence_timeout_secs = {convergence_secs}
        handoff_timeout_secs = {convergence_secs}
        poll_interval_secs = 0
        "#
    ))
    .unwrap()
}

fn fleet_node(name: &str, roles: &[Role], disks: &[&str]) -> (FleetNode, Arc<ScriptedExecutor>) {
    let exec = Arc::new(ScriptedExecutor::new(name));
    let node = Node {
        name: name.to_string(),
        hostname: name.to_string(),
        addr: "192.0.2.1".parse().unwrap(),
        instance_id: None,
        roles: roles.iter().copied().collect::<HashSet<_>>(),
        disks: disks.iter().map(|d| (*d).to_string()).collect(),
    };
    (FleetNode::new(node, exec.clone()), exec)
}

fn mount_table(disks: &[&str]) -> CommandOutput {
    let lines = disks
        .iter()
        .map(|d| format!("/dev/{d} /srv/node/{d} ext4 rw,noatime 0 0"))
        .collect();
    CommandOutput::success(lines)
}

/// Mounts the account listing (one container, one object), accepts uploads,
/// and serves the given replica locations.
async fn mount_storage(server: &MockServer, replicas: &[(&str, u16)]) {
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
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
    for (replica_path, status) in replicas {
        Mock::given(method("GET"))
            .and(path(*replica_path))
            .respond_with(ResponseTemplate::new(*status))
            .mount(server)
            .await;
    }
}

struct Harness {
    driver: Driver,
    proxy_exec: Arc<ScriptedExecutor>,
    data_execs: Vec<Arc<ScriptedExecutor>>,
}

/// Builds a 1 proxy + 2 data node harness whose ring lookups point at the
/// mock server's replica paths.
fn build_harness(server_uri: &str, config: Config, replica_paths: &[&str]) -> Harness {
    let (proxy, proxy_exec) = fleet_node("proxy0", &[Role::StorageProxy], &[]);
    let (data1, data1_exec) = fleet_node("data1", &[Role::StorageData], &["vdb", "vdc", "vdd"]);
    let (data2, data2_exec) = fleet_node("data2", &[Role::StorageData], &["vdb", "vdc", "vdd"]);
    data1_exec.respond("/proc/mounts", mount_table(&["vdb", "vdc", "vdd"]));
    data2_exec.respond("/proc/mounts", mount_table(&["vdb", "vdc", "vdd"]));

    let lines: Vec<String> = replica_paths
        .iter()
        .map(|p| format!(r#"curl -g -I -XHEAD "{server_uri}{p}""#))
        .collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    proxy_exec.succeed_with("swift-get-nodes", &lines);

    let fleet = Arc::new(Fleet::from_parts(vec![proxy, data1, data2]));
    let storage = StorageApi::new(&config.storage);
    let verifier = ReplicaVerifier::with_proxy(
        proxy_exec.clone(),
        storage,
        ServiceLayout::default(),
        config.storage.poll_interval(),
    );
    let restorer = Box::new(ManualRestorer::new(
        Arc::clone(&fleet),
        config.service.clone(),
        &config.management,
    ));
    let driver = Driver::with_parts(fleet, restorer, verifier, config);
    Harness { driver, proxy_exec, data_execs: vec![data1_exec, data2_exec] }
}

#[tokio::test]
async fn test_one_disk_down_passes_on_healthy_cluster() {
    let server = MockServer::start().await;
    mount_storage(&server, &[("/r1", 200), ("/r2", 200), ("/r3", 200)]).await;

    let config = test_config(&server.uri(), 10);
    let harness = build_harness(&server.uri(), config, &["/r1", "/r2", "/r3"]);

    let summary = harness.driver.run(Some("one-disk-down")).await.unwrap();
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].outcome, Outcome::Passed);
    assert!(summary.all_passed());

    // The first managed disk on the first data node was killed.
    assert!(harness.data_execs[0].saw("umount --force -l /dev/vdb"));
    // The baseline was captured (services cycled) and restored afterwards.
    assert!(harness.data_execs[0].saw("swift-init all stop"));
    assert!(harness.data_execs[0].saw("mkfs.ext4 -q /dev/vdb && mount /dev/vdb"));
    assert!(harness.proxy_exec.saw("swift-init proxy start"));
}

#[tokio::test]
async fn test_convergence_timeout_is_a_failure_and_still_restores() {
    let server = MockServer::start().await;
    // Only one replica answers; a three-way check can never pass.
    mount_storage(&server, &[("/r1", 200), ("/r2", 404), ("/r3", 404)]).await;

    let config = test_config(&server.uri(), 0);
    let harness = build_harness(&server.uri(), config, &["/r1", "/r2", "/r3"]);

    let summary = harness.driver.run(Some("one-disk-down")).await.unwrap();
    assert!(matches!(summary.results[0].outcome, Outcome::Failed(_)));
    assert!(!summary.all_passed());

    // The baseline restore still ran after the failure.
    for exec in &harness.data_execs {
        assert!(exec.saw("swift-init account container object rest start"));
    }
}

#[tokio::test]
async fn test_unknown_scenario_is_rejected() {
    let server = MockServer::start().await;
    let config = test_config(&server.uri(), 10);
    let harness = build_harness(&server.uri(), config, &["/r1"]);

    let err = harness.driver.run(Some("set-rack-on-fire")).await.unwrap_err();
    assert!(err.to_string().contains("no scenario matches"));
}

#[tokio::test]
async fn test_two_disk_scenarios_skip_on_small_fleets() {
    let server = MockServer::start().await;
    mount_storage(&server, &[("/r1", 200), ("/r2", 200), ("/r3", 200)]).await;

    let config = test_config(&server.uri(), 10);
    // Single data node: the two-node scenarios must be skipped.
    let (proxy, proxy_exec) = fleet_node("proxy0", &[Role::StorageProxy], &[]);
    let (data1, data1_exec) = fleet_node("data1", &[Role::StorageData], &["vdb", "vdc", "vdd", "vde"]);
    data1_exec.respond("/proc/mounts", mount_table(&["vdb", "vdc", "vdd", "vde"]));
    let lines = [format!(r#"curl -g -I -XHEAD "{}/r1""#, server.uri()),
        format!(r#"curl -g -I -XHEAD "{}/r2""#, server.uri()),
        format!(r#"curl -g -I -XHEAD "{}/r3""#, server.uri())];
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    proxy_exec.succeed_with("swift-get-nodes", &lines);

    let fleet = Arc::new(Fleet::from_parts(vec![proxy, data1]));
    let storage = StorageApi::new(&config.storage);
    let verifier = ReplicaVerifier::with_proxy(
        proxy_exec,
        storage,
        ServiceLayout::default(),
        config.storage.poll_interval(),
    );
    let restorer = Box::new(ManualRestorer::new(
        Arc::clone(&fleet),
        config.service.clone(),
        &config.management,
    ));
    let driver = Driver::with_parts(fleet, restorer, verifier, config);

    let summary = driver.run(None).await.unwrap();
    let by_name = |n: &str| {
        summary.results.iter().find(|r| r.name == n).unwrap().outcome.clone()
    };
    assert!(matches!(by_name("two-disks-down"), Outcome::Skipped(_)));
    assert!(matches!(by_name("two-disks-down-third-later"), Outcome::Skipped(_)));
    assert_eq!(by_name("one-disk-down"), Outcome::Passed);
}

#[tokio::test]
async fn test_disk_restore_scenario_runs_repair_sequence() {
    let server = MockServer::start().await;
    mount_storage(&server, &[("/r1", 200), ("/r2", 200), ("/r3", 200)]).await;

    let config = test_config(&server.uri(), 10);
    let harness = build_harness(&server.uri(), config, &["/r1", "/r2", "/r3"]);

    // The first mount query (picking the kill victim) sees everything
    // mounted; once vdb is killed, later queries see it gone.
    let data1 = &harness.data_execs[0];
    data1.respond("/proc/mounts", mount_table(&["vdc", "vdd"]));
    data1.respond_once("/proc/mounts", mount_table(&["vdb", "vdc", "vdd"]));

    let summary = harness.driver.run(Some("disk-replacement")).await.unwrap();
    assert_eq!(summary.results[0].outcome, Outcome::Passed);

    let commands = data1.commands();
    let kill = commands.iter().position(|c| c.contains("umount --force -l /dev/vdb")).unwrap();
    let format = commands.iter().position(|c| c.as_str() == "mkfs.ext4 -q /dev/vdb").unwrap();
    let mount = commands.iter().position(|c| c.as_str() == "mount /dev/vdb").unwrap();
    let fixup = commands.iter().position(|c| c.contains("chown -R swift:swift")).unwrap();
    assert!(kill < format && format < mount && mount < fixup, "bad order: {commands:?}");
}
