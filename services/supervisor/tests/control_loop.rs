//! End-to-end tests of the supervision loop against mocked pool and node
//! endpoints and an in-memory process runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use supervysor::metrics::SupervisorMetrics;
use supervysor::node::{
    MockRuntime, NodeLaunchConfig, NodeMode, NodeStatusClient, ProcessManager, GHOST_SEEDS,
};
use supervysor::pruning::DiskPruner;
use supervysor::settings::{resolve_with_client, Thresholds, DEFAULT_PRUNING_INTERVAL};
use supervysor::supervisor::{Supervisor, SupervisorSettings, TickOutcome};
use supervysor_pool::PoolClient;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POOL_ID: u64 = 7;

fn thresholds() -> Thresholds {
    Thresholds {
        height_difference_max: 720_000,
        height_difference_min: 360_000,
        pruning_interval: DEFAULT_PRUNING_INTERVAL,
        keep_recent: 1_008_000,
        keep_every: 0,
    }
}

async fn mount_heights(server: &MockServer, pool_height: i64, node_height: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/kyve/query/v1beta1/pool/{POOL_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pool": {
                "id": POOL_ID.to_string(),
                "data": {
                    "current_key": pool_height.to_string(),
                    "start_key": "1",
                    "upload_interval": "60",
                    "max_bundle_size": "100"
                }
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/abci_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {"response": {"last_block_height": node_height.to_string()}}
        })))
        .mount(server)
        .await;
}

fn supervisor(
    server: &MockServer,
    runtime: Arc<MockRuntime>,
    home: &Path,
    tick_interval: Duration,
) -> Supervisor {
    let manager = ProcessManager::new(
        runtime.clone(),
        NodeLaunchConfig::new("/usr/bin/osmosisd", home, "id@seed:26656"),
    );
    let pruner = DiskPruner::new(runtime, "/usr/bin/osmosisd", home, 1_008_000);

    Supervisor::new(
        manager,
        PoolClient::new(vec![server.uri()], Duration::from_secs(2)).unwrap(),
        NodeStatusClient::new(&server.uri(), Duration::from_secs(2)).unwrap(),
        pruner,
        SupervisorMetrics::new().unwrap(),
        SupervisorSettings {
            pool_id: POOL_ID,
            tick_interval,
            thresholds: thresholds(),
        },
    )
}

#[tokio::test]
async fn test_normal_ghost_normal() {
    let server = MockServer::start().await;
    let home = tempfile::tempdir().unwrap();
    let runtime = Arc::new(MockRuntime::new());
    let mut supervisor = supervisor(&server, runtime.clone(), home.path(), Duration::from_secs(10));

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.manager().mode(), NodeMode::Normal);

    // Node 800k behind: above the 720k max.
    mount_heights(&server, 900_000, 100_000).await;
    let outcome = supervisor.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Transitioned {
            to: NodeMode::Ghost,
            ..
        }
    ));
    assert_eq!(supervisor.metrics().pool_height(), 900_000.0);
    assert_eq!(supervisor.metrics().node_height(), 100_000.0);

    let launches = runtime.launches().await;
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[1].flag_value("--p2p.seeds"), Some(GHOST_SEEDS));
    assert!(launches[1].has_flag("--p2p.laddr"));

    // Still in Ghost: nothing happens inside the band.
    server.reset().await;
    mount_heights(&server, 900_000, 400_000).await;
    assert!(matches!(supervisor.tick().await, TickOutcome::Held { .. }));
    assert_eq!(runtime.launches().await.len(), 2);

    // Node 50k behind: below the 360k min.
    server.reset().await;
    mount_heights(&server, 900_000, 850_000).await;
    let outcome = supervisor.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Transitioned {
            to: NodeMode::Normal,
            ..
        }
    ));

    let launches = runtime.launches().await;
    assert_eq!(launches.len(), 3);
    assert!(launches[2].has_flag("--p2p.seeds"));
    assert_eq!(runtime.terminations().await.len(), 2);
    assert_eq!(runtime.running_count().await, 1);
}

#[tokio::test]
async fn test_node_endpoint_down_skips_decision() {
    let server = MockServer::start().await;
    let home = tempfile::tempdir().unwrap();
    let runtime = Arc::new(MockRuntime::new());
    let mut supervisor = supervisor(&server, runtime.clone(), home.path(), Duration::from_secs(10));
    supervisor.start().await.unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/kyve/query/v1beta1/pool/{POOL_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "pool": {"data": {"current_key": "900000", "start_key": "1"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/abci_info"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let outcome = supervisor.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Skipped {
            consecutive_failures: 1
        }
    );
    // The pool gauge still moves.
    assert_eq!(supervisor.metrics().pool_height(), 900_000.0);
    assert_eq!(supervisor.manager().mode(), NodeMode::Normal);
    assert_eq!(runtime.launches().await.len(), 1);

    // Recovery resets the failure streak.
    server.reset().await;
    mount_heights(&server, 900_000, 899_000).await;
    assert!(matches!(supervisor.tick().await, TickOutcome::Held { .. }));
    assert_eq!(supervisor.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_failed_ghost_switch_is_retried() {
    let server = MockServer::start().await;
    let home = tempfile::tempdir().unwrap();
    let runtime = Arc::new(MockRuntime::new());
    let mut supervisor = supervisor(&server, runtime.clone(), home.path(), Duration::from_secs(10));
    supervisor.start().await.unwrap();
    mount_heights(&server, 900_000, 100_000).await;

    runtime.set_fail_launches(true);
    assert!(matches!(
        supervisor.tick().await,
        TickOutcome::TransitionFailed {
            target: NodeMode::Ghost,
            ..
        }
    ));
    assert_eq!(supervisor.manager().mode(), NodeMode::Normal);

    runtime.set_fail_launches(false);
    let outcome = supervisor.tick().await;
    // The tick first relaunches the missing process in Normal mode, then switches.
    assert!(matches!(
        outcome,
        TickOutcome::Transitioned {
            to: NodeMode::Ghost,
            ..
        }
    ));
    assert_eq!(runtime.running_count().await, 1);
}

#[tokio::test]
async fn test_run_stops_node_on_shutdown() {
    let server = MockServer::start().await;
    let home = tempfile::tempdir().unwrap();
    let runtime = Arc::new(MockRuntime::new());
    let mut supervisor = supervisor(
        &server,
        runtime.clone(),
        home.path(),
        Duration::from_millis(50),
    );
    mount_heights(&server, 900_000, 100_000).await;
    supervisor.start().await.unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        supervisor.run(rx).await;
        supervisor
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while runtime.launches().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    tx.send(true).unwrap();
    let supervisor = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(supervisor.manager().mode(), NodeMode::Ghost);
    assert_eq!(supervisor.manager().pid(), None);
    assert_eq!(runtime.running_count().await, 0);
}

#[tokio::test]
async fn test_settings_from_pool_params() {
    let server = MockServer::start().await;
    mount_heights(&server, 900_000, 100_000).await;
    let client = PoolClient::new(vec![server.uri()], Duration::from_secs(2)).unwrap();

    let resolved = resolve_with_client(&client, POOL_ID).await.unwrap();
    assert_eq!(resolved.height_difference_max, 720_000);
    assert_eq!(resolved.height_difference_min, 360_000);
    assert_eq!(resolved.keep_recent, 1_008_000);
}
