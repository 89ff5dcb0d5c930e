mod common;

use bedrock_fleet_lib::artifact::ArtifactCache;
use bedrock_fleet_lib::error::AppError;
use bedrock_fleet_lib::fleet::{
    CycleOutcome, FleetOrchestrator, ProgressEvent, UpdateGate, UpdateStage,
};
use bedrock_fleet_lib::instance::{ProcessControl, ALLOWLIST_FILE, EXECUTABLE_NAME, PROPERTIES_FILE};
use bedrock_fleet_lib::ledger::{UpdateLedger, LEDGER_FILE};
use bedrock_fleet_lib::marker::read_marker;
use bedrock_fleet_lib::settings::SettingsStore;
use bedrock_fleet_lib::testing::FakeProcesses;
use bedrock_fleet_lib::upstream::{Platform, VersionResolver};
use common::{links_body, release_zip, write_instance, HttpFixture, Route};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ARCHIVE_ROUTE: &str = "/bin-win/bedrock-server-1.21.2.zip";

struct Harness {
    fixture: HttpFixture,
    dir: tempfile::TempDir,
    procs: Arc<FakeProcesses>,
    fleet: FleetOrchestrator,
}

async fn harness(stored_version: &str) -> Harness {
    let fixture = HttpFixture::start().await;
    fixture.route(
        "/links",
        Route::ok(links_body(
            Platform::Windows.link_type(),
            &fixture.url(ARCHIVE_ROUTE),
        )),
    );
    fixture.route(ARCHIVE_ROUTE, Route::ok(release_zip()));

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("servers")).unwrap();
    std::fs::write(
        dir.path().join("configuration.json"),
        format!(
            r#"{{"currentVersion":"{}","instanceRoot":"servers"}}"#,
            stored_version
        ),
    )
    .unwrap();

    let procs = Arc::new(FakeProcesses::default());
    let client = reqwest::Client::new();
    let fleet = FleetOrchestrator::new(
        SettingsStore::new(dir.path().join("configuration.json")),
        VersionResolver::new(client.clone())
            .with_endpoint(fixture.url("/links"))
            .with_platform(Platform::Windows),
        ArtifactCache::new(client, dir.path().join("cache")),
        UpdateLedger::new(dir.path().join("Logs").join(LEDGER_FILE)),
        procs.clone(),
        UpdateGate::new(),
    );

    Harness {
        fixture,
        dir,
        procs,
        fleet,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn stage_order(events: &[ProgressEvent]) -> Vec<UpdateStage> {
    let mut stages: Vec<UpdateStage> = events.iter().map(|e| e.stage).collect();
    stages.dedup();
    stages
}

fn settings_version(dir: &Path) -> String {
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("configuration.json")).unwrap())
            .unwrap();
    raw["currentVersion"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_cycle_updates_every_instance() {
    let h = harness("1.21.0").await;
    let servers = h.dir.path().join("servers");
    write_instance(&servers.join("A"), Some("1.21.0"));
    write_instance(&servers.join("B"), Some("1.21.0"));
    let tuned_props = std::fs::read(servers.join("A").join(PROPERTIES_FILE)).unwrap();
    let tuned_allowlist = std::fs::read(servers.join("B").join(ALLOWLIST_FILE)).unwrap();

    // A is running before the update
    h.procs
        .launch(&servers.join("A").join(EXECUTABLE_NAME), &servers.join("A"))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = h
        .fleet
        .run_cycle(Some(&tx), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Updated {
            version: "1.21.2".to_string(),
            instance_count: 2,
            updated_count: 2,
        }
    );

    let events = drain(&mut rx);
    assert_eq!(
        stage_order(&events),
        vec![
            UpdateStage::Initializing,
            UpdateStage::CheckingVersion,
            UpdateStage::Downloading,
            UpdateStage::Extracting,
            UpdateStage::UpdatingInstances,
            UpdateStage::Restarting,
            UpdateStage::Complete,
        ]
    );
    assert!(events
        .windows(2)
        .all(|w| w[0].percentage <= w[1].percentage));
    assert_eq!(events.last().unwrap().percentage, 100.0);

    for name in ["A", "B"] {
        let root = servers.join(name);
        assert_eq!(
            read_marker(&root).await.unwrap().as_deref(),
            Some("1.21.2")
        );
        assert_eq!(std::fs::read(root.join(EXECUTABLE_NAME)).unwrap(), b"new build");
        assert!(root.join("behavior_packs/vanilla/manifest.json").exists());
    }
    assert_eq!(
        std::fs::read(servers.join("A").join(PROPERTIES_FILE)).unwrap(),
        tuned_props
    );
    assert_eq!(
        std::fs::read(servers.join("B").join(ALLOWLIST_FILE)).unwrap(),
        tuned_allowlist
    );

    // Both instances restarted, each exactly once
    assert_eq!(h.procs.running_executables().len(), 2);

    let history = UpdateLedger::new(h.dir.path().join("Logs").join(LEDGER_FILE))
        .entries()
        .await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, "1.21.2");
    assert_eq!(history[0].times_updated, 1);

    assert_eq!(settings_version(h.dir.path()), "1.21.2");
    assert_eq!(h.fixture.hits(ARCHIVE_ROUTE), 1);
}

#[tokio::test]
async fn test_up_to_date_fleet_short_circuits() {
    let h = harness("1.21.2").await;
    write_instance(&h.dir.path().join("servers").join("A"), Some("1.21.0"));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = h
        .fleet
        .run_cycle(Some(&tx), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::NoUpdateAvailable {
            version: "1.21.2".to_string()
        }
    );
    let events = drain(&mut rx);
    let last = events.last().unwrap();
    assert_eq!(last.stage, UpdateStage::Complete);
    assert_eq!(last.message, "No update available");
    assert_eq!(last.percentage, 100.0);

    assert_eq!(h.fixture.hits(ARCHIVE_ROUTE), 0);
    assert!(h.procs.running_executables().is_empty());
}

#[tokio::test]
async fn test_empty_fleet_fails_after_persisting_version() {
    let h = harness("1.21.0").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = h.fleet.run_cycle(Some(&tx), &CancellationToken::new()).await;

    assert!(matches!(result, Err(AppError::NoInstances(_))));
    let events = drain(&mut rx);
    let errors: Vec<_> = events
        .iter()
        .filter(|e| e.stage == UpdateStage::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("Update failed: No valid instances"));
    assert_eq!(errors[0].percentage, 0.0);

    assert_eq!(settings_version(h.dir.path()), "1.21.2");
    assert_eq!(h.fixture.hits(ARCHIVE_ROUTE), 0);
}

#[tokio::test]
async fn test_cancelled_cycle_reports_error() {
    let h = harness("1.21.0").await;
    write_instance(&h.dir.path().join("servers").join("A"), Some("1.21.0"));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = h.fleet.run_cycle(Some(&tx), &cancel).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    let last = drain(&mut rx).pop().unwrap();
    assert_eq!(last.stage, UpdateStage::Error);
    assert_eq!(last.message, "Update failed: Update cancelled");

    // Instance left untouched
    assert_eq!(
        read_marker(&h.dir.path().join("servers").join("A"))
            .await
            .unwrap()
            .as_deref(),
        Some("1.21.0")
    );
}
