//! Logger Manager reconciliation against a real child process (spec.md §8
//! scenario 3: mode change): a cruise definition with one logger whose
//! "net" config reads a finite file and writes its lines back out, wired
//! so `SetActiveMode` observably starts and runs it.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::json;
use tempfile::tempdir;

use rvdas::config::{CruiseDefinition, CruiseMeta, LoggerConfig, LoggerEntry, StageSpec};
use rvdas::listener::{run_listener, EngineConfig};
use rvdas::manager::{
    LoggerManager, LoggerStatus, ManagerOptions, MemoryBackend, ReconcileConfig, StatusSink,
};
use rvdas::shutdown::ShutdownTrigger;
use rvdas::test_util::next_addr;
use rvdas::ShutdownSignal;

fn stage(class: &str, kwargs: serde_json::Map<String, serde_json::Value>) -> StageSpec {
    StageSpec {
        class: class.to_string(),
        module: None,
        kwargs,
    }
}

fn obj(
    pairs: impl IntoIterator<Item = (&'static str, serde_json::Value)>,
) -> serde_json::Map<String, serde_json::Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[tokio::test]
async fn mode_change_starts_and_runs_the_assigned_logger_config() {
    rvdas::test_util::trace_init();

    let dir = tempdir().unwrap();
    let input_path = dir.path().join("input.txt");
    let output_path = dir.path().join("output.txt");
    tokio::fs::write(&input_path, "alpha\nbeta\ngamma\n")
        .await
        .unwrap();

    let mut configs = IndexMap::new();
    configs.insert(
        "off".to_string(),
        LoggerConfig {
            name: "lgr1->off".into(),
            ..Default::default()
        },
    );
    configs.insert(
        "net".to_string(),
        LoggerConfig {
            name: "lgr1->net".into(),
            readers: vec![stage(
                "TextFileReader",
                obj([("path", json!(input_path.to_str().unwrap()))]),
            )],
            writers: vec![stage(
                "TextWriter",
                obj([("path", json!(output_path.to_str().unwrap()))]),
            )],
            ..Default::default()
        },
    );

    let mut loggers = IndexMap::new();
    loggers.insert(
        "lgr1".to_string(),
        LoggerEntry {
            configs: vec!["off".into(), "net".into()],
        },
    );

    let mut modes = IndexMap::new();
    modes.insert("port".to_string(), IndexMap::new());
    let mut underway = IndexMap::new();
    underway.insert("lgr1".to_string(), "net".to_string());
    modes.insert("underway".to_string(), underway);

    let definition = CruiseDefinition {
        cruise: CruiseMeta {
            id: "test-cruise".into(),
            start: None,
            end: None,
        },
        loggers,
        configs,
        modes,
        default_mode: "port".to_string(),
    };
    definition.validate().expect("fixture definition must be valid");

    let config_path = dir.path().join("cruise.yaml");
    tokio::fs::write(&config_path, serde_yaml::to_string(&definition).unwrap())
        .await
        .unwrap();

    let manager = LoggerManager::new(ManagerOptions {
        binary_path: std::path::PathBuf::from(env!("CARGO_BIN_EXE_rvdas-run")),
        reconcile: ReconcileConfig::default(),
        backend: Arc::new(MemoryBackend::new()),
        status_sink: StatusSink::None,
        initial_mode: None,
        stderr_file_pattern: None,
    });

    let (trigger, signal) = ShutdownTrigger::new();
    let run_manager = Arc::clone(&manager);
    let run_task = tokio::spawn(async move { run_manager.run(signal).await });

    manager
        .load_configuration(config_path.to_string_lossy().into_owned())
        .await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    // Still in the default "port" mode: lgr1 has no assignment there, so
    // it stays off and never writes anything.
    assert!(
        !output_path.exists(),
        "lgr1 should stay off in the default `port` mode"
    );

    manager
        .set_active_mode("underway".to_string())
        .await
        .expect("underway is a defined mode");

    // Poll rather than sleep a fixed amount: the reconcile tick, child
    // spawn, and the child's own (near-instant, finite-file) run all
    // happen on their own schedules.
    let mut output = String::new();
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        if let Ok(contents) = tokio::fs::read_to_string(&output_path).await {
            if contents.lines().count() >= 3 {
                output = contents;
                break;
            }
        }
    }
    let lines: Vec<&str> = output.lines().take(3).collect();
    assert_eq!(
        lines,
        vec!["alpha", "beta", "gamma"],
        "expected the `net` config's TextWriter to have run after SetActiveMode"
    );

    manager.quit();
    trigger.shutdown();
    let _ = run_task.await.unwrap();
}

#[tokio::test]
async fn unknown_mode_is_rejected_without_touching_desired_state() {
    rvdas::test_util::trace_init();

    let manager = LoggerManager::new(ManagerOptions {
        binary_path: std::path::PathBuf::from(env!("CARGO_BIN_EXE_rvdas-run")),
        reconcile: ReconcileConfig::default(),
        backend: Arc::new(MemoryBackend::new()),
        status_sink: StatusSink::None,
        initial_mode: None,
        stderr_file_pattern: None,
    });

    // No definition loaded yet: every mutating command is rejected.
    assert!(manager.set_active_mode("underway".to_string()).await.is_err());
}

#[tokio::test]
async fn repeated_spawn_failures_escalate_to_fatal_with_backoff() {
    // spec.md §8 scenario 4: a reader that always fails immediately
    // restarts three times with growing backoff, then the logger is FATAL.
    rvdas::test_util::trace_init();

    let dir = tempdir().unwrap();

    let mut configs = IndexMap::new();
    configs.insert(
        "off".to_string(),
        LoggerConfig {
            name: "lgr1->off".into(),
            ..Default::default()
        },
    );
    configs.insert(
        "broken".to_string(),
        LoggerConfig {
            name: "lgr1->broken".into(),
            readers: vec![stage(
                "TextFileReader",
                obj([(
                    "path",
                    json!(dir.path().join("does-not-exist.txt").to_str().unwrap()),
                )]),
            )],
            ..Default::default()
        },
    );

    let mut loggers = IndexMap::new();
    loggers.insert(
        "lgr1".to_string(),
        LoggerEntry {
            configs: vec!["off".into(), "broken".into()],
        },
    );

    let mut modes = IndexMap::new();
    modes.insert("off".to_string(), IndexMap::new());
    let mut on = IndexMap::new();
    on.insert("lgr1".to_string(), "broken".to_string());
    modes.insert("on".to_string(), on);

    let definition = CruiseDefinition {
        cruise: CruiseMeta {
            id: "test-cruise".into(),
            start: None,
            end: None,
        },
        loggers,
        configs,
        modes,
        default_mode: "off".to_string(),
    };
    definition.validate().expect("fixture definition must be valid");

    let config_path = dir.path().join("cruise.yaml");
    tokio::fs::write(&config_path, serde_yaml::to_string(&definition).unwrap())
        .await
        .unwrap();

    let manager = LoggerManager::new(ManagerOptions {
        binary_path: std::path::PathBuf::from(env!("CARGO_BIN_EXE_rvdas-run")),
        reconcile: ReconcileConfig::default(),
        backend: Arc::new(MemoryBackend::new()),
        status_sink: StatusSink::None,
        initial_mode: None,
        stderr_file_pattern: None,
    });

    let (trigger, signal) = ShutdownTrigger::new();
    let run_manager = Arc::clone(&manager);
    let run_task = tokio::spawn(async move { run_manager.run(signal).await });

    manager
        .load_configuration(config_path.to_string_lossy().into_owned())
        .await;
    manager
        .set_active_mode("on".to_string())
        .await
        .expect("`on` is a defined mode");

    // Each spawned child itself retries its always-failing reader three
    // times before exiting, so one restart cycle here takes several
    // seconds; poll generously rather than sleep a guessed-at duration.
    let mut final_status = None;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = manager.get_status().await;
        if let Some(state) = status.get("lgr1") {
            if state.status == LoggerStatus::Fatal {
                final_status = Some(state.clone());
                break;
            }
        }
    }

    let state = final_status.expect("lgr1 should reach FATAL within 60s");
    assert!(
        state.failures >= 3,
        "expected at least 3 recorded failures, got {}",
        state.failures
    );

    manager.quit();
    trigger.shutdown();
    let _ = run_task.await.unwrap();
}

#[tokio::test]
async fn geofence_crossing_drives_a_live_manager_mode_change() {
    // spec.md §8 scenario 6: a GeofenceTransform's emitted command, carried
    // by a real LoggerManagerWriter, actually flips a live LoggerManager's
    // active mode over its command websocket.
    rvdas::test_util::trace_init();

    let dir = tempdir().unwrap();

    let mut configs = IndexMap::new();
    configs.insert(
        "calm_config".to_string(),
        LoggerConfig {
            name: "lgr1->calm".into(),
            ..Default::default()
        },
    );
    configs.insert(
        "eez_config".to_string(),
        LoggerConfig {
            name: "lgr1->eez".into(),
            ..Default::default()
        },
    );

    let mut loggers = IndexMap::new();
    loggers.insert(
        "lgr1".to_string(),
        LoggerEntry {
            configs: vec!["calm_config".into(), "eez_config".into()],
        },
    );

    let mut modes = IndexMap::new();
    let mut calm = IndexMap::new();
    calm.insert("lgr1".to_string(), "calm_config".to_string());
    modes.insert("calm".to_string(), calm);
    let mut eez = IndexMap::new();
    eez.insert("lgr1".to_string(), "eez_config".to_string());
    // The mode name is fixed by GeofenceTransform's hard-coded
    // "set_active_mode eez_mode" command text, not chosen by this test.
    modes.insert("eez_mode".to_string(), eez);

    let definition = CruiseDefinition {
        cruise: CruiseMeta {
            id: "test-cruise".into(),
            start: None,
            end: None,
        },
        loggers,
        configs,
        modes,
        default_mode: "calm".to_string(),
    };
    definition.validate().expect("fixture definition must be valid");

    let config_path = dir.path().join("cruise.yaml");
    tokio::fs::write(&config_path, serde_yaml::to_string(&definition).unwrap())
        .await
        .unwrap();

    let manager = LoggerManager::new(ManagerOptions {
        binary_path: std::path::PathBuf::from(env!("CARGO_BIN_EXE_rvdas-run")),
        reconcile: ReconcileConfig::default(),
        backend: Arc::new(MemoryBackend::new()),
        status_sink: StatusSink::None,
        initial_mode: None,
        stderr_file_pattern: None,
    });

    let command_addr = next_addr();
    let (trigger, signal) = ShutdownTrigger::new();

    let command_manager = Arc::clone(&manager);
    let command_signal = signal.clone();
    let command_task = tokio::spawn(async move {
        let _ = command_manager.serve_commands(command_addr, command_signal).await;
    });
    let run_manager = Arc::clone(&manager);
    let run_task = tokio::spawn(async move { run_manager.run(signal).await });

    manager
        .load_configuration(config_path.to_string_lossy().into_owned())
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.get_active_mode().await, "calm");

    // Device definitions renaming the generic Seapath330 fields to the
    // s330Latitude/s330Longitude names GeofenceTransform watches (spec.md
    // §4.5 two-pass field resolution; see spec.md §8 scenario 5's device).
    let defs_path = dir.path().join("devices.yaml");
    tokio::fs::write(
        &defs_path,
        r#"
device_types:
  Seapath330:
    formats:
      - format: "{Latitude:f},{Longitude:f}"
devices:
  seap:
    device_type: Seapath330
    fields:
      Latitude: s330Latitude
      Longitude: s330Longitude
"#,
    )
    .await
    .unwrap();

    // First record sits well outside the boundary (baseline only); the
    // second crosses into it and should emit "set_active_mode eez_mode".
    let input_path = dir.path().join("track.txt");
    tokio::fs::write(
        &input_path,
        "seap 2014-08-01T00:00:00.000000Z -1.0,-2.0\n\
         seap 2014-08-01T00:00:01.000000Z 5.0,6.0\n",
    )
    .await
    .unwrap();

    let pipeline = LoggerConfig {
        name: "geofence_feed".to_string(),
        readers: vec![stage(
            "TextFileReader",
            obj([("path", json!(input_path.to_str().unwrap()))]),
        )],
        transforms: vec![
            stage(
                "ParseTransform",
                obj([("definition_path", json!(defs_path.to_str().unwrap()))]),
            ),
            stage(
                "GeofenceTransform",
                obj([
                    ("lat_field", json!("s330Latitude")),
                    ("lon_field", json!("s330Longitude")),
                    ("boundary", json!("0,0 10,0 10,10 0,10")),
                    ("enter_command", json!("set_active_mode eez_mode")),
                    ("exit_command", json!("set_active_mode underway_mode")),
                ]),
            ),
        ],
        writers: vec![stage(
            "LoggerManagerWriter",
            obj([
                ("host", json!(command_addr.ip().to_string())),
                ("port", json!(command_addr.port())),
                ("whitelist", json!(["set_active_mode "])),
            ]),
        )],
        ..Default::default()
    };

    run_listener(&pipeline, ShutdownSignal::noop(), EngineConfig::default())
        .await
        .unwrap();

    let mut reached_eez = false;
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        if manager.get_active_mode().await == "eez_mode" {
            reached_eez = true;
            break;
        }
    }
    assert!(
        reached_eez,
        "geofence crossing should have driven the manager into `eez_mode`"
    );
    assert_eq!(
        manager.get_active_logger_config("lgr1").await.as_deref(),
        Some("eez_config")
    );

    manager.quit();
    trigger.shutdown();
    let _ = run_task.await.unwrap();
    let _ = command_task.await;
}
