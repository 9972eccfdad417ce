//! End-to-end Listener engine scenarios (spec.md §8, scenarios 1 and 2):
//! a real `TextFileReader` -> `TimestampTransform` -> `PrefixTransform` ->
//! `TextWriter` pipeline, and a UDP fan-out between two such pipelines.

use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use rvdas::config::{LoggerConfig, StageSpec};
use rvdas::listener::{run_listener, EngineConfig, EngineOutcome};
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

fn obj(pairs: impl IntoIterator<Item = (&'static str, serde_json::Value)>) -> serde_json::Map<String, serde_json::Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[tokio::test]
async fn simple_text_pipeline_prefixes_every_line_in_order() {
    rvdas::test_util::trace_init();

    let dir = tempdir().unwrap();
    let input_path = dir.path().join("input.txt");
    let output_path = dir.path().join("output.txt");
    tokio::fs::write(&input_path, "alpha\nbeta\ngamma\n")
        .await
        .unwrap();

    let config = LoggerConfig {
        name: "text_pipeline".to_string(),
        readers: vec![stage(
            "TextFileReader",
            obj([("path", json!(input_path.to_str().unwrap()))]),
        )],
        transforms: vec![
            stage("TimestampTransform", Default::default()),
            stage("PrefixTransform", obj([("prefix", json!("license: "))])),
        ],
        writers: vec![stage(
            "TextWriter",
            obj([("path", json!(output_path.to_str().unwrap()))]),
        )],
        ..Default::default()
    };

    let outcome = run_listener(&config, ShutdownSignal::noop(), EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(outcome, EngineOutcome::EndOfStream);

    let written = tokio::fs::read_to_string(&output_path).await.unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    for (line, original) in lines.iter().zip(["alpha", "beta", "gamma"]) {
        assert!(line.starts_with("license: "), "line missing prefix: {line}");
        assert!(line.ends_with(original), "line missing body: {line}");
        let stamp = line.trim_start_matches("license: ").trim_end_matches(original);
        assert!(stamp.contains('T'), "missing ISO-8601 timestamp: {line}");
    }
}

#[tokio::test]
async fn udp_fan_out_strips_prefix_and_timestamp_downstream() {
    rvdas::test_util::trace_init();

    let dir = tempdir().unwrap();
    let input_path = dir.path().join("input.txt");
    let output_path = dir.path().join("output.txt");
    tokio::fs::write(&input_path, "alpha\nbeta\ngamma\n")
        .await
        .unwrap();

    let udp_addr = next_addr();
    let udp_port = udp_addr.port();

    let downstream_config = LoggerConfig {
        name: "udp_consumer".to_string(),
        readers: vec![stage("UDPReader", obj([("port", json!(udp_port))]))],
        transforms: vec![stage(
            "SliceTransform",
            obj([("spec", json!("2:"))]),
        )],
        writers: vec![stage(
            "TextWriter",
            obj([("path", json!(output_path.to_str().unwrap()))]),
        )],
        ..Default::default()
    };

    let (downstream_trigger, downstream_signal) = ShutdownTrigger::new();
    let downstream = tokio::spawn(async move {
        run_listener(&downstream_config, downstream_signal, EngineConfig::default()).await
    });

    // Give the UDP reader a moment to bind before the producer sends.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let upstream_config = LoggerConfig {
        name: "udp_producer".to_string(),
        readers: vec![stage(
            "TextFileReader",
            obj([("path", json!(input_path.to_str().unwrap()))]),
        )],
        transforms: vec![
            stage("TimestampTransform", Default::default()),
            stage("PrefixTransform", obj([("prefix", json!("license: "))])),
        ],
        writers: vec![stage("UDPWriter", obj([("port", json!(udp_port))]))],
        ..Default::default()
    };
    let outcome = run_listener(&upstream_config, ShutdownSignal::noop(), EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(outcome, EngineOutcome::EndOfStream);

    // Let the datagrams land before stopping the downstream pipeline.
    tokio::time::sleep(Duration::from_millis(200)).await;
    downstream_trigger.shutdown();
    let downstream_outcome = downstream.await.unwrap().unwrap();
    assert_eq!(downstream_outcome, EngineOutcome::ShutDown);

    let written = tokio::fs::read_to_string(&output_path).await.unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
}
