//! `rvdas-run`: the single-logger pipeline runner (spec.md §6).
//!
//! Either `--config_file path[:config_name]` loads a `LoggerConfig`
//! (optionally selecting one entry out of a cruise file), or a sequence of
//! positional-order-sensitive flags composes one directly. Flags are
//! processed strictly left to right: a modifier flag (`--slice_separator`,
//! `--parse_definition_path`, `--logfile_use_timestamps`, `--interval`)
//! only affects stage flags that come after it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde_json::{json, Map, Value};

use rvdas::config::{load_cruise_str, LoaderOptions, LoggerConfig, StageSpec};
use rvdas::listener::{run_listener, EngineConfig, EngineOutcome};
use rvdas::shutdown::ShutdownTrigger;

fn main() -> ExitCode {
    rvdas::telemetry::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match build_logger_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rvdas-run: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("rvdas-run: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(config))
}

async fn run(config: LoggerConfig) -> ExitCode {
    let (trigger, signal) = ShutdownTrigger::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, draining pipeline");
        }
        trigger.shutdown();
    });

    match run_listener(&config, signal, EngineConfig::default()).await {
        Ok(EngineOutcome::EndOfStream | EngineOutcome::ShutDown) => ExitCode::SUCCESS,
        Ok(EngineOutcome::Fatal { reader }) => {
            eprintln!("rvdas-run: reader `{reader}` failed past its restart threshold");
            ExitCode::FAILURE
        }
        Ok(EngineOutcome::AllWritersDegraded) => {
            eprintln!("rvdas-run: every configured writer is degraded");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("rvdas-run: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Everything the left-to-right flag scan accumulates before it is
/// assembled into a `LoggerConfig` (spec.md §6).
#[derive(Default)]
struct Builder {
    readers: Vec<StageSpec>,
    transforms: Vec<StageSpec>,
    writers: Vec<StageSpec>,
    interval: Option<f64>,
    slice_separator: String,
    parse_definition_path: Option<String>,
    logfile_use_timestamps: bool,
}

fn build_logger_config(args: &[String]) -> anyhow::Result<LoggerConfig> {
    if let Some(first) = args.first() {
        if first == "--config_file" {
            let spec = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("--config_file requires a path argument"))?;
            return load_config_file(spec);
        }
    }

    let mut b = Builder {
        logfile_use_timestamps: true,
        slice_separator: " ".to_string(),
        ..Default::default()
    };

    let mut it = args.iter();
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--interval" => {
                let v = next_value(&mut it, flag)?;
                b.interval = Some(v.parse()?);
            }
            "--slice_separator" => {
                b.slice_separator = next_value(&mut it, flag)?;
            }
            "--parse_definition_path" => {
                b.parse_definition_path = Some(next_value(&mut it, flag)?);
            }
            "--logfile_use_timestamps" => {
                b.logfile_use_timestamps = next_value(&mut it, flag)?.parse()?;
            }
            "--serial" => {
                let kwargs = parse_kv(&next_value(&mut it, flag)?);
                b.readers.push(spec("SerialReader", kwargs));
            }
            "--udp" => {
                let port: u16 = next_value(&mut it, flag)?.parse()?;
                b.readers.push(spec("UDPReader", kwargs([("port", json!(port))])));
            }
            "--file" => {
                let path = next_value(&mut it, flag)?;
                b.readers
                    .push(spec("TextFileReader", kwargs([("path", json!(path))])));
            }
            "--logfile" => {
                let filebase = next_value(&mut it, flag)?;
                b.readers
                    .push(spec("LogfileReader", kwargs([("filebase", json!(filebase))])));
            }
            "--transform_timestamp" => {
                b.transforms.push(spec("TimestampTransform", Map::new()));
            }
            "--transform_prefix" => {
                let prefix = next_value(&mut it, flag)?;
                b.transforms
                    .push(spec("PrefixTransform", kwargs([("prefix", json!(prefix))])));
            }
            "--transform_slice" => {
                let spec_str = next_value(&mut it, flag)?;
                b.transforms.push(spec(
                    "SliceTransform",
                    kwargs([("spec", json!(spec_str)), ("separator", json!(b.slice_separator))]),
                ));
            }
            "--transform_regex_filter" => {
                let pattern = next_value(&mut it, flag)?;
                b.transforms
                    .push(spec("RegexFilterTransform", kwargs([("pattern", json!(pattern))])));
            }
            "--transform_parse" => {
                let mut kw = Map::new();
                if let Some(path) = &b.parse_definition_path {
                    kw.insert("definition_path".to_string(), json!(path));
                }
                b.transforms.push(spec("ParseTransform", kw));
            }
            "--write_file" => {
                let path = next_value(&mut it, flag)?;
                b.writers
                    .push(spec("TextWriter", kwargs([("path", json!(path))])));
            }
            "--write_udp" => {
                let port: u16 = next_value(&mut it, flag)?.parse()?;
                b.writers.push(spec("UDPWriter", kwargs([("port", json!(port))])));
            }
            "--write_logfile" => {
                let filebase = next_value(&mut it, flag)?;
                b.writers.push(spec(
                    "LogfileWriter",
                    kwargs([
                        ("filebase", json!(filebase)),
                        ("use_timestamps", json!(b.logfile_use_timestamps)),
                    ]),
                ));
            }
            other => anyhow::bail!("unrecognized flag `{other}`"),
        }
    }

    if b.readers.is_empty() && b.writers.is_empty() {
        anyhow::bail!("no readers/writers configured: pass --config_file or at least one --<source>/--write_<sink> flag");
    }

    Ok(LoggerConfig {
        name: "rvdas-run".to_string(),
        readers: b.readers,
        transforms: b.transforms,
        writers: b.writers,
        stderr_writers: Vec::new(),
        interval: b.interval,
        check_format: None,
        host_id: None,
    })
}

fn next_value(it: &mut std::slice::Iter<'_, String>, flag: &str) -> anyhow::Result<String> {
    it.next()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn spec(class: &str, kwargs: Map<String, Value>) -> StageSpec {
    StageSpec {
        class: class.to_string(),
        module: None,
        kwargs,
    }
}

fn kwargs<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// `key=value,key2=value2` as used by `--serial port=/dev/ttyUSB0,baud_rate=4800`.
/// Values are inferred as bool, int, float, or else kept as a string.
fn parse_kv(raw: &str) -> Map<String, Value> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), infer_scalar(v)))
        .collect()
}

fn infer_scalar(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return json!(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return json!(f);
    }
    json!(raw)
}

/// `--config_file path[:config_name]` (spec.md §6). A bare `LoggerConfig`
/// document is accepted directly; a cruise definition requires
/// `:config_name` to select the entry to run.
fn load_config_file(arg: &str) -> anyhow::Result<LoggerConfig> {
    let (path, selected) = match arg.split_once(':') {
        Some((p, c)) => (p, Some(c)),
        None => (arg, None),
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {path}: {e}"))?;

    if selected.is_none() {
        if let Ok(config) = serde_yaml::from_str::<LoggerConfig>(&text) {
            if !config.name.is_empty() || !config.readers.is_empty() || !config.writers.is_empty() {
                return Ok(config);
            }
        }
    }

    let options = LoaderOptions {
        base_dir: Path::new(path).parent().map(PathBuf::from),
    };
    let definition = load_cruise_str(&text, &options)?;
    let name = selected.ok_or_else(|| {
        anyhow::anyhow!("`{path}` is a cruise definition; select a config with `{path}:config_name`")
    })?;
    definition
        .configs
        .get(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("cruise definition `{path}` has no config `{name}`"))
}
