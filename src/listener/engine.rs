//! The Listener engine proper (spec.md §4.2): wires a `LoggerConfig`'s
//! Readers, Transforms, and Writers into independent tasks joined by
//! bounded channels, and drives them until end-of-stream, a FATAL reader,
//! or the shutdown signal fires.
//!
//! Topology: every reader owns a task that rebuilds and restarts it with
//! backoff on failure (reusing the Logger Manager's own restart bookkeeping
//! — the same "3 failures in 60s is FATAL, backoff doubles capped at 30s"
//! rule applies to both a child process and a Reader, spec.md §4.2/§4.4).
//! Readers fan in to a single channel; one task applies the transform chain
//! in declared order and paces emission by `interval`; each writer then
//! gets its own bounded queue so one slow writer never starves another
//! (spec.md §4.2, §9 "fan-out to writers should not share a single
//! channel").

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;

use rvdas_core::record::Record;
use rvdas_core::registry::{build_reader, build_transform, build_writer};
use rvdas_core::shutdown::ShutdownSignal;
use rvdas_core::stage::{
    BackpressurePolicy, ReadOutcome, Reader, ReaderConfig, StageContext, Transform,
    TransformConfig, Writer, WriterConfig,
};
use rvdas_core::ConfigError;

use crate::config::LoggerConfig;
use crate::manager::{BackoffTracker, ReconcileConfig};

use super::format_check::check_format;

/// Tunables for the engine's own restart/backoff and cancellation grace.
/// Reuses `ReconcileConfig`'s shape (spec.md §4.4's defaults apply
/// identically here: failure_threshold=3, failure_window=60s,
/// backoff_initial=1s, backoff_cap=30s); `stop_grace` doubles as the
/// cancellation grace period a reader task is given before the engine
/// abandons it (spec.md §5).
pub type EngineConfig = ReconcileConfig;

/// What became of one `run_listener` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOutcome {
    /// Every reader reported end-of-stream; the pipeline drained and
    /// stopped on its own.
    EndOfStream,
    /// The shutdown signal fired and every stage stopped within its grace
    /// period.
    ShutDown,
    /// A reader exceeded its restart-failure threshold. The Logger Manager
    /// treats this the same way it treats a fatally-failing child process.
    Fatal { reader: String },
    /// Every configured writer is degraded (its last `write` failed); the
    /// pipeline has nowhere to deliver records and stops.
    AllWritersDegraded,
}

/// Run one logger's pipeline to completion. `config.is_off()` (no readers
/// and no writers) returns `EndOfStream` immediately without building
/// anything (spec.md §3).
pub async fn run_listener(
    config: &LoggerConfig,
    shutdown: ShutdownSignal,
    engine_config: EngineConfig,
) -> anyhow::Result<EngineOutcome> {
    if config.is_off() {
        return Ok(EngineOutcome::EndOfStream);
    }

    let reader_configs = build_stage_configs(&config.readers, build_reader)?;
    let transform_configs = build_stage_configs(&config.transforms, build_transform)?;
    let writer_configs = build_stage_configs(&config.writers, build_writer)?;
    let stderr_configs = build_stage_configs(&config.stderr_writers, build_writer)?;

    if config.check_format == Some(true) {
        check_format(&reader_configs, &transform_configs, &writer_configs)?;
    }

    let mut transforms = Vec::with_capacity(transform_configs.len());
    for t in &transform_configs {
        transforms.push(t.build()?);
    }

    let mut writers = spawn_writers(&config.name, writer_configs, &shutdown).await?;
    let mut stderr_writers =
        spawn_writers(&format!("{}:stderr", config.name), stderr_configs, &shutdown).await?;

    let (record_tx, mut record_rx) = mpsc::channel::<Record>(256);
    // A reader hitting FATAL must break the main loop immediately, not wait
    // for `record_rx` to close — that only happens once every reader's
    // sender drops, i.e. once *all* readers have finished (spec.md §4.2
    // "signal upward to the Logger Manager" is meant to be prompt, not
    // deferred behind unrelated still-running readers).
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<String>();
    let mut reader_tasks = Vec::with_capacity(reader_configs.len());
    for (i, reader_config) in reader_configs.into_iter().enumerate() {
        let name = format!("{}:reader[{i}]", config.name);
        metrics::counter!("rvdas_listener_readers_total", "logger" => config.name.clone())
            .increment(1);
        reader_tasks.push((
            name.clone(),
            tokio::spawn(run_reader(
                name,
                reader_config,
                record_tx.clone(),
                shutdown.clone(),
                engine_config,
                fatal_tx.clone(),
            )),
        ));
    }
    drop(record_tx);
    drop(fatal_tx);

    let interval = config.interval.filter(|s| *s > 0.0).map(Duration::from_secs_f64);
    let mut last_emit: Option<Instant> = None;
    let mut outcome = EngineOutcome::EndOfStream;
    let mut fatal_reader: Option<String> = None;
    let mut watchdog = shutdown.clone();

    loop {
        tokio::select! {
            biased;
            _ = &mut watchdog => {
                outcome = EngineOutcome::ShutDown;
                break;
            }
            Some(name) = fatal_rx.recv() => {
                outcome = EngineOutcome::Fatal { reader: name.clone() };
                fatal_reader = Some(name);
                break;
            }
            maybe = record_rx.recv() => {
                let Some(record) = maybe else { break };
                metrics::counter!("rvdas_listener_records_read_total", "logger" => config.name.clone())
                    .increment(1);
                let mut current = vec![record];
                for t in transforms.iter_mut() {
                    let mut next = Vec::with_capacity(current.len());
                    for r in current {
                        next.extend(t.transform(r));
                    }
                    current = next;
                }
                metrics::counter!("rvdas_listener_records_dropped_total", "logger" => config.name.clone())
                    .increment(current.is_empty() as u64);

                let mut delivered_any = false;
                let mut all_degraded = true;
                for record in current {
                    if let Some(gap) = interval {
                        if let Some(last) = last_emit {
                            let elapsed = last.elapsed();
                            if elapsed < gap {
                                sleep(gap - elapsed).await;
                            }
                        }
                        last_emit = Some(Instant::now());
                    }
                    fan_out(&record, &writers).await;
                    fan_out(&record, &stderr_writers).await;
                    delivered_any = true;
                    all_degraded = all_degraded
                        && !writers.is_empty()
                        && writers.iter().all(|w| !w.healthy.load(Ordering::Relaxed));
                }
                // A transform filtering out every record this tick (spec.md
                // §4.2/§7 FilterDrop) is normal and delivers nothing; only a
                // tick that actually attempted delivery can show degradation.
                if delivered_any && all_degraded {
                    tracing::error!(logger = %config.name, "all writers degraded; stopping pipeline");
                    diag(&stderr_writers, format!("all writers for {} degraded", config.name)).await;
                    outcome = EngineOutcome::AllWritersDegraded;
                    break;
                }
            }
        }
    }

    let grace_deadline = engine_config.stop_grace;
    for (name, handle) in reader_tasks {
        match tokio::time::timeout(grace_deadline, handle).await {
            Ok(Ok(ReaderOutcome::Fatal)) => {
                fatal_reader.get_or_insert(name);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(reader = %name, error = %e, "reader task panicked"),
            Err(_) => {
                tracing::warn!(reader = %name, "reader exceeded shutdown grace; abandoning task");
            }
        }
    }

    for w in writers.drain(..) {
        w.queue.close();
        let _ = w.task.await;
    }
    for w in stderr_writers.drain(..) {
        w.queue.close();
        let _ = w.task.await;
    }

    if let Some(reader) = fatal_reader {
        metrics::counter!("rvdas_listener_reader_fatal_total", "logger" => config.name.clone())
            .increment(1);
        return Ok(EngineOutcome::Fatal { reader });
    }
    Ok(outcome)
}

fn build_stage_configs<T: ?Sized>(
    specs: &[crate::config::StageSpec],
    build: fn(&str, Option<&str>, serde_json::Value) -> Result<Box<T>, ConfigError>,
) -> Result<Vec<Box<T>>, ConfigError> {
    specs
        .iter()
        .map(|spec| build(&spec.class, spec.module.as_deref(), spec.kwargs_value()))
        .collect()
}

/// A live writer plus the bookkeeping the central fan-out loop needs:
/// its bounded queue, a health flag flipped by the writer's own task, and
/// the task handle to join on shutdown.
struct WriterHandle {
    queue: Arc<WriterQueue>,
    healthy: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

async fn spawn_writers(
    owner: &str,
    writer_configs: Vec<Box<dyn WriterConfig>>,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<Vec<WriterHandle>> {
    let mut handles = Vec::with_capacity(writer_configs.len());
    for (i, writer_config) in writer_configs.into_iter().enumerate() {
        let name = format!("{owner}:writer[{i}]");
        let queue = WriterQueue::new(writer_config.queue_depth(), writer_config.backpressure());
        let flush_on_stop = writer_config.flush_on_stop();
        let cx = StageContext::new(name.clone(), shutdown.clone());
        let writer = writer_config.build(cx).await?;
        let healthy = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_writer(
            name,
            writer,
            queue.clone(),
            shutdown.clone(),
            flush_on_stop,
            healthy.clone(),
        ));
        handles.push(WriterHandle { queue, healthy, task });
    }
    Ok(handles)
}

async fn fan_out(record: &Record, writers: &[WriterHandle]) {
    let pushes = writers.iter().map(|w| {
        let record = record.clone();
        let queue = w.queue.clone();
        async move { queue.push(record).await }
    });
    futures::future::join_all(pushes).await;
}

/// Best-effort diagnostic emission to `stderr_writers`: never awaited by
/// the critical path, never allowed to block record delivery.
async fn diag(stderr_writers: &[WriterHandle], message: String) {
    for w in stderr_writers {
        let queue = w.queue.clone();
        let record = Record::text(message.clone());
        tokio::spawn(async move { queue.push(record).await });
    }
}

async fn run_writer(
    name: String,
    mut writer: Box<dyn Writer>,
    queue: Arc<WriterQueue>,
    mut shutdown: ShutdownSignal,
    flush_on_stop: bool,
    healthy: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            record = queue.pop() => {
                match record {
                    Some(record) => write_one(&name, &mut *writer, record, &healthy).await,
                    None => break,
                }
            }
        }
    }
    if flush_on_stop {
        queue.close();
        while let Some(record) = queue.try_pop() {
            write_one(&name, &mut *writer, record, &healthy).await;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!(writer = %name, error = %e, "flush on stop failed");
        }
    }
}

async fn write_one(name: &str, writer: &mut dyn Writer, record: Record, healthy: &AtomicBool) {
    match writer.write(record).await {
        Ok(()) => healthy.store(true, Ordering::Relaxed),
        Err(e) => {
            healthy.store(false, Ordering::Relaxed);
            tracing::warn!(writer = %name, error = %e, "writer failed; marked degraded");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ReaderOutcome {
    EndOfStream,
    Cancelled,
    Fatal,
}

async fn run_reader(
    name: String,
    reader_config: Box<dyn ReaderConfig>,
    tx: mpsc::Sender<Record>,
    shutdown: ShutdownSignal,
    restart: ReconcileConfig,
    fatal_tx: mpsc::UnboundedSender<String>,
) -> ReaderOutcome {
    let mut backoff = BackoffTracker::default();
    loop {
        let cx = StageContext::new(name.clone(), shutdown.clone());
        let mut reader: Box<dyn Reader> = match reader_config.build(cx).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(reader = %name, error = %e, "failed to build reader");
                let (_, fatal) = backoff.record_failure(Instant::now(), &restart);
                if fatal {
                    let _ = fatal_tx.send(name.clone());
                    return ReaderOutcome::Fatal;
                }
                if !wait_or_cancel(backoff.next_delay(&restart), shutdown.clone()).await {
                    return ReaderOutcome::Cancelled;
                }
                continue;
            }
        };

        let mut restart_reader = false;
        loop {
            let mut cancel = shutdown.clone();
            tokio::select! {
                biased;
                _ = &mut cancel => return ReaderOutcome::Cancelled,
                result = reader.read() => {
                    match result {
                        Ok(ReadOutcome::Record(record)) => {
                            backoff.reset();
                            if tx.send(record).await.is_err() {
                                return ReaderOutcome::EndOfStream;
                            }
                        }
                        Ok(ReadOutcome::EndOfStream) => return ReaderOutcome::EndOfStream,
                        Err(e) => {
                            tracing::warn!(reader = %name, error = %e, "reader read failed");
                            if !reader_config.restartable() {
                                return ReaderOutcome::EndOfStream;
                            }
                            let (_, fatal) = backoff.record_failure(Instant::now(), &restart);
                            if fatal {
                                tracing::error!(reader = %name, "reader marked FATAL after repeated failures");
                                let _ = fatal_tx.send(name.clone());
                                return ReaderOutcome::Fatal;
                            }
                            if !wait_or_cancel(backoff.next_delay(&restart), shutdown.clone()).await {
                                return ReaderOutcome::Cancelled;
                            }
                            restart_reader = true;
                        }
                    }
                }
            }
            if restart_reader {
                break;
            }
        }
    }
}

async fn wait_or_cancel(delay: Duration, mut shutdown: ShutdownSignal) -> bool {
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = sleep(delay) => true,
        _ = &mut shutdown => false,
    }
}

/// A bounded, backpressure-policy-aware queue sitting between the engine's
/// fan-out loop and one writer task. `tokio::sync::mpsc` has no drop-oldest
/// mode, so both policies are built on one small deque (spec.md §4.2, §9
/// "per-writer backpressure policy").
struct WriterQueue {
    inner: Mutex<VecDeque<Record>>,
    capacity: usize,
    policy: BackpressurePolicy,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
}

impl WriterQueue {
    fn new(capacity: usize, policy: BackpressurePolicy) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    async fn push(&self, record: Record) {
        loop {
            {
                let mut q = self.inner.lock().unwrap();
                if q.len() < self.capacity {
                    q.push_back(record);
                    self.not_empty.notify_one();
                    return;
                }
                if self.policy == BackpressurePolicy::DropOldest {
                    q.pop_front();
                    q.push_back(record);
                    tracing::warn!("writer queue full; dropped oldest record");
                    self.not_empty.notify_one();
                    return;
                }
            }
            self.not_full.notified().await;
        }
    }

    async fn pop(&self) -> Option<Record> {
        loop {
            {
                let mut q = self.inner.lock().unwrap();
                if let Some(record) = q.pop_front() {
                    self.not_full.notify_one();
                    return Some(record);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    fn try_pop(&self) -> Option<Record> {
        let mut q = self.inner.lock().unwrap();
        let record = q.pop_front();
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSpec;

    #[tokio::test]
    async fn off_config_ends_immediately() {
        let config = LoggerConfig {
            name: "off".to_string(),
            ..Default::default()
        };
        let outcome = run_listener(&config, ShutdownSignal::noop(), EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome, EngineOutcome::EndOfStream);
    }

    #[tokio::test]
    async fn fatal_reader_breaks_loop_promptly_with_other_readers_still_blocked() {
        // Regression: with N>1 readers, a reader that trips the FATAL
        // threshold must not wait for every other reader to finish before
        // the engine notices — it has to win the race against a reader
        // still blocked on I/O (here, a UDPReader with nobody sending to
        // it).
        let dir = tempfile::tempdir().unwrap();
        let missing_path = dir.path().join("does-not-exist.txt");
        let udp_port = crate::test_util::next_addr().port();

        let config = LoggerConfig {
            name: "fatal_race".to_string(),
            readers: vec![
                StageSpec {
                    class: "TextFileReader".to_string(),
                    module: None,
                    kwargs: serde_json::json!({ "path": missing_path.to_str().unwrap() })
                        .as_object()
                        .unwrap()
                        .clone(),
                },
                StageSpec {
                    class: "UDPReader".to_string(),
                    module: None,
                    kwargs: serde_json::json!({ "port": udp_port })
                        .as_object()
                        .unwrap()
                        .clone(),
                },
            ],
            writers: vec![StageSpec {
                class: "TextWriter".to_string(),
                module: None,
                kwargs: serde_json::json!({ "path": "-" }).as_object().unwrap().clone(),
            }],
            ..Default::default()
        };

        let fast_backoff = EngineConfig {
            failure_threshold: 2,
            failure_window: Duration::from_secs(60),
            backoff_initial: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            stop_grace: Duration::from_millis(50),
            ..EngineConfig::default()
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            run_listener(&config, ShutdownSignal::noop(), fast_backoff),
        )
        .await
        .expect("engine should report FATAL without waiting on the still-blocked UDP reader")
        .unwrap();

        match outcome {
            EngineOutcome::Fatal { reader } => assert!(reader.contains("reader[0]")),
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writer_queue_blocks_until_drained() {
        let queue = WriterQueue::new(1, BackpressurePolicy::Block);
        queue.push(Record::text("a")).await;
        let q2 = queue.clone();
        let pusher = tokio::spawn(async move { q2.push(Record::text("b")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pusher.is_finished());
        assert_eq!(queue.pop().await, Some(Record::text("a")));
        pusher.await.unwrap();
        assert_eq!(queue.pop().await, Some(Record::text("b")));
    }

    #[tokio::test]
    async fn writer_queue_drops_oldest_when_full() {
        let queue = WriterQueue::new(1, BackpressurePolicy::DropOldest);
        queue.push(Record::text("a")).await;
        queue.push(Record::text("b")).await;
        assert_eq!(queue.pop().await, Some(Record::text("b")));
    }
}
