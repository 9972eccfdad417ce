//! `ComposedReader`: merges several nested Readers into one stream,
//! interleaved in arrival order (spec.md §2 "Composed Reader/Writer —
//! nested pipeline blocks"; §4.1 "composition with other readers is
//! provided by the ComposedReader, not by the stage itself").

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::{build_reader, ReaderDescription};
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::StageSpec;

/// `{readers}` — each a nested `StageSpec`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComposedReaderConfig {
    pub readers: Vec<StageSpec>,
}

inventory::submit! {
    ReaderDescription::new::<ComposedReaderConfig>("ComposedReader")
}

#[async_trait]
impl ReaderConfig for ComposedReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let (tx, rx) = mpsc::channel(64);
        let active = self.readers.len();
        for (i, spec) in self.readers.iter().enumerate() {
            let inner_config = build_reader(&spec.class, spec.module.as_deref(), spec.kwargs_value())?;
            let sub_cx = StageContext::new(format!("{}[{i}]", cx.name), cx.shutdown.clone());
            let mut inner = inner_config.build(sub_cx).await?;
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match inner.read().await {
                        Ok(ReadOutcome::Record(record)) => {
                            if tx.send(Ok(Some(record))).await.is_err() {
                                break;
                            }
                        }
                        Ok(ReadOutcome::EndOfStream) => {
                            let _ = tx.send(Ok(None)).await;
                            break;
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e.to_string())).await;
                            break;
                        }
                    }
                }
            });
        }
        Ok(Box::new(ComposedReaderImpl {
            rx,
            active,
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        true
    }
}

struct ComposedReaderImpl {
    rx: mpsc::Receiver<Result<Option<Record>, String>>,
    active: usize,
}

#[async_trait]
impl Reader for ComposedReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            if self.active == 0 {
                return Ok(ReadOutcome::EndOfStream);
            }
            match self.rx.recv().await {
                Some(Ok(Some(record))) => return Ok(ReadOutcome::Record(record)),
                Some(Ok(None)) => {
                    self.active -= 1;
                    continue;
                }
                Some(Err(reason)) => return Err(anyhow::anyhow!(reason)),
                None => return Ok(ReadOutcome::EndOfStream),
            }
        }
    }
}
