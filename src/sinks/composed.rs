//! `ComposedWriter`: fans a record out to several nested Writers in
//! parallel, so a single logical "writer" slot in a `LoggerConfig` can
//! address more than one destination (spec.md §2 "Composed Reader/Writer —
//! nested pipeline blocks").

use async_trait::async_trait;
use futures::future::join_all;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::{build_writer, WriterDescription};
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};

use crate::config::StageSpec;

/// `{writers}` — each a nested `StageSpec`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComposedWriterConfig {
    pub writers: Vec<StageSpec>,
}

inventory::submit! {
    WriterDescription::new::<ComposedWriterConfig>("ComposedWriter")
}

#[async_trait]
impl WriterConfig for ComposedWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let mut inner = Vec::with_capacity(self.writers.len());
        for (i, spec) in self.writers.iter().enumerate() {
            let config = build_writer(&spec.class, spec.module.as_deref(), spec.kwargs_value())?;
            let sub_cx = StageContext::new(format!("{}[{i}]", cx.name), cx.shutdown.clone());
            inner.push(config.build(sub_cx).await?);
        }
        Ok(Box::new(ComposedWriterImpl { inner }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }
}

struct ComposedWriterImpl {
    inner: Vec<Box<dyn Writer>>,
}

#[async_trait]
impl Writer for ComposedWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let results = join_all(self.inner.iter_mut().map(|w| {
            let record = record.clone();
            async move { w.write(record).await }
        }))
        .await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(Result::err)
            .map(|e| e.to_string())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("composed writer: {} nested writer(s) failed: {}", failures.len(), failures.join("; "))
        }
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        for w in &mut self.inner {
            w.flush().await?;
        }
        Ok(())
    }
}
