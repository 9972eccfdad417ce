//! `CachedDataWriter`: publishes a structured record's fields to the
//! Cached Data Server over its UDP ingest port (spec.md §2 "each Writer of
//! type `CachedDataWriter` publishes to the Cached Data Server").

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};

use crate::cached_data_server::{CachedDataClient, PublishData, PublishValue};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// `{host?, port}` — the Cached Data Server's UDP ingest address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedDataWriterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

inventory::submit! {
    WriterDescription::new::<CachedDataWriterConfig>("CachedDataWriter")
}

#[async_trait]
impl WriterConfig for CachedDataWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        let client = CachedDataClient::connect(addr).await?;
        tracing::debug!(stage = %cx.name, %addr, "connected cached data writer");
        Ok(Box::new(CachedDataWriterImpl { client }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
}

struct CachedDataWriterImpl {
    client: CachedDataClient,
}

#[async_trait]
impl Writer for CachedDataWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let Some(structured) = record.as_structured() else {
            anyhow::bail!("CachedDataWriter requires a structured (parsed) record");
        };
        let fields = structured
            .fields
            .iter()
            .map(|(name, value)| {
                let published = match value {
                    rvdas_core::record::FieldValue::Scalar(s) => PublishValue::Scalar(s.clone()),
                    rvdas_core::record::FieldValue::Series(series) => {
                        PublishValue::Series(series.clone())
                    }
                };
                (name.clone(), published)
            })
            .collect();
        let data = PublishData {
            timestamp: structured.timestamp,
            fields,
            metadata: None,
        };
        self.client.publish(&data).await
    }
}
