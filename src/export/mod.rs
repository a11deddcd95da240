pub mod influx;

use crate::aggregate::Sample;
use async_trait::async_trait;
use thiserror::Error;

pub use influx::{InfluxExporter, InfluxExporterFactory};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected write with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("sink error: {0}")]
    Other(String),
}

/// Destination for aggregated samples.
///
/// `export` returns only once the sink acknowledged the write.
#[async_trait]
pub trait Exporter: Send {
    async fn export(&mut self, sample: &Sample) -> Result<(), ExportError>;

    async fn close(&mut self);
}

/// Opens one [`Exporter`] per drain pass.
pub trait ExporterFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Exporter>, ExportError>;
}
