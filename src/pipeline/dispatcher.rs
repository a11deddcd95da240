use crate::aggregate::BucketAggregator;
use crate::config::types::{Config, MissingWatermarkStrategy};
use crate::export::{ExportError, Exporter, ExporterFactory};
use crate::source::parser::{LineParser, ParseError};
use crate::source::reader::{LogFileReader, ReaderError};
use crate::source::selector::{self, SelectError, Selection};
use crate::storage::checkpoint::{Checkpoint, CheckpointError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("selecting log files: {0}")]
    Select(#[from] SelectError),

    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("connecting to sink: {0}")]
    Connect(#[source] ExportError),

    #[error("reading '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReaderError,
    },

    #[error("exporting '{}': {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: ExportError,
    },

    #[error("checkpointed file '{}' is no longer in the log directory", watermark.display())]
    WatermarkNotFound { watermark: PathBuf },
}

/// Totals of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub files: usize,
    pub samples: usize,
}

/// Moves rotated log files through parsing, aggregation and export, and
/// advances the checkpoint after each one.
///
/// Files are handled strictly one after the other so the checkpoint only
/// ever moves forward.
pub struct Dispatcher {
    log_dir: PathBuf,
    checkpoint: Checkpoint,
    parser: LineParser,
    exporters: Arc<dyn ExporterFactory>,
    on_missing_watermark: MissingWatermarkStrategy,
}

impl Dispatcher {
    pub fn new(
        log_dir: PathBuf,
        checkpoint: Checkpoint,
        parser: LineParser,
        exporters: Arc<dyn ExporterFactory>,
        on_missing_watermark: MissingWatermarkStrategy,
    ) -> Self {
        Self {
            log_dir,
            checkpoint,
            parser,
            exporters,
            on_missing_watermark,
        }
    }

    pub fn from_config(
        config: &Config,
        exporters: Arc<dyn ExporterFactory>,
    ) -> Result<Self, ParseError> {
        let parser = LineParser::new(config.log_line_regex.as_deref())?;
        Ok(Self::new(
            config.gk_log_dir.clone(),
            Checkpoint::new(&config.checkpoint_path),
            parser,
            exporters,
            config.on_missing_watermark,
        ))
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Files that still need exporting, oldest first.
    pub fn pending_files(&self) -> Result<Vec<PathBuf>, DispatchError> {
        let watermark = self.checkpoint.load()?;
        let entries = selector::list_dir(&self.log_dir)?;

        match selector::select(&entries, watermark.as_deref()) {
            Selection::Pending(files) => Ok(files),
            Selection::WatermarkNotFound {
                watermark,
                newer,
                all,
            } => match (self.on_missing_watermark, newer) {
                (MissingWatermarkStrategy::ResumeAfter, Some(newer)) => {
                    warn!(
                        watermark = %watermark.display(),
                        pending = newer.len(),
                        "Checkpointed file is gone, resuming with the files rotated after it"
                    );
                    Ok(newer)
                }
                (MissingWatermarkStrategy::ReprocessAll, _) => {
                    warn!(
                        watermark = %watermark.display(),
                        pending = all.len(),
                        "Checkpointed file is gone, reprocessing every retained file"
                    );
                    Ok(all)
                }
                _ => Err(DispatchError::WatermarkNotFound { watermark }),
            },
        }
    }

    /// Export every pending file.
    ///
    /// One sink connection serves the whole pass. The first failure stops the
    /// pass; the failing file is not checkpointed, so the next pass starts
    /// with it again.
    pub async fn drain(&self) -> Result<DrainReport, DispatchError> {
        let files = self.pending_files()?;
        if files.is_empty() {
            debug!(log_dir = %self.log_dir.display(), "No rotated log files pending");
            return Ok(DrainReport::default());
        }

        info!(pending = files.len(), "Draining rotated log files");

        let mut exporter = self.exporters.connect().map_err(DispatchError::Connect)?;
        let result = self.drain_files(&files, exporter.as_mut()).await;
        exporter.close().await;
        result
    }

    async fn drain_files(
        &self,
        files: &[PathBuf],
        exporter: &mut dyn Exporter,
    ) -> Result<DrainReport, DispatchError> {
        let mut report = DrainReport::default();

        for file in files {
            let samples = self.process_file(file, exporter).await?;
            self.checkpoint.save(file)?;

            report.files += 1;
            report.samples += samples;
        }

        Ok(report)
    }

    /// Stream one file through the parser and aggregator into `exporter`.
    /// Returns the number of samples exported.
    pub async fn process_file(
        &self,
        path: &Path,
        exporter: &mut dyn Exporter,
    ) -> Result<usize, DispatchError> {
        debug!(path = %path.display(), "Parsing log file");

        let read_err = |source| DispatchError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = LogFileReader::open(path, &self.parser).map_err(read_err)?;
        let mut aggregator = BucketAggregator::new();
        let mut exported = 0;

        loop {
            let record = reader.next_record().map_err(read_err)?;
            let sample = match record {
                Some(record) => match aggregator.feed(record) {
                    Some(sample) => sample,
                    None => continue,
                },
                None => match aggregator.flush() {
                    Some(sample) => sample,
                    None => break,
                },
            };

            exporter
                .export(&sample)
                .await
                .map_err(|source| DispatchError::Export {
                    path: path.to_path_buf(),
                    source,
                })?;
            exported += 1;
        }

        info!(
            path = %path.display(),
            samples = exported,
            lines = reader.lines_read(),
            skipped = reader.lines_skipped(),
            "Exported log file"
        );

        Ok(exported)
    }
}
