//! JSON Lines sample archive.
//!
//! Uses JSON Lines format (.jsonl):
//! - Each line is one sample, complete JSON
//! - Files are opened in append mode and rotated daily
//!   (`samples_YYYY-MM-DD.jsonl`)
//! - Partial corruption only affects individual lines
//!
//! Samples are buffered in memory and written in batches through a session
//! borrowed from the writer pool.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use sigcast_core::SignalStatic;
use sigcast_feed::{FeedResult, SampleRecord, SampleSink};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, PersistenceResult};
use crate::pool::SessionPool;

/// Open file for the current day.
struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only writer with daily rotation.
pub struct DailyWriter {
    base_dir: PathBuf,
    prefix: &'static str,
    active: Option<ActiveFile>,
}

impl DailyWriter {
    pub fn new(base_dir: impl Into<PathBuf>, prefix: &'static str) -> PersistenceResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            prefix,
            active: None,
        })
    }

    /// Append records as JSON lines to today's file.
    pub fn write_batch<T: Serialize>(&mut self, records: &[T]) -> PersistenceResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();
        if self.active.as_ref().is_some_and(|a| a.date != today) {
            self.close();
        }

        let active = match self.active.take() {
            Some(active) => active,
            None => self.open(&today)?,
        };
        let active = self.active.insert(active);

        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(active.writer, "{json}")?;
        }
        active.writer.flush()?;
        active.records_written += records.len();

        debug!(date = %today, records = records.len(), "Flushed samples to JSON Lines");
        Ok(())
    }

    /// Path of the file for `date`.
    pub fn path_for(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("{}_{}.jsonl", self.prefix, date))
    }

    /// Close the active file.
    pub fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines writer"
            );
        }
    }

    fn open(&self, date: &str) -> PersistenceResult<ActiveFile> {
        let path = self.path_for(date);
        info!(path = %path.display(), "Opening JSON Lines writer (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ActiveFile {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        })
    }
}

impl Drop for DailyWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shared writer handed out by the session pool.
pub type WriterSession = Arc<Mutex<DailyWriter>>;

/// `SampleSink` that archives every sample to daily JSON Lines files.
pub struct JsonLinesSampleSink {
    buffer: Mutex<Vec<SampleRecord>>,
    buffer_size: usize,
    pool: SessionPool<WriterSession>,
}

impl JsonLinesSampleSink {
    pub fn new(config: &PersistenceConfig) -> PersistenceResult<Self> {
        config.validate()?;
        let writer = DailyWriter::new(&config.data_dir, "samples")?;
        Ok(Self {
            buffer: Mutex::new(Vec::with_capacity(config.buffer_size)),
            buffer_size: config.buffer_size,
            pool: SessionPool::new(Arc::new(Mutex::new(writer)), config.pool_size),
        })
    }

    /// Samples waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    fn write(&self, batch: Vec<SampleRecord>) -> PersistenceResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut session = match self.pool.try_session() {
            Ok(session) => session,
            Err(PersistenceError::PoolExhausted(size)) => {
                debug!(
                    pool_size = size,
                    samples = batch.len(),
                    "Writer pool busy, deferring batch"
                );
                self.requeue(batch);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let result = session.lock().write_batch(&batch);
        session.close();
        result
    }

    /// Put a batch back in front of samples buffered since it was taken.
    fn requeue(&self, batch: Vec<SampleRecord>) {
        let mut buffer = self.buffer.lock();
        let newer = std::mem::replace(&mut *buffer, batch);
        buffer.extend(newer);
    }

    fn take_batch(&self) -> Vec<SampleRecord> {
        let mut buffer = self.buffer.lock();
        std::mem::replace(&mut *buffer, Vec::with_capacity(self.buffer_size))
    }
}

impl SampleSink for JsonLinesSampleSink {
    fn record(&self, sample: &SampleRecord) -> FeedResult<()> {
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(*sample);
            if buffer.len() < self.buffer_size {
                return Ok(());
            }
            std::mem::replace(&mut *buffer, Vec::with_capacity(self.buffer_size))
        };
        Ok(self.write(batch)?)
    }

    fn flush(&self) -> FeedResult<()> {
        let batch = self.take_batch();
        Ok(self.write(batch)?)
    }
}

impl Drop for JsonLinesSampleSink {
    fn drop(&mut self) {
        let batch = self.take_batch();
        if let Err(e) = self.write(batch) {
            warn!(?e, "Failed to flush samples on drop");
        }
    }
}

/// Signal catalogue recorded at startup.
#[derive(Debug, Serialize)]
struct CatalogueRecord<'a> {
    timestamp: i64,
    signals: &'a [SignalStatic],
}

/// Write the signal catalogue to `signals_<timestamp>.json` in `dir`.
pub fn write_catalogue(dir: &Path, signals: &[SignalStatic]) -> PersistenceResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let timestamp = sigcast_core::now_nanos();
    let path = dir.join(format!("signals_{timestamp}.json"));
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, &CatalogueRecord { timestamp, signals })?;
    writer.flush()?;

    info!(path = %path.display(), count = signals.len(), "Wrote signal catalogue");
    Ok(path)
}
