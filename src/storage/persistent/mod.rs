//! File-backed snapshots of the three owned stores.
//!
//! Each store is written to its own file in a snapshot directory:
//!
//! ```text
//! <dir>/aggregates.snap    bucket set of the live aggregate snapshot
//! <dir>/completeness.snap  every completeness record
//! <dir>/analytics.snap     every analytics cache entry
//! ```
//!
//! Files are written to a temporary name and renamed into place, so a crash
//! mid-save leaves the previous file intact. Missing files load as empty
//! stores.

mod codec;

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::aggregate::{trailing_window, AggregateBucket, BucketSnapshot};
use crate::analytics::AnalyticsEntry;
use crate::completeness::CompletenessRecord;
use crate::engine::EngineStores;
use crate::storage::traits::{AnalyticsStore, BucketStore, CompletenessStore, StorageError};

const AGGREGATES_FILE: &str = "aggregates.snap";
const COMPLETENESS_FILE: &str = "completeness.snap";
const ANALYTICS_FILE: &str = "analytics.snap";

/// Configuration for snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Whether to fsync each file before renaming it into place.
    pub sync_on_write: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { sync_on_write: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AggregateDoc {
    reference_date: NaiveDate,
    retained_years: u32,
    built_at: DateTime<Utc>,
    fact_count: u64,
    buckets: Vec<AggregateBucket>,
}

impl AggregateDoc {
    fn check(&self) -> Result<(), StorageError> {
        if trailing_window(self.reference_date, self.retained_years).is_none() {
            return Err(StorageError::SerializationError(format!(
                "{AGGREGATES_FILE}: unusable retained window of {} years ending {}",
                self.retained_years, self.reference_date
            )));
        }
        Ok(())
    }
}

/// What a load restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Buckets in the restored aggregate snapshot.
    pub buckets: usize,
    /// Completeness records restored.
    pub completeness_records: usize,
    /// Analytics entries restored.
    pub analytics_entries: usize,
}

/// A directory holding one snapshot file per store.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
    config: SnapshotConfig,
}

/// Open (creating if needed) a snapshot directory.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be created.
pub fn open_snapshot_dir(
    path: impl AsRef<Path>,
    config: Option<SnapshotConfig>,
) -> Result<SnapshotDir, StorageError> {
    let root = path.as_ref().to_path_buf();
    fs::create_dir_all(&root)?;
    Ok(SnapshotDir {
        root,
        config: config.unwrap_or_default(),
    })
}

impl SnapshotDir {
    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write the live aggregate snapshot. An unbuilt snapshot removes the file.
    ///
    /// # Errors
    ///
    /// Storage or I/O failure.
    pub fn save_buckets(&self, store: &dyn BucketStore) -> Result<(), StorageError> {
        let snapshot = store.current()?;
        let (Some(reference_date), Some(built_at)) = (snapshot.reference_date(), snapshot.built_at()) else {
            return remove_if_exists(&self.root.join(AGGREGATES_FILE));
        };
        let doc = AggregateDoc {
            reference_date,
            retained_years: snapshot.retained_years(),
            built_at,
            fact_count: snapshot.fact_count(),
            buckets: snapshot.buckets().copied().collect(),
        };
        self.write_file(AGGREGATES_FILE, &doc)
    }

    /// Write every completeness record.
    ///
    /// # Errors
    ///
    /// Storage or I/O failure.
    pub fn save_completeness(&self, store: &dyn CompletenessStore) -> Result<(), StorageError> {
        self.write_file(COMPLETENESS_FILE, &store.all()?)
    }

    /// Write every analytics entry.
    ///
    /// # Errors
    ///
    /// Storage or I/O failure.
    pub fn save_analytics(&self, store: &dyn AnalyticsStore) -> Result<(), StorageError> {
        self.write_file(ANALYTICS_FILE, &store.all()?)
    }

    /// Write all three stores.
    ///
    /// # Errors
    ///
    /// Storage or I/O failure; files already written stay written.
    pub fn save_all(&self, stores: &EngineStores) -> Result<(), StorageError> {
        self.save_buckets(stores.buckets.as_ref())?;
        self.save_completeness(stores.completeness.as_ref())?;
        self.save_analytics(stores.analytics.as_ref())?;
        tracing::info!(dir = %self.root.display(), "snapshots saved");
        Ok(())
    }

    /// Restore all three stores from disk.
    ///
    /// Every file is read and checked before any store is touched. The
    /// aggregate snapshot and the analytics cache are replaced wholesale.
    /// Completeness records overwrite records of the same entity; other
    /// records stay. Records are restored verbatim; run a reconciliation
    /// sweep afterwards if the threshold changed.
    ///
    /// # Errors
    ///
    /// I/O failure, bad header, CRC mismatch, malformed JSON, or an
    /// aggregate document whose retained window is unusable.
    pub fn load_into(&self, stores: &EngineStores) -> Result<LoadReport, StorageError> {
        let aggregates = self.read_file::<AggregateDoc>(AGGREGATES_FILE)?;
        if let Some(doc) = &aggregates {
            doc.check()?;
        }
        let records = self.read_file::<Vec<CompletenessRecord>>(COMPLETENESS_FILE)?;
        let entries = self.read_file::<Vec<AnalyticsEntry>>(ANALYTICS_FILE)?;

        let mut report = LoadReport::default();

        if let Some(doc) = aggregates {
            report.buckets = doc.buckets.len();
            stores.buckets.swap(BucketSnapshot::from_parts(
                doc.buckets,
                doc.reference_date,
                doc.retained_years,
                doc.built_at,
                doc.fact_count,
            ))?;
        }

        if let Some(records) = records {
            report.completeness_records = records.len();
            for record in records {
                stores.completeness.replace(record)?;
            }
        }

        if let Some(entries) = entries {
            report.analytics_entries = entries.len();
            stores.analytics.clear()?;
            for entry in entries {
                stores.analytics.restore(entry)?;
            }
        }

        tracing::info!(
            dir = %self.root.display(),
            buckets = report.buckets,
            completeness = report.completeness_records,
            analytics = report.analytics_entries,
            "snapshots loaded"
        );
        Ok(report)
    }

    fn write_file<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let path = self.root.join(name);
        let tmp = self.root.join(format!("{name}.tmp"));

        let frame = codec::encode(value)?;
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            let mut writer = BufWriter::new(file);
            codec::write_header(&mut writer)?;
            writer.write_all(&frame)?;
            writer.flush()?;
            if self.config.sync_on_write {
                writer.get_ref().sync_all()?;
            }
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_file<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let path = self.root.join(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        let value = codec::decode(&mut reader)
            .map_err(|e| StorageError::SerializationError(format!("{}: {e}", path.display())))?;
        Ok(Some(value))
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
