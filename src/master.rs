//! The master dataset: one CSV snapshot plus a relational mirror.
//!
//! The CSV is the source of truth and is rewritten atomically on every
//! merge (temp file in the same directory, then rename). The SQLite mirror
//! is rebuilt from scratch inside one transaction so downstream readers
//! never observe a half-merged state.
//!
//! ## Update-mode supersession
//!
//! A re-extracted price list replaces its previous rows. Three dimensions
//! supersede independently: an existing row is dropped when its brand OR
//! its year OR its source file matches a distinct value present in the
//! incoming batch. A null dimension never matches anything, so rows without
//! a brand survive a branded re-import. Duplicates inside one batch are
//! preserved as-is; deduplication across batches is exactly this
//! supersession rule.

use crate::debug_dump;
use crate::error::ExtractError;
use crate::record::Record;
use rusqlite::Connection;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How a batch lands in the master dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Append the batch; nothing existing is touched.
    New,
    /// Drop existing rows superseded by the batch, then append.
    Update,
}

/// What one merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows appended from the batch.
    pub added: usize,
    /// Existing rows removed by supersession.
    pub removed: usize,
    /// Rows in the master after the merge.
    pub total: usize,
}

/// Handle on the master CSV, its SQLite mirror, and the debug artifacts
/// tied to merged sources.
#[derive(Debug, Clone)]
pub struct MasterStore {
    csv_path: PathBuf,
    db_path: PathBuf,
    debug_dir: Option<PathBuf>,
}

impl MasterStore {
    pub fn new(csv_path: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            db_path: db_path.into(),
            debug_dir: None,
        }
    }

    /// Clear `debug_dir/{source-stem}` for every merged source.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Merge a batch of records into the master dataset.
    pub fn merge(&self, batch: &[Record], mode: MergeMode) -> Result<MergeReport, ExtractError> {
        let existing = self.load_existing()?;
        let before = existing.len();

        let kept: Vec<Record> = match mode {
            MergeMode::New => existing,
            MergeMode::Update => {
                let superseded = Supersession::from_batch(batch);
                existing
                    .into_iter()
                    .filter(|r| !superseded.covers(r))
                    .collect()
            }
        };
        let removed = before - kept.len();

        let mut merged = kept;
        merged.extend(batch.iter().cloned());

        self.write_csv_atomic(&merged)?;
        self.rebuild_db(&merged)?;
        // Debug dumps of a superseded import are stale; a plain append
        // leaves them in place for inspection.
        if mode == MergeMode::Update {
            self.clear_debug_artifacts(batch);
        }

        let report = MergeReport {
            added: batch.len(),
            removed,
            total: merged.len(),
        };
        info!(
            added = report.added,
            removed = report.removed,
            total = report.total,
            "master merge complete"
        );
        Ok(report)
    }

    /// Read the current snapshot; a missing file is an empty master.
    pub fn load_existing(&self) -> Result<Vec<Record>, ExtractError> {
        if !self.csv_path.exists() {
            return Ok(Vec::new());
        }
        let mut reader =
            csv::Reader::from_path(&self.csv_path).map_err(|e| ExtractError::MasterIo {
                path: self.csv_path.clone(),
                detail: e.to_string(),
            })?;
        reader
            .deserialize()
            .collect::<Result<Vec<Record>, _>>()
            .map_err(|e| ExtractError::MasterIo {
                path: self.csv_path.clone(),
                detail: e.to_string(),
            })
    }

    fn write_csv_atomic(&self, records: &[Record]) -> Result<(), ExtractError> {
        let io_err = |e: &dyn std::fmt::Display| ExtractError::MasterIo {
            path: self.csv_path.clone(),
            detail: e.to_string(),
        };

        let dir = self.csv_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| io_err(&e))?;

        // Same directory, so the final rename cannot cross file systems.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(&e))?;
        {
            let mut writer = csv::Writer::from_writer(&mut tmp);
            for record in records {
                writer.serialize(record).map_err(|e| io_err(&e))?;
            }
            writer.flush().map_err(|e| io_err(&e))?;
        }
        tmp.flush().map_err(|e| io_err(&e))?;
        tmp.persist(&self.csv_path).map_err(|e| io_err(&e))?;
        debug!("wrote {} rows to {}", records.len(), self.csv_path.display());
        Ok(())
    }

    /// Drop and repopulate the mirror inside one transaction.
    fn rebuild_db(&self, records: &[Record]) -> Result<(), ExtractError> {
        let db_err = |e: rusqlite::Error| ExtractError::MasterDb(e.to_string());

        if let Some(dir) = self.db_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ExtractError::MasterIo {
                path: self.db_path.clone(),
                detail: e.to_string(),
            })?;
        }

        let mut conn = Connection::open(&self.db_path).map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute_batch(
            "DROP TABLE IF EXISTS prices;
             CREATE TABLE prices (
                 id             INTEGER PRIMARY KEY AUTOINCREMENT,
                 material_code  TEXT,
                 description    TEXT NOT NULL,
                 short_code     TEXT,
                 price          TEXT NOT NULL,
                 unit           TEXT,
                 box_count      INTEGER,
                 price_currency TEXT NOT NULL,
                 source_file    TEXT NOT NULL,
                 source_page    INTEGER,
                 image_path     TEXT,
                 record_code    TEXT NOT NULL,
                 year           INTEGER,
                 brand          TEXT,
                 main_title     TEXT,
                 sub_title      TEXT,
                 category       TEXT
             );",
        )
        .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO prices (
                         material_code, description, short_code, price, unit,
                         box_count, price_currency, source_file, source_page,
                         image_path, record_code, year, brand, main_title,
                         sub_title, category
                     ) VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?6, ?7, NULL, ?8, ?9, ?10, ?11, ?12, NULL)",
                )
                .map_err(db_err)?;

            for r in records {
                stmt.execute(rusqlite::params![
                    r.code,
                    r.description,
                    r.short_code,
                    r.price.to_string(),
                    r.currency,
                    r.source_file,
                    r.source_page,
                    r.record_code,
                    r.year,
                    r.brand,
                    r.section_title,
                    r.subsection_title,
                ])
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        debug!("rebuilt mirror at {}", self.db_path.display());
        Ok(())
    }

    fn clear_debug_artifacts(&self, batch: &[Record]) {
        let Some(ref dir) = self.debug_dir else {
            return;
        };
        let stems: HashSet<&str> = batch
            .iter()
            .map(|r| {
                Path::new(&r.source_file)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(r.source_file.as_str())
            })
            .collect();
        for stem in stems {
            debug_dump::clear_source(dir, stem);
        }
    }
}

/// The distinct non-null dimension values one batch supersedes.
struct Supersession {
    brands: HashSet<String>,
    years: HashSet<i32>,
    source_files: HashSet<String>,
}

impl Supersession {
    fn from_batch(batch: &[Record]) -> Self {
        Self {
            brands: batch.iter().filter_map(|r| r.brand.clone()).collect(),
            years: batch.iter().filter_map(|r| r.year).collect(),
            source_files: batch.iter().map(|r| r.source_file.clone()).collect(),
        }
    }

    /// True when any dimension of `record` matches the batch. Null
    /// dimensions on the existing record never match.
    fn covers(&self, record: &Record) -> bool {
        if record
            .brand
            .as_ref()
            .is_some_and(|b| self.brands.contains(b))
        {
            return true;
        }
        if record.year.is_some_and(|y| self.years.contains(&y)) {
            return true;
        }
        self.source_files.contains(&record.source_file)
    }
}
