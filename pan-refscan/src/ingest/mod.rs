//! Ingestion of configuration exports into [`EntityRecord`]s.
//!
//! Two dialects are accepted and auto-detected:
//!
//! - **set-statements** (`set device-group DG1 address web ip-netmask ...`),
//!   handled by [`set_lines`];
//! - **markup exports** (`<entry name="web">` blocks), handled by [`markup`].
//!
//! The whole file is read into memory once and walked in a single pass. Both
//! dialects honour a [`CancelToken`] and emit best-effort progress.

pub mod markup;
pub mod set_lines;

use std::fs;
use std::path::Path;

use panconf_core::ScanError;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::cancel::{CancelToken, Canceled};
use crate::config::AnalyzerConfig;
use crate::model::EntityRecord;
use crate::progress::ProgressReporter;

/// Input dialect of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    SetLines,
    Markup,
}

/// Errors returned while ingesting an export.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to scan markup export: {0}")]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Canceled(#[from] Canceled),
}

impl IngestError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, IngestError::Canceled(_))
    }
}

/// Borrowed collaborators shared by both dialects.
#[derive(Clone, Copy)]
pub struct IngestOptions<'a> {
    pub config: &'a AnalyzerConfig,
    pub cancel: &'a CancelToken,
    pub progress: &'a ProgressReporter,
}

#[derive(Debug)]
pub struct Ingested {
    pub dialect: Dialect,
    pub records: Vec<EntityRecord>,
    pub bytes: usize,
}

/// Pick the dialect from the first non-blank byte.
pub fn detect_dialect(bytes: &[u8]) -> Dialect {
    match bytes.iter().find(|byte| !byte.is_ascii_whitespace()) {
        Some(b'<') => Dialect::Markup,
        _ => Dialect::SetLines,
    }
}

/// Read `path` and convert it into records.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn ingest_file(path: &Path, options: IngestOptions<'_>) -> Result<Ingested, IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    ingest_bytes(&bytes, options)
}

/// Convert an in-memory export into records.
pub fn ingest_bytes(bytes: &[u8], options: IngestOptions<'_>) -> Result<Ingested, IngestError> {
    options.cancel.check()?;
    let dialect = detect_dialect(bytes);
    tracing::debug!(?dialect, bytes = bytes.len(), "detected export dialect");

    let records = match dialect {
        Dialect::SetLines => set_lines::parse_set_lines(&String::from_utf8_lossy(bytes), options)?,
        Dialect::Markup => markup::parse_markup(bytes, options)?,
    };

    options.progress.report(1.0, format!("ingested {} records", records.len()));
    tracing::info!(?dialect, records = records.len(), "ingestion finished");
    Ok(Ingested {
        dialect,
        records,
        bytes: bytes.len(),
    })
}
