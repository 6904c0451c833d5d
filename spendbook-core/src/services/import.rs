//! Import service - CSV statement ingestion
//!
//! Rows are normalized, then inserted one by one. Each insert commits on
//! its own: a fatal error stops the batch but keeps everything stored
//! before it, and re-running the same file afterwards only adds the rest.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{ColumnMappings, Config, ImportProfile, PartyColumns};
use crate::domain::result::{Error, Result};
use crate::domain::{ImportRun, ImportStatus, InsertOutcome, NaturalKey, NewTransaction};
use crate::ports::TransactionStore;
use crate::services::normalizer::{Normalized, RawRow, RecordNormalizer, SkipReason};

/// What to do with a row that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidRowPolicy {
    /// Count it as rejected and keep going
    #[default]
    Continue,
    /// Stop the batch at the first rejected row
    Abort,
}

/// Import options for one run
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Report what would happen without writing anything
    pub preview: bool,
    pub on_invalid: InvalidRowPolicy,
}

/// A row that reached the store but failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line in the source file
    pub line: u64,
    pub fields: Vec<&'static str>,
}

/// Per-run counters
///
/// Every data row lands in exactly one of `created`, `duplicates`,
/// `skipped` or `rejected`. In preview mode `created` counts rows that
/// would be created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub skipped_by_reason: BTreeMap<SkipReason, u64>,
    pub rejected: u64,
    pub rejections: Vec<RejectedRow>,
}

impl ImportSummary {
    fn record_skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        *self.skipped_by_reason.entry(reason).or_insert(0) += 1;
    }

    fn record_rejection(&mut self, line: u64, fields: Vec<&'static str>) {
        self.rejected += 1;
        self.rejections.push(RejectedRow { line, fields });
    }

    /// Rows processed so far
    pub fn rows(&self) -> u64 {
        self.created + self.duplicates + self.skipped + self.rejected
    }

    pub fn skipped_for(&self, reason: SkipReason) -> u64 {
        self.skipped_by_reason.get(&reason).copied().unwrap_or(0)
    }
}

/// A candidate as it would be stored, shown by preview runs
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    pub line: u64,
    pub transaction: NaturalKey,
    /// Already stored, or repeated earlier in the same file
    pub duplicate: bool,
}

/// Result of a completed import
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    /// `None` for previews, which are not recorded
    pub run_id: Option<Uuid>,
    pub file_sha256: String,
    pub summary: ImportSummary,
    pub preview: bool,
    /// Only filled in preview mode
    pub transactions: Vec<PreviewRow>,
}

/// A batch stopped by a fatal error
///
/// Carries the counts up to the failure; rows counted as created are stored.
#[derive(Debug, thiserror::Error)]
#[error("import aborted after {} row(s): {source}", .summary.rows())]
pub struct ImportAborted {
    pub summary: ImportSummary,
    pub run_id: Option<Uuid>,
    #[source]
    pub source: Error,
}

/// Columns found by header auto-detection
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectedColumns {
    pub date: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    pub direction: Option<String>,
    pub currency: Option<String>,
    pub account: Option<String>,
    pub counterparty: Option<String>,
}

impl DetectedColumns {
    /// Overwrite the mappings with every detected column
    pub fn apply_to(&self, mappings: &mut ColumnMappings) {
        if let Some(date) = &self.date {
            mappings.date = date.clone();
        }
        if let Some(description) = &self.description {
            mappings.description = description.clone();
        }
        if let Some(amount) = &self.amount {
            mappings.amount = amount.clone();
        }
        if let Some(direction) = &self.direction {
            mappings.direction = direction.clone();
        }
        if self.currency.is_some() {
            mappings.currency = self.currency.clone();
        }
        if let (Some(account), Some(counterparty)) = (&self.account, &self.counterparty) {
            mappings.parties = PartyColumns::Counterparty {
                account: account.clone(),
                counterparty: counterparty.clone(),
            };
        }
    }
}

enum RowOutcome {
    Stored,
    Duplicate,
}

#[derive(Default)]
struct Batch {
    summary: ImportSummary,
    previews: Vec<PreviewRow>,
    seen: HashSet<NaturalKey>,
}

/// Import service for CSV statements
pub struct ImportService {
    store: Arc<dyn TransactionStore>,
    data_dir: PathBuf,
}

impl ImportService {
    pub fn new(store: Arc<dyn TransactionStore>, data_dir: PathBuf) -> Self {
        Self { store, data_dir }
    }

    /// List saved import profiles
    pub fn list_profiles(&self) -> anyhow::Result<HashMap<String, ImportProfile>> {
        let config = Config::load(&self.data_dir)?;
        Ok(config.import_profiles)
    }

    /// Save (or replace) a named profile in settings.json
    pub fn save_profile(&self, name: &str, profile: &ImportProfile) -> anyhow::Result<()> {
        let mut config = Config::load(&self.data_dir)?;
        config.import_profiles.insert(name.to_string(), profile.clone());
        config.save(&self.data_dir)
    }

    /// Import a CSV file
    pub fn import(
        &self,
        file_path: &Path,
        profile: &ImportProfile,
        options: &ImportOptions,
    ) -> std::result::Result<ImportResult, ImportAborted> {
        let data = std::fs::read(file_path).map_err(|e| ImportAborted {
            summary: ImportSummary::default(),
            run_id: None,
            source: Error::Io(e),
        })?;
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.import_bytes(&data, &file_name, profile, options)
    }

    /// Import CSV content already in memory
    pub fn import_bytes(
        &self,
        data: &[u8],
        file_name: &str,
        profile: &ImportProfile,
        options: &ImportOptions,
    ) -> std::result::Result<ImportResult, ImportAborted> {
        let started_at = Utc::now();
        let file_sha256 = hex::encode(Sha256::digest(data));
        let run_id = Uuid::new_v4();

        let span = tracing::info_span!("import", %run_id, file = file_name, preview = options.preview);
        let _enter = span.enter();

        let mut batch = Batch::default();
        let outcome = self.ingest(data, profile, options, &mut batch);

        let recorded_run_id = (!options.preview).then_some(run_id);
        if !options.preview {
            let run = ImportRun {
                run_id,
                file_name: file_name.to_string(),
                file_sha256: file_sha256.clone(),
                started_at,
                finished_at: Utc::now(),
                created: batch.summary.created,
                duplicates: batch.summary.duplicates,
                skipped: batch.summary.skipped,
                rejected: batch.summary.rejected,
                status: if outcome.is_ok() {
                    ImportStatus::Completed
                } else {
                    ImportStatus::Aborted
                },
            };
            if let Err(e) = self.store.record_import_run(&run) {
                tracing::warn!(error = %e, "could not record import run");
            }
        }

        let summary = &batch.summary;
        match outcome {
            Ok(()) => {
                tracing::info!(
                    created = summary.created,
                    duplicates = summary.duplicates,
                    skipped = summary.skipped,
                    rejected = summary.rejected,
                    "import finished"
                );
                Ok(ImportResult {
                    run_id: recorded_run_id,
                    file_sha256,
                    summary: batch.summary,
                    preview: options.preview,
                    transactions: batch.previews,
                })
            }
            Err(source) => {
                tracing::error!(
                    created = summary.created,
                    rows = summary.rows(),
                    error = %source,
                    "import aborted"
                );
                Err(ImportAborted {
                    summary: batch.summary,
                    run_id: recorded_run_id,
                    source,
                })
            }
        }
    }

    fn ingest(
        &self,
        data: &[u8],
        profile: &ImportProfile,
        options: &ImportOptions,
        batch: &mut Batch,
    ) -> Result<()> {
        let mut reader = csv_reader(data, profile.delimiter)?;
        let headers = read_headers(&mut reader)?;
        check_columns(&headers, &profile.column_mappings)?;

        let normalizer = RecordNormalizer::new(profile);

        for (index, record) in reader.records().enumerate() {
            let fallback_line = index as u64 + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(line = fallback_line, error = %e, "unreadable row");
                    batch.summary.record_skip(SkipReason::MalformedRow);
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);

            let row: RawRow = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();

            let candidate = match normalizer.normalize(&row) {
                Normalized::Candidate(candidate) => candidate,
                Normalized::Skip(reason) => {
                    tracing::debug!(line, reason = %reason, "row skipped");
                    batch.summary.record_skip(reason);
                    continue;
                }
            };

            let outcome = if options.preview {
                self.preview_row(&candidate, line, batch)
            } else {
                self.store.insert(&candidate).map(|outcome| match outcome {
                    InsertOutcome::Created(_) => RowOutcome::Stored,
                    InsertOutcome::AlreadyExists => RowOutcome::Duplicate,
                })
            };

            match outcome {
                Ok(RowOutcome::Stored) => batch.summary.created += 1,
                Ok(RowOutcome::Duplicate) => batch.summary.duplicates += 1,
                Err(Error::Validation { fields }) => {
                    tracing::debug!(line, fields = ?fields, "row rejected");
                    batch.summary.record_rejection(line, fields.clone());
                    if options.on_invalid == InvalidRowPolicy::Abort {
                        return Err(Error::Validation { fields });
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn preview_row(&self, candidate: &NewTransaction, line: u64, batch: &mut Batch) -> Result<RowOutcome> {
        let key = candidate.validate()?;
        let duplicate = !batch.seen.insert(key.clone()) || self.store.contains(&key)?;
        batch.previews.push(PreviewRow {
            line,
            transaction: key,
            duplicate,
        });
        Ok(if duplicate {
            RowOutcome::Duplicate
        } else {
            RowOutcome::Stored
        })
    }

    /// Guess column mappings from a file's header row
    pub fn detect_columns(&self, file_path: &Path, delimiter: char) -> Result<DetectedColumns> {
        let data = std::fs::read(file_path)?;
        let mut reader = csv_reader(&data, delimiter)?;
        let headers = read_headers(&mut reader)?;
        Ok(detect_from_headers(&headers))
    }
}

fn csv_reader(data: &[u8], delimiter: char) -> Result<csv::Reader<&[u8]>> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| Error::config(format!("Delimiter '{}' must be a single ASCII character", delimiter)))?;

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data))
}

fn read_headers(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>> {
    Ok(reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect())
}

fn check_columns(headers: &[String], mappings: &ColumnMappings) -> Result<()> {
    let missing: Vec<&str> = mappings
        .required_columns()
        .into_iter()
        .filter(|column| !headers.iter().any(|h| h == column))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::config(format!(
            "CSV header is missing column(s): {} (found: {})",
            missing.join(", "),
            headers.join(", ")
        )))
    }
}

fn detect_from_headers(headers: &[String]) -> DetectedColumns {
    let find = |patterns: &[&str]| {
        headers
            .iter()
            .find(|h| {
                let lower = h.to_lowercase();
                patterns.iter().any(|p| lower.contains(p))
            })
            .cloned()
    };

    DetectedColumns {
        date: find(&["kuupäev", "kuupaev", "date"]),
        description: find(&["selgitus", "description", "details", "memo"]),
        amount: find(&["summa", "amount"]),
        direction: find(&["deebet/kreedit", "debit/credit", "d/k", "direction"]),
        currency: find(&["valuuta", "currency"]),
        account: find(&["kliendi konto", "account", "konto"]),
        counterparty: find(&["saaja/maksja", "counterparty", "payee", "beneficiary"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_swedbank_headers() {
        let headers: Vec<String> = [
            "Kliendi konto",
            "Reatüüp",
            "Kuupäev",
            "Saaja/Maksja",
            "Selgitus",
            "Summa",
            "Valuuta",
            "Deebet/Kreedit",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let detected = detect_from_headers(&headers);
        assert_eq!(detected.date.as_deref(), Some("Kuupäev"));
        assert_eq!(detected.amount.as_deref(), Some("Summa"));
        assert_eq!(detected.direction.as_deref(), Some("Deebet/Kreedit"));
        assert_eq!(detected.account.as_deref(), Some("Kliendi konto"));
        assert_eq!(detected.counterparty.as_deref(), Some("Saaja/Maksja"));

        let mut mappings = ColumnMappings::default();
        detected.apply_to(&mut mappings);
        assert_eq!(mappings, ColumnMappings::default());
    }

    #[test]
    fn test_detect_english_headers() {
        let headers: Vec<String> = ["Date", "Details", "Amount", "Debit/Credit", "Account", "Payee"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut mappings = ColumnMappings::default();
        detect_from_headers(&headers).apply_to(&mut mappings);

        assert_eq!(mappings.date, "Date");
        assert_eq!(mappings.description, "Details");
        assert_eq!(mappings.direction, "Debit/Credit");
        // No currency column detected, default kept
        assert_eq!(mappings.currency.as_deref(), Some("Valuuta"));
        assert_eq!(
            mappings.parties,
            PartyColumns::Counterparty {
                account: "Account".to_string(),
                counterparty: "Payee".to_string()
            }
        );
    }

    #[test]
    fn test_check_columns_names_missing() {
        let headers = vec!["Kuupäev".to_string(), "Summa".to_string()];
        let err = check_columns(&headers, &ColumnMappings::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Selgitus"));
        assert!(msg.contains("Deebet/Kreedit"));
        assert!(!msg.contains("missing column(s): Kuupäev"));
    }

    #[test]
    fn test_non_ascii_delimiter_is_config_error() {
        assert!(matches!(csv_reader(b"a", '§'), Err(Error::Config(_))));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ImportSummary::default();
        summary.created = 2;
        summary.record_skip(SkipReason::BadDate);
        summary.record_skip(SkipReason::BadDate);
        summary.record_rejection(7, vec!["sender"]);

        assert_eq!(summary.rows(), 5);
        assert_eq!(summary.skipped_for(SkipReason::BadDate), 2);
        assert_eq!(summary.skipped_for(SkipReason::BadAmount), 0);
        assert_eq!(summary.rejections[0].line, 7);
    }
}
