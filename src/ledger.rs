use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::util::now_utc_string;

const LEDGER_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Outline written.
    Completed,
    /// Pipeline ran but found no usable structure.
    Empty,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Empty => "empty",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerRecord<'a> {
    pub path: &'a str,
    pub sha256: &'a str,
    pub status: LedgerStatus,
    pub entry_count: usize,
    pub output_path: Option<&'a str>,
    pub error: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub documents: u64,
    pub completed: u64,
    pub empty: u64,
    pub failed: u64,
    pub total_entries: u64,
    pub last_processed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFailure {
    pub path: String,
    pub error: String,
    pub processed_at: String,
}

/// Per-file results of batch runs, keyed by source path.
pub struct Ledger {
    connection: Connection,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            crate::util::ensure_directory(parent)?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open ledger {}", path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;

        Self::from_connection(connection)
    }

    pub fn from_connection(connection: Connection) -> Result<Self> {
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                  key TEXT PRIMARY KEY,
                  value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS documents (
                  path TEXT PRIMARY KEY,
                  sha256 TEXT NOT NULL,
                  status TEXT NOT NULL,
                  entry_count INTEGER NOT NULL DEFAULT 0,
                  output_path TEXT,
                  processed_at TEXT NOT NULL,
                  error TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
                ",
            )
            .context("failed to create ledger schema")?;

        connection
            .execute(
                "INSERT INTO metadata(key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![LEDGER_SCHEMA_VERSION],
            )
            .context("failed to write ledger schema version")?;

        Ok(Self { connection })
    }

    pub fn record(&self, record: &LedgerRecord<'_>) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO documents(path, sha256, status, entry_count, output_path, processed_at, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(path) DO UPDATE SET
                   sha256 = excluded.sha256,
                   status = excluded.status,
                   entry_count = excluded.entry_count,
                   output_path = excluded.output_path,
                   processed_at = excluded.processed_at,
                   error = excluded.error",
                params![
                    record.path,
                    record.sha256,
                    record.status.as_str(),
                    record.entry_count as i64,
                    record.output_path,
                    now_utc_string(),
                    record.error,
                ],
            )
            .with_context(|| format!("failed to record ledger row for {}", record.path))?;
        Ok(())
    }

    /// True when `path` last completed with exactly this content hash.
    pub fn has_success(&self, path: &str, sha256: &str) -> Result<bool> {
        let status: Option<String> = self
            .connection
            .query_row(
                "SELECT status FROM documents WHERE path = ?1 AND sha256 = ?2",
                params![path, sha256],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query ledger")?;

        Ok(status.as_deref() == Some(LedgerStatus::Completed.as_str()))
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        let summary = self
            .connection
            .query_row(
                "SELECT
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'empty' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(entry_count), 0),
                   MAX(processed_at)
                 FROM documents",
                [],
                |row| {
                    Ok(LedgerSummary {
                        documents: row.get::<_, i64>(0)? as u64,
                        completed: row.get::<_, i64>(1)? as u64,
                        empty: row.get::<_, i64>(2)? as u64,
                        failed: row.get::<_, i64>(3)? as u64,
                        total_entries: row.get::<_, i64>(4)? as u64,
                        last_processed_at: row.get(5)?,
                    })
                },
            )
            .context("failed to summarize ledger")?;
        Ok(summary)
    }

    pub fn failures(&self) -> Result<Vec<LedgerFailure>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT path, COALESCE(error, ''), processed_at
                 FROM documents
                 WHERE status = 'failed'
                 ORDER BY path",
            )
            .context("failed to prepare ledger failure query")?;

        let rows = statement
            .query_map([], |row| {
                Ok(LedgerFailure {
                    path: row.get(0)?,
                    error: row.get(1)?,
                    processed_at: row.get(2)?,
                })
            })
            .context("failed to query ledger failures")?;

        let mut failures = Vec::new();
        for row in rows {
            failures.push(row.context("failed to read ledger failure row")?);
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_ledger() -> Ledger {
        let connection = Connection::open_in_memory().expect("in-memory DB should open");
        Ledger::from_connection(connection).expect("ledger schema should apply")
    }

    fn record<'a>(path: &'a str, sha256: &'a str, status: LedgerStatus) -> LedgerRecord<'a> {
        LedgerRecord {
            path,
            sha256,
            status,
            entry_count: if status == LedgerStatus::Completed { 12 } else { 0 },
            output_path: None,
            error: (status == LedgerStatus::Failed).then_some("oracle unavailable"),
        }
    }

    #[test]
    fn success_requires_matching_hash_and_completed_status() {
        let ledger = memory_ledger();
        ledger
            .record(&record("a.pdf", "hash-a", LedgerStatus::Completed))
            .expect("row should insert");
        ledger
            .record(&record("b.pdf", "hash-b", LedgerStatus::Empty))
            .expect("row should insert");

        assert!(ledger.has_success("a.pdf", "hash-a").expect("query should run"));
        assert!(!ledger.has_success("a.pdf", "hash-changed").expect("query should run"));
        assert!(!ledger.has_success("b.pdf", "hash-b").expect("query should run"));
        assert!(!ledger.has_success("missing.pdf", "hash").expect("query should run"));
    }

    #[test]
    fn record_replaces_previous_row_for_path() {
        let ledger = memory_ledger();
        ledger
            .record(&record("a.pdf", "hash-a", LedgerStatus::Failed))
            .expect("row should insert");
        ledger
            .record(&record("a.pdf", "hash-a", LedgerStatus::Completed))
            .expect("row should update");

        let summary = ledger.summary().expect("summary should load");
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 0);
        assert!(ledger.failures().expect("failures should load").is_empty());
    }

    #[test]
    fn summary_and_failures_reflect_rows() {
        let ledger = memory_ledger();
        assert_eq!(
            ledger.summary().expect("summary should load"),
            LedgerSummary::default()
        );

        ledger
            .record(&record("a.pdf", "hash-a", LedgerStatus::Completed))
            .expect("row should insert");
        ledger
            .record(&record("c.pdf", "hash-c", LedgerStatus::Failed))
            .expect("row should insert");
        ledger
            .record(&record("b.pdf", "hash-b", LedgerStatus::Empty))
            .expect("row should insert");

        let summary = ledger.summary().expect("summary should load");
        assert_eq!(summary.documents, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_entries, 12);
        assert!(summary.last_processed_at.is_some());

        let failures = ledger.failures().expect("failures should load");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "c.pdf");
        assert_eq!(failures[0].error, "oracle unavailable");
    }
}
