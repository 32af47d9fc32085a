//! SQLite-backed run ledger.
//!
//! One connection, one process. There is no internal locking: callers
//! serialize access. Every write is its own committed statement (or a single
//! transaction for multi-row deletes), so a crash between items never loses
//! a record of an issue that already exists in the tracker.

use crate::error::{LedgerError, LedgerResult};
use crate::schema::SCHEMA;
use chrono::{DateTime, SecondsFormat, Utc};
use issuetree_core::{CreatedItemRecord, NewCreatedItem, Run, RunStats, RunStatus};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

const RUN_COLUMNS: &str =
    "run_id, input_file, input_file_hash, repository, started_at, completed_at, status";

const ITEM_COLUMNS: &str = "run_id, local_id, external_number, external_url, external_node_id, \
     title, fingerprint, parent_id, parent_external_number, linked_at, created_at";

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (creating if needed) the ledger file and its schema.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let ledger = Self::init(conn)?;
        info!(path = %path.display(), "ledger opened");
        Ok(ledger)
    }

    /// Throwaway ledger for tests and dry runs.
    pub fn in_memory() -> LedgerResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> LedgerResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ============ Runs ============

    /// Insert a new `in_progress` run. The caller picks a fresh id.
    pub fn create_run(
        &self,
        run_id: &str,
        input_file: &str,
        input_file_hash: &str,
        repository: &str,
    ) -> LedgerResult<Run> {
        let started_at = Utc::now();
        let inserted = self.conn.execute(
            "INSERT INTO runs (run_id, input_file, input_file_hash, repository, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                input_file,
                input_file_hash,
                repository,
                fmt_ts(&started_at),
                RunStatus::InProgress.as_str(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(LedgerError::RunExists(run_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        debug!(run_id, repository, "run created");

        Ok(Run {
            run_id: run_id.to_string(),
            input_file: input_file.to_string(),
            input_file_hash: input_file_hash.to_string(),
            repository: repository.to_string(),
            started_at: parse_ts(&fmt_ts(&started_at)).unwrap_or(started_at),
            completed_at: None,
            status: RunStatus::InProgress,
        })
    }

    pub fn get_run(&self, run_id: &str) -> LedgerResult<Option<Run>> {
        let sql = format!("SELECT {} FROM runs WHERE run_id = ?1", RUN_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![run_id], row_to_run)
            .optional()?)
    }

    /// Most recently started run for this input hash.
    pub fn get_run_by_hash(&self, input_file_hash: &str) -> LedgerResult<Option<Run>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE input_file_hash = ?1
             ORDER BY started_at DESC, rowid DESC LIMIT 1",
            RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![input_file_hash], row_to_run)
            .optional()?)
    }

    /// All runs, newest first.
    pub fn list_runs(&self) -> LedgerResult<Vec<Run>> {
        let sql = format!(
            "SELECT {} FROM runs ORDER BY started_at DESC, rowid DESC",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_run)?;
        let mut runs = Vec::new();
        for run in rows {
            runs.push(run?);
        }
        Ok(runs)
    }

    /// Terminal transition. Only `in_progress` runs move, and only to
    /// `completed` or `failed`.
    pub fn mark_run_complete(&self, run_id: &str, status: RunStatus) -> LedgerResult<()> {
        let run = self
            .get_run(run_id)?
            .ok_or_else(|| LedgerError::RunNotFound(run_id.to_string()))?;
        if run.status != RunStatus::InProgress || !status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.status,
                to: status,
            });
        }
        self.conn.execute(
            "UPDATE runs SET status = ?1, completed_at = ?2
             WHERE run_id = ?3 AND status = 'in_progress'",
            params![status.as_str(), fmt_ts(&Utc::now()), run_id],
        )?;
        info!(run_id, %status, "run finished");
        Ok(())
    }

    /// Put a `failed` run back in progress so it can be resumed explicitly.
    pub fn reopen_run(&self, run_id: &str) -> LedgerResult<()> {
        let run = self
            .get_run(run_id)?
            .ok_or_else(|| LedgerError::RunNotFound(run_id.to_string()))?;
        if run.status != RunStatus::Failed {
            return Err(LedgerError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.status,
                to: RunStatus::InProgress,
            });
        }
        self.conn.execute(
            "UPDATE runs SET status = 'in_progress', completed_at = NULL WHERE run_id = ?1",
            params![run_id],
        )?;
        info!(run_id, "run reopened");
        Ok(())
    }

    /// Remove a run and every record it owns. Irreversible.
    pub fn delete_run(&self, run_id: &str) -> LedgerResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let items = tx.execute(
            "DELETE FROM created_items WHERE run_id = ?1",
            params![run_id],
        )?;
        tx.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        tx.commit()?;
        info!(run_id, items, "run deleted");
        Ok(())
    }

    /// Counts derived from the item rows on every call.
    pub fn get_run_stats(&self, run_id: &str) -> LedgerResult<RunStats> {
        let (total, linked): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(linked_at) FROM created_items WHERE run_id = ?1",
            params![run_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total = total as u64;
        let linked = linked as u64;
        Ok(RunStats {
            total,
            linked,
            unlinked: total - linked,
        })
    }

    // ============ Created items ============

    /// Resume probe: has this local id already been created in this run?
    pub fn get_created_item(
        &self,
        run_id: &str,
        local_id: &str,
    ) -> LedgerResult<Option<CreatedItemRecord>> {
        let sql = format!(
            "SELECT {} FROM created_items WHERE run_id = ?1 AND local_id = ?2",
            ITEM_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![run_id, local_id], row_to_item)
            .optional()?)
    }

    /// Cross-run duplicate probe. Returns the earliest matching record.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> LedgerResult<Option<CreatedItemRecord>> {
        let sql = format!(
            "SELECT {} FROM created_items WHERE fingerprint = ?1
             ORDER BY created_at ASC LIMIT 1",
            ITEM_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![fingerprint], row_to_item)
            .optional()?)
    }

    pub fn record_created_item(&self, item: &NewCreatedItem) -> LedgerResult<CreatedItemRecord> {
        let created_at = Utc::now();
        let inserted = self.conn.execute(
            "INSERT INTO created_items
             (run_id, local_id, external_number, external_url, external_node_id,
              title, fingerprint, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.run_id,
                item.local_id,
                item.external_number as i64,
                item.external_url,
                item.external_node_id,
                item.title,
                item.fingerprint,
                item.parent_id,
                fmt_ts(&created_at),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                return Err(LedgerError::duplicate_item(&item.run_id, &item.local_id));
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                return Err(LedgerError::RunNotFound(item.run_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        debug!(
            run_id = %item.run_id,
            local_id = %item.local_id,
            number = item.external_number,
            "issue recorded"
        );

        self.get_created_item(&item.run_id, &item.local_id)?
            .ok_or_else(|| LedgerError::item_not_found(&item.run_id, &item.local_id))
    }

    /// Mark the sub-issue link as established. Re-applying is harmless; the
    /// first link timestamp is kept.
    pub fn record_link(
        &self,
        run_id: &str,
        local_id: &str,
        parent_external_number: u64,
    ) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE created_items
             SET parent_external_number = ?1, linked_at = COALESCE(linked_at, ?2)
             WHERE run_id = ?3 AND local_id = ?4",
            params![
                parent_external_number as i64,
                fmt_ts(&Utc::now()),
                run_id,
                local_id
            ],
        )?;
        if updated == 0 {
            return Err(LedgerError::item_not_found(run_id, local_id));
        }
        debug!(run_id, local_id, parent = parent_external_number, "link recorded");
        Ok(())
    }

    /// A run's records in creation order.
    pub fn created_items_for_run(&self, run_id: &str) -> LedgerResult<Vec<CreatedItemRecord>> {
        let sql = format!(
            "SELECT {} FROM created_items WHERE run_id = ?1 ORDER BY created_at ASC, rowid ASC",
            ITEM_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![run_id], row_to_item)?;
        let mut items = Vec::new();
        for item in rows {
            items.push(item?);
        }
        Ok(items)
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn ts_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_ts_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    let status: String = row.get(6)?;
    let status = status
        .parse::<RunStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?;
    Ok(Run {
        run_id: row.get(0)?,
        input_file: row.get(1)?,
        input_file_hash: row.get(2)?,
        repository: row.get(3)?,
        started_at: ts_column(row, 4)?,
        completed_at: opt_ts_column(row, 5)?,
        status,
    })
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<CreatedItemRecord> {
    let number: i64 = row.get(2)?;
    let parent_number: Option<i64> = row.get(8)?;
    Ok(CreatedItemRecord {
        run_id: row.get(0)?,
        local_id: row.get(1)?,
        external_number: number as u64,
        external_url: row.get(3)?,
        external_node_id: row.get(4)?,
        title: row.get(5)?,
        fingerprint: row.get(6)?,
        parent_id: row.get(7)?,
        parent_external_number: parent_number.map(|n| n as u64),
        linked_at: opt_ts_column(row, 9)?,
        created_at: ts_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_item(run_id: &str, local_id: &str, number: u64) -> NewCreatedItem {
        NewCreatedItem {
            run_id: run_id.into(),
            local_id: local_id.into(),
            external_number: number,
            external_url: format!("https://github.com/o/r/issues/{}", number),
            external_node_id: format!("I_node{}", number),
            title: format!("Issue {}", local_id),
            fingerprint: format!("fp-{}", local_id),
            parent_id: None,
        }
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = fmt_ts(&Utc::now());
        assert_eq!(a.len(), "2026-01-01T00:00:00.000000Z".len());
        assert!(a.ends_with('Z'));
        assert_eq!(fmt_ts(&parse_ts(&a).unwrap()), a);
    }

    #[test]
    fn create_and_get_run() {
        let ledger = Ledger::in_memory().unwrap();
        let run = ledger.create_run("r1", "issues.json", "hash1", "o/r").unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        let fetched = ledger.get_run("r1").unwrap().unwrap();
        assert_eq!(fetched, run);
        assert!(ledger.get_run("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_run_id_is_distinct_error() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.create_run("r1", "a.json", "h", "o/r").unwrap();
        let err = ledger.create_run("r1", "a.json", "h", "o/r").unwrap_err();
        assert!(matches!(err, LedgerError::RunExists(id) if id == "r1"));
    }

    #[test]
    fn duplicate_item_is_distinct_error() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.create_run("r1", "a.json", "h", "o/r").unwrap();
        ledger.record_created_item(&new_item("r1", "A", 1)).unwrap();
        let err = ledger.record_created_item(&new_item("r1", "A", 2)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateItem { .. }));
    }

    #[test]
    fn item_for_unknown_run_rejected() {
        let ledger = Ledger::in_memory().unwrap();
        let err = ledger.record_created_item(&new_item("ghost", "A", 1)).unwrap_err();
        assert!(matches!(err, LedgerError::RunNotFound(_)));
    }

    #[test]
    fn record_link_is_idempotent() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.create_run("r1", "a.json", "h", "o/r").unwrap();
        ledger.record_created_item(&new_item("r1", "B", 2)).unwrap();

        ledger.record_link("r1", "B", 1).unwrap();
        let first = ledger.get_created_item("r1", "B").unwrap().unwrap();
        ledger.record_link("r1", "B", 1).unwrap();
        let second = ledger.get_created_item("r1", "B").unwrap().unwrap();

        assert_eq!(first.parent_external_number, Some(1));
        assert_eq!(first.linked_at, second.linked_at);
        assert_eq!(ledger.get_run_stats("r1").unwrap().linked, 1);
    }

    #[test]
    fn record_link_on_missing_item_fails() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.create_run("r1", "a.json", "h", "o/r").unwrap();
        assert!(matches!(
            ledger.record_link("r1", "nope", 1),
            Err(LedgerError::ItemNotFound { .. })
        ));
    }
}
