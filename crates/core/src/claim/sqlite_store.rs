//! SQLite-backed claim store implementation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection};

use super::{
    Claim, ClaimStatus, ClaimStore, DiscoveryOptions, DownloadOutcome, FileRef, OutcomeStatus,
    RecentOutcome, StoreError, StoreStatistics,
};

const FAILURE_STATUSES: &str = "('validation_failed', 'transient_failed', 'fatal_failed')";

/// SQLite-backed claim store.
pub struct SqliteClaimStore {
    conn: Mutex<Connection>,
}

impl SqliteClaimStore {
    /// Open (or create) the database at the given path.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS claim_files (
                file_id TEXT PRIMARY KEY,
                claim_id TEXT NOT NULL,
                claim_no TEXT NOT NULL,
                remote_name TEXT NOT NULL,
                create_date TEXT NOT NULL,
                report_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                size_bytes INTEGER,
                local_path TEXT,
                checksum TEXT,
                error TEXT,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_claim_files_claim ON claim_files(claim_id);
            CREATE INDEX IF NOT EXISTS idx_claim_files_status ON claim_files(status);
            CREATE INDEX IF NOT EXISTS idx_claim_files_finished ON claim_files(finished_at);

            CREATE TABLE IF NOT EXISTS claims (
                claim_id TEXT PRIMARY KEY,
                claim_no TEXT NOT NULL,
                report_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                updated_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_claims_report_date ON claims(report_date);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn row_to_file_ref(row: &rusqlite::Row) -> rusqlite::Result<(FileRef, NaiveDate)> {
        let file_id: String = row.get(0)?;
        let claim_id: String = row.get(1)?;
        let claim_no: String = row.get(2)?;
        let remote_name: String = row.get(3)?;
        let create_date_str: String = row.get(4)?;
        let report_date_str: String = row.get(5)?;

        let create_date = parse_date(&create_date_str);
        let report_date = parse_date(&report_date_str);

        Ok((
            FileRef {
                file_id,
                claim_id,
                claim_no,
                remote_name,
                create_date,
            },
            report_date,
        ))
    }

    /// Recompute and persist the rollup status for one claim. Must run inside
    /// the caller's transaction.
    fn update_claim_rollup(tx: &rusqlite::Transaction, claim_id: &str) -> Result<(), StoreError> {
        let (total, succeeded, pending): (i64, i64, i64) = tx
            .query_row(
                "SELECT COUNT(*),
                        SUM(CASE WHEN status = 'succeeded' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END)
                 FROM claim_files WHERE claim_id = ?",
                params![claim_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    ))
                },
            )
            .map_err(db_err)?;

        let status = if total == 0 || pending == total {
            ClaimStatus::Pending
        } else if succeeded == total {
            ClaimStatus::Succeeded
        } else if succeeded > 0 {
            ClaimStatus::PartiallySucceeded
        } else if pending > 0 {
            ClaimStatus::Pending
        } else {
            ClaimStatus::Failed
        };

        tx.execute(
            "UPDATE claims SET status = ?, updated_at = ? WHERE claim_id = ?",
            params![status.as_str(), Utc::now().to_rfc3339(), claim_id],
        )
        .map_err(db_err)?;

        Ok(())
    }
}

impl ClaimStore for SqliteClaimStore {
    fn insert_files(&self, claim: &Claim) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT OR IGNORE INTO claims (claim_id, claim_no, report_date, status, updated_at)
             VALUES (?, ?, ?, 'pending', ?)",
            params![
                claim.claim_id,
                claim.claim_no,
                claim.report_date.format("%Y-%m-%d").to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        for file in &claim.files {
            tx.execute(
                "INSERT OR IGNORE INTO claim_files
                     (file_id, claim_id, claim_no, remote_name, create_date, report_date)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    file.file_id,
                    file.claim_id,
                    file.claim_no,
                    file.remote_name,
                    file.create_date.format("%Y-%m-%d").to_string(),
                    claim.report_date.format("%Y-%m-%d").to_string(),
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    fn list_pending_claims(&self, opts: &DiscoveryOptions) -> Result<Vec<Claim>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let status_filter = if opts.retry_failed {
            format!("status = 'pending' OR status IN {}", FAILURE_STATUSES)
        } else {
            "status = 'pending'".to_string()
        };

        let sql = format!(
            "SELECT file_id, claim_id, claim_no, remote_name, create_date, report_date
             FROM claim_files
             WHERE {}
             ORDER BY report_date ASC, claim_id ASC, create_date ASC, file_id ASC",
            status_filter
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], Self::row_to_file_ref)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        // Group rows into claims without disturbing discovery order.
        let mut claims: Vec<Claim> = Vec::new();
        for (file, report_date) in rows {
            match claims.last_mut() {
                Some(claim) if claim.claim_id == file.claim_id => claim.files.push(file),
                _ => {
                    if opts.limit > 0 && claims.len() >= opts.limit {
                        break;
                    }
                    claims.push(Claim {
                        claim_id: file.claim_id.clone(),
                        claim_no: file.claim_no.clone(),
                        report_date,
                        files: vec![file],
                    });
                }
            }
        }

        Ok(claims)
    }

    fn commit_outcomes(&self, batch: &[DownloadOutcome]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::CommitFailed(e.to_string()))?;

        let mut touched_claims: BTreeSet<String> = BTreeSet::new();

        for outcome in batch {
            // Succeeded is terminal: never overwritten by a later outcome.
            tx.execute(
                "UPDATE claim_files
                 SET status = ?, attempts = ?, size_bytes = ?, local_path = ?,
                     checksum = ?, error = ?, finished_at = ?
                 WHERE file_id = ? AND status != 'succeeded'",
                params![
                    outcome.status.as_str(),
                    outcome.attempts,
                    outcome.size_bytes.map(|b| b as i64),
                    outcome
                        .local_path
                        .as_ref()
                        .map(|p| p.display().to_string()),
                    outcome.checksum,
                    outcome.error.as_deref().map(truncate_error),
                    outcome.finished_at.to_rfc3339(),
                    outcome.file.file_id,
                ],
            )
            .map_err(|e| StoreError::CommitFailed(e.to_string()))?;

            touched_claims.insert(outcome.file.claim_id.clone());
        }

        for claim_id in &touched_claims {
            Self::update_claim_rollup(&tx, claim_id)?;
        }

        tx.commit()
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    fn delete_failures_older_than(&self, retention_days: u32) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Utc::now() - Duration::days(retention_days as i64);

        let sql = format!(
            "DELETE FROM claim_files
             WHERE status IN {} AND finished_at IS NOT NULL AND finished_at < ?",
            FAILURE_STATUSES
        );
        let deleted = conn
            .execute(&sql, params![cutoff.to_rfc3339()])
            .map_err(db_err)?;

        Ok(deleted as u64)
    }

    fn query_statistics(&self, window_hours: u32) -> Result<StoreStatistics, StoreError> {
        let conn = self.conn.lock().unwrap();

        // Pending rows have no finished_at; the window only narrows attempted
        // rows.
        let window_filter = if window_hours > 0 {
            let cutoff = Utc::now() - Duration::hours(window_hours as i64);
            format!(
                "AND (status = 'pending' OR finished_at >= '{}')",
                cutoff.to_rfc3339()
            )
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT status, COUNT(*), SUM(CASE WHEN size_bytes IS NULL THEN 0 ELSE size_bytes END)
             FROM claim_files
             WHERE 1 = 1 {}
             GROUP BY status",
            window_filter
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let mut stats = StoreStatistics::default();
        for (status, count, bytes) in rows {
            let count = count as u64;
            stats.total_files += count;
            match status.as_str() {
                "succeeded" => {
                    stats.succeeded = count;
                    stats.bytes_stored = bytes as u64;
                }
                "validation_failed" => stats.validation_failed = count,
                "transient_failed" => stats.transient_failed = count,
                "fatal_failed" => stats.fatal_failed = count,
                "pending" => stats.pending = count,
                _ => {}
            }
        }

        Ok(stats)
    }

    fn recent_outcomes(
        &self,
        window_hours: u32,
        limit: usize,
    ) -> Result<Vec<RecentOutcome>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let cutoff = Utc::now() - Duration::hours(window_hours as i64);

        let mut stmt = conn
            .prepare(
                "SELECT claim_no, file_id, remote_name, status, attempts, error, finished_at
                 FROM claim_files
                 WHERE finished_at IS NOT NULL AND finished_at >= ?
                 ORDER BY finished_at DESC
                 LIMIT ?",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![cutoff.to_rfc3339(), limit as i64], |row| {
                let status_str: String = row.get(3)?;
                let finished_at_str: String = row.get(6)?;
                Ok(RecentOutcome {
                    claim_no: row.get(0)?,
                    file_id: row.get(1)?,
                    remote_name: row.get(2)?,
                    status: OutcomeStatus::from_str(&status_str)
                        .unwrap_or(OutcomeStatus::FatalFailed),
                    attempts: row.get(4)?,
                    error: row.get(5)?,
                    finished_at: DateTime::parse_from_rfc3339(&finished_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(rows)
    }

    fn reset_failed_for_retry(&self, max_attempts: u32) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let sql = format!(
            "UPDATE claim_files
             SET status = 'pending', attempts = 0, error = NULL, finished_at = NULL
             WHERE status IN {} AND attempts < ?",
            FAILURE_STATUSES
        );
        let reset = tx.execute(&sql, params![max_attempts]).map_err(db_err)?;

        // Re-derive rollups for every claim that got files back to pending.
        let claim_ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT DISTINCT claim_id FROM claim_files WHERE status = 'pending'")
                .map_err(db_err)?;
            let ids = stmt
                .query_map([], |row| row.get(0))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            ids
        };
        for claim_id in &claim_ids {
            Self::update_claim_rollup(&tx, claim_id)?;
        }

        tx.commit().map_err(db_err)?;
        Ok(reset as u64)
    }

    fn get_file(&self, file_id: &str) -> Result<Option<FileRef>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT file_id, claim_id, claim_no, remote_name, create_date, report_date
             FROM claim_files WHERE file_id = ?",
            params![file_id],
            Self::row_to_file_ref,
        );

        match result {
            Ok((file, _)) => Ok(Some(file)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

/// The upstream error column is bounded; long reqwest chains get clipped.
fn truncate_error(error: &str) -> String {
    const MAX: usize = 2000;
    if error.len() > MAX {
        error.chars().take(MAX).collect()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn claim(claim_id: &str, report: NaiveDate, file_ids: &[&str]) -> Claim {
        Claim {
            claim_id: claim_id.to_string(),
            claim_no: format!("NO-{}", claim_id),
            report_date: report,
            files: file_ids
                .iter()
                .map(|id| FileRef {
                    file_id: id.to_string(),
                    claim_id: claim_id.to_string(),
                    claim_no: format!("NO-{}", claim_id),
                    remote_name: format!("{}.pdf", id),
                    create_date: report,
                })
                .collect(),
        }
    }

    fn success(file: FileRef) -> DownloadOutcome {
        DownloadOutcome {
            file,
            attempts: 1,
            status: OutcomeStatus::Succeeded,
            size_bytes: Some(2048),
            local_path: Some("/tmp/x.pdf".into()),
            checksum: Some("abc".to_string()),
            error: None,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_discover() {
        let store = SqliteClaimStore::in_memory().unwrap();
        store
            .insert_files(&claim("C2", date(2024, 2, 1), &["F3"]))
            .unwrap();
        store
            .insert_files(&claim("C1", date(2024, 1, 1), &["F1", "F2"]))
            .unwrap();

        let pending = store
            .list_pending_claims(&DiscoveryOptions::default())
            .unwrap();
        assert_eq!(pending.len(), 2);
        // Ordered by report date ascending.
        assert_eq!(pending[0].claim_id, "C1");
        assert_eq!(pending[0].files.len(), 2);
        assert_eq!(pending[1].claim_id, "C2");
    }

    #[test]
    fn test_succeeded_files_excluded_from_discovery() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1", "F2"]);
        store.insert_files(&c).unwrap();

        store
            .commit_outcomes(&[success(c.files[0].clone())])
            .unwrap();

        let pending = store
            .list_pending_claims(&DiscoveryOptions::default())
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].files.len(), 1);
        assert_eq!(pending[0].files[0].file_id, "F2");

        // Fully-succeeded claim disappears from discovery.
        store
            .commit_outcomes(&[success(c.files[1].clone())])
            .unwrap();
        let pending = store
            .list_pending_claims(&DiscoveryOptions::default())
            .unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_failed_files_rediscovered_only_when_retry_enabled() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1"]);
        store.insert_files(&c).unwrap();

        store
            .commit_outcomes(&[DownloadOutcome::failure(
                c.files[0].clone(),
                3,
                OutcomeStatus::TransientFailed,
                "timeout",
            )])
            .unwrap();

        let with_retry = store
            .list_pending_claims(&DiscoveryOptions::default())
            .unwrap();
        assert_eq!(with_retry.len(), 1);

        let without_retry = store
            .list_pending_claims(&DiscoveryOptions {
                retry_failed: false,
                limit: 0,
            })
            .unwrap();
        assert!(without_retry.is_empty());
    }

    #[test]
    fn test_succeeded_status_is_monotonic() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1"]);
        store.insert_files(&c).unwrap();

        store
            .commit_outcomes(&[success(c.files[0].clone())])
            .unwrap();
        // A later failure outcome for the same file must not clobber it.
        store
            .commit_outcomes(&[DownloadOutcome::failure(
                c.files[0].clone(),
                1,
                OutcomeStatus::FatalFailed,
                "late duplicate",
            )])
            .unwrap();

        let stats = store.query_statistics(0).unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.fatal_failed, 0);
    }

    #[test]
    fn test_claim_rollup_states() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1", "F2"]);
        store.insert_files(&c).unwrap();

        // One success, one failure -> partially succeeded, still discoverable.
        store
            .commit_outcomes(&[
                success(c.files[0].clone()),
                DownloadOutcome::failure(
                    c.files[1].clone(),
                    3,
                    OutcomeStatus::TransientFailed,
                    "boom",
                ),
            ])
            .unwrap();

        let conn = store.conn.lock().unwrap();
        let status: String = conn
            .query_row(
                "SELECT status FROM claims WHERE claim_id = 'C1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "partially_succeeded");
    }

    #[test]
    fn test_statistics_counts() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1", "F2", "F3"]);
        store.insert_files(&c).unwrap();

        store
            .commit_outcomes(&[
                success(c.files[0].clone()),
                DownloadOutcome::failure(
                    c.files[1].clone(),
                    1,
                    OutcomeStatus::ValidationFailed,
                    "too small",
                ),
            ])
            .unwrap();

        let stats = store.query_statistics(0).unwrap();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.validation_failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.bytes_stored, 2048);
    }

    #[test]
    fn test_cleanup_only_removes_old_failures() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1", "F2"]);
        store.insert_files(&c).unwrap();

        let old = DownloadOutcome {
            finished_at: Utc::now() - Duration::days(60),
            ..DownloadOutcome::failure(
                c.files[0].clone(),
                3,
                OutcomeStatus::TransientFailed,
                "old failure",
            )
        };
        let fresh = DownloadOutcome::failure(
            c.files[1].clone(),
            3,
            OutcomeStatus::TransientFailed,
            "fresh failure",
        );
        store.commit_outcomes(&[old, fresh]).unwrap();

        let deleted = store.delete_failures_older_than(30).unwrap();
        assert_eq!(deleted, 1);

        let stats = store.query_statistics(0).unwrap();
        assert_eq!(stats.total_files, 1);
    }

    #[test]
    fn test_reset_failed_for_retry() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1", "F2"]);
        store.insert_files(&c).unwrap();

        store
            .commit_outcomes(&[
                DownloadOutcome::failure(c.files[0].clone(), 2, OutcomeStatus::TransientFailed, "x"),
                DownloadOutcome::failure(c.files[1].clone(), 5, OutcomeStatus::TransientFailed, "y"),
            ])
            .unwrap();

        // Only the file under the attempt ceiling is reset.
        let reset = store.reset_failed_for_retry(3).unwrap();
        assert_eq!(reset, 1);

        let stats = store.query_statistics(0).unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.transient_failed, 1);
    }

    #[test]
    fn test_recent_outcomes_ordering() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1", "F2"]);
        store.insert_files(&c).unwrap();

        let earlier = DownloadOutcome {
            finished_at: Utc::now() - Duration::hours(2),
            ..success(c.files[0].clone())
        };
        let later = success(c.files[1].clone());
        store.commit_outcomes(&[earlier, later]).unwrap();

        let recent = store.recent_outcomes(24, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].file_id, "F2");
        assert_eq!(recent[1].file_id, "F1");
    }

    #[test]
    fn test_get_file() {
        let store = SqliteClaimStore::in_memory().unwrap();
        let c = claim("C1", date(2024, 1, 1), &["F1"]);
        store.insert_files(&c).unwrap();

        let found = store.get_file("F1").unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().claim_id, "C1");
        assert!(store.get_file("missing").unwrap().is_none());
    }
}
