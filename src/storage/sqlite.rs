//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Several processes may share one database file; every multi-statement
//! mutation runs inside an immediate transaction so counter increments and
//! status derivation observe each other's writes.

use crate::cep::CepRange;
use crate::config::DatabaseConfig;
use crate::resolver::Address;
use crate::state::{CrawlStatus, ResultStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    format_timestamp, now_timestamp, CachedAddress, CrawlRecord, CrawlResultRecord,
    NewCrawlResult, RecordOutcome, ResultFilter, WorkerRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Maximum number of postal codes bound into a single `IN (...)` lookup
const CACHE_LOOKUP_CHUNK: usize = 500;

const CRAWL_COLUMNS: &str = "id, range_start, range_end, total_units, processed_units,
     success_units, failed_units, status, last_recovery_at, created_at, updated_at";

const CACHE_COLUMNS: &str = "postal_code, found, street, complement, neighborhood, city,
     state, ibge, gia, ddd, siafi";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - How long to wait on locks held by other processes
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Storage handle shared by the orchestrator, worker tasks and the sweeper
///
/// The lock is only ever held for the duration of one synchronous storage
/// call, never across an await point.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<SqliteStorage>>,
}

impl SharedStorage {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Opens the crawl store described by the configuration
    pub fn open(config: &DatabaseConfig) -> StorageResult<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let storage = SqliteStorage::new(Path::new(&config.path), busy_timeout)?;
        Ok(Self::new(storage))
    }

    /// Runs `f` with exclusive access to the underlying storage
    pub fn with<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    {
        let mut guard = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut guard)
    }
}

fn crawl_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRecord> {
    Ok(CrawlRecord {
        id: row.get(0)?,
        range_start: row.get(1)?,
        range_end: row.get(2)?,
        total_units: row.get(3)?,
        processed_units: row.get(4)?,
        success_units: row.get(5)?,
        failed_units: row.get(6)?,
        status: CrawlStatus::from_db_string(&row.get::<_, String>(7)?)
            .unwrap_or(CrawlStatus::Failed),
        last_recovery_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlResultRecord> {
    let payload: Option<String> = row.get(4)?;
    let payload = payload
        .map(|json| serde_json::from_str::<Address>(&json))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(CrawlResultRecord {
        id: row.get(0)?,
        crawl_id: row.get(1)?,
        postal_code: row.get(2)?,
        status: ResultStatus::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(ResultStatus::Error),
        payload,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn cached_from_row(row: &Row<'_>) -> rusqlite::Result<CachedAddress> {
    let found: bool = row.get(1)?;
    let address = if found {
        Some(Address {
            street: row.get(2)?,
            complement: row.get(3)?,
            neighborhood: row.get(4)?,
            city: row.get(5)?,
            state: row.get(6)?,
            ibge: row.get(7)?,
            gia: row.get(8)?,
            ddd: row.get(9)?,
            siafi: row.get(10)?,
        })
    } else {
        None
    };

    Ok(CachedAddress {
        postal_code: row.get(0)?,
        found,
        address,
    })
}

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<WorkerRecord> {
    Ok(WorkerRecord {
        id: row.get(0)?,
        hostname: row.get(1)?,
        role: row.get(2)?,
        config_hash: row.get(3)?,
        last_seen: row.get(4)?,
    })
}

fn read_crawl(conn: &Connection, crawl_id: &str) -> StorageResult<Option<CrawlRecord>> {
    let sql = format!("SELECT {} FROM crawls WHERE id = ?1", CRAWL_COLUMNS);
    let crawl = conn
        .query_row(&sql, params![crawl_id], crawl_from_row)
        .optional()?;
    Ok(crawl)
}

/// Escapes `%`, `_` and `\` so a user term matches literally inside LIKE
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Builds the WHERE clause and bound values for a results filter
fn filter_clause(crawl_id: &str, filter: &ResultFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("crawl_id = ?");
    let mut values = vec![Value::Text(crawl_id.to_string())];

    if let Some(start) = &filter.postal_start {
        clause.push_str(" AND postal_code >= ?");
        values.push(Value::Text(start.clone()));
    }
    if let Some(end) = &filter.postal_end {
        clause.push_str(" AND postal_code <= ?");
        values.push(Value::Text(end.clone()));
    }
    if let Some(status) = filter.status {
        clause.push_str(" AND status = ?");
        values.push(Value::Text(status.to_db_string().to_string()));
    }

    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let code_term: String = term.chars().filter(|c| !matches!(c, '-' | '.' | ' ')).collect();
        let mut alternatives = Vec::new();

        if !code_term.is_empty() {
            alternatives.push("postal_code LIKE ? ESCAPE '\\'".to_string());
            values.push(Value::Text(format!("%{}%", escape_like(&code_term))));
        }
        if !filter.matching_codes.is_empty() {
            alternatives.push(format!(
                "postal_code IN ({})",
                placeholders(filter.matching_codes.len())
            ));
            values.extend(filter.matching_codes.iter().cloned().map(Value::Text));
        }

        if alternatives.is_empty() {
            clause.push_str(" AND 0");
        } else {
            clause.push_str(&format!(" AND ({})", alternatives.join(" OR ")));
        }
    }

    (clause, values)
}

impl Storage for SqliteStorage {
    // ===== Crawl Management =====

    fn create_crawl(&mut self, range: &CepRange) -> StorageResult<CrawlRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        self.conn.execute(
            "INSERT INTO crawls (id, range_start, range_end, total_units, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                range.start(),
                range.end(),
                range.total_units(),
                CrawlStatus::Pending.to_db_string(),
                now
            ],
        )?;

        read_crawl(&self.conn, &id)?.ok_or(StorageError::CrawlNotFound(id))
    }

    fn get_crawl(&self, crawl_id: &str) -> StorageResult<Option<CrawlRecord>> {
        read_crawl(&self.conn, crawl_id)
    }

    fn list_unfinished_crawls(&self) -> StorageResult<Vec<CrawlRecord>> {
        let sql = format!(
            "SELECT {} FROM crawls WHERE status IN (?1, ?2) ORDER BY created_at, id",
            CRAWL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let crawls = stmt
            .query_map(
                params![
                    CrawlStatus::Pending.to_db_string(),
                    CrawlStatus::Running.to_db_string()
                ],
                crawl_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(crawls)
    }

    fn mark_crawl_failed(&mut self, crawl_id: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE crawls SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![CrawlStatus::Failed.to_db_string(), now_timestamp(), crawl_id],
        )?;
        if changed == 0 {
            return Err(StorageError::CrawlNotFound(crawl_id.to_string()));
        }
        Ok(())
    }

    fn refresh_crawl_status(&mut self, crawl_id: &str) -> StorageResult<CrawlRecord> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE crawls SET
                status = CASE
                    WHEN status = 'FAILED' THEN status
                    WHEN processed_units >= total_units THEN 'FINISHED'
                    WHEN processed_units > 0 THEN 'RUNNING'
                    ELSE 'PENDING'
                END,
                updated_at = ?1
             WHERE id = ?2",
            params![now_timestamp(), crawl_id],
        )?;
        if changed == 0 {
            return Err(StorageError::CrawlNotFound(crawl_id.to_string()));
        }

        let crawl = read_crawl(&tx, crawl_id)?
            .ok_or_else(|| StorageError::CrawlNotFound(crawl_id.to_string()))?;
        tx.commit()?;

        Ok(crawl)
    }

    fn try_stamp_recovery(
        &mut self,
        crawl_id: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> StorageResult<bool> {
        let cooldown = chrono::Duration::from_std(cooldown)
            .map_err(|e| StorageError::ConstraintViolation(e.to_string()))?;
        let cutoff = format_timestamp(now - cooldown);

        let changed = self.conn.execute(
            "UPDATE crawls SET last_recovery_at = ?1
             WHERE id = ?2 AND (last_recovery_at IS NULL OR last_recovery_at <= ?3)",
            params![format_timestamp(now), crawl_id, cutoff],
        )?;

        Ok(changed == 1)
    }

    // ===== Results =====

    fn record_results(
        &mut self,
        crawl_id: &str,
        results: &[NewCrawlResult],
    ) -> StorageResult<RecordOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let crawl = read_crawl(&tx, crawl_id)?
            .ok_or_else(|| StorageError::CrawlNotFound(crawl_id.to_string()))?;
        let range = CepRange::parse(&crawl.range_start, &crawl.range_end)
            .map_err(|e| StorageError::ConstraintViolation(e.to_string()))?;

        let now = now_timestamp();
        let mut success = 0u32;
        let mut failed = 0u32;
        let mut duplicates = 0u32;

        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO crawl_results
                 (crawl_id, postal_code, status, payload, error_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for result in results {
                if !range.contains(&result.postal_code) {
                    return Err(StorageError::ConstraintViolation(format!(
                        "postal code {} is outside crawl {} range {}-{}",
                        result.postal_code, crawl_id, crawl.range_start, crawl.range_end
                    )));
                }

                let payload = result
                    .payload
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;

                let inserted = insert.execute(params![
                    crawl_id,
                    result.postal_code,
                    result.status.to_db_string(),
                    payload,
                    result.error_message,
                    now
                ])?;

                match (inserted, result.status) {
                    (0, _) => duplicates += 1,
                    (_, ResultStatus::Success) => success += 1,
                    (_, ResultStatus::Error) => failed += 1,
                }
            }
        }

        let inserted = success + failed;
        if inserted > 0 {
            // Every right-hand side sees the pre-update row, so the CASE
            // compares the freshly incremented count against the total.
            tx.execute(
                "UPDATE crawls SET
                    processed_units = processed_units + ?1,
                    success_units = success_units + ?2,
                    failed_units = failed_units + ?3,
                    status = CASE
                        WHEN status = 'FAILED' THEN status
                        WHEN processed_units + ?1 >= total_units THEN 'FINISHED'
                        ELSE 'RUNNING'
                    END,
                    updated_at = ?4
                 WHERE id = ?5",
                params![inserted, success, failed, now, crawl_id],
            )?;
        }

        let crawl = read_crawl(&tx, crawl_id)?
            .ok_or_else(|| StorageError::CrawlNotFound(crawl_id.to_string()))?;
        tx.commit()?;

        Ok(RecordOutcome {
            inserted,
            duplicates,
            crawl,
        })
    }

    fn has_result(&self, crawl_id: &str, postal_code: &str) -> StorageResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM crawl_results WHERE crawl_id = ?1 AND postal_code = ?2",
                params![crawl_id, postal_code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn processed_postal_codes(&self, crawl_id: &str) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT postal_code FROM crawl_results WHERE crawl_id = ?1")?;

        let codes = stmt
            .query_map(params![crawl_id], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(codes)
    }

    fn find_results(
        &self,
        crawl_id: &str,
        filter: &ResultFilter,
        offset: u64,
        limit: u64,
    ) -> StorageResult<Vec<CrawlResultRecord>> {
        let (clause, mut values) = filter_clause(crawl_id, filter);
        let sql = format!(
            "SELECT id, crawl_id, postal_code, status, payload, error_message, created_at
             FROM crawl_results WHERE {} ORDER BY created_at, id LIMIT ? OFFSET ?",
            clause
        );
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let results = stmt
            .query_map(params_from_iter(values.iter()), result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(results)
    }

    fn count_results(&self, crawl_id: &str, filter: &ResultFilter) -> StorageResult<u64> {
        let (clause, values) = filter_clause(crawl_id, filter);
        let sql = format!("SELECT COUNT(*) FROM crawl_results WHERE {}", clause);

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Address Cache =====

    fn find_cached(&self, postal_codes: &[String]) -> StorageResult<Vec<CachedAddress>> {
        let mut entries = Vec::new();

        for chunk in postal_codes.chunks(CACHE_LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT {} FROM address_cache WHERE postal_code IN ({})",
                CACHE_COLUMNS,
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), cached_from_row)?;
            for row in rows {
                entries.push(row?);
            }
        }

        Ok(entries)
    }

    fn get_cached(&self, postal_code: &str) -> StorageResult<Option<CachedAddress>> {
        let sql = format!(
            "SELECT {} FROM address_cache WHERE postal_code = ?1",
            CACHE_COLUMNS
        );
        let entry = self
            .conn
            .query_row(&sql, params![postal_code], cached_from_row)
            .optional()?;
        Ok(entry)
    }

    fn upsert_cached(&mut self, entry: &CachedAddress) -> StorageResult<()> {
        let empty = Address::default();
        let address = entry.address.as_ref().filter(|_| entry.found).unwrap_or(&empty);
        let now = now_timestamp();

        self.conn.execute(
            "INSERT INTO address_cache
             (postal_code, found, street, complement, neighborhood, city, state,
              ibge, gia, ddd, siafi, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(postal_code) DO UPDATE SET
                found = excluded.found,
                street = excluded.street,
                complement = excluded.complement,
                neighborhood = excluded.neighborhood,
                city = excluded.city,
                state = excluded.state,
                ibge = excluded.ibge,
                gia = excluded.gia,
                ddd = excluded.ddd,
                siafi = excluded.siafi,
                updated_at = excluded.updated_at",
            params![
                entry.postal_code,
                entry.found,
                address.street,
                address.complement,
                address.neighborhood,
                address.city,
                address.state,
                address.ibge,
                address.gia,
                address.ddd,
                address.siafi,
                now
            ],
        )?;

        Ok(())
    }

    fn search_cached(&self, term: &str) -> StorageResult<Vec<String>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", escape_like(term));
        let mut stmt = self.conn.prepare(
            "SELECT postal_code FROM address_cache
             WHERE found = 1 AND (
                street LIKE ?1 ESCAPE '\\'
                OR complement LIKE ?1 ESCAPE '\\'
                OR neighborhood LIKE ?1 ESCAPE '\\'
                OR city LIKE ?1 ESCAPE '\\'
                OR state LIKE ?1 ESCAPE '\\'
             )
             ORDER BY postal_code",
        )?;

        let codes = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(codes)
    }

    // ===== Worker Registry =====

    fn upsert_worker(&mut self, worker: &WorkerRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO workers (id, hostname, role, config_hash, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                hostname = excluded.hostname,
                role = excluded.role,
                config_hash = excluded.config_hash,
                last_seen = excluded.last_seen",
            params![
                worker.id,
                worker.hostname,
                worker.role,
                worker.config_hash,
                worker.last_seen
            ],
        )?;
        Ok(())
    }

    fn list_active_workers(&self, since: DateTime<Utc>) -> StorageResult<Vec<WorkerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, hostname, role, config_hash, last_seen FROM workers
             WHERE last_seen >= ?1 ORDER BY hostname, id",
        )?;

        let workers = stmt
            .query_map(params![format_timestamp(since)], worker_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(workers)
    }

    fn prune_workers(&mut self, before: DateTime<Utc>) -> StorageResult<u64> {
        let removed = self.conn.execute(
            "DELETE FROM workers WHERE last_seen < ?1",
            params![format_timestamp(before)],
        )?;
        Ok(removed as u64)
    }
}
