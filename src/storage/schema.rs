//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per bulk request
CREATE TABLE IF NOT EXISTS crawls (
    id TEXT PRIMARY KEY,
    range_start TEXT NOT NULL,
    range_end TEXT NOT NULL,
    total_units INTEGER NOT NULL,
    processed_units INTEGER NOT NULL DEFAULT 0,
    success_units INTEGER NOT NULL DEFAULT 0,
    failed_units INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    last_recovery_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (processed_units = success_units + failed_units),
    CHECK (processed_units <= total_units)
);

CREATE INDEX IF NOT EXISTS idx_crawls_status ON crawls(status);

-- One row per resolved (or failed) postal code of a crawl
CREATE TABLE IF NOT EXISTS crawl_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id TEXT NOT NULL REFERENCES crawls(id),
    postal_code TEXT NOT NULL,
    status TEXT NOT NULL,
    payload TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(crawl_id, postal_code)
);

CREATE INDEX IF NOT EXISTS idx_crawl_results_crawl ON crawl_results(crawl_id, created_at);

-- Resolved and confirmed-absent postal codes
CREATE TABLE IF NOT EXISTS address_cache (
    postal_code TEXT PRIMARY KEY,
    found INTEGER NOT NULL,
    street TEXT,
    complement TEXT,
    neighborhood TEXT,
    city TEXT,
    state TEXT,
    ibge TEXT,
    gia TEXT,
    ddd TEXT,
    siafi TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Liveness of API and worker processes
CREATE TABLE IF NOT EXISTS workers (
    id TEXT PRIMARY KEY,
    hostname TEXT NOT NULL,
    role TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workers_last_seen ON workers(last_seen);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["crawls", "crawl_results", "address_cache", "workers"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_counter_invariant_is_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO crawls (id, range_start, range_end, total_units, processed_units,
             success_units, failed_units, status, created_at, updated_at)
             VALUES ('c1', '01000000', '01000002', 3, 2, 1, 0, 'RUNNING', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
