use std::path::Path;

use rusqlite::{Connection, params, params_from_iter};
use thiserror::Error;

use crate::model::Transaction;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// One row as persisted. Enum fields come back as the uppercase strings they
/// were stored with; the query layer re-parses them into the closed enums.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub transaction_type: String,
    pub status: String,
    pub date: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub ip_address: String,
    pub device: String,
    pub location: String,
}

/// One page of a cursor scan. `total` counts every row matching the date
/// filter alone, ignoring the cursor position.
#[derive(Debug)]
pub struct ScanPage {
    pub rows: Vec<StoredRow>,
    pub next_cursor: Option<String>,
    pub total: u64,
}

/// Durable append-mostly store keyed by `transaction_id`. The uniqueness
/// constraint on the primary key is the final arbiter for deduplication;
/// any in-process dedup upstream is an optimization, not a substitute.
pub struct TransactionStore {
    conn: Connection,
}

impl TransactionStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS transactions (
                transaction_id TEXT PRIMARY KEY,
                amount REAL NOT NULL CHECK (amount > 0.0),
                currency TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                status TEXT NOT NULL,
                date TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                customer_name TEXT NOT NULL,
                customer_email TEXT NOT NULL,
                ip_address TEXT NOT NULL,
                device TEXT NOT NULL,
                location TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            ",
        )?;
        Ok(())
    }

    /// Appends exactly the subset of `records` whose id is not already
    /// present and returns the appended count. Existing ids are silently
    /// skipped; nothing is ever overwritten. Runs inside one transaction so
    /// a failure leaves the store unchanged.
    pub fn insert_new(&self, records: &[Transaction]) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut appended = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO transactions (
                    transaction_id, amount, currency, transaction_type, status, date,
                    customer_id, customer_name, customer_email, ip_address, device, location
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for record in records {
                appended += stmt.execute(params![
                    record.transaction_id,
                    record.amount,
                    record.currency,
                    record.transaction_type.as_str(),
                    record.status.as_str(),
                    record.date,
                    record.customer_id,
                    record.customer_name,
                    record.customer_email,
                    record.ip_address,
                    record.device,
                    record.location,
                ])?;
            }
        }
        tx.commit()?;
        Ok(appended)
    }

    pub fn contains(&self, transaction_id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE transaction_id = ?1",
            params![transaction_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Range scan ordered ascending by `transaction_id`.
    ///
    /// Dates are compared lexicographically, which is correct for the fixed
    /// `YYYY-MM-DD` form; absent bounds leave that side open. `after_id` is
    /// an exclusive lower bound on the id, a pure range comparison: it does
    /// not have to name an existing row. The scan fetches `limit + 1` rows;
    /// when the extra row shows up, the `limit`-th row's id becomes
    /// `next_cursor` and the extra row is discarded.
    pub fn scan(
        &self,
        date_from: Option<&str>,
        date_to: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let mut date_clauses = Vec::new();
        let mut date_params: Vec<String> = Vec::new();
        if let Some(from) = date_from {
            date_clauses.push("date >= ?");
            date_params.push(from.to_string());
        }
        if let Some(to) = date_to {
            date_clauses.push("date <= ?");
            date_params.push(to.to_string());
        }
        let date_filter = if date_clauses.is_empty() {
            "1=1".to_string()
        } else {
            date_clauses.join(" AND ")
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM transactions WHERE {date_filter}"),
            params_from_iter(date_params.iter()),
            |row| row.get(0),
        )?;

        let mut scan_params = date_params;
        let cursor_clause = if let Some(after) = after_id {
            scan_params.push(after.to_string());
            "AND transaction_id > ?"
        } else {
            ""
        };
        // Saturate the look-ahead and keep it inside SQLite's integer range.
        let fetch = limit.saturating_add(1).min(i64::MAX as usize);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT transaction_id, amount, currency, transaction_type, status, date,
                    customer_id, customer_name, customer_email, ip_address, device, location
             FROM transactions
             WHERE {date_filter} {cursor_clause}
             ORDER BY transaction_id ASC
             LIMIT {fetch}"
        ))?;

        let mut rows = stmt.query(params_from_iter(scan_params.iter()))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            fetched.push(StoredRow {
                transaction_id: row.get(0)?,
                amount: row.get(1)?,
                currency: row.get(2)?,
                transaction_type: row.get(3)?,
                status: row.get(4)?,
                date: row.get(5)?,
                customer_id: row.get(6)?,
                customer_name: row.get(7)?,
                customer_email: row.get(8)?,
                ip_address: row.get(9)?,
                device: row.get(10)?,
                location: row.get(11)?,
            });
        }

        let next_cursor = if fetched.len() > limit {
            fetched.truncate(limit);
            fetched.last().map(|row| row.transaction_id.clone())
        } else {
            None
        };

        Ok(ScanPage {
            rows: fetched,
            next_cursor,
            total: total as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TransactionStatus, TransactionType};

    fn record(id: &str, date: &str) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            transaction_type: TransactionType::Payment,
            status: TransactionStatus::Completed,
            date: date.to_string(),
            customer_id: "C-1".to_string(),
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            ip_address: "unknown".to_string(),
            device: "unknown".to_string(),
            location: "unknown".to_string(),
        }
    }

    #[test]
    fn insert_new_appends_only_absent_ids() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        let first = store
            .insert_new(&[record("TX-1", "2024-06-01"), record("TX-2", "2024-06-01")])
            .expect("first insert");
        assert_eq!(first, 2);

        // k already stored + m new must append exactly m.
        let second = store
            .insert_new(&[
                record("TX-1", "2024-06-01"),
                record("TX-2", "2024-06-01"),
                record("TX-3", "2024-06-02"),
            ])
            .expect("second insert");
        assert_eq!(second, 1);
        assert_eq!(store.count().expect("count"), 3);
    }

    #[test]
    fn insert_new_never_overwrites_an_existing_row() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        store
            .insert_new(&[record("TX-1", "2024-06-01")])
            .expect("insert");

        let mut changed = record("TX-1", "2024-12-31");
        changed.amount = 999.0;
        store.insert_new(&[changed]).expect("re-insert");

        let page = store.scan(None, None, None, 10).expect("scan");
        assert_eq!(page.rows[0].date, "2024-06-01");
        assert_eq!(page.rows[0].amount, 10.0);
    }

    #[test]
    fn contains_reports_presence() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        store
            .insert_new(&[record("TX-1", "2024-06-01")])
            .expect("insert");
        assert!(store.contains("TX-1").expect("lookup"));
        assert!(!store.contains("TX-404").expect("lookup"));
    }

    #[test]
    fn empty_store_scans_to_empty_page() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        let page = store.scan(None, None, None, 100).expect("scan");
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 0);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn scan_orders_by_id_and_reports_next_cursor() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        let records = (0..5)
            .map(|i| record(&format!("TX-{i:03}"), "2024-06-01"))
            .collect::<Vec<_>>();
        store.insert_new(&records).expect("insert");

        let page = store.scan(None, None, None, 2).expect("scan");
        assert_eq!(page.total, 5);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].transaction_id, "TX-000");
        assert_eq!(page.rows[1].transaction_id, "TX-001");
        assert_eq!(page.next_cursor.as_deref(), Some("TX-001"));

        let rest = store.scan(None, None, Some("TX-001"), 10).expect("scan");
        assert_eq!(rest.rows.len(), 3);
        assert!(rest.next_cursor.is_none());
        // Total ignores the cursor position.
        assert_eq!(rest.total, 5);
    }

    #[test]
    fn following_cursors_yields_the_full_set_without_duplicates() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        let records = (0..7)
            .map(|i| record(&format!("TX-{i:03}"), "2024-06-01"))
            .collect::<Vec<_>>();
        store.insert_new(&records).expect("insert");

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store
                .scan(None, None, cursor.as_deref(), 3)
                .expect("scan page");
            seen.extend(page.rows.iter().map(|r| r.transaction_id.clone()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let expected = (0..7).map(|i| format!("TX-{i:03}")).collect::<Vec<_>>();
        assert_eq!(seen, expected);
    }

    #[test]
    fn date_range_filters_lexicographically() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        store
            .insert_new(&[
                record("TX-1", "2024-05-31"),
                record("TX-2", "2024-06-01"),
                record("TX-3", "2024-06-15"),
                record("TX-4", "2024-07-01"),
            ])
            .expect("insert");

        let page = store
            .scan(Some("2024-06-01"), Some("2024-06-30"), None, 10)
            .expect("scan");
        assert_eq!(page.total, 2);
        let ids: Vec<_> = page.rows.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["TX-2", "TX-3"]);

        let open_end = store.scan(Some("2024-06-01"), None, None, 10).expect("scan");
        assert_eq!(open_end.total, 3);
    }

    #[test]
    fn after_id_does_not_need_to_exist() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        store
            .insert_new(&[record("TX-1", "2024-06-01"), record("TX-3", "2024-06-01")])
            .expect("insert");

        let page = store.scan(None, None, Some("TX-2"), 10).expect("scan");
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].transaction_id, "TX-3");
    }

    #[test]
    fn maximum_limit_does_not_overflow_the_lookahead() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        store
            .insert_new(&[record("TX-1", "2024-06-01"), record("TX-2", "2024-06-01")])
            .expect("insert");

        let page = store.scan(None, None, None, usize::MAX).expect("scan");
        assert_eq!(page.rows.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn exact_limit_boundary_has_no_next_cursor() {
        let store = TransactionStore::open_in_memory().expect("in-memory store");
        store
            .insert_new(&[record("TX-1", "2024-06-01"), record("TX-2", "2024-06-01")])
            .expect("insert");

        let page = store.scan(None, None, None, 2).expect("scan");
        assert_eq!(page.rows.len(), 2);
        assert!(page.next_cursor.is_none());
    }
}
