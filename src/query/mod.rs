use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::{Transaction, is_well_formed_date};
use crate::store::{StoreError, StoredRow, TransactionStore};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Externally supplied filter and pagination parameters, unvalidated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// The public paginated response shape. `prev_cursor` echoes the cursor the
/// caller supplied; it is not independently computed backward pagination.
#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub data: Vec<Transaction>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub total: u64,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid {field}: expected a YYYY-MM-DD date")]
    InvalidDate { field: &'static str },
    #[error("limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    /// Client errors are rejected before touching storage; everything else
    /// is an internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidDate { .. } | Self::InvalidLimit(_))
    }
}

/// Validates the request, delegates to the store scan, and shapes the page.
///
/// A stored row that no longer maps onto the public record shape is dropped
/// from the response and logged; it does not fail the request.
pub fn run_query(
    store: &TransactionStore,
    params: &QueryParams,
) -> Result<TransactionPage, QueryError> {
    if let Some(start) = params.start_date.as_deref()
        && !is_well_formed_date(start)
    {
        return Err(QueryError::InvalidDate {
            field: "start_date",
        });
    }
    if let Some(end) = params.end_date.as_deref()
        && !is_well_formed_date(end)
    {
        return Err(QueryError::InvalidDate { field: "end_date" });
    }
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit < 1 || limit > MAX_LIMIT {
        return Err(QueryError::InvalidLimit(limit));
    }

    let page = store.scan(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
        params.cursor.as_deref(),
        limit,
    )?;

    let data = page
        .rows
        .into_iter()
        .filter_map(|row| {
            let id = row.transaction_id.clone();
            match map_row(row) {
                Some(record) => Some(record),
                None => {
                    warn!("dropping unmappable stored row {id}");
                    None
                }
            }
        })
        .collect();

    Ok(TransactionPage {
        data,
        next_cursor: page.next_cursor,
        prev_cursor: params.cursor.clone(),
        total: page.total,
    })
}

fn map_row(row: StoredRow) -> Option<Transaction> {
    Some(Transaction {
        transaction_type: row.transaction_type.parse().ok()?,
        status: row.status.parse().ok()?,
        transaction_id: row.transaction_id,
        amount: row.amount,
        currency: row.currency,
        date: row.date,
        customer_id: row.customer_id,
        customer_name: row.customer_name,
        customer_email: row.customer_email,
        ip_address: row.ip_address,
        device: row.device,
        location: row.location,
    })
}
