use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel stored for optional metadata fields that arrive empty or absent.
pub const UNKNOWN: &str = "unknown";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Payment,
    Deposit,
    Withdrawal,
    Transfer,
    Refund,
}

impl TransactionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Transfer => "TRANSFER",
            Self::Refund => "REFUND",
        }
    }
}

impl FromStr for TransactionType {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAYMENT" => Ok(Self::Payment),
            "DEPOSIT" => Ok(Self::Deposit),
            "WITHDRAWAL" => Ok(Self::Withdrawal),
            "TRANSFER" => Ok(Self::Transfer),
            "REFUND" => Ok(Self::Refund),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Pending => "PENDING",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" => Ok(Self::Completed),
            "PENDING" => Ok(Self::Pending),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// Canonical transaction in the single flat shape used for storage,
/// regardless of which file shape it came from. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub date: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub ip_address: String,
    pub device: String,
    pub location: String,
}

/// Flat field mapping emitted by every normalizer. All fields are optional;
/// validation decides which absences are fatal for the row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be a non-empty string")]
    EmptyField(&'static str),
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(f64),
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unknown transaction_type `{0}`")]
    UnknownTransactionType(String),
    #[error("unknown status `{0}`")]
    UnknownStatus(String),
}

/// Validates and cleans one raw row into a canonical [`Transaction`].
///
/// Enum fields are matched case-insensitively and stored uppercase; the
/// optional metadata fields fall back to [`UNKNOWN`]. Pure function, no
/// side effects: callers drop failing rows and keep going.
pub fn validate(raw: &RawRecord) -> Result<Transaction, ValidationError> {
    let transaction_id = required(&raw.transaction_id, "transaction_id")?;
    let amount = raw.amount.ok_or(ValidationError::MissingField("amount"))?;
    if amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount(amount));
    }
    let currency = required(&raw.currency, "currency")?;

    let type_raw = required(&raw.transaction_type, "transaction_type")?;
    let transaction_type = type_raw
        .parse::<TransactionType>()
        .map_err(|()| ValidationError::UnknownTransactionType(type_raw.clone()))?;

    let status_raw = required(&raw.status, "status")?;
    let status = status_raw
        .parse::<TransactionStatus>()
        .map_err(|()| ValidationError::UnknownStatus(status_raw.clone()))?;

    let date = required(&raw.date, "date")?;
    if NaiveDate::parse_from_str(&date, DATE_FORMAT).is_err() {
        return Err(ValidationError::InvalidDate(date));
    }

    Ok(Transaction {
        transaction_id,
        amount,
        currency,
        transaction_type,
        status,
        date,
        customer_id: required(&raw.customer_id, "customer_id")?,
        customer_name: required(&raw.customer_name, "customer_name")?,
        customer_email: required(&raw.customer_email, "customer_email")?,
        ip_address: optional(&raw.ip_address),
        device: optional(&raw.device),
        location: optional(&raw.location),
    })
}

/// Checks that an externally supplied date string is a real `YYYY-MM-DD`
/// calendar date. Shared by row validation and query-parameter validation.
pub fn is_well_formed_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, DATE_FORMAT).is_ok()
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    let value = value.as_ref().ok_or(ValidationError::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn optional(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}
