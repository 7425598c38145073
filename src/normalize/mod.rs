use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::model::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output of normalizing one source file: the usable flat records plus the
/// count of rows that could not even be deserialized into the flat shape.
#[derive(Debug, Default)]
pub struct NormalizedFile {
    pub records: Vec<RawRecord>,
    pub malformed_rows: usize,
}

/// Nested-object form: `customer.*` and `metadata.*` live in sub-objects
/// and are projected onto the flat keys. Missing sub-fields become `None`.
#[derive(Debug, Deserialize)]
struct NestedRecord {
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    transaction_type: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    customer: Option<NestedCustomer>,
    #[serde(default)]
    metadata: Option<NestedMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct NestedCustomer {
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NestedMetadata {
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

impl NestedRecord {
    fn flatten(self) -> RawRecord {
        let customer = self.customer.unwrap_or_default();
        let metadata = self.metadata.unwrap_or_default();
        RawRecord {
            transaction_id: self.transaction_id,
            amount: self.amount,
            currency: self.currency,
            transaction_type: self.transaction_type,
            status: self.status,
            date: self.date,
            customer_id: customer.customer_id,
            customer_name: customer.name,
            customer_email: customer.email,
            ip_address: metadata.ip_address,
            device: metadata.device,
            location: metadata.location,
        }
    }
}

/// Infers the declared format from the file extension, case-insensitively.
pub fn detect_format(id: &str) -> Option<FileFormat> {
    let ext = Path::new(id).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(FileFormat::Csv),
        "json" => Some(FileFormat::Json),
        _ => None,
    }
}

/// Converts one source file into the single flat record shape.
///
/// An unsupported extension yields an empty sequence and a logged warning,
/// not an error. An unparsable file yields `Err(ParseError)`; the caller
/// treats both as "no usable records", which is distinct from "file was a
/// duplicate".
pub fn parse_records(id: &str, bytes: &[u8]) -> Result<NormalizedFile, ParseError> {
    match detect_format(id) {
        Some(FileFormat::Csv) => parse_csv(id, bytes),
        Some(FileFormat::Json) => parse_json(bytes),
        None => {
            warn!("unsupported file format, skipping: {id}");
            Ok(NormalizedFile::default())
        }
    }
}

fn parse_csv(id: &str, bytes: &[u8]) -> Result<NormalizedFile, ParseError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    // Headers must parse; after that a bad row only costs that row.
    reader.headers()?;

    let mut out = NormalizedFile::default();
    for result in reader.deserialize::<RawRecord>() {
        match result {
            Ok(record) => out.records.push(record),
            Err(error) => {
                out.malformed_rows += 1;
                warn!("dropping malformed csv row in {id}: {error}");
            }
        }
    }
    Ok(out)
}

fn parse_json(bytes: &[u8]) -> Result<NormalizedFile, ParseError> {
    let nested: Vec<NestedRecord> = serde_json::from_slice(bytes)?;
    Ok(NormalizedFile {
        records: nested.into_iter().map(NestedRecord::flatten).collect(),
        malformed_rows: 0,
    })
}
