//! Transaction loading and cleaning
//!
//! Raw rows come in through the tabular contract (a polars `DataFrame` or a
//! `Vec<RawTransaction>` built by the caller) and leave as canonical
//! transactions: dated, positive, de-duplicated and keyed by an integer
//! customer id.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SegmentationError};

/// Columns every input table must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "InvoiceNo",
    "StockCode",
    "Description",
    "Quantity",
    "InvoiceDate",
    "UnitPrice",
    "CustomerID",
];

/// Optional column kept on canonical rows when present.
pub const COUNTRY_COLUMN: &str = "Country";

/// Text layouts tried after RFC 3339, in order.
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Invoice timestamp as it arrives: text to be parsed, or already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInvoiceDate {
    Text(String),
    Timestamp(NaiveDateTime),
}

impl RawInvoiceDate {
    /// Parsed timestamp, or `None` when the text is not a recognised date.
    pub fn parse(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Text(text) => parse_invoice_date(text),
            Self::Timestamp(ts) => Some(*ts),
        }
    }
}

/// One uncleaned transaction line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: Option<i64>,
    pub invoice_date: Option<RawInvoiceDate>,
    pub unit_price: Option<f64>,
    pub customer_id: Option<f64>,
    pub country: Option<String>,
}

impl RawTransaction {
    /// Extract typed rows from a table.
    ///
    /// Fails with `MalformedInput` naming every required column that is
    /// absent. Individual cells that cannot be cast become missing values and
    /// are dealt with by [`normalize`].
    pub fn from_frame(df: &DataFrame) -> Result<Vec<RawTransaction>> {
        let names = df.get_column_names();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| !names.contains(column))
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SegmentationError::MalformedInput { missing });
        }

        let invoice_no = string_column(df, "InvoiceNo")?;
        let stock_code = string_column(df, "StockCode")?;
        let description = string_column(df, "Description")?;
        let quantity = i64_column(df, "Quantity")?;
        let invoice_date = string_column(df, "InvoiceDate")?;
        let unit_price = f64_column(df, "UnitPrice")?;
        let customer_id = f64_column(df, "CustomerID")?;
        let country = if names.contains(&COUNTRY_COLUMN) {
            string_column(df, COUNTRY_COLUMN)?
        } else {
            vec![None; df.height()]
        };

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            rows.push(RawTransaction {
                invoice_no: invoice_no[i].clone().unwrap_or_default(),
                stock_code: stock_code[i].clone().unwrap_or_default(),
                description: description[i].clone().unwrap_or_default(),
                quantity: quantity[i],
                invoice_date: invoice_date[i].clone().map(RawInvoiceDate::Text),
                unit_price: unit_price[i],
                customer_id: customer_id[i],
                country: country[i].clone(),
            });
        }

        Ok(rows)
    }
}

impl From<&CanonicalTransaction> for RawTransaction {
    fn from(tx: &CanonicalTransaction) -> Self {
        RawTransaction {
            invoice_no: tx.invoice_no.clone(),
            stock_code: tx.stock_code.clone(),
            description: tx.description.clone(),
            quantity: Some(tx.quantity),
            invoice_date: Some(RawInvoiceDate::Timestamp(tx.invoice_date)),
            unit_price: Some(tx.unit_price),
            customer_id: Some(tx.customer_id as f64),
            country: tx.country.clone(),
        }
    }
}

/// A cleaned transaction line with its derived line total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTransaction {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: i64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub customer_id: u64,
    pub country: Option<String>,
    /// `quantity * unit_price`
    pub line_total: f64,
}

/// Row after timestamp parsing, before the filters run.
#[derive(Debug, Clone)]
struct ParsedRow {
    invoice_no: String,
    stock_code: String,
    description: String,
    quantity: Option<i64>,
    invoice_date: Option<NaiveDateTime>,
    unit_price: Option<f64>,
    customer_id: Option<f64>,
    country: Option<String>,
}

/// Every field of a parsed row, in a hashable form.
type RowKey = (
    String,
    String,
    String,
    Option<i64>,
    Option<NaiveDateTime>,
    Option<u64>,
    Option<u64>,
    Option<String>,
);

impl ParsedRow {
    fn from_raw(raw: &RawTransaction) -> Self {
        ParsedRow {
            invoice_no: raw.invoice_no.clone(),
            stock_code: raw.stock_code.clone(),
            description: raw.description.clone(),
            quantity: raw.quantity,
            invoice_date: raw.invoice_date.as_ref().and_then(RawInvoiceDate::parse),
            unit_price: raw.unit_price,
            customer_id: raw.customer_id,
            country: raw.country.clone(),
        }
    }

    fn is_billable(&self) -> bool {
        self.quantity.is_some_and(|q| q > 0)
            && self.unit_price.is_some_and(|p| p.is_finite() && p > 0.0)
            && self.invoice_date.is_some()
    }

    fn key(&self) -> RowKey {
        (
            self.invoice_no.clone(),
            self.stock_code.clone(),
            self.description.clone(),
            self.quantity,
            self.invoice_date,
            self.unit_price.map(f64::to_bits),
            self.customer_id.map(f64::to_bits),
            self.country.clone(),
        )
    }

    fn into_canonical(self) -> Option<CanonicalTransaction> {
        let quantity = self.quantity?;
        let unit_price = self.unit_price?;
        let invoice_date = self.invoice_date?;
        let line_total = quantity as f64 * unit_price;
        let customer_id = match self.customer_id.and_then(customer_id_from_f64) {
            Some(id) => id,
            None => {
                debug!(
                    customer_id = ?self.customer_id,
                    invoice = %self.invoice_no,
                    "dropping row with a non-integer customer id"
                );
                return None;
            }
        };

        Some(CanonicalTransaction {
            invoice_no: self.invoice_no,
            stock_code: self.stock_code,
            description: self.description,
            quantity,
            invoice_date,
            unit_price,
            customer_id,
            country: self.country,
            line_total,
        })
    }
}

/// Clean raw rows into the canonical transaction set.
///
/// Steps run in a fixed order: parse timestamps, drop rows without a
/// customer, keep positive quantity and price with a known date, drop exact
/// duplicates (first occurrence wins), attach line totals, cast customer ids.
/// The input is left untouched and an empty result is not an error.
pub fn normalize(raw: &[RawTransaction]) -> Vec<CanonicalTransaction> {
    let parsed: Vec<ParsedRow> = raw.iter().map(ParsedRow::from_raw).collect();

    let with_customer: Vec<ParsedRow> = parsed
        .into_iter()
        .filter(|row| row.customer_id.is_some())
        .collect();
    let after_customer = with_customer.len();

    let billable: Vec<ParsedRow> = with_customer
        .into_iter()
        .filter(ParsedRow::is_billable)
        .collect();
    let after_billable = billable.len();

    let mut seen = HashSet::with_capacity(billable.len());
    let unique: Vec<ParsedRow> = billable
        .into_iter()
        .filter(|row| seen.insert(row.key()))
        .collect();
    let after_dedup = unique.len();

    let canonical: Vec<CanonicalTransaction> = unique
        .into_iter()
        .filter_map(ParsedRow::into_canonical)
        .collect();

    debug!(
        input = raw.len(),
        after_customer,
        after_billable,
        after_dedup,
        canonical = canonical.len(),
        "normalized transactions"
    );

    canonical
}

/// Parse an invoice timestamp in any of the accepted layouts.
///
/// RFC 3339 values are converted to UTC; a bare date means midnight.
pub fn parse_invoice_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Load a transactions CSV (header row required) into a table.
///
/// Every column is read as text; typing happens per cell in
/// [`RawTransaction::from_frame`], so one odd value deep in the file only
/// loses its own row. Invalid UTF-8 is replaced rather than rejected; the
/// usual retail exports are latin-1.
pub fn load_transactions_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_encoding(CsvEncoding::LossyUtf8))
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;

    debug!(rows = df.height(), columns = df.width(), "loaded transactions csv");
    Ok(df)
}

fn customer_id_from_f64(value: f64) -> Option<u64> {
    let representable =
        value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64;
    representable.then_some(value as u64)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    let values = series.str()?.into_iter().map(|v| v.map(str::to_owned)).collect();
    Ok(values)
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().collect();
    Ok(values)
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}
