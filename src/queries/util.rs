//! Column helpers for decoding `tiberius` rows.
//!
//! SQL Server reports NULL for many DMV columns on idle servers, so missing
//! numeric values decode as zero rather than failing the whole query.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tiberius::Row;

pub fn float(row: &Row, column: &str) -> Result<f64> {
    Ok(row
        .try_get::<f64, _>(column)
        .with_context(|| format!("column '{column}' is not a float"))?
        .unwrap_or_default())
}

pub fn bigint(row: &Row, column: &str) -> Result<i64> {
    Ok(row
        .try_get::<i64, _>(column)
        .with_context(|| format!("column '{column}' is not a bigint"))?
        .unwrap_or_default())
}

pub fn text<'a>(row: &'a Row, column: &str) -> Result<Option<&'a str>> {
    row.try_get::<&str, _>(column)
        .with_context(|| format!("column '{column}' is not text"))
}

pub fn binary(row: &Row, column: &str) -> Result<Vec<u8>> {
    Ok(row
        .try_get::<&[u8], _>(column)
        .with_context(|| format!("column '{column}' is not binary"))?
        .map(<[u8]>::to_vec)
        .unwrap_or_default())
}

pub fn datetime(row: &Row, column: &str) -> Result<Option<NaiveDateTime>> {
    row.try_get::<NaiveDateTime, _>(column)
        .with_context(|| format!("column '{column}' is not a datetime"))
}
