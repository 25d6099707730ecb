//! Per-cell coercion of source text into typed warehouse values.

use chrono::{NaiveDate, NaiveDateTime};

use crate::connector::SourceRow;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Int,
    Float,
    Bool,
    Date,
    Timestamp,
    Text,
}

impl TargetKind {
    pub fn from_prop_type(prop_type: &str) -> Self {
        match prop_type.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "bigint" | "long" => Self::Int,
            "float" | "double" | "decimal" => Self::Float,
            "boolean" | "bool" => Self::Bool,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::Timestamp,
            _ => Self::Text,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    #[error("column {column}: cannot convert {value:?} to {expected}")]
    Invalid {
        column: String,
        value: String,
        expected: &'static str,
    },
    #[error("column {column}: required value is missing")]
    MissingRequired { column: String },
}

/// Where one source column lands in the target table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub source_column: String,
    pub target_column: String,
    pub property_id: i32,
    pub kind: TargetKind,
    pub required: bool,
}

/// Coerce one raw cell. `None` and blank strings become `Null`.
pub fn coerce_cell(raw: Option<&str>, kind: TargetKind) -> Option<CellValue> {
    let Some(raw) = raw else {
        return Some(CellValue::Null);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(CellValue::Null);
    }
    match kind {
        TargetKind::Int => trimmed.parse::<i64>().ok().map(CellValue::Int).or_else(|| {
            // "12.0" style integers coming out of DECIMAL/NUMERIC casts
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| CellValue::Int(f as i64))
        }),
        TargetKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(CellValue::Float),
        TargetKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Some(CellValue::Bool(true)),
            "false" | "f" | "0" | "no" | "n" => Some(CellValue::Bool(false)),
            _ => None,
        },
        TargetKind::Date => parse_date(trimmed).map(|d| CellValue::Text(d.to_string())),
        TargetKind::Timestamp => parse_timestamp(trimmed)
            .map(|ts| CellValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        TargetKind::Text => Some(CellValue::Text(raw.to_string())),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        // timestamps truncate to their date
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    // offsets ("+08:00", "Z") are normalised to UTC
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Coerce a source row (cells in `bindings` order) into target values.
pub fn transform_row(
    row: &SourceRow,
    bindings: &[FieldBinding],
) -> Result<Vec<CellValue>, CoercionError> {
    bindings
        .iter()
        .enumerate()
        .map(|(i, binding)| {
            let raw = row.get(i).and_then(|c| c.as_deref());
            let value = coerce_cell(raw, binding.kind).ok_or_else(|| CoercionError::Invalid {
                column: binding.source_column.clone(),
                value: raw.unwrap_or_default().to_string(),
                expected: binding.kind.label(),
            })?;
            if binding.required && value == CellValue::Null {
                return Err(CoercionError::MissingRequired {
                    column: binding.source_column.clone(),
                });
            }
            Ok(value)
        })
        .collect()
}
