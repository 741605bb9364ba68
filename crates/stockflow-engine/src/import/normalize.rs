//! Row validation and normalization
//!
//! CSV cells arrive as text. Validation checks the hard constraints (sku
//! and name present and within length limits); normalization trims, maps
//! blank/NULL-ish literals to absent, and coerces `active` from its accepted
//! literal set. Normalization is idempotent: normalizing an already
//! normalized row is a no-op.

use serde::Serialize;
use std::collections::BTreeMap;

/// Column names required in the header (after trim + case-fold).
pub const REQUIRED_COLUMNS: &[&str] = &["sku", "name"];

/// Optional columns understood by the importer.
pub const OPTIONAL_COLUMNS: &[&str] = &["description", "active"];

pub const MAX_SKU_CHARS: usize = 100;
pub const MAX_NAME_CHARS: usize = 255;

/// Literals treated as "no value", matching the original feed conventions.
const ABSENT_LITERALS: &[&str] = &["", "NULL", "null", "None"];

/// Literals accepted as true for `active` (case-insensitive).
const ACTIVE_LITERALS: &[&str] = &["true", "1", "yes", "active"];

/// A raw CSV row keyed by folded column name.
pub type RawRow = BTreeMap<String, String>;

/// A row that failed validation; recorded, never fatal.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RowError {
    /// Physical line number (header is line 1).
    pub row: u64,
    pub message: String,
    pub data: RawRow,
}

/// A validated, normalized product row ready for upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

impl NormalizedProduct {
    /// Case-folded SKU, the upsert key.
    pub fn sku_folded(&self) -> String {
        self.sku.to_lowercase()
    }
}

/// Trim and case-fold a header cell.
pub fn fold_column(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_absent(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => ABSENT_LITERALS.contains(&v.trim()),
    }
}

/// Parse the `active` cell: absent/blank defaults to true, the accepted
/// literal set is true, anything else is false.
pub fn parse_active(value: Option<&str>) -> bool {
    if is_absent(value) {
        return true;
    }
    let folded = value.unwrap_or_default().trim().to_lowercase();
    ACTIVE_LITERALS.contains(&folded.as_str())
}

/// Validate one row. `row_number` is the physical line for error messages.
pub fn validate_row(row: &RawRow, row_number: u64) -> Result<(), String> {
    let sku = row.get("sku").map(String::as_str);
    if is_absent(sku) {
        return Err(format!("Row {row_number}: SKU is required"));
    }
    if sku.unwrap_or_default().trim().chars().count() > MAX_SKU_CHARS {
        return Err(format!("Row {row_number}: SKU exceeds {MAX_SKU_CHARS} characters"));
    }

    let name = row.get("name").map(String::as_str);
    if is_absent(name) {
        return Err(format!("Row {row_number}: Name is required"));
    }
    if name.unwrap_or_default().trim().chars().count() > MAX_NAME_CHARS {
        return Err(format!("Row {row_number}: Name exceeds {MAX_NAME_CHARS} characters"));
    }

    Ok(())
}

/// Normalize a validated row.
pub fn normalize_row(row: &RawRow) -> NormalizedProduct {
    let description = row
        .get("description")
        .map(String::as_str)
        .filter(|v| !is_absent(Some(v)))
        .map(|v| v.trim().to_string());

    NormalizedProduct {
        sku: row.get("sku").map(|v| v.trim().to_string()).unwrap_or_default(),
        name: row.get("name").map(|v| v.trim().to_string()).unwrap_or_default(),
        description,
        active: parse_active(row.get("active").map(String::as_str)),
    }
}
