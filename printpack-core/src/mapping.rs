//! Cell mapping engine: writes payload values into template cells.
//!
//! Rules are applied in the order given. The first violation aborts the fill, leaving the
//! cells written so far in place; callers discard the workbook on error.

use std::collections::HashMap;

use tracing::debug;

use crate::error::MappingError;
use crate::models::MappingRule;
use crate::payload::{is_missing, is_repeating, Scalar, Value};
use crate::workbook::{resolve_merged, CellRange, CellRef, CellValue, Workbook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    Upper,
    DateFr,
}

impl Transform {
    /// Unknown and empty names fall back to identity.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "upper" => Transform::Upper,
            "date_fr" => Transform::DateFr,
            _ => Transform::Identity,
        }
    }

    pub fn apply(self, scalar: &Scalar) -> CellValue {
        match (self, scalar) {
            (_, Scalar::Null) => CellValue::text(""),
            (Transform::Upper, other) => CellValue::Text(other.to_string().to_uppercase()),
            (Transform::DateFr, Scalar::Date(d)) => CellValue::Text(d.format("%d/%m/%Y").to_string()),
            (Transform::DateFr, Scalar::DateTime(dt)) => {
                CellValue::Text(dt.format("%d/%m/%Y").to_string())
            }
            (_, Scalar::Bool(b)) => CellValue::Bool(*b),
            (_, Scalar::Int(i)) => CellValue::Number(*i as f64),
            (_, Scalar::Float(x)) => CellValue::Number(*x),
            (_, other) => CellValue::Text(other.to_string()),
        }
    }
}

/// Fills `workbook` from `payload` according to `rules`.
pub fn fill(
    workbook: &mut dyn Workbook,
    rules: &[MappingRule],
    payload: &Value,
) -> Result<(), MappingError> {
    let mut merged: HashMap<String, Vec<CellRange>> = HashMap::new();

    for rule in rules {
        let worksheet = rule.worksheet_name.as_str();
        if !workbook.has_sheet(worksheet) {
            return Err(MappingError::UnknownWorksheet {
                worksheet: worksheet.to_string(),
            });
        }
        let anchor: CellRef = rule.cell_ref.parse().map_err(|_| MappingError::InvalidCell {
            worksheet: worksheet.to_string(),
            cell: rule.cell_ref.clone(),
        })?;
        if !merged.contains_key(worksheet) {
            let ranges = workbook.merged_ranges(worksheet)?;
            merged.insert(worksheet.to_string(), ranges);
        }
        let ranges = merged.get(worksheet).map(Vec::as_slice).unwrap_or_default();
        let transform = Transform::from_name(&rule.transform);

        if is_repeating(&rule.source_key) {
            let rows = payload.repeat(&rule.source_key);
            if rule.required && rows.is_empty() {
                return Err(missing_required(rule, anchor));
            }
            debug!(
                worksheet,
                cell = %anchor,
                source_key = %rule.source_key,
                rows = rows.len(),
                "[MAPPING] repeating rule"
            );
            for (offset, value) in rows.into_iter().enumerate() {
                let target = u32::try_from(offset)
                    .ok()
                    .and_then(|offset| anchor.down(offset))
                    .ok_or_else(|| MappingError::InvalidCell {
                        worksheet: worksheet.to_string(),
                        cell: format!("{}+{offset}", anchor),
                    })?;
                write_value(workbook, rule, ranges, target, value, transform)?;
            }
        } else {
            let value = payload.resolve(&rule.source_key);
            write_value(workbook, rule, ranges, anchor, value, transform)?;
        }
    }
    Ok(())
}

fn write_value(
    workbook: &mut dyn Workbook,
    rule: &MappingRule,
    ranges: &[CellRange],
    target: CellRef,
    value: Option<&Value>,
    transform: Transform,
) -> Result<(), MappingError> {
    if rule.required && is_missing(value) {
        return Err(missing_required(rule, target));
    }
    let cell_value = match value {
        None => CellValue::text(""),
        Some(v) if is_missing(Some(v)) => CellValue::text(""),
        Some(Value::Scalar(scalar)) => transform.apply(scalar),
        Some(_) => {
            return Err(MappingError::NonScalar {
                worksheet: rule.worksheet_name.clone(),
                cell: target.to_string(),
                source_key: rule.source_key.clone(),
            })
        }
    };
    let cell = resolve_merged(ranges, target);
    workbook.write(&rule.worksheet_name, cell, cell_value)?;
    Ok(())
}

fn missing_required(rule: &MappingRule, cell: CellRef) -> MappingError {
    MappingError::MissingRequired {
        worksheet: rule.worksheet_name.clone(),
        cell: cell.to_string(),
        source_key: rule.source_key.clone(),
    }
}
