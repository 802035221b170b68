//! Spreadsheet capability used by the mapping engine.
//!
//! The engine only needs to open a template, list its worksheets, read and write cell
//! values, look up merged ranges and serialize the result. Those operations are the
//! [`Workbook`] trait; [`WorkbookFormat`] opens template bytes into one.
//!
//! - [`xlsx::XlsxFormat`] is the production implementation over `umya-spreadsheet`.
//! - `memory::MemoryFormat` is a JSON-backed workbook for tests (feature `test-export-mocks`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
pub mod memory;
pub mod xlsx;

static CELL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?([A-Za-z]{1,3})\$?([1-9][0-9]{0,6})$").expect("cell reference pattern")
});

/// Last column of an xlsx sheet, `XFD`.
pub const MAX_COLUMN: u32 = 16_384;
/// Last row of an xlsx sheet.
pub const MAX_ROW: u32 = 1_048_576;

#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("invalid cell reference: {0:?}")]
    InvalidCellRef(String),
    #[error("invalid cell range: {0:?}")]
    InvalidRange(String),
    #[error("unknown worksheet: {0}")]
    UnknownWorksheet(String),
    #[error("workbook format error: {0}")]
    Format(String),
}

/// A single cell address, 1-based column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub column: u32,
    pub row: u32,
}

impl CellRef {
    pub fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Same column, `offset` rows further down; `None` past the last sheet row.
    pub fn down(self, offset: u32) -> Option<Self> {
        let row = self.row.checked_add(offset).filter(|row| *row <= MAX_ROW)?;
        Some(Self {
            column: self.column,
            row,
        })
    }

    pub fn column_letters(&self) -> String {
        let mut n = self.column;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }
}

impl FromStr for CellRef {
    type Err = WorkbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = CELL_REF
            .captures(trimmed)
            .ok_or_else(|| WorkbookError::InvalidCellRef(s.to_string()))?;
        let column = caps[1]
            .to_ascii_uppercase()
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + u32::from(b - b'A' + 1));
        let row = caps[2]
            .parse::<u32>()
            .map_err(|_| WorkbookError::InvalidCellRef(s.to_string()))?;
        if column > MAX_COLUMN || row > MAX_ROW {
            return Err(WorkbookError::InvalidCellRef(s.to_string()));
        }
        Ok(CellRef { column, row })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row)
    }
}

/// A rectangular merged range; `start` is the top-left anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.column..=self.end.column).contains(&cell.column)
            && (self.start.row..=self.end.row).contains(&cell.row)
    }

    pub fn anchor(&self) -> CellRef {
        self.start
    }
}

impl FromStr for CellRange {
    type Err = WorkbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(':')
            .ok_or_else(|| WorkbookError::InvalidRange(s.to_string()))?;
        let a: CellRef = a.parse()?;
        let b: CellRef = b.parse()?;
        Ok(CellRange {
            start: CellRef::new(a.column.min(b.column), a.row.min(b.row)),
            end: CellRef::new(a.column.max(b.column), a.row.max(b.row)),
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Value written into a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// An opened template.
pub trait Workbook: Send {
    fn sheet_names(&self) -> Vec<String>;

    fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    fn merged_ranges(&self, sheet: &str) -> Result<Vec<CellRange>, WorkbookError>;

    fn read(&self, sheet: &str, cell: CellRef) -> Result<Option<CellValue>, WorkbookError>;

    /// Writes a value. Implementations may assume `cell` is not a non-anchor merged cell.
    fn write(&mut self, sheet: &str, cell: CellRef, value: CellValue) -> Result<(), WorkbookError>;

    fn to_bytes(&self) -> Result<Vec<u8>, WorkbookError>;
}

/// Opens template bytes into a [`Workbook`].
pub trait WorkbookFormat: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Workbook>, WorkbookError>;
}

/// Redirects a cell that belongs to a merged range to the range's anchor.
pub fn resolve_merged(ranges: &[CellRange], cell: CellRef) -> CellRef {
    ranges
        .iter()
        .find(|range| range.contains(cell))
        .map(CellRange::anchor)
        .unwrap_or(cell)
}
