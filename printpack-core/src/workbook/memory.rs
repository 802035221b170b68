//! JSON-backed in-memory workbook, used as a template format in tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CellRange, CellRef, CellValue, Workbook, WorkbookError, WorkbookFormat};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySheet {
    pub name: String,
    #[serde(default)]
    pub cells: BTreeMap<String, CellValue>,
    #[serde(default)]
    pub merged: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryWorkbook {
    pub sheets: Vec<MemorySheet>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: &str) -> Self {
        self.sheets.push(MemorySheet {
            name: name.to_string(),
            ..Default::default()
        });
        self
    }

    /// Adds a merged range (`"B2:D2"`) to an existing sheet.
    pub fn with_merged(mut self, sheet: &str, range: &str) -> Self {
        if let Some(s) = self.sheets.iter_mut().find(|s| s.name == sheet) {
            s.merged.push(range.to_string());
        }
        self
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        serde_json::from_slice(bytes).map_err(|e| WorkbookError::Format(e.to_string()))
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Reads a cell by its `A1` reference, as stored (no merged-cell redirection).
    pub fn value(&self, sheet: &str, cell: &str) -> Option<&CellValue> {
        let key = cell.parse::<CellRef>().ok()?.to_string();
        self.sheet(sheet)?.cells.get(&key)
    }

    fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut MemorySheet, WorkbookError> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| WorkbookError::UnknownWorksheet(name.to_string()))
    }
}

impl Workbook for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn merged_ranges(&self, sheet: &str) -> Result<Vec<CellRange>, WorkbookError> {
        let sheet = self
            .sheet(sheet)
            .ok_or_else(|| WorkbookError::UnknownWorksheet(sheet.to_string()))?;
        sheet.merged.iter().map(|r| r.parse::<CellRange>()).collect()
    }

    fn read(&self, sheet: &str, cell: CellRef) -> Result<Option<CellValue>, WorkbookError> {
        let sheet = self
            .sheet(sheet)
            .ok_or_else(|| WorkbookError::UnknownWorksheet(sheet.to_string()))?;
        Ok(sheet.cells.get(&cell.to_string()).cloned())
    }

    fn write(&mut self, sheet: &str, cell: CellRef, value: CellValue) -> Result<(), WorkbookError> {
        let ranges = self.merged_ranges(sheet)?;
        if ranges
            .iter()
            .any(|r| r.contains(cell) && r.anchor() != cell)
        {
            return Err(WorkbookError::Format(format!(
                "cell {cell} is a non-anchor merged cell"
            )));
        }
        self.sheet_mut(sheet)?.cells.insert(cell.to_string(), value);
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, WorkbookError> {
        serde_json::to_vec(self).map_err(|e| WorkbookError::Format(e.to_string()))
    }
}

/// Opens [`MemoryWorkbook`] JSON bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryFormat;

impl WorkbookFormat for MemoryFormat {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Workbook>, WorkbookError> {
        Ok(Box::new(MemoryWorkbook::from_bytes(bytes)?))
    }
}
