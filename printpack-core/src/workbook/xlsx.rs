//! `.xlsx` templates through `umya-spreadsheet`.

use std::io::Cursor;

use umya_spreadsheet::{Spreadsheet, Worksheet};

use super::{CellRange, CellRef, CellValue, Workbook, WorkbookError, WorkbookFormat};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxFormat;

impl WorkbookFormat for XlsxFormat {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn Workbook>, WorkbookError> {
        let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes.to_vec()), true)
            .map_err(|e| WorkbookError::Format(e.to_string()))?;
        Ok(Box::new(XlsxWorkbook { book }))
    }
}

pub struct XlsxWorkbook {
    book: Spreadsheet,
}

impl XlsxWorkbook {
    pub fn new(book: Spreadsheet) -> Self {
        Self { book }
    }

    fn sheet(&self, name: &str) -> Result<&Worksheet, WorkbookError> {
        self.book
            .get_sheet_by_name(name)
            .ok_or_else(|| WorkbookError::UnknownWorksheet(name.to_string()))
    }
}

impl Workbook for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|s| s.get_name().to_string())
            .collect()
    }

    fn merged_ranges(&self, sheet: &str) -> Result<Vec<CellRange>, WorkbookError> {
        self.sheet(sheet)?
            .get_merge_cells()
            .iter()
            .map(|range| range.get_range().parse::<CellRange>())
            .collect()
    }

    fn read(&self, sheet: &str, cell: CellRef) -> Result<Option<CellValue>, WorkbookError> {
        let value = self.sheet(sheet)?.get_value(cell.to_string().as_str());
        Ok((!value.is_empty()).then(|| CellValue::Text(value)))
    }

    fn write(&mut self, sheet: &str, cell: CellRef, value: CellValue) -> Result<(), WorkbookError> {
        let worksheet = self
            .book
            .get_sheet_by_name_mut(sheet)
            .ok_or_else(|| WorkbookError::UnknownWorksheet(sheet.to_string()))?;
        let target = worksheet.get_cell_mut(cell.to_string().as_str());
        match value {
            CellValue::Text(s) => {
                target.set_value_string(s);
            }
            CellValue::Number(n) => {
                target.set_value_number(n);
            }
            CellValue::Bool(b) => {
                target.set_value_bool(b);
            }
        }
        target
            .get_style_mut()
            .get_alignment_mut()
            .set_wrap_text(true);
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, WorkbookError> {
        let mut out = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&self.book, &mut out)
            .map_err(|e| WorkbookError::Format(e.to_string()))?;
        Ok(out.into_inner())
    }
}
