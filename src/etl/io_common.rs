// Conversions shared by the readers.

use calamine::DataType;
use election_longform::CellValue;
use log::warn;

pub fn cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty => CellValue::Empty,
        DataType::String(s) if s.trim().is_empty() => CellValue::Empty,
        DataType::String(s) => CellValue::Text(s.clone()),
        DataType::Int(i) => CellValue::Int(*i),
        DataType::Float(f) => CellValue::Float(*f),
        DataType::Bool(b) => CellValue::Bool(*b),
        // Dates are not expected in the result files. Keep the serial number.
        DataType::DateTime(f) => CellValue::Float(*f),
        DataType::Error(e) => {
            warn!("cell_value: spreadsheet error {:?} read as an empty cell", e);
            CellValue::Empty
        }
        #[allow(unreachable_patterns)]
        x => {
            warn!("cell_value: unsupported cell {:?} read as an empty cell", x);
            CellValue::Empty
        }
    }
}

pub fn csv_cell_value(s: &str) -> CellValue {
    if s.trim().is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(s.to_string())
    }
}

/// Exports sometimes end with lines made only of separators.
pub fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(|c| c.is_empty())
}
