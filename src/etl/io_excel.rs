// Reading the round files published as Excel workbooks.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};
use election_longform::builder::RoundTableBuilder;
use election_longform::RawRoundTable;
use log::{debug, info};

use crate::etl::config_reader::RoundSource;
use crate::etl::io_common::{cell_value, is_blank_row};
use crate::etl::*;

pub fn read_excel_round(path: &str, src: &RoundSource) -> EtlResult<RawRoundTable> {
    let wrange = get_range(path, src)?;
    table_from_rows(path, wrange.rows())
}

fn table_from_rows<'a>(
    path: &str,
    mut rows: impl Iterator<Item = &'a [DataType]>,
) -> EtlResult<RawRoundTable> {
    let header = rows.next().context(EmptyFileSnafu { path })?;
    let names: Vec<String> = header
        .iter()
        .map(|c| cell_value(c).to_text().unwrap_or_default())
        .collect();
    debug!("read_excel_round: header: {:?}", names);
    let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();

    let mut builder = RoundTableBuilder::new().header(&names);
    for row in rows {
        let cells: Vec<_> = row.iter().map(cell_value).collect();
        if is_blank_row(&cells) {
            continue;
        }
        builder.add_row(cells);
    }
    let table = builder.build();
    info!(
        "read_excel_round: {}: {} rows, {} columns",
        path,
        table.rows.len(),
        table.width()
    );
    Ok(table)
}

fn get_range(path: &str, src: &RoundSource) -> EtlResult<Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, &src.excel_worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    match &src.excel_worksheet_name {
        Some(worksheet) => workbook
            .worksheet_range(worksheet)
            .context(MissingWorksheetSnafu { path, worksheet })?
            .context(OpeningExcelSnafu { path }),
        // The published workbooks have a single sheet.
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyFileSnafu { path })?
            .context(OpeningExcelSnafu { path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use election_longform::{CellValue, CANDIDATE_COLUMNS, COMMUNE_COLUMNS};

    fn text(s: &str) -> DataType {
        DataType::String(s.to_string())
    }

    #[test]
    fn unnamed_trailing_columns_are_kept() {
        // Only the first block is named in the header, the rows carry two.
        let mut header: Vec<DataType> = COMMUNE_COLUMNS.iter().map(|s| text(s)).collect();
        header.extend(CANDIDATE_COLUMNS.iter().map(|s| text(s)));
        let mut row: Vec<DataType> = vec![text("01"), text("001")];
        row.resize(19, DataType::Float(1.0));
        for panel in [1.0, 2.0] {
            row.extend([
                DataType::Float(panel),
                text("F"),
                text("NOM"),
                text("Prénom"),
                DataType::Float(10.0),
                DataType::Float(1.5),
                DataType::Float(2.5),
            ]);
        }
        let blank = vec![DataType::Empty; 33];
        let rows = vec![header.as_slice(), row.as_slice(), blank.as_slice()];

        let table = table_from_rows("t1.xlsx", rows.into_iter()).unwrap();
        assert_eq!(table.width(), 33);
        assert_eq!(table.header[26], None);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][26], CellValue::Float(2.0));
    }

    #[test]
    fn empty_sheet() {
        let rows: Vec<&[DataType]> = vec![];
        let err = table_from_rows("t1.xlsx", rows.into_iter()).unwrap_err();
        assert!(matches!(err, EtlError::EmptyFile { .. }));
    }
}
