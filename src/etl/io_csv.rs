// Reading the round files exported as delimited text.

use election_longform::builder::RoundTableBuilder;
use election_longform::RawRoundTable;
use log::{debug, info};

use crate::etl::config_reader::RoundSource;
use crate::etl::io_common::{csv_cell_value, is_blank_row};
use crate::etl::*;

const BOM: char = '\u{feff}';

pub fn read_csv_round(path: &str, src: &RoundSource) -> EtlResult<RawRoundTable> {
    let delimiter = src.delimiter_byte()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        // Exports drop the separators of trailing empty cells.
        .flexible(true)
        .from_path(path)
        .context(CsvReadSnafu { path })?;
    let mut records = rdr.into_records();

    let header = records
        .next()
        .context(EmptyFileSnafu { path })?
        .context(CsvReadSnafu { path })?;
    let names: Vec<&str> = header
        .iter()
        .enumerate()
        .map(|(idx, s)| if idx == 0 { s.trim_start_matches(BOM) } else { s })
        .collect();
    debug!("read_csv_round: header: {:?}", names);

    let mut builder = RoundTableBuilder::new().header(&names);
    for line_r in records {
        let line = line_r.context(CsvReadSnafu { path })?;
        let cells: Vec<_> = line.iter().map(csv_cell_value).collect();
        if is_blank_row(&cells) {
            continue;
        }
        builder.add_row(cells);
    }
    info!(
        "read_csv_round: {}: {} rows, {} columns",
        path,
        builder.num_rows(),
        names.len()
    );
    Ok(builder.build())
}
