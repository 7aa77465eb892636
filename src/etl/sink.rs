// Writing the long table. Every write goes to a temporary file which is
// renamed once complete, so a failed run never leaves a partial output.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray, UInt32Array, UInt8Array};
use arrow::datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use election_longform::*;
use log::{debug, info, warn};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::etl::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum OutputFormat {
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

/// How one output column is read from a record.
enum Column {
    Text(&'static str, fn(&LongRecord) -> Option<String>),
    Count(&'static str, fn(&LongRecord) -> Option<u64>),
    Percent(&'static str, fn(&LongRecord) -> Option<f64>),
    Key,
    Round,
}

impl Column {
    fn name(&self) -> &'static str {
        match self {
            Column::Text(name, _) | Column::Count(name, _) | Column::Percent(name, _) => *name,
            Column::Key => CANDIDATE_KEY_COLUMN,
            Column::Round => ROUND_COLUMN,
        }
    }

    fn field(&self) -> Field {
        match self {
            Column::Text(name, _) => Field::new(*name, ArrowDataType::Utf8, true),
            Column::Count(name, _) => Field::new(*name, ArrowDataType::Int64, true),
            Column::Percent(name, _) => Field::new(*name, ArrowDataType::Float64, true),
            Column::Key => Field::new(CANDIDATE_KEY_COLUMN, ArrowDataType::UInt32, false),
            Column::Round => Field::new(ROUND_COLUMN, ArrowDataType::UInt8, false),
        }
    }

    fn array(&self, records: &[LongRecord], path: &str) -> EtlResult<ArrayRef> {
        let array: ArrayRef = match self {
            Column::Text(_, f) => Arc::new(StringArray::from(
                records.iter().map(f).collect::<Vec<Option<String>>>(),
            )),
            Column::Count(name, f) => {
                let mut values: Vec<Option<i64>> = Vec::with_capacity(records.len());
                for rec in records.iter() {
                    let value = match f(rec) {
                        None => None,
                        Some(x) => Some(i64::try_from(x).ok().context(CountOutOfRangeSnafu {
                            path,
                            column: *name,
                            line: rec.source_row,
                            value: x,
                        })?),
                    };
                    values.push(value);
                }
                Arc::new(Int64Array::from(values))
            }
            Column::Percent(_, f) => Arc::new(Float64Array::from(
                records.iter().map(f).collect::<Vec<Option<f64>>>(),
            )),
            Column::Key => Arc::new(UInt32Array::from(
                records
                    .iter()
                    .map(|r| r.candidate_key.0)
                    .collect::<Vec<u32>>(),
            )),
            Column::Round => Arc::new(UInt8Array::from(
                records
                    .iter()
                    .map(|r| r.round.number())
                    .collect::<Vec<u8>>(),
            )),
        };
        Ok(array)
    }

    fn csv_value(&self, rec: &LongRecord) -> String {
        match self {
            Column::Text(_, f) => f(rec).unwrap_or_default(),
            Column::Count(_, f) => f(rec).map(|x| x.to_string()).unwrap_or_default(),
            Column::Percent(_, f) => f(rec).map(|x| x.to_string()).unwrap_or_default(),
            Column::Key => rec.candidate_key.0.to_string(),
            Column::Round => rec.round.number().to_string(),
        }
    }
}

fn columns() -> Vec<Column> {
    vec![
        Column::Text(COMMUNE_COLUMNS[0], |r| Some(r.commune.department_code.clone())),
        Column::Text(COMMUNE_COLUMNS[1], |r| Some(r.commune.commune_code.clone())),
        Column::Text(COMMUNE_COLUMNS[2], |r| Some(r.commune.department_label.clone())),
        Column::Text(COMMUNE_COLUMNS[3], |r| Some(r.commune.commune_label.clone())),
        Column::Text(COMMUNE_COLUMNS[4], |r| r.commune.entry_state.clone()),
        Column::Count(COMMUNE_COLUMNS[5], |r| r.commune.registered),
        Column::Count(COMMUNE_COLUMNS[6], |r| r.commune.abstentions),
        Column::Percent(COMMUNE_COLUMNS[7], |r| r.commune.pct_abstentions_registered),
        Column::Count(COMMUNE_COLUMNS[8], |r| r.commune.voters),
        Column::Percent(COMMUNE_COLUMNS[9], |r| r.commune.pct_voters_registered),
        Column::Count(COMMUNE_COLUMNS[10], |r| r.commune.blank),
        Column::Percent(COMMUNE_COLUMNS[11], |r| r.commune.pct_blank_registered),
        Column::Percent(COMMUNE_COLUMNS[12], |r| r.commune.pct_blank_voters),
        Column::Count(COMMUNE_COLUMNS[13], |r| r.commune.null),
        Column::Percent(COMMUNE_COLUMNS[14], |r| r.commune.pct_null_registered),
        Column::Percent(COMMUNE_COLUMNS[15], |r| r.commune.pct_null_voters),
        Column::Count(COMMUNE_COLUMNS[16], |r| r.commune.expressed),
        Column::Percent(COMMUNE_COLUMNS[17], |r| r.commune.pct_expressed_registered),
        Column::Percent(COMMUNE_COLUMNS[18], |r| r.commune.pct_expressed_voters),
        Column::Count(CANDIDATE_COLUMNS[0], |r| r.candidate.panel_number.map(u64::from)),
        Column::Text(CANDIDATE_COLUMNS[1], |r| r.candidate.sex.clone()),
        Column::Text(CANDIDATE_COLUMNS[2], |r| r.candidate.surname.clone()),
        Column::Text(CANDIDATE_COLUMNS[3], |r| r.candidate.given_name.clone()),
        Column::Count(CANDIDATE_COLUMNS[4], |r| r.candidate.votes),
        Column::Percent(CANDIDATE_COLUMNS[5], |r| r.candidate.pct_votes_registered),
        Column::Percent(CANDIDATE_COLUMNS[6], |r| r.candidate.pct_votes_expressed),
        Column::Key,
        Column::Round,
    ]
}

/// Writes the records to `path`, replacing any previous file.
pub fn write_output(path: &str, format: OutputFormat, records: &[LongRecord]) -> EtlResult<()> {
    info!(
        "write_output: writing {} records to {} ({})",
        records.len(),
        path,
        format.name()
    );
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(SinkIoSnafu { path })?;
        }
    }

    let tmp_path = format!("{}.tmp", path);
    let res = match format {
        OutputFormat::Parquet => write_parquet(&tmp_path, records),
        OutputFormat::Csv => write_csv(&tmp_path, records),
    }
    .and_then(|_| fs::rename(&tmp_path, path).context(SinkIoSnafu { path }));

    if res.is_err() && Path::new(&tmp_path).exists() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("write_output: could not remove {}: {}", tmp_path, e);
        }
    }
    res
}

fn write_parquet(path: &str, records: &[LongRecord]) -> EtlResult<()> {
    let cols = columns();
    let schema = Arc::new(ArrowSchema::new(
        cols.iter().map(|c| c.field()).collect::<Vec<Field>>(),
    ));
    let arrays: Vec<ArrayRef> = cols
        .iter()
        .map(|c| c.array(records, path))
        .collect::<EtlResult<Vec<ArrayRef>>>()?;
    let batch = RecordBatch::try_new(schema.clone(), arrays).context(SinkArrowSnafu { path })?;

    let file = File::create(path).context(SinkIoSnafu { path })?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema, Some(props))
        .context(SinkParquetSnafu { path })?;
    writer.write(&batch).context(SinkParquetSnafu { path })?;
    writer.close().context(SinkParquetSnafu { path })?;
    debug!("write_parquet: {} rows written to {}", batch.num_rows(), path);
    Ok(())
}

fn write_csv(path: &str, records: &[LongRecord]) -> EtlResult<()> {
    let cols = columns();
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .context(SinkCsvSnafu { path })?;
    wtr.write_record(cols.iter().map(|c| c.name()))
        .context(SinkCsvSnafu { path })?;
    for rec in records.iter() {
        wtr.write_record(cols.iter().map(|c| c.csv_value(rec)))
            .context(SinkCsvSnafu { path })?;
    }
    wtr.flush().context(SinkIoSnafu { path })?;
    debug!("write_csv: {} rows written to {}", records.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn record(round: Round, key: u32, votes: Option<u64>) -> LongRecord {
        LongRecord {
            round,
            source_row: 2,
            slot: key,
            candidate_key: CandidateKey(key),
            commune: CommuneRecord {
                department_code: "02".to_string(),
                commune_code: "001".to_string(),
                department_label: "Aisne".to_string(),
                commune_label: "Abbécourt".to_string(),
                registered: Some(420),
                pct_blank_voters: Some(1.5),
                ..CommuneRecord::default()
            },
            candidate: match votes {
                Some(v) => CandidateSlot {
                    panel_number: Some(key),
                    surname: Some("MACRON".to_string()),
                    given_name: Some("Emmanuel".to_string()),
                    votes: Some(v),
                    ..CandidateSlot::default()
                },
                None => CandidateSlot::default(),
            },
        }
    }

    #[test]
    fn parquet_columns_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("candidat.parquet");
        let path = path.display().to_string();
        let recs = vec![
            record(Round::First, 1, Some(0)),
            record(Round::First, 2, None),
            record(Round::Second, 1, Some(120)),
        ];
        write_output(&path, OutputFormat::Parquet, &recs).unwrap();
        assert!(!Path::new(&format!("{}.tmp", path)).exists());

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 28);

        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), "Code du département");
        assert_eq!(schema.field(0).data_type(), &ArrowDataType::Utf8);
        assert_eq!(schema.field(26).name(), "candidat");
        assert_eq!(schema.field(27).name(), "tour");

        let codes = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(codes.value(0), "02");

        let (votes_idx, _) = schema.column_with_name("Voix").unwrap();
        let votes = batch
            .column(votes_idx)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert!(votes.is_valid(0));
        assert_eq!(votes.value(0), 0);
        assert!(votes.is_null(1));
        assert_eq!(votes.value(2), 120);

        let rounds = batch
            .column(27)
            .as_any()
            .downcast_ref::<UInt8Array>()
            .unwrap();
        assert_eq!(rounds.values().to_vec(), vec![1, 1, 2]);
    }

    #[test]
    fn csv_header_and_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidat.csv").display().to_string();
        let recs = vec![record(Round::First, 1, Some(7)), record(Round::First, 2, None)];
        write_output(&path, OutputFormat::Csv, &recs).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Code du département;Code de la commune;"));
        assert!(lines[0].ends_with(";candidat;tour"));
        assert!(lines[1].starts_with("02;001;Aisne;Abbécourt;;420;"));
        assert!(lines[1].ends_with(";MACRON;Emmanuel;7;;;1;1"));
        assert!(lines[2].ends_with(";;;;;;;;2;1"));
    }

    #[test]
    fn counts_out_of_range_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidat.parquet").display().to_string();
        let recs = vec![record(Round::First, 1, Some(u64::MAX))];

        let err = write_output(&path, OutputFormat::Parquet, &recs).unwrap_err();
        match err {
            EtlError::CountOutOfRange { column, line, .. } => {
                assert_eq!(column, "Voix");
                assert_eq!(line, 2);
            }
            e => panic!("unexpected error {:?}", e),
        }
        assert!(!Path::new(&path).exists());
        assert!(!Path::new(&format!("{}.tmp", path)).exists());
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // A directory is in the way of the destination.
        let dest = dir.path().join("candidat.parquet");
        fs::create_dir(&dest).unwrap();
        let path = dest.display().to_string();

        let res = write_output(&path, OutputFormat::Parquet, &[record(Round::First, 1, Some(1))]);
        assert!(res.is_err());
        assert!(dest.is_dir());
        assert!(!Path::new(&format!("{}.tmp", path)).exists());
    }
}
