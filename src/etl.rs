use log::{debug, info, warn};

use election_longform::*;
use snafu::prelude::*;

use std::fs;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::etl::config_reader::*;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod sink;

pub use sink::OutputFormat;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EtlError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {worksheet} not found in {path}"))]
    MissingWorksheet { path: String, worksheet: String },
    #[snafu(display("The file {path} has no header row"))]
    EmptyFile { path: String },
    #[snafu(display("Error reading CSV file {path}"))]
    CsvRead { source: csv::Error, path: String },

    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Cannot read a column index from {value}"))]
    ParsingColumnIndex { value: String },
    #[snafu(display("Invalid round {round} for the file {path}"))]
    InvalidRound { round: u64, path: String },
    #[snafu(display("Cannot find the directory of {path}"))]
    MissingParentDir { path: String },

    #[snafu(display("{source}"))]
    Longform { source: LongformError },
    #[snafu(display("Error in {path}: {source}"))]
    ReadingRound { source: LongformError, path: String },

    #[snafu(display("Error writing {path}"))]
    SinkIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error building the table for {path}"))]
    SinkArrow {
        source: arrow::error::ArrowError,
        path: String,
    },
    #[snafu(display("Error writing the parquet file {path}"))]
    SinkParquet {
        source: parquet::errors::ParquetError,
        path: String,
    },
    #[snafu(display("Count {value} in column {column}, line {line}, does not fit in {path}"))]
    CountOutOfRange {
        path: String,
        column: String,
        line: usize,
        value: u64,
    },
    #[snafu(display("Error writing the CSV file {path}"))]
    SinkCsv { source: csv::Error, path: String },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Difference detected between the summary and the reference summary {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type EtlResult<T> = Result<T, EtlError>;

fn validate_rules(rules: &RulesConfig) -> EtlResult<(ReconcileRules, NormalizeRules)> {
    let defaults = ReconcileRules::DEFAULT_RULES;
    let reconcile_rules = ReconcileRules {
        name_matching: match rules.name_matching.as_deref() {
            None => defaults.name_matching,
            Some("exact") => NameMatching::Exact,
            Some("caseInsensitive") => NameMatching::CaseInsensitive,
            Some(x) => whatever!("Unknown nameMatching option {:?}", x),
        },
        ambiguous_name: match rules.ambiguous_candidate.as_deref() {
            None => defaults.ambiguous_name,
            Some("keepFirst") => AmbiguousNamePolicy::KeepFirst,
            Some("fail") => AmbiguousNamePolicy::Fail,
            Some(x) => whatever!("Unknown ambiguousCandidate option {:?}", x),
        },
        unresolved_candidate: match rules.unresolved_candidate.as_deref() {
            None => defaults.unresolved_candidate,
            Some("assignNewKey") => UnresolvedCandidatePolicy::AssignNewKey,
            Some("fail") => UnresolvedCandidatePolicy::Fail,
            Some(x) => whatever!("Unknown unresolvedCandidate option {:?}", x),
        },
    };

    let normalize_defaults = NormalizeRules::DEFAULT_RULES;
    let normalize_rules = NormalizeRules {
        department_code_width: rules
            .department_code_width
            .unwrap_or(normalize_defaults.department_code_width),
        commune_code_width: rules
            .commune_code_width
            .unwrap_or(normalize_defaults.commune_code_width),
    };
    Ok((reconcile_rules, normalize_rules))
}

fn read_round(src: &RoundSource) -> EtlResult<Vec<LongRecord>> {
    let round = src.round()?;
    info!(
        "Attempting to read {} from {:?} ({})",
        round, src.file_path, src.provider
    );
    let table = match src.provider.as_str() {
        "xlsx" => io_excel::read_excel_round(&src.file_path, src)?,
        "csv" => io_csv::read_csv_round(&src.file_path, src)?,
        x => whatever!("Provider not implemented {:?}", x),
    };
    let path = src.file_path.as_str();
    let trailing_width = src.trailing_width(table.width())?;
    let schema = SchemaDescriptor::presidential(trailing_width)
        .map_err(|e| e.with_round(round))
        .context(ReadingRoundSnafu { path })?;
    debug!("read_round: {}: schema: {:?}", round, schema);
    unpivot(&table, round, &schema).context(ReadingRoundSnafu { path })
}

fn round_summary_js(s: &RoundSummary) -> JSValue {
    let candidates: Vec<JSValue> = s
        .candidates
        .iter()
        .map(|c| {
            json!({
                "key": c.key.0,
                "surname": c.surname,
                "givenName": c.given_name,
                "votes": c.votes,
                "communes": c.communes,
            })
        })
        .collect();
    json!({
        "round": s.round.number(),
        "communes": s.communes,
        "records": s.records,
        "emptySlots": s.empty_slots,
        "totals": {
            "registered": s.totals.registered,
            "voters": s.totals.voters,
            "abstentions": s.totals.abstentions,
            "blank": s.totals.blank,
            "null": s.totals.null,
            "expressed": s.totals.expressed,
        },
        "candidates": candidates,
    })
}

fn report_js(report: &ReconcileReport) -> JSValue {
    let names = |l: &[(CandidateName, CandidateKey)]| -> Vec<JSValue> {
        l.iter()
            .map(|(name, key)| {
                json!({"surname": name.surname, "givenName": name.given_name, "key": key.0})
            })
            .collect()
    };
    let ambiguous: Vec<JSValue> = report
        .ambiguous
        .iter()
        .map(|(name, keys)| {
            let keys: Vec<u32> = keys.iter().map(|k| k.0).collect();
            json!({"surname": name.surname, "givenName": name.given_name, "keys": keys})
        })
        .collect();
    let unnamed: Vec<JSValue> = report
        .unnamed_slots
        .iter()
        .map(|(slot, key)| json!({"slot": slot, "key": key.0}))
        .collect();
    json!({
        "matched": names(report.matched.as_slice()),
        "newKeys": names(report.new_keys.as_slice()),
        "ambiguous": ambiguous,
        "unnamedSlots": unnamed,
    })
}

fn build_summary_js(
    format: OutputFormat,
    records: &[LongRecord],
    report: &ReconcileReport,
) -> JSValue {
    let rounds: Vec<JSValue> = summarize(records).iter().map(round_summary_js).collect();
    json!({
        "output": { "format": format.name(), "records": records.len() },
        "rounds": rounds,
        "reconciliation": report_js(report),
    })
}

/// Runs the whole pipeline and returns the summary of the run.
///
/// If a reference summary is provided, the summary must match it exactly.
pub fn run_pipeline(config: &LongformConfig, reference: Option<String>) -> EtlResult<JSValue> {
    info!("run_pipeline: config: {:?}", config);
    let (reconcile_rules, normalize_rules) = validate_rules(&config.rules)?;
    let format = config.output_settings.output_format()?;

    let round1 = read_round(config.source_for_round(Round::First)?)?;
    let round2 = read_round(config.source_for_round(Round::Second)?)?;

    let reconciliation = reconcile(&round1, round2, &reconcile_rules).context(LongformSnafu {})?;
    let report = reconciliation.report;
    info!(
        "run_pipeline: {} candidates matched, {} new keys, {} ambiguous names",
        report.matched.len(),
        report.new_keys.len(),
        report.ambiguous.len()
    );

    let records = normalize(round1, reconciliation.round2, &normalize_rules);
    sink::write_output(&config.output_settings.output_path, format, &records)?;

    let summary_js = build_summary_js(format, &records, &report);
    let pretty_js_stats = serde_json::to_string_pretty(&summary_js).context(SerializingJsonSnafu {})?;
    match config.output_settings.summary_path.as_deref() {
        None => debug!("run_pipeline: summary: {}", pretty_js_stats),
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            fs::write(path, &pretty_js_stats).context(WritingSummarySnafu { path })?;
            info!("run_pipeline: summary written to {}", path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = reference {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu { path: summary_p }.fail();
        }
        info!("run_pipeline: the summary matches {}", summary_p);
    }

    Ok(summary_js)
}

/// Applies the command line options on top of the configuration file, if any.
fn build_config(args: &Args) -> EtlResult<LongformConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => LongformConfig::empty(),
    };

    for (round, path_o) in [(Round::First, &args.round1), (Round::Second, &args.round2)] {
        if let Some(path) = path_o {
            config
                .round_sources
                .retain(|src| src.round_number != round.number() as u64);
            config
                .round_sources
                .push(RoundSource::new(round, path, args.input_type.clone()));
        }
    }
    if let Some(worksheet) = &args.excel_worksheet_name {
        for src in config.round_sources.iter_mut() {
            src.excel_worksheet_name = Some(worksheet.clone());
        }
    }

    if let Some(out) = &args.out {
        config.output_settings.output_path = out.clone();
    }
    if let Some(format) = &args.output_format {
        config.output_settings.format = Some(format.clone());
    }
    if let Some(summary) = &args.summary {
        config.output_settings.summary_path = Some(summary.clone());
    }
    if args.fail_on_unresolved {
        config.rules.unresolved_candidate = Some("fail".to_string());
    }
    if args.case_insensitive_names {
        config.rules.name_matching = Some("caseInsensitive".to_string());
    }

    if config.round_sources.is_empty() {
        whatever!("No input files: pass --config, or --round1 and --round2");
    }
    Ok(config)
}

pub fn run(args: &Args) -> EtlResult<()> {
    let config = build_config(args)?;
    run_pipeline(&config, args.reference.clone())?;
    Ok(())
}
