use crate::etl::*;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

use std::fs;
use std::path::{Path, PathBuf};

/// Where the long table is written when no output path is given.
pub const DEFAULT_OUTPUT_PATH: &str = "parquets/candidat.parquet";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputPath")]
    pub output_path: String,
    /// `parquet` (default) or `csv`.
    #[serde(rename = "format")]
    pub format: Option<String>,
    /// A file path or `stdout`.
    #[serde(rename = "summaryPath")]
    pub summary_path: Option<String>,
}

impl OutputSettings {
    pub fn output_format(&self) -> EtlResult<OutputFormat> {
        match self.format.as_deref() {
            None | Some("parquet") => Ok(OutputFormat::Parquet),
            Some("csv") => Ok(OutputFormat::Csv),
            Some(x) => whatever!("Output format not implemented {:?}", x),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RoundSource {
    #[serde(rename = "round")]
    pub round_number: u64,
    /// `xlsx` or `csv`.
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// The last column of the candidate blocks, starting at 1. Either a number or
    /// an Excel column name (`CY`).
    #[serde(rename = "lastColumnIndex")]
    pub last_column_index: Option<JSValue>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "delimiter")]
    pub delimiter: Option<String>,
}

impl RoundSource {
    pub fn new(round: Round, file_path: &str, provider: Option<String>) -> RoundSource {
        RoundSource {
            round_number: round.number() as u64,
            provider: provider.unwrap_or_else(|| guess_provider(file_path)),
            file_path: file_path.to_string(),
            last_column_index: None,
            excel_worksheet_name: None,
            delimiter: None,
        }
    }

    pub fn round(&self) -> EtlResult<Round> {
        Round::from_number(self.round_number).context(InvalidRoundSnafu {
            round: self.round_number,
            path: self.file_path.clone(),
        })
    }

    pub fn last_column_index_int(&self) -> EtlResult<Option<usize>> {
        match &self.last_column_index {
            None | Some(JSValue::Null) => Ok(None),
            x => read_js_int(x).map(Some),
        }
    }

    /// The number of candidate columns, from the last column index if it is
    /// provided, or else from the width of the file.
    pub fn trailing_width(&self, table_width: usize) -> EtlResult<usize> {
        let prefix = COMMUNE_COLUMNS.len();
        match self.last_column_index_int()? {
            Some(last) if last >= prefix => Ok(last - prefix),
            Some(last) => whatever!(
                "lastColumnIndex {} of {} falls inside the {} commune columns",
                last,
                self.file_path,
                prefix
            ),
            None => Ok(table_width.saturating_sub(prefix)),
        }
    }

    pub fn delimiter_byte(&self) -> EtlResult<u8> {
        match self.delimiter.as_deref() {
            None => Ok(b';'),
            Some("\\t") | Some("\t") => Ok(b'\t'),
            Some(s) if s.len() == 1 => Ok(s.as_bytes()[0]),
            Some(s) => whatever!("The CSV delimiter must be a single character, got {:?}", s),
        }
    }
}

fn guess_provider(file_path: &str) -> String {
    if file_path.to_lowercase().ends_with(".csv") {
        "csv".to_string()
    } else {
        "xlsx".to_string()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    /// `exact` (default) or `caseInsensitive`.
    #[serde(rename = "nameMatching")]
    pub name_matching: Option<String>,
    /// `keepFirst` (default) or `fail`.
    #[serde(rename = "ambiguousCandidate")]
    pub ambiguous_candidate: Option<String>,
    /// `assignNewKey` (default) or `fail`.
    #[serde(rename = "unresolvedCandidate")]
    pub unresolved_candidate: Option<String>,
    #[serde(rename = "departmentCodeWidth")]
    pub department_code_width: Option<usize>,
    #[serde(rename = "communeCodeWidth")]
    pub commune_code_width: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LongformConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "roundSources")]
    pub round_sources: Vec<RoundSource>,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl LongformConfig {
    /// The configuration used when no configuration file is given.
    pub fn empty() -> LongformConfig {
        LongformConfig {
            output_settings: OutputSettings {
                output_path: DEFAULT_OUTPUT_PATH.to_string(),
                format: None,
                summary_path: None,
            },
            round_sources: vec![],
            rules: RulesConfig::default(),
        }
    }

    /// The source of the given round. There must be exactly one.
    pub fn source_for_round(&self, round: Round) -> EtlResult<&RoundSource> {
        let mut found: Vec<&RoundSource> = vec![];
        for src in self.round_sources.iter() {
            if src.round()? == round {
                found.push(src);
            }
        }
        match found.as_slice() {
            [src] => Ok(*src),
            [] => whatever!("No input file for {}", round),
            _ => whatever!("Several input files for {}: {:?}", round, found),
        }
    }
}

/// Reads a configuration file. Relative paths in the file are resolved against
/// the directory of the configuration file.
pub fn read_config(path: &str) -> EtlResult<LongformConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: LongformConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);

    let root = Path::new(path).parent().context(MissingParentDirSnafu { path })?;
    for src in config.round_sources.iter_mut() {
        src.file_path = resolve_path(root, &src.file_path);
    }
    config.output_settings.output_path = resolve_path(root, &config.output_settings.output_path);
    if let Some(p) = config.output_settings.summary_path.clone() {
        if p != "stdout" {
            config.output_settings.summary_path = Some(resolve_path(root, &p));
        }
    }
    Ok(config)
}

fn resolve_path(root: &Path, p: &str) -> String {
    let res: PathBuf = root.join(p);
    res.as_path().display().to_string()
}

pub fn read_summary(path: &str) -> EtlResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

fn read_js_int(x: &Option<JSValue>) -> EtlResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingColumnIndexSnafu {
                value: n.to_string(),
            }),
        // Excel-style column names: A is 1, Z is 26, AA is 27.
        Some(JSValue::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            s.to_ascii_uppercase()
                .bytes()
                .try_fold(0usize, |acc, b| {
                    acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
                })
                .context(ParsingColumnIndexSnafu { value: s.clone() })
        }
        Some(JSValue::String(s)) => s
            .trim()
            .parse::<usize>()
            .ok()
            .context(ParsingColumnIndexSnafu { value: s.clone() }),
        x => None.context(ParsingColumnIndexSnafu {
            value: format!("{:?}", x),
        }),
    }
}
