// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;
use std::ops::Range;

/// The names of the commune columns, in the order in which they appear in the
/// published result files.
pub const COMMUNE_COLUMNS: [&str; 19] = [
    "Code du département",
    "Code de la commune",
    "Libellé du département",
    "Libellé de la commune",
    "Etat saisie",
    "Inscrits",
    "Abstentions",
    "% Abs/Ins",
    "Votants",
    "% Vot/Ins",
    "Blancs",
    "% Blancs/Ins",
    "% Blancs/Vot",
    "Nuls",
    "% Nuls/Ins",
    "% Nuls/Vot",
    "Exprimés",
    "% Exp/Ins",
    "% Exp/Vot",
];

/// The names of the fields of one candidate block.
pub const CANDIDATE_COLUMNS: [&str; 7] = [
    "N°Panneau",
    "Sexe",
    "Nom",
    "Prénom",
    "Voix",
    "% Voix/Ins",
    "% Voix/Exp",
];

pub const CANDIDATE_KEY_COLUMN: &str = "candidat";
pub const ROUND_COLUMN: &str = "tour";

/// Number of columns in a candidate block.
pub const DEFAULT_STRIDE: usize = CANDIDATE_COLUMNS.len();

/// One cell of a round file, as presented by a reader.
///
/// Readers convert whatever their format stores into one of these variants.
/// Spreadsheets frequently store identifiers such as department codes as
/// numbers, so the text form of a cell is always obtained through
/// [`CellValue::to_text`].
#[derive(PartialEq, Debug, Clone)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    /// The canonical text of a cell. Integral floats are printed without a
    /// fractional part, so that a code read as `2.0` becomes `"2"`.
    /// Returns `None` for empty cells and for text made only of whitespace.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", *f as i64))
            }
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_text().is_none()
    }
}

/// A round file, before unpivoting: the header row and all the data rows.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RawRoundTable {
    /// The column names. Repeated candidate columns are usually unnamed.
    pub header: Vec<Option<String>>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawRoundTable {
    pub fn width(&self) -> usize {
        self.header.len()
    }
}

/// The round of the election.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Round {
    First,
    Second,
}

impl Round {
    pub fn number(&self) -> u8 {
        match self {
            Round::First => 1,
            Round::Second => 2,
        }
    }

    pub fn from_number(n: u64) -> Option<Round> {
        match n {
            1 => Some(Round::First),
            2 => Some(Round::Second),
            _ => None,
        }
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "round {}", self.number())
    }
}

/// The layout of a round file: a fixed block of named commune columns, followed
/// by `trailing_width` columns grouped in candidate blocks of `stride` columns.
///
/// The block size is the one of the published files, [`DEFAULT_STRIDE`].
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SchemaDescriptor {
    prefix_width: usize,
    trailing_width: usize,
    stride: usize,
    commune_columns: Vec<String>,
}

impl SchemaDescriptor {
    pub fn new(
        commune_columns: &[&str],
        trailing_width: usize,
    ) -> Result<SchemaDescriptor, LongformError> {
        if trailing_width % DEFAULT_STRIDE != 0 {
            return Err(LongformError::Schema {
                round: None,
                message: format!(
                    "{} trailing columns is not a multiple of the candidate block size {}",
                    trailing_width, DEFAULT_STRIDE
                ),
            });
        }
        Ok(SchemaDescriptor {
            prefix_width: commune_columns.len(),
            trailing_width,
            stride: DEFAULT_STRIDE,
            commune_columns: commune_columns.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// The layout of the published files: 19 commune columns and blocks of 7.
    pub fn presidential(trailing_width: usize) -> Result<SchemaDescriptor, LongformError> {
        SchemaDescriptor::new(&COMMUNE_COLUMNS, trailing_width)
    }

    pub fn prefix_width(&self) -> usize {
        self.prefix_width
    }

    pub fn trailing_width(&self) -> usize {
        self.trailing_width
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn commune_columns(&self) -> &[String] {
        &self.commune_columns
    }

    pub fn total_width(&self) -> usize {
        self.prefix_width + self.trailing_width
    }

    pub fn group_count(&self) -> usize {
        self.trailing_width / self.stride
    }

    /// The columns of the candidate block `group` (starting at 1).
    pub fn group_columns(&self, group: usize) -> Range<usize> {
        let start = self.prefix_width + (group - 1) * self.stride;
        start..start + self.stride
    }

    /// A readable label for a column: the commune column name, or the candidate
    /// field name followed by the block number (`Voix#3`).
    pub fn column_label(&self, idx: usize) -> String {
        if idx < self.prefix_width {
            return self.commune_columns[idx].clone();
        }
        let offset = idx - self.prefix_width;
        let group = offset / self.stride + 1;
        format!("{}#{}", CANDIDATE_COLUMNS[offset % self.stride], group)
    }
}

// ******** Output data structures *********

/// The stable identifier of a candidate across rounds.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CandidateKey(pub u32);

/// The commune fields of one row of a round file.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct CommuneRecord {
    pub department_code: String,
    pub commune_code: String,
    pub department_label: String,
    pub commune_label: String,
    pub entry_state: Option<String>,
    pub registered: Option<u64>,
    pub abstentions: Option<u64>,
    pub pct_abstentions_registered: Option<f64>,
    pub voters: Option<u64>,
    pub pct_voters_registered: Option<f64>,
    pub blank: Option<u64>,
    pub pct_blank_registered: Option<f64>,
    pub pct_blank_voters: Option<f64>,
    pub null: Option<u64>,
    pub pct_null_registered: Option<f64>,
    pub pct_null_voters: Option<f64>,
    pub expressed: Option<u64>,
    pub pct_expressed_registered: Option<f64>,
    pub pct_expressed_voters: Option<f64>,
}

/// The fields of one candidate block. A slot that was not used in a commune
/// has all its fields set to `None`: it did not run there, which is different
/// from getting zero votes.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct CandidateSlot {
    pub panel_number: Option<u32>,
    pub sex: Option<String>,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub votes: Option<u64>,
    pub pct_votes_registered: Option<f64>,
    pub pct_votes_expressed: Option<f64>,
}

impl CandidateSlot {
    pub fn is_empty(&self) -> bool {
        self == &CandidateSlot::default()
    }

    pub fn has_name(&self) -> bool {
        self.surname.is_some() || self.given_name.is_some()
    }
}

/// One row of the long table: one commune, one candidate, one round.
#[derive(PartialEq, Debug, Clone)]
pub struct LongRecord {
    pub round: Round,
    /// Line in the source file (the header is line 1). Only used for reporting.
    pub source_row: usize,
    /// Position of the candidate block in the row, starting at 1.
    pub slot: u32,
    pub candidate_key: CandidateKey,
    pub commune: CommuneRecord,
    pub candidate: CandidateSlot,
}

/// Errors that prevent the pipeline from completing successfully.
#[derive(PartialEq, Debug, Clone)]
pub enum LongformError {
    /// The layout of a file does not match the expected columns.
    Schema {
        round: Option<Round>,
        message: String,
    },
    /// A cell could not be read: a missing code, or a number that does not parse.
    InvalidCell {
        round: Round,
        line: usize,
        column: String,
        content: String,
        reason: String,
    },
    /// A candidate of the second round could not be found in the first round.
    UnresolvedCandidate {
        round: Round,
        line: usize,
        surname: String,
        given_name: String,
    },
    /// The same name maps to several candidates of the first round.
    AmbiguousCandidate {
        round: Round,
        surname: String,
        given_name: String,
        keys: Vec<u32>,
    },
}

impl LongformError {
    /// Attaches the round to a schema error raised before the round was known.
    pub fn with_round(self, round: Round) -> LongformError {
        match self {
            LongformError::Schema {
                round: None,
                message,
            } => LongformError::Schema {
                round: Some(round),
                message,
            },
            e => e,
        }
    }
}

impl Error for LongformError {}

impl Display for LongformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LongformError::Schema {
                round: Some(round),
                message,
            } => write!(f, "Schema error in {}: {}", round, message),
            LongformError::Schema {
                round: None,
                message,
            } => write!(f, "Schema error: {}", message),
            LongformError::InvalidCell {
                round,
                line,
                column,
                content,
                reason,
            } => write!(
                f,
                "Invalid cell in {}, line {}, column {}: {:?}: {}",
                round, line, column, content, reason
            ),
            LongformError::UnresolvedCandidate {
                round,
                line,
                surname,
                given_name,
            } => write!(
                f,
                "Unresolved candidate in {}, line {}: {} {} does not appear in round 1",
                round, line, given_name, surname
            ),
            LongformError::AmbiguousCandidate {
                round,
                surname,
                given_name,
                keys,
            } => write!(
                f,
                "Ambiguous candidate in {}: {} {} matches the candidates {:?}",
                round, given_name, surname, keys
            ),
        }
    }
}

// ********* Configuration **********

/// How the names of the candidates are compared between the rounds.
/// Both modes trim the names. Accents are compared as they are written.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum NameMatching {
    Exact,
    CaseInsensitive,
}

/// What to do when one name matches several candidates of the first round.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AmbiguousNamePolicy {
    /// Use the candidate with the lowest block number, and log a warning.
    KeepFirst,
    Fail,
}

/// What to do with a second-round candidate that is not in the first round.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UnresolvedCandidatePolicy {
    /// Give the candidate a key that is not used in the first round, and log a warning.
    AssignNewKey,
    Fail,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReconcileRules {
    pub name_matching: NameMatching,
    pub ambiguous_name: AmbiguousNamePolicy,
    pub unresolved_candidate: UnresolvedCandidatePolicy,
}

impl ReconcileRules {
    pub const DEFAULT_RULES: ReconcileRules = ReconcileRules {
        name_matching: NameMatching::Exact,
        ambiguous_name: AmbiguousNamePolicy::KeepFirst,
        unresolved_candidate: UnresolvedCandidatePolicy::AssignNewKey,
    };
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizeRules {
    /// Numeric department codes are padded with zeros up to this width.
    pub department_code_width: usize,
    /// Numeric commune codes are padded with zeros up to this width.
    pub commune_code_width: usize,
}

impl NormalizeRules {
    pub const DEFAULT_RULES: NormalizeRules = NormalizeRules {
        department_code_width: 2,
        commune_code_width: 3,
    };
}
