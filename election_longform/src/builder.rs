pub use crate::config::*;

use log::debug;

/// A builder for assembling a round table row by row.
///
/// Readers use it to present a file as a [`RawRoundTable`], and it is the
/// simplest way to describe small tables by hand.
///
/// ```
/// use election_longform::builder::RoundTableBuilder;
/// use election_longform::{unpivot, Round, SchemaDescriptor};
/// # use election_longform::LongformError;
///
/// let mut builder = RoundTableBuilder::new().presidential_header(1);
/// builder.add_row_text(&[
///     "01", "001", "Ain", "L'Abergement-Clémenciat", "Complet", "643", "90", "14", "553", "86",
///     "5", "0,78", "0,9", "2", "0,31", "0,36", "546", "84,91", "98,73",
///     "1", "F", "ARTHAUD", "Nathalie", "3", "0,47", "0,55",
/// ]);
/// let table = builder.build();
///
/// let records = unpivot(&table, Round::First, &SchemaDescriptor::presidential(7)?)?;
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].candidate.votes, Some(3));
///
/// # Ok::<(), LongformError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoundTableBuilder {
    pub(crate) _header: Vec<Option<String>>,
    pub(crate) _rows: Vec<Vec<CellValue>>,
}

impl RoundTableBuilder {
    pub fn new() -> RoundTableBuilder {
        RoundTableBuilder::default()
    }

    /// Sets the header. Empty names are treated as unnamed columns.
    pub fn header(self, names: &[&str]) -> RoundTableBuilder {
        RoundTableBuilder {
            _header: names
                .iter()
                .map(|s| match s.trim() {
                    "" => None,
                    t => Some(t.to_string()),
                })
                .collect(),
            _rows: self._rows,
        }
    }

    /// Sets the header the way the published files write it: the commune
    /// columns, the names of the first candidate block, then unnamed columns
    /// for the other `groups - 1` blocks.
    pub fn presidential_header(self, groups: usize) -> RoundTableBuilder {
        let mut header: Vec<Option<String>> =
            COMMUNE_COLUMNS.iter().map(|s| Some(s.to_string())).collect();
        for group in 0..groups {
            for name in CANDIDATE_COLUMNS.iter() {
                if group == 0 {
                    header.push(Some(name.to_string()));
                } else {
                    header.push(None);
                }
            }
        }
        RoundTableBuilder {
            _header: header,
            _rows: self._rows,
        }
    }

    pub fn add_row(&mut self, cells: Vec<CellValue>) {
        self._rows.push(cells);
    }

    /// Adds a row of text cells. Empty strings become empty cells.
    pub fn add_row_text(&mut self, cells: &[&str]) {
        let row = cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(s.to_string())
                }
            })
            .collect();
        self.add_row(row);
    }

    pub fn num_rows(&self) -> usize {
        self._rows.len()
    }

    /// Assembles the table. Rows with data past the header extend it with
    /// unnamed columns, so that no value is left without a column. Trailing
    /// empty cells do not count.
    pub fn build(self) -> RawRoundTable {
        let mut header = self._header;
        let width = self
            ._rows
            .iter()
            .filter_map(|r| r.iter().rposition(|c| !c.is_empty()))
            .map(|idx| idx + 1)
            .max()
            .unwrap_or(0);
        if width > header.len() {
            debug!(
                "build: extending the header from {} to {} columns",
                header.len(),
                width
            );
            header.resize(width, None);
        }
        RawRoundTable {
            header,
            rows: self._rows,
        }
    }
}
