pub mod builder;
mod config;
pub mod manual;
mod summary;

use log::{debug, info, warn};

use std::collections::{BTreeSet, HashMap, HashSet};

pub use crate::config::*;
pub use crate::summary::*;

// **** Private structures ****

static EMPTY_CELL: CellValue = CellValue::Empty;

// The comparison key of a candidate name: (surname, given name), normalized.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
struct NameKey(String, String);

impl NameKey {
    fn of(slot: &CandidateSlot, matching: NameMatching) -> NameKey {
        let norm = |s: &Option<String>| {
            let t = s.as_deref().unwrap_or("").trim();
            match matching {
                NameMatching::Exact => t.to_string(),
                NameMatching::CaseInsensitive => t.to_lowercase(),
            }
        };
        NameKey(norm(&slot.surname), norm(&slot.given_name))
    }
}

/// The cells of one source row, with the context needed to report errors.
struct RowCells<'a> {
    round: Round,
    line: usize,
    row: &'a [CellValue],
    schema: &'a SchemaDescriptor,
}

impl<'a> RowCells<'a> {
    fn cell(&self, idx: usize) -> &CellValue {
        // Short rows are padded with empty cells.
        self.row.get(idx).unwrap_or(&EMPTY_CELL)
    }

    fn text(&self, idx: usize) -> Option<String> {
        self.cell(idx).to_text()
    }

    fn invalid(&self, idx: usize, reason: &str) -> LongformError {
        LongformError::InvalidCell {
            round: self.round,
            line: self.line,
            column: self.schema.column_label(idx),
            content: self.text(idx).unwrap_or_default(),
            reason: reason.to_string(),
        }
    }

    fn required_text(&self, idx: usize) -> Result<String, LongformError> {
        self.text(idx)
            .ok_or_else(|| self.invalid(idx, "a value is required"))
    }

    fn number(&self, idx: usize) -> Result<Option<f64>, LongformError> {
        match self.cell(idx) {
            CellValue::Int(i) => Ok(Some(*i as f64)),
            CellValue::Float(f) => Ok(Some(*f)),
            CellValue::Text(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                if cleaned.is_empty() {
                    Ok(None)
                } else {
                    cleaned
                        .parse::<f64>()
                        .map(Some)
                        .map_err(|_| self.invalid(idx, "not a number"))
                }
            }
            CellValue::Empty => Ok(None),
            CellValue::Bool(_) => Err(self.invalid(idx, "not a number")),
        }
    }

    fn count(&self, idx: usize) -> Result<Option<u64>, LongformError> {
        match self.number(idx)? {
            None => Ok(None),
            // Counts are written as signed 64-bit integers.
            Some(x) if x >= 0.0 && x.fract() == 0.0 && x < i64::MAX as f64 => Ok(Some(x as u64)),
            Some(_) => Err(self.invalid(idx, "not a whole non-negative number in range")),
        }
    }

    /// Cells after the declared columns are only allowed under a named header
    /// column. Anything else is candidate data that the layout would drop.
    fn check_overflow(&self, header: &[Option<String>]) -> Result<(), LongformError> {
        let start = self.schema.total_width();
        let first = self
            .row
            .iter()
            .enumerate()
            .skip(start)
            .find(|(idx, c)| !c.is_empty() && header.get(*idx).map_or(true, |h| h.is_none()));
        match first {
            None => Ok(()),
            Some((idx, _)) => Err(LongformError::Schema {
                round: Some(self.round),
                message: format!(
                    "line {}: unnamed column {} holds data, but the layout stops at column {} ({} candidate blocks)",
                    self.line,
                    idx + 1,
                    start,
                    self.schema.group_count()
                ),
            }),
        }
    }

    fn commune(&self) -> Result<CommuneRecord, LongformError> {
        Ok(CommuneRecord {
            department_code: self.required_text(0)?,
            commune_code: self.required_text(1)?,
            department_label: self.text(2).unwrap_or_default(),
            commune_label: self.text(3).unwrap_or_default(),
            entry_state: self.text(4),
            registered: self.count(5)?,
            abstentions: self.count(6)?,
            pct_abstentions_registered: self.number(7)?,
            voters: self.count(8)?,
            pct_voters_registered: self.number(9)?,
            blank: self.count(10)?,
            pct_blank_registered: self.number(11)?,
            pct_blank_voters: self.number(12)?,
            null: self.count(13)?,
            pct_null_registered: self.number(14)?,
            pct_null_voters: self.number(15)?,
            expressed: self.count(16)?,
            pct_expressed_registered: self.number(17)?,
            pct_expressed_voters: self.number(18)?,
        })
    }

    fn candidate(&self, group: usize) -> Result<CandidateSlot, LongformError> {
        let start = self.schema.group_columns(group).start;
        let panel_number = match self.count(start)? {
            Some(n) => Some(
                u32::try_from(n).map_err(|_| self.invalid(start, "panel number out of range"))?,
            ),
            None => None,
        };
        Ok(CandidateSlot {
            panel_number,
            sex: self.text(start + 1),
            surname: self.text(start + 2),
            given_name: self.text(start + 3),
            votes: self.count(start + 4)?,
            pct_votes_registered: self.number(start + 5)?,
            pct_votes_expressed: self.number(start + 6)?,
        })
    }
}

fn check_header(
    table: &RawRoundTable,
    round: Round,
    schema: &SchemaDescriptor,
) -> Result<(), LongformError> {
    if schema.prefix_width() != COMMUNE_COLUMNS.len() {
        return Err(LongformError::Schema {
            round: Some(round),
            message: format!(
                "expected {} commune columns, the layout declares {}",
                COMMUNE_COLUMNS.len(),
                schema.prefix_width()
            ),
        });
    }
    if table.width() < schema.total_width() {
        return Err(LongformError::Schema {
            round: Some(round),
            message: format!(
                "the file has {} columns, expected {} commune columns and {} candidate columns",
                table.width(),
                schema.prefix_width(),
                schema.trailing_width()
            ),
        });
    }
    for (idx, expected) in schema.commune_columns().iter().enumerate() {
        let found = table.header[idx].as_deref().map(|s| s.trim());
        if found != Some(expected.as_str()) {
            return Err(LongformError::Schema {
                round: Some(round),
                message: format!(
                    "missing commune column {:?}: found {:?} at position {}",
                    expected,
                    found,
                    idx + 1
                ),
            });
        }
    }
    if table.width() > schema.total_width() {
        warn!(
            "check_header: {}: ignoring {} columns after column {}",
            round,
            table.width() - schema.total_width(),
            schema.total_width()
        );
    }
    Ok(())
}

/// Converts one round table from the wide layout to the long layout.
///
/// Every row produces one record per candidate block, in column order. The
/// candidate key of each record is provisionally the block number (starting at
/// 1): it is only meaningful within this round until [`reconcile`] is applied.
///
/// Arguments:
/// * `table` the round file
/// * `round` the round that this file describes
/// * `schema` the layout of the file
pub fn unpivot(
    table: &RawRoundTable,
    round: Round,
    schema: &SchemaDescriptor,
) -> Result<Vec<LongRecord>, LongformError> {
    info!(
        "unpivot: {}: {} rows, {} columns, {} candidate blocks",
        round,
        table.rows.len(),
        table.width(),
        schema.group_count()
    );
    check_header(table, round, schema)?;

    let groups = schema.group_count();
    let mut res: Vec<LongRecord> = Vec::with_capacity(table.rows.len() * groups);
    for (idx, row) in table.rows.iter().enumerate() {
        let cells = RowCells {
            round,
            // The header is the first line.
            line: idx + 2,
            row,
            schema,
        };
        cells.check_overflow(&table.header)?;
        let commune = cells.commune()?;
        for group in 1..=groups {
            let candidate = cells.candidate(group)?;
            res.push(LongRecord {
                round,
                source_row: cells.line,
                slot: group as u32,
                candidate_key: CandidateKey(group as u32),
                commune: commune.clone(),
                candidate,
            });
        }
    }
    debug!("unpivot: {}: produced {} records", round, res.len());
    Ok(res)
}

/// A candidate name, as written in the file (trimmed).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateName {
    pub surname: String,
    pub given_name: String,
}

impl CandidateName {
    fn of(slot: &CandidateSlot) -> CandidateName {
        CandidateName {
            surname: slot.surname.clone().unwrap_or_default(),
            given_name: slot.given_name.clone().unwrap_or_default(),
        }
    }
}

/// What happened to the candidates of the second round.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Candidates found in the first round, with their key.
    pub matched: Vec<(CandidateName, CandidateKey)>,
    /// Candidates absent from the first round, with the new key they received.
    pub new_keys: Vec<(CandidateName, CandidateKey)>,
    /// Names that matched several candidates of the first round.
    pub ambiguous: Vec<(CandidateName, Vec<CandidateKey>)>,
    /// Unnamed blocks that could not be tied to a named candidate, by block number.
    pub unnamed_slots: Vec<(u32, CandidateKey)>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Reconciliation {
    pub round2: Vec<LongRecord>,
    pub report: ReconcileReport,
}

/// Gives the candidates of the second round the keys of the first round.
///
/// The candidates are matched by (surname, given name), compared according to
/// `rules.name_matching`. The records of the first round are not modified.
pub fn reconcile(
    round1: &[LongRecord],
    round2: Vec<LongRecord>,
    rules: &ReconcileRules,
) -> Result<Reconciliation, LongformError> {
    info!(
        "reconcile: {} records in round 1, {} records in round 2, rules: {:?}",
        round1.len(),
        round2.len(),
        rules
    );
    if let Some(r) = round1.iter().find(|r| r.round != Round::First) {
        return Err(LongformError::Schema {
            round: Some(r.round),
            message: format!("line {}: expected a record of round 1", r.source_row),
        });
    }
    if let Some(r) = round2.iter().find(|r| r.round != Round::Second) {
        return Err(LongformError::Schema {
            round: Some(r.round),
            message: format!("line {}: expected a record of round 2", r.source_row),
        });
    }

    let mut report = ReconcileReport::default();

    // Name -> first-round key. Conflicting keys are collected in first-seen order.
    let mut index: HashMap<NameKey, CandidateKey> = HashMap::new();
    let mut conflicts: Vec<(NameKey, CandidateName, BTreeSet<CandidateKey>)> = Vec::new();
    for rec in round1.iter().filter(|r| r.candidate.has_name()) {
        let name = NameKey::of(&rec.candidate, rules.name_matching);
        match index.get(&name).cloned() {
            None => {
                index.insert(name, rec.candidate_key);
            }
            Some(key) if key == rec.candidate_key => {}
            Some(key) => {
                if let Some(entry) = conflicts.iter_mut().find(|(n, _, _)| *n == name) {
                    entry.2.insert(rec.candidate_key);
                } else {
                    let keys: BTreeSet<CandidateKey> =
                        [key, rec.candidate_key].iter().cloned().collect();
                    conflicts.push((name.clone(), CandidateName::of(&rec.candidate), keys));
                }
                index.insert(name, key.min(rec.candidate_key));
            }
        }
    }
    debug!("reconcile: {} names in round 1", index.len());

    for (_, cname, keys) in conflicts.into_iter() {
        let keys: Vec<CandidateKey> = keys.into_iter().collect();
        match rules.ambiguous_name {
            AmbiguousNamePolicy::Fail => {
                return Err(LongformError::AmbiguousCandidate {
                    round: Round::First,
                    surname: cname.surname,
                    given_name: cname.given_name,
                    keys: keys.iter().map(|k| k.0).collect(),
                });
            }
            AmbiguousNamePolicy::KeepFirst => {
                warn!(
                    "reconcile: {} {} appears under the candidates {:?} in round 1, using {:?}",
                    cname.given_name, cname.surname, keys, keys[0]
                );
                report.ambiguous.push((cname, keys));
            }
        }
    }

    let mut next_key: u32 = round1
        .iter()
        .map(|r| r.candidate_key.0)
        .max()
        .unwrap_or(0)
        + 1;

    let mut res = round2;
    let mut new_names: HashMap<NameKey, CandidateKey> = HashMap::new();
    let mut matched_names: HashMap<NameKey, CandidateKey> = HashMap::new();
    // The key given to each block number, from the first named record in that block.
    let mut slot_keys: HashMap<u32, CandidateKey> = HashMap::new();
    let mut unnamed: Vec<usize> = Vec::new();

    for (idx, rec) in res.iter_mut().enumerate() {
        if !rec.candidate.has_name() {
            unnamed.push(idx);
            continue;
        }
        let name = NameKey::of(&rec.candidate, rules.name_matching);
        let key = if let Some(key) = index.get(&name) {
            if !matched_names.contains_key(&name) {
                matched_names.insert(name, *key);
                report
                    .matched
                    .push((CandidateName::of(&rec.candidate), *key));
            }
            *key
        } else if let Some(key) = new_names.get(&name) {
            *key
        } else {
            let cname = CandidateName::of(&rec.candidate);
            match rules.unresolved_candidate {
                UnresolvedCandidatePolicy::Fail => {
                    return Err(LongformError::UnresolvedCandidate {
                        round: rec.round,
                        line: rec.source_row,
                        surname: cname.surname,
                        given_name: cname.given_name,
                    });
                }
                UnresolvedCandidatePolicy::AssignNewKey => {
                    let key = CandidateKey(next_key);
                    next_key += 1;
                    warn!(
                        "reconcile: {} {} (line {}) is not a candidate of round 1, assigning new key {:?}",
                        cname.given_name, cname.surname, rec.source_row, key
                    );
                    new_names.insert(name, key);
                    report.new_keys.push((cname, key));
                    key
                }
            }
        };
        slot_keys.entry(rec.slot).or_insert(key);
        rec.candidate_key = key;
    }

    // Unnamed blocks follow the candidate that uses the same block elsewhere in
    // the round, unless that candidate already appears in the same row.
    let mut row_keys: HashMap<usize, HashSet<CandidateKey>> = HashMap::new();
    for rec in res.iter().filter(|r| r.candidate.has_name()) {
        row_keys
            .entry(rec.source_row)
            .or_default()
            .insert(rec.candidate_key);
    }
    // Fresh keys for the unnamed blocks, by block number.
    let mut fresh_keys: HashMap<u32, CandidateKey> = HashMap::new();
    for idx in unnamed {
        let rec = &mut res[idx];
        let used = row_keys.entry(rec.source_row).or_default();
        let key = match slot_keys.get(&rec.slot) {
            Some(key) if !used.contains(key) => *key,
            _ => match fresh_keys.get(&rec.slot) {
                Some(key) => *key,
                None => {
                    let key = CandidateKey(next_key);
                    next_key += 1;
                    warn!(
                        "reconcile: block {} (line {}) has no candidate name in {}, assigning new key {:?}",
                        rec.slot, rec.source_row, rec.round, key
                    );
                    fresh_keys.insert(rec.slot, key);
                    report.unnamed_slots.push((rec.slot, key));
                    key
                }
            },
        };
        used.insert(key);
        rec.candidate_key = key;
    }

    info!(
        "reconcile: {} candidates matched, {} new keys, {} ambiguous names",
        report.matched.len(),
        report.new_keys.len(),
        report.ambiguous.len()
    );
    Ok(Reconciliation {
        round2: res,
        report,
    })
}

/// Pads a purely numeric code with zeros on the left, up to `width`.
/// Other codes (Corsica `2A`, overseas `ZA`, ...) are returned as they are.
pub fn pad_code(code: &str, width: usize) -> String {
    let code = code.trim();
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) && code.len() < width {
        format!("{:0>width$}", code, width = width)
    } else {
        code.to_string()
    }
}

fn trim_opt(s: Option<String>) -> Option<String> {
    s.map(|x| x.trim().to_string()).filter(|x| !x.is_empty())
}

fn normalize_record(rec: LongRecord, rules: &NormalizeRules) -> LongRecord {
    let commune = CommuneRecord {
        department_code: pad_code(&rec.commune.department_code, rules.department_code_width),
        commune_code: pad_code(&rec.commune.commune_code, rules.commune_code_width),
        department_label: rec.commune.department_label.trim().to_string(),
        commune_label: rec.commune.commune_label.trim().to_string(),
        entry_state: trim_opt(rec.commune.entry_state),
        ..rec.commune
    };
    let candidate = CandidateSlot {
        sex: trim_opt(rec.candidate.sex),
        surname: trim_opt(rec.candidate.surname),
        given_name: trim_opt(rec.candidate.given_name),
        ..rec.candidate
    };
    LongRecord {
        commune,
        candidate,
        ..rec
    }
}

/// Assembles the final long table: the records of the first round followed by
/// the records of the second round, both in their original order, with their
/// text fields in canonical form.
pub fn normalize(
    round1: Vec<LongRecord>,
    round2: Vec<LongRecord>,
    rules: &NormalizeRules,
) -> Vec<LongRecord> {
    info!(
        "normalize: {} + {} records, rules: {:?}",
        round1.len(),
        round2.len(),
        rules
    );
    round1
        .into_iter()
        .chain(round2.into_iter())
        .map(|rec| normalize_record(rec, rules))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::builder::RoundTableBuilder;
    use super::*;
    use std::collections::HashSet;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    // A commune row, followed by one block per entry (None is an unused block).
    fn row(dep: &str, commune: &str, candidates: &[Option<(&str, &str, i64)>]) -> Vec<CellValue> {
        let mut cells = vec![
            text(dep),
            text(commune),
            text("Aisne"),
            text(&format!("Commune {}", commune)),
            text("Complet"),
            CellValue::Int(100),
            CellValue::Int(20),
            CellValue::Float(20.0),
            CellValue::Int(80),
            CellValue::Float(80.0),
            CellValue::Int(2),
            CellValue::Float(2.0),
            CellValue::Float(2.5),
            CellValue::Int(1),
            CellValue::Float(1.0),
            CellValue::Float(1.25),
            CellValue::Int(77),
            CellValue::Float(77.0),
            CellValue::Float(96.25),
        ];
        for (idx, c) in candidates.iter().enumerate() {
            match c {
                Some((surname, given_name, votes)) => cells.extend(vec![
                    CellValue::Int((idx + 1) as i64),
                    text("M"),
                    text(surname),
                    text(given_name),
                    CellValue::Int(*votes),
                    CellValue::Float(*votes as f64),
                    CellValue::Float(*votes as f64 / 77.0 * 100.0),
                ]),
                None => cells.extend(vec![CellValue::Empty; DEFAULT_STRIDE]),
            }
        }
        cells
    }

    fn table(groups: usize, rows: Vec<Vec<CellValue>>) -> RawRoundTable {
        let mut builder = RoundTableBuilder::new().presidential_header(groups);
        for r in rows {
            builder.add_row(r);
        }
        builder.build()
    }

    fn unpivot_round(
        round: Round,
        groups: usize,
        rows: Vec<Vec<CellValue>>,
    ) -> Vec<LongRecord> {
        let schema = SchemaDescriptor::presidential(groups * DEFAULT_STRIDE).unwrap();
        unpivot(&table(groups, rows), round, &schema).unwrap()
    }

    #[test]
    fn unpivot_row_count() {
        init();
        for groups in [1, 2, 12] {
            let cands: Vec<Option<(&str, &str, i64)>> =
                (0..groups).map(|_| Some(("DUPONT", "Jean", 3))).collect();
            let rows = vec![row("01", "001", &cands), row("01", "002", &cands)];
            let res = unpivot_round(Round::First, groups, rows);
            assert_eq!(res.len(), 2 * groups);
        }
    }

    #[test]
    fn trailing_width_must_be_multiple_of_stride() {
        let res = SchemaDescriptor::presidential(100);
        assert!(matches!(res, Err(LongformError::Schema { .. })));
        assert!(SchemaDescriptor::presidential(84).is_ok());
        assert!(SchemaDescriptor::presidential(14).is_ok());
    }

    #[test]
    fn unpivot_too_narrow() {
        let t = table(1, vec![row("01", "001", &[Some(("A", "B", 1))])]);
        let schema = SchemaDescriptor::presidential(14).unwrap();
        let res = unpivot(&t, Round::First, &schema);
        assert!(matches!(
            res,
            Err(LongformError::Schema {
                round: Some(Round::First),
                ..
            })
        ));
    }

    #[test]
    fn unpivot_rejects_candidate_data_past_the_layout() {
        // The header only names the first block, the row carries three.
        let cands = [Some(("A", "B", 1)), Some(("C", "D", 2)), Some(("E", "F", 3))];
        let t = RawRoundTable {
            header: table(1, vec![]).header,
            rows: vec![row("01", "001", &[Some(("A", "B", 1))]), row("01", "002", &cands)],
        };
        let schema = SchemaDescriptor::presidential(7).unwrap();
        match unpivot(&t, Round::First, &schema) {
            Err(LongformError::Schema { round, message }) => {
                assert_eq!(round, Some(Round::First));
                assert!(message.contains("line 3"), "{}", message);
                assert!(message.contains("column 27"), "{}", message);
            }
            x => panic!("unexpected result {:?}", x),
        }

        // Same thing when the extra columns are in the header but unnamed.
        let t = table(3, vec![row("01", "002", &cands)]);
        assert!(matches!(
            unpivot(&t, Round::First, &schema),
            Err(LongformError::Schema { .. })
        ));
        // Empty cells past the layout are harmless.
        let t = table(3, vec![row("01", "002", &[Some(("A", "B", 1)), None, None])]);
        assert_eq!(unpivot(&t, Round::First, &schema).unwrap().len(), 1);
    }

    #[test]
    fn schema_errors_can_be_attached_to_a_round() {
        let err = SchemaDescriptor::presidential(100).unwrap_err().with_round(Round::Second);
        assert!(matches!(
            err,
            LongformError::Schema {
                round: Some(Round::Second),
                ..
            }
        ));
        assert!(err.to_string().starts_with("Schema error in round 2"));
    }

    #[test]
    fn column_labels() {
        let schema = SchemaDescriptor::presidential(14).unwrap();
        assert_eq!(schema.column_label(0), "Code du département");
        assert_eq!(schema.column_label(19), "N°Panneau#1");
        assert_eq!(schema.column_label(30), "Voix#2");
    }

    #[test]
    fn counts_must_fit_the_output() {
        let mut r = row("01", "001", &[Some(("A", "B", 1))]);
        r[23] = text("1e19");
        let t = table(1, vec![r]);
        match unpivot(&t, Round::First, &SchemaDescriptor::presidential(7).unwrap()) {
            Err(LongformError::InvalidCell { column, line, .. }) => {
                assert_eq!(column, "Voix#1");
                assert_eq!(line, 2);
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn unpivot_missing_commune_column() {
        let mut t = table(1, vec![row("01", "001", &[Some(("A", "B", 1))])]);
        t.header[5] = Some("Registered".to_string());
        let schema = SchemaDescriptor::presidential(7).unwrap();
        match unpivot(&t, Round::Second, &schema) {
            Err(LongformError::Schema { round, message }) => {
                assert_eq!(round, Some(Round::Second));
                assert!(message.contains("Inscrits"));
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn unpivot_ignores_extra_columns() {
        let mut r = row("01", "001", &[Some(("A", "B", 1)), Some(("C", "D", 2))]);
        r.push(text("extra"));
        let mut t = table(2, vec![r]);
        // The builder gave the extra cell an unnamed column.
        assert_eq!(t.width(), 34);
        t.header[33] = Some("Extra".to_string());
        let schema = SchemaDescriptor::presidential(14).unwrap();
        let res = unpivot(&t, Round::First, &schema).unwrap();
        assert_eq!(res.len(), 2);
    }

    #[test]
    fn unpivot_is_injective_on_commune_and_slot() {
        let cands = [Some(("A", "B", 1)), Some(("C", "D", 2)), None];
        let rows = vec![
            row("01", "001", &cands),
            row("01", "002", &cands),
            row("02", "001", &cands),
        ];
        let res = unpivot_round(Round::First, 3, rows);
        let keys: HashSet<(String, String, u32)> = res
            .iter()
            .map(|r| {
                (
                    r.commune.department_code.clone(),
                    r.commune.commune_code.clone(),
                    r.slot,
                )
            })
            .collect();
        assert_eq!(keys.len(), res.len());
        let provisional: Vec<u32> = res.iter().take(3).map(|r| r.candidate_key.0).collect();
        assert_eq!(provisional, vec![1, 2, 3]);
    }

    #[test]
    fn empty_block_is_null_not_zero() {
        let rows = vec![row(
            "01",
            "001",
            &[Some(("A", "B", 0)), None],
        )];
        let res = unpivot_round(Round::First, 2, rows);
        assert_eq!(res[0].candidate.votes, Some(0));
        assert!(!res[0].candidate.is_empty());
        assert_eq!(res[1].candidate.votes, None);
        assert!(res[1].candidate.is_empty());
        assert_eq!(res[1].commune.registered, Some(100));
    }

    #[test]
    fn blank_vote_count_text_is_null() {
        let mut r = row("01", "001", &[Some(("A", "B", 5))]);
        r[19 + 4] = text("   ");
        let res = unpivot_round(Round::First, 1, vec![r]);
        assert_eq!(res[0].candidate.votes, None);
        assert_eq!(res[0].candidate.surname, Some("A".to_string()));
    }

    #[test]
    fn numbers_in_text_cells() {
        let mut r = row("01", "001", &[Some(("A", "B", 5))]);
        r[5] = text("1 234");
        r[7] = text("12,5");
        let res = unpivot_round(Round::First, 1, vec![r]);
        assert_eq!(res[0].commune.registered, Some(1234));
        assert_eq!(res[0].commune.pct_abstentions_registered, Some(12.5));
    }

    #[test]
    fn invalid_number_reports_line_and_column() {
        let bad = row("01", "002", &[Some(("A", "B", 5))]);
        let mut bad = bad;
        bad[19 + 4] = text("many");
        let t = table(1, vec![row("01", "001", &[Some(("A", "B", 5))]), bad]);
        let schema = SchemaDescriptor::presidential(7).unwrap();
        match unpivot(&t, Round::First, &schema) {
            Err(LongformError::InvalidCell {
                round,
                line,
                column,
                content,
                ..
            }) => {
                assert_eq!(round, Round::First);
                assert_eq!(line, 3);
                assert_eq!(column, "Voix#1");
                assert_eq!(content, "many");
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn numeric_codes_are_padded() {
        let mut r = row("", "", &[Some(("A", "B", 5))]);
        r[0] = CellValue::Float(2.0);
        r[1] = CellValue::Int(7);
        let res = unpivot_round(Round::First, 1, vec![r]);
        assert_eq!(res[0].commune.department_code, "2");
        let out = normalize(res, vec![], &NormalizeRules::DEFAULT_RULES);
        assert_eq!(out[0].commune.department_code, "02");
        assert_eq!(out[0].commune.commune_code, "007");
    }

    #[test]
    fn pad_code_keeps_literal_codes() {
        assert_eq!(pad_code("02", 2), "02");
        assert_eq!(pad_code("2", 2), "02");
        assert_eq!(pad_code("2A", 2), "2A");
        assert_eq!(pad_code("ZA", 2), "ZA");
        assert_eq!(pad_code("971", 2), "971");
        assert_eq!(pad_code(" 15 ", 3), "015");
    }

    fn two_rounds() -> (Vec<LongRecord>, Vec<LongRecord>) {
        let r1 = unpivot_round(
            Round::First,
            2,
            vec![
                row("01", "001", &[Some(("MACRON", "Emmanuel", 30)), Some(("LE PEN", "Marine", 25))]),
                row("02", "001", &[Some(("MACRON", "Emmanuel", 40)), Some(("LE PEN", "Marine", 35))]),
            ],
        );
        // Round 2 lists the candidates in another order, and one of them is new.
        let r2 = unpivot_round(
            Round::Second,
            2,
            vec![
                row("01", "001", &[Some(("DURAND", "Paul", 20)), Some((" MACRON ", "Emmanuel", 50))]),
                row("02", "001", &[Some(("DURAND", "Paul", 30)), Some(("MACRON", "Emmanuel", 45))]),
            ],
        );
        (r1, r2)
    }

    #[test]
    fn end_to_end_two_rounds() {
        init();
        let (r1, r2) = two_rounds();
        let rec = reconcile(&r1, r2, &ReconcileRules::DEFAULT_RULES).unwrap();
        let out = normalize(r1, rec.round2, &NormalizeRules::DEFAULT_RULES);
        assert_eq!(out.len(), 8);
        assert!(out[..4].iter().all(|r| r.round == Round::First));
        assert!(out[4..].iter().all(|r| r.round == Round::Second));

        let macron_r1: HashSet<CandidateKey> = out
            .iter()
            .filter(|r| r.round == Round::First && r.candidate.surname.as_deref() == Some("MACRON"))
            .map(|r| r.candidate_key)
            .collect();
        let macron_r2: HashSet<CandidateKey> = out
            .iter()
            .filter(|r| r.round == Round::Second && r.candidate.surname.as_deref() == Some("MACRON"))
            .map(|r| r.candidate_key)
            .collect();
        assert_eq!(macron_r1, [CandidateKey(1)].iter().cloned().collect());
        assert_eq!(macron_r1, macron_r2);

        let durand: HashSet<CandidateKey> = out
            .iter()
            .filter(|r| r.candidate.surname.as_deref() == Some("DURAND"))
            .map(|r| r.candidate_key)
            .collect();
        assert_eq!(durand.len(), 1);
        let durand_key = durand.into_iter().next().unwrap();
        assert!(durand_key != CandidateKey(1) && durand_key != CandidateKey(2));
        assert_eq!(rec.report.new_keys.len(), 1);
        assert_eq!(rec.report.matched.len(), 1);
    }

    #[test]
    fn reconcile_leaves_round1_keys() {
        let (r1, r2) = two_rounds();
        let before: Vec<CandidateKey> = r1.iter().map(|r| r.candidate_key).collect();
        let _ = reconcile(&r1, r2, &ReconcileRules::DEFAULT_RULES).unwrap();
        let after: Vec<CandidateKey> = r1.iter().map(|r| r.candidate_key).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reconcile_fails_on_unresolved_when_asked() {
        let (r1, r2) = two_rounds();
        let rules = ReconcileRules {
            unresolved_candidate: UnresolvedCandidatePolicy::Fail,
            ..ReconcileRules::DEFAULT_RULES
        };
        match reconcile(&r1, r2, &rules) {
            Err(LongformError::UnresolvedCandidate {
                round,
                line,
                surname,
                ..
            }) => {
                assert_eq!(round, Round::Second);
                assert_eq!(line, 2);
                assert_eq!(surname, "DURAND");
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn reconcile_case_insensitive() {
        let r1 = unpivot_round(
            Round::First,
            1,
            vec![row("01", "001", &[Some(("Macron", "Emmanuel", 30))])],
        );
        let r2 = unpivot_round(
            Round::Second,
            1,
            vec![row("01", "001", &[Some(("MACRON", "emmanuel", 50))])],
        );
        let exact = reconcile(&r1, r2.clone(), &ReconcileRules::DEFAULT_RULES).unwrap();
        assert_eq!(exact.round2[0].candidate_key, CandidateKey(2));

        let rules = ReconcileRules {
            name_matching: NameMatching::CaseInsensitive,
            ..ReconcileRules::DEFAULT_RULES
        };
        let res = reconcile(&r1, r2, &rules).unwrap();
        assert_eq!(res.round2[0].candidate_key, CandidateKey(1));
    }

    #[test]
    fn reconcile_ambiguous_names() {
        let r1 = unpivot_round(
            Round::First,
            3,
            vec![row(
                "01",
                "001",
                &[
                    Some(("A", "B", 1)),
                    Some(("C", "D", 2)),
                    Some(("C", "D", 3)),
                ],
            )],
        );
        let r2 = unpivot_round(
            Round::Second,
            1,
            vec![row("01", "001", &[Some(("C", "D", 5))])],
        );
        let res = reconcile(&r1, r2.clone(), &ReconcileRules::DEFAULT_RULES).unwrap();
        assert_eq!(res.round2[0].candidate_key, CandidateKey(2));
        assert_eq!(
            res.report.ambiguous[0].1,
            vec![CandidateKey(2), CandidateKey(3)]
        );

        let rules = ReconcileRules {
            ambiguous_name: AmbiguousNamePolicy::Fail,
            ..ReconcileRules::DEFAULT_RULES
        };
        match reconcile(&r1, r2, &rules) {
            Err(LongformError::AmbiguousCandidate { keys, .. }) => assert_eq!(keys, vec![2, 3]),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn reconcile_unnamed_blocks_follow_their_slot() {
        let r1 = unpivot_round(
            Round::First,
            2,
            vec![row("01", "001", &[Some(("A", "B", 1)), Some(("C", "D", 2))])],
        );
        let r2 = unpivot_round(
            Round::Second,
            3,
            vec![
                row("01", "001", &[Some(("C", "D", 5)), None, None]),
                row("01", "002", &[Some(("C", "D", 5)), Some(("A", "B", 1)), None]),
            ],
        );
        let res = reconcile(&r1, r2, &ReconcileRules::DEFAULT_RULES).unwrap();
        assert_eq!(res.round2.len(), 6);
        let keys: Vec<u32> = res.round2.iter().map(|r| r.candidate_key.0).collect();
        assert_eq!(keys, vec![2, 1, 3, 2, 1, 3]);
        assert_eq!(res.report.unnamed_slots, vec![(3, CandidateKey(3))]);
    }

    #[test]
    fn reconcile_unnamed_blocks_never_repeat_a_key_in_a_row() {
        let r1 = unpivot_round(
            Round::First,
            2,
            vec![row("01", "001", &[Some(("MACRON", "Emmanuel", 1)), Some(("LE PEN", "Marine", 2))])],
        );
        let r2 = unpivot_round(
            Round::Second,
            2,
            vec![
                row("01", "001", &[Some(("LE PEN", "Marine", 5)), Some(("MACRON", "Emmanuel", 6))]),
                row("01", "002", &[Some(("MACRON", "Emmanuel", 7)), None]),
            ],
        );
        let res = reconcile(&r1, r2, &ReconcileRules::DEFAULT_RULES).unwrap();
        let keys: Vec<u32> = res.round2.iter().map(|r| r.candidate_key.0).collect();
        assert_eq!(keys, vec![2, 1, 1, 3]);
        assert_eq!(res.report.unnamed_slots, vec![(2, CandidateKey(3))]);

        let mut seen: HashSet<(usize, CandidateKey)> = HashSet::new();
        for rec in res.round2.iter() {
            assert!(seen.insert((rec.source_row, rec.candidate_key)));
        }
    }

    #[test]
    fn reconcile_rejects_swapped_rounds() {
        let (r1, r2) = two_rounds();
        let res = reconcile(&r2, r1, &ReconcileRules::DEFAULT_RULES);
        assert!(matches!(res, Err(LongformError::Schema { .. })));
    }
}
