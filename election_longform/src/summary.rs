use log::debug;

use std::collections::BTreeMap;

use crate::config::*;

/// Totals of the commune fields for one round, counted once per commune row.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RoundTotals {
    pub registered: u64,
    pub voters: u64,
    pub abstentions: u64,
    pub blank: u64,
    pub null: u64,
    pub expressed: u64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CandidateTotal {
    pub key: CandidateKey,
    pub surname: String,
    pub given_name: String,
    pub votes: u64,
    /// Number of commune rows in which the candidate ran.
    pub communes: u64,
}

/// Statistics for one round of the long table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RoundSummary {
    pub round: Round,
    pub communes: u64,
    pub records: u64,
    pub empty_slots: u64,
    pub totals: RoundTotals,
    /// Sorted by candidate key.
    pub candidates: Vec<CandidateTotal>,
}

/// Computes the statistics of each round present in the records.
///
/// The commune fields are repeated on every candidate record of a row, so they
/// are only counted on the first block. Unused blocks count as empty slots and
/// do not contribute to the candidate totals.
pub fn summarize(records: &[LongRecord]) -> Vec<RoundSummary> {
    let mut rounds: BTreeMap<Round, (RoundSummary, BTreeMap<CandidateKey, CandidateTotal>)> =
        BTreeMap::new();
    for rec in records.iter() {
        let (stats, candidates) = rounds.entry(rec.round).or_insert_with(|| {
            (
                RoundSummary {
                    round: rec.round,
                    communes: 0,
                    records: 0,
                    empty_slots: 0,
                    totals: RoundTotals::default(),
                    candidates: vec![],
                },
                BTreeMap::new(),
            )
        });
        stats.records += 1;
        if rec.slot == 1 {
            let c = &rec.commune;
            stats.communes += 1;
            stats.totals.registered += c.registered.unwrap_or(0);
            stats.totals.voters += c.voters.unwrap_or(0);
            stats.totals.abstentions += c.abstentions.unwrap_or(0);
            stats.totals.blank += c.blank.unwrap_or(0);
            stats.totals.null += c.null.unwrap_or(0);
            stats.totals.expressed += c.expressed.unwrap_or(0);
        }
        if rec.candidate.is_empty() {
            stats.empty_slots += 1;
            continue;
        }
        let total = candidates
            .entry(rec.candidate_key)
            .or_insert_with(|| CandidateTotal {
                key: rec.candidate_key,
                surname: rec.candidate.surname.clone().unwrap_or_default(),
                given_name: rec.candidate.given_name.clone().unwrap_or_default(),
                votes: 0,
                communes: 0,
            });
        if let Some(votes) = rec.candidate.votes {
            total.votes += votes;
            total.communes += 1;
        }
    }

    rounds
        .into_iter()
        .map(|(_, (mut stats, candidates))| {
            stats.candidates = candidates.into_values().collect();
            debug!("summarize: {:?}", stats);
            stats
        })
        .collect()
}
