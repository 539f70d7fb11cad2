//! Ranking Engine: orders score records and derives the report summary.
//!
//! Sort key (all descending): overall, skills, experience, role alignment,
//! education. The sort is stable so fully tied records keep input order, and
//! ranks are positional: 1..N with no gaps and no shared ranks.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::report::{
    RankedResult, ScoreRecord, ScoreStatistics, ScreeningSummary, TopCandidate,
};
use crate::screening::scoring::round_half_up;

const TOP_CANDIDATES: usize = 3;
const MAX_SUMMARY_ITEMS: usize = 5;

fn compare(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.overall_score
        .total_cmp(&a.overall_score)
        .then_with(|| b.scores.skills_score.total_cmp(&a.scores.skills_score))
        .then_with(|| b.scores.experience_score.total_cmp(&a.scores.experience_score))
        .then_with(|| {
            b.scores
                .role_alignment_score
                .total_cmp(&a.scores.role_alignment_score)
        })
        .then_with(|| b.scores.education_score.total_cmp(&a.scores.education_score))
}

/// Ranks records. Input order is the final tie-break, so pass them in request
/// order.
pub fn rank(mut records: Vec<ScoreRecord>) -> Vec<RankedResult> {
    // slice::sort_by is stable
    records.sort_by(compare);
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| RankedResult { rank: i + 1, record })
        .collect()
}

pub fn summarize(ranked: &[RankedResult]) -> ScreeningSummary {
    let top_candidates = ranked
        .iter()
        .take(TOP_CANDIDATES)
        .map(|r| TopCandidate {
            candidate_name: r.record.candidate_name.clone(),
            overall_score: r.record.overall_score,
            rank: r.rank,
        })
        .collect();

    let common_gaps = most_common(
        ranked
            .iter()
            .flat_map(|r| r.record.explanation.gaps.iter()),
    );
    let hiring_risks = most_common(
        ranked
            .iter()
            .flat_map(|r| r.record.explanation.risk_flags.iter()),
    );

    ScreeningSummary {
        top_candidates,
        common_gaps,
        hiring_risks,
        statistics: statistics(ranked),
    }
}

fn statistics(ranked: &[RankedResult]) -> ScoreStatistics {
    if ranked.is_empty() {
        return ScoreStatistics::default();
    }
    let scores: Vec<f64> = ranked.iter().map(|r| r.record.overall_score).collect();
    let total: f64 = scores.iter().sum();
    ScoreStatistics {
        total_candidates: scores.len(),
        average_score: round_half_up(total / scores.len() as f64, 2),
        max_score: scores.iter().copied().fold(f64::MIN, f64::max),
        min_score: scores.iter().copied().fold(f64::MAX, f64::min),
    }
}

/// Case-insensitive frequency count, most frequent first, ties by first
/// appearance. Keeps the first spelling seen.
fn most_common<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    // key → (count, first position, display form)
    let mut counts: HashMap<String, (usize, usize, &'a str)> = HashMap::new();
    for (position, item) in items.enumerate() {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        counts
            .entry(trimmed.to_lowercase())
            .and_modify(|(count, _, _)| *count += 1)
            .or_insert((1, position, trimmed));
    }

    let mut entries: Vec<_> = counts.into_values().collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    entries
        .into_iter()
        .take(MAX_SUMMARY_ITEMS)
        .map(|(_, _, text)| text.to_string())
        .collect()
}
