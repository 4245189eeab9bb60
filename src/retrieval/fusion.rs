//! Rank fusion for combining dense and sparse result lists
//!
//! Two methods:
//! - RRF (Reciprocal Rank Fusion, Cormack et al., 2009): score by rank position
//!   only, so lists with incomparable score scales can be merged.
//! - DBSF (Distribution-Based Score Fusion): z-score normalize each list by its
//!   own mean and standard deviation, then sum.
//!
//! Output is deduplicated by id and sorted by fused score descending. Ties keep
//! the order in which ids were first seen across the input lists.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::NotesError;
use crate::store::{Payload, ScoredPoint};

/// Standard RRF smoothing constant (higher k flattens the top ranks)
pub const DEFAULT_RRF_K: usize = 60;

/// Which ranked search produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSource {
    Dense,
    Sparse,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        }
    }
}

/// One hit from one ranked list
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub id: String,
    /// Raw score in the producing list's own scale
    pub score: f32,
    pub payload: Payload,
    pub source: CandidateSource,
}

impl ScoredCandidate {
    pub fn from_point(point: ScoredPoint, source: CandidateSource) -> Self {
        Self {
            id: point.id,
            score: point.score,
            payload: point.payload,
            source,
        }
    }
}

/// Fused result with combined score and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub id: String,
    pub fused_score: f32,
    /// Payload from the first list the id appeared in
    pub payload: Payload,
    /// Lists that contributed, in first-seen order
    pub sources: Vec<CandidateSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMethod {
    #[default]
    Rrf,
    Dbsf,
}

impl FromStr for FusionMethod {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rrf" => Ok(Self::Rrf),
            "dbsf" => Ok(Self::Dbsf),
            other => Err(NotesError::invalid(format!(
                "unknown fusion method '{}': expected 'rrf' or 'dbsf'",
                other
            ))),
        }
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rrf => "rrf",
            Self::Dbsf => "dbsf",
        })
    }
}

/// Fuse ranked lists with the chosen method
///
/// `rrf_k` is ignored for DBSF. Empty input yields empty output.
pub fn fuse(lists: Vec<Vec<ScoredCandidate>>, method: FusionMethod, rrf_k: usize) -> Vec<FusedResult> {
    match method {
        FusionMethod::Rrf => rrf_fuse(lists, rrf_k),
        FusionMethod::Dbsf => dbsf_fuse(lists),
    }
}

/// Reciprocal Rank Fusion
///
/// Score for document d = Σ 1/(k + rank_i) over each list i containing d,
/// with rank 1-indexed.
pub fn rrf_fuse(lists: Vec<Vec<ScoredCandidate>>, k: usize) -> Vec<FusedResult> {
    let mut acc = Accumulator::default();

    for list in lists {
        let mut seen = HashSet::with_capacity(list.len());
        for (rank, candidate) in list.into_iter().enumerate() {
            // A repeated id inside one list only counts at its best rank
            if !seen.insert(candidate.id.clone()) {
                continue;
            }

            let contribution = 1.0 / (k + rank + 1) as f32;
            acc.add(candidate, contribution);
        }
    }

    acc.finish()
}

/// Distribution-Based Score Fusion
///
/// Each list is normalized to z-scores with its own mean and population
/// standard deviation. A list whose scores are all equal contributes 0 to
/// every item in it.
pub fn dbsf_fuse(lists: Vec<Vec<ScoredCandidate>>) -> Vec<FusedResult> {
    let mut acc = Accumulator::default();

    for list in lists {
        let (mean, stddev) = distribution(&list);

        let mut seen = HashSet::with_capacity(list.len());
        for candidate in list {
            if !seen.insert(candidate.id.clone()) {
                continue;
            }

            let contribution = match stddev {
                Some(sd) => ((candidate.score as f64 - mean) / sd) as f32,
                None => 0.0,
            };
            acc.add(candidate, contribution);
        }
    }

    acc.finish()
}

/// Mean and population stddev; stddev is None when the list has no spread
fn distribution(list: &[ScoredCandidate]) -> (f64, Option<f64>) {
    let Some(first) = list.first() else {
        return (0.0, None);
    };
    if list.iter().all(|c| c.score == first.score) {
        return (first.score as f64, None);
    }

    let n = list.len() as f64;
    let mean = list.iter().map(|c| c.score as f64).sum::<f64>() / n;
    let variance = list
        .iter()
        .map(|c| {
            let d = c.score as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 && stddev.is_finite() {
        (mean, Some(stddev))
    } else {
        (mean, None)
    }
}

/// Single list passed through unfused: deduplicated, order and raw scores kept
pub fn passthrough(list: Vec<ScoredCandidate>) -> Vec<FusedResult> {
    let mut acc = Accumulator::default();
    for candidate in list {
        if acc.index.contains_key(&candidate.id) {
            continue;
        }
        let score = candidate.score;
        acc.add(candidate, score);
    }
    acc.finish()
}

/// Insertion-ordered score accumulator
#[derive(Default)]
struct Accumulator {
    results: Vec<FusedResult>,
    index: HashMap<String, usize>,
}

impl Accumulator {
    fn add(&mut self, candidate: ScoredCandidate, contribution: f32) {
        match self.index.get(&candidate.id) {
            Some(&pos) => {
                let entry = &mut self.results[pos];
                entry.fused_score += contribution;
                if !entry.sources.contains(&candidate.source) {
                    entry.sources.push(candidate.source);
                }
            }
            None => {
                self.index.insert(candidate.id.clone(), self.results.len());
                self.results.push(FusedResult {
                    id: candidate.id,
                    fused_score: contribution,
                    payload: candidate.payload,
                    sources: vec![candidate.source],
                });
            }
        }
    }

    fn finish(self) -> Vec<FusedResult> {
        let mut fused = self.results;
        // Stable: equal scores stay in first-seen order
        fused.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
        fused
    }
}
