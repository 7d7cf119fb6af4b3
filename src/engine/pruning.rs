//! N-best pruning of chart-equivalent edges.
//!
//! A strategy receives a score-sorted list of edges (the alternatives of one
//! representative, or a list of complete edges) and removes everything past
//! its cutoff, returning the removed edges in their original order.
//!
//! ```text
//! [0.9, 0.7, 0.5, 0.3, 0.1]  ── NBest(2) ──►  kept [0.9, 0.7]
//!                                             removed [0.5, 0.3, 0.1]
//! ```
//!
//! Diversity strategies first group the list into ranked classes of edges
//! that are not compellingly different, then keep edges round-robin across
//! the classes so that near-duplicates do not crowd out distinct
//! realizations.

use super::edge::{EdgeArena, EdgeId};
use crate::sign::Sign;
use std::collections::HashSet;
use std::sync::Arc;

pub trait PruningStrategy: Send + Sync {
    /// Cutoff; `None` disables pruning.
    fn limit(&self) -> Option<usize>;

    /// Removes and returns the edges beyond the cutoff. `edges` must be
    /// sorted by descending score.
    fn prune_edges(&self, edges: &mut Vec<EdgeId>, arena: &EdgeArena) -> Vec<EdgeId>;
}

/// Keeps the top `n` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NBestPruningStrategy {
    limit: Option<usize>,
}

impl NBestPruningStrategy {
    pub fn new(limit: Option<usize>) -> Self {
        NBestPruningStrategy { limit }
    }
}

impl PruningStrategy for NBestPruningStrategy {
    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn prune_edges(&self, edges: &mut Vec<EdgeId>, _arena: &EdgeArena) -> Vec<EdgeId> {
        match self.limit {
            Some(n) if n < edges.len() => edges.split_off(n),
            _ => Vec::new(),
        }
    }
}

// --- Diversity ----------------------------------------------------------------

/// Decides whether two signs are close enough to share a diversity group.
///
/// `first` is the best-scoring member of an existing group.
pub trait NotCompellinglyDifferent: Send + Sync {
    fn not_compellingly_different(&self, first: &Sign, other: &Sign) -> bool;
}

/// Keeps up to `n` edges sampled round-robin across groups of similar edges.
#[derive(Debug, Clone)]
pub struct DiversityPruningStrategy<R> {
    limit: Option<usize>,
    /// Keep at most one edge per group, even below the cutoff.
    single_best_per_group: bool,
    relation: R,
}

impl<R: NotCompellinglyDifferent> DiversityPruningStrategy<R> {
    pub fn new(limit: Option<usize>, single_best_per_group: bool, relation: R) -> Self {
        DiversityPruningStrategy { limit, single_best_per_group, relation }
    }

    fn group(&self, edges: &[EdgeId], arena: &EdgeArena) -> Vec<Vec<EdgeId>> {
        let mut groups: Vec<Vec<EdgeId>> = Vec::new();
        for &edge in edges {
            let sign = &arena[edge].sign;
            match groups.iter_mut().find(|g| self.relation.not_compellingly_different(&arena[g[0]].sign, sign)) {
                Some(group) => group.push(edge),
                None => groups.push(vec![edge]),
            }
        }
        groups
    }
}

impl<R: NotCompellinglyDifferent> PruningStrategy for DiversityPruningStrategy<R> {
    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn prune_edges(&self, edges: &mut Vec<EdgeId>, arena: &EdgeArena) -> Vec<EdgeId> {
        let Some(n) = self.limit else { return Vec::new() };
        if !self.single_best_per_group && edges.len() <= n {
            return Vec::new();
        }
        let groups = self.group(edges, arena);
        if groups.is_empty() {
            return Vec::new();
        }

        let mut keepers = HashSet::new();
        let mut counter = 0;
        while keepers.len() < n && (!self.single_best_per_group || counter < groups.len()) {
            if let Some(&edge) = groups[counter % groups.len()].get(counter / groups.len()) {
                keepers.insert(edge);
            }
            counter += 1;
        }

        let (kept, removed): (Vec<EdgeId>, Vec<EdgeId>) = edges.iter().copied().partition(|e| keepers.contains(e));
        *edges = kept;
        removed
    }
}

/// Same open-class stems: the second sign adds no open-class stem the first
/// lacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenClassStems;

const OPEN_CLASS_POS: &[&str] =
    &["JJ", "JJR", "JJS", "NN", "NNP", "NNS", "NNPS", "RB", "RBR", "RBS", "VB", "VBD", "VBG", "VBN", "VBP", "VBZ"];

impl NotCompellinglyDifferent for OpenClassStems {
    fn not_compellingly_different(&self, first: &Sign, other: &Sign) -> bool {
        let open = |sign: &Sign| -> Vec<Arc<str>> {
            sign.words.iter().filter(|w| OPEN_CLASS_POS.contains(&&*w.pos)).map(|w| w.stem.clone()).collect()
        };
        let seen: HashSet<Arc<str>> = open(first).into_iter().collect();
        open(other).iter().all(|stem| seen.contains(stem))
    }
}

/// Identical stem sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameStems;

impl NotCompellinglyDifferent for SameStems {
    fn not_compellingly_different(&self, first: &Sign, other: &Sign) -> bool {
        first.words.len() == other.words.len() && first.words.iter().zip(&other.words).all(|(a, b)| a.stem == b.stem)
    }
}

pub type LexicalDiversityPruningStrategy = DiversityPruningStrategy<OpenClassStems>;

pub type StemPruningStrategy = DiversityPruningStrategy<SameStems>;

impl LexicalDiversityPruningStrategy {
    pub fn lexical(limit: Option<usize>) -> Self {
        DiversityPruningStrategy::new(limit, false, OpenClassStems)
    }
}

impl StemPruningStrategy {
    /// One edge per stem sequence unless `single_best_per_group` is false.
    pub fn stems(limit: Option<usize>, single_best_per_group: bool) -> Self {
        DiversityPruningStrategy::new(limit, single_best_per_group, SameStems)
    }
}
