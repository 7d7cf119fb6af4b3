//! Edges, trackers and the edge arena.
//!
//! Every edge lives in an [`EdgeArena`] owned by its chart and is referred to
//! by [`EdgeId`]. Derivations, alternative lists and combo caches all store
//! ids, so the derivation graph is a DAG over arena slots rather than a web of
//! shared pointers.
//!
//! ```text
//!  EdgeArena
//!  ┌────┬────┬────┬────┬────┐
//!  │ e0 │ e1 │ e2 │ e3 │ e4 │
//!  └────┴────┴────┴────┴────┘
//!    ▲    ▲         │
//!    └────┴─────────┘  e3.sign.derivation = Rule { inputs: [e0, e1] }
//! ```
//!
//! Edges are immutable once built, except for the once-only initialization of
//! `alt_edges` and `combos` when an edge becomes a representative.

use crate::BitSet;
use crate::grammar::TypeChangingRule;
use crate::lf::AltId;
use crate::sign::Sign;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Stable handle for an edge in an [`EdgeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Coverage footprint shared by edges and rule instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracker {
    /// Preds covered.
    pub coverage: BitSet,
    /// Nominals (by nominal index) appearing as `index`/`mod-index` values.
    pub indices: BitSet,
    /// Still-undecided alt sets, ordered by set id.
    pub active_alts: Vec<Vec<AltId>>,
}

impl Tracker {
    pub fn new(coverage: BitSet, indices: BitSet, active_alts: Vec<Vec<AltId>>) -> Self {
        Tracker { coverage, indices, active_alts }
    }

    pub fn intersects(&self, other: &Tracker) -> bool {
        self.coverage.intersects(&other.coverage)
    }

    /// True if either side has no indices, or the indices overlap.
    pub fn indices_intersect(&self, other: &Tracker) -> bool {
        self.indices.is_empty() || other.indices.is_empty() || self.indices.intersects(&other.indices)
    }
}

/// A type-changing rule whose semantics are bound to specific preds.
#[derive(Debug, Clone)]
pub struct RuleInstance {
    pub tracker: Tracker,
    pub rule: TypeChangingRule,
}

/// A (partner, result) pair recorded on a representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatCombo {
    pub input: EdgeId,
    pub result: EdgeId,
}

/// Combinations recorded for a representative edge, replayed for its
/// alternatives.
#[derive(Debug, Clone, Default)]
pub struct EdgeCombos {
    /// This edge on the left.
    pub rightward: Vec<CatCombo>,
    /// This edge on the right.
    pub leftward: Vec<CatCombo>,
    pub unary_results: Vec<EdgeId>,
    pub optional_results: Vec<EdgeId>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub tracker: Tracker,
    pub sign: Sign,
    /// `|coverage| / N`.
    pub completeness: f64,
    pub score: f64,
    /// The most specific chunk this edge has started but not finished.
    pub incomplete_chunk: Option<BitSet>,
    /// Set once the edge becomes a representative; starts as `[self]`.
    pub alt_edges: Option<Vec<EdgeId>>,
    pub combos: Option<EdgeCombos>,
    /// The edge this one was built from by marking opts as covered.
    pub opt_completes: Option<EdgeId>,
}

impl Edge {
    pub fn new(
        sign: Sign,
        tracker: Tracker,
        completeness: f64,
        score: f64,
        incomplete_chunk: Option<BitSet>,
    ) -> Self {
        Edge { tracker, sign, completeness, score, incomplete_chunk, alt_edges: None, combos: None, opt_completes: None }
    }

    pub fn coverage(&self) -> &BitSet {
        &self.tracker.coverage
    }

    pub fn indices(&self) -> &BitSet {
        &self.tracker.indices
    }

    pub fn complete(&self) -> bool {
        self.completeness == 1.0
    }

    pub fn is_representative(&self) -> bool {
        self.alt_edges.is_some()
    }

    pub fn is_disjunctive(&self) -> bool {
        self.alt_edges.as_ref().is_some_and(|alts| alts.len() > 1)
    }

    pub fn alts(&self) -> &[EdgeId] {
        self.alt_edges.as_deref().unwrap_or(&[])
    }

    /// True when this edge has no open chunk, `other` is semantically empty,
    /// or `other` contributes to the open chunk.
    pub fn meets_chunk_constraints(&self, other: &Tracker) -> bool {
        match &self.incomplete_chunk {
            None => true,
            Some(_) if other.coverage.is_empty() => true,
            Some(chunk) => chunk.intersects(&other.coverage),
        }
    }
}

/// `{0.67} [0.500] the dog :- np[index=x]`; the alternate form appends the
/// coverage bitset.
impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:.2}}} ", self.completeness)?;
        if self.score == 0.0 || self.score.abs() >= 0.001 {
            write!(f, "[{:.3}] ", self.score)?;
        } else {
            write!(f, "[{:.3e}] ", self.score)?;
        }
        write!(f, "{}", self.sign)?;
        if f.alternate() {
            write!(f, " {}", self.tracker.coverage)?;
        }
        Ok(())
    }
}

// --- Arena --------------------------------------------------------------------

/// Index-stable store for every edge built during one realization request.
#[derive(Debug, Clone, Default)]
pub struct EdgeArena {
    edges: Vec<Edge>,
}

impl EdgeArena {
    pub fn new() -> Self {
        EdgeArena::default()
    }

    pub fn push(&mut self, edge: Edge) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(edge);
        id
    }

    pub fn get(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeId(i as u32), e))
    }

    /// Derivation text, e.g. `(> the[np/^n] dog[n])`.
    pub fn derivation(&self, id: EdgeId) -> String {
        let edge = &self[id];
        match edge.sign.derivation.rule() {
            None => format!("{}[{}]", edge.sign.orthography(), edge.sign.category),
            Some(rule) => {
                let inputs: Vec<String> = edge.sign.derivation.inputs().iter().map(|&i| self.derivation(i)).collect();
                format!("({} {})", rule, inputs.join(" "))
            }
        }
    }
}

impl Index<EdgeId> for EdgeArena {
    type Output = Edge;

    fn index(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }
}

impl IndexMut<EdgeId> for EdgeArena {
    fn index_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Word;

    fn edge(coverage: &[usize], chunk: Option<&[usize]>) -> Edge {
        let sign = Sign::lexical(vec![Word::new("dog")], "n[x]".parse().unwrap(), Vec::new());
        let tracker = Tracker::new(coverage.iter().copied().collect(), BitSet::new(), Vec::new());
        Edge::new(sign, tracker, coverage.len() as f64 / 4.0, 0.5, chunk.map(|c| c.iter().copied().collect()))
    }

    #[test]
    fn empty_indices_intersect_everything() {
        let a = Tracker::new(BitSet::new(), BitSet::new(), Vec::new());
        let b = Tracker::new(BitSet::new(), BitSet::singleton(3), Vec::new());
        let c = Tracker::new(BitSet::new(), BitSet::singleton(4), Vec::new());
        assert!(a.indices_intersect(&b));
        assert!(!b.indices_intersect(&c));
    }

    #[test]
    fn chunk_constraints() {
        let open = edge(&[0], Some(&[0, 1]));
        assert!(open.meets_chunk_constraints(&edge(&[1], None).tracker));
        assert!(!open.meets_chunk_constraints(&edge(&[2], None).tracker));
        assert!(open.meets_chunk_constraints(&edge(&[], None).tracker));
        assert!(edge(&[2], None).meets_chunk_constraints(&open.tracker));
    }

    #[test]
    fn display_shows_completeness_score_and_sign() {
        let e = edge(&[0, 1], None);
        assert_eq!(e.to_string(), "{0.50} [0.500] dog :- n[index=x]");
        assert_eq!(format!("{e:#}"), "{0.50} [0.500] dog :- n[index=x] {0-1}");
    }

    #[test]
    fn arena_handles_are_stable() {
        let mut arena = EdgeArena::new();
        let a = arena.push(edge(&[0], None));
        let b = arena.push(edge(&[1], None));
        assert_eq!(a.index(), 0);
        assert_eq!(arena[b].coverage(), &BitSet::singleton(1));
        assert_eq!(arena.derivation(a), "dog[n[index=x]]");
    }
}
