extern crate self as ccg_realize;

use roaring::RoaringBitmap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

#[macro_use]
mod macros;
mod api;
mod engine;
mod grammar;
mod lf;
mod sign;

pub mod rules;

pub use api::{NewBestLimit, Realization, RealizationStatus, Realizer, SearchConfig};
pub use engine::{
    CatCombo, Chart, ChartKey, ChartStats, DiversityPruningStrategy, Edge, EdgeArena, EdgeCombos, EdgeFactory,
    EdgeHash, EdgeId, FactoryFlags, FeatureLicenser, HashOutcome, LexicalDiversityPruningStrategy, LicenseLoc,
    LicensedCats, LicensingFeature, NBestPruningStrategy, NotCompellinglyDifferent, OpenClassStems, PruningStrategy,
    RuleApps, RuleInstance, SameStems, StemPruningStrategy, SurfaceKey, SurfaceWords, Tracker,
};
pub use grammar::{
    Grammar, Hypertagger, Lexicon, NullScorer, RuleEngine, RuleResult, SignScorer, TypeChangingRule, fragment_join,
    glue_rule,
};
pub use lf::{AltId, LfInput, Nominal, Pred, PredKind};
pub use sign::{AtomCat, Category, Derivation, FeatureValue, Sign, Slash, SlashDir, Substitution, Word};

// --- Errors -------------------------------------------------------------------

/// Outcome of a rule engine call that produced nothing.
///
/// `NoResult` is the ordinary case and is turned into an empty result set by
/// the edge factory. `Arity` is a wiring error and terminates the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombinationFailure {
    #[error("no combination")]
    NoResult,
    #[error("rule {rule} expects {expected} inputs, got {found}")]
    Arity { rule: String, expected: usize, found: usize },
}

/// Fatal errors for a realization request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealizeError {
    #[error("rule {rule} expects {expected} inputs, got {found}")]
    ArityMismatch { rule: String, expected: usize, found: usize },
    #[error("packing mode required for gluing fragments")]
    GluingWithoutPacking,
    #[error("edge {0:?} is not in the arena")]
    UnknownEdge(EdgeId),
    #[error("representative edge {0:?} has no alternatives")]
    MissingAlts(EdgeId),
    #[error("invalid elementary predication: {0}")]
    InvalidPred(String),
    #[error("invalid category: {0}")]
    InvalidCategory(String),
}

impl CombinationFailure {
    /// `None` for an ordinary failed combination, the fatal error otherwise.
    pub fn into_fatal(self) -> Option<RealizeError> {
        match self {
            CombinationFailure::NoResult => None,
            CombinationFailure::Arity { rule, expected, found } => {
                Some(RealizeError::ArityMismatch { rule, expected, found })
            }
        }
    }
}

// --- BitSet -------------------------------------------------------------------

/// Bit set over pred (or nominal) indices.
///
/// Coverage, semantic indices, chunks, alts and opts are all `BitSet`s.
/// Equality and hashing are structural so sets can key hash maps.
#[derive(Clone, Default)]
pub struct BitSet(RoaringBitmap);

impl BitSet {
    pub fn new() -> Self {
        BitSet(RoaringBitmap::new())
    }

    /// Set with bits `0..n` on.
    pub fn full(n: usize) -> Self {
        let mut bits = RoaringBitmap::new();
        bits.insert_range(0..n as u32);
        BitSet(bits)
    }

    pub fn singleton(i: usize) -> Self {
        let mut bits = BitSet::new();
        bits.insert(i);
        bits
    }

    pub fn insert(&mut self, i: usize) -> bool {
        self.0.insert(i as u32)
    }

    pub fn contains(&self, i: usize) -> bool {
        self.0.contains(i as u32)
    }

    pub fn len(&self) -> usize {
        self.0.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn intersects(&self, other: &BitSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn union(&self, other: &BitSet) -> BitSet {
        BitSet(&self.0 | &other.0)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        self.0 |= &other.0;
    }

    pub fn intersection(&self, other: &BitSet) -> BitSet {
        BitSet(&self.0 & &other.0)
    }

    pub fn difference(&self, other: &BitSet) -> BitSet {
        BitSet(&self.0 - &other.0)
    }

    pub fn difference_with(&mut self, other: &BitSet) {
        self.0 -= &other.0;
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|i| i as usize)
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &BitSet) -> bool {
        self.0 == other.0
    }
}

impl Eq for BitSet {}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.len());
        for i in self.0.iter() {
            state.write_u32(i);
        }
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        BitSet(iter.into_iter().map(|i| i as u32).collect())
    }
}

/// Prints runs compactly, e.g. `{0-2,5}`.
impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        let mut run: Option<(u32, u32)> = None;
        for i in self.0.iter() {
            run = match run {
                Some((lo, hi)) if hi + 1 == i => Some((lo, i)),
                Some(done) => {
                    write_run(f, done, &mut first)?;
                    Some((i, i))
                }
                None => Some((i, i)),
            };
        }
        if let Some(done) = run {
            write_run(f, done, &mut first)?;
        }
        write!(f, "}}")
    }
}

fn write_run(f: &mut fmt::Formatter<'_>, (lo, hi): (u32, u32), first: &mut bool) -> fmt::Result {
    if !*first {
        write!(f, ",")?;
    }
    *first = false;
    if lo == hi { write!(f, "{lo}") } else { write!(f, "{lo}-{hi}") }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
