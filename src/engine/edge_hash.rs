//! Equivalence keys for edges.
//!
//! The chart groups and deduplicates edges under two different notions of
//! "the same edge", each captured by a plain value key:
//!
//! - [`ChartKey`]: coverage + category. Edges sharing a chart key are packed
//!   under one representative; the category never includes semantics.
//! - [`SurfaceKey`]: coverage + indices + surface words + category. Used by
//!   [`EdgeHash`] to drop agenda edges that would realize the same string.
//!
//! Lexical edges keep their full words (stem, POS, supertag) in the surface
//! key so that entries differing only in POS tag survive side by side.

use super::edge::{EdgeArena, EdgeId};
use crate::BitSet;
use crate::sign::{Category, Word};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartKey {
    pub coverage: BitSet,
    pub category: Category,
}

impl ChartKey {
    pub fn of(id: EdgeId, arena: &EdgeArena) -> Self {
        let edge = &arena[id];
        ChartKey { coverage: edge.coverage().clone(), category: edge.sign.category.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceWords {
    Lexical(Vec<Word>),
    Derived(Vec<Arc<str>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceKey {
    pub coverage: BitSet,
    pub indices: BitSet,
    pub words: SurfaceWords,
    pub category: Category,
}

impl SurfaceKey {
    pub fn of(id: EdgeId, arena: &EdgeArena) -> Self {
        let edge = &arena[id];
        let words = if edge.sign.is_lexical() {
            SurfaceWords::Lexical(edge.sign.words.clone())
        } else {
            SurfaceWords::Derived(edge.sign.words.iter().map(|w| w.form.clone()).collect())
        };
        SurfaceKey {
            coverage: edge.coverage().clone(),
            indices: edge.indices().clone(),
            words,
            category: edge.sign.category.clone(),
        }
    }
}

/// Result of [`EdgeHash::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOutcome {
    /// No equivalent edge was present.
    Added,
    /// The new edge replaced this (worse) one.
    Displaced(EdgeId),
    /// An equivalent, at least as good edge is kept instead.
    Rejected,
}

/// Set of edges unique up to surface words, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct EdgeHash {
    slots: Vec<EdgeId>,
    index: HashMap<SurfaceKey, usize>,
}

impl EdgeHash {
    pub fn new() -> Self {
        EdgeHash::default()
    }

    /// Inserts `id`, keeping whichever of it and an equivalent edge has the
    /// higher score; equal scores go to the lower derivational complexity.
    pub fn insert(&mut self, id: EdgeId, arena: &EdgeArena) -> HashOutcome {
        let key = SurfaceKey::of(id, arena);
        match self.index.get(&key) {
            Some(&slot) => {
                let old = self.slots[slot];
                if old == id {
                    return HashOutcome::Rejected;
                }
                let (new_edge, old_edge) = (&arena[id], &arena[old]);
                let better = new_edge.score > old_edge.score
                    || (new_edge.score == old_edge.score && new_edge.sign.complexity < old_edge.sign.complexity);
                if better {
                    self.slots[slot] = id;
                    HashOutcome::Displaced(old)
                } else {
                    HashOutcome::Rejected
                }
            }
            None => {
                self.index.insert(key, self.slots.len());
                self.slots.push(id);
                HashOutcome::Added
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.slots
    }

    pub fn into_edges(self) -> Vec<EdgeId> {
        self.slots
    }
}
