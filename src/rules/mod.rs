//! Reference grammar: a small CCG rule engine and an in-memory lexicon.
//!
//! Neither is meant to model a real language. They implement the
//! [`RuleEngine`](crate::RuleEngine) and [`Lexicon`](crate::Lexicon)
//! contracts faithfully enough to drive the chart in tests and demos:
//!
//! - [`CcgRules`]: forward/backward application, harmonic composition, plus
//!   any unary and semantic type-changing rules registered on it.
//! - [`MemoryLexicon`]: signs indexed by their first lexical pred (or
//!   relation), with a one-entry-per-line text format.

mod combinators;
mod lexicon;

#[cfg(test)]
mod tests;

pub use combinators::{CcgRules, Combinators};
pub use lexicon::MemoryLexicon;
