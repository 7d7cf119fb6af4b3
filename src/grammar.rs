//! Collaborator contracts: rule engine, lexicon, scorer and hypertagger.
//!
//! The search engine only ever talks to a grammar through the traits in this
//! module. Rule engines are pure: a call either yields a set of results or a
//! [`CombinationFailure`], and never has side effects the engine can observe.
//!
//! Two rules are owned by the engine itself because their behavior is part of
//! fragment recovery rather than the grammar:
//!
//! - [`glue_rule`]: glues two fragments into a `frag` atom while gluing.
//! - [`fragment_join`]: the `*` rule used by the greedy joiner; keeps the left
//!   category.

use crate::lf::Pred;
use crate::sign::{Category, Sign, Substitution};
use crate::{CombinationFailure, LicensingFeature};
use std::sync::Arc;

/// One result of a rule application.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub rule: Arc<str>,
    pub category: Category,
    /// Position of the head daughter among the inputs.
    pub head: usize,
}

impl RuleResult {
    pub fn new(rule: &str, category: Category, head: usize) -> Self {
        RuleResult { rule: rule.into(), category, head }
    }
}

/// A unary type-changing rule, optionally introducing its own semantics.
///
/// Rules without `lf` are general unary rules; rules with `lf` are
/// instantiated against the input preds as [`RuleInstance`](crate::RuleInstance)s.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeChangingRule {
    pub name: Arc<str>,
    pub arg: Category,
    pub result: Category,
    pub lf: Vec<Pred>,
}

impl TypeChangingRule {
    pub fn new(name: &str, arg: Category, result: Category, lf: Vec<Pred>) -> Self {
        TypeChangingRule { name: name.into(), arg, result, lf }
    }

    pub fn fill(&self, subst: &Substitution) -> TypeChangingRule {
        TypeChangingRule {
            name: self.name.clone(),
            arg: self.arg.fill(subst),
            result: self.result.fill(subst),
            lf: self.lf.iter().map(|p| p.fill(subst)).collect(),
        }
    }
}

// --- Traits -------------------------------------------------------------------

/// The combinatory rule engine.
pub trait RuleEngine {
    /// Applies every binary rule to `left right`.
    fn binary(&self, left: &Category, right: &Category) -> Result<Vec<RuleResult>, CombinationFailure>;

    /// Applies every general unary rule (no semantics of their own).
    fn unary(&self, input: &Category) -> Result<Vec<RuleResult>, CombinationFailure>;

    /// Applies an instantiated type-changing rule to `input`.
    fn apply_instance(&self, rule: &TypeChangingRule, input: &Category)
    -> Result<Vec<RuleResult>, CombinationFailure>;

    /// Type-changing rules with semantics indexed by lexical predicate.
    fn type_changing_rules_for_pred(&self, _pred: &str) -> Vec<TypeChangingRule> {
        Vec::new()
    }

    /// Type-changing rules with semantics indexed by relation.
    fn type_changing_rules_for_rel(&self, _rel: &str) -> Vec<TypeChangingRule> {
        Vec::new()
    }

    fn num_binary_rules(&self) -> usize;

    fn num_unary_rules(&self) -> usize;

    /// Gluing step used in place of the binary rules during fragment recovery.
    fn glue(&self, left: &Category, right: &Category, right_completed: bool)
    -> Result<Vec<RuleResult>, CombinationFailure> {
        glue_rule(left, right, right_completed)
    }

    /// Arity-dispatching entry point.
    fn apply(&self, inputs: &[Category]) -> Result<Vec<RuleResult>, CombinationFailure> {
        match inputs {
            [input] => self.unary(input),
            [left, right] => self.binary(left, right),
            _ => Err(CombinationFailure::Arity { rule: "general".into(), expected: 2, found: inputs.len() }),
        }
    }
}

/// Pred- and relation-indexed sign lookup.
///
/// Signs carry their semantic template in `lf` with variable nominals.
pub trait Lexicon {
    /// Signs for a lexical predicate, together with the coarticulation
    /// relations found on the same nominal.
    fn signs_for_pred(&self, pred: &str, coart_rels: &[Arc<str>]) -> Vec<Sign>;

    /// Signs indexed by a relation or attribute name.
    fn signs_for_rel(&self, rel: &str) -> Vec<Sign>;

    /// Signs without semantics.
    fn semantically_null_signs(&self) -> Vec<Sign>;

    fn is_coart_rel(&self, _rel: &str) -> bool {
        false
    }

    fn licensing_features(&self) -> Vec<LicensingFeature> {
        vec![LicensingFeature::default_lex()]
    }
}

/// Sign scoring model; higher is better.
pub trait SignScorer {
    fn score(&self, sign: &Sign, complete: bool) -> f64;
}

impl<F> SignScorer for F
where
    F: Fn(&Sign, bool) -> f64,
{
    fn score(&self, sign: &Sign, complete: bool) -> f64 {
        self(sign, complete)
    }
}

/// Scores every sign 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScorer;

impl SignScorer for NullScorer {
    fn score(&self, _sign: &Sign, _complete: bool) -> f64 {
        0.0
    }
}

/// Per-pred category oracle with widening beta levels.
pub trait Hypertagger {
    fn map_preds(&mut self, preds: &[Pred]);

    /// Selects the pred subsequent `supertags` calls refer to.
    fn set_pred(&mut self, index: usize);

    /// Beta-best supertags for the current pred; `None` places no restriction.
    fn supertags(&self) -> Option<Vec<(Arc<str>, f64)>>;

    fn has_more_betas(&self) -> bool;

    fn next_beta(&mut self);

    fn reset_beta(&mut self);
}

/// A compiled grammar as seen by the realizer.
#[derive(Clone, Copy)]
pub struct Grammar<'g> {
    pub lexicon: &'g dyn Lexicon,
    pub rules: &'g dyn RuleEngine,
}

impl<'g> Grammar<'g> {
    pub fn new(lexicon: &'g dyn Lexicon, rules: &'g dyn RuleEngine) -> Self {
        Grammar { lexicon, rules }
    }
}

// --- Engine-owned rules -------------------------------------------------------

/// Glues `left right` into a `frag`.
///
/// Fails when `right` is itself a fragment that has not completed a chunk or
/// alt. The head is the left input unless the left is atomic and the right a
/// non-modifier functor, or the left is a modifier and the right is not.
pub fn glue_rule(left: &Category, right: &Category, right_completed: bool) -> Result<Vec<RuleResult>, CombinationFailure> {
    if right.is_fragment() && !right_completed {
        return Err(CombinationFailure::NoResult);
    }
    let left_mod = left.is_modifier();
    let right_mod = right.is_modifier();
    let right_functor = matches!(right, Category::Complex { .. });
    let left_head = !((left.as_atom().is_some() && right_functor && !right_mod) || (left_mod && !right_mod));
    Ok(vec![RuleResult::new("glue", Category::atom("frag"), if left_head { 0 } else { 1 })])
}

/// Joins two fragments, keeping the left category and head.
pub fn fragment_join(left: &Category) -> RuleResult {
    RuleResult::new("*", left.clone(), 0)
}
