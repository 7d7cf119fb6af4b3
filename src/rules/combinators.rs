use crate::CombinationFailure;
use crate::grammar::{RuleEngine, RuleResult, TypeChangingRule};
use crate::lf::Nominal;
use crate::sign::{Category, FeatureValue, Slash, SlashDir, Substitution};
use bitflags::bitflags;
use std::collections::HashSet;
use std::sync::Arc;

bitflags! {
    /// Binary rule families; each contributes a forward and a backward rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Combinators: u8 {
        const APPLICATION = 1 << 0;
        const COMPOSITION = 1 << 1;
    }
}

/// `>`, `<`, `>B` and `<B` over unification-based categories.
#[derive(Debug, Clone)]
pub struct CcgRules {
    combinators: Combinators,
    unary: Vec<TypeChangingRule>,
    type_changing: Vec<TypeChangingRule>,
}

impl Default for CcgRules {
    fn default() -> Self {
        CcgRules::new()
    }
}

impl CcgRules {
    /// Application and harmonic composition.
    pub fn new() -> Self {
        CcgRules::with_combinators(Combinators::all())
    }

    pub fn with_combinators(combinators: Combinators) -> Self {
        CcgRules { combinators, unary: Vec::new(), type_changing: Vec::new() }
    }

    /// Adds a unary rule. Rules with semantics are indexed for instantiation
    /// by their first pred; the rest apply to every edge.
    pub fn with_rule(mut self, rule: TypeChangingRule) -> Self {
        if rule.lf.is_empty() {
            self.unary.push(rule);
        } else {
            self.type_changing.push(rule);
        }
        self
    }

    /// Parses and adds a unary rule written as `arg => result`.
    pub fn with_unary(self, name: &str, arg: &str, result: &str) -> Result<Self, crate::RealizeError> {
        let rule = TypeChangingRule::new(name, arg.parse()?, result.parse()?, Vec::new());
        Ok(self.with_rule(rule))
    }

    /// Parses and adds a type-changing rule contributing `lf`.
    pub fn with_type_changing(self, name: &str, arg: &str, result: &str, lf: &str) -> Result<Self, crate::RealizeError> {
        let preds = crate::LfInput::parse(lf)?.into_preds();
        let rule = TypeChangingRule::new(name, arg.parse()?, result.parse()?, preds);
        Ok(self.with_rule(rule))
    }
}

impl RuleEngine for CcgRules {
    fn binary(&self, left: &Category, right: &Category) -> Result<Vec<RuleResult>, CombinationFailure> {
        let [right] = apart(left, &[right]);
        let mut results = Vec::new();
        if self.combinators.contains(Combinators::APPLICATION) {
            results.extend(forward_application(left, &right));
            results.extend(backward_application(left, &right));
        }
        if self.combinators.contains(Combinators::COMPOSITION) {
            results.extend(forward_composition(left, &right));
            results.extend(backward_composition(left, &right));
        }
        if results.is_empty() { Err(CombinationFailure::NoResult) } else { Ok(results) }
    }

    fn unary(&self, input: &Category) -> Result<Vec<RuleResult>, CombinationFailure> {
        let results: Vec<RuleResult> = self.unary.iter().filter_map(|rule| type_change(rule, input)).collect();
        if results.is_empty() { Err(CombinationFailure::NoResult) } else { Ok(results) }
    }

    fn apply_instance(
        &self,
        rule: &TypeChangingRule,
        input: &Category,
    ) -> Result<Vec<RuleResult>, CombinationFailure> {
        type_change(rule, input).map(|r| vec![r]).ok_or(CombinationFailure::NoResult)
    }

    fn type_changing_rules_for_pred(&self, pred: &str) -> Vec<TypeChangingRule> {
        self.type_changing.iter().filter(|r| r.lf.first().and_then(|p| p.lex_pred()) == Some(pred)).cloned().collect()
    }

    fn type_changing_rules_for_rel(&self, rel: &str) -> Vec<TypeChangingRule> {
        self.type_changing
            .iter()
            .filter(|r| r.lf.first().is_some_and(|p| !p.is_lex() && p.rel_name() == Some(rel)))
            .cloned()
            .collect()
    }

    fn num_binary_rules(&self) -> usize {
        2 * self.combinators.bits().count_ones() as usize
    }

    fn num_unary_rules(&self) -> usize {
        self.unary.len()
    }
}

// --- Rules --------------------------------------------------------------------

fn unify(a: &Category, b: &Category) -> Option<Substitution> {
    let mut subst = Substitution::new();
    a.unify(b, &mut subst).then_some(subst)
}

/// `X/Y Y => X`
fn forward_application(left: &Category, right: &Category) -> Option<RuleResult> {
    let Category::Complex { result, slash, arg } = left else { return None };
    if slash.dir == SlashDir::Backward {
        return None;
    }
    let subst = unify(arg, right)?;
    Some(RuleResult::new(">", resolve(result, &subst), if slash.modifier { 1 } else { 0 }))
}

/// `Y X\Y => X`
fn backward_application(left: &Category, right: &Category) -> Option<RuleResult> {
    let Category::Complex { result, slash, arg } = right else { return None };
    if slash.dir == SlashDir::Forward {
        return None;
    }
    let subst = unify(arg, left)?;
    Some(RuleResult::new("<", resolve(result, &subst), if slash.modifier { 0 } else { 1 }))
}

/// `X/Y Y/Z => X/Z`
fn forward_composition(left: &Category, right: &Category) -> Option<RuleResult> {
    let Category::Complex { result: x, slash: ls, arg: y } = left else { return None };
    let Category::Complex { result: y2, slash: rs, arg: z } = right else { return None };
    if ls.dir == SlashDir::Backward || rs.dir == SlashDir::Backward {
        return None;
    }
    let subst = unify(y, y2)?;
    let cat = Category::complex(resolve(x, &subst), Slash { dir: rs.dir, modifier: false }, resolve(z, &subst));
    Some(RuleResult::new(">B", cat, if ls.modifier { 1 } else { 0 }))
}

/// `Y\Z X\Y => X\Z`
fn backward_composition(left: &Category, right: &Category) -> Option<RuleResult> {
    let Category::Complex { result: y, slash: ls, arg: z } = left else { return None };
    let Category::Complex { result: x, slash: rs, arg: y2 } = right else { return None };
    if ls.dir == SlashDir::Forward || rs.dir == SlashDir::Forward {
        return None;
    }
    let subst = unify(y2, y)?;
    let cat = Category::complex(resolve(x, &subst), Slash { dir: ls.dir, modifier: false }, resolve(z, &subst));
    Some(RuleResult::new("<B", cat, if rs.modifier { 0 } else { 1 }))
}

fn type_change(rule: &TypeChangingRule, input: &Category) -> Option<RuleResult> {
    let [arg, result] = apart(input, &[&rule.arg, &rule.result]);
    let subst = unify(&arg, input)?;
    Some(RuleResult::new(&rule.name, resolve(&result, &subst), 0))
}

// --- Variables ----------------------------------------------------------------

fn vars(cat: &Category) -> HashSet<Arc<str>> {
    let mut out = HashSet::new();
    cat.for_each_atom(&mut |ac| {
        for value in ac.features.values() {
            if let FeatureValue::Nominal(Nominal::Var(v)) = value {
                out.insert(v.clone());
            }
        }
    });
    out
}

/// Renames the variables of `cats` apart from those of `fixed`, consistently
/// across `cats`.
fn apart<const N: usize>(fixed: &Category, cats: &[&Category; N]) -> [Category; N] {
    let taken = vars(fixed);
    let clashes = |suffix: &str| {
        cats.iter().any(|c| {
            let renamed = if suffix.is_empty() { (*c).clone() } else { c.rename_vars(suffix) };
            !vars(&renamed).is_disjoint(&taken)
        })
    };
    let mut suffix = String::new();
    while clashes(&suffix) {
        suffix.push('\'');
    }
    cats.map(|c| if suffix.is_empty() { c.clone() } else { c.rename_vars(&suffix) })
}

/// Fills `cat` until no bound variable is left; variables may be bound to
/// other variables.
fn resolve(cat: &Category, subst: &Substitution) -> Category {
    let mut cat = cat.fill(subst);
    loop {
        let next = cat.fill(subst);
        if next == cat {
            return cat;
        }
        cat = next;
    }
}
