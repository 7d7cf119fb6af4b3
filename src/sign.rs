//! Signs: words paired with a syntactic category and semantics.
//!
//! A [`Sign`] is what an edge realizes. It carries:
//!
//! - the surface `words`
//! - a [`Category`] (atomic like `np[index=x]`, or complex like `s\np`)
//! - `lf`, the (instantiated) elementary predications the sign contributes;
//!   empty for semantically null words
//! - a [`Derivation`]: lexical, or the rule and the *edge handles* of its
//!   inputs
//!
//! Categories compare structurally and never include the LF, so the
//! `(coverage, category)` chart key groups edges regardless of semantics.
//!
//! ## Category syntax
//!
//! Categories parse from a compact text form used by lexicons and tests:
//!
//! ```text
//! np[x]                 index=x (bare value is the index)
//! np[index=X,num=sg]    X is a variable (leading uppercase)
//! s[E]\np[X]/np[Y]      slashes are left-associative
//! n[X]/^n[X]            ^ marks a modifier slash
//! ```

use crate::RealizeError;
use crate::engine::EdgeId;
use crate::lf::{Nominal, Pred};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// --- Feature values -----------------------------------------------------------

/// A feature value on an atomic category (or an attribute pred's value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureValue {
    Const(Arc<str>),
    Nominal(Nominal),
}

impl FeatureValue {
    /// Leading uppercase parses as a variable, anything else as a constant.
    pub fn parse(s: &str) -> FeatureValue {
        match Nominal::parse(s) {
            var @ Nominal::Var(_) => FeatureValue::Nominal(var),
            Nominal::Atom(_) => FeatureValue::Const(s.into()),
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, FeatureValue::Nominal(Nominal::Var(_)))
    }

    pub fn as_atom(&self) -> Option<&Arc<str>> {
        match self {
            FeatureValue::Nominal(Nominal::Atom(a)) => Some(a),
            _ => None,
        }
    }

    pub fn fill(&self, subst: &Substitution) -> FeatureValue {
        match self {
            FeatureValue::Nominal(Nominal::Var(v)) => subst.get(v).cloned().unwrap_or_else(|| self.clone()),
            _ => self.clone(),
        }
    }

    pub(crate) fn unify(&self, other: &FeatureValue, subst: &mut Substitution) -> bool {
        let lhs = self.fill(subst);
        let rhs = other.fill(subst);
        match (&lhs, &rhs) {
            (FeatureValue::Nominal(Nominal::Var(a)), FeatureValue::Nominal(Nominal::Var(b))) if a == b => true,
            (FeatureValue::Nominal(Nominal::Var(v)), _) => subst.bind(v.clone(), rhs.clone()),
            (_, FeatureValue::Nominal(Nominal::Var(v))) => subst.bind(v.clone(), lhs.clone()),
            _ => lhs.text() == rhs.text(),
        }
    }

    fn text(&self) -> &str {
        match self {
            FeatureValue::Const(c) => c,
            FeatureValue::Nominal(n) => n.name(),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

// --- Substitution -------------------------------------------------------------

/// Variable bindings produced by unification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    bindings: HashMap<Arc<str>, FeatureValue>,
}

impl Substitution {
    pub fn new() -> Self {
        Substitution::default()
    }

    pub fn get(&self, var: &str) -> Option<&FeatureValue> {
        self.bindings.get(var)
    }

    /// Binds `var`, failing if it is already bound to something else.
    pub fn bind(&mut self, var: Arc<str>, value: FeatureValue) -> bool {
        match self.bindings.get(&var) {
            Some(existing) => existing == &value,
            None => {
                self.bindings.insert(var, value);
                true
            }
        }
    }

    pub fn contains_value(&self, value: &FeatureValue) -> bool {
        self.bindings.values().any(|v| v == value)
    }

    /// Keeps only bindings to `value`.
    pub fn retain_value(&mut self, value: &FeatureValue) {
        self.bindings.retain(|_, v| v == value);
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// --- Categories ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomCat {
    pub kind: Arc<str>,
    pub features: BTreeMap<Arc<str>, FeatureValue>,
}

impl AtomCat {
    pub fn new(kind: &str) -> Self {
        AtomCat { kind: kind.into(), features: BTreeMap::new() }
    }

    pub fn with_feature(mut self, attr: &str, value: FeatureValue) -> Self {
        self.features.insert(attr.into(), value);
        self
    }

    pub fn feature(&self, attr: &str) -> Option<&FeatureValue> {
        self.features.get(attr)
    }

    pub fn has_feature(&self, attr: &str) -> bool {
        self.features.contains_key(attr)
    }

    pub fn is_fragment(&self) -> bool {
        &*self.kind == "frag"
    }

    /// Unifies the features two atoms share; attributes present on only one
    /// side are unconstrained.
    pub fn unify_features(&self, other: &AtomCat, subst: &mut Substitution) -> bool {
        self.features.iter().all(|(attr, value)| match other.features.get(attr) {
            Some(other_value) => value.unify(other_value, subst),
            None => true,
        })
    }

    pub fn fill(&self, subst: &Substitution) -> AtomCat {
        AtomCat {
            kind: self.kind.clone(),
            features: self.features.iter().map(|(k, v)| (k.clone(), v.fill(subst))).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlashDir {
    Forward,
    Backward,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slash {
    pub dir: SlashDir,
    pub modifier: bool,
}

impl Slash {
    pub fn forward() -> Self {
        Slash { dir: SlashDir::Forward, modifier: false }
    }

    pub fn backward() -> Self {
        Slash { dir: SlashDir::Backward, modifier: false }
    }
}

/// A syntactic category. Equality and hashing ignore semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Atom(AtomCat),
    Complex { result: Box<Category>, slash: Slash, arg: Box<Category> },
}

impl Category {
    pub fn atom(kind: &str) -> Self {
        Category::Atom(AtomCat::new(kind))
    }

    pub fn complex(result: Category, slash: Slash, arg: Category) -> Self {
        Category::Complex { result: Box::new(result), slash, arg: Box::new(arg) }
    }

    pub fn as_atom(&self) -> Option<&AtomCat> {
        match self {
            Category::Atom(ac) => Some(ac),
            Category::Complex { .. } => None,
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.as_atom().is_some_and(AtomCat::is_fragment)
    }

    /// The innermost result category.
    pub fn target(&self) -> &AtomCat {
        match self {
            Category::Atom(ac) => ac,
            Category::Complex { result, .. } => result.target(),
        }
    }

    /// The outermost argument, i.e. the one consumed first.
    pub fn outer_arg(&self) -> Option<&Category> {
        match self {
            Category::Atom(_) => None,
            Category::Complex { arg, .. } => Some(arg),
        }
    }

    /// True for `X/X`-style categories whose outer slash is a modifier slash.
    pub fn is_modifier(&self) -> bool {
        matches!(self, Category::Complex { slash, .. } if slash.modifier)
    }

    /// The target's `index` nominal, if it is a constant.
    pub fn index_nominal(&self) -> Option<&Arc<str>> {
        self.target().feature("index").and_then(FeatureValue::as_atom)
    }

    /// Visits every atomic category, results before arguments.
    pub fn for_each_atom<'a>(&'a self, f: &mut impl FnMut(&'a AtomCat)) {
        match self {
            Category::Atom(ac) => f(ac),
            Category::Complex { result, arg, .. } => {
                result.for_each_atom(f);
                arg.for_each_atom(f);
            }
        }
    }

    pub fn for_each_atom_mut(&mut self, f: &mut impl FnMut(&mut AtomCat)) {
        match self {
            Category::Atom(ac) => f(ac),
            Category::Complex { result, arg, .. } => {
                result.for_each_atom_mut(f);
                arg.for_each_atom_mut(f);
            }
        }
    }

    pub fn atoms(&self) -> Vec<&AtomCat> {
        let mut atoms = Vec::new();
        self.for_each_atom(&mut |ac| atoms.push(ac));
        atoms
    }

    pub fn fill(&self, subst: &Substitution) -> Category {
        match self {
            Category::Atom(ac) => Category::Atom(ac.fill(subst)),
            Category::Complex { result, slash, arg } => Category::complex(result.fill(subst), *slash, arg.fill(subst)),
        }
    }

    /// Renames every variable with `suffix`, keeping constants.
    pub fn rename_vars(&self, suffix: &str) -> Category {
        let mut renamed = self.clone();
        renamed.for_each_atom_mut(&mut |ac| {
            for value in ac.features.values_mut() {
                if let FeatureValue::Nominal(Nominal::Var(v)) = value {
                    *value = FeatureValue::Nominal(Nominal::Var(format!("{v}{suffix}").into()));
                }
            }
        });
        renamed
    }

    /// Structural unification: same shape, same atom kinds, unifiable features.
    pub fn unify(&self, other: &Category, subst: &mut Substitution) -> bool {
        match (self, other) {
            (Category::Atom(a), Category::Atom(b)) => a.kind == b.kind && a.unify_features(b, subst),
            (
                Category::Complex { result: r1, slash: s1, arg: a1 },
                Category::Complex { result: r2, slash: s2, arg: a2 },
            ) => {
                let dirs_match = s1.dir == s2.dir || s1.dir == SlashDir::Either || s2.dir == SlashDir::Either;
                dirs_match && r1.unify(r2, subst) && a1.unify(a2, subst)
            }
            _ => false,
        }
    }
}

impl fmt::Display for AtomCat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        if !self.features.is_empty() {
            let feats: Vec<String> = self.features.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "[{}]", feats.join(","))?;
        }
        Ok(())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Atom(ac) => write!(f, "{ac}"),
            Category::Complex { result, slash, arg } => {
                let s = match slash.dir {
                    SlashDir::Forward => "/",
                    SlashDir::Backward => "\\",
                    SlashDir::Either => "|",
                };
                let m = if slash.modifier { "^" } else { "" };
                match arg.as_ref() {
                    Category::Atom(_) => write!(f, "{result}{s}{m}{arg}"),
                    Category::Complex { .. } => write!(f, "{result}{s}{m}({arg})"),
                }
            }
        }
    }
}

impl FromStr for Category {
    type Err = RealizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = regex!(r"\(|\)|[/\\|]\^?|[A-Za-z_][A-Za-z0-9_-]*(?:\[[^\]]*\])?")
            .find_iter(s)
            .map(|m| m.as_str())
            .collect();
        let consumed: usize = tokens.iter().map(|t| t.len()).sum();
        if consumed != s.chars().filter(|c| !c.is_whitespace()).count() {
            return Err(RealizeError::InvalidCategory(s.to_string()));
        }
        let mut parser = CatParser { tokens, pos: 0, source: s };
        let cat = parser.category()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error());
        }
        Ok(cat)
    }
}

struct CatParser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
    source: &'a str,
}

impl CatParser<'_> {
    fn error(&self) -> RealizeError {
        RealizeError::InvalidCategory(self.source.to_string())
    }

    fn category(&mut self) -> Result<Category, RealizeError> {
        let mut cat = self.primary()?;
        while let Some(tok) = self.tokens.get(self.pos).copied() {
            let dir = match tok.chars().next() {
                Some('/') => SlashDir::Forward,
                Some('\\') => SlashDir::Backward,
                Some('|') => SlashDir::Either,
                _ => break,
            };
            self.pos += 1;
            let slash = Slash { dir, modifier: tok.ends_with('^') };
            let arg = self.primary()?;
            cat = Category::complex(cat, slash, arg);
        }
        Ok(cat)
    }

    fn primary(&mut self) -> Result<Category, RealizeError> {
        let tok = self.tokens.get(self.pos).copied().ok_or_else(|| self.error())?;
        self.pos += 1;
        if tok == "(" {
            let cat = self.category()?;
            if self.tokens.get(self.pos).copied() != Some(")") {
                return Err(self.error());
            }
            self.pos += 1;
            return Ok(cat);
        }
        if !tok.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            return Err(self.error());
        }
        let (kind, feats) = match tok.find('[') {
            Some(i) => (&tok[..i], &tok[i + 1..tok.len() - 1]),
            None => (tok, ""),
        };
        let mut atom = AtomCat::new(kind);
        for feat in feats.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (attr, value) = feat.split_once('=').unwrap_or(("index", feat));
            let value = if attr == "index" || attr == "mod-index" {
                FeatureValue::Nominal(Nominal::parse(value))
            } else {
                FeatureValue::parse(value)
            };
            atom.features.insert(attr.into(), value);
        }
        Ok(Category::Atom(atom))
    }
}

// --- Words and signs ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Word {
    pub form: Arc<str>,
    pub stem: Arc<str>,
    pub pos: Arc<str>,
    pub supertag: Arc<str>,
}

impl Word {
    pub fn new(form: &str) -> Self {
        Word { form: form.into(), stem: form.into(), pos: "".into(), supertag: "".into() }
    }

    pub fn with_stem(mut self, stem: &str) -> Self {
        self.stem = stem.into();
        self
    }

    pub fn with_pos(mut self, pos: &str) -> Self {
        self.pos = pos.into();
        self
    }

    pub fn with_supertag(mut self, supertag: &str) -> Self {
        self.supertag = supertag.into();
        self
    }
}

/// How a sign was built. Rule inputs are edge handles, never owned signs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Derivation {
    Lexical,
    Rule {
        rule: Arc<str>,
        inputs: Vec<EdgeId>,
        /// Position in `inputs` of the head daughter.
        head: usize,
    },
}

impl Derivation {
    pub fn inputs(&self) -> &[EdgeId] {
        match self {
            Derivation::Lexical => &[],
            Derivation::Rule { inputs, .. } => inputs,
        }
    }

    pub fn rule(&self) -> Option<&Arc<str>> {
        match self {
            Derivation::Lexical => None,
            Derivation::Rule { rule, .. } => Some(rule),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sign {
    pub words: Vec<Word>,
    pub category: Category,
    pub lf: Vec<Pred>,
    pub derivation: Derivation,
    /// Derivation steps plus extra weight for composition, substitution and
    /// crossing steps; 0 for lexical signs.
    pub complexity: u32,
    /// Set on fragments whose chunk or alt has been completed while gluing.
    pub frag_completion: bool,
}

impl Sign {
    pub fn lexical(words: Vec<Word>, category: Category, lf: Vec<Pred>) -> Self {
        Sign { words, category, lf, derivation: Derivation::Lexical, complexity: 0, frag_completion: false }
    }

    /// Builds the sign for a rule application; `inputs` are in surface order.
    pub fn derived(rule: &Arc<str>, category: Category, inputs: &[(EdgeId, &Sign)], head: usize) -> Self {
        let words = inputs.iter().flat_map(|(_, s)| s.words.iter().cloned()).collect();
        let lf = inputs.iter().flat_map(|(_, s)| s.lf.iter().cloned()).collect();
        let complexity = step_complexity(rule) + inputs.iter().map(|(_, s)| s.complexity).sum::<u32>();
        Sign {
            words,
            category,
            lf,
            derivation: Derivation::Rule { rule: rule.clone(), inputs: inputs.iter().map(|(id, _)| *id).collect(), head },
            complexity,
            frag_completion: false,
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self.derivation, Derivation::Lexical)
    }

    /// True for semantically null signs.
    pub fn is_empty_semantics(&self) -> bool {
        self.lf.is_empty()
    }

    /// Supertag of a lexical sign.
    pub fn supertag(&self) -> Option<&str> {
        match self.derivation {
            Derivation::Lexical => self.words.first().map(|w| &*w.supertag),
            Derivation::Rule { .. } => None,
        }
    }

    pub fn orthography(&self) -> String {
        self.words.iter().map(|w| &*w.form).collect::<Vec<_>>().join(" ")
    }

    /// Instantiates the category and semantics of a lexical template.
    pub fn fill(&self, subst: &Substitution) -> Sign {
        Sign {
            words: self.words.clone(),
            category: self.category.fill(subst),
            lf: self.lf.iter().map(|p| p.fill(subst)).collect(),
            derivation: self.derivation.clone(),
            complexity: self.complexity,
            frag_completion: self.frag_completion,
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :- {}", self.orthography(), self.category)?;
        if self.frag_completion {
            write!(f, "_c")?;
        }
        Ok(())
    }
}

/// `>B`, `<S` and friends cost one extra step; crossed variants one more.
fn step_complexity(rule: &str) -> u32 {
    let bytes = rule.as_bytes();
    let mut cost = 1;
    if bytes.len() > 1 && (bytes[0] == b'>' || bytes[0] == b'<') && (bytes[1] == b'B' || bytes[1] == b'S') {
        cost += 1;
        if bytes.len() == 3 && bytes[2] == b'x' {
            cost += 1;
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(s: &str) -> Category {
        s.parse().unwrap()
    }

    #[test]
    fn parses_left_associative_slashes() {
        let c = cat(r"s[E]\np[X]/np[Y]");
        let Category::Complex { result, slash, arg } = &c else { panic!("expected complex") };
        assert_eq!(slash.dir, SlashDir::Forward);
        assert_eq!(arg.to_string(), "np[index=Y]");
        assert_eq!(result.to_string(), r"s[index=E]\np[index=X]");
        assert_eq!(c.target().kind.as_ref(), "s");
    }

    #[test]
    fn parses_parentheses_and_modifiers() {
        let c = cat(r"(s\np)/^(s\np)");
        assert!(c.is_modifier());
        assert_eq!(c.to_string(), r"s\np/^(s\np)");
        assert_eq!(cat(&c.to_string()), c);
    }

    #[test]
    fn rejects_garbage() {
        assert!("np[x".parse::<Category>().is_err());
        assert!("(np".parse::<Category>().is_err());
        assert!("np/".parse::<Category>().is_err());
    }

    #[test]
    fn index_values_are_nominals() {
        let c = cat("np[x1,num=sg,case=C]");
        let ac = c.as_atom().unwrap();
        assert_eq!(ac.feature("index"), Some(&FeatureValue::Nominal(Nominal::atom("x1"))));
        assert_eq!(ac.feature("num"), Some(&FeatureValue::Const("sg".into())));
        assert!(ac.feature("case").is_some_and(FeatureValue::is_var));
        assert_eq!(c.index_nominal().map(|n| n.as_ref()), Some("x1"));
    }

    #[test]
    fn fill_replaces_bound_variables() {
        let mut subst = Substitution::new();
        assert!(subst.bind("X".into(), FeatureValue::Nominal(Nominal::atom("x"))));
        assert!(!subst.bind("X".into(), FeatureValue::Nominal(Nominal::atom("y"))));
        assert_eq!(cat(r"s[E]\np[X]").fill(&subst), cat(r"s[E]\np[x]"));
    }

    #[test]
    fn unification_checks_shape_and_features() {
        let mut subst = Substitution::new();
        assert!(cat("np[X,num=sg]").unify(&cat("np[x]"), &mut subst));
        assert!(!cat("np[num=sg]").unify(&cat("np[num=pl]"), &mut Substitution::new()));
        assert!(!cat("np").unify(&cat("n"), &mut Substitution::new()));
        assert!(!cat(r"s\np").unify(&cat("s/np"), &mut Substitution::new()));
    }

    #[test]
    fn complexity_weights_composition_and_crossing() {
        assert_eq!(step_complexity(">"), 1);
        assert_eq!(step_complexity(">B"), 2);
        assert_eq!(step_complexity("<Bx"), 3);
        assert_eq!(step_complexity("glue"), 1);
    }
}
