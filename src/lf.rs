//! Flattened logical forms.
//!
//! The realizer never sees a nested logical form. The input is a flat, ordered
//! list of elementary predications ("preds"), each one of:
//!
//! ```text
//! @e(run)        lexical pred     nominal e has predicate "run"
//! @e<Agent>x     relation pred    nominal e relates to nominal x via Agent
//! @x<num>=sg     attribute pred   nominal x has feature num with value sg
//! ```
//!
//! Every coverage bitset in the engine is a set of positions in this list, so a
//! pred's position is fixed once an [`LfInput`] has been handed to the factory.
//!
//! Preds also carry the LF structure the search must respect: chunk ids, alt
//! memberships (`AltId`) and optional-part ids. These are annotations on the
//! pred rather than separate tables, and `EdgeFactory` turns them into bitsets.
//!
//! Nominals whose name starts with an uppercase letter are variables; they only
//! occur in the semantic templates of lexical signs and type-changing rules.

use crate::RealizeError;
use crate::sign::{FeatureValue, Substitution};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// --- Nominals -----------------------------------------------------------------

/// A semantic index: either a constant (`x1`) or a variable (`X`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Nominal {
    Atom(Arc<str>),
    Var(Arc<str>),
}

impl Nominal {
    /// Parses a nominal name; a leading uppercase letter makes a variable.
    pub fn parse(name: &str) -> Nominal {
        if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            Nominal::Var(name.into())
        } else {
            Nominal::Atom(name.into())
        }
    }

    pub fn atom(name: &str) -> Nominal {
        Nominal::Atom(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Nominal::Atom(n) | Nominal::Var(n) => n,
        }
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Nominal::Atom(_))
    }

    /// Applies `subst`, leaving unbound variables in place.
    pub fn fill(&self, subst: &Substitution) -> Nominal {
        match self {
            Nominal::Var(v) => match subst.get(v) {
                Some(FeatureValue::Nominal(n)) => n.clone(),
                _ => self.clone(),
            },
            Nominal::Atom(_) => self.clone(),
        }
    }

    /// Unifies two nominals, binding variables in `subst`.
    pub(crate) fn unify(&self, other: &Nominal, subst: &mut Substitution) -> bool {
        let lhs = self.fill(subst);
        let rhs = other.fill(subst);
        match (&lhs, &rhs) {
            (Nominal::Atom(a), Nominal::Atom(b)) => a == b,
            (Nominal::Var(a), Nominal::Var(b)) if a == b => true,
            (Nominal::Var(v), _) => subst.bind(v.clone(), FeatureValue::Nominal(rhs.clone())),
            (_, Nominal::Var(v)) => subst.bind(v.clone(), FeatureValue::Nominal(lhs.clone())),
        }
    }
}

impl fmt::Display for Nominal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// --- Preds ------------------------------------------------------------------------

/// One option within a disjunctive group of LF alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AltId {
    /// The alt set (disjunction) this alt belongs to.
    pub set: usize,
    /// Position of the alt within its set.
    pub num: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PredKind {
    Lex { pred: Arc<str> },
    Rel { rel: Arc<str>, target: Nominal },
    Attr { rel: Arc<str>, value: FeatureValue },
}

/// An elementary predication with its LF-structure annotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pred {
    pub nominal: Nominal,
    pub kind: PredKind,
    /// Chunk ids this pred belongs to.
    pub chunks: Vec<usize>,
    /// Alternatives this pred belongs to.
    pub alts: Vec<AltId>,
    /// Optional-part ids this pred belongs to.
    pub opts: Vec<usize>,
}

impl Pred {
    pub fn lex(nominal: Nominal, pred: &str) -> Pred {
        Pred::with_kind(nominal, PredKind::Lex { pred: pred.into() })
    }

    pub fn rel(nominal: Nominal, rel: &str, target: Nominal) -> Pred {
        Pred::with_kind(nominal, PredKind::Rel { rel: rel.into(), target })
    }

    pub fn attr(nominal: Nominal, rel: &str, value: FeatureValue) -> Pred {
        Pred::with_kind(nominal, PredKind::Attr { rel: rel.into(), value })
    }

    fn with_kind(nominal: Nominal, kind: PredKind) -> Pred {
        Pred { nominal, kind, chunks: Vec::new(), alts: Vec::new(), opts: Vec::new() }
    }

    pub fn principal(&self) -> &Nominal {
        &self.nominal
    }

    pub fn secondary(&self) -> Option<&Nominal> {
        match &self.kind {
            PredKind::Rel { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn lex_pred(&self) -> Option<&str> {
        match &self.kind {
            PredKind::Lex { pred } => Some(pred),
            _ => None,
        }
    }

    /// Relation or attribute name.
    pub fn rel_name(&self) -> Option<&str> {
        match &self.kind {
            PredKind::Rel { rel, .. } | PredKind::Attr { rel, .. } => Some(rel),
            PredKind::Lex { .. } => None,
        }
    }

    pub fn is_lex(&self) -> bool {
        matches!(self.kind, PredKind::Lex { .. })
    }

    pub fn is_rel(&self) -> bool {
        matches!(self.kind, PredKind::Rel { .. })
    }

    pub fn is_attr(&self) -> bool {
        matches!(self.kind, PredKind::Attr { .. })
    }

    /// Lookup keys for matching template preds against input preds.
    ///
    /// `x(pred)` for lexical preds, `x<rel>` for relations and attributes and
    /// `<rel>y` for relation targets; only constant nominals produce keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let (Nominal::Atom(nom), Some(pred)) = (&self.nominal, self.lex_pred()) {
            keys.push(format!("{nom}({pred})"));
        }
        if let (Nominal::Atom(nom), Some(rel)) = (&self.nominal, self.rel_name()) {
            keys.push(format!("{nom}<{rel}>"));
        }
        if let (Some(Nominal::Atom(target)), Some(rel)) = (self.secondary(), self.rel_name()) {
            keys.push(format!("<{rel}>{target}"));
        }
        keys
    }

    /// Unifies this (template) pred with `other`, extending `subst`.
    ///
    /// On failure `subst` is left untouched.
    pub fn unify(&self, other: &Pred, subst: &mut Substitution) -> bool {
        let mut trial = subst.clone();
        let ok = self.nominal.unify(&other.nominal, &mut trial)
            && match (&self.kind, &other.kind) {
                (PredKind::Lex { pred: a }, PredKind::Lex { pred: b }) => a == b,
                (PredKind::Rel { rel: a, target: ta }, PredKind::Rel { rel: b, target: tb }) => {
                    a == b && ta.unify(tb, &mut trial)
                }
                (PredKind::Attr { rel: a, value: va }, PredKind::Attr { rel: b, value: vb }) => {
                    a == b && va.unify(vb, &mut trial)
                }
                _ => false,
            };
        if ok {
            *subst = trial;
        }
        ok
    }

    pub fn fill(&self, subst: &Substitution) -> Pred {
        let kind = match &self.kind {
            PredKind::Lex { pred } => PredKind::Lex { pred: pred.clone() },
            PredKind::Rel { rel, target } => PredKind::Rel { rel: rel.clone(), target: target.fill(subst) },
            PredKind::Attr { rel, value } => PredKind::Attr { rel: rel.clone(), value: value.fill(subst) },
        };
        Pred { nominal: self.nominal.fill(subst), kind, ..self.clone() }
    }
}

impl FromStr for Pred {
    type Err = RealizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = regex!(r"^@([A-Za-z0-9_]+)(?:\(([^()\s]+)\)|<([A-Za-z0-9_-]+)>(=)?([A-Za-z0-9_.+-]+))$");
        let caps = re.captures(s.trim()).ok_or_else(|| RealizeError::InvalidPred(s.to_string()))?;
        let nominal = Nominal::parse(&caps[1]);
        if let Some(pred) = caps.get(2) {
            return Ok(Pred::lex(nominal, pred.as_str()));
        }
        let rel = &caps[3];
        let target = &caps[5];
        if caps.get(4).is_some() {
            Ok(Pred::attr(nominal, rel, FeatureValue::parse(target)))
        } else {
            Ok(Pred::rel(nominal, rel, Nominal::parse(target)))
        }
    }
}

impl fmt::Display for Pred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PredKind::Lex { pred } => write!(f, "@{}({})", self.nominal, pred),
            PredKind::Rel { rel, target } => write!(f, "@{}<{}>{}", self.nominal, rel, target),
            PredKind::Attr { rel, value } => write!(f, "@{}<{}>={}", self.nominal, rel, value),
        }
    }
}

// --- Input ------------------------------------------------------------------------

/// A realization request's logical form: preds in fixed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LfInput {
    preds: Vec<Pred>,
}

impl LfInput {
    pub fn new(preds: Vec<Pred>) -> Self {
        LfInput { preds }
    }

    /// Parses preds separated by whitespace or `^`.
    pub fn parse(text: &str) -> Result<Self, RealizeError> {
        let preds = regex!(r"[\s^]+")
            .split(text.trim())
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Pred>, _>>()?;
        Ok(LfInput { preds })
    }

    /// Marks `members` as belonging to chunk `id`.
    pub fn with_chunk(mut self, id: usize, members: &[usize]) -> Self {
        for &i in members {
            if let Some(pred) = self.preds.get_mut(i) {
                pred.chunks.push(id);
            }
        }
        self
    }

    /// Marks `members` as alternative `num` of alt set `set`.
    pub fn with_alt(mut self, set: usize, num: usize, members: &[usize]) -> Self {
        for &i in members {
            if let Some(pred) = self.preds.get_mut(i) {
                pred.alts.push(AltId { set, num });
            }
        }
        self
    }

    /// Marks `members` as belonging to optional part `id`.
    pub fn with_opt(mut self, id: usize, members: &[usize]) -> Self {
        for &i in members {
            if let Some(pred) = self.preds.get_mut(i) {
                pred.opts.push(id);
            }
        }
        self
    }

    pub fn preds(&self) -> &[Pred] {
        &self.preds
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub(crate) fn into_preds(self) -> Vec<Pred> {
        self.preds
    }
}

impl FromStr for LfInput {
    type Err = RealizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LfInput::parse(s)
    }
}
