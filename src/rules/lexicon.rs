use crate::grammar::Lexicon;
use crate::lf::LfInput;
use crate::sign::{Category, Sign, Word};
use crate::{LicensingFeature, RealizeError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Signs held in memory, indexed the way the factory looks them up.
///
/// Entries are written one per line:
///
/// ```text
/// # form[/stem[/POS]] :- category [: lf]
/// dog/dog/NN   :- n[X]           : @X(dog)
/// runs/run/VBZ :- s[E]\np[X]     : @E(run) @E<agent>X
/// the          :- np[X]/^n[X]
/// ```
///
/// An entry without `lf` is semantically null. The supertag of each word is
/// its category with features stripped.
#[derive(Debug, Clone, Default)]
pub struct MemoryLexicon {
    by_pred: HashMap<Arc<str>, Vec<Sign>>,
    by_rel: HashMap<Arc<str>, Vec<Sign>>,
    null: Vec<Sign>,
    coart_rels: HashSet<Arc<str>>,
    licensing: Option<Vec<LicensingFeature>>,
}

impl MemoryLexicon {
    pub fn new() -> Self {
        MemoryLexicon::default()
    }

    pub fn parse(text: &str) -> Result<Self, RealizeError> {
        let mut lexicon = MemoryLexicon::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let caps = regex!(r"^(\S+)\s*:-\s*([^:]+?)\s*(?::\s*(.*))?$")
                .captures(line)
                .ok_or_else(|| RealizeError::InvalidCategory(line.to_string()))?;
            let lf = caps.get(3).map_or("", |m| m.as_str());
            lexicon = lexicon.entry(&caps[1], &caps[2], lf)?;
        }
        Ok(lexicon)
    }

    /// Adds one entry; see the type docs for the word syntax.
    pub fn entry(mut self, word: &str, category: &str, lf: &str) -> Result<Self, RealizeError> {
        let category: Category = category.parse()?;
        let supertag = regex!(r"\[[^\]]*\]").replace_all(&category.to_string(), "").into_owned();
        let mut parts = word.split('/');
        let form = parts.next().unwrap_or(word);
        let mut w = Word::new(form).with_supertag(&supertag);
        if let Some(stem) = parts.next() {
            w = w.with_stem(stem);
        }
        if let Some(pos) = parts.next() {
            w = w.with_pos(pos);
        }
        let preds = LfInput::parse(lf)?.into_preds();
        self.add(Sign::lexical(vec![w], category, preds));
        Ok(self)
    }

    /// Indexes `sign` by its first lexical pred, else by its first relation
    /// or attribute; signs without semantics are semantically null.
    pub fn add(&mut self, sign: Sign) {
        if let Some(pred) = sign.lf.iter().find_map(|p| p.lex_pred()) {
            self.by_pred.entry(pred.into()).or_default().push(sign);
        } else if let Some(rel) = sign.lf.iter().find_map(|p| p.rel_name()) {
            self.by_rel.entry(rel.into()).or_default().push(sign);
        } else {
            self.null.push(sign);
        }
    }

    /// Marks `rel` as a coarticulation relation.
    pub fn with_coart_rel(mut self, rel: &str) -> Self {
        self.coart_rels.insert(rel.into());
        self
    }

    pub fn with_licensing_features(mut self, features: Vec<LicensingFeature>) -> Self {
        self.licensing = Some(features);
        self
    }

    pub fn len(&self) -> usize {
        self.by_pred.values().chain(self.by_rel.values()).map(Vec::len).sum::<usize>() + self.null.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lexicon for MemoryLexicon {
    /// Coarticulations are matched by the sign templates themselves; the
    /// relations play no part in lookup.
    fn signs_for_pred(&self, pred: &str, _coart_rels: &[Arc<str>]) -> Vec<Sign> {
        self.by_pred.get(pred).cloned().unwrap_or_default()
    }

    fn signs_for_rel(&self, rel: &str) -> Vec<Sign> {
        self.by_rel.get(rel).cloned().unwrap_or_default()
    }

    fn semantically_null_signs(&self) -> Vec<Sign> {
        self.null.clone()
    }

    fn is_coart_rel(&self, rel: &str) -> bool {
        self.coart_rels.contains(rel)
    }

    fn licensing_features(&self) -> Vec<LicensingFeature> {
        self.licensing.clone().unwrap_or_else(|| vec![LicensingFeature::default_lex()])
    }
}
