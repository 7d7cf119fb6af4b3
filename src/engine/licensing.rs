//! Feature licensing for marked and semantically null categories.
//!
//! Some lexical categories may only be used when another category in the same
//! request licenses them. The usual case is a semantically null word such as
//! an infinitival `to` or a case-marking preposition: its category carries
//! `lex=to`, and it is only worth adding to the chart if some other initial
//! category subcategorizes for `lex=to`.
//!
//! The licenser keeps a feature map
//!
//! ```text
//! attr ──► value ──► [atomic categories carrying attr=value]
//! ```
//!
//! built incrementally from every admitted initial category. A category that
//! *needs* licensing (it carries a licensing feature at the right location)
//! becomes usable once the map holds its value, or one of the feature's
//! `also_licensed_by` values.
//!
//! Semantically null categories are additionally *instantiated*: when the
//! licensing feature has a single value on the category, its index variable
//! is unified with the index of each licensing atom, so that the resulting
//! edge only combines with the category that asked for it.

use super::factory::NominalIndex;
use crate::lf::Nominal;
use crate::sign::{AtomCat, Category, FeatureValue, Substitution};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Where on a category a licensing feature counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseLoc {
    TargetOnly,
    ArgsOnly,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LicensingFeature {
    pub attr: Arc<str>,
    /// Required value, or `None` if any value counts.
    pub val: Option<Arc<str>>,
    /// Other values that license categories with this feature.
    pub also_licensed_by: Vec<Arc<str>>,
    /// Semantically null categories with the feature need licensing.
    pub license_empty_cats: bool,
    /// Initial categories with the feature are marked and need licensing.
    pub license_marked_cats: bool,
    /// Semantically null categories with the feature get instantiated.
    pub instantiate: bool,
    pub loc: LicenseLoc,
}

static DEFAULT_LEX: Lazy<LicensingFeature> = Lazy::new(|| LicensingFeature {
    attr: "lex".into(),
    val: None,
    also_licensed_by: Vec::new(),
    license_empty_cats: true,
    license_marked_cats: false,
    instantiate: true,
    loc: LicenseLoc::Both,
});

static SIMPLE_LEX: Lazy<LicensingFeature> =
    Lazy::new(|| LicensingFeature { instantiate: false, ..DEFAULT_LEX.clone() });

impl LicensingFeature {
    /// `lex`, licensing empty categories and instantiating them.
    pub fn default_lex() -> Self {
        DEFAULT_LEX.clone()
    }

    /// `lex` without instantiation; used when feature licensing is off.
    pub fn simple_lex() -> Self {
        SIMPLE_LEX.clone()
    }

    fn admits(&self, value: &str) -> bool {
        match &self.val {
            None => true,
            Some(v) => &**v == value || self.also_licensed_by.iter().any(|a| &**a == value),
        }
    }
}

type ValMap = BTreeMap<Arc<str>, Vec<AtomCat>>;
type FeatureMap = BTreeMap<Arc<str>, ValMap>;

/// Outcome of [`FeatureLicenser::license_empty_cat`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicensedCats {
    pub instantiated: Vec<Category>,
    pub uninstantiated: Vec<Category>,
}

#[derive(Debug, Clone)]
pub struct FeatureLicenser {
    features: Vec<LicensingFeature>,
    feature_map: FeatureMap,
    all_initial_atoms: Vec<AtomCat>,
    word_indices: HashMap<Arc<str>, Arc<str>>,
    word_counter: usize,
}

impl FeatureLicenser {
    pub fn new(features: Vec<LicensingFeature>) -> Self {
        FeatureLicenser {
            features,
            feature_map: FeatureMap::new(),
            all_initial_atoms: Vec::new(),
            word_indices: HashMap::new(),
            word_counter: 0,
        }
    }

    pub fn features(&self) -> &[LicensingFeature] {
        &self.features
    }

    // --- Semantically null word indexing -------------------------------------

    /// Gives every atom with a `lex` value but no constant index a fresh
    /// nominal `wN`, shared by all atoms with the same `lex` value.
    pub(crate) fn index_semantically_null_words(&mut self, cat: &mut Category, nominals: &mut NominalIndex) {
        cat.for_each_atom_mut(&mut |ac| {
            let Some(lex) = ac.feature("lex").map(|v| Arc::<str>::from(v.to_string())) else { return };
            let needs_index = match ac.feature("index") {
                None => true,
                Some(v) => v.is_var(),
            };
            if !needs_index {
                return;
            }
            let name = match self.word_indices.get(&lex) {
                Some(name) => name.clone(),
                None => {
                    let name: Arc<str> = loop {
                        self.word_counter += 1;
                        let candidate = format!("w{}", self.word_counter);
                        if !nominals.contains(&candidate) {
                            break candidate.into();
                        }
                    };
                    nominals.insert(&name);
                    self.word_indices.insert(lex, name.clone());
                    name
                }
            };
            ac.features.insert("index".into(), FeatureValue::Nominal(Nominal::Atom(name)));
        });
    }

    // --- Feature map ---------------------------------------------------------

    /// Records the licensing values carried by an admitted initial category.
    pub fn update_feature_map(&mut self, cat: &Category) {
        let features = &self.features;
        let feature_map = &mut self.feature_map;
        let all = &mut self.all_initial_atoms;
        cat.for_each_atom(&mut |ac| {
            if !all.contains(ac) {
                all.push(ac.clone());
            }
            record_atom(features, ac, feature_map);
        });
    }

    fn cat_feature_map(&self, cat: &Category) -> FeatureMap {
        let mut map = FeatureMap::new();
        cat.for_each_atom(&mut |ac| record_atom(&self.features, ac, &mut map));
        map
    }

    // --- Licensing -----------------------------------------------------------

    /// Whether `cat` carries a feature that must be licensed. `empty` marks
    /// semantically null categories.
    pub fn needs_licensing(&self, cat: &Category, empty: bool) -> bool {
        self.check_licensing(cat, empty, true).is_some()
    }

    /// Whether the current feature map licenses `cat`.
    pub fn is_licensed(&self, cat: &Category, empty: bool) -> bool {
        self.check_licensing(cat, empty, false).is_some()
    }

    /// Returns the index of the operative feature (`needs` mode: the first
    /// feature found; licensing mode: the feature that licensed the category).
    fn check_licensing(&self, cat: &Category, empty: bool, needs: bool) -> Option<Option<usize>> {
        let cat_map = self.cat_feature_map(cat);
        let target = cat.target();
        for (i, feature) in self.features.iter().enumerate() {
            if empty && !feature.license_empty_cats || !empty && !feature.license_marked_cats {
                continue;
            }
            let Some(val_map) = cat_map.get(&feature.attr) else { continue };
            let vals: Vec<&Arc<str>> = match &feature.val {
                Some(v) if val_map.contains_key(v) => vec![v],
                Some(_) => continue,
                None => val_map.keys().collect(),
            };
            for val in vals {
                let atoms = &val_map[val];
                match feature.loc {
                    LicenseLoc::TargetOnly if atoms.len() != 1 || !atoms.contains(target) => continue,
                    LicenseLoc::ArgsOnly if atoms.contains(target) => continue,
                    _ => {}
                }
                if needs {
                    return Some(None);
                }
                let fm_vals = self.feature_map.get(&feature.attr)?;
                let found = fm_vals.contains_key(val) || feature.also_licensed_by.iter().any(|a| fm_vals.contains_key(a));
                return if found { Some(Some(i)) } else { None };
            }
        }
        None
    }

    /// Licenses a semantically null category, returning the instantiated
    /// versions (bound to licensing indices) and uninstantiated ones.
    ///
    /// Instantiation only happens when the operative feature has a single
    /// value on the category; a licensing atom whose index is a bound
    /// variable blocks instantiation altogether.
    pub(crate) fn license_empty_cat(&self, cat: &Category, bound_vars: &HashSet<Arc<str>>) -> LicensedCats {
        let mut out = LicensedCats::default();
        if !self.needs_licensing(cat, true) {
            out.uninstantiated.push(cat.clone());
            return out;
        }
        let Some(licensed_by) = self.check_licensing(cat, true, false) else { return out };
        let cat_map = self.cat_feature_map(cat);
        let operative = licensed_by.or_else(|| {
            self.features.iter().position(|f| match cat_map.get(&f.attr) {
                None => false,
                Some(vals) => f.val.as_ref().is_none_or(|v| vals.contains_key(v)),
            })
        });
        let Some(feature) = operative.map(|i| &self.features[i]) else {
            out.uninstantiated.push(cat.clone());
            return out;
        };
        let val_map = cat_map.get(&feature.attr);
        let single_val = match val_map {
            Some(vals) if vals.len() == 1 => vals.keys().next().cloned(),
            _ => None,
        };
        let Some(val) = single_val.filter(|_| feature.instantiate) else {
            out.uninstantiated.push(cat.clone());
            return out;
        };

        // Give lex atoms an index variable to bind.
        let mut cat = cat.clone();
        let mut counter = 0;
        cat.for_each_atom_mut(&mut |ac| {
            let carries = ac.feature(&feature.attr).is_some_and(|v| !v.is_var() && *v.to_string() == *val);
            if carries && ac.has_feature("lex") && !ac.has_feature("index") {
                counter += 1;
                ac.features.insert("index".into(), FeatureValue::Nominal(Nominal::Var(format!("Wlex{counter}").into())));
            }
        });
        let atoms: Vec<AtomCat> = cat
            .atoms()
            .into_iter()
            .filter(|ac| ac.feature(&feature.attr).is_some_and(|v| !v.is_var() && *v.to_string() == *val))
            .cloned()
            .collect();

        let initial: Vec<AtomCat> = if !feature.license_empty_cats {
            self.all_initial_atoms.clone()
        } else {
            let mut initial = Vec::new();
            if let Some(fm_vals) = self.feature_map.get(&feature.attr) {
                for v in std::iter::once(&val).chain(feature.also_licensed_by.iter()) {
                    for ac in fm_vals.get(v).into_iter().flatten() {
                        if !initial.contains(ac) {
                            initial.push(ac.clone());
                        }
                    }
                }
            }
            initial
        };
        if initial.is_empty() {
            tracing::warn!(attr = %feature.attr, val = %val, "no initial categories for licensing feature");
            out.uninstantiated.push(cat);
            return out;
        }

        for ac in &atoms {
            for initial_ac in &initial {
                let Some(index) = initial_ac.feature("index").filter(|v| v.as_atom().is_some()) else { continue };
                if index.as_atom().is_some_and(|n| bound_vars.contains(n)) {
                    out.instantiated.clear();
                    out.uninstantiated.push(cat);
                    return out;
                }
                let mut subst = Substitution::new();
                if !ac.unify_features(initial_ac, &mut subst) || !subst.contains_value(index) {
                    continue;
                }
                subst.retain_value(index);
                let inst = cat.fill(&subst);
                if !out.instantiated.contains(&inst) {
                    out.instantiated.push(inst);
                }
            }
        }
        out
    }
}

fn record_atom(features: &[LicensingFeature], ac: &AtomCat, map: &mut FeatureMap) {
    for feature in features {
        let Some(value) = ac.feature(&feature.attr) else { continue };
        if value.is_var() {
            continue;
        }
        let text = value.to_string();
        if !feature.admits(&text) {
            continue;
        }
        let atoms = map.entry(feature.attr.clone()).or_default().entry(text.into()).or_default();
        if !atoms.contains(ac) {
            atoms.push(ac.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(s: &str) -> Category {
        s.parse().unwrap()
    }

    #[test]
    fn empty_cats_need_licensing_by_lex() {
        let licenser = FeatureLicenser::new(vec![LicensingFeature::default_lex()]);
        assert!(licenser.needs_licensing(&cat("pp[lex=to]/np"), true));
        assert!(!licenser.needs_licensing(&cat("pp[lex=to]/np"), false));
        assert!(!licenser.needs_licensing(&cat("np/^n"), true));
    }

    #[test]
    fn licensing_needs_a_matching_initial_category() {
        let mut licenser = FeatureLicenser::new(vec![LicensingFeature::default_lex()]);
        let to = cat("pp[lex=to]/np");
        assert!(!licenser.is_licensed(&to, true));
        licenser.update_feature_map(&cat(r"s[e]\np[x]/pp[lex=from]"));
        assert!(!licenser.is_licensed(&to, true));
        licenser.update_feature_map(&cat(r"s[e]\np[x]/pp[lex=to,index=y]"));
        assert!(licenser.is_licensed(&to, true));
    }

    #[test]
    fn single_value_cats_are_instantiated_against_licensing_index() {
        let mut licenser = FeatureLicenser::new(vec![LicensingFeature::default_lex()]);
        licenser.update_feature_map(&cat(r"s[e]\np[x]/pp[lex=to,index=y]"));
        let out = licenser.license_empty_cat(&cat("pp[lex=to]/np[Z]"), &HashSet::new());
        assert_eq!(out.uninstantiated, Vec::<Category>::new());
        assert_eq!(out.instantiated.len(), 1);
        assert_eq!(out.instantiated[0].index_nominal().map(|n| n.as_ref()), Some("y"));
    }

    #[test]
    fn bound_variables_block_instantiation() {
        let mut licenser = FeatureLicenser::new(vec![LicensingFeature::default_lex()]);
        licenser.update_feature_map(&cat(r"s[e]\np[x]/pp[lex=to,index=y]"));
        let bound: HashSet<Arc<str>> = ["y".into()].into_iter().collect();
        let out = licenser.license_empty_cat(&cat("pp[lex=to]/np"), &bound);
        assert!(out.instantiated.is_empty());
        assert_eq!(out.uninstantiated.len(), 1);
    }

    #[test]
    fn simple_lex_never_instantiates() {
        let mut licenser = FeatureLicenser::new(vec![LicensingFeature::simple_lex()]);
        licenser.update_feature_map(&cat("pp[lex=to,index=y]"));
        let out = licenser.license_empty_cat(&cat("pp[lex=to]/np"), &HashSet::new());
        assert!(out.instantiated.is_empty());
        assert_eq!(out.uninstantiated.len(), 1);
    }

    #[test]
    fn semantically_null_words_share_fresh_nominals() {
        let mut licenser = FeatureLicenser::new(vec![LicensingFeature::default_lex()]);
        let mut nominals = NominalIndex::default();
        nominals.insert("w1");
        let mut c = cat(r"s[e]\np[x]/pp[lex=to]/pp[lex=to,index=W]");
        licenser.index_semantically_null_words(&mut c, &mut nominals);
        let atoms = c.atoms();
        let indices: Vec<String> = atoms[2..].iter().map(|ac| ac.feature("index").unwrap().to_string()).collect();
        assert_eq!(indices, vec!["w2", "w2"]);
        assert!(nominals.contains("w2"));
    }
}
