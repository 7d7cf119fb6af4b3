//! Edge construction.
//!
//! The factory compiles one request's preds into indexing structures, builds
//! the initial edges, and builds every new edge the chart asks for.
//!
//! ```text
//! preds ──► pred_map ("x(dog)", "e<Agent>", "<Agent>x" → positions)
//!       ──► nominals (x → 0, e → 1, ...)
//!       ──► chunks / alts / opts as bitsets
//!
//! lexicon signs ─ instantiate ─► initial edges ─┐
//! type-changing rules ─────────► rule instances │
//! semantically null signs ─ license ───────────┘
//!
//! chart ── create_new_edges(a, b) ──► binary rules (both orders)
//!       ── create_new_edges_unary(a) ► unary rules, rule instances, opts
//!       ── create_alt_edges(a, rep) ─► replay of rep's combos
//! ```
//!
//! ## Combination filters
//!
//! Two edges only reach the rule engine if their coverage is disjoint, they
//! respect each other's open chunk, and (with indexing on) their index sets
//! overlap or a tuple pairs them. Alts must also agree: when both sides still
//! have a set open, they must share at least one alt in it.
//!
//! ## Invariants
//!
//! - `active_alts` lists are ordered by alt set id.
//! - `lf_chunks` is ordered so that a chunk precedes any chunk containing it.
//! - Rule engine "no result" never leaves this module as an error.

use super::edge::{CatCombo, Edge, EdgeArena, EdgeCombos, EdgeId, RuleInstance, Tracker};
use super::licensing::{FeatureLicenser, LicensingFeature};
use super::metrics::RuleApps;
use crate::grammar::{Grammar, Hypertagger, RuleResult, SignScorer, TypeChangingRule, fragment_join};
use crate::lf::{AltId, Nominal, Pred};
use crate::sign::{Category, Derivation, FeatureValue, Sign, Substitution};
use crate::{BitSet, CombinationFailure, RealizeError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

bitflags::bitflags! {
    /// Edge factory switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FactoryFlags: u8 {
        /// Only combine edges whose semantic indices overlap.
        const INDEXING                  = 1 << 0;
        /// Enforce LF chunks.
        const CHUNKS                    = 1 << 1;
        /// License marked and semantically null categories.
        const FEATURE_LICENSING         = 1 << 2;
        /// Let edges without an index nominal combine with anything.
        const MISSING_INDEX_COMBOS      = 1 << 3;
        /// Skip unmatched relations when instantiating, covering them with opts.
        const RELAXED_RELATION_MATCHING = 1 << 4;
    }
}

impl Default for FactoryFlags {
    fn default() -> Self {
        FactoryFlags::INDEXING | FactoryFlags::CHUNKS | FactoryFlags::FEATURE_LICENSING
    }
}

/// Dense numbering of the constant nominals in a request.
#[derive(Debug, Clone, Default)]
pub(crate) struct NominalIndex {
    map: HashMap<Arc<str>, usize>,
}

impl NominalIndex {
    pub(crate) fn insert(&mut self, name: &str) -> usize {
        let next = self.map.len();
        *self.map.entry(name.into()).or_insert(next)
    }

    pub(crate) fn get(&self, name: &str) -> Option<usize> {
        self.map.get(name).copied()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

fn recover(result: Result<Vec<RuleResult>, CombinationFailure>) -> Result<Vec<RuleResult>, RealizeError> {
    match result {
        Ok(results) => Ok(results),
        Err(failure) => match failure.into_fatal() {
            None => Ok(Vec::new()),
            Some(fatal) => Err(fatal),
        },
    }
}

pub struct EdgeFactory<'g> {
    grammar: Grammar<'g>,
    scorer: &'g dyn SignScorer,
    preds: Vec<Pred>,
    all_preds: BitSet,
    initial_edges: Vec<EdgeId>,
    marked_edges: Vec<EdgeId>,
    inst_no_sem_edges: Vec<EdgeId>,
    no_sem_edges: Vec<EdgeId>,
    rule_instances: Vec<RuleInstance>,
    lf_chunks: Vec<BitSet>,
    /// Alt bitsets, by set then position.
    lf_alts: Vec<Vec<BitSet>>,
    all_alt_ids: Vec<Vec<AltId>>,
    lf_opts: Vec<BitSet>,
    labeled_nominals: HashSet<Nominal>,
    nominals: NominalIndex,
    pred_map: HashMap<String, Vec<usize>>,
    paired_nominals: Vec<(BitSet, BitSet)>,
    bound_var_nominals: HashSet<Arc<str>>,
    licenser: FeatureLicenser,
    flags: FactoryFlags,
    gluing: bool,
    uncovered: Option<BitSet>,
    has_uncovered_preds: bool,
    rule_apps: RuleApps,
}

impl<'g> EdgeFactory<'g> {
    pub fn new(grammar: Grammar<'g>, scorer: &'g dyn SignScorer, preds: Vec<Pred>, flags: FactoryFlags) -> Self {
        let features = if flags.contains(FactoryFlags::FEATURE_LICENSING) {
            grammar.lexicon.licensing_features()
        } else {
            vec![LicensingFeature::simple_lex()]
        };
        let mut factory = EdgeFactory {
            grammar,
            scorer,
            preds,
            all_preds: BitSet::new(),
            initial_edges: Vec::new(),
            marked_edges: Vec::new(),
            inst_no_sem_edges: Vec::new(),
            no_sem_edges: Vec::new(),
            rule_instances: Vec::new(),
            lf_chunks: Vec::new(),
            lf_alts: Vec::new(),
            all_alt_ids: Vec::new(),
            lf_opts: Vec::new(),
            labeled_nominals: HashSet::new(),
            nominals: NominalIndex::default(),
            pred_map: HashMap::new(),
            paired_nominals: Vec::new(),
            bound_var_nominals: HashSet::new(),
            licenser: FeatureLicenser::new(features),
            flags,
            gluing: false,
            uncovered: None,
            has_uncovered_preds: false,
            rule_apps: RuleApps::default(),
        };
        factory.extract_labeled_nominals();
        factory.all_preds = BitSet::full(factory.preds.len());
        factory.index_preds();
        factory.list_nominals();
        factory.list_paired_nominals();
        factory.add_bound_var_nominals();
        factory.fill_lf_chunks();
        factory.fill_lf_alts();
        factory.fill_lf_opts();
        factory
    }

    // --- Accessors -----------------------------------------------------------

    pub fn preds(&self) -> &[Pred] {
        &self.preds
    }

    pub fn flags(&self) -> FactoryFlags {
        self.flags
    }

    pub fn rule_instances(&self) -> &[RuleInstance] {
        &self.rule_instances
    }

    pub fn lf_chunks(&self) -> &[BitSet] {
        &self.lf_chunks
    }

    pub fn lf_opts(&self) -> &[BitSet] {
        &self.lf_opts
    }

    /// Nominals carrying a `mark` attribute; their attribute preds are removed.
    pub fn labeled_nominals(&self) -> &HashSet<Nominal> {
        &self.labeled_nominals
    }

    /// True when a lexical or attribute pred has no initial edge covering it.
    pub fn has_uncovered_preds(&self) -> bool {
        self.has_uncovered_preds
    }

    pub fn uncovered_preds(&self) -> Option<&BitSet> {
        self.uncovered.as_ref()
    }

    pub fn rule_apps(&self) -> RuleApps {
        self.rule_apps
    }

    /// Total individual rule applications so far.
    pub fn total_rule_apps(&self) -> usize {
        self.rule_apps.total(self.grammar.rules.num_binary_rules(), self.grammar.rules.num_unary_rules())
    }

    /// Switches to fragment gluing: the glue rule replaces the binary rules
    /// and indexing no longer restricts combinations.
    pub(crate) fn start_gluing(&mut self) {
        self.gluing = true;
        self.flags.remove(FactoryFlags::INDEXING);
    }

    // --- Request compilation -------------------------------------------------

    fn extract_labeled_nominals(&mut self) {
        let labeled = &mut self.labeled_nominals;
        self.preds.retain(|pred| {
            let is_mark = pred.is_attr() && pred.rel_name() == Some("mark") && pred.nominal.is_atom();
            if is_mark {
                labeled.insert(pred.nominal.clone());
            }
            !is_mark
        });
    }

    fn index_preds(&mut self) {
        for (i, pred) in self.preds.iter().enumerate() {
            for key in pred.keys() {
                self.pred_map.entry(key).or_default().push(i);
            }
        }
    }

    fn list_nominals(&mut self) {
        for pred in &self.preds {
            for nom in std::iter::once(&pred.nominal).chain(pred.secondary()) {
                if let Nominal::Atom(name) = nom {
                    self.nominals.insert(name);
                }
            }
        }
    }

    fn list_paired_nominals(&mut self) {
        for (i, pred) in self.preds.iter().enumerate() {
            if pred.lex_pred() != Some("tup") {
                continue;
            }
            let (mut item1, mut item2) = (None, None);
            for other in self.preds[i + 1..].iter().take_while(|p| p.nominal == pred.nominal) {
                match other.rel_name() {
                    Some("Item1") => item1 = other.secondary(),
                    Some("Item2") => item2 = other.secondary(),
                    _ => {}
                }
            }
            let (Some(Nominal::Atom(n1)), Some(Nominal::Atom(n2))) = (item1, item2) else {
                tracing::warn!(tuple = %pred.nominal, "couldn't find paired nominals for tuple");
                continue;
            };
            if let (Some(a), Some(b)) = (self.nominals.get(n1), self.nominals.get(n2)) {
                self.paired_nominals.push((BitSet::singleton(a), BitSet::singleton(b)));
            }
        }
    }

    fn add_bound_var_nominals(&mut self) {
        for pred in &self.preds {
            if pred.rel_name() != Some("BoundVar") {
                continue;
            }
            let Some(bound) = pred.secondary() else { continue };
            let Nominal::Atom(name) = bound else { continue };
            self.bound_var_nominals.insert(name.clone());
            // A bound tuple also binds its items.
            let Some(start) = self.preds.iter().position(|p| &p.nominal == bound && p.lex_pred() == Some("tup")) else {
                continue;
            };
            for item in self.preds[start + 1..].iter().take_while(|p| &p.nominal == bound) {
                if !matches!(item.rel_name(), Some("Item1" | "Item2")) {
                    continue;
                }
                if let Some(Nominal::Atom(n)) = item.secondary() {
                    self.bound_var_nominals.insert(n.clone());
                }
            }
        }
    }

    fn fill_lf_chunks(&mut self) {
        let mut chunks: Vec<BitSet> = Vec::new();
        for (i, pred) in self.preds.iter().enumerate() {
            for &id in &pred.chunks {
                if chunks.len() <= id {
                    chunks.resize(id + 1, BitSet::new());
                }
                chunks[id].insert(i);
            }
        }
        // Subsets go before their supersets.
        for chunk in chunks {
            match self.lf_chunks.iter().position(|sorted| chunk.is_subset(sorted)) {
                Some(at) => self.lf_chunks.insert(at, chunk),
                None => self.lf_chunks.push(chunk),
            }
        }
    }

    fn fill_lf_alts(&mut self) {
        for (i, pred) in self.preds.iter().enumerate() {
            for alt in &pred.alts {
                if self.lf_alts.len() <= alt.set {
                    self.lf_alts.resize(alt.set + 1, Vec::new());
                }
                let set = &mut self.lf_alts[alt.set];
                if set.len() <= alt.num {
                    set.resize(alt.num + 1, BitSet::new());
                }
                set[alt.num].insert(i);
            }
        }
        self.all_alt_ids = self
            .lf_alts
            .iter()
            .enumerate()
            .map(|(set, alts)| (0..alts.len()).map(|num| AltId { set, num }).collect())
            .collect();
    }

    fn fill_lf_opts(&mut self) {
        for (i, pred) in self.preds.iter().enumerate() {
            for &id in &pred.opts {
                if self.lf_opts.len() <= id {
                    self.lf_opts.resize(id + 1, BitSet::new());
                }
                self.lf_opts[id].insert(i);
            }
        }
    }

    /// Adds opts for preds no lexical item or rule instance covers, split by
    /// chunk.
    pub fn add_opts_for_uncovered_preds(&mut self) {
        let Some(mut opt) = self.uncovered.clone() else { return };
        for chunk in &self.lf_chunks {
            if opt.intersects(chunk) {
                let part = opt.intersection(chunk);
                opt.difference_with(&part);
                if !self.lf_opts.contains(&part) {
                    self.lf_opts.push(part);
                }
            }
        }
        if !opt.is_empty() && !self.lf_opts.contains(&opt) {
            self.lf_opts.push(opt);
        }
    }

    /// Adds an opt for each rule instance's coverage.
    pub fn add_opts_for_rule_instances(&mut self) {
        for inst in &self.rule_instances {
            self.lf_opts.push(inst.tracker.coverage.clone());
        }
    }

    fn compute_uncovered(&mut self, arena: &EdgeArena) -> Option<BitSet> {
        let mut covered = BitSet::new();
        for &id in self.initial_edges.iter().chain(&self.marked_edges) {
            covered.union_with(arena[id].coverage());
        }
        for inst in &self.rule_instances {
            covered.union_with(&inst.tracker.coverage);
        }
        if covered == self.all_preds {
            return None;
        }
        let missing = self.all_preds.difference(&covered);
        if missing.iter().any(|i| self.preds[i].is_lex() || self.preds[i].is_attr()) {
            self.has_uncovered_preds = true;
        }
        Some(missing)
    }

    // --- Edge construction ---------------------------------------------------

    /// Builds an edge, scoring the sign and finding its open chunk.
    pub fn make_edge(&self, sign: Sign, coverage: BitSet, active_alts: Vec<Vec<AltId>>) -> Edge {
        let indices = self.indices_of(&[&sign.category]);
        let completeness = self.completeness(&coverage);
        let score = self.scorer.score(&sign, completeness == 1.0);
        let chunk = self.incomplete_chunk(&coverage, &active_alts);
        Edge::new(sign, Tracker::new(coverage, indices, active_alts), completeness, score, chunk)
    }

    /// Builds an alternative to `edge` with a different sign.
    pub fn make_alt_edge(&self, sign: Sign, edge: &Edge) -> Edge {
        let score = self.scorer.score(&sign, edge.complete());
        Edge::new(sign, edge.tracker.clone(), edge.completeness, score, edge.incomplete_chunk.clone())
    }

    /// Joins two fragments; the left one's category, indices and alts win.
    pub fn make_joined_edge(&self, arena: &EdgeArena, left: EdgeId, right: EdgeId) -> Edge {
        let (e1, e2) = (&arena[left], &arena[right]);
        let rule = fragment_join(&e1.sign.category);
        let sign = Sign::derived(&rule.rule, rule.category, &[(left, &e1.sign), (right, &e2.sign)], rule.head);
        let coverage = e1.coverage().union(e2.coverage());
        let completeness = self.completeness(&coverage);
        let score = self.scorer.score(&sign, completeness == 1.0);
        let tracker = Tracker::new(coverage, e1.indices().clone(), e1.tracker.active_alts.clone());
        Edge::new(sign, tracker, completeness, score, e1.incomplete_chunk.clone())
    }

    fn completeness(&self, coverage: &BitSet) -> f64 {
        if self.preds.is_empty() { 0.0 } else { coverage.len() as f64 / self.preds.len() as f64 }
    }

    fn indices_of(&self, cats: &[&Category]) -> BitSet {
        let mut indices = BitSet::new();
        for cat in cats {
            cat.for_each_atom(&mut |ac| {
                for attr in ["index", "mod-index"] {
                    if let Some(i) = ac.feature(attr).and_then(FeatureValue::as_atom).and_then(|n| self.nominals.get(n)) {
                        indices.insert(i);
                    }
                }
            });
        }
        indices
    }

    fn outer_arg_uninstantiated(cat: &Category) -> bool {
        let Some(arg) = cat.outer_arg() else { return false };
        let mut found = false;
        arg.for_each_atom(&mut |ac| {
            found |= ["index", "mod-index"].iter().any(|attr| ac.feature(attr).and_then(FeatureValue::as_atom).is_some());
        });
        !found
    }

    /// Edges whose outermost argument has no index get every index, so that
    /// indexing never blocks them. Uninstantiated no-sem edges are exempt.
    fn check_instantiation(&self, ids: &[EdgeId], arena: &mut EdgeArena) {
        for &id in ids {
            if self.no_sem_edges.contains(&id) {
                continue;
            }
            if Self::outer_arg_uninstantiated(&arena[id].sign.category) {
                tracing::trace!(edge = %arena[id], "outer arg uninstantiated");
                arena[id].tracker.indices = BitSet::full(self.nominals.len());
            }
        }
    }

    /// True if the edges' index sets match a tuple's `Item1`/`Item2`.
    pub fn paired_with(&self, a: &Edge, b: &Edge) -> bool {
        self.paired_nominals.iter().any(|(first, second)| first == a.indices() && second == b.indices())
    }

    // --- Alts and chunks -----------------------------------------------------

    fn alt_bits(&self, alt: AltId) -> &BitSet {
        &self.lf_alts[alt.set][alt.num]
    }

    /// Narrows `from` to the alts still open for `coverage`. A set with a
    /// fully covered alt is closed and all its alts are added to `coverage`.
    /// With `check_all`, only alts intersecting `coverage` count.
    fn active_alts(&self, from: &[Vec<AltId>], check_all: bool, coverage: &mut BitSet) -> Vec<Vec<AltId>> {
        let mut active_sets = Vec::with_capacity(from.len());
        for alt_set in from {
            let mut active = Vec::new();
            let mut covered = false;
            for &alt in alt_set {
                let bits = self.alt_bits(alt);
                if check_all && !bits.intersects(coverage) {
                    continue;
                }
                if bits.is_subset(coverage) {
                    covered = true;
                    break;
                }
                active.push(alt);
            }
            if covered {
                if let Some(first) = alt_set.first() {
                    for bits in &self.lf_alts[first.set] {
                        coverage.union_with(bits);
                    }
                }
            } else if !active.is_empty() {
                active_sets.push(active);
            }
        }
        active_sets
    }

    fn initial_active_alts(&self, coverage: &mut BitSet) -> Vec<Vec<AltId>> {
        self.active_alts(&self.all_alt_ids, true, coverage)
    }

    /// Merges two active-alt lists, intersecting shared sets; `None` if a
    /// shared set has no alt in common.
    fn combined_alts(a: &[Vec<AltId>], b: &[Vec<AltId>]) -> Option<Vec<Vec<AltId>>> {
        if a.is_empty() {
            return Some(b.to_vec());
        }
        if b.is_empty() {
            return Some(a.to_vec());
        }
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() || j < b.len() {
            let set_a = a.get(i).and_then(|s| s.first()).map(|alt| alt.set);
            let set_b = b.get(j).and_then(|s| s.first()).map(|alt| alt.set);
            match (set_a, set_b) {
                (Some(x), Some(y)) if x == y => {
                    let shared: Vec<AltId> = a[i].iter().filter(|alt| b[j].contains(alt)).copied().collect();
                    if shared.is_empty() {
                        return None;
                    }
                    out.push(shared);
                    i += 1;
                    j += 1;
                }
                (Some(x), Some(y)) if x < y => {
                    out.push(a[i].clone());
                    i += 1;
                }
                (Some(_), None) => {
                    out.push(a[i].clone());
                    i += 1;
                }
                _ => {
                    out.push(b[j].clone());
                    j += 1;
                }
            }
        }
        Some(out)
    }

    /// The most specific chunk `coverage` has started but not completed, and
    /// which lies within every open alt.
    fn incomplete_chunk(&self, coverage: &BitSet, active_alts: &[Vec<AltId>]) -> Option<BitSet> {
        self.lf_chunks
            .iter()
            .find(|chunk| {
                chunk.intersects(coverage)
                    && !chunk.is_subset(coverage)
                    && coverage.is_subset(chunk)
                    && active_alts.iter().flatten().all(|&alt| chunk.is_subset(self.alt_bits(alt)))
            })
            .cloned()
    }

    fn completes_chunk(a: &Edge, b: &Edge) -> bool {
        [a, b].iter().any(|e| {
            e.incomplete_chunk.as_ref().is_some_and(|chunk| {
                let mut rest = chunk.difference(a.coverage());
                rest.difference_with(b.coverage());
                rest.is_empty()
            })
        })
    }

    /// False if `bits` reaches into the exclusive parts of two alts of one set.
    fn check_alts(&self, bits: &BitSet) -> bool {
        for alt_set in &self.lf_alts {
            let touching: Vec<&BitSet> = alt_set.iter().filter(|alt| alt.intersects(bits)).collect();
            for (k, first) in touching.iter().enumerate() {
                for second in &touching[k + 1..] {
                    if first.difference(second).intersects(bits) && second.difference(first).intersects(bits) {
                        return false;
                    }
                }
            }
        }
        true
    }

    // --- Instantiation -------------------------------------------------------

    /// Matches a semantic template against the input, starting from the pred
    /// at `pred_index`. Returns every consistent (substitution, coverage)
    /// pair, or `None` when the template cannot be matched.
    fn instantiate(&self, template: &[Pred], pred_index: usize) -> Option<Vec<(Substitution, BitSet)>> {
        let indexed = &self.preds[pred_index];
        let (first, subst) = template.iter().enumerate().find_map(|(i, p)| {
            let mut subst = Substitution::new();
            p.unify(indexed, &mut subst).then_some((i, subst))
        })?;

        let relaxed = self.flags.contains(FactoryFlags::RELAXED_RELATION_MATCHING);
        let mut remaining: Vec<&Pred> = template.iter().enumerate().filter(|&(i, _)| i != first).map(|(_, p)| p).collect();
        let mut insts = vec![(subst, BitSet::singleton(pred_index))];
        let mut prev_len = usize::MAX;
        while !remaining.is_empty() && remaining.len() != prev_len {
            prev_len = remaining.len();
            let mut k = 0;
            while k < remaining.len() {
                let lf_pred = remaining[k].fill(&insts[0].0);
                let keys = lf_pred.keys();
                if keys.is_empty() {
                    // Underconstrained for now; a later match may bind it.
                    k += 1;
                    continue;
                }
                let matches: Vec<usize> =
                    keys.iter().filter_map(|key| self.pred_map.get(key)).flatten().copied().collect();
                if matches.is_empty() {
                    if relaxed && lf_pred.is_rel() {
                        k += 1;
                        continue;
                    }
                    return None;
                }
                let mut extended = Vec::with_capacity(insts.len());
                for (subst, bits) in &insts {
                    for &m in &matches {
                        let mut bits = bits.clone();
                        bits.insert(m);
                        if !self.check_alts(&bits) {
                            continue;
                        }
                        let mut subst = subst.clone();
                        if lf_pred.unify(&self.preds[m], &mut subst) {
                            extended.push((subst, bits));
                        }
                    }
                }
                if extended.is_empty() {
                    if relaxed && lf_pred.is_rel() {
                        k += 1;
                        continue;
                    }
                    return None;
                }
                insts = extended;
                remaining.remove(k);
            }
        }
        // At most one (relation) pred may be left over.
        if remaining.len() > 1 {
            return None;
        }
        Some(insts)
    }

    fn coart_rels(&self, pred_index: usize) -> Vec<Arc<str>> {
        let nominal = &self.preds[pred_index].nominal;
        self.preds[pred_index + 1..]
            .iter()
            .take_while(|p| &p.nominal == nominal)
            .filter_map(|p| p.rel_name())
            .filter(|rel| self.grammar.lexicon.is_coart_rel(rel))
            .map(Arc::from)
            .collect()
    }

    fn initial_edges_for_sign(&mut self, sign: &Sign, pred_index: usize) -> Vec<Edge> {
        let Some(insts) = self.instantiate(&sign.lf, pred_index) else { return Vec::new() };
        let mut edges = Vec::with_capacity(insts.len());
        for (subst, mut coverage) in insts {
            let mut filled = sign.fill(&subst);
            self.licenser.index_semantically_null_words(&mut filled.category, &mut self.nominals);
            let alts = self.initial_active_alts(&mut coverage);
            edges.push(self.make_edge(filled, coverage, alts));
        }
        edges
    }

    fn rule_instances_for(&mut self, rule: &TypeChangingRule, pred_index: usize) -> Vec<RuleInstance> {
        let Some(insts) = self.instantiate(&rule.lf, pred_index) else { return Vec::new() };
        let mut out = Vec::with_capacity(insts.len());
        for (subst, mut coverage) in insts {
            let mut filled = rule.fill(&subst);
            self.licenser.index_semantically_null_words(&mut filled.arg, &mut self.nominals);
            self.licenser.index_semantically_null_words(&mut filled.result, &mut self.nominals);
            let indices = self.indices_of(&[&filled.result, &filled.arg]);
            let alts = self.initial_active_alts(&mut coverage);
            out.push(RuleInstance { tracker: Tracker::new(coverage, indices, alts), rule: filled });
        }
        out
    }

    /// Builds every initial edge: instantiated lexical signs (filtered by the
    /// hypertagger when one is given), licensed marked signs, rule instances
    /// and licensed semantically null signs.
    pub fn create_initial_edges(
        &mut self,
        arena: &mut EdgeArena,
        mut hypertagger: Option<&mut dyn Hypertagger>,
    ) -> Vec<EdgeId> {
        if let Some(ht) = hypertagger.as_deref_mut() {
            ht.map_preds(&self.preds);
        }
        let mut pending_marked: Vec<Edge> = Vec::new();
        for i in 0..self.preds.len() {
            let supertags = hypertagger.as_deref_mut().and_then(|ht| {
                ht.set_pred(i);
                ht.supertags()
            });
            let lexicon = self.grammar.lexicon;
            let rules = self.grammar.rules;
            let mut signs = Vec::new();
            let mut tc_rules = Vec::new();
            if let Some(key) = self.preds[i].lex_pred() {
                signs.extend(lexicon.signs_for_pred(key, &self.coart_rels(i)));
                tc_rules.extend(rules.type_changing_rules_for_pred(key));
            }
            if let Some(rel) = self.preds[i].rel_name() {
                signs.extend(lexicon.signs_for_rel(rel));
                tc_rules.extend(rules.type_changing_rules_for_rel(rel));
            }
            if let Some(tags) = &supertags {
                signs.retain(|s| s.supertag().is_some_and(|st| tags.iter().any(|(tag, _)| &**tag == st)));
            }
            for sign in &signs {
                for edge in self.initial_edges_for_sign(sign, i) {
                    if self.licenser.needs_licensing(&edge.sign.category, false) {
                        pending_marked.push(edge);
                    } else {
                        self.licenser.update_feature_map(&edge.sign.category);
                        self.initial_edges.push(arena.push(edge));
                    }
                }
            }
            for rule in &tc_rules {
                for inst in self.rule_instances_for(rule, i) {
                    self.licenser.update_feature_map(&inst.rule.arg);
                    self.licenser.update_feature_map(&inst.rule.result);
                    self.rule_instances.push(inst);
                }
            }
        }

        // Marked edges, licensed to a fixpoint.
        loop {
            let before = pending_marked.len();
            let mut k = 0;
            while k < pending_marked.len() {
                if self.licenser.is_licensed(&pending_marked[k].sign.category, false) {
                    let edge = pending_marked.remove(k);
                    self.licenser.update_feature_map(&edge.sign.category);
                    self.marked_edges.push(arena.push(edge));
                } else {
                    k += 1;
                }
            }
            if pending_marked.len() == before {
                break;
            }
        }

        self.init_no_sem_edges(arena);

        let all: Vec<EdgeId> = self
            .initial_edges
            .iter()
            .chain(&self.marked_edges)
            .chain(&self.inst_no_sem_edges)
            .chain(&self.no_sem_edges)
            .copied()
            .collect();
        self.check_instantiation(&all, arena);

        self.uncovered = self.compute_uncovered(arena);
        if let Some(missing) = &self.uncovered {
            tracing::debug!(uncovered = %missing, lexical = self.has_uncovered_preds, "preds left uncovered by lexical lookup");
        }
        if self.flags.contains(FactoryFlags::RELAXED_RELATION_MATCHING) {
            self.add_opts_for_uncovered_preds();
        }
        all
    }

    /// Semantically null signs, licensed and instantiated to a fixpoint.
    fn init_no_sem_edges(&mut self, arena: &mut EdgeArena) {
        let signs = self.grammar.lexicon.semantically_null_signs();
        if signs.is_empty() {
            return;
        }
        let mut inst: Vec<Edge> = Vec::new();
        let mut uninst: Vec<Edge> = Vec::new();
        loop {
            let before = (inst.len(), uninst.len());
            for sign in &signs {
                let licensed = self.licenser.license_empty_cat(&sign.category, &self.bound_var_nominals);
                for (cats, out) in [(licensed.instantiated, &mut inst), (licensed.uninstantiated, &mut uninst)] {
                    for mut cat in cats {
                        self.licenser.update_feature_map(&cat);
                        self.licenser.index_semantically_null_words(&mut cat, &mut self.nominals);
                        let no_sem = Sign::lexical(sign.words.clone(), cat, Vec::new());
                        if !out.iter().any(|e| e.sign == no_sem) {
                            out.push(self.make_edge(no_sem, BitSet::new(), Vec::new()));
                        }
                    }
                }
            }
            if (inst.len(), uninst.len()) == before {
                break;
            }
        }
        self.inst_no_sem_edges.extend(inst.into_iter().map(|e| arena.push(e)));
        self.no_sem_edges.extend(uninst.into_iter().map(|e| arena.push(e)));
    }

    // --- Binary combination --------------------------------------------------

    /// Every edge obtainable by combining `edge` with `next` in either order.
    ///
    /// With `collect`, the combos are recorded on both representatives and
    /// analogous results are built for `edge`'s other alternatives.
    pub fn create_new_edges(
        &mut self,
        arena: &mut EdgeArena,
        edge: EdgeId,
        next: EdgeId,
        collect: bool,
    ) -> Result<Vec<EdgeId>, RealizeError> {
        let (a, b) = (&arena[edge], &arena[next]);
        if a.tracker.intersects(&b.tracker) {
            return Ok(Vec::new());
        }
        if self.flags.contains(FactoryFlags::CHUNKS)
            && (!a.meets_chunk_constraints(&b.tracker) || !b.meets_chunk_constraints(&a.tracker))
        {
            return Ok(Vec::new());
        }
        let any_paired = !self.paired_nominals.is_empty();
        let mut results = if !self.flags.contains(FactoryFlags::INDEXING) || a.tracker.indices_intersect(&b.tracker) {
            self.combine_pair(arena, edge, next, collect, true)?
        } else if any_paired && self.paired_with(a, b) {
            self.combine_pair(arena, edge, next, collect, false)?
        } else if any_paired && self.paired_with(b, a) {
            self.combine_pair(arena, next, edge, collect, false)?
        } else if self.flags.contains(FactoryFlags::MISSING_INDEX_COMBOS)
            && (a.sign.category.index_nominal().is_none() || b.sign.category.index_nominal().is_none())
        {
            self.combine_pair(arena, edge, next, collect, true)?
        } else {
            return Ok(Vec::new());
        };

        let further: Vec<EdgeId> = arena[edge].alts().iter().copied().filter(|&e| e != edge).collect();
        if collect && !further.is_empty() {
            for r in 0..results.len() {
                let result = results[r];
                let Derivation::Rule { rule, inputs, head } = arena[result].sign.derivation.clone() else { continue };
                let rightward = inputs.first() == Some(&next);
                for &alt in &further {
                    let pair = if rightward { [next, alt] } else { [alt, next] };
                    let mut sign = Sign::derived(
                        &rule,
                        arena[result].sign.category.clone(),
                        &[(pair[0], &arena[pair[0]].sign), (pair[1], &arena[pair[1]].sign)],
                        head,
                    );
                    sign.frag_completion = arena[result].sign.frag_completion;
                    let alt_edge = self.make_alt_edge(sign, &arena[result]);
                    self.rule_apps.alt_replays += 1;
                    results.push(arena.push(alt_edge));
                }
            }
        }

        self.check_instantiation(&results, arena);
        Ok(results)
    }

    fn apply_binary(&self, left: &Sign, right: &Sign) -> Result<Vec<RuleResult>, RealizeError> {
        if self.gluing {
            recover(self.grammar.rules.glue(&left.category, &right.category, right.frag_completion))
        } else {
            recover(self.grammar.rules.binary(&left.category, &right.category))
        }
    }

    fn combine_pair(
        &mut self,
        arena: &mut EdgeArena,
        a_id: EdgeId,
        b_id: EdgeId,
        collect: bool,
        both_directions: bool,
    ) -> Result<Vec<EdgeId>, RealizeError> {
        let (a, b) = (&arena[a_id], &arena[b_id]);
        let Some(combined) = Self::combined_alts(&a.tracker.active_alts, &b.tracker.active_alts) else {
            return Ok(Vec::new());
        };
        let mut frag_completion = self.gluing && Self::completes_chunk(a, b);

        let forward = self.apply_binary(&a.sign, &b.sign)?;
        self.rule_apps.binary += 1;
        let reversed = if both_directions {
            self.rule_apps.binary += 1;
            self.apply_binary(&b.sign, &a.sign)?
        } else {
            Vec::new()
        };
        if forward.is_empty() && reversed.is_empty() {
            return Ok(Vec::new());
        }

        let mut union = a.coverage().union(b.coverage());
        let before = union.len();
        let alts = self.active_alts(&combined, false, &mut union);
        if self.gluing && union.len() > before {
            frag_completion = true;
        }

        let mut out = Vec::with_capacity(forward.len() + reversed.len());
        for (results, (left, right)) in [(forward, (a_id, b_id)), (reversed, (b_id, a_id))] {
            for res in results {
                let mut sign = Sign::derived(
                    &res.rule,
                    res.category,
                    &[(left, &arena[left].sign), (right, &arena[right].sign)],
                    res.head,
                );
                sign.frag_completion |= frag_completion;
                let id = arena.push(self.make_edge(sign, union.clone(), alts.clone()));
                out.push(id);
                if collect {
                    if let Some(combos) = arena[left].combos.as_mut() {
                        combos.rightward.push(CatCombo { input: right, result: id });
                    }
                    if let Some(combos) = arena[right].combos.as_mut() {
                        combos.leftward.push(CatCombo { input: left, result: id });
                    }
                }
            }
        }
        Ok(out)
    }

    // --- Unary combination ---------------------------------------------------

    /// Edges from unary rules, rule instances and opt completion. While
    /// gluing only opt completion runs.
    pub fn create_new_edges_unary(
        &mut self,
        arena: &mut EdgeArena,
        edge: EdgeId,
        collect: bool,
    ) -> Result<Vec<EdgeId>, RealizeError> {
        let mut out = Vec::new();
        if !self.gluing {
            let results = recover(self.grammar.rules.unary(&arena[edge].sign.category))?;
            self.rule_apps.unary += 1;
            for res in results {
                let sign = Sign::derived(&res.rule, res.category, &[(edge, &arena[edge].sign)], 0);
                if contains_cycle(&sign, arena) {
                    continue;
                }
                let e = &arena[edge];
                let result = self.make_edge(sign, e.coverage().clone(), e.tracker.active_alts.clone());
                out.push(self.push_unary(arena, edge, result, collect));
            }

            for i in 0..self.rule_instances.len() {
                let (e, inst) = (&arena[edge], &self.rule_instances[i]);
                if e.tracker.intersects(&inst.tracker)
                    || self.flags.contains(FactoryFlags::INDEXING) && !e.tracker.indices_intersect(&inst.tracker)
                    || self.flags.contains(FactoryFlags::CHUNKS) && !e.meets_chunk_constraints(&inst.tracker)
                {
                    continue;
                }
                let Some(combined) = Self::combined_alts(&e.tracker.active_alts, &inst.tracker.active_alts) else {
                    continue;
                };
                let results = recover(self.grammar.rules.apply_instance(&inst.rule, &e.sign.category))?;
                let inst_coverage = inst.tracker.coverage.clone();
                let inst_lf = inst.rule.lf.clone();
                self.rule_apps.instances += 1;
                if results.is_empty() {
                    continue;
                }
                let mut union = arena[edge].coverage().union(&inst_coverage);
                let alts = self.active_alts(&combined, false, &mut union);
                for res in results {
                    let mut sign = Sign::derived(&res.rule, res.category, &[(edge, &arena[edge].sign)], 0);
                    sign.lf.extend(inst_lf.iter().cloned());
                    if contains_cycle(&sign, arena) {
                        continue;
                    }
                    let result = self.make_edge(sign, union.clone(), alts.clone());
                    out.push(self.push_unary(arena, edge, result, collect));
                }
            }
        }

        if !self.lf_opts.is_empty() && !arena[edge].complete() {
            let e = &arena[edge];
            let mut completed = Vec::new();
            self.add_opt_completed(e, &self.all_preds, &mut completed);
            for &alt in e.tracker.active_alts.iter().flatten() {
                self.add_opt_completed(e, self.alt_bits(alt), &mut completed);
            }
            for chunk in &self.lf_chunks {
                self.add_opt_completed(e, chunk, &mut completed);
            }
            for mut coverage in completed {
                let e = &arena[edge];
                let alts = self.active_alts(&e.tracker.active_alts, false, &mut coverage);
                let mut sign = e.sign.clone();
                if self.gluing && sign.category.is_fragment() {
                    sign.frag_completion = true;
                }
                let mut result = self.make_edge(sign, coverage, alts);
                result.opt_completes = Some(edge);
                let id = arena.push(result);
                if collect {
                    if let Some(combos) = arena[edge].combos.as_mut() {
                        combos.optional_results.push(id);
                    }
                }
                out.push(id);
            }
        }

        if !self.gluing {
            self.check_instantiation(&out, arena);
        }
        Ok(out)
    }

    fn push_unary(&self, arena: &mut EdgeArena, edge: EdgeId, result: Edge, collect: bool) -> EdgeId {
        let id = arena.push(result);
        if collect {
            if let Some(combos) = arena[edge].combos.as_mut() {
                combos.unary_results.push(id);
            }
        }
        id
    }

    /// If the opts missing from `edge` complete `target`, records the
    /// completed coverage (once).
    fn add_opt_completed(&self, edge: &Edge, target: &BitSet, completed: &mut Vec<BitSet>) {
        if target.is_subset(edge.coverage()) {
            return;
        }
        let mut result = edge.coverage().clone();
        for opt in &self.lf_opts {
            if opt.is_subset(target) && !edge.coverage().intersects(opt) {
                result.union_with(opt);
            }
        }
        if target.is_subset(&result) && !completed.contains(&result) {
            completed.push(result);
        }
    }

    // --- Replay --------------------------------------------------------------

    /// Alternatives for `edge` built from the combos recorded on its
    /// representative `rep`, without calling the rule engine.
    pub fn create_alt_edges(
        &mut self,
        arena: &mut EdgeArena,
        edge: EdgeId,
        rep: EdgeId,
    ) -> Result<Vec<EdgeId>, RealizeError> {
        let combos: EdgeCombos = arena[rep].combos.clone().ok_or(RealizeError::MissingAlts(rep))?;
        let mut out = Vec::new();
        for (list, rightward) in [(&combos.rightward, true), (&combos.leftward, false)] {
            for combo in list {
                let Derivation::Rule { rule, head, .. } = arena[combo.result].sign.derivation.clone() else {
                    continue;
                };
                let partners: Vec<EdgeId> = arena[combo.input].alts().to_vec();
                for partner in partners {
                    let pair = if rightward { [edge, partner] } else { [partner, edge] };
                    let mut sign = Sign::derived(
                        &rule,
                        arena[combo.result].sign.category.clone(),
                        &[(pair[0], &arena[pair[0]].sign), (pair[1], &arena[pair[1]].sign)],
                        head,
                    );
                    sign.frag_completion = arena[combo.result].sign.frag_completion;
                    let alt = self.make_alt_edge(sign, &arena[combo.result]);
                    out.push(arena.push(alt));
                }
            }
        }
        for &result in &combos.unary_results {
            let Derivation::Rule { rule, inputs, .. } = arena[result].sign.derivation.clone() else { continue };
            let mut sign = Sign::derived(&rule, arena[result].sign.category.clone(), &[(edge, &arena[edge].sign)], 0);
            // Semantics a rule instance contributed beyond its input.
            let base = inputs.first().map_or(0, |&i| arena[i].sign.lf.len());
            sign.lf.extend(arena[result].sign.lf.iter().skip(base).cloned());
            let alt = self.make_alt_edge(sign, &arena[result]);
            out.push(arena.push(alt));
        }
        for &result in &combos.optional_results {
            let mut alt = self.make_alt_edge(arena[edge].sign.clone(), &arena[result]);
            alt.opt_completes = Some(edge);
            out.push(arena.push(alt));
        }
        self.rule_apps.alt_replays += out.len();
        Ok(out)
    }
}

/// True if a chain of unary steps below `sign` repeats a rule.
pub(crate) fn contains_cycle(sign: &Sign, arena: &EdgeArena) -> bool {
    let Derivation::Rule { rule, inputs, .. } = &sign.derivation else { return false };
    if inputs.len() != 1 {
        return false;
    }
    let mut seen = vec![rule.clone()];
    let mut current = inputs[0];
    while let Derivation::Rule { rule, inputs, .. } = &arena[current].sign.derivation {
        if inputs.len() != 1 {
            return false;
        }
        if seen.contains(rule) {
            return true;
        }
        seen.push(rule.clone());
        current = inputs[0];
    }
    false
}
