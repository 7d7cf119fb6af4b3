//! Agenda-driven chart search.
//!
//! ```text
//!  initialize ──► agenda (sorted by score; LIFO when depth-first)
//!                    │ pop front
//!                    v
//!            add_edge_to_chart ── folded / pruned ──► (drop)
//!                    │ admitted
//!                    v
//!              do_edge_combos ── new edges ──► agenda
//! ```
//!
//! Edges are grouped by [`ChartKey`] (coverage + category). The first edge of
//! a group becomes its representative and owns the group's alternative list.
//!
//! - Anytime mode: alternatives are pruned on admission, and `all_edges`
//!   holds every unpruned edge. Surface duplicates are dropped at the agenda
//!   by an [`EdgeHash`].
//! - Packing mode: only representatives combine; alternatives are folded in
//!   and expanded afterwards by unpacking, which applies the pruning strategy
//!   level by level.
//!
//! The loop stops when the agenda is empty or a budget runs out. Before
//! stopping on a budget, the best edge is made chart-resident.
//!
//! When the search ends incomplete, fragments can be glued (packing only,
//! see [`Chart::re_init_for_gluing`]) or greedily joined into one edge.

use super::edge::{Edge, EdgeArena, EdgeCombos, EdgeId};
use super::edge_hash::{ChartKey, EdgeHash, HashOutcome};
use super::factory::{EdgeFactory, FactoryFlags};
use super::metrics::ChartStats;
use super::pruning::PruningStrategy;
use crate::api::{NewBestLimit, SearchConfig};
use crate::grammar::{Grammar, Hypertagger, SignScorer};
use crate::lf::Pred;
use crate::sign::{Derivation, Sign};
use crate::{BitSet, RealizeError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Chart<'g> {
    factory: EdgeFactory<'g>,
    arena: EdgeArena,
    pruning: Arc<dyn PruningStrategy>,
    config: SearchConfig,
    agenda: VecDeque<EdgeId>,
    edge_hash: EdgeHash,
    cat_map: HashMap<ChartKey, EdgeId>,
    /// Representatives in admission order.
    reps: Vec<EdgeId>,
    /// Unpruned (or unpacked) edges.
    all_edges: Vec<EdgeId>,
    cell_counts: HashMap<BitSet, usize>,
    non_empty_cells: HashSet<BitSet>,
    pending_removal: Vec<EdgeId>,
    unpacked: HashSet<EdgeId>,
    best_edge: Option<EdgeId>,
    best_joined_edge: Option<EdgeId>,
    best_edges: Option<Vec<EdgeId>>,
    gluing: bool,
    done: bool,
    start: Instant,
    stats: ChartStats,
}

impl<'g> Chart<'g> {
    pub fn new(
        grammar: Grammar<'g>,
        scorer: &'g dyn SignScorer,
        preds: Vec<Pred>,
        config: SearchConfig,
        pruning: Arc<dyn PruningStrategy>,
    ) -> Self {
        let factory = EdgeFactory::new(grammar, scorer, preds, config.factory);
        Chart {
            factory,
            arena: EdgeArena::new(),
            pruning,
            config,
            agenda: VecDeque::new(),
            edge_hash: EdgeHash::new(),
            cat_map: HashMap::new(),
            reps: Vec::new(),
            all_edges: Vec::new(),
            cell_counts: HashMap::new(),
            non_empty_cells: HashSet::new(),
            pending_removal: Vec::new(),
            unpacked: HashSet::new(),
            best_edge: None,
            best_joined_edge: None,
            best_edges: None,
            gluing: false,
            done: false,
            start: Instant::now(),
            stats: ChartStats::default(),
        }
    }

    // --- Accessors -----------------------------------------------------------

    pub fn arena(&self) -> &EdgeArena {
        &self.arena
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.arena[id]
    }

    pub fn factory(&self) -> &EdgeFactory<'g> {
        &self.factory
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn set_edge_limit(&mut self, limit: Option<usize>) {
        self.config.edge_limit = limit;
    }

    /// Best edge so far: most complete, then highest score.
    pub fn best_edge(&self) -> Option<EdgeId> {
        self.best_edge
    }

    /// Result of greedy fragment joining, if it ran.
    pub fn best_joined_edge(&self) -> Option<EdgeId> {
        self.best_joined_edge
    }

    pub fn is_complete(&self) -> bool {
        self.best_edge.is_some_and(|e| self.arena[e].complete())
    }

    /// True if the last search emptied the agenda.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True when every lexical and attribute pred got an initial edge.
    pub fn no_uncovered_preds(&self) -> bool {
        !self.factory.has_uncovered_preds()
    }

    pub fn representatives(&self) -> &[EdgeId] {
        &self.reps
    }

    pub fn all_edges(&self) -> &[EdgeId] {
        &self.all_edges
    }

    pub fn agenda_len(&self) -> usize {
        self.agenda.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn stats(&self) -> ChartStats {
        ChartStats { rule_apps: self.factory.rule_apps(), ..self.stats.clone() }
    }

    // --- Main loop -----------------------------------------------------------

    /// Seeds the agenda with the factory's initial edges.
    pub fn initialize(&mut self, hypertagger: Option<&mut dyn Hypertagger>) {
        let initial = self.factory.create_initial_edges(&mut self.arena, hypertagger);
        tracing::debug!(
            preds = self.factory.preds().len(),
            initial = initial.len(),
            uncovered = self.factory.has_uncovered_preds(),
            "chart initialized"
        );
        for edge in initial {
            self.add_edge_to_agenda(edge);
        }
    }

    /// Moves edges from the agenda to the chart, combining each admitted edge,
    /// until the agenda is empty or a budget runs out.
    pub fn combine(&mut self, time_limit: Option<Duration>, wait_for_complete: bool) -> Result<(), RealizeError> {
        while !self.agenda.is_empty() {
            if let Some(reason) = self.stop_reason(time_limit, wait_for_complete) {
                tracing::debug!(reason, edges = self.stats.edges_added, "search stopped");
                if let Some(best) = self.best_edge.filter(|&b| !self.in_chart(b)) {
                    self.add_edge_to_chart(best);
                }
                self.drain_pending_removal();
                break;
            }
            let Some(next) = self.agenda.pop_front() else { break };
            if self.add_edge_to_chart(next) {
                self.do_edge_combos(next)?;
            }
        }
        self.stats.elapsed = self.start.elapsed();

        if self.config.use_packing && self.config.do_unpacking {
            self.do_unpacking()?;
        }
        self.done = self.agenda.is_empty();
        if self.config.join_fragments && !self.is_complete() {
            self.join_best_fragments();
        }

        tracing::debug!(
            done = self.done,
            complete = self.is_complete(),
            reps = self.reps.len(),
            stats = %self.stats(),
            "combine finished"
        );
        if std::env::var_os("CCG_REALIZE_DEBUG").is_some() {
            eprintln!(
                "[chart] agenda={} reps={} all_edges={} {}",
                self.agenda.len(),
                self.reps.len(),
                self.all_edges.len(),
                self.stats()
            );
            eprint!("{}", self.print_edges());
        }
        Ok(())
    }

    fn stop_reason(&self, time_limit: Option<Duration>, wait_for_complete: bool) -> Option<&'static str> {
        let best_complete = self.is_complete();
        let may_stop = !wait_for_complete || best_complete;
        if may_stop && self.config.edge_limit.is_some_and(|limit| self.stats.edges_added > limit) {
            return Some("edge limit");
        }
        let so_far = self.start.elapsed();
        if may_stop && time_limit.is_some_and(|limit| so_far > limit) {
            return Some("time limit");
        }
        if self.config.use_packing || !best_complete {
            return None;
        }
        if let (Some(limit), Some(first)) = (self.config.new_best_time_limit, self.stats.time_to_first) {
            let since_first = so_far.saturating_sub(first);
            let exceeded = match limit {
                NewBestLimit::Absolute(d) => since_first > d,
                NewBestLimit::Fraction(_) if first.is_zero() => !since_first.is_zero(),
                NewBestLimit::Fraction(f) => since_first.as_secs_f64() / first.as_secs_f64() > f,
            };
            if exceeded {
                return Some("new best limit");
            }
        }
        None
    }

    fn in_chart(&self, id: EdgeId) -> bool {
        self.cat_map
            .get(&ChartKey::of(id, &self.arena))
            .is_some_and(|&rep| rep == id || self.arena[rep].alts().contains(&id))
    }

    fn do_edge_combos(&mut self, next: EdgeId) -> Result<(), RealizeError> {
        let collect = self.config.collect_combos;
        if self.gluing && self.arena[next].coverage().is_empty() {
            return Ok(());
        }
        let rep = self.cat_map.get(&ChartKey::of(next, &self.arena)).copied();
        if let Some(rep) = rep.filter(|&rep| collect && rep != next) {
            for alt in self.factory.create_alt_edges(&mut self.arena, next, rep)? {
                self.add_edge_to_agenda(alt);
            }
            self.drain_pending_removal();
            return Ok(());
        }

        let partners = if self.config.use_packing || collect { self.reps.clone() } else { self.all_edges.clone() };
        for partner in partners {
            if partner == next {
                continue;
            }
            if self.gluing {
                let (p, n) = (&self.arena[partner], &self.arena[next]);
                if p.coverage().is_empty() || self.non_empty_cells.contains(&p.coverage().union(n.coverage())) {
                    continue;
                }
            }
            for edge in self.factory.create_new_edges(&mut self.arena, partner, next, collect)? {
                self.add_edge_to_agenda(edge);
            }
        }
        for edge in self.factory.create_new_edges_unary(&mut self.arena, next, collect)? {
            self.add_edge_to_agenda(edge);
        }
        self.drain_pending_removal();
        Ok(())
    }

    // --- Agenda and chart ----------------------------------------------------

    fn add_edge_to_agenda(&mut self, edge: EdgeId) {
        self.stats.edges_added += 1;
        if !self.config.use_packing {
            match self.edge_hash.insert(edge, &self.arena) {
                HashOutcome::Rejected => return,
                HashOutcome::Displaced(old) => self.supersede(old),
                HashOutcome::Added => {}
            }
        }
        if self.config.depth_first {
            self.agenda.push_front(edge);
        } else if self.arena[edge].score == 0.0 && !self.gluing {
            self.agenda.push_back(edge);
        } else {
            let at = self.agenda.partition_point(|&e| !self.ranks_below(e, edge));
            self.agenda.insert(at, edge);
        }
        self.stats.max_agenda_size = self.stats.max_agenda_size.max(self.agenda.len());
        self.update_best_edge(edge);
    }

    /// Drops a displaced edge from the agenda, or from its group's
    /// alternatives (queueing its removal from `all_edges`).
    fn supersede(&mut self, old: EdgeId) {
        if let Some(pos) = self.agenda.iter().position(|&e| e == old) {
            self.agenda.remove(pos);
            return;
        }
        let Some(&rep) = self.cat_map.get(&ChartKey::of(old, &self.arena)) else { return };
        let Some(alts) = self.arena[rep].alt_edges.as_mut() else { return };
        if let Some(pos) = alts.iter().position(|&e| e == old) {
            alts.remove(pos);
            self.pending_removal.push(old);
        }
    }

    fn drain_pending_removal(&mut self) {
        if self.pending_removal.is_empty() {
            return;
        }
        let removed: HashSet<EdgeId> = self.pending_removal.drain(..).collect();
        self.all_edges.retain(|e| !removed.contains(e));
        self.stats.edges_pruned += removed.len();
    }

    /// Agenda order: score descending, or completeness then score while
    /// gluing. Equal edges keep insertion order.
    fn ranks_below(&self, a: EdgeId, b: EdgeId) -> bool {
        let (a, b) = (&self.arena[a], &self.arena[b]);
        if self.gluing && a.completeness != b.completeness {
            return a.completeness < b.completeness;
        }
        a.score < b.score
    }

    fn update_best_edge(&mut self, edge: EdgeId) {
        let e = &self.arena[edge];
        let (better, counts_as_new) = match self.best_edge.map(|b| &self.arena[b]) {
            None => (true, false),
            Some(best) if e.completeness > best.completeness => (true, false),
            Some(best) if e.completeness == best.completeness && e.score > best.score => (true, e.complete()),
            Some(_) => (false, false),
        };
        if !better {
            return;
        }
        let complete = e.complete();
        self.best_edge = Some(edge);
        self.best_edges = None;
        let now = self.start.elapsed();
        self.stats.time_to_best = Some(now);
        if complete && self.stats.time_to_first.is_none() {
            self.stats.time_to_first = Some(now);
        }
        if counts_as_new {
            self.stats.new_best_count += 1;
        }
        tracing::trace!(edge = %self.arena[edge], "new best edge");
    }

    /// Admits `edge` to the chart. Returns false if it was refused by the cell
    /// limit, folded into its representative (packing), or pruned.
    fn add_edge_to_chart(&mut self, edge: EdgeId) -> bool {
        if let Some(limit) = self.config.cell_pruning_value {
            let count = self.cell_counts.get(self.arena[edge].coverage()).copied().unwrap_or(0);
            if count >= limit {
                self.stats.cell_pruned += 1;
                return false;
            }
        }
        *self.cell_counts.entry(self.arena[edge].coverage().clone()).or_insert(0) += 1;

        let key = ChartKey::of(edge, &self.arena);
        let rep = match self.cat_map.get(&key) {
            Some(&rep) if rep == edge => return true,
            Some(&rep) => rep,
            None => {
                let e = &mut self.arena[edge];
                e.alt_edges = Some(vec![edge]);
                if self.config.collect_combos {
                    e.combos = Some(EdgeCombos::default());
                }
                self.cat_map.insert(key, edge);
                self.reps.push(edge);
                if !self.config.use_packing {
                    self.all_edges.push(edge);
                }
                self.stats.unpruned_edges_added += 1;
                return true;
            }
        };

        let mut alts = self.arena[rep].alt_edges.take().unwrap_or_default();
        let at = alts.partition_point(|&e| self.arena[e].score >= self.arena[edge].score);
        alts.insert(at, edge);
        if self.config.use_packing {
            self.arena[rep].alt_edges = Some(alts);
            return false;
        }
        let pruned = self.pruning.prune_edges(&mut alts, &self.arena);
        self.arena[rep].alt_edges = Some(alts);
        let self_pruned = pruned.contains(&edge);
        let removed: HashSet<EdgeId> = pruned.into_iter().filter(|&e| e != edge).collect();
        if !removed.is_empty() {
            self.all_edges.retain(|e| !removed.contains(e));
        }
        self.stats.edges_pruned += removed.len() + usize::from(self_pruned);
        if self_pruned {
            return false;
        }
        self.all_edges.push(edge);
        self.stats.unpruned_edges_added += 1;
        true
    }

    // --- Fragments -----------------------------------------------------------

    /// Switches the chart to gluing fragments and puts every representative
    /// back on the agenda. Requires packing.
    pub fn re_init_for_gluing(&mut self) -> Result<(), RealizeError> {
        if !self.config.use_packing {
            return Err(RealizeError::GluingWithoutPacking);
        }
        self.gluing = true;
        self.factory.start_gluing();
        if !self.factory.flags().contains(FactoryFlags::RELAXED_RELATION_MATCHING) {
            self.factory.add_opts_for_uncovered_preds();
        }
        self.factory.add_opts_for_rule_instances();
        self.non_empty_cells = self.cell_counts.keys().cloned().collect();
        tracing::debug!(reps = self.reps.len(), opts = self.factory.lf_opts().len(), "gluing fragments");
        for rep in self.reps.clone() {
            self.add_edge_to_agenda(rep);
        }
        Ok(())
    }

    fn fragment_candidates(&self) -> Vec<EdgeId> {
        let chart = if self.config.use_packing && self.all_edges.is_empty() { &self.reps } else { &self.all_edges };
        chart.iter().chain(self.agenda.iter()).copied().collect()
    }

    /// Greedily joins the best edge with the best disjoint fragments.
    pub fn join_best_fragments(&mut self) {
        let Some(best) = self.best_edge else { return };
        let candidates = self.fragment_candidates();
        let mut covered = self.arena[best].coverage().clone();
        let mut fragments = Vec::new();
        loop {
            let mut pick: Option<EdgeId> = None;
            for &edge in &candidates {
                let e = &self.arena[edge];
                if e.coverage().is_empty() || e.coverage().intersects(&covered) {
                    continue;
                }
                let better = match pick.map(|p| &self.arena[p]) {
                    None => true,
                    Some(p) => p.completeness < e.completeness || (p.completeness == e.completeness && p.score < e.score),
                };
                if better {
                    pick = Some(edge);
                }
            }
            let Some(frag) = pick else { break };
            covered.union_with(self.arena[frag].coverage());
            fragments.push(frag);
        }

        let mut joined = best;
        while !fragments.is_empty() {
            let mut next: Option<(Edge, usize)> = None;
            for (i, &frag) in fragments.iter().enumerate() {
                for edge in [
                    self.factory.make_joined_edge(&self.arena, joined, frag),
                    self.factory.make_joined_edge(&self.arena, frag, joined),
                ] {
                    if next.as_ref().is_none_or(|(n, _)| n.score < edge.score) {
                        next = Some((edge, i));
                    }
                }
            }
            let Some((edge, i)) = next else { break };
            fragments.remove(i);
            joined = self.arena.push(edge);
        }
        tracing::debug!(joined = %self.arena[joined], "joined fragments");
        self.best_joined_edge = Some(joined);
    }

    // --- Unpacking -----------------------------------------------------------

    /// Expands packed representatives into pruned n-best alternative lists.
    /// Only complete representatives are unpacked once a complete edge exists.
    pub fn do_unpacking(&mut self) -> Result<(), RealizeError> {
        let started = Instant::now();
        // Results now come from the unpacked alternatives, not the reps.
        self.config.do_unpacking = true;
        let found_complete = self.is_complete();
        for rep in self.reps.clone() {
            if found_complete && !self.arena[rep].complete() {
                continue;
            }
            self.unpack(rep)?;
            if let Some(&first) = self.arena[rep].alts().first() {
                self.update_best_edge(first);
            }
        }
        self.best_edges = None;
        self.stats.unpack_time = Some(started.elapsed());
        tracing::debug!(all_edges = self.all_edges.len(), "unpacked");
        Ok(())
    }

    fn rep_for(&self, id: EdgeId) -> Result<EdgeId, RealizeError> {
        if self.arena[id].is_representative() {
            return Ok(id);
        }
        self.cat_map.get(&ChartKey::of(id, &self.arena)).copied().ok_or(RealizeError::MissingAlts(id))
    }

    fn unpack(&mut self, rep: EdgeId) -> Result<(), RealizeError> {
        if !self.unpacked.insert(rep) {
            return Ok(());
        }
        let alts = self.arena[rep].alt_edges.clone().ok_or(RealizeError::MissingAlts(rep))?;
        let mut merged = EdgeHash::new();
        for alt in alts {
            for edge in self.unpack_alt(alt)? {
                merged.insert(edge, &self.arena);
            }
        }
        let mut edges = merged.into_edges();
        edges.sort_by(|&a, &b| self.arena[b].score.total_cmp(&self.arena[a].score));
        let pruned = self.pruning.prune_edges(&mut edges, &self.arena);
        self.stats.edges_pruned += pruned.len();
        self.all_edges.extend(edges.iter().copied());
        self.arena[rep].alt_edges = Some(edges);
        Ok(())
    }

    fn unpack_alt(&mut self, alt: EdgeId) -> Result<Vec<EdgeId>, RealizeError> {
        if let Some(base) = self.arena[alt].opt_completes {
            let base_rep = self.rep_for(base)?;
            self.unpack(base_rep)?;
            let mut out = Vec::new();
            for base_alt in self.arena[base_rep].alts().to_vec() {
                if self.arena[base_alt].sign == self.arena[alt].sign {
                    out.push(alt);
                } else {
                    let mut edge = self.factory.make_alt_edge(self.arena[base_alt].sign.clone(), &self.arena[alt]);
                    edge.opt_completes = Some(base_alt);
                    out.push(self.arena.push(edge));
                }
            }
            return Ok(out);
        }

        let (rule, inputs, head) = match &self.arena[alt].sign.derivation {
            Derivation::Lexical => return Ok(vec![alt]),
            Derivation::Rule { rule, inputs, head } => (rule.clone(), inputs.clone(), *head),
        };
        let mut input_alts = Vec::with_capacity(inputs.len());
        let mut input_lf_len = 0;
        for &input in &inputs {
            let rep = self.rep_for(input)?;
            self.unpack(rep)?;
            input_alts.push(self.arena[rep].alts().to_vec());
            input_lf_len += self.arena[input].sign.lf.len();
        }

        let mut out = Vec::new();
        for combo in cartesian(&input_alts) {
            let signs: Vec<(EdgeId, &Sign)> = combo.iter().map(|&e| (e, &self.arena[e].sign)).collect();
            let original = &self.arena[alt].sign;
            let mut sign = Sign::derived(&rule, original.category.clone(), &signs, head);
            sign.lf.extend(original.lf.iter().skip(input_lf_len).cloned());
            sign.frag_completion = original.frag_completion;
            if sign == *original {
                out.push(alt);
            } else {
                let edge = self.factory.make_alt_edge(sign, &self.arena[alt]);
                out.push(self.arena.push(edge));
            }
        }
        Ok(out)
    }

    // --- Results -------------------------------------------------------------

    /// Complete edges sorted by score and pruned; empty if the best edge is
    /// incomplete.
    pub fn best_edges(&mut self) -> Vec<EdgeId> {
        if let Some(cached) = &self.best_edges {
            return cached.clone();
        }
        let mut edges = Vec::new();
        if self.is_complete() {
            let source =
                if self.config.use_packing && !self.config.do_unpacking { &self.reps } else { &self.all_edges };
            edges = source.iter().copied().filter(|&e| self.arena[e].complete()).collect();
            edges.sort_by(|&a, &b| self.arena[b].score.total_cmp(&self.arena[a].score));
            self.pruning.prune_edges(&mut edges, &self.arena);
        }
        self.best_edges = Some(edges.clone());
        edges
    }

    /// One line per chart edge, representatives first.
    pub fn print_edges(&self) -> String {
        let mut out = String::new();
        for &rep in &self.reps {
            let _ = writeln!(out, "{:#}", self.arena[rep]);
            for &alt in self.arena[rep].alts().iter().filter(|&&a| a != rep) {
                let _ = writeln!(out, "  | {:#}", self.arena[alt]);
            }
        }
        out
    }

    /// Derivation text for an edge.
    pub fn derivation(&self, id: EdgeId) -> String {
        self.arena.derivation(id)
    }
}

/// Every combination of one element per list, first list outermost.
fn cartesian(lists: &[Vec<EdgeId>]) -> Vec<Vec<EdgeId>> {
    let mut combos: Vec<Vec<EdgeId>> = vec![Vec::new()];
    for list in lists {
        combos = combos
            .iter()
            .flat_map(|prefix| {
                list.iter().map(move |&e| {
                    let mut next = prefix.clone();
                    next.push(e);
                    next
                })
            })
            .collect();
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::edge::Tracker;
    use crate::engine::pruning::NBestPruningStrategy;
    use crate::grammar::NullScorer;
    use crate::lf::LfInput;
    use crate::rules::{CcgRules, MemoryLexicon};
    use crate::sign::Word;

    fn chart<'g>(lexicon: &'g MemoryLexicon, rules: &'g CcgRules, config: SearchConfig) -> Chart<'g> {
        let preds = LfInput::parse("@x(dog) @x<det>=the").unwrap().into_preds();
        let pruning = Arc::new(NBestPruningStrategy::new(config.pruning_value));
        Chart::new(Grammar::new(lexicon, rules), &NullScorer, preds, config, pruning)
    }

    fn push(chart: &mut Chart<'_>, word: &str, coverage: &[usize], score: f64) -> EdgeId {
        let sign = Sign::lexical(vec![Word::new(word)], "np".parse().unwrap(), Vec::new());
        let coverage: BitSet = coverage.iter().copied().collect();
        let completeness = coverage.len() as f64 / 2.0;
        let edge = Edge::new(sign, Tracker::new(coverage, BitSet::new(), Vec::new()), completeness, score, None);
        chart.arena.push(edge)
    }

    #[test]
    fn best_edge_prefers_completeness_then_score() {
        let (lexicon, rules) = (MemoryLexicon::new(), CcgRules::new());
        let mut chart = chart(&lexicon, &rules, SearchConfig::default());
        let partial = push(&mut chart, "dog", &[0], 0.9);
        let complete_low = push(&mut chart, "the dog", &[0, 1], 0.2);
        let complete_tie = push(&mut chart, "a dog", &[0, 1], 0.2);
        let complete_high = push(&mut chart, "that dog", &[0, 1], 0.5);

        chart.update_best_edge(partial);
        assert_eq!(chart.best_edge(), Some(partial));
        chart.update_best_edge(complete_low);
        assert_eq!(chart.best_edge(), Some(complete_low));
        assert!(chart.stats.time_to_first.is_some());
        chart.update_best_edge(complete_tie);
        assert_eq!(chart.best_edge(), Some(complete_low));
        chart.update_best_edge(partial);
        assert_eq!(chart.best_edge(), Some(complete_low));
        chart.update_best_edge(complete_high);
        assert_eq!(chart.best_edge(), Some(complete_high));
        assert_eq!(chart.stats.new_best_count, 1);
    }

    fn wait_for_a_complete(limit: NewBestLimit, packing: bool, first: Option<Duration>) -> Option<&'static str> {
        let (lexicon, rules) = (MemoryLexicon::new(), CcgRules::new());
        let config = SearchConfig::default().with_packing(packing).with_new_best_time_limit(Some(limit));
        let mut chart = chart(&lexicon, &rules, config);
        let complete = push(&mut chart, "the dog", &[0, 1], 0.5);
        chart.update_best_edge(complete);
        if first.is_some() {
            chart.stats.time_to_first = first;
        }
        std::thread::sleep(Duration::from_millis(5));
        chart.stop_reason(None, false)
    }

    #[test]
    fn new_best_limit_absolute() {
        assert_eq!(wait_for_a_complete(NewBestLimit::Absolute(Duration::ZERO), false, None), Some("new best limit"));
        assert_eq!(wait_for_a_complete(NewBestLimit::Absolute(Duration::from_secs(3600)), false, None), None);
    }

    #[test]
    fn new_best_limit_fraction_of_time_to_first() {
        let first = Some(Duration::from_millis(1));
        assert_eq!(wait_for_a_complete(NewBestLimit::Fraction(0.0), false, first), Some("new best limit"));
        assert_eq!(wait_for_a_complete(NewBestLimit::Fraction(1e9), false, first), None);
    }

    #[test]
    fn new_best_limit_fraction_with_instant_first() {
        let first = Some(Duration::ZERO);
        assert_eq!(wait_for_a_complete(NewBestLimit::Fraction(1e9), false, first), Some("new best limit"));
    }

    #[test]
    fn new_best_limit_is_ignored_while_packing() {
        assert_eq!(wait_for_a_complete(NewBestLimit::Absolute(Duration::ZERO), true, None), None);
    }

    #[test]
    fn agenda_is_sorted_by_score_with_zero_scores_last() {
        let (lexicon, rules) = (MemoryLexicon::new(), CcgRules::new());
        let mut chart = chart(&lexicon, &rules, SearchConfig::default());
        let zero = push(&mut chart, "a", &[0], 0.0);
        let low = push(&mut chart, "b", &[0], 0.2);
        let high = push(&mut chart, "c", &[0], 0.8);
        let low_again = push(&mut chart, "d", &[0], 0.2);
        for e in [zero, low, high, low_again] {
            chart.add_edge_to_agenda(e);
        }
        assert_eq!(chart.agenda.iter().copied().collect::<Vec<_>>(), vec![high, low, low_again, zero]);
    }

    #[test]
    fn equivalent_alternatives_are_pruned_to_the_cap() {
        let (lexicon, rules) = (MemoryLexicon::new(), CcgRules::new());
        let mut chart = chart(&lexicon, &rules, SearchConfig::default().with_pruning_value(Some(2)));
        let ids: Vec<EdgeId> =
            [0.5, 0.9, 0.1, 0.7].iter().enumerate().map(|(i, &s)| push(&mut chart, &format!("w{i}"), &[0], s)).collect();
        let admitted: Vec<bool> = ids.iter().map(|&e| chart.add_edge_to_chart(e)).collect();
        assert_eq!(admitted, vec![true, true, false, true]);
        let rep = ids[0];
        let kept: Vec<f64> = chart.arena[rep].alts().iter().map(|&e| chart.arena[e].score).collect();
        assert_eq!(kept, vec![0.9, 0.7]);
        assert!(!chart.all_edges.contains(&rep));
    }

    #[test]
    fn gluing_needs_packing() {
        let (lexicon, rules) = (MemoryLexicon::new(), CcgRules::new());
        let mut chart = chart(&lexicon, &rules, SearchConfig::default());
        assert_eq!(chart.re_init_for_gluing(), Err(RealizeError::GluingWithoutPacking));
    }

    #[test]
    fn cartesian_keeps_first_input_outermost() {
        let (a, b, c) = (EdgeId(0), EdgeId(1), EdgeId(2));
        assert_eq!(cartesian(&[vec![a, b], vec![c]]), vec![vec![a, c], vec![b, c]]);
        assert_eq!(cartesian(&[vec![a], vec![b, c]]), vec![vec![a, b], vec![a, c]]);
    }
}
