use crate::engine::{Chart, ChartStats, Edge, EdgeId, FactoryFlags, NBestPruningStrategy, PruningStrategy};
use crate::grammar::{Grammar, Hypertagger, SignScorer};
use crate::lf::LfInput;
use crate::RealizeError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Anytime budget measured from the first complete edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NewBestLimit {
    /// Stop once this much time has passed since the first complete edge.
    Absolute(Duration),
    /// Stop once the time since the first complete edge exceeds this multiple
    /// of the time it took to find it.
    Fraction(f64),
}

/// Search options for one realization request.
///
/// Budgets set to `None` are unlimited.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Wall-clock budget for one `combine`.
    pub time_limit: Option<Duration>,
    pub new_best_time_limit: Option<NewBestLimit>,
    /// Budget on edges put on the agenda.
    pub edge_limit: Option<usize>,
    /// Cap on alternatives per chart equivalence class.
    pub pruning_value: Option<usize>,
    /// Cap on edges per coverage bitset.
    pub cell_pruning_value: Option<usize>,
    pub use_packing: bool,
    pub do_unpacking: bool,
    pub collect_combos: bool,
    /// Newest edges first instead of best first.
    pub depth_first: bool,
    pub join_fragments: bool,
    /// Glue fragments when the hypertagger rounds end incomplete.
    pub use_gluing: bool,
    /// Budgets only apply once a complete edge exists.
    pub wait_for_complete: bool,
    pub factory: FactoryFlags,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            time_limit: Some(Duration::from_secs(15)),
            new_best_time_limit: None,
            edge_limit: None,
            pruning_value: Some(3),
            cell_pruning_value: None,
            use_packing: false,
            do_unpacking: true,
            collect_combos: true,
            depth_first: false,
            join_fragments: true,
            use_gluing: true,
            wait_for_complete: false,
            factory: FactoryFlags::default(),
        }
    }
}

impl SearchConfig {
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_new_best_time_limit(mut self, limit: Option<NewBestLimit>) -> Self {
        self.new_best_time_limit = limit;
        self
    }

    pub fn with_edge_limit(mut self, limit: Option<usize>) -> Self {
        self.edge_limit = limit;
        self
    }

    pub fn with_pruning_value(mut self, value: Option<usize>) -> Self {
        self.pruning_value = value;
        self
    }

    pub fn with_cell_pruning_value(mut self, value: Option<usize>) -> Self {
        self.cell_pruning_value = value;
        self
    }

    pub fn with_packing(mut self, on: bool) -> Self {
        self.use_packing = on;
        self
    }

    pub fn with_unpacking(mut self, on: bool) -> Self {
        self.do_unpacking = on;
        self
    }

    pub fn with_collect_combos(mut self, on: bool) -> Self {
        self.collect_combos = on;
        self
    }

    pub fn with_depth_first(mut self, on: bool) -> Self {
        self.depth_first = on;
        self
    }

    pub fn with_join_fragments(mut self, on: bool) -> Self {
        self.join_fragments = on;
        self
    }

    pub fn with_gluing(mut self, on: bool) -> Self {
        self.use_gluing = on;
        self
    }

    pub fn with_wait_for_complete(mut self, on: bool) -> Self {
        self.wait_for_complete = on;
        self
    }

    pub fn with_factory_flags(mut self, flags: FactoryFlags) -> Self {
        self.factory = flags;
        self
    }
}

// --- Results ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealizationStatus {
    /// Not even a fragment was built.
    NoRealization,
    /// The best edge (or joined fragment) does not cover the whole input.
    Incomplete,
    Complete,
}

/// The outcome of a realization request, holding the final chart.
pub struct Realization<'g> {
    chart: Chart<'g>,
    rounds: usize,
    elapsed: Duration,
}

impl<'g> Realization<'g> {
    fn new(chart: Chart<'g>, rounds: usize, elapsed: Duration) -> Self {
        Realization { chart, rounds, elapsed }
    }

    pub fn status(&self) -> RealizationStatus {
        match self.best_edge() {
            None => RealizationStatus::NoRealization,
            Some(_) if self.chart.is_complete() => RealizationStatus::Complete,
            Some(_) => RealizationStatus::Incomplete,
        }
    }

    /// The best complete edge, else the joined fragments, else the best
    /// fragment.
    pub fn best_edge(&self) -> Option<EdgeId> {
        if self.chart.is_complete() {
            return self.chart.best_edge();
        }
        self.chart.best_joined_edge().or_else(|| self.chart.best_edge())
    }

    pub fn best(&self) -> Option<&Edge> {
        self.best_edge().map(|id| self.chart.edge(id))
    }

    /// Surface string of the best edge.
    pub fn orthography(&self) -> Option<String> {
        self.best().map(|edge| edge.sign.orthography())
    }

    /// Complete edges, best first, after pruning.
    pub fn best_edges(&mut self) -> Vec<EdgeId> {
        self.chart.best_edges()
    }

    pub fn derivation(&self, id: EdgeId) -> String {
        self.chart.derivation(id)
    }

    pub fn stats(&self) -> ChartStats {
        self.chart.stats()
    }

    /// Number of charts built, counting fallbacks.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn chart(&self) -> &Chart<'g> {
        &self.chart
    }

    pub fn into_chart(self) -> Chart<'g> {
        self.chart
    }
}

// --- Realizer -----------------------------------------------------------------

/// Entry point: realizes logical forms against one grammar and scorer.
///
/// Without a hypertagger, [`Realizer::realize`] runs a single chart with the
/// configured options. With one, [`Realizer::realize_with_hypertagger`]
/// widens the supertag beam round by round on a packed chart, then falls
/// back to gluing and finally to an anytime search with fragment joining.
pub struct Realizer<'g> {
    grammar: Grammar<'g>,
    scorer: &'g dyn SignScorer,
    pruning: Option<Arc<dyn PruningStrategy>>,
    config: SearchConfig,
}

impl<'g> Realizer<'g> {
    pub fn new(grammar: Grammar<'g>, scorer: &'g dyn SignScorer) -> Self {
        Realizer { grammar, scorer, pruning: None, config: SearchConfig::default() }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default n-best strategy built from `pruning_value`.
    pub fn with_pruning_strategy(mut self, strategy: Arc<dyn PruningStrategy>) -> Self {
        self.pruning = Some(strategy);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn pruning(&self) -> Arc<dyn PruningStrategy> {
        match &self.pruning {
            Some(strategy) => Arc::clone(strategy),
            None => Arc::new(NBestPruningStrategy::new(self.config.pruning_value)),
        }
    }

    fn chart(&self, lf: &LfInput, config: SearchConfig) -> Chart<'g> {
        Chart::new(self.grammar, self.scorer, lf.clone().into_preds(), config, self.pruning())
    }

    /// Realizes `lf` with a single chart.
    pub fn realize(&self, lf: &LfInput) -> Result<Realization<'g>, RealizeError> {
        let start = Instant::now();
        tracing::debug!(preds = lf.len(), "realization started");
        let mut chart = self.chart(lf, self.config.clone());
        chart.initialize(None);
        chart.combine(self.config.time_limit, self.config.wait_for_complete)?;
        let realization = Realization::new(chart, 1, start.elapsed());
        log_outcome(&realization);
        Ok(realization)
    }

    /// Realizes `lf`, letting `hypertagger` restrict lexical lookup.
    ///
    /// Each round searches a packed chart without combos; a complete result
    /// is unpacked and returned. Otherwise the beam is widened until the
    /// hypertagger runs out of betas or a round exceeds a budget.
    pub fn realize_with_hypertagger(
        &self,
        lf: &LfInput,
        hypertagger: &mut dyn Hypertagger,
    ) -> Result<Realization<'g>, RealizeError> {
        let start = Instant::now();
        let config = &self.config;
        let round_config = config
            .clone()
            .with_packing(true)
            .with_collect_combos(false)
            .with_unpacking(false)
            .with_join_fragments(false);

        hypertagger.reset_beta();
        let mut rounds = 0;
        let mut last: Option<Chart<'g>> = None;
        loop {
            rounds += 1;
            let round_start = Instant::now();
            let mut chart = self.chart(lf, round_config.clone());
            chart.initialize(Some(&mut *hypertagger));
            if chart.no_uncovered_preds() {
                chart.combine(config.time_limit, false)?;
            }
            let past_time = config.time_limit.is_some_and(|limit| round_start.elapsed() >= limit);
            let exceeded_edges = config.edge_limit.is_some_and(|limit| chart.stats().edges_added >= limit);
            tracing::debug!(
                round = rounds,
                complete = chart.is_complete(),
                uncovered = !chart.no_uncovered_preds(),
                edges = chart.stats().edges_added,
                past_time,
                exceeded_edges,
                "hypertagger round finished"
            );

            if chart.is_complete() {
                chart.do_unpacking()?;
                let realization = Realization::new(chart, rounds, start.elapsed());
                log_outcome(&realization);
                return Ok(realization);
            }
            last = Some(chart);
            if past_time || exceeded_edges {
                break;
            }
            if !hypertagger.has_more_betas() {
                tracing::debug!(round = rounds, "out of betas");
                break;
            }
            hypertagger.next_beta();
        }

        if config.use_gluing {
            if let Some(mut chart) = last.take() {
                if chart.no_uncovered_preds() {
                    tracing::info!(round = rounds, "gluing fragments");
                    chart.re_init_for_gluing()?;
                    chart.set_edge_limit(config.edge_limit.map(|limit| limit * 2));
                    chart.combine(config.time_limit.map(|limit| limit * 2), config.wait_for_complete)?;
                    if chart.is_complete() {
                        chart.do_unpacking()?;
                        let realization = Realization::new(chart, rounds, start.elapsed());
                        log_outcome(&realization);
                        return Ok(realization);
                    }
                }
            }
        }

        rounds += 1;
        tracing::info!(round = rounds, "falling back to anytime search");
        let anytime = config.clone().with_packing(false).with_join_fragments(true);
        let mut chart = self.chart(lf, anytime);
        chart.initialize(Some(&mut *hypertagger));
        chart.combine(config.time_limit, config.wait_for_complete)?;
        let realization = Realization::new(chart, rounds, start.elapsed());
        log_outcome(&realization);
        Ok(realization)
    }
}

fn log_outcome(realization: &Realization<'_>) {
    tracing::debug!(
        status = ?realization.status(),
        rounds = realization.rounds,
        elapsed = ?realization.elapsed,
        best = realization.best().map(|e| e.to_string()).unwrap_or_default(),
        "realization finished"
    );
}
