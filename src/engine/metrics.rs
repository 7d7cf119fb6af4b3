//! Chart statistics.
//!
//! Counters and timings collected while a chart runs. They are cheap to
//! maintain and are always on; `Chart::stats` hands out a snapshot.
//!
//! ## Design notes
//!
//! - Times are measured from the moment the chart was created, so
//!   `time_to_first` and `time_to_best` include initial edge construction.
//! - `rule_apps` is owned by the edge factory and copied in when a snapshot is
//!   taken.

use std::fmt;
use std::time::Duration;

// --- Metrics ------------------------------------------------------------------

/// Rule engine invocations made by the edge factory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuleApps {
    /// Calls to the binary rule group (or glue rule), one per ordered pair.
    pub binary: usize,
    /// Calls to the general unary rule group.
    pub unary: usize,
    /// Applications of instantiated type-changing rules.
    pub instances: usize,
    /// Alternative edges built by replaying recorded combos.
    pub alt_replays: usize,
}

impl RuleApps {
    /// Individual rule applications, weighting group calls by group size.
    pub fn total(&self, num_binary_rules: usize, num_unary_rules: usize) -> usize {
        self.unary * num_unary_rules + self.instances + self.binary * num_binary_rules
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChartStats {
    /// Edges put on the agenda.
    pub edges_added: usize,
    /// Edges admitted to the chart that survived pruning.
    pub unpruned_edges_added: usize,
    /// Edges removed by the pruning strategy.
    pub edges_pruned: usize,
    /// Edges refused by the per-cell limit.
    pub cell_pruned: usize,
    pub max_agenda_size: usize,
    /// Time until the first complete edge, if any.
    pub time_to_first: Option<Duration>,
    /// Time until the current best edge was found.
    pub time_to_best: Option<Duration>,
    /// Number of times a new complete best edge was found.
    pub new_best_count: usize,
    /// Time spent in the search loop, up to the end of packing.
    pub elapsed: Duration,
    pub unpack_time: Option<Duration>,
    pub rule_apps: RuleApps,
}

impl fmt::Display for ChartStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edges={} unpruned={} pruned={} cell_pruned={} max_agenda={} elapsed={:?}",
            self.edges_added,
            self.unpruned_edges_added,
            self.edges_pruned,
            self.cell_pruned,
            self.max_agenda_size,
            self.elapsed
        )?;
        if let Some(t) = self.time_to_first {
            write!(f, " first={t:?}")?;
        }
        if let Some(t) = self.time_to_best {
            write!(f, " best={t:?} new_best={}", self.new_best_count)?;
        }
        if let Some(t) = self.unpack_time {
            write!(f, " unpack={t:?}")?;
        }
        Ok(())
    }
}
