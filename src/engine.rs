//! Realization search engine.
//!
//! The engine turns a flat logical form into derivations by best-first chart
//! search. It is split into focused submodules under `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! preds ──────────┐
//!                 │  EdgeFactory::new            (factory.rs)
//!                 │   - pred keys, nominals, chunks / alts / opts
//!                 v
//! lexicon ── create_initial_edges ──┬── FeatureLicenser (licensing.rs)
//!                                   │    - marked and semantically null signs
//!                                   v
//!                        Chart::initialize       (chart.rs)
//!                                   │
//!                                   v
//!                        Chart::combine
//!                          - agenda, EdgeHash dedup   (edge_hash.rs)
//!                          - ChartKey groups + pruning (pruning.rs)
//!                          - factory combinations
//!                                   │
//!                     ┌─────────────┼───────────────┐
//!                     v             v               v
//!               do_unpacking   re_init_for_gluing  join_best_fragments
//!                                   │
//!                                   v
//!                         best_edge / best_edges
//! ```
//!
//! Edges live in an [`EdgeArena`] (edge.rs) owned by the chart; everything
//! else refers to them by [`EdgeId`].
//!
//! ## Responsibilities by module
//!
//! - `edge.rs`: `Edge`, `Tracker`, `RuleInstance`, `EdgeCombos` and the arena.
//! - `edge_hash.rs`: chart and surface equivalence keys, `EdgeHash`.
//! - `factory.rs`: instantiation and every kind of edge construction.
//! - `licensing.rs`: feature licensing of marked and semantically null
//!   categories.
//! - `pruning.rs`: n-best and diversity pruning strategies.
//! - `chart.rs`: the agenda loop, packing and unpacking, fragment recovery.
//! - `metrics.rs`: counters and timings for a chart run.
//!
//! ## Debugging
//!
//! Set `CCG_REALIZE_DEBUG=1` to print a chart dump at the end of each
//! `combine`. Finer detail goes through `tracing` at `debug`/`trace`.

#[path = "engine/chart.rs"]
mod chart;
#[path = "engine/edge.rs"]
mod edge;
#[path = "engine/edge_hash.rs"]
mod edge_hash;
#[path = "engine/factory.rs"]
mod factory;
#[path = "engine/licensing.rs"]
mod licensing;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/pruning.rs"]
mod pruning;

pub use chart::Chart;
pub use edge::{CatCombo, Edge, EdgeArena, EdgeCombos, EdgeId, RuleInstance, Tracker};
pub use edge_hash::{ChartKey, EdgeHash, HashOutcome, SurfaceKey, SurfaceWords};
pub use factory::{EdgeFactory, FactoryFlags};
pub use licensing::{FeatureLicenser, LicenseLoc, LicensedCats, LicensingFeature};
pub use metrics::{ChartStats, RuleApps};
pub use pruning::{
    DiversityPruningStrategy, LexicalDiversityPruningStrategy, NBestPruningStrategy, NotCompellinglyDifferent,
    OpenClassStems, PruningStrategy, SameStems, StemPruningStrategy,
};
