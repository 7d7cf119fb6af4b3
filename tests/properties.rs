//! Property tests for pruning, surface deduplication and chart search.

use ccg_realize::rules::{CcgRules, MemoryLexicon};
use ccg_realize::{
    BitSet, Derivation, Edge, EdgeArena, EdgeHash, EdgeId, Grammar, LexicalDiversityPruningStrategy, LfInput,
    NBestPruningStrategy, PruningStrategy, RealizationStatus, Realizer, SearchConfig, Sign, StemPruningStrategy,
    Tracker, Word,
};
use proptest::prelude::*;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

const LEXICON: &str = r"
    the              :- np[X]/^n[X,lex=the]
    big/big/JJ       :- n[X]/^n[X]     : @X<mod>M @M(big)
    large/big/JJ     :- n[X]/^n[X]     : @X<mod>M @M(big)
    dog/dog/NN       :- n[X,lex=the]   : @X(dog)
    hound/dog/NN     :- n[X,lex=the]   : @X(dog)
    runs/run/VBZ     :- s[E]\np[X]     : @E(run) @E<agent>X
    sprints/run/VBZ  :- s[E]\np[X]     : @E(run) @E<agent>X
";

const FORMS: &[&str] = &["the", "big", "large", "dog", "hound", "runs", "sprints"];

const LF: &str = "@w(run) @w<agent>s @s(dog) @s<mod>b @b(big)";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

// --- Strategies --------------------------------------------------------------

/// Word lists drawn from a small vocabulary, so stems repeat.
fn arb_words() -> impl Strategy<Value = Vec<(&'static str, &'static str)>> {
    let word = prop_oneof![
        Just(("dog", "NN")),
        Just(("hound", "NN")),
        Just(("big", "JJ")),
        Just(("the", "DT")),
        Just(("runs", "VBZ")),
    ];
    prop::collection::vec(word, 1..4)
}

/// Edges sorted by descending score, as the chart hands them to pruning.
fn arb_sorted_edges() -> impl Strategy<Value = (EdgeArena, Vec<EdgeId>)> {
    prop::collection::vec((arb_words(), 0u32..20), 0..24).prop_map(|specs| {
        let mut arena = EdgeArena::new();
        let mut ids: Vec<EdgeId> = specs
            .into_iter()
            .map(|(words, score)| {
                let words = words.iter().map(|(w, pos)| Word::new(w).with_pos(pos)).collect();
                let sign = Sign::lexical(words, "np".parse().unwrap(), Vec::new());
                let tracker = Tracker::new(BitSet::full(2), BitSet::new(), Vec::new());
                arena.push(Edge::new(sign, tracker, 1.0, f64::from(score), None))
            })
            .collect();
        ids.sort_by(|&a, &b| arena[b].score.total_cmp(&arena[a].score));
        (arena, ids)
    })
}

fn arb_strategy() -> impl Strategy<Value = (u8, Option<usize>)> {
    (0u8..3, prop::option::of(1usize..8))
}

fn strategy(kind: u8, limit: Option<usize>) -> Box<dyn PruningStrategy> {
    match kind {
        0 => Box::new(NBestPruningStrategy::new(limit)),
        1 => Box::new(LexicalDiversityPruningStrategy::lexical(limit)),
        _ => Box::new(StemPruningStrategy::stems(limit, false)),
    }
}

/// Per-form weights in (0, 1]; a sign scores the mean weight of its words.
fn arb_weights() -> impl Strategy<Value = HashMap<&'static str, f64>> {
    prop::collection::vec(1u32..=10, FORMS.len())
        .prop_map(|ws| FORMS.iter().zip(ws).map(|(&f, w)| (f, f64::from(w) / 10.0)).collect())
}

fn arb_config() -> impl Strategy<Value = SearchConfig> {
    (prop::option::of(1usize..5), any::<bool>(), any::<bool>(), prop::option::of(2usize..40)).prop_map(
        |(pruning, packing, depth_first, edge_limit)| {
            SearchConfig::default()
                .with_pruning_value(pruning)
                .with_packing(packing)
                .with_depth_first(depth_first)
                .with_edge_limit(edge_limit)
        },
    )
}

// --- Pruning -----------------------------------------------------------------

proptest! {
    #[test]
    fn prop_pruning_partitions_and_caps((arena, ids) in arb_sorted_edges(), (kind, limit) in arb_strategy()) {
        let mut kept = ids.clone();
        let removed = strategy(kind, limit).prune_edges(&mut kept, &arena);

        prop_assert_eq!(kept.len() + removed.len(), ids.len());
        if let Some(n) = limit {
            prop_assert!(kept.len() <= n);
            prop_assert_eq!(kept.len(), n.min(ids.len()));
        } else {
            prop_assert!(removed.is_empty());
        }
        // Survivors keep their relative order.
        let mut last = None;
        for pos in kept.iter().map(|e| ids.iter().position(|i| i == e)) {
            prop_assert!(pos.is_some());
            prop_assert!(pos > last);
            last = pos;
        }
        for e in &removed {
            prop_assert!(!kept.contains(e));
        }
    }

    #[test]
    fn prop_n_best_keeps_a_prefix((arena, ids) in arb_sorted_edges(), limit in 1usize..8) {
        let mut kept = ids.clone();
        NBestPruningStrategy::new(Some(limit)).prune_edges(&mut kept, &arena);
        prop_assert_eq!(&kept[..], &ids[..limit.min(ids.len())]);
    }

    #[test]
    fn prop_pruning_is_deterministic((arena, ids) in arb_sorted_edges(), (kind, limit) in arb_strategy()) {
        let (mut a, mut b) = (ids.clone(), ids);
        let removed_a = strategy(kind, limit).prune_edges(&mut a, &arena);
        let removed_b = strategy(kind, limit).prune_edges(&mut b, &arena);
        prop_assert_eq!(a, b);
        prop_assert_eq!(removed_a, removed_b);
    }
}

// --- Surface deduplication ---------------------------------------------------

proptest! {
    #[test]
    fn prop_edge_hash_keeps_the_best_per_surface(
        specs in prop::collection::vec((0usize..3, 0u32..5, 0u32..4), 1..30),
    ) {
        let surfaces: [&[&str]; 3] = [&["the", "dog"], &["the", "hound"], &["a", "dog"]];
        let mut arena = EdgeArena::new();
        let mut hash = EdgeHash::new();
        let mut best: HashMap<usize, (u32, u32)> = HashMap::new();
        for (surface, score, complexity) in specs {
            let words = surfaces[surface].iter().map(|w| Word::new(w)).collect();
            let mut sign = Sign::lexical(words, "np".parse().unwrap(), Vec::new());
            sign.derivation = Derivation::Rule { rule: ">".into(), inputs: Vec::new(), head: 0 };
            sign.complexity = complexity;
            let tracker = Tracker::new(BitSet::full(2), BitSet::new(), Vec::new());
            let id = arena.push(Edge::new(sign, tracker, 1.0, f64::from(score), None));
            hash.insert(id, &arena);

            let entry = best.entry(surface).or_insert((score, complexity));
            if score > entry.0 || (score == entry.0 && complexity < entry.1) {
                *entry = (score, complexity);
            }
        }

        prop_assert_eq!(hash.len(), best.len());
        for &id in hash.edges() {
            let edge = &arena[id];
            let surface = surfaces.iter().position(|s| edge.sign.orthography() == s.join(" ")).unwrap();
            prop_assert_eq!((edge.score, edge.sign.complexity), (f64::from(best[&surface].0), best[&surface].1));
        }
    }
}

// --- Search ------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_search_respects_coverage_and_best_edge(weights in arb_weights(), config in arb_config()) {
        init_tracing();
        let lexicon = MemoryLexicon::parse(LEXICON).unwrap();
        let rules = CcgRules::new();
        let scorer = move |sign: &Sign, _complete: bool| {
            let total: f64 = sign.words.iter().map(|w| weights.get(&*w.form).copied().unwrap_or(0.5)).sum();
            total / sign.words.len().max(1) as f64
        };
        let lf = LfInput::parse(LF).unwrap();
        let pruning = config.pruning_value;
        let anytime = !config.use_packing;
        let mut realization =
            Realizer::new(Grammar::new(&lexicon, &rules), &scorer).with_config(config).realize(&lf).unwrap();
        let n = lf.len();

        let chart = realization.chart();
        for &id in chart.all_edges() {
            let edge = chart.edge(id);
            prop_assert!(edge.coverage().iter().all(|i| i < n));
            prop_assert_eq!(edge.completeness, edge.coverage().len() as f64 / n as f64);
            // Daughters never share a pred and never exceed their mother.
            let inputs = edge.sign.derivation.inputs();
            for (i, &a) in inputs.iter().enumerate() {
                let a = chart.edge(a).coverage();
                prop_assert!(a.is_subset(edge.coverage()));
                for &b in &inputs[i + 1..] {
                    prop_assert!(!a.intersects(chart.edge(b).coverage()));
                }
            }
        }

        if anytime {
            if let Some(best) = realization.best() {
                for &id in chart.all_edges() {
                    let edge = chart.edge(id);
                    prop_assert!(edge.completeness <= best.completeness);
                    if edge.complete() {
                        prop_assert!(best.complete());
                        prop_assert!(edge.score <= best.score);
                    }
                }
            }
        }

        let status = realization.status();
        let best_edges = realization.best_edges();
        if let Some(cap) = pruning {
            prop_assert!(best_edges.len() <= cap);
        }
        if status == RealizationStatus::Complete {
            prop_assert!(!best_edges.is_empty());
            for &id in &best_edges {
                prop_assert_eq!(realization.chart().edge(id).coverage(), &BitSet::full(n));
            }
        }
    }
}
