use crate::rules::{CcgRules, MemoryLexicon};
use crate::{
    BitSet, Edge, FactoryFlags, Grammar, Hypertagger, LfInput, NullScorer, Pred, RealizationStatus, Realizer,
    SearchConfig, Sign, StemPruningStrategy,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Determiners are semantically null and licensed by `lex=the` on nouns.
const DOG_RUNS: &str = r"
    the          :- np[X]/^n[X,lex=the]
    dog/dog/NN   :- n[X,lex=the]   : @X(dog)
    runs/run/VBZ :- s[E]\np[X]     : @E(run) @E<agent>X
";

const DOGS_AND_HOUNDS: &str = r"
    the              :- np[X]/^n[X,lex=the]
    dog/dog/NN       :- n[X,lex=the]   : @X(dog)
    hound/hound/NN   :- n[X,lex=the]   : @X(dog)
    runs/run/VBZ     :- s[E]\np[X]     : @E(run) @E<agent>X
    sprints/run/VBZ  :- s[E]\np[X]     : @E(run) @E<agent>X
";

const RUNS_LF: &str = "@w(run) @w<agent>s @s(dog)";

fn lexicon(text: &str) -> MemoryLexicon {
    MemoryLexicon::parse(text).unwrap()
}

fn lf(text: &str) -> LfInput {
    LfInput::parse(text).unwrap()
}

fn complete_orthographies(realization: &mut crate::Realization<'_>) -> Vec<String> {
    let mut out: Vec<String> = realization
        .best_edges()
        .into_iter()
        .map(|id| realization.chart().edge(id).sign.orthography())
        .collect();
    out.sort();
    out
}

// --- Single shot -------------------------------------------------------------

#[test]
fn realizes_a_complete_sentence() {
    let (lexicon, rules) = (lexicon(DOG_RUNS), CcgRules::new());
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer);
    let realization = realizer.realize(&lf(RUNS_LF)).unwrap();

    assert_eq!(realization.status(), RealizationStatus::Complete);
    assert_eq!(realization.orthography().as_deref(), Some("the dog runs"));
    let best = realization.best().unwrap();
    assert_eq!(best.completeness, 1.0);
    assert_eq!(best.coverage(), &BitSet::full(3));
    assert!(realization.chart().is_done());
    let derivation = realization.derivation(realization.best_edge().unwrap());
    assert!(derivation.starts_with("(< (> the["), "{derivation}");
}

#[test]
fn surface_duplicates_keep_the_better_derivation() {
    let lexicon = lexicon(
        r"
        the          :- np[X]/^n[X,lex=the]
        big/big/JJ   :- n[X]/^n[X]     : @X<mod>M @M(big)
        dog/dog/NN   :- n[X,lex=the]   : @X(dog)
        ",
    );
    let rules = CcgRules::new();
    // Fewer and cheaper rule steps score higher: `the (big dog)` beats
    // `(the big) dog`, which needs composition.
    let scorer = |sign: &Sign, _complete: bool| 1.0 / (1.0 + sign.complexity as f64);
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &scorer);
    let realization = realizer.realize(&lf("@s(dog) @s<mod>b @b(big)")).unwrap();

    let chart = realization.chart();
    let the_big_dog: Vec<&Edge> = chart
        .all_edges()
        .iter()
        .map(|&id| chart.edge(id))
        .filter(|e| e.complete() && e.sign.orthography() == "the big dog")
        .collect();
    assert_eq!(the_big_dog.len(), 1);
    assert_eq!(the_big_dog[0].sign.complexity, 2);
}

#[test]
fn edge_budget_waits_for_a_complete_edge() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let grammar = Grammar::new(&lexicon, &rules);

    let waiting = SearchConfig::default().with_edge_limit(Some(2)).with_wait_for_complete(true);
    let realization = Realizer::new(grammar, &NullScorer).with_config(waiting).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Complete);
    assert!(realization.stats().edges_added > 2);
    // Stopped as soon as both conditions held, with work left on the agenda.
    assert!(!realization.chart().is_done());
    assert!(realization.chart().agenda_len() > 0);

    let eager = SearchConfig::default().with_edge_limit(Some(2));
    let realization = Realizer::new(grammar, &NullScorer).with_config(eager).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Incomplete);
    // Fragments were joined into one edge over the whole input.
    assert_eq!(realization.best().unwrap().completeness, 1.0);
}

#[test]
fn pruning_caps_complete_alternatives() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let grammar = Grammar::new(&lexicon, &rules);

    let config = SearchConfig::default().with_pruning_value(None);
    let mut all = Realizer::new(grammar, &NullScorer).with_config(config).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(
        complete_orthographies(&mut all),
        vec!["the dog runs", "the dog sprints", "the hound runs", "the hound sprints"]
    );

    let config = SearchConfig::default().with_pruning_value(Some(2));
    let mut capped = Realizer::new(grammar, &NullScorer).with_config(config).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(capped.best_edges().len(), 2);
    assert!(capped.stats().edges_pruned > 0);
}

#[test]
fn packing_then_unpacking_matches_anytime_search() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let grammar = Grammar::new(&lexicon, &rules);
    let anytime = SearchConfig::default().with_pruning_value(None);
    let packed = anytime.clone().with_packing(true);

    let mut a = Realizer::new(grammar, &NullScorer).with_config(anytime).realize(&lf(RUNS_LF)).unwrap();
    let mut p = Realizer::new(grammar, &NullScorer).with_config(packed).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(p.status(), RealizationStatus::Complete);
    assert_eq!(complete_orthographies(&mut a), complete_orthographies(&mut p));
    assert!(p.stats().unpack_time.is_some());
}

#[test]
fn packing_without_combos_still_unpacks_everything() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let config = SearchConfig::default().with_pruning_value(None).with_packing(true).with_collect_combos(false);
    let mut realization =
        Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).with_config(config).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(complete_orthographies(&mut realization).len(), 4);
}

#[test]
fn replaying_combos_matches_recombining() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let grammar = Grammar::new(&lexicon, &rules);
    let replay = SearchConfig::default().with_pruning_value(None);
    let recombine = replay.clone().with_collect_combos(false);

    let mut r = Realizer::new(grammar, &NullScorer).with_config(replay).realize(&lf(RUNS_LF)).unwrap();
    let mut c = Realizer::new(grammar, &NullScorer).with_config(recombine).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(complete_orthographies(&mut r), complete_orthographies(&mut c));
    assert_eq!(complete_orthographies(&mut r).len(), 4);
    assert!(r.stats().rule_apps.alt_replays > 0);
    assert_eq!(c.stats().rule_apps.alt_replays, 0);
}

#[test]
fn stem_diversity_keeps_one_edge_per_stem_sequence() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer)
        .with_pruning_strategy(Arc::new(StemPruningStrategy::stems(Some(4), true)));
    let mut realization = realizer.realize(&lf(RUNS_LF)).unwrap();

    // `runs` and `sprints` share the stem `run`; `dog` and `hound` differ.
    let sentences = complete_orthographies(&mut realization);
    assert_eq!(sentences.len(), 2, "{sentences:?}");
    assert!(sentences[0].starts_with("the dog "), "{sentences:?}");
    assert!(sentences[1].starts_with("the hound "), "{sentences:?}");
    assert!(realization.stats().edges_pruned > 0);
}

#[test]
fn cell_pruning_refuses_crowded_cells() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let config = SearchConfig::default().with_cell_pruning_value(Some(1));
    let realization =
        Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).with_config(config).realize(&lf(RUNS_LF)).unwrap();
    // `sprints` and `hound` share a cell with `runs` and `dog`.
    assert!(realization.stats().cell_pruned >= 2);
}

#[test]
fn depth_first_search_finds_a_realization() {
    let (lexicon, rules) = (lexicon(DOG_RUNS), CcgRules::new());
    let config = SearchConfig::default().with_depth_first(true);
    let realization =
        Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).with_config(config).realize(&lf(RUNS_LF)).unwrap();
    assert_eq!(realization.orthography().as_deref(), Some("the dog runs"));
}

#[test]
fn unknown_preds_give_no_realization() {
    let (lexicon, rules) = (MemoryLexicon::new(), CcgRules::new());
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer);
    let realization = realizer.realize(&lf("@x(unicorn)")).unwrap();
    assert_eq!(realization.status(), RealizationStatus::NoRealization);
    assert!(realization.orthography().is_none());
}

#[test]
fn type_changing_rules_cover_their_own_semantics() {
    let lexicon = lexicon(
        r"
        the          :- np[X]/^n[X,lex=the]
        dog/dog/NN   :- n[X,lex=the]   : @X(dog)
        runs/run/VBZ :- s[E]\np[X]     : @E(run) @E<agent>X
        ",
    );
    let rules = CcgRules::new().with_type_changing("dcl", "s[E]", "sd[E]", "@E<mood>=dcl").unwrap();
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer);
    let realization = realizer.realize(&lf("@w(run) @w<agent>s @s(dog) @w<mood>=dcl")).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Complete);
    let best = realization.best().unwrap();
    assert_eq!(best.sign.category.target().kind.as_ref(), "sd");
    assert!(realization.stats().rule_apps.instances > 0);
}

// --- Optional, alternative and chunked preds ---------------------------------

const BIG_DOG_LF: &str = "@w(run) @w<agent>s @s(dog) @s<mod>b @b(big)";

#[test]
fn optional_preds_may_be_left_unrealized() {
    let (lexicon, rules) = (lexicon(DOG_RUNS), CcgRules::new());
    let input = lf(BIG_DOG_LF).with_opt(0, &[3, 4]);
    let mut realization = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).realize(&input).unwrap();

    assert_eq!(realization.status(), RealizationStatus::Complete);
    assert_eq!(realization.orthography().as_deref(), Some("the dog runs"));
    assert_eq!(realization.best().unwrap().coverage(), &BitSet::full(5));
    let chart = realization.chart();
    let complete: Vec<&Edge> = chart.all_edges().iter().map(|&id| chart.edge(id)).filter(|e| e.complete()).collect();
    assert!(complete.iter().any(|e| e.opt_completes.is_some()));
    assert!(complete.iter().all(|e| e.sign.lf.iter().all(|p| p.lex_pred() != Some("big"))));
    assert!(!complete_orthographies(&mut realization).is_empty());
}

#[test]
fn alternatives_are_realized_one_at_a_time() {
    let lexicon = lexicon(
        r"
        the          :- np[X]/^n[X,lex=the]
        dog/dog/NN   :- n[X,lex=the]   : @X(dog)
        cat/cat/NN   :- n[X,lex=the]   : @X(cat)
        runs/run/VBZ :- s[E]\np[X]     : @E(run) @E<agent>X
        ",
    );
    let rules = CcgRules::new();
    let input = lf("@w(run) @w<agent>s @s(dog) @s(cat)").with_alt(0, 0, &[2]).with_alt(0, 1, &[3]);
    let config = SearchConfig::default().with_pruning_value(None);
    let mut realization =
        Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).with_config(config).realize(&input).unwrap();

    assert_eq!(realization.status(), RealizationStatus::Complete);
    assert_eq!(complete_orthographies(&mut realization), vec!["the cat runs", "the dog runs"]);
    for id in realization.best_edges() {
        let edge = realization.chart().edge(id);
        let nouns = edge.sign.lf.iter().filter(|p| matches!(p.lex_pred(), Some("dog" | "cat"))).count();
        assert_eq!(nouns, 1, "{edge}");
    }
}

const BIG_DOG_RUNS: &str = r"
    the          :- np[X]/^n[X,lex=the]
    big/big/JJ   :- n[X]/^n[X]     : @X<mod>M @M(big)
    dog/dog/NN   :- n[X,lex=the]   : @X(dog)
    runs/run/VBZ :- s[E]\np[X]     : @E(run) @E<agent>X
";

#[test]
fn chunks_are_finished_before_combining_outside() {
    let (lexicon, rules) = (lexicon(BIG_DOG_RUNS), CcgRules::new());
    let grammar = Grammar::new(&lexicon, &rules);
    let input = lf(BIG_DOG_LF).with_chunk(0, &[2, 3, 4]);
    let chunk: BitSet = [2, 3, 4].into_iter().collect();
    let config = SearchConfig::default().with_pruning_value(None);

    let realization = Realizer::new(grammar, &NullScorer).with_config(config.clone()).realize(&input).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Complete);
    assert_eq!(realization.orthography().as_deref(), Some("the big dog runs"));
    let chart = realization.chart();
    for &id in chart.all_edges() {
        let coverage = chart.edge(id).coverage();
        assert!(
            !coverage.intersects(&chunk) || coverage.is_subset(&chunk) || chunk.is_subset(coverage),
            "{}",
            chart.edge(id)
        );
    }

    // Without chunk constraints `the dog` combines with `runs` early.
    let unchunked = config.with_factory_flags(FactoryFlags::INDEXING | FactoryFlags::FEATURE_LICENSING);
    let realization = Realizer::new(grammar, &NullScorer).with_config(unchunked).realize(&input).unwrap();
    let chart = realization.chart();
    let straddling: BitSet = [0, 1, 2].into_iter().collect();
    assert!(chart.all_edges().iter().any(|&id| chart.edge(id).coverage() == &straddling));
}

// --- Hypertagger -------------------------------------------------------------

/// Restricts supertags per lexical pred, one map per beta level; preds
/// without an entry are unrestricted.
struct StagedTagger {
    betas: Vec<HashMap<&'static str, Vec<&'static str>>>,
    beta: usize,
    preds: Vec<Pred>,
    current: Option<usize>,
    resets: usize,
}

impl StagedTagger {
    fn new(betas: Vec<HashMap<&'static str, Vec<&'static str>>>) -> Self {
        StagedTagger { betas, beta: 0, preds: Vec::new(), current: None, resets: 0 }
    }
}

impl Hypertagger for StagedTagger {
    fn map_preds(&mut self, preds: &[Pred]) {
        self.preds = preds.to_vec();
    }

    fn set_pred(&mut self, index: usize) {
        self.current = Some(index);
    }

    fn supertags(&self) -> Option<Vec<(Arc<str>, f64)>> {
        let pred = self.preds.get(self.current?)?.lex_pred()?;
        let tags = self.betas.get(self.beta)?.get(pred)?;
        Some(tags.iter().map(|&t| (Arc::from(t), 1.0)).collect())
    }

    fn has_more_betas(&self) -> bool {
        self.beta + 1 < self.betas.len()
    }

    fn next_beta(&mut self) {
        self.beta += 1;
    }

    fn reset_beta(&mut self) {
        self.beta = 0;
        self.resets += 1;
    }
}

#[test]
fn widening_the_beam_recovers_a_missing_tag() {
    let (lexicon, rules) = (lexicon(DOG_RUNS), CcgRules::new());
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer);
    let mut tagger = StagedTagger::new(vec![HashMap::from([("run", vec!["s/np"])]), HashMap::new()]);

    let realization = realizer.realize_with_hypertagger(&lf(RUNS_LF), &mut tagger).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Complete);
    assert_eq!(realization.orthography().as_deref(), Some("the dog runs"));
    assert_eq!(realization.rounds(), 2);
    assert_eq!(tagger.resets, 1);
    assert_eq!(tagger.beta, 1);
}

#[test]
fn first_beta_is_enough_when_it_admits_the_right_tags() {
    let (lexicon, rules) = (lexicon(DOG_RUNS), CcgRules::new());
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer);
    let mut tagger = StagedTagger::new(vec![HashMap::from([("run", vec![r"s\np"])]), HashMap::new()]);
    let realization = realizer.realize_with_hypertagger(&lf(RUNS_LF), &mut tagger).unwrap();
    assert_eq!(realization.rounds(), 1);
    assert_eq!(realization.status(), RealizationStatus::Complete);
}

#[test]
fn hypertagger_rounds_keep_the_n_best_list() {
    let (lexicon, rules) = (lexicon(DOGS_AND_HOUNDS), CcgRules::new());
    let config = SearchConfig::default().with_pruning_value(None);
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).with_config(config);

    let mut single = realizer.realize(&lf(RUNS_LF)).unwrap();
    let mut tagger = StagedTagger::new(vec![HashMap::new()]);
    let mut tagged = realizer.realize_with_hypertagger(&lf(RUNS_LF), &mut tagger).unwrap();
    assert_eq!(tagged.rounds(), 1);
    assert_eq!(
        complete_orthographies(&mut tagged),
        vec!["the dog runs", "the dog sprints", "the hound runs", "the hound sprints"]
    );
    assert_eq!(complete_orthographies(&mut tagged), complete_orthographies(&mut single));
}

/// `runs` wants an `np`, but only a bare noun is available.
const NO_DETERMINER: &str = r"
    dog/dog/NN   :- n[X]          : @X(dog)
    runs/run/VBZ :- s[E]\np[X]    : @E(run) @E<agent>X
";

#[test]
fn gluing_completes_unconnected_fragments() {
    let (lexicon, rules) = (lexicon(NO_DETERMINER), CcgRules::new());
    let realizer = Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer);
    let mut tagger = StagedTagger::new(vec![HashMap::new()]);
    let realization = realizer.realize_with_hypertagger(&lf(RUNS_LF), &mut tagger).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Complete);
    let best = realization.best().unwrap();
    assert!(best.sign.category.is_fragment());
    assert_eq!(best.sign.words.len(), 2);
}

#[test]
fn anytime_fallback_joins_fragments() {
    let (lexicon, rules) = (lexicon(NO_DETERMINER), CcgRules::new());
    let realizer =
        Realizer::new(Grammar::new(&lexicon, &rules), &NullScorer).with_config(SearchConfig::default().with_gluing(false));
    let mut tagger = StagedTagger::new(vec![HashMap::new()]);
    let realization = realizer.realize_with_hypertagger(&lf(RUNS_LF), &mut tagger).unwrap();
    assert_eq!(realization.status(), RealizationStatus::Incomplete);
    assert_eq!(realization.rounds(), 2);
    let best = realization.best().unwrap();
    assert_eq!(best.completeness, 1.0);
    assert_eq!(best.sign.derivation.rule().map(|r| r.as_ref()), Some("*"));
}
