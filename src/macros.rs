/// Lazily compiled, process-wide `Regex` for a literal pattern.
///
/// The pattern is a literal known to be valid, so compilation cannot fail at
/// runtime for well-formed call sites.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).expect("literal regex"));
        &*RE
    }};
}

/// Parses a list of elementary predications written one per argument.
///
/// ```ignore
/// let preds = preds!["@e(run)", "@e<Agent>x", "@x(dog)"]?;
/// ```
#[macro_export]
macro_rules! preds {
    [ $($p:expr),* $(,)? ] => {{
        let parsed: Result<Vec<$crate::Pred>, $crate::RealizeError> =
            vec![ $($p),* ].into_iter().map(|s: &str| s.parse::<$crate::Pred>()).collect();
        parsed
    }};
}
