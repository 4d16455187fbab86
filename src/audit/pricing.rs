//! Per-1K-token list prices used for audit cost estimates.

/// (provider, model prefix, USD per 1K tokens)
const PRICES: &[(&str, &str, f64)] = &[
    ("openai", "gpt-4", 0.03),
    ("openai", "gpt-4-turbo", 0.01),
    ("openai", "gpt-4o", 0.005),
    ("openai", "gpt-3.5-turbo", 0.0005),
    ("anthropic", "claude-3-opus", 0.015),
    ("anthropic", "claude-3-sonnet", 0.003),
    ("anthropic", "claude-3-haiku", 0.00025),
];

fn canonical_provider(provider: &str) -> String {
    match provider.to_lowercase().as_str() {
        "azure" | "azure-openai" | "azure_openai" => "openai".to_string(),
        other => other.to_string(),
    }
}

/// Label used for providers and models outside the price table.
pub const OTHER_LABEL: &str = "other";

fn lookup(provider: &str, model: &str) -> Option<&'static (&'static str, &'static str, f64)> {
    let provider = canonical_provider(provider);
    let model = model.to_lowercase();

    PRICES
        .iter()
        .filter(|(p, prefix, _)| *p == provider && model.starts_with(prefix))
        .max_by_key(|(_, prefix, _)| prefix.len())
}

/// Estimate the cost of a call. Unknown providers and models cost nothing.
///
/// Models match on the longest known prefix, so `gpt-4o-mini` is priced as
/// `gpt-4o` and `gpt-4-0613` as `gpt-4`.
pub fn estimate_cost_usd(provider: &str, model: &str, total_tokens: u64) -> f64 {
    lookup(provider, model).map_or(0.0, |(_, _, per_1k)| total_tokens as f64 / 1000.0 * per_1k)
}

/// Bounded `(provider, model)` metric labels drawn from the price table.
///
/// Anything the table does not know collapses to [`OTHER_LABEL`].
pub fn metric_labels(provider: &str, model: &str) -> (&'static str, &'static str) {
    if let Some((p, prefix, _)) = lookup(provider, model) {
        return (*p, *prefix);
    }
    let provider = canonical_provider(provider);
    let known = PRICES.iter().map(|(p, _, _)| *p).find(|p| *p == provider);
    (known.unwrap_or(OTHER_LABEL), OTHER_LABEL)
}
