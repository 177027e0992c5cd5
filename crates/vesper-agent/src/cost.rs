//! Static per-model cost rates, in GBP per 1M tokens.
//!
//! Rates are approximate list prices converted to GBP; they exist to give
//! the dashboard and audit log a comparable cost figure across providers,
//! not to reconcile against an invoice.

/// (model id substring, input GBP/1M tokens, output GBP/1M tokens).
/// Matched by `model.contains(prefix)` so versioned model IDs
/// (`claude-3-5-sonnet-20241022`) still hit their family's rate.
const RATE_TABLE: &[(&str, f64, f64)] = &[
    ("claude-3-5-sonnet", 2.40, 12.00),
    ("claude-3-5-haiku", 0.64, 3.20),
    ("claude-3-opus", 12.00, 60.00),
    ("gpt-4o-mini", 0.12, 0.48),
    ("gpt-4o", 2.00, 8.00),
    ("gpt-3.5", 0.40, 1.60),
    ("gemini-2.0-flash", 0.08, 0.32),
    ("gemini-1.5-pro", 1.00, 4.00),
    ("llama-3.3-70b", 0.47, 0.47),
    ("deepseek-chat", 0.11, 0.22),
    ("deepseek-r1", 0.44, 1.74),
    ("mistral-large", 1.60, 4.80),
];

/// Rate used when no table entry matches, e.g. a self-hosted or unlisted model.
const DEFAULT_RATE_GBP_PER_1M: (f64, f64) = (1.00, 3.00);

/// Look up the (input, output) GBP-per-1M-token rate for a model.
fn rate_for(model: &str) -> (f64, f64) {
    let lower = model.to_lowercase();
    RATE_TABLE
        .iter()
        .find(|(prefix, _, _)| lower.contains(prefix))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(DEFAULT_RATE_GBP_PER_1M)
}

/// Compute the GBP cost of a completed request.
pub fn estimate_cost_gbp(model: &str, tokens_in: u32, tokens_out: u32) -> f64 {
    let (input_rate, output_rate) = rate_for(model);
    let input_cost = (tokens_in as f64 / 1_000_000.0) * input_rate;
    let output_cost = (tokens_out as f64 / 1_000_000.0) * output_rate;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_table_rate() {
        let cost = estimate_cost_gbp("claude-3-5-sonnet-20241022", 1_000_000, 0);
        assert!((cost - 2.40).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let cost = estimate_cost_gbp("some-self-hosted-model", 1_000_000, 1_000_000);
        assert!((cost - 4.00).abs() < 1e-9);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        assert_eq!(estimate_cost_gbp("gpt-4o", 0, 0), 0.0);
    }
}
