//! Per-model token pricing, used to populate `llm_usage.cost_estimate`.

/// USD per 1M input/output tokens. Unknown models fall back to a conservative
/// default rather than erroring — cost tracking is advisory, not a gate.
fn rate_per_million(model: &str) -> (f64, f64) {
    match model {
        "gpt-4o" => (2.50, 10.00),
        "gpt-4o-mini" => (0.15, 0.60),
        "gpt-4-turbo" => (10.00, 30.00),
        "claude-3-5-sonnet" | "claude-3-5-sonnet-latest" => (3.00, 15.00),
        "claude-3-haiku" => (0.25, 1.25),
        _ => (1.00, 3.00),
    }
}

pub fn estimate_cost(model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
    let (input_rate, output_rate) = rate_per_million(model);
    let input_cost = (input_tokens as f64 / 1_000_000.0) * input_rate;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * output_rate;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_own_rate() {
        let cost = estimate_cost("gpt-4o-mini", 1_000_000, 0);
        assert!((cost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let cost = estimate_cost("some-future-model", 1_000_000, 1_000_000);
        assert!((cost - 4.00).abs() < 1e-9);
    }
}
