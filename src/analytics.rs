//! Session analytics.
//!
//! Running counters updated once per answered turn, successful or not.
//! Summary generation is not counted.

use serde::Serialize;

use crate::models::{ChatTurn, Role};

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsState {
    pub total_queries: u64,
    /// Mean latency in seconds over all recorded turns.
    pub avg_latency: f64,
    pub total_tokens: u64,
    /// Percentage of turns that completed without error, in `[0, 100]`.
    pub success_rate: f64,
    #[serde(skip)]
    successes: u64,
}

impl Default for AnalyticsState {
    fn default() -> Self {
        Self {
            total_queries: 0,
            avg_latency: 0.0,
            total_tokens: 0,
            success_rate: 100.0,
            successes: 0,
        }
    }
}

impl AnalyticsState {
    /// Fold one finished turn into the counters.
    pub fn record(&mut self, prompt: &str, answer: &str, latency_seconds: f64, success: bool) {
        self.total_queries += 1;
        let n = self.total_queries as f64;
        self.avg_latency = (self.avg_latency * (n - 1.0) + latency_seconds) / n;
        self.total_tokens += estimate_tokens(&format!("{}{}", prompt, answer));
        if success {
            self.successes += 1;
        }
        self.success_rate = self.successes as f64 / n * 100.0;
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.total_queries - self.successes
    }
}

/// Per-turn latencies of the assistant turns in `history`, oldest first.
pub fn latency_series(history: &[ChatTurn]) -> Vec<f64> {
    history
        .iter()
        .filter(|t| t.role == Role::Assistant)
        .filter_map(|t| t.metadata.as_ref().map(|m| m.latency_seconds))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TurnMetadata;

    #[test]
    fn starts_at_documented_defaults() {
        let state = AnalyticsState::default();
        assert_eq!(state.total_queries, 0);
        assert_eq!(state.avg_latency, 0.0);
        assert_eq!(state.total_tokens, 0);
        assert_eq!(state.success_rate, 100.0);
    }

    #[test]
    fn running_mean_matches_formula() {
        let mut state = AnalyticsState::default();
        let mut averages = Vec::new();
        for latency in [1.0, 3.0] {
            state.record("q", "a", latency, true);
            averages.push(state.avg_latency);
        }
        assert_eq!(averages, vec![1.0, 2.0]);
        assert_eq!(state.total_queries, 2);
    }

    #[test]
    fn tokens_are_floor_of_combined_length_over_four() {
        let mut state = AnalyticsState::default();
        state.record("abcde", "fgh", 0.5, true); // 8 chars
        assert_eq!(state.total_tokens, 2);
        state.record("ab", "c", 0.5, true); // 3 chars
        assert_eq!(state.total_tokens, 2);
    }

    #[test]
    fn success_rate_tracks_failures() {
        let mut state = AnalyticsState::default();
        state.record("q", "a", 1.0, true);
        state.record("q", "", 1.0, false);
        assert_eq!(state.success_rate, 50.0);
        assert_eq!(state.failures(), 1);
        state.record("q", "a", 1.0, true);
        state.record("q", "a", 1.0, true);
        assert_eq!(state.success_rate, 75.0);
    }

    #[test]
    fn latency_series_reads_assistant_turns() {
        let meta = |latency| TurnMetadata {
            model: "Test/m".into(),
            time: "12:00:00".into(),
            latency_seconds: latency,
            citations: String::new(),
            success: true,
        };
        let history = vec![
            ChatTurn::user("q1"),
            ChatTurn::assistant("a1", meta(1.5)),
            ChatTurn::user("q2"),
            ChatTurn::assistant("a2", meta(0.5)),
        ];
        assert_eq!(latency_series(&history), vec![1.5, 0.5]);
    }
}
