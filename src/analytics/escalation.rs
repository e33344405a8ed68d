//! Escalation policy (spec §4.5, §9 open question #2): the source varies
//! the threshold across modules; this crate fixes it at one configurable
//! value so sentiment results are judged consistently regardless of which
//! collaborator produced them.

const ESCALATION_SENTIMENTS: &[&str] = &["frustrated", "angry"];

pub fn should_escalate(score: f64, sentiment: &str, threshold: f64) -> bool {
    score >= threshold || ESCALATION_SENTIMENTS.contains(&sentiment.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_above_threshold() {
        assert!(should_escalate(85.0, "neutral", 70.0));
    }

    #[test]
    fn escalates_on_angry_sentiment_regardless_of_score() {
        assert!(should_escalate(10.0, "angry", 70.0));
    }

    #[test]
    fn does_not_escalate_below_threshold_and_calm() {
        assert!(!should_escalate(40.0, "neutral", 70.0));
    }
}
