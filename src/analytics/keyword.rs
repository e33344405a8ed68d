//! Deterministic keyword classifier used as an intent-detection fallback
//! when the analysis collaborator is unreachable or returns garbage
//! (spec §4.5, "Fallback intent detection").

const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "complaint",
        &[
            "complain",
            "terrible",
            "worst",
            "awful",
            "unacceptable",
            "disappointed",
            "angry",
            "furious",
            "hate",
            "never work",
        ],
    ),
    (
        "cancellation",
        &["cancel", "unsubscribe", "terminate", "end my", "stop my", "close my account"],
    ),
    (
        "purchase",
        &["buy", "purchase", "order", "pricing", "cost", "how much", "subscribe", "sign up"],
    ),
    (
        "support",
        &["help", "issue", "problem", "not working", "broken", "fix", "trouble", "error", "stuck"],
    ),
    (
        "inquiry",
        &[
            "what is",
            "how do",
            "where can",
            "when will",
            "tell me about",
            "information",
            "question",
            "wondering",
        ],
    ),
    (
        "feedback",
        &["suggestion", "feedback", "improve", "recommend", "better if", "would be nice"],
    ),
];

/// Patterns are evaluated in category order; first match wins. If nothing
/// matches, a transcript longer than 20 characters is `inquiry`, else
/// `unknown`.
pub fn classify_intent(transcript: &str) -> &'static str {
    let lower = transcript.to_lowercase();
    for (label, patterns) in CATEGORIES {
        if patterns.iter().any(|p| lower.contains(p)) {
            return label;
        }
    }
    if transcript.len() > 20 {
        "inquiry"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complaint_wins_over_later_categories() {
        assert_eq!(classify_intent("this is terrible, I want to cancel"), "complaint");
    }

    #[test]
    fn cancellation_detected() {
        assert_eq!(classify_intent("I want to cancel my subscription"), "cancellation");
    }

    #[test]
    fn purchase_detected() {
        assert_eq!(classify_intent("how much does the pro plan cost"), "purchase");
    }

    #[test]
    fn support_detected() {
        assert_eq!(classify_intent("my account is broken, need help"), "support");
    }

    #[test]
    fn falls_back_to_inquiry_for_long_unmatched_text() {
        let text = "I was just browsing around the site for a while today";
        assert_eq!(classify_intent(text), "inquiry");
    }

    #[test]
    fn falls_back_to_unknown_for_short_unmatched_text() {
        assert_eq!(classify_intent("ok thanks"), "unknown");
    }
}
