//! Analytics dispatcher (spec §4.5): best-effort sentiment, conversation
//! analysis, and coaching tasks triggered from finalized customer
//! transcripts, with a deterministic fallback when the collaborator fails.

pub mod dispatcher;
pub mod escalation;
pub mod keyword;
pub mod provider;

pub use dispatcher::{AnalyticsDispatcher, AnalyticsResult, AnalysisInput, CoachingInput, SentimentInput};
pub use escalation::should_escalate;
pub use keyword::classify_intent;
pub use provider::{AnalysisResult, AnalyticsProvider, CoachingResult, HttpAnalyticsProvider, SentimentResult, SummaryAnalysis};
