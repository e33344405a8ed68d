//! AI streaming client binding (spec §4.2): state machine, transcript
//! filtering, and the wire adapter to the upstream provider.

pub mod client;
pub mod transcript;

pub use client::{context_prompt, AiBinding, AiBindingConfig, AiEvent, AiState};
pub use transcript::TranscriptionMode;
