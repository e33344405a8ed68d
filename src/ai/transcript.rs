//! Sentence accumulation, debounce, and the script/echo filters applied to
//! transcript chunks from the AI provider (spec §4.2).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

/// Open question #1: the source contains two competing transcription
/// pipelines. Both are exposed so call sites (and tests) can exercise
/// either without guessing which one is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionMode {
    /// Accumulate chunks until one ends in `. ! ?`, emit the whole sentence.
    BufferedSentence,
    /// Emit every non-empty chunk immediately, unaccumulated.
    PerChunk,
}

/// Accumulates `outputTranscriptChunk` text into whole sentences.
pub struct OutputTranscriptPipeline {
    mode: TranscriptionMode,
    buf: String,
}

impl OutputTranscriptPipeline {
    pub fn new(mode: TranscriptionMode) -> Self {
        Self {
            mode,
            buf: String::new(),
        }
    }

    /// Feed one chunk. Returns a cleaned, finalized sentence if the mode's
    /// emission condition is met.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        match self.mode {
            TranscriptionMode::PerChunk => {
                if chunk.trim().is_empty() {
                    None
                } else {
                    Some(clean_meta_commentary(chunk))
                }
            }
            TranscriptionMode::BufferedSentence => {
                self.buf.push_str(chunk);
                if ends_sentence(&self.buf) {
                    Some(clean_meta_commentary(&std::mem::take(&mut self.buf)))
                } else {
                    None
                }
            }
        }
    }

    /// Flush any residual buffered text (on `turnComplete`).
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.trim().is_empty() {
            return None;
        }
        Some(clean_meta_commentary(&std::mem::take(&mut self.buf)))
    }
}

fn ends_sentence(s: &str) -> bool {
    matches!(s.trim_end().chars().last(), Some('.') | Some('!') | Some('?'))
}

static META_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static META_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*[^*]*\*").unwrap());

/// Strips bracketed or starred meta-commentary tokens (e.g. `[laughs]`,
/// `*pauses*`) and collapses the resulting whitespace.
pub fn clean_meta_commentary(text: &str) -> String {
    let no_brackets = META_BRACKET_RE.replace_all(text, " ");
    let no_stars = META_STAR_RE.replace_all(&no_brackets, " ");
    no_stars.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Debounce buffer for `inputTranscriptChunk` text. Driven by the AI
/// client's event loop, which resets a Δ_debounce timer on every push and
/// finalizes on quiet-period expiry or `turnComplete`.
#[derive(Default)]
pub struct DebounceBuffer {
    buf: String,
}

impl DebounceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.trim().is_empty()
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}

const INDIC_RANGES: &[(u32, u32)] = &[
    (0x0900, 0x097F),
    (0x0980, 0x09FF),
    (0x0A80, 0x0AFF),
    (0x0B00, 0x0B7F),
    (0x0C00, 0x0C7F),
    (0x0C80, 0x0CFF),
    (0x0D00, 0x0D7F),
];

/// Script filter (spec §4.2): rejects Indic-script text and text whose
/// ASCII-letter ratio is below 0.30. Empty or whitespace-only text is
/// rejected too (spec §8, boundary behaviors).
pub fn is_english(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed
        .chars()
        .any(|c| INDIC_RANGES.iter().any(|&(lo, hi)| (c as u32) >= lo && (c as u32) <= hi))
    {
        return false;
    }
    let non_ws: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if non_ws.is_empty() {
        return false;
    }
    let ascii_letters = non_ws.iter().filter(|c| c.is_ascii_alphabetic()).count();
    (ascii_letters as f64 / non_ws.len() as f64) >= 0.30
}

/// Lowercases and strips ASCII punctuation, collapsing whitespace.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ring of the AI's recently-emitted sentences, for echo suppression.
pub struct EchoRing {
    window: Duration,
    entries: VecDeque<(String, Instant)>,
}

impl EchoRing {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    pub fn record(&mut self, ai_sentence: &str, now: Instant) {
        self.evict(now);
        let norm = normalize(ai_sentence);
        if !norm.is_empty() {
            self.entries.push_back((norm, now));
        }
    }

    /// Bidirectional containment test against every live AI sentence.
    pub fn is_echo(&mut self, candidate: &str, now: Instant) -> bool {
        self.evict(now);
        let norm_candidate = normalize(candidate);
        if norm_candidate.is_empty() {
            return false;
        }
        self.entries
            .iter()
            .any(|(ai_norm, _)| ai_norm.contains(&norm_candidate) || norm_candidate.contains(ai_norm.as_str()))
    }

    fn evict(&mut self, now: Instant) {
        while let Some((_, t)) = self.entries.front() {
            if now.duration_since(*t) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_sentence_emits_on_terminator() {
        let mut p = OutputTranscriptPipeline::new(TranscriptionMode::BufferedSentence);
        assert!(p.push("Hello").is_none());
        assert_eq!(p.push(", there.").unwrap(), "Hello, there.");
    }

    #[test]
    fn buffered_sentence_flush_emits_residual() {
        let mut p = OutputTranscriptPipeline::new(TranscriptionMode::BufferedSentence);
        p.push("no terminator yet");
        assert_eq!(p.flush().unwrap(), "no terminator yet");
        assert!(p.flush().is_none());
    }

    #[test]
    fn per_chunk_emits_every_nonempty_chunk() {
        let mut p = OutputTranscriptPipeline::new(TranscriptionMode::PerChunk);
        assert_eq!(p.push("hi").unwrap(), "hi");
        assert!(p.push("").is_none());
    }

    #[test]
    fn cleaner_strips_bracketed_and_starred_tokens() {
        let cleaned = clean_meta_commentary("Hello [laughs] there *pauses* friend");
        assert_eq!(cleaned, "Hello there friend");
    }

    #[test]
    fn is_english_rejects_devanagari() {
        assert!(!is_english("नमस्ते, मुझे मदद चाहिए"));
    }

    #[test]
    fn is_english_rejects_low_ascii_ratio() {
        assert!(!is_english("123456 7890 !! ## @@"));
    }

    #[test]
    fn is_english_accepts_plain_english() {
        assert!(is_english("please hold while I check"));
    }

    #[test]
    fn is_english_rejects_empty_or_whitespace() {
        assert!(!is_english(""));
        assert!(!is_english("   "));
    }

    #[test]
    fn echo_ring_suppresses_within_window() {
        let mut ring = EchoRing::new(Duration::from_secs(10));
        let t0 = Instant::now();
        ring.record("Please hold while I check.", t0);
        assert!(ring.is_echo("please hold while i check", t0 + Duration::from_secs(2)));
    }

    #[test]
    fn echo_ring_does_not_suppress_after_window() {
        let mut ring = EchoRing::new(Duration::from_millis(10));
        let t0 = Instant::now();
        ring.record("Please hold while I check.", t0);
        assert!(!ring.is_echo("please hold while i check", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn echo_ring_ignores_empty_candidate() {
        let mut ring = EchoRing::new(Duration::from_secs(10));
        let t0 = Instant::now();
        ring.record("hello", t0);
        assert!(!ring.is_echo("   ", t0));
    }
}
