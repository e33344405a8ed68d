//! Process configuration, loaded from CLI flags or environment variables
//! (spec §6, "Configuration"), in the teacher's `clap(derive, env)` style.

use clap::Parser;
use mediation_auth::{ApiKeyEntry, ControlPlaneAuthConfig, Role};
use mediation_storage::{PostgresConfig, StorageFactoryConfig, SummaryBackend};

#[derive(Debug, Clone, Parser)]
#[command(name = "mediation-server", about = "Voice-support mediation server")]
pub struct Config {
    /// Upstream conversational AI provider credential.
    #[arg(long, env = "API_KEY")]
    pub api_key: String,

    /// Control surface + WebSocket listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Verbose diagnostic logging.
    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Streaming voice model identifier forwarded to the AI provider.
    #[arg(long, env = "VOICE_MODEL", default_value = "gpt-4o-realtime-preview")]
    pub voice_model: String,

    /// Model identifier used for sentiment/analysis/coaching collaborators.
    #[arg(long, env = "ANALYSIS_MODEL", default_value = "gpt-4o-mini")]
    pub analysis_model: String,

    /// Upstream realtime voice provider's websocket endpoint (provider-specific,
    /// out of scope per spec Non-goals beyond needing an address to dial).
    #[arg(long, env = "AI_PROVIDER_WS_URL", default_value = "wss://api.openai.com/v1/realtime")]
    pub ai_provider_ws_url: String,

    /// Base URL of the sentiment/analysis/coaching HTTP collaborator.
    #[arg(long, env = "ANALYTICS_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub analytics_base_url: String,

    /// Δ_debounce: quiet period before a buffered input transcript finalizes.
    #[arg(long, env = "TRANSCRIPTION_DEBOUNCE_MS", default_value_t = 400)]
    pub transcription_debounce_ms: u64,

    /// Δ_echo: window an AI sentence can suppress a matching customer sentence.
    #[arg(long, env = "ECHO_WINDOW_MS", default_value_t = 10_000)]
    pub echo_window_ms: u64,

    /// Δ_analytics: timeout for sentiment/analysis/coaching tasks.
    #[arg(long, env = "ANALYTICS_TIMEOUT_MS", default_value_t = 5_000)]
    pub analytics_timeout_ms: u64,

    /// Δ_connect: timeout for the AI binding's `initialize()` handshake.
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Δ_drain: time a closing transport's outbox is given to flush.
    #[arg(long, env = "DRAIN_TIMEOUT_MS", default_value_t = 500)]
    pub drain_timeout_ms: u64,

    /// Sentiment score at/above which an escalation alert fires (REDESIGN
    /// FLAG / open question #2: the source varied this 70-80; fixed here
    /// at 70 by default but made configurable).
    #[arg(long, env = "ESCALATION_SCORE_THRESHOLD", default_value_t = 70.0)]
    pub escalation_score_threshold: f64,

    /// Supervisor outbox capacity (N_super).
    #[arg(long, env = "SUPERVISOR_OUTBOX_CAPACITY", default_value_t = 256)]
    pub supervisor_outbox_capacity: usize,

    /// Customer outbox capacity (N_cust).
    #[arg(long, env = "CUSTOMER_OUTBOX_CAPACITY", default_value_t = 64)]
    pub customer_outbox_capacity: usize,

    /// AI-bound outbound audio queue capacity (N_ai).
    #[arg(long, env = "AI_OUTBOUND_AUDIO_CAPACITY", default_value_t = 128)]
    pub ai_outbound_audio_capacity: usize,

    /// Bounded queue depth for the single summary-persistence writer task.
    #[arg(long, env = "SUMMARY_WRITER_QUEUE_CAPACITY", default_value_t = 256)]
    pub summary_writer_queue_capacity: usize,

    /// Summary storage backend: `memory` or `postgres`.
    #[arg(long, env = "SUMMARY_BACKEND", default_value = "memory")]
    pub summary_backend: String,

    /// Postgres connection string, required when `summary_backend=postgres`.
    #[arg(long, env = "DATABASE_URL", default_value = "")]
    pub database_url: String,

    /// Postgres connection pool size.
    #[arg(long, env = "DATABASE_POOL_MAX", default_value_t = 16)]
    pub database_pool_max: usize,

    /// Comma-separated supervisor API keys as `supervisorId:role:key`
    /// triples (role is `supervisor` or `admin`). Empty disables the
    /// control plane's auth middleware for local development.
    #[arg(long, env = "SUPERVISOR_API_KEYS", default_value = "")]
    pub supervisor_api_keys: String,
}

impl Config {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.transcription_debounce_ms)
    }

    pub fn echo_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.echo_window_ms)
    }

    pub fn analytics_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.analytics_timeout_ms)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn storage_factory_config(&self) -> StorageFactoryConfig {
        match self.summary_backend.as_str() {
            "postgres" => StorageFactoryConfig {
                backend: SummaryBackend::Postgres,
                postgres: Some(PostgresConfig {
                    db_url: self.database_url.clone(),
                    pool_max: self.database_pool_max,
                }),
            },
            _ => StorageFactoryConfig {
                backend: SummaryBackend::Memory,
                postgres: None,
            },
        }
    }

    /// Parses `SUPERVISOR_API_KEYS` (`supervisorId:role:key` triples,
    /// comma-separated). Malformed entries are logged and skipped.
    pub fn control_plane_auth_config(&self) -> ControlPlaneAuthConfig {
        let mut config = ControlPlaneAuthConfig::new();
        for entry in self.supervisor_api_keys.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let mut parts = entry.splitn(3, ':');
            let (Some(supervisor_id), Some(role_str), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
                tracing::warn!(entry, "malformed supervisor API key entry, skipping");
                continue;
            };
            let role = match role_str {
                "admin" => Role::Admin,
                "supervisor" => Role::Supervisor,
                other => {
                    tracing::warn!(role = other, "unknown supervisor role, skipping");
                    continue;
                }
            };
            config = config.with_key(key, ApiKeyEntry::new(supervisor_id, role, key));
        }
        config
    }
}
