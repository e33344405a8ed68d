//! Real-time voice-support mediation server: customer/AI/supervisor audio
//! routing, analytics dispatch, and end-of-call summaries.

pub mod ai;
pub mod analytics;
pub mod config;
pub mod control;
pub mod error;
pub mod session;
pub mod summary;
pub mod supervisor;
pub mod transport;

pub use config::Config;
