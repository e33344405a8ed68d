//! Builds a `SummaryStorage` backend from `SummaryBackend` config.

use std::sync::Arc;

use crate::config::{PostgresConfig, SummaryBackend};
use crate::core::{SummaryResult, SummaryStorage};
use crate::memory::MemorySummaryStorage;
use crate::postgres::PostgresSummaryStorage;

#[derive(Debug, Clone, Default)]
pub struct StorageFactoryConfig {
    pub backend: SummaryBackend,
    pub postgres: Option<PostgresConfig>,
}

pub fn create_storage(config: StorageFactoryConfig) -> SummaryResult<Arc<dyn SummaryStorage>> {
    match config.backend {
        SummaryBackend::Memory => Ok(Arc::new(MemorySummaryStorage::new())),
        SummaryBackend::Postgres => {
            let pg = config.postgres.ok_or_else(|| {
                crate::core::SummaryStorageError::Backend(
                    "postgres backend selected but no PostgresConfig provided".into(),
                )
            })?;
            Ok(Arc::new(PostgresSummaryStorage::connect(&pg)?))
        }
    }
}
