//! In-memory summary storage — default backend, and what the test suite runs against.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::core::{SummaryPage, SummaryQuery, SummaryRecord, SummaryResult, SummaryStorage, SummaryStorageError, SortOrder};

#[derive(Default)]
pub struct MemorySummaryStorage {
    records: DashMap<String, SummaryRecord>,
    // Insertion order, for stable pagination independent of hashmap iteration.
    order: Mutex<Vec<String>>,
}

impl MemorySummaryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SummaryStorage for MemorySummaryStorage {
    async fn insert(&self, record: SummaryRecord) -> SummaryResult<()> {
        if self.records.contains_key(&record.session_id) {
            return Err(SummaryStorageError::Duplicate(record.session_id));
        }
        self.order.lock().push(record.session_id.clone());
        self.records.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> SummaryResult<Option<SummaryRecord>> {
        Ok(self.records.get(session_id).map(|r| r.clone()))
    }

    async fn list(&self, query: SummaryQuery) -> SummaryResult<SummaryPage> {
        let order = self.order.lock();
        let mut matched: Vec<SummaryRecord> = order
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.clone()))
            .filter(|r| {
                query
                    .sentiment
                    .as_deref()
                    .map_or(true, |s| r.sentiment == s)
                    && query.intent.as_deref().map_or(true, |i| r.intent == i)
                    && query
                        .resolution
                        .as_deref()
                        .map_or(true, |res| r.resolution_status == res)
            })
            .collect();

        match query.sort_by.as_deref() {
            Some("frustration") => matched.sort_by(|a, b| {
                a.frustration_avg
                    .partial_cmp(&b.frustration_avg)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            _ => matched.sort_by_key(|r| r.created_at),
        }
        if query.sort_order == SortOrder::Desc {
            matched.reverse();
        }

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(query.offset)
            .take(if query.limit == 0 { usize::MAX } else { query.limit })
            .collect();

        Ok(SummaryPage {
            records: page,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sample_record;

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let store = MemorySummaryStorage::new();
        store.insert(sample_record("s1")).await.unwrap();
        let got = store.get("s1").await.unwrap().unwrap();
        assert_eq!(got.session_id, "s1");
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemorySummaryStorage::new();
        store.insert(sample_record("s1")).await.unwrap();
        let err = store.insert(sample_record("s1")).await.unwrap_err();
        assert!(matches!(err, SummaryStorageError::Duplicate(_)));
    }

    #[tokio::test]
    async fn list_filters_by_sentiment() {
        let store = MemorySummaryStorage::new();
        let mut angry = sample_record("s1");
        angry.sentiment = "angry".into();
        store.insert(angry).await.unwrap();
        store.insert(sample_record("s2")).await.unwrap();

        let page = store
            .list(SummaryQuery {
                sentiment: Some("angry".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].session_id, "s1");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = MemorySummaryStorage::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
