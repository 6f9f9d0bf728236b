use crate::models::{IndexRecord, IndexStats};
use crate::traits::VectorIndex;
use crate::ServiceError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local index with upsert-by-id semantics. Keeps a log of the ids
/// sent in each upsert call.
#[derive(Debug)]
pub struct InMemoryIndex {
    dimension: usize,
    records: Mutex<BTreeMap<String, IndexRecord>>,
    calls: Mutex<Vec<Vec<String>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|_| ServiceError::Request("in-memory index lock poisoned".to_string()))
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<IndexRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(id).cloned())
    }

    /// Ids sent in each upsert call, in call order.
    pub fn upsert_calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_ready(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), ServiceError> {
        if let Some(record) = records
            .iter()
            .find(|record| record.values.len() != self.dimension)
        {
            return Err(ServiceError::DimensionMismatch {
                expected: self.dimension,
                actual: record.values.len(),
            });
        }

        let mut stored = locked(&self.records)?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        locked(&self.calls)?.push(records.iter().map(|record| record.id.clone()).collect());
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError> {
        Ok(IndexStats {
            total_vector_count: locked(&self.records)?.len() as u64,
            dimension: Some(self.dimension),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn record(id: &str, value: f32) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            values: vec![value; 4],
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() -> Result<(), ServiceError> {
        let index = InMemoryIndex::new(4);
        index.upsert(&[record("a-0", 0.1), record("a-1", 0.2)]).await?;
        index.upsert(&[record("a-0", 0.9)]).await?;

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a-0").map(|record| record.values[0]), Some(0.9));
        assert_eq!(index.upsert_calls(), vec![vec!["a-0", "a-1"], vec!["a-0"]]);
        assert_eq!(index.describe_stats().await?.total_vector_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected_without_writes() {
        let index = InMemoryIndex::new(4);
        let bad = IndexRecord {
            id: "a-0".to_string(),
            values: vec![0.0; 3],
            metadata: Metadata::new(),
        };

        let result = index.upsert(&[record("ok-0", 0.1), bad]).await;

        assert!(matches!(
            result,
            Err(ServiceError::DimensionMismatch { expected: 4, actual: 3 })
        ));
        assert!(index.is_empty());
    }
}
