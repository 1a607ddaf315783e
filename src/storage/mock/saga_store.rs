//! Mock `SagaStore` for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::Saga;
use crate::storage::{Result, SagaStore, StorageError};

#[derive(Default)]
pub struct MockSagaStore {
    sagas: RwLock<HashMap<Uuid, Saga>>,
}

impl MockSagaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStore for MockSagaStore {
    async fn get(&self, id: Uuid) -> Result<Saga> {
        self.sagas.read().await.get(&id).cloned().ok_or(StorageError::NotFound(id))
    }

    async fn get_by_aggregate(&self, aggregate_id: Uuid) -> Result<Option<Saga>> {
        Ok(self
            .sagas
            .read()
            .await
            .values()
            .filter(|s| s.aggregate_id == aggregate_id)
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn insert(&self, saga: &Saga) -> Result<()> {
        self.sagas.write().await.insert(saga.id, saga.clone());
        Ok(())
    }

    async fn update(&self, saga: &Saga) -> Result<()> {
        let mut sagas = self.sagas.write().await;
        if !sagas.contains_key(&saga.id) {
            return Err(StorageError::NotFound(saga.id));
        }
        sagas.insert(saga.id, saga.clone());
        Ok(())
    }
}
