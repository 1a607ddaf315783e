//! Mock `OrderStore` for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::Order;
use crate::storage::{OrderStore, Result, StorageError};

#[derive(Default)]
pub struct MockOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MockOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn get(&self, id: Uuid) -> Result<Order> {
        self.orders.read().await.get(&id).cloned().ok_or(StorageError::NotFound(id))
    }

    async fn insert(&self, order: &Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let existing = orders.get(&order.id).ok_or(StorageError::NotFound(order.id))?;
        if existing.version + 1 != order.version {
            return Err(StorageError::VersionConflict(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }
}
