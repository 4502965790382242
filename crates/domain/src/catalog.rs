//! Read-only view of the menu, consulted when items are ordered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::order::{MenuItemId, Money};

/// What an order needs to know about a menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub id: MenuItemId,
    pub name: String,
    pub price: Money,
    pub available: bool,
}

impl MenuEntry {
    pub fn new(id: impl Into<MenuItemId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            available: true,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of menu items by id.
#[async_trait]
pub trait MenuCatalog: Send + Sync {
    /// Returns None for unknown ids.
    async fn find_item(&self, id: &MenuItemId) -> Result<Option<MenuEntry>, CatalogError>;
}

#[async_trait]
impl<T: MenuCatalog + ?Sized> MenuCatalog for Arc<T> {
    async fn find_item(&self, id: &MenuItemId) -> Result<Option<MenuEntry>, CatalogError> {
        (**self).find_item(id).await
    }
}

/// In-memory catalog, loaded from seed data or by tests.
#[derive(Clone, Default)]
pub struct InMemoryMenuCatalog {
    items: Arc<RwLock<HashMap<MenuItemId, MenuEntry>>>,
}

impl InMemoryMenuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = MenuEntry>) -> Self {
        let map = items
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        Self {
            items: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn upsert(&self, entry: MenuEntry) {
        self.items.write().await.insert(entry.id.clone(), entry);
    }

    /// Returns false if the item is unknown.
    pub async fn set_price(&self, id: &MenuItemId, price: Money) -> bool {
        match self.items.write().await.get_mut(id) {
            Some(entry) => {
                entry.price = price;
                true
            }
            None => false,
        }
    }

    /// Returns false if the item is unknown.
    pub async fn set_available(&self, id: &MenuItemId, available: bool) -> bool {
        match self.items.write().await.get_mut(id) {
            Some(entry) => {
                entry.available = available;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl MenuCatalog for InMemoryMenuCatalog {
    async fn find_item(&self, id: &MenuItemId) -> Result<Option<MenuEntry>, CatalogError> {
        Ok(self.items.read().await.get(id).cloned())
    }
}
