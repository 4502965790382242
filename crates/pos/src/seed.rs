//! Start-up data: tables and the menu.
//!
//! ```json
//! {
//!   "tables": [{ "tableNumber": "T1", "capacity": 4 }],
//!   "menu": [{ "id": "latte", "name": "Latte", "price": 45000, "available": true }]
//! }
//! ```
//!
//! Seeding is repeatable: tables whose number is already registered are left alone
//! and menu items are upserted.

use std::path::{Path, PathBuf};

use domain::{
    DomainError, ErrorKind, InMemoryMenuCatalog, MenuEntry, Money, RegisterTable, TableNumber, TableService,
};
use event_store::Persistence;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Cannot read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed seed data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Seeding table {table_number} failed: {source}")]
    Table {
        table_number: String,
        #[source]
        source: DomainError,
    },
}

impl SeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeedError::Io { .. } => ErrorKind::NotFound,
            SeedError::Parse(_) => ErrorKind::Validation,
            SeedError::Table { source, .. } => source.kind(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub tables: Vec<SeedTable>,
    #[serde(default)]
    pub menu: Vec<SeedMenuItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedTable {
    pub table_number: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMenuItem {
    pub id: String,
    pub name: String,
    pub price: i64,
    #[serde(default = "available_by_default")]
    pub available: bool,
}

fn available_by_default() -> bool {
    true
}

impl From<SeedMenuItem> for MenuEntry {
    fn from(item: SeedMenuItem) -> Self {
        let entry = MenuEntry::new(item.id, item.name, Money::new(item.price));
        if item.available { entry } else { entry.unavailable() }
    }
}

/// What a seeding pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub tables_registered: usize,
    pub tables_existing: usize,
    pub menu_items: usize,
}

impl Seed {
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_path(path: &Path) -> Result<Self, SeedError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SeedError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&json)
    }

    #[tracing::instrument(skip_all, fields(tables = self.tables.len(), menu = self.menu.len()))]
    pub async fn apply<S: Persistence + Clone>(
        self,
        tables: &TableService<S>,
        catalog: &InMemoryMenuCatalog,
    ) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::default();

        for table in self.tables {
            let existing = tables
                .find_by_number(&TableNumber::new(table.table_number.as_str()))
                .await
                .map_err(|source| SeedError::Table {
                    table_number: table.table_number.clone(),
                    source,
                })?;
            if existing.is_some() {
                report.tables_existing += 1;
                continue;
            }

            tables
                .register_table(RegisterTable::new(table.table_number.as_str(), table.capacity))
                .await
                .map_err(|source| SeedError::Table {
                    table_number: table.table_number.clone(),
                    source,
                })?;
            report.tables_registered += 1;
        }

        for item in self.menu {
            catalog.upsert(item.into()).await;
            report.menu_items += 1;
        }

        tracing::info!(
            tables_registered = report.tables_registered,
            tables_existing = report.tables_existing,
            menu_items = report.menu_items,
            "seed applied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MenuCatalog, MenuItemId};
    use event_store::InMemoryEventStore;

    const CAFE: &str = r#"{
        "tables": [
            { "tableNumber": "T1", "capacity": 4 },
            { "tableNumber": "T2", "capacity": 2 }
        ],
        "menu": [
            { "id": "latte", "name": "Latte", "price": 45000 },
            { "id": "matcha", "name": "Matcha", "price": 55000, "available": false }
        ]
    }"#;

    #[test]
    fn parses_camel_case_seed() {
        let seed = Seed::from_json(CAFE).unwrap();
        assert_eq!(seed.tables[1].table_number, "T2");
        assert_eq!(seed.tables[1].capacity, 2);
        assert!(seed.menu[0].available);
        assert!(!seed.menu[1].available);
    }

    #[test]
    fn missing_sections_are_empty() {
        let seed = Seed::from_json("{}").unwrap();
        assert!(seed.tables.is_empty() && seed.menu.is_empty());
    }

    #[test]
    fn malformed_seed_is_a_validation_error() {
        let err = Seed::from_json(r#"{"tables": [{"tableNumber": "T1"}]}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn missing_file_is_reported_with_its_path() {
        let err = Seed::from_path(Path::new("/nonexistent/seed.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/seed.json"));
    }

    #[tokio::test]
    async fn apply_registers_tables_and_loads_menu() {
        let tables = TableService::new(InMemoryEventStore::new());
        let catalog = InMemoryMenuCatalog::new();

        let report = Seed::from_json(CAFE)
            .unwrap()
            .apply(&tables, &catalog)
            .await
            .unwrap();

        assert_eq!(
            report,
            SeedReport {
                tables_registered: 2,
                tables_existing: 0,
                menu_items: 2
            }
        );
        assert_eq!(tables.list_tables().await.unwrap().len(), 2);
        let matcha = catalog
            .find_item(&MenuItemId::new("matcha"))
            .await
            .unwrap()
            .unwrap();
        assert!(!matcha.available);
    }

    #[tokio::test]
    async fn reapplying_skips_registered_tables() {
        let tables = TableService::new(InMemoryEventStore::new());
        let catalog = InMemoryMenuCatalog::new();
        Seed::from_json(CAFE).unwrap().apply(&tables, &catalog).await.unwrap();

        let report = Seed::from_json(CAFE)
            .unwrap()
            .apply(&tables, &catalog)
            .await
            .unwrap();

        assert_eq!(report.tables_registered, 0);
        assert_eq!(report.tables_existing, 2);
        assert_eq!(tables.list_tables().await.unwrap().len(), 2);
        assert_eq!(catalog.len().await, 2);
    }
}
