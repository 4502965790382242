//! Table management: registration, manual occupancy and removal.

use common::AggregateId;
use event_store::{EventStoreError, Persistence};

use crate::command::{CommandHandler, CommandResult, UnitOfWork};
use crate::error::DomainError;

use super::{Table, TableError, TableEvent, TableNumber};

/// Key namespace holding table number → table id.
pub const TABLE_NUMBER_KEY: &str = "table_number";

/// Command to register a new table.
#[derive(Debug, Clone)]
pub struct RegisterTable {
    pub table_number: TableNumber,
    pub capacity: u32,
}

impl RegisterTable {
    pub fn new(table_number: impl Into<TableNumber>, capacity: u32) -> Self {
        Self {
            table_number: table_number.into(),
            capacity,
        }
    }
}

/// Service for table lifecycle commands.
pub struct TableService<S: Persistence + Clone> {
    handler: CommandHandler<S, Table>,
}

impl<S: Persistence + Clone> Clone for TableService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<S: Persistence + Clone> TableService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Registers a table under a unique number.
    #[tracing::instrument(skip(self), fields(table_number = %cmd.table_number))]
    pub async fn register_table(&self, cmd: RegisterTable) -> Result<Table, DomainError> {
        let table_id = AggregateId::new();
        let table_number = cmd.table_number;

        // Shape checks first so a bad request never claims the number
        let decision = self.handler.decide_on(table_id, Table::default(), |t| {
            t.register(table_id, table_number.clone(), cmd.capacity)
        })?;

        let store = self.handler.store();
        match store
            .claim_key(TABLE_NUMBER_KEY, table_number.as_str(), table_id)
            .await
        {
            Ok(()) => {}
            Err(EventStoreError::DuplicateKey { .. }) => {
                return Err(DomainError::Validation(format!(
                    "table number {table_number} is already registered"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let mut uow = UnitOfWork::new();
        uow.stage(&decision);
        if let Err(e) = uow.commit(store).await {
            store
                .release_key(TABLE_NUMBER_KEY, table_number.as_str(), table_id)
                .await?;
            return Err(e);
        }

        tracing::info!(%table_id, capacity = cmd.capacity, "table registered");
        Ok(decision.finish().aggregate)
    }

    /// Walk-in occupancy.
    #[tracing::instrument(skip(self))]
    pub async fn occupy(&self, table_id: AggregateId) -> Result<Table, DomainError> {
        let result = self.execute(table_id, |t| t.occupy()).await?;
        Ok(result.aggregate)
    }

    /// Manual release; refused while unpaid orders remain.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, table_id: AggregateId) -> Result<Table, DomainError> {
        let result = self.execute(table_id, |t| t.release()).await?;
        Ok(result.aggregate)
    }

    /// Retires a table and frees its number for reuse.
    #[tracing::instrument(skip(self))]
    pub async fn remove_table(&self, table_id: AggregateId) -> Result<(), DomainError> {
        let result = self.execute(table_id, |t| t.remove()).await?;
        if let Some(number) = result.aggregate.table_number() {
            self.handler
                .store()
                .release_key(TABLE_NUMBER_KEY, number.as_str(), table_id)
                .await?;
        }
        tracing::info!(%table_id, "table removed");
        Ok(())
    }

    /// Loads a registered table. Removed tables are still returned.
    pub async fn get_table(&self, table_id: AggregateId) -> Result<Option<Table>, DomainError> {
        self.handler.load_existing(table_id).await
    }

    pub async fn find_by_number(
        &self,
        table_number: &TableNumber,
    ) -> Result<Option<Table>, DomainError> {
        let owner = self
            .handler
            .store()
            .lookup_key(TABLE_NUMBER_KEY, table_number.as_str())
            .await?;
        match owner {
            Some(table_id) => self.get_table(table_id).await,
            None => Ok(None),
        }
    }

    /// All tables that have not been removed, in registration order.
    pub async fn list_tables(&self) -> Result<Vec<Table>, DomainError> {
        let registrations = self
            .handler
            .store()
            .get_events_by_type("TableRegistered")
            .await?;

        let mut tables = Vec::with_capacity(registrations.len());
        for envelope in registrations {
            if let Some(table) = self.get_table(envelope.aggregate_id).await?
                && !table.is_removed()
            {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    async fn execute<F>(
        &self,
        table_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<Table>, DomainError>
    where
        F: FnOnce(&Table) -> Result<Vec<TableEvent>, TableError>,
    {
        let result = self.handler.execute(table_id, command_fn).await?;
        self.handler.snapshot_if_due(&result).await;
        Ok(result)
    }
}
