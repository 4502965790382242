use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result, SequenceStore,
    Snapshot, UniqueKeyStore, Version,
    store::{
        AppendOptions, EventStore, EventStream, StreamAppend, validate_batch_for_append,
        validate_events_for_append,
    },
};

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata";

/// Order, table and settlement streams plus sequences and unique keys, all in
/// one PostgreSQL database. Cloning shares the pool.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies everything under `migrations/` that the database has not seen.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn decode_row(row: PgRow) -> Result<EventEnvelope> {
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.try_get("metadata")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn current_version<'e, E>(executor: E, aggregate_id: AggregateId) -> Result<Version>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(executor)
                .await?;
        Ok(Version::new(max.unwrap_or(0)))
    }

    async fn fetch_events(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::decode_row).collect()
    }

    /// Starts an event select; callers append ` AND ...` filters.
    fn select_events() -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"))
    }

    /// Checks the expected version and inserts one stream's events inside `tx`.
    async fn append_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        events: &[EventEnvelope],
        options: &AppendOptions,
    ) -> Result<Version> {
        let aggregate_id = events[0].aggregate_id;

        if let Some(expected) = options.expected_version {
            let actual = Self::current_version(&mut **tx, aggregate_id).await?;
            if actual != expected {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        let insert = format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        let mut last_version = Version::initial();
        for event in events {
            sqlx::query(&insert)
                .bind(event.event_id.as_uuid())
                .bind(&event.event_type)
                .bind(event.aggregate_id.as_uuid())
                .bind(&event.aggregate_type)
                .bind(event.version.as_i64())
                .bind(event.timestamp)
                .bind(&event.payload)
                .bind(serde_json::to_value(&event.metadata)?)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    // lost the race for this version to another writer
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.constraint() == Some("unique_aggregate_version")
                    {
                        return EventStoreError::ConcurrencyConflict {
                            aggregate_id,
                            expected: options.expected_version.unwrap_or(Version::initial()),
                            actual: event.version,
                        };
                    }
                    EventStoreError::Database(e)
                })?;

            last_version = event.version;
        }

        Ok(last_version)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip_all, fields(events = events.len()))]
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;

        let mut tx = self.pool.begin().await?;
        let version = Self::append_in_tx(&mut tx, &events, &options)
            .await
            .map_err(EventStoreError::observed)?;
        tx.commit().await?;
        Ok(version)
    }

    #[tracing::instrument(skip_all, fields(streams = appends.len()))]
    async fn append_batch(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_batch_for_append(&appends)?;

        let mut tx = self.pool.begin().await?;
        let mut versions = Vec::with_capacity(appends.len());
        for append in &appends {
            let version = Self::append_in_tx(&mut tx, &append.events, &append.options)
                .await
                .map_err(EventStoreError::observed)?;
            versions.push(version);
        }
        tx.commit().await?;
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::initial())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let mut builder = Self::select_events();
        builder
            .push(" AND aggregate_id = ")
            .push_bind(aggregate_id.as_uuid())
            .push(" AND version >= ")
            .push_bind(from_version.as_i64())
            .push(" ORDER BY version ASC");
        self.fetch_events(&mut builder).await
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut builder = Self::select_events();

        if let Some(id) = query.aggregate_id {
            builder.push(" AND aggregate_id = ").push_bind(id.as_uuid());
        }
        if let Some(aggregate_type) = query.aggregate_type {
            builder.push(" AND aggregate_type = ").push_bind(aggregate_type);
        }
        if let Some(types) = query.event_types {
            builder.push(" AND event_type = ANY(").push_bind(types).push(")");
        }
        if let Some(from) = query.from_version {
            builder.push(" AND version >= ").push_bind(from.as_i64());
        }
        if let Some(to) = query.to_version {
            builder.push(" AND version <= ").push_bind(to.as_i64());
        }
        if let Some(from) = query.from_timestamp {
            builder.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = query.to_timestamp {
            builder.push(" AND timestamp <= ").push_bind(to);
        }

        builder.push(" ORDER BY sequence ASC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            builder.push(" OFFSET ").push_bind(offset as i64);
        }

        self.fetch_events(&mut builder).await
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        self.query_events(EventQuery::for_event_type(event_type)).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY sequence ASC"
        ));
        let events = self.fetch_events(&mut builder).await?;
        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version = Self::current_version(&self.pool, aggregate_id).await?;
        Ok((version != Version::initial()).then_some(version))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT aggregate_id, aggregate_type, version, timestamp, state \
             FROM snapshots WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Snapshot> {
            Ok(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl SequenceStore for PostgresEventStore {
    async fn next_value(&self, name: &str) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    async fn current_value(&self, name: &str) -> Result<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM sequences WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.unwrap_or(0))
    }
}

#[async_trait]
impl UniqueKeyStore for PostgresEventStore {
    async fn claim_key(&self, namespace: &str, key: &str, owner: AggregateId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO unique_keys (namespace, key, owner_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (namespace, key) DO NOTHING
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(owner.as_uuid())
        .execute(&self.pool)
        .await?;

        match self.lookup_key(namespace, key).await? {
            Some(existing) if existing != owner => Err(EventStoreError::DuplicateKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
                owner: existing,
            }),
            _ => Ok(()),
        }
    }

    async fn lookup_key(&self, namespace: &str, key: &str) -> Result<Option<AggregateId>> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT owner_id FROM unique_keys WHERE namespace = $1 AND key = $2",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner.map(AggregateId::from_uuid))
    }

    async fn release_key(&self, namespace: &str, key: &str, owner: AggregateId) -> Result<()> {
        sqlx::query("DELETE FROM unique_keys WHERE namespace = $1 AND key = $2 AND owner_id = $3")
            .bind(namespace)
            .bind(key)
            .bind(owner.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
