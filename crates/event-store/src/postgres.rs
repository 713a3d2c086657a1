use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, StreamAppend, batch_event_count, validate_batch},
};

/// Key of the transaction-scoped advisory lock every append takes.
const APPEND_LOCK_KEY: i64 = 0x6576_656e_7473;

const SELECT_EVENTS: &str = "SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, idempotency_key, metadata FROM events";

/// PostgreSQL-backed event store.
///
/// Concurrency relies on the `unique_aggregate_version` constraint and
/// idempotency on the partial `unique_idempotency_key` index, both created
/// by the migrations in `migrations/`.
///
/// Appends take one advisory lock for the length of their transaction, so
/// `position` values are allocated in commit order and a reader that has
/// seen position `n` has seen every position below it.
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

    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            idempotency_key: row.try_get("idempotency_key")?,
            metadata,
        })
    }

    async fn append_stream(tx: &mut Transaction<'_, Postgres>, append: StreamAppend) -> Result<Version> {
        let first = &append.events[0];
        let aggregate_id = first.aggregate_id;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&mut **tx)
                .await?;
        let current = Version::new(current.unwrap_or(0));

        if let Some(expected) = append.options.expected_version
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        let last_version = append.last_version();
        for event in &append.events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, idempotency_key, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(event.idempotency_key.as_deref())
            .bind(metadata_json)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    match db_err.constraint() {
                        Some("unique_aggregate_version") => {
                            return EventStoreError::ConcurrencyConflict {
                                aggregate_id,
                                expected: append.options.expected_version.unwrap_or(current),
                                actual: event.version,
                            };
                        }
                        Some("unique_idempotency_key") => {
                            return EventStoreError::DuplicateIdempotencyKey {
                                key: event.idempotency_key.clone().unwrap_or_default(),
                            };
                        }
                        _ => {}
                    }
                }
                EventStoreError::Database(e)
            })?;
        }

        Ok(last_version)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, batch), fields(streams = batch.len()))]
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_batch(&batch)?;
        let event_count = batch_event_count(&batch);

        // Dropping the transaction on an early return rolls everything back.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let mut versions = Vec::with_capacity(batch.len());
        for append in batch {
            versions.push(Self::append_stream(&mut tx, append).await?);
        }
        tx.commit().await?;

        metrics::counter!("events_appended_total").increment(event_count);
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
        let rows = sqlx::query(&format!(
            "{SELECT_EVENTS} WHERE aggregate_id = $1 AND version >= $2 ORDER BY version ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let pool = self.pool.clone();
        let stream = async_stream_rows(pool).map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(EventStoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn idempotency_key_exists(&self, key: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE idempotency_key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
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
            WHERE snapshots.version < EXCLUDED.version
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
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp, state
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
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

/// Streams every event row in commit order, owning its pool handle so the
/// stream can outlive the borrow of the store.
fn async_stream_rows(
    pool: PgPool,
) -> impl futures_core::Stream<Item = std::result::Result<PgRow, sqlx::Error>> + Send {
    use futures_util::{StreamExt, stream};

    stream::once(async move {
        sqlx::query(&format!("{SELECT_EVENTS} ORDER BY position ASC"))
            .fetch_all(&pool)
            .await
    })
    .flat_map(|result| match result {
        Ok(rows) => stream::iter(rows.into_iter().map(Ok)).left_stream(),
        Err(e) => stream::iter(std::iter::once(Err(e))).right_stream(),
    })
}
