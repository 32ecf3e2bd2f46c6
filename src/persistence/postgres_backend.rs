//! PostgreSQL-backed message store.
//!
//! Tables:
//! - `users` - participant id and display name
//! - `direct_message` - one row per message, joined to `users` for display names

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::fanout::{DirectMessage, ParticipantId};
use crate::metrics::StoreMetrics;

use super::backend::{MessageStore, StoreError};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS direct_message (
        id BIGSERIAL PRIMARY KEY,
        from_id TEXT NOT NULL REFERENCES users (id),
        to_id TEXT NOT NULL REFERENCES users (id),
        body TEXT NOT NULL,
        created TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS direct_message_pair_created_idx
    ON direct_message (LEAST(from_id, to_id), GREATEST(from_id, to_id), created)
    "#,
];

type MessageRow = (String, String, String, DateTime<Utc>, String, String);

/// PostgreSQL message store.
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables and index if they do not exist yet
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Message store schema ready");
        Ok(())
    }

    async fn lookup_name(&self, id: &ParticipantId) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM users WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.map(|(name,)| name))
    }
}

/// Connection-level failures are reported as unavailability rather than query errors
fn classify(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn row_to_message(row: MessageRow) -> Result<DirectMessage, StoreError> {
    let (from_id, to_id, body, created, sender, receiver) = row;
    let invalid = |e: crate::fanout::KeyError| StoreError::InvalidRecord(e.to_string());
    Ok(DirectMessage {
        from_id: ParticipantId::new(from_id).map_err(invalid)?,
        to_id: ParticipantId::new(to_id).map_err(invalid)?,
        body,
        created,
        sender,
        receiver,
    })
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn send(
        &self,
        from: &ParticipantId,
        to: &ParticipantId,
        body: &str,
    ) -> Result<DirectMessage, StoreError> {
        let sender = self
            .lookup_name(from)
            .await?
            .ok_or_else(|| StoreError::UnknownParticipant(from.to_string()))?;
        let receiver = self
            .lookup_name(to)
            .await?
            .ok_or_else(|| StoreError::UnknownParticipant(to.to_string()))?;

        let created = Utc::now();
        let result = sqlx::query(
            "INSERT INTO direct_message (from_id, to_id, body, created) VALUES ($1, $2, $3, $4)",
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(body)
        .bind(created)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            StoreMetrics::record_error();
            tracing::warn!(
                from_id = %from,
                to_id = %to,
                error = %e,
                "Failed to store direct message"
            );
            return Err(classify(e));
        }

        StoreMetrics::record_stored();

        Ok(DirectMessage {
            from_id: from.clone(),
            to_id: to.clone(),
            body: body.to_string(),
            created,
            sender,
            receiver,
        })
    }

    async fn get_history(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT dm.from_id, dm.to_id, dm.body, dm.created, u1.name AS sender, u2.name AS receiver
            FROM direct_message dm
            JOIN users u1 ON dm.from_id = u1.id
            JOIN users u2 ON dm.to_id = u2.id
            WHERE (dm.from_id = $1 AND dm.to_id = $2)
               OR (dm.from_id = $2 AND dm.to_id = $1)
            ORDER BY dm.created, dm.id
            "#,
        )
        .bind(a.as_str())
        .bind(b.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn display_name(&self, id: &ParticipantId) -> Result<Option<String>, StoreError> {
        self.lookup_name(id).await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
