use crate::db::AccountDb;
use crate::models::Session;
use crate::StoreResult;
use chrono::{DateTime, Duration, Utc};

/// Login sessions keyed by the SHA-256 of the opaque client token.
pub struct SessionStore {
    db: AccountDb,
}

impl SessionStore {
    pub fn new(db: AccountDb) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        token_hash: &str,
        user_id: i64,
        ttl: Duration,
    ) -> StoreResult<Session> {
        let now = Utc::now();
        let session = Session {
            token_hash: token_hash.to_string(),
            user_id,
            has_brokerage_connection: false,
            created_at: now,
            expires_at: now + ttl,
        };

        sqlx::query(
            r#"
            INSERT INTO sessions
                (token_hash, user_id, has_brokerage_connection, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(session.has_brokerage_connection)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(self.db.pool())
        .await?;

        Ok(session)
    }

    /// Live session for the hash; an expired one is removed and not returned.
    pub async fn find_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(self.db.pool())
            .await?;

        match session {
            Some(s) if s.is_expired(now) => {
                tracing::debug!(user_id = s.user_id, "Session expired");
                self.delete(token_hash).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub async fn set_brokerage_connection(
        &self,
        token_hash: &str,
        connected: bool,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE sessions SET has_brokerage_connection = ? WHERE token_hash = ?")
            .bind(connected)
            .bind(token_hash)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn delete(&self, token_hash: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
