use crate::db::AccountDb;
use crate::models::BrokerToken;
use crate::StoreResult;
use broker_trait::{Provider, TokenGrant};
use chrono::{DateTime, Utc};

pub struct TokenStore {
    db: AccountDb,
}

impl TokenStore {
    pub fn new(db: AccountDb) -> Self {
        Self { db }
    }

    /// Insert or replace the user's token for a provider. `created_at` is kept
    /// from the first insert.
    pub async fn upsert(
        &self,
        user_id: i64,
        provider: Provider,
        grant: &TokenGrant,
        now: DateTime<Utc>,
    ) -> StoreResult<BrokerToken> {
        sqlx::query(
            r#"
            INSERT INTO broker_tokens
                (user_id, provider, access_token, refresh_token, token_secret,
                 expires_in, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_secret = excluded.token_secret,
                expires_in = excluded.expires_in,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(&grant.token_secret)
        .bind(grant.expires_in)
        .bind(grant.expires_at(now))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        tracing::info!(user_id, provider = %provider, "Stored provider token");

        self.get(user_id, provider)
            .await?
            .ok_or(crate::StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn get(&self, user_id: i64, provider: Provider) -> StoreResult<Option<BrokerToken>> {
        let token = sqlx::query_as::<_, BrokerToken>(
            "SELECT * FROM broker_tokens WHERE user_id = ? AND provider = ?",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(token)
    }

    pub async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<BrokerToken>> {
        let tokens = sqlx::query_as::<_, BrokerToken>(
            "SELECT * FROM broker_tokens WHERE user_id = ? ORDER BY provider",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(tokens)
    }
}
