use crate::db::AccountDb;
use crate::models::{NewUser, User};
use crate::{StoreError, StoreResult};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::rngs::OsRng;

pub fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StoreError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

pub struct UserStore {
    db: AccountDb,
}

impl UserStore {
    pub fn new(db: AccountDb) -> Self {
        Self { db }
    }

    /// Usernames compare case-insensitively
    pub async fn username_exists(&self, username: &str) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(self.db.pool())
            .await?;

        Ok(count > 0)
    }

    pub async fn create_user(&self, input: &NewUser) -> StoreResult<User> {
        let password_hash = hash_password(&input.password)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, first_name, last_name, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&password_hash)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await;

        let id = match result {
            Ok(r) => r.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::UsernameTaken)
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = id, "Created user {}", input.username);
        self.find_by_id(id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    /// The user, if the username exists and the password matches
    pub async fn authenticate(&self, username: &str, password: &str) -> StoreResult<Option<User>> {
        let user = self.find_by_username(username).await?;
        Ok(user.filter(|u| verify_password(password, &u.password_hash)))
    }
}
