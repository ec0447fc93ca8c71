pub mod db;
pub mod models;
pub mod sessions;
pub mod tokens;
pub mod users;

pub use db::AccountDb;
pub use models::*;
pub use sessions::SessionStore;
pub use tokens::TokenStore;
pub use users::UserStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("A user with that username already exists.")]
    UsernameTaken,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
