//! Yodlee aggregation client: FastLink user tokens and linked accounts.

pub mod client;
pub mod models;

pub use broker_trait::OAuthProvider;
pub use client::{YodleeClient, YodleeConfig};
pub use models::LinkedAccount;
