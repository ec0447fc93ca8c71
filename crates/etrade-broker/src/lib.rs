pub mod client;
pub mod models;
pub mod signing;

pub use broker_trait::OAuthProvider;
pub use client::{EtradeClient, EtradeConfig};
pub use signing::OAuth1Signer;
