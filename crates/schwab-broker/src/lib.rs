pub mod client;
pub mod models;

pub use broker_trait::{BrokerClient, OAuthProvider};
pub use client::{SchwabClient, SchwabConfig};
pub use models::*;
