use fundamental_analysis::FundamentalsConfig;
use std::str::FromStr;
use std::time::Duration;

/// Server settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub environment: String,
    pub public_base_url: String,
    pub redis_url: Option<String>,
    pub aaa_bond_yield: f64,
    pub symbol_cache_ttl: Duration,
    pub screener_page_size: usize,
    pub session_ttl: chrono::Duration,
    pub auth_max_failures: u32,
    pub auth_failure_window: Duration,
    pub auth_lockout: Duration,
    pub fundamentals: FundamentalsConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let session_hours: i64 = env_or("SESSION_TTL_HOURS", 336);

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:finance.db".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            aaa_bond_yield: env_or("AAA_BOND_YIELD", 4.5),
            symbol_cache_ttl: Duration::from_secs(env_or("SYMBOL_CACHE_TTL_SECS", 3600)),
            screener_page_size: env_or("SCREENER_PAGE_SIZE", 15usize).max(1),
            session_ttl: chrono::Duration::hours(session_hours),
            auth_max_failures: env_or("AUTH_MAX_FAILURES", 5),
            auth_failure_window: Duration::from_secs(env_or("AUTH_FAILURE_WINDOW_SECS", 300)),
            auth_lockout: Duration::from_secs(env_or("AUTH_LOCKOUT_SECS", 900)),
            fundamentals: FundamentalsConfig::from_env(),
        }
    }

    /// Defaults without touching the environment; used by tests.
    pub fn for_fundamentals(fundamentals: FundamentalsConfig) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: "sqlite::memory:".to_string(),
            environment: "test".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            redis_url: None,
            aaa_bond_yield: 4.5,
            symbol_cache_ttl: Duration::from_secs(3600),
            screener_page_size: 15,
            session_ttl: chrono::Duration::hours(336),
            auth_max_failures: 5,
            auth_failure_window: Duration::from_secs(300),
            auth_lockout: Duration::from_secs(900),
            fundamentals,
        }
    }
}
