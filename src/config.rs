use std::time::Duration;

/// Process-wide configuration resolved once at startup, the way
/// `logging::LoggingConfig::from_env` resolves its own slice of the
/// environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: std::net::SocketAddr,

    pub worker_concurrency: usize,
    pub lease_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub recovery_interval: Duration,

    pub upstream_min_interval: Duration,
    pub upstream_timeout: Duration,
    pub freshness_ttl: Duration,

    pub llm_provider: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_sheet_concurrency: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL is not set".to_string())?;

        let port: u16 = env_or("PORT", 3000);
        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| std::net::SocketAddr::from(([0, 0, 0, 0], port)));

        Ok(Self {
            database_url,
            bind_addr,
            worker_concurrency: env_or("WORKER_CONCURRENCY", 5),
            lease_ttl: Duration::from_secs(env_or("LEASE_TTL_SECS", 90)),
            heartbeat_interval: Duration::from_secs(env_or("HEARTBEAT_INTERVAL_SECS", 30)),
            recovery_interval: Duration::from_secs(env_or("RECOVERY_INTERVAL_SECS", 60)),
            upstream_min_interval: Duration::from_millis(env_or(
                "UPSTREAM_MIN_INTERVAL_MS",
                1_000,
            )),
            upstream_timeout: Duration::from_secs(env_or("UPSTREAM_TIMEOUT_SECS", 30)),
            freshness_ttl: Duration::from_secs(env_or("FRESHNESS_TTL_SECS", 24 * 60 * 60)),
            llm_provider: std::env::var("LLM_PROVIDER").ok(),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            llm_sheet_concurrency: env_or("LLM_SHEET_CONCURRENCY", 4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_absent() {
        std::env::remove_var("WORKER_CONCURRENCY");
        assert_eq!(env_or::<usize>("WORKER_CONCURRENCY_UNSET_XYZ", 5), 5);
    }

    #[test]
    fn env_override_parses() {
        std::env::set_var("FUNDFLOW_TEST_VALUE", "42");
        assert_eq!(env_or::<u32>("FUNDFLOW_TEST_VALUE", 7), 42);
        std::env::remove_var("FUNDFLOW_TEST_VALUE");
    }
}
