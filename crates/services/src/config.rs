use std::env;
use std::time::Duration;

/// Environment variable overriding [`ServicesConfig::progress_write_timeout`], in milliseconds.
pub const PROGRESS_WRITE_TIMEOUT_ENV: &str = "PROGRESS_WRITE_TIMEOUT_MS";

/// Tunables shared by the services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicesConfig {
    /// Upper bound on a progress upsert during ingestion. Past it the write
    /// counts as failed and ingestion carries on.
    pub progress_write_timeout: Duration,
    /// Page size used when a statement listing does not name one.
    pub default_statement_limit: u32,
    /// Largest page a statement listing may ask for.
    pub max_statement_limit: u32,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            progress_write_timeout: Duration::from_millis(5_000),
            default_statement_limit: 50,
            max_statement_limit: 500,
        }
    }
}

impl ServicesConfig {
    /// Defaults, with overrides taken from the environment. Unparseable values
    /// are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env::var(PROGRESS_WRITE_TIMEOUT_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            config.progress_write_timeout = Duration::from_millis(ms);
        }
        config
    }

    #[must_use]
    pub fn with_progress_write_timeout(mut self, timeout: Duration) -> Self {
        self.progress_write_timeout = timeout;
        self
    }
}
