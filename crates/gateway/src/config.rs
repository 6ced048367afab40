//! Runtime configuration.
//!
//! Everything comes from `DNDTRACKER_*` environment variables, all optional.
//! Loading is pure over a lookup function so tests can feed in maps instead
//! of mutating process environment.

pub const DEFAULT_SERVER_SALT: &str = "dev-salt";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    /// Keyed-hash secret for token digests.
    pub server_salt: String,
    /// When set, selects the durable SQLite store; otherwise in-memory.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Backpressure cap on in-flight HTTP requests.
    pub max_concurrent_requests: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = match lookup("DNDTRACKER_PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(port = %raw, "unparseable DNDTRACKER_PORT, using default");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };
        let max_concurrent_requests = match lookup("DNDTRACKER_MAX_CONCURRENT_REQUESTS") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %raw,
                    "unparseable DNDTRACKER_MAX_CONCURRENT_REQUESTS, using default"
                );
                DEFAULT_MAX_CONCURRENT_REQUESTS
            }),
            None => DEFAULT_MAX_CONCURRENT_REQUESTS,
        };

        Self {
            server_salt: lookup("DNDTRACKER_SERVER_SALT")
                .filter(|salt| !salt.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVER_SALT.to_owned()),
            database_url: lookup("DNDTRACKER_DATABASE_URL").filter(|url| !url.is_empty()),
            host: lookup("DNDTRACKER_HOST")
                .filter(|host| !host.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port,
            max_concurrent_requests,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
