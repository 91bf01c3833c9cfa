use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by every recognised environment variable.
pub const ENV_PREFIX: &str = "BOOKING_";

#[derive(Debug, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub reminder: ReminderConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub api_host: SocketAddr,
    pub debug_host: SocketAddr,
    /// Deadline for receiving a request body.
    pub read_timeout: Duration,
    /// Deadline for producing a response.
    pub write_timeout: Duration,
    /// Reported at startup only; keep-alive is handled by the server.
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite file.
    pub host: String,
    pub name: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    /// Accepted for compatibility with networked backends; unused by SQLite.
    pub user: Option<String>,
    pub password: Option<String>,
    pub disable_tls: bool,
}

impl DatabaseConfig {
    pub fn path(&self) -> PathBuf {
        Path::new(&self.host).join(&self.name)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "(redacted)"))
            .field("disable_tls", &self.disable_tls)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub keys_folder: PathBuf,
    pub active_kid: String,
    pub issuer: String,
    pub token_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the token endpoint
    pub token_per_second: u64,
    /// Burst size for the token endpoint
    pub token_burst: u32,
}

#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Whether the in-process reminder worker runs.
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Maximum reminders processed in parallel.
    pub concurrency: usize,
    /// Per-task deadline, also used as the claim lease.
    pub processing_timeout: Duration,
    /// Attempts before a task is moved to 'dead'.
    pub max_attempts: i64,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Prefixed key lookup with typed parsing.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn key(name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&Self::key(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.raw(name)
            .ok_or_else(|| ConfigError::MissingEnv(Self::key(name)))
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError> {
        match self.raw(name) {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue(Self::key(name))),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.raw(name) {
            Some(v) => match v.to_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(true),
                "0" | "false" | "no" => Ok(false),
                _ => Err(ConfigError::InvalidValue(Self::key(name))),
            },
            None => Ok(default),
        }
    }

    fn duration(&self, name: &str, default: &str) -> Result<Duration, ConfigError> {
        let raw = self.raw(name).unwrap_or_else(|| default.to_string());
        humantime::parse_duration(&raw).map_err(|_| ConfigError::InvalidValue(Self::key(name)))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. Keys are looked up
    /// with the `BOOKING_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let config = Config {
            web: WebConfig {
                api_host: env.parse("WEB_API_HOST", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
                debug_host: env.parse("WEB_DEBUG_HOST", SocketAddr::from(([0, 0, 0, 0], 4000)))?,
                read_timeout: env.duration("WEB_READ_TIMEOUT", "5s")?,
                write_timeout: env.duration("WEB_WRITE_TIMEOUT", "10s")?,
                idle_timeout: env.duration("WEB_IDLE_TIMEOUT", "120s")?,
                shutdown_timeout: env.duration("WEB_SHUTDOWN_TIMEOUT", "20s")?,
            },
            database: DatabaseConfig {
                host: env.string("DB_HOST", "data"),
                name: env.string("DB_NAME", "booking.db"),
                max_open_conns: env.parse("DB_MAX_OPEN_CONNS", 5u32)?,
                max_idle_conns: env.parse("DB_MAX_IDLE_CONNS", 2u32)?,
                user: env.raw("DB_USER"),
                password: env.raw("DB_PASSWORD"),
                disable_tls: env.flag("DB_DISABLE_TLS", false)?,
            },
            auth: AuthConfig {
                keys_folder: PathBuf::from(env.string("AUTH_KEYS_FOLDER", "keys")),
                active_kid: env.required("AUTH_ACTIVE_KID")?,
                issuer: env.string("AUTH_ISSUER", "booking service"),
                token_ttl: env.duration("AUTH_TOKEN_TTL", "8h")?,
            },
            rate_limit: RateLimitConfig {
                token_per_second: env.parse("RATE_LIMIT_TOKEN_PER_SECOND", 3u64)?,
                token_burst: env.parse("RATE_LIMIT_TOKEN_BURST", 10u32)?,
            },
            reminder: ReminderConfig {
                enabled: env.flag("REMINDER_ENABLED", true)?,
                poll_interval: env.duration("REMINDER_POLL_INTERVAL", "5s")?,
                concurrency: env.parse("REMINDER_CONCURRENCY", 10usize)?,
                processing_timeout: env.duration("REMINDER_PROCESSING_TIMEOUT", "60s")?,
                max_attempts: env.parse("REMINDER_MAX_ATTEMPTS", 5i64)?,
                initial_backoff: env.duration("REMINDER_INITIAL_BACKOFF", "30s")?,
                max_backoff: env.duration("REMINDER_MAX_BACKOFF", "1h")?,
            },
            log_format: env.parse("LOG_FORMAT", LogFormat::Text)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &str| Err(ConfigError::InvalidValue(format!("{ENV_PREFIX}{name}")));

        if self.database.max_open_conns == 0 {
            return invalid("DB_MAX_OPEN_CONNS");
        }
        if self.database.max_idle_conns > self.database.max_open_conns {
            return invalid("DB_MAX_IDLE_CONNS");
        }
        if self.rate_limit.token_per_second == 0 {
            return invalid("RATE_LIMIT_TOKEN_PER_SECOND");
        }
        if self.rate_limit.token_burst == 0 {
            return invalid("RATE_LIMIT_TOKEN_BURST");
        }
        if self.reminder.concurrency == 0 {
            return invalid("REMINDER_CONCURRENCY");
        }
        if self.reminder.max_attempts < 1 {
            return invalid("REMINDER_MAX_ATTEMPTS");
        }
        if self.reminder.processing_timeout.as_secs() == 0 {
            return invalid("REMINDER_PROCESSING_TIMEOUT");
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let config = load(&[("AUTH_ACTIVE_KID", "main")]).unwrap();

        assert_eq!(config.web.api_host, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.web.read_timeout, Duration::from_secs(5));
        assert_eq!(config.web.shutdown_timeout, Duration::from_secs(20));
        assert_eq!(config.database.path(), PathBuf::from("data/booking.db"));
        assert_eq!(config.auth.issuer, "booking service");
        assert_eq!(config.auth.token_ttl, Duration::from_secs(8 * 3600));
        assert_eq!(config.reminder.processing_timeout, Duration::from_secs(60));
        assert_eq!(config.reminder.max_backoff, Duration::from_secs(3600));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn active_kid_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnv(key)) if key == "BOOKING_AUTH_ACTIVE_KID"));
    }

    #[test]
    fn durations_use_human_readable_units() {
        let config = load(&[
            ("AUTH_ACTIVE_KID", "main"),
            ("WEB_WRITE_TIMEOUT", "1m 30s"),
            ("REMINDER_POLL_INTERVAL", "250ms"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.web.write_timeout, Duration::from_secs(90));
        assert_eq!(config.reminder.poll_interval, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = load(&[("AUTH_ACTIVE_KID", "main"), ("WEB_READ_TIMEOUT", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key) if key == "BOOKING_WEB_READ_TIMEOUT"));

        let err = load(&[("AUTH_ACTIVE_KID", "main"), ("DB_MAX_OPEN_CONNS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key) if key == "BOOKING_DB_MAX_OPEN_CONNS"));
    }

    #[test]
    fn password_is_not_printed() {
        let config = load(&[("AUTH_ACTIVE_KID", "main"), ("DB_PASSWORD", "hunter2")]).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
