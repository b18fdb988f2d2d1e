use std::time::Duration;

use crate::engine::Engine;
use crate::error::EngineError;

/// Number of live connections the pool may hold.
pub const POOL_CAPACITY: u32 = 1;

pub(crate) const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub(crate) const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Options for the engine's connection pool, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub db_path: String,
    /// How long `acquire` waits for the connection before giving up.
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Put new connections in WAL journal mode.
    pub wal: bool,
    /// Enforce foreign keys on every connection.
    pub foreign_keys: bool,
}

impl EngineOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            wal: true,
            foreign_keys: true,
        }
    }

    /// Reject option combinations the pool cannot honour.
    ///
    /// # Errors
    /// Returns `EngineError::ConfigError` for an empty path or a zero duration.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.db_path.trim().is_empty() {
            return Err(EngineError::ConfigError("database path is empty".into()));
        }
        for (name, value) in [
            ("connection_timeout", self.connection_timeout),
            ("idle_timeout", self.idle_timeout),
            ("max_lifetime", self.max_lifetime),
        ] {
            if value.is_zero() {
                return Err(EngineError::ConfigError(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`EngineOptions`].
#[derive(Debug, Clone)]
pub struct EngineOptionsBuilder {
    opts: EngineOptions,
}

impl EngineOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: EngineOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.opts.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.opts.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.opts.max_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn foreign_keys(mut self, enforce: bool) -> Self {
        self.opts.foreign_keys = enforce;
        self
    }

    #[must_use]
    pub fn finish(self) -> EngineOptions {
        self.opts
    }

    /// Build an [`Engine`] from these options.
    ///
    /// # Errors
    /// Returns `EngineError::ConfigError` if the options are invalid.
    pub async fn build(self) -> Result<Engine, EngineError> {
        Engine::with_options(self.finish()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pool_contract() {
        let opts = EngineOptions::new("data.db");
        assert_eq!(opts.connection_timeout, Duration::from_secs(30));
        assert_eq!(opts.idle_timeout, Duration::from_secs(600));
        assert_eq!(opts.max_lifetime, Duration::from_secs(1800));
        assert!(opts.wal);
        assert!(opts.foreign_keys);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let opts = EngineOptionsBuilder::new("data.db")
            .connection_timeout(Duration::ZERO)
            .finish();
        assert!(matches!(opts.validate(), Err(EngineError::ConfigError(_))));

        let opts = EngineOptions::new("  ");
        assert!(matches!(opts.validate(), Err(EngineError::ConfigError(_))));
    }
}
