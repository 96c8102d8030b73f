use tracing::Level;

/// Configuration for a [`Db`](crate::Db).
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Prepared statement cache configuration.
    pub statement_cache: StatementCacheConfig,
    /// How executed SQL is logged.
    pub sql_log: SqlLogConfig,
    /// Warn when updating a record that was never `clean()`ed.
    pub warn_unsanitary_updates: bool,
}

/// Prepared statement cache configuration.
#[derive(Debug, Clone)]
pub struct StatementCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

/// SQL statement logging configuration.
#[derive(Debug, Clone)]
pub struct SqlLogConfig {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes, on a char boundary). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            statement_cache: StatementCacheConfig::default(),
            sql_log: SqlLogConfig::default(),
            warn_unsanitary_updates: true,
        }
    }
}

impl Default for StatementCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 64,
        }
    }
}

impl Default for SqlLogConfig {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl DbConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable prepared statement caching with the given capacity.
    pub fn statement_cache(mut self, cap: usize) -> Self {
        self.statement_cache = StatementCacheConfig {
            enabled: cap > 0,
            capacity: cap,
        };
        self
    }

    /// Disable prepared statement caching; every prepared call re-prepares.
    pub fn no_statement_cache(mut self) -> Self {
        self.statement_cache.enabled = false;
        self
    }

    /// Replace the SQL logging configuration.
    pub fn sql_log(mut self, sql_log: SqlLogConfig) -> Self {
        self.sql_log = sql_log;
        self
    }

    /// Toggle the warning emitted by `Record::update` on records that skipped `clean()`.
    pub fn warn_unsanitary_updates(mut self, warn: bool) -> Self {
        self.warn_unsanitary_updates = warn;
        self
    }
}

impl SqlLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }
}
