//! Runtime environment detection.
//!
//! `MATE_ENV` selects where configuration lives and how chatty the default
//! log filter is:
//!
//! - `test` - config is kept under the repo's `tmp/mate-test`
//! - `development` or `dev` - default log filter is `debug`
//! - anything else or unset - production

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - repo-local config directory.
    Test,
}

impl Environment {
    /// Detect current environment from `MATE_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::from_value(std::env::var("MATE_ENV").ok().as_deref())
    }

    /// Map a raw `MATE_ENV` value onto an environment.
    #[must_use]
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` for the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Returns `true` for the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Test => "info",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience check for `MATE_ENV=test`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}
