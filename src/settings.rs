//! Runtime configuration for the HTTP server binary (§6).
//!
//! Mirrors this codebase's existing config philosophy: a plain struct built
//! manually rather than through a TOML/YAML parsing crate, only here the
//! values come from environment variables instead of being constructed
//! directly by the caller, since the server binary has no caller to hand it
//! a struct literal.

/// Server and scheduler tuning, read from the process environment (§6).
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub max_concurrent_runs: usize,
    pub max_concurrent_model_calls: usize,
    pub run_retention_seconds: u64,
}

impl Settings {
    /// Read settings from `HOST`, `PORT`, `DEBUG`, `MAX_CONCURRENT_RUNS`,
    /// `MAX_CONCURRENT_MODEL_CALLS`, `RUN_RETENTION_SECONDS`, falling back to
    /// defaults for anything unset or unparseable (§6).
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT", 8080),
            debug: env_parsed("DEBUG", false),
            max_concurrent_runs: env_parsed("MAX_CONCURRENT_RUNS", 8),
            max_concurrent_model_calls: env_parsed("MAX_CONCURRENT_MODEL_CALLS", 32),
            run_retention_seconds: env_parsed("RUN_RETENTION_SECONDS", 3600),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            debug: false,
            max_concurrent_runs: 8,
            max_concurrent_model_calls: 32,
            run_retention_seconds: 3600,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.max_concurrent_runs, 8);
        assert_eq!(settings.max_concurrent_model_calls, 32);
        assert_eq!(settings.run_retention_seconds, 3600);
        assert!(!settings.debug);
    }

    #[test]
    fn env_parsed_falls_back_on_missing_var() {
        std::env::remove_var("HIERARCHICAL_AGENTS_TEST_UNSET");
        let value: u16 = env_parsed("HIERARCHICAL_AGENTS_TEST_UNSET", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn env_parsed_falls_back_on_unparseable_var() {
        std::env::set_var("HIERARCHICAL_AGENTS_TEST_BAD", "not-a-number");
        let value: u16 = env_parsed("HIERARCHICAL_AGENTS_TEST_BAD", 42);
        assert_eq!(value, 42);
        std::env::remove_var("HIERARCHICAL_AGENTS_TEST_BAD");
    }
}
