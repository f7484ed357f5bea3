use std::path::PathBuf;

use crate::resolve::DEFAULT_BASE_URL;

/// Environment override for the cache directory location.
pub const CACHE_DIR_ENV: &str = "CITIBIKE_CACHE_DIR";
/// Environment override for the worker cap.
pub const MAX_CONCURRENCY_ENV: &str = "CITIBIKE_MAX_CONCURRENCY";

/// Run configuration, threaded explicitly through construction rather than
/// read from process-wide state.
#[derive(Clone, Debug)]
pub struct Config {
    /// Where downloaded archives live, one file per descriptor.
    pub cache_dir: PathBuf,
    /// Remote bucket the archives are published under.
    pub base_url: String,
    /// Cap on concurrent downloads and concurrent extraction passes.
    pub max_concurrency: usize,
}

impl Config {
    /// Defaults plus the `CITIBIKE_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
            cfg.cache_dir = PathBuf::from(dir);
        }
        if let Ok(n) = std::env::var(MAX_CONCURRENCY_ENV)
            && let Ok(n) = n.parse::<usize>()
        {
            cfg.max_concurrency = n.max(1);
        }
        cfg
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = home::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("citibike-sampler")
            .join("source_data");
        let max_concurrency = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(2).max(1))
            .unwrap_or(1);
        Self {
            cache_dir,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_dir_under_home() {
        let cfg = Config::default();
        assert!(cfg.cache_dir.ends_with("citibike-sampler/source_data"));
        assert!(cfg.max_concurrency >= 1);
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = Config::default()
            .with_cache_dir("/tmp/cbk")
            .with_max_concurrency(0);
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/cbk"));
        assert_eq!(cfg.max_concurrency, 1);
    }
}
