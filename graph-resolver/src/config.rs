//! Resolver configuration management

use std::env;

use anyhow::{Context, Result};

/// Page size used when a paginated field is requested without `first`
pub const DEFAULT_PAGE_SIZE: u64 = 25;

/// Upper bound for `first` on any paginated field
pub const MAX_PAGE_SIZE: u64 = 100;

/// Resolver configuration, shared read-only by every resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Page size when `first` is omitted
    pub default_page_size: u64,

    /// Largest page a caller may request
    pub max_page_size: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let max_page_size = match env::var("GRAPH_RESOLVER_MAX_PAGE_SIZE") {
            Ok(v) => v
                .parse()
                .context("Invalid GRAPH_RESOLVER_MAX_PAGE_SIZE")?,
            Err(_) => MAX_PAGE_SIZE,
        };

        let default_page_size = match env::var("GRAPH_RESOLVER_DEFAULT_PAGE_SIZE") {
            Ok(v) => v
                .parse()
                .context("Invalid GRAPH_RESOLVER_DEFAULT_PAGE_SIZE")?,
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        Ok(Self::new(default_page_size, max_page_size))
    }

    /// Build a config, clamping the default page size to the maximum
    pub fn new(default_page_size: u64, max_page_size: u64) -> Self {
        Self {
            default_page_size: default_page_size.min(max_page_size),
            max_page_size,
        }
    }

    /// Resolve a requested page size against the configured bounds
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_default_is_clamped() {
        let config = ResolverConfig::new(500, 50);
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn test_page_size() {
        let config = ResolverConfig::default();
        assert_eq!(config.page_size(None), 25);
        assert_eq!(config.page_size(Some(10)), 10);
        assert_eq!(config.page_size(Some(1000)), 100); // Capped at max
    }

    // One test owns both variables; the test harness runs tests on parallel threads
    #[test]
    fn test_from_env() {
        const MAX: &str = "GRAPH_RESOLVER_MAX_PAGE_SIZE";
        const DEFAULT: &str = "GRAPH_RESOLVER_DEFAULT_PAGE_SIZE";

        // SAFETY: no other test reads or writes these variables
        unsafe {
            env::remove_var(MAX);
            env::remove_var(DEFAULT);
        }
        assert_eq!(ResolverConfig::from_env().unwrap(), ResolverConfig::default());

        unsafe {
            env::set_var(MAX, "40");
            env::set_var(DEFAULT, "60");
        }
        let config = ResolverConfig::from_env().unwrap();
        assert_eq!(config.max_page_size, 40);
        assert_eq!(config.default_page_size, 40);

        unsafe { env::set_var(DEFAULT, "10") };
        assert_eq!(ResolverConfig::from_env().unwrap(), ResolverConfig::new(10, 40));

        unsafe { env::set_var(MAX, "lots") };
        let err = ResolverConfig::from_env().unwrap_err();
        assert!(err.to_string().contains(MAX));

        unsafe {
            env::set_var(MAX, "40");
            env::set_var(DEFAULT, "-1");
        }
        assert!(ResolverConfig::from_env().is_err());

        unsafe {
            env::remove_var(MAX);
            env::remove_var(DEFAULT);
        }
    }
}
