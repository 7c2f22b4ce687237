//! Cache parameter configuration
//!
//! Per-repository cache settings derived from the shared `CacheConfig`.

use crate::errors::CacheError;
use config::CacheConfig;
use std::time::Duration;

/// Entry lifetime and key namespace used by one cached repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheParams {
    /// Lifetime of every entry written through this repository
    pub ttl: Duration,
    /// Leading key segment shared by all entries
    pub prefix: String,
}

impl CacheParams {
    pub fn new(ttl: Duration, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let params = Self {
            ttl,
            prefix: prefix.into(),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(config.ttl_duration(), config.key_prefix.clone())
    }

    /// Same prefix with a different entry lifetime
    pub fn with_ttl(&self, ttl: Duration) -> Result<Self, CacheError> {
        Self::new(ttl, self.prefix.clone())
    }

    fn validate(&self) -> Result<(), CacheError> {
        if self.ttl.is_zero() {
            return Err(CacheError::InvalidTtl(self.ttl));
        }
        if self.prefix.is_empty() || self.prefix.ends_with('.') {
            return Err(CacheError::InvalidKey(format!(
                "invalid key prefix '{}'",
                self.prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let params = CacheParams::from_config(&CacheConfig::default()).unwrap();
        assert_eq!(params.ttl, Duration::from_secs(300));
        assert_eq!(params.prefix, "cachehaus");
    }

    #[test]
    fn test_rejects_zero_ttl_and_bad_prefix() {
        assert!(matches!(
            CacheParams::new(Duration::ZERO, "app"),
            Err(CacheError::InvalidTtl(_))
        ));
        assert!(matches!(
            CacheParams::new(Duration::from_secs(1), ""),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            CacheParams::new(Duration::from_secs(1), "app."),
            Err(CacheError::InvalidKey(_))
        ));
    }
}
