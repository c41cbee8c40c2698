//! # Engine Configuration
//!
//! Store-level settings applied to every session the engine creates.

use serde::{Deserialize, Serialize};
use till_core::{TaxRate, DEFAULT_SESSION_TTL_HOURS};

/// Store-level engine configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = EngineConfig::default()
///     .with_tax_rate(TaxRate::from_bps(825))
///     .with_session_ttl_hours(12);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Flat store-wide tax rate in basis points.
    pub tax_rate_bps: u32,

    /// How long a session may sit before it counts as expired.
    pub session_ttl_hours: i64,
}

impl EngineConfig {
    /// Sets the store-wide tax rate.
    pub fn with_tax_rate(mut self, rate: TaxRate) -> Self {
        self.tax_rate_bps = rate.bps();
        self
    }

    /// Sets the session time-to-live in hours.
    pub fn with_session_ttl_hours(mut self, hours: i64) -> Self {
        self.session_ttl_hours = hours;
        self
    }

    /// The tax rate as a typed value.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tax_rate_bps: 0,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tax_rate_bps, 0);
        assert_eq!(config.session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_tax_rate(TaxRate::from_bps(825))
            .with_session_ttl_hours(12);
        assert_eq!(config.tax_rate().bps(), 825);
        assert_eq!(config.session_ttl_hours, 12);
    }
}
