use crate::cache::{Expiry, MIN_TTL};
use std::time::Duration;

/// Spreads expirations of entries written together.
///
/// A TTL `t` becomes `t * (1 + U)` with `U` uniform in
/// `[-p/100, +p/100]`, never below [`MIN_TTL`] and never "no expiry".
///
/// # Examples
///
/// ```
/// use tiercache_core::protection::Avalanche;
/// use std::time::Duration;
///
/// let avalanche = Avalanche::new(10);
/// let ttl = avalanche.jitter(Duration::from_secs(60));
/// assert!(ttl >= Duration::from_secs(54) && ttl <= Duration::from_secs(66));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Avalanche {
    jitter_percent: u8,
}

impl Avalanche {
    /// Percentages above 100 are clamped to 100.
    pub fn new(jitter_percent: u8) -> Self {
        Self {
            jitter_percent: jitter_percent.min(100),
        }
    }

    pub fn jitter_percent(&self) -> u8 {
        self.jitter_percent
    }

    pub fn jitter(&self, base: Duration) -> Duration {
        if self.jitter_percent == 0 {
            return base.max(MIN_TTL);
        }
        let spread = f64::from(self.jitter_percent) / 100.0;
        let factor = 1.0 + (fastrand::f64() * 2.0 - 1.0) * spread;
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(base)
            .max(MIN_TTL)
    }

    /// Resolves `ttl` against `default_ttl` and jitters the result. A write
    /// without expiry stays without expiry.
    pub fn apply(&self, ttl: Expiry, default_ttl: Option<Duration>) -> Expiry {
        match ttl.resolve(default_ttl) {
            Some(ttl) => Expiry::After(self.jitter(ttl)),
            None => Expiry::Never,
        }
    }
}
