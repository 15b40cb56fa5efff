use serde::Serialize;

use synth_common::{Decimal, SynthError, SynthResult};

/// Inverse pricing parameters for an inverse synth.
///
/// The stored rate is `2 * entry_point - feed_rate`, clamped into
/// `[lower_limit, upper_limit]`. Reaching either limit freezes the rate there
/// until the pricing is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InversePricing {
    pub entry_point: Decimal,
    pub upper_limit: Decimal,
    pub lower_limit: Decimal,
    /// Limit the rate is frozen at, if any.
    pub frozen_at: Option<Decimal>,
}

impl InversePricing {
    pub fn new(entry_point: Decimal, upper_limit: Decimal, lower_limit: Decimal) -> SynthResult<Self> {
        if lower_limit.is_zero() {
            return Err(SynthError::Validation(
                "inverse lower limit must be above zero".to_string(),
            ));
        }
        if !(lower_limit < entry_point && entry_point < upper_limit) {
            return Err(SynthError::Validation(format!(
                "inverse limits must satisfy lower < entry < upper (got {} < {} < {})",
                lower_limit, entry_point, upper_limit
            )));
        }
        if upper_limit >= entry_point.saturating_add(entry_point) {
            return Err(SynthError::Validation(format!(
                "inverse upper limit {} must be below twice the entry point {}",
                upper_limit, entry_point
            )));
        }
        Ok(Self {
            entry_point,
            upper_limit,
            lower_limit,
            frozen_at: None,
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_at.is_some()
    }

    /// Invert a feed rate. Returns the rate to store and whether this call froze the pricing.
    pub fn invert(&mut self, feed_rate: Decimal) -> (Decimal, bool) {
        if let Some(frozen) = self.frozen_at {
            return (frozen, false);
        }

        let inverted = self
            .entry_point
            .saturating_add(self.entry_point)
            .saturating_sub(feed_rate);

        if inverted >= self.upper_limit {
            self.frozen_at = Some(self.upper_limit);
            (self.upper_limit, true)
        } else if inverted <= self.lower_limit {
            self.frozen_at = Some(self.lower_limit);
            (self.lower_limit, true)
        } else {
            (inverted, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> InversePricing {
        InversePricing::new(
            Decimal::from_int(100),
            Decimal::from_int(150),
            Decimal::from_int(50),
        )
        .unwrap()
    }

    #[test]
    fn test_invert_inside_limits() {
        let mut p = pricing();
        assert_eq!(p.invert(Decimal::from_int(80)), (Decimal::from_int(120), false));
        assert_eq!(p.invert(Decimal::from_int(100)), (Decimal::from_int(100), false));
        assert!(!p.is_frozen());
    }

    #[test]
    fn test_freezes_at_upper_limit() {
        let mut p = pricing();
        assert_eq!(p.invert(Decimal::from_int(40)), (Decimal::from_int(150), true));
        // Once frozen, feed moves are ignored
        assert_eq!(p.invert(Decimal::from_int(100)), (Decimal::from_int(150), false));
        assert_eq!(p.frozen_at, Some(Decimal::from_int(150)));
    }

    #[test]
    fn test_freezes_at_lower_limit_even_when_inversion_goes_negative() {
        let mut p = pricing();
        assert_eq!(p.invert(Decimal::from_int(500)), (Decimal::from_int(50), true));
    }

    #[test]
    fn test_rejects_bad_limits() {
        let d = Decimal::from_int;
        assert!(InversePricing::new(d(100), d(90), d(50)).is_err());
        assert!(InversePricing::new(d(100), d(150), Decimal::ZERO).is_err());
        assert!(InversePricing::new(d(100), d(200), d(50)).is_err());
    }
}
