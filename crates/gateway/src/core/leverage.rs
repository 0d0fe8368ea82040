//! Advisory leverage band. Copy-only — rendered into the notification and
//! never consulted by any gate.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{LeverageConfig, RiskProfile};
use crate::types::{Lean, LeverageBand, LevelsRecord};

/// Compute the advisory band for a winning candidate.
///
/// `base = floor(risk_budget_pct / distance_to_invalidation_pct)` with the
/// invalidation level at the 1h low (long) or high (short), scaled down by
/// two-tier multipliers for positioning instability and funding magnitude,
/// capped by the profile. Returns `None` when the distance is degenerate or
/// the adjusted leverage rounds to zero.
#[must_use]
pub fn advisory_band(
    price: Decimal,
    bias: Lean,
    levels_1h: &LevelsRecord,
    oi_5m: Option<Decimal>,
    oi_15m: Option<Decimal>,
    funding: Option<Decimal>,
    profile: &RiskProfile,
    cfg: &LeverageConfig,
) -> Option<LeverageBand> {
    if price <= Decimal::ZERO {
        return None;
    }

    let invalidation = match bias {
        Lean::Long => levels_1h.lo?,
        Lean::Short => levels_1h.hi?,
        Lean::Neutral => return None,
    };

    let distance_pct = (price - invalidation).abs() / price * dec!(100);
    if distance_pct <= Decimal::ZERO {
        return None;
    }

    let base = (profile.risk_budget_pct / distance_pct).floor();

    let instability = oi_5m
        .map(|d| d.abs())
        .unwrap_or(Decimal::ZERO)
        .max(oi_15m.map(|d| d.abs()).unwrap_or(Decimal::ZERO));
    let funding_mag = funding.map(|d| d.abs()).unwrap_or(Decimal::ZERO);

    let instability_mult = tier_multiplier(
        instability,
        cfg.instability_soft_pct,
        cfg.instability_hard_pct,
        cfg,
    );
    let funding_mult = tier_multiplier(funding_mag, cfg.funding_soft, cfg.funding_hard, cfg);

    let adjusted = (base * instability_mult * funding_mult).floor();
    let high = adjusted.to_u32()?.min(profile.max_cap);
    if high == 0 {
        return None;
    }

    Some(LeverageBand {
        low: (high / 2).max(1),
        high,
    })
}

/// Two-tier scale-down: 1.0 below soft, then the soft / hard multipliers.
fn tier_multiplier(value: Decimal, soft: Decimal, hard: Decimal, cfg: &LeverageConfig) -> Decimal {
    if value >= hard {
        cfg.hard_multiplier
    } else if value >= soft {
        cfg.soft_multiplier
    } else {
        Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> LeverageConfig {
        serde_json::from_str(
            r#"{
                "profiles": {
                    "standard": { "risk_budget_pct": "10.0", "max_cap": 10 }
                },
                "instability_soft_pct": "1.0",
                "instability_hard_pct": "2.5",
                "funding_soft": "0.0005",
                "funding_hard": "0.001",
                "soft_multiplier": "0.75",
                "hard_multiplier": "0.6"
            }"#,
        )
        .unwrap()
    }

    fn levels(hi: Decimal, lo: Decimal) -> LevelsRecord {
        LevelsRecord {
            warmup: false,
            hi: Some(hi),
            lo: Some(lo),
            mid: Some((hi + lo) / dec!(2)),
        }
    }

    #[test]
    fn test_base_from_distance_to_invalidation() {
        let cfg = test_cfg();
        let profile = &cfg.profiles["standard"];
        // Long at 2000 with 1h.lo 1960: distance 2%, base = floor(10/2) = 5.
        let band = advisory_band(
            dec!(2000),
            Lean::Long,
            &levels(dec!(2050), dec!(1960)),
            Some(dec!(0.2)),
            Some(dec!(0.3)),
            Some(dec!(0.0001)),
            profile,
            &cfg,
        )
        .unwrap();
        assert_eq!(band.high, 5);
        assert_eq!(band.low, 2);
    }

    #[test]
    fn test_instability_and_funding_scale_down() {
        let cfg = test_cfg();
        let profile = &cfg.profiles["standard"];
        // Soft instability tier: 5 * 0.75 = 3.75 → 3.
        let band = advisory_band(
            dec!(2000),
            Lean::Long,
            &levels(dec!(2050), dec!(1960)),
            Some(dec!(1.2)),
            Some(dec!(0.3)),
            None,
            profile,
            &cfg,
        )
        .unwrap();
        assert_eq!(band.high, 3);

        // Hard funding tier stacks: 5 * 0.75 * 0.6 = 2.25 → 2.
        let band = advisory_band(
            dec!(2000),
            Lean::Long,
            &levels(dec!(2050), dec!(1960)),
            Some(dec!(1.2)),
            None,
            Some(dec!(0.002)),
            profile,
            &cfg,
        )
        .unwrap();
        assert_eq!(band.high, 2);
        assert_eq!(band.low, 1);
    }

    #[test]
    fn test_cap_applies() {
        let cfg = test_cfg();
        let profile = &cfg.profiles["standard"];
        // Tight invalidation: distance 0.5% → base 20, capped at 10.
        let band = advisory_band(
            dec!(2000),
            Lean::Long,
            &levels(dec!(2050), dec!(1990)),
            None,
            None,
            None,
            profile,
            &cfg,
        )
        .unwrap();
        assert_eq!(band.high, 10);
        assert_eq!(band.low, 5);
    }

    #[test]
    fn test_short_uses_high_invalidation() {
        let cfg = test_cfg();
        let profile = &cfg.profiles["standard"];
        // Short at 2000 with 1h.hi 2040: distance 2% → 5.
        let band = advisory_band(
            dec!(2000),
            Lean::Short,
            &levels(dec!(2040), dec!(1900)),
            None,
            None,
            None,
            profile,
            &cfg,
        )
        .unwrap();
        assert_eq!(band.high, 5);
    }

    #[test]
    fn test_degenerate_distance_yields_no_band() {
        let cfg = test_cfg();
        let profile = &cfg.profiles["standard"];
        assert!(advisory_band(
            dec!(2000),
            Lean::Long,
            &levels(dec!(2050), dec!(2000)),
            None,
            None,
            None,
            profile,
            &cfg,
        )
        .is_none());

        // Distance so wide the base floors to zero.
        assert!(advisory_band(
            dec!(2000),
            Lean::Long,
            &levels(dec!(2050), dec!(1000)),
            None,
            None,
            None,
            profile,
            &cfg,
        )
        .is_none());
    }
}
