//! Pure scoring math: the bounded signal transform and longitudinal
//! decay.
//!
//! `soft_score` is the one place where risk is tuned numerically. It is
//! bounded, monotone, and saturating so operators can add or remove
//! signals without re-calibrating global thresholds. Keep it pure and
//! table-tested.

use chrono::{DateTime, Utc};

use super::{MatchRisk, RiskState};

/// Longitudinal scoring parameters. Values are server-controlled.
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    /// Multiplicative decay applied per elapsed hour, in `(0, 1]`.
    pub decay_factor: f64,
    /// Upper bound on accumulated risk.
    pub risk_cap: f64,
}

/// Turns an unbounded "how bad is this" number into a bounded
/// contribution in `[0, cap)`.
///
/// Zero is normal; positive means suspicious. The saturating curve
/// `cap · (1 − e^{−x})` avoids crisp thresholds.
#[must_use]
pub fn soft_score(x: f64, cap: f64) -> f64 {
    if cap <= 0.0 || x <= 0.0 {
        return 0.0;
    }
    cap * (1.0 - (-x).exp())
}

/// `(v − mean) / std`, with non-positive `std` zeroing the signal.
#[must_use]
pub fn z_score(v: f64, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return 0.0;
    }
    (v - mean) / std
}

/// Folds one match's risk into the longitudinal state with exponential
/// decay.
///
/// Prior risk decays by `decay_factor^elapsed_hours` (elapsed clamped at
/// zero so a skewed clock never amplifies), the match value is added,
/// and the result is clamped to `[0, risk_cap]`.
#[must_use]
pub fn apply_match_risk(
    prev: &RiskState,
    incoming: &MatchRisk,
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
) -> RiskState {
    let elapsed_ms = (now - prev.last_update).num_milliseconds();
    #[allow(clippy::cast_precision_loss)]
    let elapsed_hours = (elapsed_ms.max(0) as f64) / 3_600_000.0;

    let decay = cfg.decay_factor.powf(elapsed_hours);
    let next = (prev.total_risk * decay + incoming.value).clamp(0.0, cfg.risk_cap);

    RiskState {
        player_id: prev.player_id.clone(),
        total_risk: next,
        last_update: now,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn soft_score_table() {
        // (x, cap, expected)
        let cases = [
            (0.0, 1.0, 0.0),
            (-1.0, 1.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, -2.0, 0.0),
            (2.0, 1.0, 1.0 - (-2.0f64).exp()),
            (1.0, 5.0, 5.0 * (1.0 - (-1.0f64).exp())),
        ];
        for (x, cap, want) in cases {
            assert!(
                (soft_score(x, cap) - want).abs() < EPS,
                "soft_score({x}, {cap})"
            );
        }
    }

    #[test]
    fn soft_score_is_monotone_and_below_cap() {
        let cap = 3.0;
        let mut prev = 0.0;
        for i in 1..100 {
            let x = f64::from(i) * 0.25;
            let s = soft_score(x, cap);
            assert!(s > prev, "not strictly monotone at x={x}");
            assert!(s < cap, "reached cap at x={x}");
            prev = s;
        }
    }

    #[test]
    fn z_score_guardrails() {
        assert!((z_score(10.0, 4.0, 2.0) - 3.0).abs() < EPS);
        assert!(z_score(10.0, 4.0, 0.0).abs() < EPS);
        assert!(z_score(10.0, 4.0, -1.0).abs() < EPS);
    }

    #[test]
    fn one_hour_halves_at_decay_half() {
        let now = Utc::now();
        let prev = RiskState {
            player_id: "P1".to_string(),
            total_risk: 5.0,
            last_update: now - TimeDelta::hours(1),
        };
        let zero_match = MatchRisk {
            player_id: "P1".to_string(),
            value: 0.0,
            at: now,
        };
        let cfg = ScoringConfig {
            decay_factor: 0.5,
            risk_cap: 10.0,
        };

        let next = apply_match_risk(&prev, &zero_match, &cfg, now);
        assert!((next.total_risk - 2.5).abs() < EPS);
        assert_eq!(next.last_update, now);
    }

    #[test]
    fn negative_elapsed_never_amplifies() {
        let now = Utc::now();
        let prev = RiskState {
            player_id: "P1".to_string(),
            total_risk: 4.0,
            last_update: now + TimeDelta::hours(2),
        };
        let incoming = MatchRisk {
            player_id: "P1".to_string(),
            value: 1.0,
            at: now,
        };
        let cfg = ScoringConfig {
            decay_factor: 0.5,
            risk_cap: 10.0,
        };

        // decay_factor^0 == 1: prior carried through untouched.
        let next = apply_match_risk(&prev, &incoming, &cfg, now);
        assert!((next.total_risk - 5.0).abs() < EPS);
    }

    #[test]
    fn total_risk_clamps_to_cap_and_floor() {
        let now = Utc::now();
        let prev = RiskState::zero("P1", now);
        let cfg = ScoringConfig {
            decay_factor: 1.0,
            risk_cap: 10.0,
        };

        let big = MatchRisk {
            player_id: "P1".to_string(),
            value: 1_000.0,
            at: now,
        };
        assert!((apply_match_risk(&prev, &big, &cfg, now).total_risk - 10.0).abs() < EPS);

        let negative = MatchRisk {
            player_id: "P1".to_string(),
            value: -3.0,
            at: now,
        };
        assert!(apply_match_risk(&prev, &negative, &cfg, now).total_risk.abs() < EPS);
    }
}
