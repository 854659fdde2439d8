//! Per-rule-type detection checks.
//!
//! Every check compares with tolerance `eps`: a value sitting exactly on a
//! limit (within `eps`) is not a violation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use ccp_core::duration::to_chrono;

use crate::schema::{
    BandParams, Direction, RateOfChangeParams, StagnantParams, ThresholdOperator, ThresholdParams,
};

use super::Signal;

pub(crate) fn threshold(p: &ThresholdParams, value: f64, eps: f64) -> Signal {
    let violated = match p.operator {
        ThresholdOperator::Above => value > p.limit + eps,
        ThresholdOperator::Below => value < p.limit - eps,
    };
    Signal::from_violated(violated)
}

pub(crate) fn band(p: &BandParams, value: f64, eps: f64) -> Signal {
    let below = p.low.is_some_and(|low| value < low - eps);
    let above = p.high.is_some_and(|high| value > high + eps);
    Signal::from_violated(below || above)
}

/// Least-squares slope over the points in `[now - window, now]`, in units
/// per `p.per`.
pub(crate) fn rate_of_change(
    p: &RateOfChangeParams,
    history: &VecDeque<(DateTime<Utc>, f64)>,
    now: DateTime<Utc>,
    eps: f64,
) -> Signal {
    let start = now
        .checked_sub_signed(to_chrono(p.window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let points: Vec<(DateTime<Utc>, f64)> = history
        .iter()
        .copied()
        .filter(|(t, _)| *t >= start && *t <= now)
        .collect();
    let Some(slope) = slope_per_second(&points) else {
        return Signal::Indeterminate;
    };
    let rate = slope * p.per.as_secs_f64();
    let limit = p.max_rate + eps;
    let violated = match p.direction {
        Direction::Rising => rate > limit,
        Direction::Falling => rate < -limit,
        Direction::Either => rate.abs() > limit,
    };
    Signal::from_violated(violated)
}

fn slope_per_second(points: &[(DateTime<Utc>, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let t0 = points[0].0;
    let xs: Vec<f64> = points
        .iter()
        .map(|(t, _)| (*t - t0).num_milliseconds() as f64 / 1000.0)
        .collect();
    let n = points.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, v)| v).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, (_, y)) in xs.iter().zip(points) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

/// Frozen-meter check: the current flat run, which began at `since`,
/// reaches back at least `span` from `now`. Short history is Clear.
pub(crate) fn stagnant(p: &StagnantParams, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Signal {
    let (Some(since), Some(cutoff)) = (since, now.checked_sub_signed(to_chrono(p.span))) else {
        return Signal::Clear;
    };
    Signal::from_violated(since <= cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::window::FlatRun;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 24, 0, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    fn series(values: &[f64]) -> VecDeque<(DateTime<Utc>, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (at(i as i64), *v))
            .collect()
    }

    #[test]
    fn threshold_respects_epsilon() {
        let above = ThresholdParams { operator: ThresholdOperator::Above, limit: 0.3 };
        assert_eq!(threshold(&above, 0.3, 1e-9), Signal::Clear);
        assert_eq!(threshold(&above, 0.3000000001, 1e-6), Signal::Clear);
        assert_eq!(threshold(&above, 0.31, 1e-6), Signal::Violation);

        let below = ThresholdParams { operator: ThresholdOperator::Below, limit: 2.0 };
        assert_eq!(threshold(&below, 1.9, 0.0), Signal::Violation);
        assert_eq!(threshold(&below, 2.0, 0.0), Signal::Clear);
    }

    #[test]
    fn band_with_open_sides() {
        let both = BandParams { low: Some(6.5), high: Some(8.5) };
        assert_eq!(band(&both, 7.0, 0.0), Signal::Clear);
        assert_eq!(band(&both, 6.4, 0.0), Signal::Violation);
        assert_eq!(band(&both, 8.6, 0.0), Signal::Violation);

        let low_only = BandParams { low: Some(1.0), high: None };
        assert_eq!(band(&low_only, 1e6, 0.0), Signal::Clear);
        assert_eq!(band(&low_only, 0.5, 0.0), Signal::Violation);
    }

    fn rate(max_rate: f64, direction: Direction) -> RateOfChangeParams {
        RateOfChangeParams {
            window: Duration::from_secs(5 * 60),
            max_rate,
            per: Duration::from_secs(60),
            direction,
        }
    }

    #[test]
    fn rate_slope_per_minute() {
        // Rises 0.5 per minute.
        let history = series(&[1.0, 1.5, 2.0, 2.5, 3.0]);
        let now = at(4);
        assert_eq!(rate_of_change(&rate(0.4, Direction::Rising), &history, now, 1e-9), Signal::Violation);
        assert_eq!(rate_of_change(&rate(0.5, Direction::Rising), &history, now, 1e-9), Signal::Clear);
        assert_eq!(rate_of_change(&rate(0.4, Direction::Falling), &history, now, 1e-9), Signal::Clear);
        assert_eq!(rate_of_change(&rate(0.4, Direction::Either), &history, now, 1e-9), Signal::Violation);
    }

    #[test]
    fn rate_only_uses_window() {
        // Steep drop long ago, flat inside the last five minutes.
        let history = series(&[100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(rate_of_change(&rate(0.1, Direction::Either), &history, at(7), 1e-9), Signal::Clear);
        assert_eq!(rate_of_change(&rate(0.1, Direction::Falling), &history, at(2), 1e-9), Signal::Violation);
    }

    #[test]
    fn rate_needs_two_points() {
        let history = series(&[1.0]);
        assert_eq!(rate_of_change(&rate(0.1, Direction::Either), &history, at(0), 1e-9), Signal::Indeterminate);
    }

    fn flat_since(values: &[f64], eps: f64) -> Option<DateTime<Utc>> {
        let mut run = FlatRun::new(eps);
        for (t, v) in series(values) {
            run.push(t, v);
        }
        run.since()
    }

    #[test]
    fn stagnant_needs_full_span() {
        let p = StagnantParams { span: Duration::from_secs(3 * 60) };
        assert_eq!(stagnant(&p, flat_since(&[4.2, 4.2, 4.2], 1e-9), at(2)), Signal::Clear);
        assert_eq!(stagnant(&p, flat_since(&[4.2, 4.2, 4.2, 4.2], 1e-9), at(3)), Signal::Violation);

        let moving = [4.2, 4.2, 4.3, 4.2];
        assert_eq!(flat_since(&moving, 1e-9), Some(at(3)));
        assert_eq!(stagnant(&p, flat_since(&moving, 1e-9), at(3)), Signal::Clear);
        assert_eq!(stagnant(&p, flat_since(&moving, 0.2), at(3)), Signal::Violation);
        assert_eq!(stagnant(&p, None, at(3)), Signal::Clear);
    }

    #[test]
    fn flat_run_restarts_after_the_older_extreme() {
        // Everything from 5.0 on stays within 0.5 of it; 3.0 does not.
        assert_eq!(flat_since(&[1.0, 3.0, 5.0, 4.75, 4.875, 4.625], 0.5), Some(at(2)));
        // 2.0 breaks with the low at minute 1, so the run starts at minute 2.
        assert_eq!(flat_since(&[1.5, 1.25, 1.75, 1.625, 2.0], 0.5), Some(at(2)));
        // A new value far from all others leaves a run of one.
        assert_eq!(flat_since(&[1.0, 1.0, 1.0, 9.0], 0.5), Some(at(3)));
    }

    #[test]
    fn huge_windows_never_reach_back() {
        let p = StagnantParams { span: Duration::from_secs(u64::MAX / 4) };
        assert_eq!(stagnant(&p, Some(at(0)), at(10)), Signal::Clear);

        let wide = RateOfChangeParams { window: Duration::from_secs(u64::MAX / 4), ..rate(0.4, Direction::Rising) };
        let history = series(&[1.0, 1.5, 2.0]);
        assert_eq!(rate_of_change(&wide, &history, at(2), 1e-9), Signal::Violation);
    }
}
