//! Trend analysis
//!
//! With seven or more samples a metric gets triple exponential smoothing
//! (Holt-Winters, additive; plain Holt when there are not enough samples
//! for a full season pair). With two to six samples a least-squares linear
//! fit is used. Fewer than two samples means no forecast at all.

/// Minimum samples for the smoothing path.
pub const MIN_SAMPLES_SMOOTHING: usize = 7;
/// Minimum samples for any forecast.
pub const MIN_SAMPLES_LINEAR: usize = 2;

const ALPHA: f64 = 0.5;
const BETA: f64 = 0.3;
const GAMMA: f64 = 0.2;
/// Season length in samples for seasonality-capable metrics.
const SEASON: usize = 24;
const MAX_STEPS: usize = 10_000;

/// Outcome of projecting one metric over the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendForecast {
    pub current: f64,
    /// Highest projected value inside the horizon.
    pub projected: f64,
    /// Hours until the threshold is first crossed, when it is.
    pub hours_to_threshold: Option<f64>,
}

/// Project `samples` of `(unix_ts, value)` over `horizon_hours` and report
/// when `threshold` is crossed. Returns `None` below two samples.
pub fn forecast(samples: &[(i64, f64)], horizon_hours: f64, threshold: f64) -> Option<TrendForecast> {
    if samples.len() < MIN_SAMPLES_LINEAR || horizon_hours <= 0.0 {
        return None;
    }

    let current = samples.last().map(|(_, v)| *v)?;
    if current >= threshold {
        return Some(TrendForecast {
            current,
            projected: current,
            hours_to_threshold: Some(0.0),
        });
    }

    let step_secs = average_interval(samples);
    let steps = ((horizon_hours * 3600.0 / step_secs).ceil() as usize)
        .clamp(1, MAX_STEPS);

    let path = if samples.len() >= MIN_SAMPLES_SMOOTHING {
        smoothed_path(samples, steps)
    } else {
        linear_path(samples, step_secs, steps)
    };

    let mut projected = current;
    let mut hours_to_threshold = None;
    for (i, value) in path.iter().enumerate() {
        let value = value.max(0.0);
        if value > projected {
            projected = value;
        }
        if hours_to_threshold.is_none() && value >= threshold {
            hours_to_threshold = Some((i + 1) as f64 * step_secs / 3600.0);
        }
    }

    Some(TrendForecast {
        current,
        projected,
        hours_to_threshold,
    })
}

fn average_interval(samples: &[(i64, f64)]) -> f64 {
    let first = samples.first().map(|(t, _)| *t).unwrap_or(0);
    let last = samples.last().map(|(t, _)| *t).unwrap_or(0);
    let span = (last - first) as f64;
    if span <= 0.0 || samples.len() < 2 {
        return 3600.0;
    }
    (span / (samples.len() - 1) as f64).max(1.0)
}

/// Least-squares fit, projected forward step by step.
fn linear_path(samples: &[(i64, f64)], step_secs: f64, steps: usize) -> Vec<f64> {
    let slope = linear_slope(samples);
    let last = samples.last().map(|(_, v)| *v).unwrap_or(0.0);
    (1..=steps)
        .map(|i| last + slope * step_secs * i as f64)
        .collect()
}

/// Slope in value units per second.
pub fn linear_slope(samples: &[(i64, f64)]) -> f64 {
    let n = samples.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let t0 = samples.first().map(|(t, _)| *t).unwrap_or(0) as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (ts, value) in samples {
        let x = *ts as f64 - t0;
        sum_x += x;
        sum_y += value;
        sum_xy += x * value;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Triple exponential smoothing forecast path. Falls back to double
/// smoothing (no seasonal term) when fewer than two full seasons exist.
fn smoothed_path(samples: &[(i64, f64)], steps: usize) -> Vec<f64> {
    let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    if values.len() >= 2 * SEASON {
        holt_winters(&values, SEASON, steps)
    } else {
        holt(&values, steps)
    }
}

/// Holt's double exponential smoothing (level + trend).
fn holt(values: &[f64], steps: usize) -> Vec<f64> {
    let mut level = values[0];
    let mut trend = values[1] - values[0];

    for &value in &values[1..] {
        let prev_level = level;
        level = ALPHA * value + (1.0 - ALPHA) * (level + trend);
        trend = BETA * (level - prev_level) + (1.0 - BETA) * trend;
    }

    (1..=steps).map(|h| level + trend * h as f64).collect()
}

/// Additive Holt-Winters with a fixed season length.
fn holt_winters(values: &[f64], season: usize, steps: usize) -> Vec<f64> {
    let first_season: f64 = values[..season].iter().sum::<f64>() / season as f64;
    let second_season: f64 = values[season..2 * season].iter().sum::<f64>() / season as f64;

    let mut level = first_season;
    let mut trend = (second_season - first_season) / season as f64;
    let mut seasonal: Vec<f64> = values[..season].iter().map(|v| v - first_season).collect();

    for (t, &value) in values.iter().enumerate() {
        let s = t % season;
        let prev_level = level;
        level = ALPHA * (value - seasonal[s]) + (1.0 - ALPHA) * (level + trend);
        trend = BETA * (level - prev_level) + (1.0 - BETA) * trend;
        seasonal[s] = GAMMA * (value - level) + (1.0 - GAMMA) * seasonal[s];
    }

    let n = values.len();
    (1..=steps)
        .map(|h| level + trend * h as f64 + seasonal[(n + h - 1) % season])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(start: f64, step: f64, count: usize) -> Vec<(i64, f64)> {
        (0..count)
            .map(|i| (i as i64 * 3600, start + step * i as f64))
            .collect()
    }

    #[test]
    fn fewer_than_two_samples_yields_none() {
        assert!(forecast(&[], 48.0, 90.0).is_none());
        assert!(forecast(&[(0, 50.0)], 48.0, 90.0).is_none());
    }

    #[test]
    fn current_over_threshold_reports_immediately() {
        let samples = vec![(0, 91.0), (3600, 93.0)];
        let result = forecast(&samples, 48.0, 90.0).unwrap();
        assert_eq!(result.hours_to_threshold, Some(0.0));
        assert_eq!(result.current, 93.0);
    }

    #[test]
    fn linear_growth_crosses_threshold_within_horizon() {
        // 50% growing 1%/hour: hits 90% after ~40 hours
        let samples = series(46.0, 1.0, 5);
        let result = forecast(&samples, 48.0, 90.0).unwrap();
        assert_eq!(result.current, 50.0);
        let hours = result.hours_to_threshold.expect("crossing expected");
        assert!((hours - 40.0).abs() < 1.5, "got {hours}");
        assert!(result.projected >= 90.0);
    }

    #[test]
    fn flat_series_never_crosses() {
        let samples = series(50.0, 0.0, 6);
        let result = forecast(&samples, 48.0, 90.0).unwrap();
        assert!(result.hours_to_threshold.is_none());
        assert!((result.projected - 50.0).abs() < 1e-9);
    }

    #[test]
    fn declining_series_projects_nonnegative() {
        let samples = series(80.0, -30.0, 4);
        let result = forecast(&samples, 48.0, 90.0).unwrap();
        assert!(result.hours_to_threshold.is_none());
        assert!(result.projected >= 0.0);
    }

    #[test]
    fn smoothing_path_tracks_steady_growth() {
        // 12 samples >= MIN_SAMPLES_SMOOTHING: Holt path
        let samples = series(40.0, 2.0, 12);
        let result = forecast(&samples, 24.0, 90.0).unwrap();
        assert_eq!(result.current, 62.0);
        let hours = result.hours_to_threshold.expect("growth should cross");
        assert!(hours > 0.0 && hours <= 24.0, "got {hours}");
    }

    #[test]
    fn seasonal_series_uses_full_holt_winters() {
        // Two full seasons of a daily sine-ish pattern plus slow growth
        let samples: Vec<(i64, f64)> = (0..48)
            .map(|i| {
                let seasonal = if i % 24 < 12 { 5.0 } else { -5.0 };
                (i as i64 * 3600, 50.0 + 0.2 * i as f64 + seasonal)
            })
            .collect();
        let result = forecast(&samples, 48.0, 90.0).unwrap();
        // Slow growth from ~60: should not cross 90 within 48h
        assert!(result.hours_to_threshold.is_none(), "{result:?}");
    }

    #[test]
    fn linear_slope_matches_known_fit() {
        let samples = series(0.0, 10.0, 5);
        let per_hour = linear_slope(&samples) * 3600.0;
        assert!((per_hour - 10.0).abs() < 1e-9);
    }
}
