//! Post-run stability analysis
//!
//! Stability of a metric is `max(0, 1 - variance / mean²)`, i.e. one minus
//! the squared coefficient of variation, clamped to `[0, 1]`.

use stresskit_core::{MetricSample, StabilityAnalysis};

/// Samples at each end of the run compared for degradation.
pub const DEGRADATION_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct StabilityAnalyzer {
    min_samples: usize,
}

impl Default for StabilityAnalyzer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl StabilityAnalyzer {
    /// `min_samples` below which a run is reported as inconclusive.
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(2),
        }
    }

    pub fn analyze(&self, timeline: &[MetricSample]) -> StabilityAnalysis {
        let response_times: Vec<f64> = timeline.iter().map(|s| s.response_time_ms).collect();
        let throughputs: Vec<f64> = timeline.iter().map(|s| s.throughput).collect();
        let memory: Vec<f64> = timeline.iter().map(|s| s.memory_usage).collect();

        let response_time_stability = stability_score(&response_times);
        let throughput_stability = stability_score(&throughputs);
        let memory_stability = stability_score(&memory);

        StabilityAnalysis {
            overall_stability: (response_time_stability + throughput_stability + memory_stability)
                / 3.0,
            response_time_stability,
            throughput_stability,
            memory_stability,
            performance_degradation: degradation_ratio(&response_times, DEGRADATION_WINDOW),
            sample_count: timeline.len(),
            conclusive: timeline.len() >= self.min_samples,
        }
    }
}

/// Inverted squared coefficient of variation, in `[0, 1]`.
///
/// Fewer than two values count as perfectly stable.
pub fn stability_score(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 1.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    if mean == 0.0 {
        return if variance == 0.0 { 1.0 } else { 0.0 };
    }

    let score = 1.0 - variance / (mean * mean);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Mean of the trailing window divided by the mean of the leading window.
pub fn degradation_ratio(values: &[f64], window: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return 1.0;
    }

    let window = window.min(values.len());
    let mean = |slice: &[f64]| slice.iter().sum::<f64>() / slice.len() as f64;
    let leading = mean(&values[..window]);
    let trailing = mean(&values[values.len() - window..]);

    if leading == 0.0 {
        return 1.0;
    }
    trailing / leading
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn samples(response_times: &[f64]) -> Vec<MetricSample> {
        response_times
            .iter()
            .enumerate()
            .map(|(i, rt)| MetricSample {
                elapsed_ms: i as u64 * 1000,
                response_time_ms: *rt,
                throughput: 100.0,
                memory_usage: 0.5,
                ..MetricSample::default()
            })
            .collect()
    }

    #[test]
    fn test_constant_metrics_are_perfectly_stable() {
        let analysis = StabilityAnalyzer::default().analyze(&samples(&[200.0; 30]));
        assert_eq!(analysis.overall_stability, 1.0);
        assert_eq!(analysis.performance_degradation, 1.0);
        assert!(analysis.conclusive);
    }

    #[test]
    fn test_single_sample_is_stable_but_inconclusive() {
        let analysis = StabilityAnalyzer::default().analyze(&samples(&[200.0]));
        assert_eq!(analysis.overall_stability, 1.0);
        assert!(!analysis.conclusive);

        let empty = StabilityAnalyzer::default().analyze(&[]);
        assert_eq!(empty.overall_stability, 1.0);
        assert_eq!(empty.sample_count, 0);
        assert!(!empty.conclusive);
    }

    #[test]
    fn test_variance_lowers_stability() {
        // mean 150, variance 2500 -> 1 - 2500/22500
        let score = stability_score(&[100.0, 200.0]);
        assert!((score - (1.0 - 2500.0 / 22500.0)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_mean_edge_cases() {
        assert_eq!(stability_score(&[0.0, 0.0, 0.0]), 1.0);
        assert_eq!(stability_score(&[-1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_degradation_ratio_compares_windows() {
        let mut values = vec![100.0; 10];
        values.extend(vec![300.0; 10]);
        assert_eq!(degradation_ratio(&values, DEGRADATION_WINDOW), 3.0);
        assert_eq!(degradation_ratio(&[0.0, 5.0], DEGRADATION_WINDOW), 1.0);
    }

    proptest! {
        #[test]
        fn prop_stability_scores_within_unit_interval(
            values in prop::collection::vec(0.0f64..1e6, 0..200),
        ) {
            let timeline = samples(&values);
            let analysis = StabilityAnalyzer::default().analyze(&timeline);
            for score in [
                analysis.overall_stability,
                analysis.response_time_stability,
                analysis.throughput_stability,
                analysis.memory_stability,
            ] {
                prop_assert!((0.0..=1.0).contains(&score));
            }
        }
    }
}
