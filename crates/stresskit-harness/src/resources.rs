//! Resource usage summary over a run's time series

use stresskit_core::{ResourceTrend, ResourceUsageAnalysis};

use crate::timeseries::TimeSeries;

/// Peak / average / growth for memory and cpu.
///
/// Growth is the naive slope `(last - first) / count` over every sample
/// recorded in the run, not a regression.
pub fn analyze_resources(series: &TimeSeries) -> ResourceUsageAnalysis {
    let peaks = series.peaks();
    let averages = series.averages();
    let count = series.total_recorded();

    let growth = |first: f64, last: f64| {
        if count == 0 {
            0.0
        } else {
            (last - first) / count as f64
        }
    };

    let (memory_growth, cpu_growth) = match (series.first_recorded(), series.latest()) {
        (Some(first), Some(last)) => (
            growth(first.memory_usage, last.memory_usage),
            growth(first.cpu_usage, last.cpu_usage),
        ),
        _ => (0.0, 0.0),
    };

    ResourceUsageAnalysis {
        memory: ResourceTrend {
            peak: peaks.memory_usage,
            average: averages.memory_usage,
            growth: memory_growth,
        },
        cpu: ResourceTrend {
            peak: peaks.cpu_usage,
            average: averages.cpu_usage,
            growth: cpu_growth,
        },
    }
}
