use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

// region:        --- Models

/// Work done by one source during its most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub errors: usize,
    pub results: usize,
    pub time_taken: Duration,
}

/// Counters a source updates from its own task.
///
/// Only the owning source writes here; everybody else reads a [`Statistics`]
/// snapshot once the source's stream is closed.
#[derive(Debug, Default)]
pub struct StatsCounter {
    errors: AtomicUsize,
    results: AtomicUsize,
    time_taken_us: AtomicU64,
}

impl StatsCounter {
    pub fn reset(&self) {
        self.errors.store(0, Ordering::SeqCst);
        self.results.store(0, Ordering::SeqCst);
        self.time_taken_us.store(0, Ordering::SeqCst);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_result(&self) {
        self.results.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_time_taken(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.time_taken_us.store(micros, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            errors: self.errors.load(Ordering::SeqCst),
            results: self.results.load(Ordering::SeqCst),
            time_taken: Duration::from_micros(self.time_taken_us.load(Ordering::SeqCst)),
        }
    }
}

// endregion:     --- Models

// region:        --- Post-run correction

/// Removes from each source the results the aggregator dropped as duplicates,
/// leaving the number of unique hosts the source contributed.
pub fn correct(
    mut statistics: BTreeMap<String, Statistics>,
    skipped: &HashMap<String, usize>,
) -> BTreeMap<String, Statistics> {
    for (source, count) in skipped {
        if let Some(stat) = statistics.get_mut(source) {
            stat.results = stat.results.saturating_sub(*count);
        }
    }
    statistics
}

pub fn log_statistics(statistics: &BTreeMap<String, Statistics>) {
    info!("{:<16} {:>12} {:>8} {:>8}", "Source", "Duration", "Results", "Errors");
    info!("{}", "-".repeat(47));
    for (source, stat) in statistics {
        let duration = format!("{:.3?}", stat.time_taken);
        info!(
            "{:<16} {:>12} {:>8} {:>8}",
            source, duration, stat.results, stat.errors
        );
    }
}

// endregion:     --- Post-run correction

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_snapshot_reflects_updates() {
        let counter = StatsCounter::default();
        counter.add_result();
        counter.add_result();
        counter.add_error();
        counter.set_time_taken(Duration::from_millis(1500));

        let stat = counter.snapshot();
        assert_eq!(stat.results, 2);
        assert_eq!(stat.errors, 1);
        assert_eq!(stat.time_taken, Duration::from_millis(1500));

        counter.reset();
        assert_eq!(counter.snapshot(), Statistics::default());
    }

    #[test]
    fn correct_subtracts_skipped_counts() {
        let mut statistics = BTreeMap::new();
        statistics.insert(
            "a".to_string(),
            Statistics {
                errors: 1,
                results: 3,
                time_taken: Duration::from_secs(1),
            },
        );
        statistics.insert(
            "b".to_string(),
            Statistics {
                errors: 0,
                results: 1,
                time_taken: Duration::ZERO,
            },
        );
        let skipped = HashMap::from([
            ("a".to_string(), 1),
            ("b".to_string(), 5),
            ("unknown".to_string(), 2),
        ]);

        let corrected = correct(statistics, &skipped);
        assert_eq!(corrected["a"].results, 2);
        assert_eq!(corrected["a"].errors, 1);
        assert_eq!(corrected["b"].results, 0);
        assert!(!corrected.contains_key("unknown"));
    }
}
