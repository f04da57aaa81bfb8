//! Shared metric registry.
//!
//! All pollers write into one registry; the HTTP server reads it. Updates
//! arrive as per-printer batches so a scrape never sees one printer's state
//! half-replaced. The registry is injected wherever it is needed (never a
//! process-global), which keeps tests isolated.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::CATALOG;

/// A unique identifier for a metric time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    /// Metric name from the catalog.
    pub name: &'static str,
    /// Sorted label key-value pairs. Always includes `printer`.
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &'static str, printer: &str, extra: &[(&str, &str)]) -> Self {
        let mut labels = Vec::with_capacity(1 + extra.len());
        labels.push(("printer".to_string(), printer.to_string()));
        for (k, v) in extra {
            labels.push((k.to_string(), v.to_string()));
        }
        labels.sort_by(|a, b| a.0.cmp(&b.0));

        Self { name, labels }
    }

    fn printer(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == "printer")
            .map(|(_, v)| v.as_str())
    }

    /// Format labels for the exposition format.
    pub fn format_labels(&self) -> String {
        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();

        format!("{{{}}}", parts.join(","))
    }
}

/// One printer's gauge values for one poll tick.
///
/// Built up by the poller, then handed to [`MetricRegistry::apply`] as a
/// unit. Series not present in the batch disappear for that printer, which
/// is how idle printers drop their progress series and how a rotated file
/// name retires the previous `filename` label.
#[derive(Debug)]
pub struct MetricBatch {
    printer: String,
    series: Vec<(SeriesKey, f64)>,
}

impl MetricBatch {
    /// Start a batch for one printer.
    pub fn new(printer: impl Into<String>) -> Self {
        Self {
            printer: printer.into(),
            series: Vec::new(),
        }
    }

    /// Set a plain gauge.
    pub fn set(&mut self, name: &'static str, value: f64) {
        let key = SeriesKey::new(name, &self.printer, &[]);
        self.series.push((key, value));
    }

    /// Set a gauge with extra labels (the info metrics).
    pub fn set_with_labels(&mut self, name: &'static str, extra: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(name, &self.printer, extra);
        self.series.push((key, value));
    }

    /// Number of series in the batch.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Poll bookkeeping exported as exporter self-metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollStats {
    /// Poll ticks completed.
    pub polls: u64,
    /// Poll ticks that failed outright.
    pub poll_errors: u64,
}

/// Thread-safe gauge store with Prometheus text rendering.
pub struct MetricRegistry {
    series: RwLock<HashMap<SeriesKey, f64>>,
    stats: RwLock<PollStats>,
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            stats: RwLock::new(PollStats::default()),
        }
    }

    /// Replace one printer's series with the contents of a batch.
    ///
    /// Runs under a single write lock so a concurrent scrape sees either the
    /// previous tick or this one, never a mix.
    pub fn apply(&self, batch: MetricBatch) {
        let mut series = self.series.write();
        series.retain(|key, _| key.printer() != Some(batch.printer.as_str()));
        for (key, value) in batch.series {
            series.insert(key, value);
        }
    }

    /// Record the outcome of a poll tick.
    pub fn record_poll(&self, ok: bool) {
        let mut stats = self.stats.write();
        stats.polls += 1;
        if !ok {
            stats.poll_errors += 1;
        }
    }

    /// Current number of stored series.
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Poll statistics.
    pub fn stats(&self) -> PollStats {
        *self.stats.read()
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let series = self.series.read();
        let mut output = Vec::with_capacity(series.len() * 80);

        for def in CATALOG {
            let mut rows: Vec<(&SeriesKey, f64)> = series
                .iter()
                .filter(|(key, _)| key.name == def.name)
                .map(|(key, value)| (key, *value))
                .collect();
            if rows.is_empty() {
                continue;
            }
            rows.sort_by(|a, b| a.0.labels.cmp(&b.0.labels));

            writeln!(output, "# HELP {} {}", def.name, def.help).ok();
            writeln!(output, "# TYPE {} gauge", def.name).ok();
            for (key, value) in rows {
                writeln!(
                    output,
                    "{}{} {}",
                    key.name,
                    key.format_labels(),
                    format_value(value)
                )
                .ok();
            }
        }

        let stats = self.stats.read();
        writeln!(output, "# TYPE bambu_exporter_series gauge").ok();
        writeln!(output, "bambu_exporter_series {}", series.len()).ok();
        writeln!(output, "# TYPE bambu_exporter_polls_total counter").ok();
        writeln!(output, "bambu_exporter_polls_total {}", stats.polls).ok();
        writeln!(output, "# TYPE bambu_exporter_poll_errors_total counter").ok();
        writeln!(
            output,
            "bambu_exporter_poll_errors_total {}",
            stats.poll_errors
        )
        .ok();

        String::from_utf8(output).unwrap_or_default()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for the exposition format.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn test_apply_and_render() {
        let registry = MetricRegistry::new();

        let mut batch = MetricBatch::new("x1c");
        batch.set(catalog::ONLINE, 1.0);
        batch.set(catalog::NOZZLE_TEMP, 220.5);
        registry.apply(batch);

        let output = registry.render();
        assert!(output.contains("# TYPE bambu_online gauge"));
        assert!(output.contains("bambu_online{printer=\"x1c\"} 1"));
        assert!(output.contains("bambu_nozzle_temperature_celsius{printer=\"x1c\"} 220.5"));
    }

    #[test]
    fn test_apply_replaces_all_series_for_the_printer() {
        let registry = MetricRegistry::new();

        let mut first = MetricBatch::new("x1c");
        first.set(catalog::ONLINE, 1.0);
        first.set(catalog::PRINT_PROGRESS, 55.0);
        registry.apply(first);

        // Next tick the printer is idle: progress is no longer reported.
        let mut second = MetricBatch::new("x1c");
        second.set(catalog::ONLINE, 1.0);
        registry.apply(second);

        let output = registry.render();
        assert!(output.contains("bambu_online{printer=\"x1c\"} 1"));
        assert!(!output.contains("bambu_print_progress_percent"));
    }

    #[test]
    fn test_apply_does_not_touch_other_printers() {
        let registry = MetricRegistry::new();

        let mut a = MetricBatch::new("a");
        a.set(catalog::NOZZLE_TEMP, 200.0);
        registry.apply(a);

        let mut b = MetricBatch::new("b");
        b.set(catalog::NOZZLE_TEMP, 210.0);
        registry.apply(b);

        let output = registry.render();
        assert!(output.contains("bambu_nozzle_temperature_celsius{printer=\"a\"} 200"));
        assert!(output.contains("bambu_nozzle_temperature_celsius{printer=\"b\"} 210"));
    }

    #[test]
    fn test_info_label_rotation() {
        let registry = MetricRegistry::new();

        let mut first = MetricBatch::new("x1c");
        first.set_with_labels(catalog::CURRENT_FILE, &[("filename", "old.3mf")], 1.0);
        registry.apply(first);

        let mut second = MetricBatch::new("x1c");
        second.set_with_labels(catalog::CURRENT_FILE, &[("filename", "new.3mf")], 1.0);
        registry.apply(second);

        let output = registry.render();
        assert!(output.contains("new.3mf"));
        assert!(!output.contains("old.3mf"));
    }

    #[test]
    fn test_labels_are_sorted_in_output() {
        let registry = MetricRegistry::new();

        let mut batch = MetricBatch::new("x1c");
        batch.set_with_labels(
            catalog::NOZZLE_INFO,
            &[("nozzle_type", "stainless_steel"), ("nozzle_diameter_mm", "0.4")],
            1.0,
        );
        registry.apply(batch);

        let output = registry.render();
        assert!(output.contains(
            "bambu_nozzle_info{nozzle_diameter_mm=\"0.4\",nozzle_type=\"stainless_steel\",printer=\"x1c\"} 1"
        ));
    }

    #[test]
    fn test_render_groups_series_under_one_header() {
        let registry = MetricRegistry::new();

        for name in ["a", "b"] {
            let mut batch = MetricBatch::new(name);
            batch.set(catalog::ONLINE, 1.0);
            registry.apply(batch);
        }

        let output = registry.render();
        let headers = output
            .lines()
            .filter(|l| *l == "# TYPE bambu_online gauge")
            .count();
        assert_eq!(headers, 1);
    }

    #[test]
    fn test_poll_stats() {
        let registry = MetricRegistry::new();
        registry.record_poll(true);
        registry.record_poll(false);
        registry.record_poll(true);

        let stats = registry.stats();
        assert_eq!(stats.polls, 3);
        assert_eq!(stats.poll_errors, 1);

        let output = registry.render();
        assert!(output.contains("bambu_exporter_polls_total 3"));
        assert!(output.contains("bambu_exporter_poll_errors_total 1"));
    }

    #[test]
    fn test_empty_registry_renders_only_self_metrics() {
        let registry = MetricRegistry::new();
        let output = registry.render();

        assert!(
            output
                .lines()
                .all(|l| l.starts_with('#') || l.starts_with("bambu_exporter_")),
            "unexpected output: {output}"
        );
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(34.1), "34.1");
        assert_eq!(format_value(-63.0), "-63");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
    }

    #[test]
    fn test_concurrent_apply() {
        let registry = Arc::new(MetricRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for tick in 0..100 {
                        let mut batch = MetricBatch::new(format!("printer{i}"));
                        batch.set(catalog::ONLINE, 1.0);
                        batch.set(catalog::NOZZLE_TEMP, tick as f64);
                        registry.apply(batch);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Two series per printer survive, carrying each thread's final tick.
        assert_eq!(registry.series_count(), 16);
        assert!(registry.render().contains("bambu_nozzle_temperature_celsius"));
    }
}
