//! Per-printer polling.
//!
//! Each enabled printer gets its own poller task on a fixed interval, so a
//! printer that hangs or drops off the network never delays the others. The
//! only thing pollers share is the metric registry.

use std::time::Duration;

use bambu_mqtt::PrinterReport;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::mapping::PrinterState;
use crate::registry::{MetricBatch, SharedRegistry};
use crate::source::StatusSource;

/// Polls one printer and keeps its gauges current.
pub struct PrinterPoller<S> {
    name: String,
    source: S,
    registry: SharedRegistry,
    interval: Duration,
    /// Last availability written to the registry, for transition logging.
    was_online: Option<bool>,
    /// Whether the previous tick failed, to keep repeated failures quiet.
    failing: bool,
}

impl<S: StatusSource> PrinterPoller<S> {
    /// Create a poller for one printer.
    pub fn new(
        name: impl Into<String>,
        source: S,
        registry: SharedRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            registry,
            interval,
            was_online: None,
            failing: false,
        }
    }

    /// Run the polling loop until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            printer = %self.name,
            interval_secs = self.interval.as_secs_f64(),
            "starting poller"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(printer = %self.name, "poller stopped");
    }

    /// Run one poll tick.
    ///
    /// On a failed status read the registry is left untouched: the previous
    /// values stay visible (and go stale) until the printer recovers.
    pub fn refresh(&mut self) {
        let snapshot = match self.source.status() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.registry.record_poll(false);
                if !self.failing {
                    warn!(printer = %self.name, error = %e, "poll failed, keeping last values");
                    self.failing = true;
                } else {
                    debug!(printer = %self.name, error = %e, "poll still failing");
                }
                return;
            }
        };

        if self.failing {
            info!(printer = %self.name, "poll recovered");
            self.failing = false;
        }

        // A connected transport alone does not mean the printer is up: the
        // broker answers even when the machine is powered down mid-boot or
        // has stopped sending reports. Require a temperature reading inside
        // the current tick window as the second signal.
        let data_fresh = snapshot
            .thermal_age
            .is_some_and(|age| age <= self.interval);
        let online = snapshot.transport_connected && data_fresh;

        let mut batch = MetricBatch::new(&self.name);
        if online {
            fill_batch(&mut batch, &snapshot.report);
        } else {
            if snapshot.transport_connected {
                debug!(printer = %self.name, "transport up but no recent data, reporting offline");
            }
            batch.set(catalog::ONLINE, 0.0);
        }
        self.registry.apply(batch);
        self.registry.record_poll(true);

        if self.was_online != Some(online) {
            info!(printer = %self.name, online, "printer availability changed");
            self.was_online = Some(online);
        }
    }
}

/// Translate a report into the full gauge batch for an online printer.
fn fill_batch(batch: &mut MetricBatch, report: &PrinterReport) {
    batch.set(catalog::ONLINE, 1.0);

    let state = report
        .gcode_state
        .as_deref()
        .map(PrinterState::from_report)
        .unwrap_or_default();
    batch.set(catalog::PRINTER_STATE, state.as_gauge());

    if let Some(v) = report.nozzle_temp {
        batch.set(catalog::NOZZLE_TEMP, v);
    }
    if let Some(v) = report.nozzle_target {
        batch.set(catalog::NOZZLE_TARGET_TEMP, v);
    }
    if let Some(v) = report.bed_temp {
        batch.set(catalog::BED_TEMP, v);
    }
    if let Some(v) = report.bed_target {
        batch.set(catalog::BED_TARGET_TEMP, v);
    }
    if let Some(v) = report.chamber_temp {
        batch.set(catalog::CHAMBER_TEMP, v);
    }
    if let Some(v) = report.speed_percent {
        batch.set(catalog::PRINT_SPEED, v as f64);
    }
    if let Some(v) = report.fan_percent {
        batch.set(catalog::FAN_SPEED, v as f64);
    }
    if let Some(v) = report.wifi_dbm {
        batch.set(catalog::WIFI_SIGNAL, v);
    }
    if let Some(light) = report.chamber_light {
        batch.set(catalog::CHAMBER_LIGHT, if light.is_on() { 1.0 } else { 0.0 });
    }
    if let Some(v) = report.error_code {
        batch.set(catalog::ERROR_CODE, v as f64);
    }

    // An idle printer has no meaningful progress; dropping these series
    // keeps "idle" distinguishable from "0% into a print".
    if state.shows_progress() {
        if let Some(v) = report.progress_percent {
            batch.set(catalog::PRINT_PROGRESS, v);
        }
        if let Some(v) = report.remaining_min {
            batch.set(catalog::REMAINING_TIME, (v as f64) * 60.0);
        }
        if let Some(v) = report.layer_current {
            batch.set(catalog::CURRENT_LAYER, v as f64);
        }
        if let Some(v) = report.layer_total {
            batch.set(catalog::TOTAL_LAYERS, v as f64);
        }
    }

    if let Some(file) = report.file.as_deref().filter(|f| !f.is_empty()) {
        batch.set_with_labels(catalog::CURRENT_FILE, &[("filename", file)], 1.0);
    }
    if let (Some(kind), Some(diameter)) =
        (report.nozzle_type.as_deref(), report.nozzle_diameter.as_deref())
    {
        batch.set_with_labels(
            catalog::NOZZLE_INFO,
            &[("nozzle_type", kind), ("nozzle_diameter_mm", diameter)],
            1.0,
        );
    }
}
