//! Telemetry report cache for a Bambu printer.
//!
//! Printers publish JSON documents on `device/<serial>/report`. A full
//! `pushall` response carries every field; spontaneous updates carry only the
//! fields that changed. [`PrinterReport::merge`] folds either kind into the
//! cached view, normalizing vendor quirks (string-typed numbers, `dBm`
//! suffixes, light state strings) at this boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chamber light state.
///
/// The printer reports light modes as strings; anything other than the two
/// known values is ignored rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    On,
    Off,
}

impl LightState {
    /// Parse a `lights_report` mode string.
    pub fn from_mode(mode: &str) -> Option<Self> {
        match mode {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    /// Whether the light is on.
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Latest known telemetry for one printer.
///
/// Every field is optional: a printer that has not yet pushed a full report
/// (or omits a field on this model) simply leaves the field unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterReport {
    /// Nozzle temperature (°C).
    pub nozzle_temp: Option<f64>,
    /// Target nozzle temperature (°C).
    pub nozzle_target: Option<f64>,
    /// Bed temperature (°C).
    pub bed_temp: Option<f64>,
    /// Target bed temperature (°C).
    pub bed_target: Option<f64>,
    /// Chamber temperature (°C), where the model has a chamber sensor.
    pub chamber_temp: Option<f64>,
    /// Print progress (0-100).
    pub progress_percent: Option<f64>,
    /// Remaining print time in minutes.
    pub remaining_min: Option<u32>,
    /// Current layer number.
    pub layer_current: Option<u32>,
    /// Total layers in the current job.
    pub layer_total: Option<u32>,
    /// Print speed modifier (percent).
    pub speed_percent: Option<u32>,
    /// Part cooling fan speed (percent).
    pub fan_percent: Option<u32>,
    /// WiFi signal strength (dBm).
    pub wifi_dbm: Option<f64>,
    /// Chamber light state.
    pub chamber_light: Option<LightState>,
    /// Current printer error code (0 = no error).
    pub error_code: Option<u64>,
    /// Raw job state string as reported by the firmware.
    pub gcode_state: Option<String>,
    /// File name of the current job.
    pub file: Option<String>,
    /// Installed nozzle type (e.g. "stainless_steel").
    pub nozzle_type: Option<String>,
    /// Installed nozzle diameter in millimeters (e.g. "0.4").
    pub nozzle_diameter: Option<String>,
}

impl PrinterReport {
    /// Merge a report payload into the cache.
    ///
    /// Only fields present in the payload are updated. Returns `true` when
    /// the payload carried at least one temperature reading, which the
    /// exporter uses as its data-freshness signal.
    pub fn merge(&mut self, payload: &Value) -> bool {
        let Some(print) = payload.get("print") else {
            return false;
        };

        let mut saw_thermal = false;

        if let Some(v) = number(print, "nozzle_temper") {
            self.nozzle_temp = Some(v);
            saw_thermal = true;
        }
        if let Some(v) = number(print, "nozzle_target_temper") {
            self.nozzle_target = Some(v);
        }
        if let Some(v) = number(print, "bed_temper") {
            self.bed_temp = Some(v);
            saw_thermal = true;
        }
        if let Some(v) = number(print, "bed_target_temper") {
            self.bed_target = Some(v);
        }
        if let Some(v) = number(print, "chamber_temper") {
            self.chamber_temp = Some(v);
            saw_thermal = true;
        }

        if let Some(v) = number(print, "mc_percent") {
            self.progress_percent = Some(v);
        }
        if let Some(v) = integer(print, "mc_remaining_time") {
            self.remaining_min = Some(v as u32);
        }
        if let Some(v) = integer(print, "layer_num") {
            self.layer_current = Some(v as u32);
        }
        if let Some(v) = integer(print, "total_layer_num") {
            self.layer_total = Some(v as u32);
        }
        if let Some(v) = integer(print, "spd_mag") {
            self.speed_percent = Some(v as u32);
        }
        if let Some(v) = integer(print, "cooling_fan_speed") {
            // Raw scale is 0-15.
            self.fan_percent = Some((v.min(15) * 100 / 15) as u32);
        }

        if let Some(signal) = print.get("wifi_signal").and_then(Value::as_str) {
            self.wifi_dbm = signal.replace("dBm", "").trim().parse().ok();
        }

        if let Some(lights) = print.get("lights_report").and_then(Value::as_array) {
            for light in lights {
                let node = light.get("node").and_then(Value::as_str);
                let mode = light.get("mode").and_then(Value::as_str);
                if node == Some("chamber_light")
                    && let Some(state) = mode.and_then(LightState::from_mode)
                {
                    self.chamber_light = Some(state);
                }
            }
        }

        if let Some(v) = integer(print, "print_error") {
            self.error_code = Some(v);
        }
        if let Some(state) = print.get("gcode_state").and_then(Value::as_str) {
            self.gcode_state = Some(state.to_string());
        }
        if let Some(file) = print.get("gcode_file").and_then(Value::as_str) {
            self.file = Some(file.to_string());
        }
        if let Some(kind) = print.get("nozzle_type").and_then(Value::as_str) {
            self.nozzle_type = Some(kind.to_string());
        }
        // Reported as a string on current firmware, as a number on older.
        match print.get("nozzle_diameter") {
            Some(Value::String(s)) => self.nozzle_diameter = Some(s.clone()),
            Some(Value::Number(n)) => self.nozzle_diameter = Some(n.to_string()),
            _ => {}
        }

        saw_thermal
    }
}

/// Read a numeric field, tolerating string-typed numbers in the payload.
fn number(print: &Value, key: &str) -> Option<f64> {
    match print.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read an integer field, tolerating string-typed numbers in the payload.
fn integer(print: &Value, key: &str) -> Option<u64> {
    match print.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
