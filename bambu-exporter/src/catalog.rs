//! The exported metric catalog.
//!
//! All printer metrics are gauges carrying a `printer` label; the two info
//! metrics carry extra descriptive labels and a constant value of 1.

/// One catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub help: &'static str,
}

pub const ONLINE: &str = "bambu_online";
pub const PRINTER_STATE: &str = "bambu_printer_state";
pub const NOZZLE_TEMP: &str = "bambu_nozzle_temperature_celsius";
pub const NOZZLE_TARGET_TEMP: &str = "bambu_nozzle_target_temperature_celsius";
pub const BED_TEMP: &str = "bambu_bed_temperature_celsius";
pub const BED_TARGET_TEMP: &str = "bambu_bed_target_temperature_celsius";
pub const CHAMBER_TEMP: &str = "bambu_chamber_temperature_celsius";
pub const PRINT_PROGRESS: &str = "bambu_print_progress_percent";
pub const REMAINING_TIME: &str = "bambu_print_remaining_time_seconds";
pub const CURRENT_LAYER: &str = "bambu_current_layer";
pub const TOTAL_LAYERS: &str = "bambu_total_layers";
pub const PRINT_SPEED: &str = "bambu_print_speed_percent";
pub const FAN_SPEED: &str = "bambu_cooling_fan_speed_percent";
pub const WIFI_SIGNAL: &str = "bambu_wifi_signal_strength_dbm";
pub const CHAMBER_LIGHT: &str = "bambu_chamber_light";
pub const ERROR_CODE: &str = "bambu_error_code";
pub const CURRENT_FILE: &str = "bambu_current_file_info";
pub const NOZZLE_INFO: &str = "bambu_nozzle_info";

/// Catalog in exposition order.
pub const CATALOG: &[MetricDef] = &[
    MetricDef {
        name: ONLINE,
        help: "Printer connectivity status (1=online, 0=offline)",
    },
    MetricDef {
        name: PRINTER_STATE,
        help: "Printer state (0=IDLE, 1=PRINTING, 2=PAUSED, 3=FINISH, 4=FAILED)",
    },
    MetricDef {
        name: NOZZLE_TEMP,
        help: "Current nozzle temperature",
    },
    MetricDef {
        name: NOZZLE_TARGET_TEMP,
        help: "Target nozzle temperature",
    },
    MetricDef {
        name: BED_TEMP,
        help: "Current bed temperature",
    },
    MetricDef {
        name: BED_TARGET_TEMP,
        help: "Target bed temperature",
    },
    MetricDef {
        name: CHAMBER_TEMP,
        help: "Chamber temperature",
    },
    MetricDef {
        name: PRINT_PROGRESS,
        help: "Print completion percentage",
    },
    MetricDef {
        name: REMAINING_TIME,
        help: "Estimated time remaining for print",
    },
    MetricDef {
        name: CURRENT_LAYER,
        help: "Current layer number",
    },
    MetricDef {
        name: TOTAL_LAYERS,
        help: "Total layers in print",
    },
    MetricDef {
        name: PRINT_SPEED,
        help: "Current print speed modifier",
    },
    MetricDef {
        name: FAN_SPEED,
        help: "Part cooling fan speed",
    },
    MetricDef {
        name: WIFI_SIGNAL,
        help: "WiFi signal strength",
    },
    MetricDef {
        name: CHAMBER_LIGHT,
        help: "Chamber light state (0=off, 1=on)",
    },
    MetricDef {
        name: ERROR_CODE,
        help: "Current error code (0=no error)",
    },
    MetricDef {
        name: CURRENT_FILE,
        help: "Current file being printed (1=active, name in the filename label)",
    },
    MetricDef {
        name: NOZZLE_INFO,
        help: "Installed nozzle (1=present, details in labels)",
    },
];
