//! Configuration for the exporter.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Exporter-wide settings.
    #[serde(default)]
    pub exporter: ExporterSettings,

    /// Printers to poll.
    #[serde(default)]
    pub printers: Vec<PrinterEntry>,
}

/// Exporter-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterSettings {
    /// Metrics listen port (default: 9100). The camera relay listens on the
    /// next port up.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind both listeners to (default: "0.0.0.0").
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Poll interval in seconds (default: 5).
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Log level (default: INFO).
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_port() -> u16 {
    9100
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_update_interval() -> u64 {
    5
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            update_interval: default_update_interval(),
            log_level: LogLevel::default(),
        }
    }
}

/// Log level selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive string understood by the tracing `EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Connection settings for one printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterEntry {
    /// Printer name; becomes the `printer` metric label.
    pub name: String,

    /// Printer IP address.
    pub ip: String,

    /// Access code from the printer's LAN mode settings.
    pub access_code: String,

    /// Printer serial number.
    pub serial: String,

    /// Whether this printer is polled (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ExporterConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exporter.update_interval == 0 {
            return Err(ConfigError::Validation(
                "update_interval must be > 0".to_string(),
            ));
        }

        if self.exporter.port == 0 || self.exporter.port == u16::MAX {
            return Err(ConfigError::Validation(format!(
                "port must be in 1..{} (the camera relay uses port + 1)",
                u16::MAX
            )));
        }

        if self.exporter.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid bind address: {}",
                self.exporter.bind_address
            )));
        }

        for (index, printer) in self.printers.iter().enumerate() {
            let required = [
                ("name", &printer.name),
                ("ip", &printer.ip),
                ("access_code", &printer.access_code),
                ("serial", &printer.serial),
            ];
            for (field, value) in required {
                if value.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "printer entry {} ('{}'): field '{}' must not be empty",
                        index, printer.name, field
                    )));
                }
            }

            if printer.ip.parse::<IpAddr>().is_err() {
                return Err(ConfigError::Validation(format!(
                    "printer entry {} ('{}'): invalid ip '{}'",
                    index, printer.name, printer.ip
                )));
            }
        }

        // Duplicate names would collide on the `printer` metric label.
        for (index, printer) in self.printers.iter().enumerate() {
            if self.printers[..index].iter().any(|p| p.name == printer.name) {
                return Err(ConfigError::Validation(format!(
                    "printer entry {}: duplicate printer name '{}'",
                    index, printer.name
                )));
            }
        }

        Ok(())
    }

    /// Printers that should be polled.
    pub fn enabled_printers(&self) -> impl Iterator<Item = &PrinterEntry> {
        self.printers.iter().filter(|p| p.enabled)
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            exporter: ExporterSettings::default(),
            printers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer_yaml(name: &str, enabled: bool) -> String {
        format!(
            r#"
  - name: "{name}"
    ip: "192.168.1.50"
    access_code: "12345678"
    serial: "01S00A000000000"
    enabled: {enabled}
"#
        )
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.exporter.port, 9100);
        assert_eq!(config.exporter.bind_address, "0.0.0.0");
        assert_eq!(config.exporter.update_interval, 5);
        assert_eq!(config.exporter.log_level, LogLevel::Info);
        assert!(config.printers.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
exporter:
  port: 9200
  bind_address: "127.0.0.1"
  update_interval: 10
  log_level: DEBUG

printers:
  - name: "x1c"
    ip: "192.168.1.50"
    access_code: "12345678"
    serial: "01S00A000000000"
    enabled: true
  - name: "p1s"
    ip: "192.168.1.51"
    access_code: "87654321"
    serial: "01P00A000000000"
    enabled: false
"#;

        let config = ExporterConfig::parse(yaml).unwrap();

        assert_eq!(config.exporter.port, 9200);
        assert_eq!(config.exporter.bind_address, "127.0.0.1");
        assert_eq!(config.exporter.update_interval, 10);
        assert_eq!(config.exporter.log_level, LogLevel::Debug);
        assert_eq!(config.printers.len(), 2);
        assert_eq!(config.printers[0].name, "x1c");
        assert!(!config.printers[1].enabled);
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let yaml = r#"
printers:
  - name: "x1c"
    ip: "192.168.1.50"
    access_code: "12345678"
    serial: "01S00A000000000"
"#;

        let config = ExporterConfig::parse(yaml).unwrap();
        assert!(config.printers[0].enabled);
    }

    #[test]
    fn test_enabled_printers_excludes_disabled() {
        let yaml = format!(
            "printers:{}{}",
            printer_yaml("on", true),
            printer_yaml("off", false)
        );

        let config = ExporterConfig::parse(&yaml).unwrap();
        let names: Vec<_> = config.enabled_printers().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["on"]);
    }

    #[test]
    fn test_missing_required_field_fails() {
        let yaml = r#"
printers:
  - name: "x1c"
    ip: "192.168.1.50"
    serial: "01S00A000000000"
"#;

        let result = ExporterConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_required_field_names_the_entry() {
        let yaml = r#"
printers:
  - name: "x1c"
    ip: "192.168.1.50"
    access_code: ""
    serial: "01S00A000000000"
"#;

        let err = ExporterConfig::parse(yaml).unwrap_err().to_string();
        assert!(err.contains("entry 0"), "message was: {err}");
        assert!(err.contains("x1c"), "message was: {err}");
        assert!(err.contains("access_code"), "message was: {err}");
    }

    #[test]
    fn test_invalid_printer_ip_fails() {
        let yaml = r#"
printers:
  - name: "x1c"
    ip: "not-an-ip"
    access_code: "12345678"
    serial: "01S00A000000000"
"#;

        let err = ExporterConfig::parse(yaml).unwrap_err().to_string();
        assert!(err.contains("invalid ip"), "message was: {err}");
    }

    #[test]
    fn test_duplicate_names_fail_even_when_disabled() {
        let yaml = format!(
            "printers:{}{}",
            printer_yaml("dup", true),
            printer_yaml("dup", false)
        );

        let err = ExporterConfig::parse(&yaml).unwrap_err().to_string();
        assert!(err.contains("duplicate printer name 'dup'"), "message was: {err}");
    }

    #[test]
    fn test_zero_update_interval_fails() {
        let yaml = "exporter:\n  update_interval: 0\n";
        assert!(ExporterConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_invalid_bind_address_fails() {
        let yaml = "exporter:\n  bind_address: \"localhost\"\n";
        assert!(ExporterConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_log_level_directives() {
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
        assert_eq!(LogLevel::Warning.as_directive(), "warn");
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "exporter:\n  port: 9300\nprinters:{}",
            printer_yaml("x1c", true)
        )
        .unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.exporter.port, 9300);
        assert_eq!(config.printers[0].name, "x1c");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = ExporterConfig::load_from_file("/nonexistent/config.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
