//! MQTT status client for a Bambu printer.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::camera;
use crate::error::{ClientError, Result};
use crate::report::PrinterReport;

/// MQTT port of the printer.
const MQTT_PORT: u16 = 8883;

/// MQTT username (fixed across all printers; the access code is the secret).
const MQTT_USERNAME: &str = "bblp";

/// Delay before re-driving the event loop after a transport error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How often to ask the printer for a full report. A1/P1 models do not push
/// unsolicited full reports, so the cache would otherwise run dry.
const PUSHALL_INTERVAL: Duration = Duration::from_secs(30);

/// Connection coordinates for one printer.
#[derive(Debug, Clone)]
pub struct PrinterAddress {
    /// Printer IP address.
    pub ip: IpAddr,
    /// Printer serial number (selects the MQTT topics).
    pub serial: String,
    /// Access code from the printer's LAN mode settings.
    pub access_code: String,
}

/// Point-in-time view of the client state.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Whether the MQTT transport is currently connected.
    pub transport_connected: bool,
    /// Age of the most recent temperature reading, if any arrived yet.
    pub thermal_age: Option<Duration>,
    /// The cached report.
    pub report: PrinterReport,
}

/// State shared between the client handle and its driver task.
#[derive(Debug, Default)]
struct Shared {
    connected: AtomicBool,
    report: Mutex<PrinterReport>,
    last_thermal: Mutex<Option<Instant>>,
}

/// Handle to a printer connection.
///
/// Cloning is cheap; all clones observe the same cached state. The MQTT
/// session is driven by a background task spawned in [`BambuClient::connect`];
/// it reconnects on its own after transport errors, so a handle stays valid
/// across printer power cycles.
#[derive(Clone)]
pub struct BambuClient {
    address: Arc<PrinterAddress>,
    client: AsyncClient,
    shared: Arc<Shared>,
    stop: Arc<watch::Sender<bool>>,
}

impl BambuClient {
    /// Create a client and start its driver task.
    ///
    /// The connection is established in the background; until the first
    /// report arrives, [`snapshot`](Self::snapshot) reports the transport as
    /// disconnected. A printer that is off at startup is picked up whenever
    /// it appears on the network.
    pub fn connect(address: PrinterAddress) -> Self {
        let client_id = format!("bambu-exporter-{}", uuid::Uuid::new_v4());

        let mut options = MqttOptions::new(client_id, address.ip.to_string(), MQTT_PORT);
        options.set_credentials(MQTT_USERNAME, &address.access_code);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        // Printers use self-signed certificates.
        let tls = TlsConfiguration::Simple {
            ca: vec![],
            alpn: None,
            client_auth: None,
        };
        options.set_transport(Transport::tls_with_config(tls));

        let (client, event_loop) = AsyncClient::new(options, 64);
        let shared = Arc::new(Shared::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        let driver = Driver {
            address: Arc::new(address),
            client: client.clone(),
            shared: shared.clone(),
        };
        let handle = Self {
            address: driver.address.clone(),
            client,
            shared,
            stop: Arc::new(stop_tx),
        };

        tokio::spawn(driver.run(event_loop, stop_rx));

        handle
    }

    /// Printer serial number.
    pub fn serial(&self) -> &str {
        &self.address.serial
    }

    /// Printer IP address.
    pub fn ip(&self) -> IpAddr {
        self.address.ip
    }

    /// Current transport and report state.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            transport_connected: self.shared.connected.load(Ordering::Relaxed),
            thermal_age: self.shared.last_thermal.lock().as_ref().map(Instant::elapsed),
            report: self.shared.report.lock().clone(),
        }
    }

    /// Fetch one JPEG frame from the printer camera, bounded by `wait`.
    pub async fn camera_frame(&self, wait: Duration) -> Result<Vec<u8>> {
        camera::fetch_frame(self.address.ip, &self.address.access_code, wait).await
    }

    /// Stop the driver task and disconnect.
    pub async fn disconnect(&self) {
        let _ = self.stop.send(true);
        let _ = self.client.disconnect().await;
    }
}

/// Owns the event loop and keeps the shared cache current.
struct Driver {
    address: Arc<PrinterAddress>,
    client: AsyncClient,
    shared: Arc<Shared>,
}

impl Driver {
    async fn run(self, mut event_loop: EventLoop, mut stop: watch::Receiver<bool>) {
        let serial = self.address.serial.clone();
        let report_topic = format!("device/{serial}/report");
        let mut pushall = tokio::time::interval(PUSHALL_INTERVAL);
        let mut was_connected = false;

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                _ = pushall.tick() => {
                    if self.shared.connected.load(Ordering::Relaxed)
                        && let Err(e) = self.request_report().await
                    {
                        debug!(printer = %serial, error = %e, "pushall request failed");
                    }
                }
                event = event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        if let Err(e) = self.on_connected(&report_topic).await {
                            warn!(printer = %serial, error = %e, "post-connect setup failed");
                        } else {
                            self.shared.connected.store(true, Ordering::Relaxed);
                            if !was_connected {
                                info!(printer = %serial, "MQTT connected");
                            }
                            was_connected = true;
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic == report_topic {
                            self.on_report(&publish.payload);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.shared.connected.store(false, Ordering::Relaxed);
                        if was_connected {
                            warn!(printer = %serial, error = %e, "MQTT connection lost");
                        } else {
                            debug!(printer = %serial, error = %e, "MQTT connect attempt failed");
                        }
                        was_connected = false;
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                },
            }
        }

        debug!(printer = %serial, "MQTT driver stopped");
    }

    async fn on_connected(&self, report_topic: &str) -> Result<()> {
        self.client
            .subscribe(report_topic, QoS::AtMostOnce)
            .await
            .map_err(|e| ClientError::Mqtt(e.to_string()))?;
        self.request_report().await
    }

    /// Ask the printer to push a full report.
    async fn request_report(&self) -> Result<()> {
        let topic = format!("device/{}/request", self.address.serial);
        let payload = serde_json::json!({
            "pushing": {"sequence_id": "0", "command": "pushall"}
        });

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.to_string())
            .await
            .map_err(|e| ClientError::Mqtt(e.to_string()))
    }

    fn on_report(&self, payload: &[u8]) {
        let value: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                debug!(printer = %self.address.serial, error = %e, "unparseable report payload");
                return;
            }
        };

        let saw_thermal = self.shared.report.lock().merge(&value);
        if saw_thermal {
            *self.shared.last_thermal.lock() = Some(Instant::now());
        }
    }
}
