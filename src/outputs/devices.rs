use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::error::DeviceError;
use crate::pattern::model::OutputClass;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub capabilities: Vec<OutputClass>,
    #[serde(default = "connected_by_default")]
    pub connected: bool,
}

fn connected_by_default() -> bool {
    true
}

impl DeviceInfo {
    pub fn supports(&self, class: OutputClass) -> bool {
        self.capabilities.contains(&class)
    }
}

/// One actuator instruction. Intensity is always inside [0, 1]; 0 means stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub device_id: String,
    pub class: OutputClass,
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clockwise: Option<bool>,
}

/// Devices known to the engine. Fed by `Event::DevicesChanged`; resolution reads only
/// connected entries.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        let mut reg = Self::default();
        reg.replace(devices);
        reg
    }

    pub fn replace(&mut self, devices: Vec<DeviceInfo>) {
        self.devices = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
    }

    pub fn get(&self, id: &str) -> Option<&DeviceInfo> {
        self.devices.get(id)
    }

    pub fn connected(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.values().filter(|d| d.connected)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Whatever actually moves the hardware.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError>;

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;
}

/// Logs commands instead of sending them. Reports a fixed device list.
pub struct LogTransport {
    devices: Vec<DeviceInfo>,
}

impl LogTransport {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceTransport for LogTransport {
    async fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        info!(
            "[DEVICE-{}] {:?} -> {:.3}{}",
            command.device_id,
            command.class,
            command.intensity,
            match command.clockwise {
                Some(true) => " (cw)",
                Some(false) => " (ccw)",
                None => "",
            }
        );
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.clone())
    }
}

/// JSON-over-HTTP bridge to an external device server.
/// `POST {endpoint}/command` takes a [`DeviceCommand`], `GET {endpoint}/devices` lists devices.
pub struct HttpBridgeTransport {
    client: Client,
    endpoint: String,
}

impl HttpBridgeTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| unreachable("bridge", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

fn unreachable(device: &str, e: impl std::fmt::Display) -> DeviceError {
    DeviceError::Unreachable {
        device: device.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl DeviceTransport for HttpBridgeTransport {
    async fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        let response = self
            .client
            .post(format!("{}/command", self.endpoint))
            .json(command)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeviceError::Timeout(command.device_id.clone())
                } else {
                    unreachable(&command.device_id, e)
                }
            })?;
        if !response.status().is_success() {
            return Err(unreachable(&command.device_id, response.status()));
        }
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let response = self
            .client
            .get(format!("{}/devices", self.endpoint))
            .send()
            .await
            .map_err(|e| unreachable("bridge", e))?;
        response.json().await.map_err(|e| unreachable("bridge", e))
    }
}
