use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classify::classify;
use crate::config::{GameApiConfig, Identity};
use crate::error::TelemetryError;
use crate::kernel::event::{DiscreteEvent, Event, Parameter, TelemetryFrame, TelemetrySample};

/// Thin HTTP adapter over the game's local telemetry server.
///
/// The event cursor only moves forward while a vehicle is valid. Leaving the vehicle resets it,
/// so the first feed of the next battle arrives as a full replay and the session tracker sees
/// the discontinuity.
pub struct GameApiClient {
    client: Client,
    base_url: String,
    identity: Identity,
    last_evt: u64,
    last_dmg: u64,
}

#[derive(Deserialize)]
struct HudFeed {
    #[serde(default)]
    events: Vec<HudLine>,
    #[serde(default)]
    damage: Vec<HudLine>,
}

#[derive(Deserialize)]
struct HudLine {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    time: u64,
}

impl GameApiClient {
    pub fn new(config: &GameApiConfig, identity: Identity) -> Result<Self, TelemetryError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity,
            last_evt: 0,
            last_dmg: 0,
        })
    }

    /// One poll: samples from `/indicators` + `/state`, then the HUD damage feed.
    pub async fn poll(&mut self) -> Result<TelemetryFrame, TelemetryError> {
        let indicators = self.get_json("/indicators").await?;
        let state = self.get_json("/state").await?;

        let valid = indicators.get("valid").and_then(Value::as_bool).unwrap_or(false);
        if !valid {
            if self.last_dmg != 0 {
                info!("[GameApi] Vehicle left, rewinding HUD cursor");
            }
            self.last_evt = 0;
            self.last_dmg = 0;
            return Ok(TelemetryFrame::default());
        }

        let samples = parse_samples(&indicators, &state, now_ms());
        let events = self.fetch_events().await?;
        Ok(TelemetryFrame { samples, events })
    }

    async fn get_json(&self, path: &str) -> Result<Value, TelemetryError> {
        let response = self.client.get(format!("{}{}", self.base_url, path)).send().await?;
        if !response.status().is_success() {
            return Err(TelemetryError::Unavailable(format!("{} returned {}", path, response.status())));
        }
        Ok(response.json().await?)
    }

    async fn fetch_events(&mut self) -> Result<Vec<DiscreteEvent>, TelemetryError> {
        let path = format!("/hudmsg?lastEvt={}&lastDmg={}", self.last_evt, self.last_dmg);
        let raw = self.get_json(&path).await?;
        let feed: HudFeed = serde_json::from_value(raw).map_err(|e| TelemetryError::Decode(e.to_string()))?;

        if let Some(max) = feed.events.iter().map(|l| l.id).max() {
            self.last_evt = self.last_evt.max(max);
        }
        if let Some(max) = feed.damage.iter().map(|l| l.id).max() {
            self.last_dmg = self.last_dmg.max(max);
        }

        Ok(feed
            .damage
            .into_iter()
            .filter(|l| !l.msg.trim().is_empty())
            .map(|l| {
                let c = classify(&l.msg, &self.identity);
                DiscreteEvent {
                    kind: c.kind,
                    id: l.id,
                    session_time: l.time,
                    actor: c.actor,
                    text: Some(l.msg),
                }
            })
            .collect())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Ground vehicles report everything on `/indicators` with plain keys; aircraft put flight data
/// on `/state` with unit-suffixed keys. Only keys that are present produce samples.
pub fn parse_samples(indicators: &Value, state: &Value, timestamp_ms: u64) -> Vec<TelemetrySample> {
    let army = indicators.get("army").and_then(Value::as_str).unwrap_or("");
    let is_ground = match army {
        "tank" | "ground" => true,
        "air" => false,
        _ => indicators.get("speed").is_some(),
    };
    let src = if is_ground { indicators } else { state };

    let get = |key: &str| src.get(key).and_then(Value::as_f64);
    let max_of = |a: &str, b: &str| match (get(a), get(b)) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    };

    let mut out: Vec<(Parameter, Option<f64>)> = Vec::new();
    if is_ground {
        let speed = get("speed");
        out.push((Parameter::Speed, speed));
        out.push((Parameter::Rpm, get("rpm")));
        out.push((Parameter::Gear, get("gear")));
    } else {
        let ias = get("IAS, km/h");
        let tas = get("TAS, km/h");
        out.push((Parameter::Ias, ias));
        out.push((Parameter::Tas, tas));
        out.push((Parameter::Speed, max_of("IAS, km/h", "TAS, km/h")));
        out.push((Parameter::Altitude, get("H, m")));
        out.push((Parameter::ClimbRate, get("Vy, m/s")));
        out.push((Parameter::GLoad, get("Ny")));
        out.push((Parameter::Aoa, get("AoA, deg")));
        out.push((Parameter::Mach, get("M")));
        out.push((Parameter::Rpm, max_of("RPM 1", "RPM 2")));
        out.push((Parameter::Gear, get("gear, %")));
    }
    out.push((Parameter::Throttle, max_of("throttle 1, %", "throttle 2, %")));
    out.push((Parameter::EngineTemp, max_of("engine temp 1, C", "engine temp 2, C")));
    out.push((Parameter::OilTemp, max_of("oil temp 1, C", "oil temp 2, C")));
    out.push((Parameter::WaterTemp, max_of("water temp 1, C", "water temp 2, C")));

    // Fuel is exposed as a percentage of the loaded amount.
    if let (Some(fuel), Some(capacity)) = (get("Mfuel, kg"), get("Mfuel0, kg")) {
        if capacity > 0.0 {
            out.push((Parameter::Fuel, Some(fuel / capacity * 100.0)));
        }
    }

    out.into_iter()
        .filter_map(|(parameter, value)| {
            value.map(|value| TelemetrySample {
                parameter,
                value,
                timestamp_ms,
            })
        })
        .collect()
}

/// Polls the game on a fixed cadence and forwards frames into the reactor inbox. Fetch failures
/// are reported as `TelemetryUnavailable` and never stop the loop.
pub async fn run_poller(
    mut client: GameApiClient,
    tx: mpsc::Sender<Event>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("[GameApi] Poller started against {}", client.base_url);
    let mut cadence = tokio::time::interval(interval);
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut was_down = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {}
        }

        let event = match client.poll().await {
            Ok(frame) => {
                if was_down {
                    info!("[GameApi] Telemetry source is back");
                    was_down = false;
                }
                Event::Telemetry(frame)
            }
            Err(e) => {
                if !was_down {
                    warn!("[GameApi] Telemetry unavailable: {}", e);
                    was_down = true;
                } else {
                    debug!("[GameApi] Still unavailable: {}", e);
                }
                Event::TelemetryUnavailable(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            debug!("[GameApi] Reactor inbox closed, stopping poller");
            break;
        }
    }
}
