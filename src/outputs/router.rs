use std::collections::BTreeMap;

use super::devices::{DeviceCommand, DeviceInfo, DeviceRegistry};
use crate::kernel::scheduler::Emission;
use crate::pattern::compile::Route;
use crate::pattern::model::{OutputClass, RouteMode};

/// Connected devices an emission should reach, each paired with the actuator class to drive.
/// Unknown or disconnected targets are skipped silently.
pub fn resolve(route: &Route, class: OutputClass, registry: &DeviceRegistry) -> Vec<(String, OutputClass)> {
    match route.mode {
        RouteMode::All => registry
            .connected()
            .filter(|d| d.supports(class))
            .map(|d| (d.id.clone(), class))
            .collect(),
        RouteMode::Type => {
            let wanted: Vec<OutputClass> = {
                let parsed: Vec<OutputClass> = route.targets.iter().filter_map(|t| OutputClass::parse(t)).collect();
                if parsed.is_empty() {
                    vec![class]
                } else {
                    parsed
                }
            };
            registry
                .connected()
                .filter_map(|d| actuator_for(d, class, &wanted).map(|c| (d.id.clone(), c)))
                .collect()
        }
        RouteMode::Specific => {
            let mut out: Vec<(String, OutputClass)> = Vec::new();
            for id in &route.targets {
                let Some(device) = registry.get(id).filter(|d| d.connected) else {
                    continue;
                };
                if out.iter().any(|(seen, _)| seen == id) {
                    continue;
                }
                let actuator = if device.supports(class) {
                    Some(class)
                } else {
                    device.capabilities.first().copied()
                };
                if let Some(c) = actuator {
                    out.push((device.id.clone(), c));
                }
            }
            out
        }
    }
}

/// Prefer the output's own class when the device has it and it was asked for.
fn actuator_for(device: &DeviceInfo, class: OutputClass, wanted: &[OutputClass]) -> Option<OutputClass> {
    if wanted.contains(&class) && device.supports(class) {
        return Some(class);
    }
    wanted.iter().copied().find(|c| device.supports(*c))
}

#[derive(Default)]
struct Slot {
    level: Option<(f64, Option<bool>)>,
    stopped: bool,
}

/// Folds one tick of emissions into device commands. Several outputs hitting the same
/// actuator resolve to the highest intensity; a stop only becomes a zero command when no
/// active output still drives that actuator.
pub fn route(emissions: &[Emission], registry: &DeviceRegistry) -> Vec<DeviceCommand> {
    let mut slots: BTreeMap<(String, OutputClass), Slot> = BTreeMap::new();

    for emission in emissions {
        match emission {
            Emission::Level {
                class,
                route,
                intensity,
                direction,
                ..
            } => {
                for target in resolve(route, *class, registry) {
                    let slot = slots.entry(target).or_default();
                    let replace = match slot.level {
                        Some((current, _)) => *intensity > current,
                        None => true,
                    };
                    if replace {
                        slot.level = Some((*intensity, *direction));
                    }
                }
            }
            Emission::Stop { class, route, .. } => {
                for target in resolve(route, *class, registry) {
                    slots.entry(target).or_default().stopped = true;
                }
            }
        }
    }

    slots
        .into_iter()
        .filter_map(|((device_id, class), slot)| match slot.level {
            Some((intensity, clockwise)) => Some(DeviceCommand {
                device_id,
                class,
                intensity: intensity.clamp(0.0, 1.0),
                clockwise: if class == OutputClass::Rotation { clockwise } else { None },
            }),
            None if slot.stopped => Some(DeviceCommand {
                device_id,
                class,
                intensity: 0.0,
                clockwise: None,
            }),
            None => None,
        })
        .collect()
}

/// Zero command for every actuator of every connected device.
pub fn stop_all(registry: &DeviceRegistry) -> Vec<DeviceCommand> {
    registry
        .connected()
        .flat_map(|d| {
            d.capabilities.iter().map(move |c| DeviceCommand {
                device_id: d.id.clone(),
                class: *c,
                intensity: 0.0,
                clockwise: None,
            })
        })
        .collect()
}
