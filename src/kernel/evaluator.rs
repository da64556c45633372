use serde::Serialize;
use std::collections::BTreeMap;

use super::event::DiscreteEvent;
use super::sensors::SensorHistory;
use crate::config::Identity;
use crate::error::EvalFault;
use crate::pattern::compile::{CompiledPattern, NodeIndex, NodeKind};
use crate::pattern::model::{EventFilter, GateOp, MultiLogic};

/// Value carried along an edge for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Signal {
    /// No data: treated as false by every consumer.
    Unknown,
    Bool { active: bool },
    Number { value: f64, active: bool },
}

impl Signal {
    pub fn active(self) -> bool {
        match self {
            Signal::Unknown => false,
            Signal::Bool { active } | Signal::Number { active, .. } => active,
        }
    }

    /// Numeric view for downstream comparators. Boolean signals read as 1.0 / 0.0.
    pub fn number(self) -> Option<f64> {
        match self {
            Signal::Unknown => None,
            Signal::Bool { active } => Some(if active { 1.0 } else { 0.0 }),
            Signal::Number { value, .. } => Some(value),
        }
    }

    fn flag(active: bool) -> Self {
        Signal::Bool { active }
    }
}

/// Everything a pattern may read during one tick.
pub struct TickContext<'a> {
    pub now_ms: u64,
    pub sensors: &'a SensorHistory,
    /// Admitted this tick, sorted by id.
    pub events: &'a [DiscreteEvent],
    pub identity: &'a Identity,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Indexed like `CompiledPattern::nodes`.
    pub signals: Vec<Signal>,
    /// Output nodes whose whole chain is true, in node order.
    pub active_outputs: Vec<NodeIndex>,
}

/// Evaluates every node once, in topological order.
pub fn evaluate(pattern: &CompiledPattern, ctx: &TickContext<'_>) -> Result<Evaluation, EvalFault> {
    let mut signals = vec![Signal::Unknown; pattern.nodes.len()];

    for &i in &pattern.order {
        let node = &pattern.nodes[i];
        let upstream = |k: usize| signals[node.inputs[k]];

        let signal = match &node.kind {
            NodeKind::Sensor {
                parameter,
                comparator,
                threshold,
                window_ms,
            } => match ctx.sensors.current(*parameter) {
                None => Signal::Unknown,
                Some(v) if !v.is_finite() => {
                    return Err(EvalFault::NonFiniteInput {
                        parameter: parameter.to_string(),
                    })
                }
                Some(v) => {
                    let active = if comparator.is_windowed() {
                        ctx.sensors
                            .windowed(*parameter, *comparator, *threshold, *window_ms, ctx.now_ms)
                    } else {
                        comparator.holds(v, *threshold)
                    };
                    Signal::Number { value: v, active }
                }
            },
            NodeKind::Event { kind, filter } => {
                let hit = ctx
                    .events
                    .iter()
                    .any(|e| e.kind == *kind && filter_matches(filter, e, ctx.identity));
                Signal::flag(hit)
            }
            NodeKind::Condition { comparator, value } => match upstream(0).number() {
                None => Signal::Unknown,
                Some(x) => Signal::Number {
                    value: x,
                    active: comparator.holds(x, *value),
                },
            },
            NodeKind::MultiCondition { logic, clauses } => match upstream(0).number() {
                None => Signal::Unknown,
                Some(x) => {
                    let mut results = clauses.iter().map(|c| c.comparator.holds(x, c.value));
                    let active = match logic {
                        MultiLogic::And => results.all(|r| r),
                        MultiLogic::Or => results.any(|r| r),
                    };
                    Signal::Number { value: x, active }
                }
            },
            NodeKind::Gate(op) => {
                let inputs: Vec<bool> = node.inputs.iter().map(|&j| signals[j].active()).collect();
                let active = match op {
                    GateOp::And => inputs.iter().all(|&b| b),
                    GateOp::Or => inputs.iter().any(|&b| b),
                    GateOp::Not => !inputs[0],
                    GateOp::Xor => inputs[0] != inputs[1],
                };
                Signal::flag(active)
            }
            // Several signal edges into one output combine like AND.
            NodeKind::Output(_) => Signal::flag(node.inputs.iter().all(|&j| signals[j].active())),
            NodeKind::Router(_) => Signal::flag(false),
        };
        signals[i] = signal;
    }

    let active_outputs = pattern
        .outputs
        .iter()
        .copied()
        .filter(|&i| signals[i].active())
        .collect();

    Ok(Evaluation {
        signals,
        active_outputs,
    })
}

fn filter_matches(filter: &EventFilter, event: &DiscreteEvent, identity: &Identity) -> bool {
    match filter {
        EventFilter::Any => true,
        EventFilter::SelfActor => event.actor.as_deref().is_some_and(|a| identity.is_self(a)),
        EventFilter::TrackedEnemy => event.actor.as_deref().is_some_and(|a| identity.is_tracked_enemy(a)),
        EventFilter::TextContains(needle) => event
            .text
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&needle.to_lowercase())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EvalStatus {
    Evaluated,
    Disabled,
    Faulted,
}

/// Per-pattern snapshot of the last tick, for the authoring surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternDiagnostics {
    pub frame: u64,
    pub at_ms: u64,
    pub status: EvalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    pub nodes: BTreeMap<String, Signal>,
    /// Output nodes that fired this tick.
    pub fired: Vec<String>,
    pub last_fired_at: Option<u64>,
}

pub type DiagnosticsBoard = BTreeMap<String, PatternDiagnostics>;

impl PatternDiagnostics {
    pub fn from_evaluation(pattern: &CompiledPattern, eval: &Evaluation, frame: u64, at_ms: u64) -> Self {
        Self {
            frame,
            at_ms,
            status: EvalStatus::Evaluated,
            fault: None,
            nodes: pattern
                .nodes
                .iter()
                .zip(&eval.signals)
                .map(|(n, s)| (n.id.clone(), *s))
                .collect(),
            fired: Vec::new(),
            last_fired_at: None,
        }
    }

    pub fn idle(status: EvalStatus, fault: Option<String>, frame: u64, at_ms: u64) -> Self {
        Self {
            frame,
            at_ms,
            status,
            fault,
            nodes: BTreeMap::new(),
            fired: Vec::new(),
            last_fired_at: None,
        }
    }
}
