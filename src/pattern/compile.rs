use std::collections::{HashMap, VecDeque};

use super::curve::Curve;
use super::model::{
    Clause, Comparator, EventFilter, GateOp, MultiLogic, NodeSpec, OutputClass, OutputSpec, PatternGraph, PlayMode,
    RandomRange, RouteMode,
};
use crate::error::ValidationError;
use crate::kernel::event::{EventKind, Parameter};

pub type NodeIndex = usize;

/// Sensor windows default to one second when a windowed comparator omits `windowMs`.
pub const DEFAULT_WINDOW_MS: u64 = 1000;

/// Longest single cycle an output may play.
pub const MAX_DURATION_MS: u64 = 3_600_000;

/// Handle name that binds a router to an output.
pub const DEVICE_HANDLE: &str = "device";

/// A validated, installable pattern. Built only by [`compile`]; the evaluator never sees a
/// graph that failed validation.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub cooldown_ms: u64,
    pub nodes: Vec<CompiledNode>,
    /// Evaluation order: every node appears after all of its inputs.
    pub order: Vec<NodeIndex>,
    pub outputs: Vec<NodeIndex>,
    pub source: PatternGraph,
}

#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: String,
    pub kind: NodeKind,
    pub inputs: Vec<NodeIndex>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Sensor {
        parameter: Parameter,
        comparator: Comparator,
        threshold: f64,
        window_ms: u64,
    },
    Event {
        kind: EventKind,
        filter: EventFilter,
    },
    Condition {
        comparator: Comparator,
        value: f64,
    },
    MultiCondition {
        logic: MultiLogic,
        clauses: Vec<Clause>,
    },
    Gate(GateOp),
    Output(OutputNode),
    Router(Route),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub mode: RouteMode,
    pub targets: Vec<String>,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            mode: RouteMode::All,
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputNode {
    pub class: OutputClass,
    pub play: PlaySpec,
    pub route: Route,
}

#[derive(Debug, Clone)]
pub struct PlaySpec {
    pub duration_ms: u64,
    pub curve: Curve,
    pub mode: PlayMode,
    pub repeat_count: u32,
    pub jitter: Option<RandomRange>,
    /// Only set for rotation outputs.
    pub direction: Option<bool>,
}

impl CompiledPattern {
    pub fn index_of(&self, node_id: &str) -> Option<NodeIndex> {
        self.nodes.iter().position(|n| n.id == node_id)
    }

    pub fn output(&self, index: NodeIndex) -> Option<&OutputNode> {
        match &self.nodes.get(index)?.kind {
            NodeKind::Output(out) => Some(out),
            _ => None,
        }
    }
}

enum Role {
    Source,
    Inner,
    Output,
    Router,
}

fn role(spec: &NodeSpec) -> Role {
    match spec {
        NodeSpec::SensorInput { .. } | NodeSpec::EventTrigger { .. } => Role::Source,
        NodeSpec::Condition { .. } | NodeSpec::MultiCondition { .. } | NodeSpec::LogicGate { .. } => Role::Inner,
        NodeSpec::OutputVibration(_) | NodeSpec::OutputLinear(_) | NodeSpec::OutputRotate(_) => Role::Output,
        NodeSpec::DeviceRouter { .. } => Role::Router,
    }
}

/// Validates a pattern graph and resolves it into evaluation form. Any structural or
/// semantic problem rejects the whole graph.
pub fn compile(graph: &PatternGraph) -> Result<CompiledPattern, ValidationError> {
    if graph.id.trim().is_empty() {
        return Err(ValidationError::EmptyPatternId);
    }

    // === 1. NODE IDS ===
    let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(graph.nodes.len());
    for (i, node) in graph.nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(ValidationError::DuplicateNode(node.id.clone()));
        }
    }

    // === 2. EDGES ===
    let n = graph.nodes.len();
    let mut inputs: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    let mut bindings: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];

    for edge in &graph.edges {
        let src = *index.get(edge.source.as_str()).ok_or_else(|| ValidationError::DanglingEdge {
            edge: edge.id.clone(),
            node: edge.source.clone(),
        })?;
        let dst = *index.get(edge.target.as_str()).ok_or_else(|| ValidationError::DanglingEdge {
            edge: edge.id.clone(),
            node: edge.target.clone(),
        })?;
        let src_def = &graph.nodes[src];
        let dst_def = &graph.nodes[dst];

        match (role(&src_def.spec), role(&dst_def.spec)) {
            // Router edges carry device bindings, not signal.
            (Role::Router, Role::Output) => {
                if !bindings[dst].contains(&src) {
                    bindings[dst].push(src);
                }
            }
            (Role::Router, _) | (Role::Output, _) => {
                return Err(ValidationError::OutboundFromSink(src_def.id.clone()));
            }
            (_, Role::Source) => return Err(ValidationError::InboundIntoSource(dst_def.id.clone())),
            (_, Role::Router) => {
                return Err(ValidationError::Arity {
                    node: dst_def.id.clone(),
                    expected: "0",
                    found: 1,
                });
            }
            _ => {
                if edge.target_handle.as_deref() == Some(DEVICE_HANDLE) {
                    return Err(ValidationError::Malformed(format!(
                        "edge '{}' uses the device handle but does not start at a router",
                        edge.id
                    )));
                }
                inputs[dst].push(src);
            }
        }
    }

    // === 3. ORDER ===
    let order = topological_order(&inputs).map_err(|i| ValidationError::Cycle(graph.nodes[i].id.clone()))?;

    // === 4. NODE SEMANTICS ===
    let mut nodes = Vec::with_capacity(n);
    let mut outputs = Vec::new();
    for (i, def) in graph.nodes.iter().enumerate() {
        let id = def.id.clone();
        let arity = inputs[i].len();
        let kind = match &def.spec {
            NodeSpec::SensorInput {
                parameter,
                comparator,
                threshold,
                window_ms,
            } => {
                let parameter = parameter.parse::<Parameter>().map_err(|p| ValidationError::UnknownParameter {
                    node: id.clone(),
                    parameter: p,
                })?;
                if !threshold.is_finite() {
                    return Err(ValidationError::NonFiniteThreshold(id));
                }
                NodeKind::Sensor {
                    parameter,
                    comparator: *comparator,
                    threshold: *threshold,
                    window_ms: window_ms.unwrap_or(DEFAULT_WINDOW_MS),
                }
            }
            NodeSpec::EventTrigger { event_kind, filter } => {
                let kind = event_kind.parse::<EventKind>().map_err(|k| ValidationError::UnknownEventKind {
                    node: id.clone(),
                    kind: k,
                })?;
                NodeKind::Event {
                    kind,
                    filter: filter.clone(),
                }
            }
            NodeSpec::Condition { comparator, value } => {
                expect_arity(&id, arity, "1", arity == 1)?;
                check_instant(&id, *comparator, *value)?;
                NodeKind::Condition {
                    comparator: *comparator,
                    value: *value,
                }
            }
            NodeSpec::MultiCondition { logic, conditions } => {
                expect_arity(&id, arity, "1", arity == 1)?;
                if conditions.is_empty() {
                    return Err(ValidationError::EmptyMultiCondition(id));
                }
                for clause in conditions {
                    check_instant(&id, clause.comparator, clause.value)?;
                }
                NodeKind::MultiCondition {
                    logic: *logic,
                    clauses: conditions.clone(),
                }
            }
            NodeSpec::LogicGate { op } => {
                match op {
                    GateOp::And | GateOp::Or => expect_arity(&id, arity, ">= 1", arity >= 1)?,
                    GateOp::Not => expect_arity(&id, arity, "1", arity == 1)?,
                    GateOp::Xor => expect_arity(&id, arity, "2", arity == 2)?,
                }
                NodeKind::Gate(*op)
            }
            NodeSpec::OutputVibration(spec) | NodeSpec::OutputLinear(spec) | NodeSpec::OutputRotate(spec) => {
                expect_arity(&id, arity, ">= 1", arity >= 1)?;
                let class = match &def.spec {
                    NodeSpec::OutputLinear(_) => OutputClass::Linear,
                    NodeSpec::OutputRotate(_) => OutputClass::Rotation,
                    _ => OutputClass::Vibration,
                };
                let route = match bindings[i].as_slice() {
                    [] => Route::default(),
                    [router] => router_route(&graph.nodes[*router].spec),
                    _ => return Err(ValidationError::MultipleRouters(id)),
                };
                outputs.push(i);
                NodeKind::Output(OutputNode {
                    class,
                    play: play_spec(&id, spec, class)?,
                    route,
                })
            }
            NodeSpec::DeviceRouter { .. } => NodeKind::Router(router_route(&def.spec)),
        };
        nodes.push(CompiledNode {
            id: def.id.clone(),
            kind,
            inputs: inputs[i].clone(),
        });
    }

    Ok(CompiledPattern {
        id: graph.id.clone(),
        name: graph.name.clone(),
        enabled: graph.enabled,
        cooldown_ms: graph.cooldown_ms,
        nodes,
        order,
        outputs,
        source: graph.clone(),
    })
}

fn expect_arity(node: &str, found: usize, expected: &'static str, ok: bool) -> Result<(), ValidationError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::Arity {
            node: node.to_string(),
            expected,
            found,
        })
    }
}

fn check_instant(node: &str, comparator: Comparator, value: f64) -> Result<(), ValidationError> {
    if comparator.is_windowed() {
        return Err(ValidationError::WindowedOutsideSensor(node.to_string()));
    }
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteThreshold(node.to_string()));
    }
    Ok(())
}

fn router_route(spec: &NodeSpec) -> Route {
    match spec {
        NodeSpec::DeviceRouter { mode, targets } => Route {
            mode: *mode,
            targets: targets.clone(),
        },
        _ => Route::default(),
    }
}

fn play_spec(node: &str, spec: &OutputSpec, class: OutputClass) -> Result<PlaySpec, ValidationError> {
    if !spec.duration.is_finite() || spec.duration <= 0.0 {
        return Err(ValidationError::InvalidDuration(node.to_string()));
    }
    let duration_ms = (spec.duration * 1000.0).round() as u64;
    if duration_ms == 0 || duration_ms > MAX_DURATION_MS {
        return Err(ValidationError::InvalidDuration(node.to_string()));
    }
    if spec.mode == PlayMode::Repeat && spec.repeat_count == 0 {
        return Err(ValidationError::InvalidRepeatCount(node.to_string()));
    }
    if let Some(range) = spec.random_range {
        let ok = range.min.is_finite() && range.max.is_finite() && range.min >= 0.0 && range.min <= range.max;
        if !ok {
            return Err(ValidationError::InvalidRandomRange(node.to_string()));
        }
    }
    let curve = Curve::new(spec.curve.clone()).map_err(|reason| ValidationError::InvalidCurve {
        node: node.to_string(),
        reason,
    })?;

    Ok(PlaySpec {
        duration_ms,
        curve,
        mode: spec.mode,
        repeat_count: spec.repeat_count.max(1),
        jitter: spec.random_range,
        direction: match class {
            OutputClass::Rotation => Some(spec.clockwise.unwrap_or(true)),
            _ => None,
        },
    })
}

/// Kahn's algorithm seeded in definition order, so the result is stable for a given graph.
/// On failure returns a node that sits on (or behind) a cycle.
fn topological_order(inputs: &[Vec<NodeIndex>]) -> Result<Vec<NodeIndex>, NodeIndex> {
    let n = inputs.len();
    let mut pending: Vec<usize> = inputs.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    for (node, srcs) in inputs.iter().enumerate() {
        for &src in srcs {
            dependents[src].push(node);
        }
    }

    let mut ready: VecDeque<NodeIndex> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &dependents[node] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).find(|&i| pending[i] > 0).unwrap_or(0))
    }
}
