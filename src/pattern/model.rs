use serde::{Deserialize, Serialize};

/// A user-authored rule graph as exchanged with the authoring surface and stored in pattern
/// libraries. This is the unvalidated wire form; see `compile` for the installed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternGraph {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(flatten)]
    pub spec: NodeSpec,
}

/// Node kinds, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum NodeSpec {
    #[serde(rename = "input")]
    SensorInput {
        parameter: String,
        comparator: Comparator,
        threshold: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_ms: Option<u64>,
    },
    #[serde(rename = "event")]
    EventTrigger {
        event_kind: String,
        #[serde(default)]
        filter: EventFilter,
    },
    #[serde(rename = "condition")]
    Condition { comparator: Comparator, value: f64 },
    #[serde(rename = "multiCondition")]
    MultiCondition {
        logic: MultiLogic,
        conditions: Vec<Clause>,
    },
    #[serde(rename = "logic")]
    LogicGate { op: GateOp },
    #[serde(rename = "vibration")]
    OutputVibration(OutputSpec),
    #[serde(rename = "linear")]
    OutputLinear(OutputSpec),
    #[serde(rename = "rotate")]
    OutputRotate(OutputSpec),
    #[serde(rename = "router")]
    DeviceRouter {
        mode: RouteMode,
        #[serde(default)]
        targets: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDef {
    #[serde(default)]
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==", alias = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "dropped_by")]
    DroppedBy,
    #[serde(rename = "increased_by")]
    IncreasedBy,
    #[serde(rename = "avg_above")]
    AvgAbove,
    #[serde(rename = "avg_below")]
    AvgBelow,
}

const EQ_TOLERANCE: f64 = 1e-9;

impl Comparator {
    /// Windowed comparators read sensor history instead of a single value.
    pub fn is_windowed(self) -> bool {
        matches!(
            self,
            Comparator::DroppedBy | Comparator::IncreasedBy | Comparator::AvgAbove | Comparator::AvgBelow
        )
    }

    /// Instant comparison. Windowed comparators never hold on a single value.
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Eq => (lhs - rhs).abs() <= EQ_TOLERANCE,
            Comparator::Ne => (lhs - rhs).abs() > EQ_TOLERANCE,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "camelCase")]
pub enum EventFilter {
    #[default]
    Any,
    #[serde(rename = "self")]
    SelfActor,
    TrackedEnemy,
    TextContains(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MultiLogic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub comparator: Comparator,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateOp {
    And,
    Or,
    Not,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    #[default]
    Once,
    Continuous,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    #[default]
    All,
    Type,
    Specific,
}

/// Semantic class of an output node and of a device actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputClass {
    Vibration,
    Linear,
    Rotation,
}

impl OutputClass {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vibration" | "vibrate" => Some(OutputClass::Vibration),
            "linear" => Some(OutputClass::Linear),
            "rotation" | "rotate" => Some(OutputClass::Rotation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

impl CurvePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Seconds.
    pub duration: f64,
    pub curve: Vec<CurvePoint>,
    #[serde(default)]
    pub mode: PlayMode,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_range: Option<RandomRange>,
    /// Rotation direction; only meaningful on rotate outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clockwise: Option<bool>,
}

fn default_repeat_count() -> u32 {
    1
}

impl PatternGraph {
    pub fn from_json(json: &str) -> Result<Self, crate::error::ValidationError> {
        serde_json::from_str(json).map_err(|e| crate::error::ValidationError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
