use thiserror::Error;

/// Reasons a pattern graph is refused at install time. A graph that produces any of these
/// never reaches the evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("malformed pattern definition: {0}")]
    Malformed(String),

    #[error("pattern id must not be empty")]
    EmptyPatternId,

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("edge '{edge}' references unknown node '{node}'")]
    DanglingEdge { edge: String, node: String },

    #[error("graph contains a cycle through node '{0}'")]
    Cycle(String),

    #[error("node '{node}' uses unknown parameter '{parameter}'")]
    UnknownParameter { node: String, parameter: String },

    #[error("node '{node}' uses unknown event kind '{kind}'")]
    UnknownEventKind { node: String, kind: String },

    #[error("node '{0}' is a source and cannot have inbound edges")]
    InboundIntoSource(String),

    #[error("node '{0}' is a sink and cannot have outbound edges")]
    OutboundFromSink(String),

    #[error("node '{node}' expects {expected} input(s), found {found}")]
    Arity { node: String, expected: &'static str, found: usize },

    #[error("output node '{0}' is bound to more than one device router")]
    MultipleRouters(String),

    #[error("node '{node}': invalid curve ({reason})")]
    InvalidCurve { node: String, reason: String },

    #[error("node '{0}': duration must be a positive finite number of seconds")]
    InvalidDuration(String),

    #[error("node '{0}': repeat mode needs repeatCount >= 1")]
    InvalidRepeatCount(String),

    #[error("node '{0}': random range must satisfy 0 <= min <= max")]
    InvalidRandomRange(String),

    #[error("node '{0}': windowed comparators are only valid on sensor inputs")]
    WindowedOutsideSensor(String),

    #[error("node '{0}': threshold must be finite")]
    NonFiniteThreshold(String),

    #[error("node '{0}': multi-condition needs at least one clause")]
    EmptyMultiCondition(String),
}

/// Failure to fetch telemetry from the game adapter. Always transient: the tick proceeds
/// with "no new data".
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry source unavailable: {0}")]
    Unavailable(String),

    #[error("telemetry request timed out")]
    Timeout,

    #[error("telemetry payload could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TelemetryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TelemetryError::Timeout
        } else if e.is_decode() {
            TelemetryError::Decode(e.to_string())
        } else {
            TelemetryError::Unavailable(e.to_string())
        }
    }
}

/// Per-command device failure. Dropped after logging; never blocks other devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device '{device}' unreachable: {reason}")]
    Unreachable { device: String, reason: String },

    #[error("device '{0}' did not answer in time")]
    Timeout(String),
}

/// Runtime fault raised while evaluating one pattern. The pattern is skipped for the tick;
/// other patterns are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalFault {
    #[error("sensor '{parameter}' reported a non-finite value")]
    NonFiniteInput { parameter: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("pattern '{0}' is not installed")]
    PatternNotFound(String),

    #[error("engine is not running")]
    EngineStopped,

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
