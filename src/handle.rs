use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::kernel::evaluator::{DiagnosticsBoard, PatternDiagnostics};
use crate::kernel::event::Event;
use crate::kernel::reactor::{Reactor, ReactorOutlets};
use crate::kernel::state::PatternDelta;
use crate::kernel::telemetry::event::EngineEvent;
use crate::outputs::devices::DeviceCommand;
use crate::pattern::compile::compile;
use crate::pattern::model::PatternGraph;

const INBOX_CAPACITY: usize = 256;
const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 1024;

/// Cloneable front door to a running engine. Admin calls validate synchronously and then
/// queue the change; the reactor applies it before its next evaluation.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Event>,
    board: watch::Receiver<Arc<DiagnosticsBoard>>,
    events: broadcast::Sender<EngineEvent>,
}

/// Everything needed to start an engine: the reactor, its outlets, and the far ends of its
/// channels.
pub struct EngineParts {
    pub reactor: Reactor,
    pub outlets: ReactorOutlets,
    pub handle: EngineHandle,
    pub commands: mpsc::Receiver<Vec<DeviceCommand>>,
}

pub fn build(config: &EngineConfig) -> EngineParts {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (board_tx, board_rx) = watch::channel(Arc::new(DiagnosticsBoard::new()));

    EngineParts {
        reactor: Reactor::new(rx, config),
        outlets: ReactorOutlets {
            commands: cmd_tx,
            events: events.clone(),
            diagnostics: board_tx,
        },
        handle: EngineHandle {
            tx,
            board: board_rx,
            events,
        },
        commands: cmd_rx,
    }
}

impl EngineHandle {
    /// Validates and queues a pattern. An id that is already installed is replaced as a
    /// whole. Returns the pattern id.
    pub async fn load_or_replace_pattern(&self, graph: PatternGraph) -> Result<String, EngineError> {
        let compiled = compile(&graph)?;
        let id = compiled.id.clone();
        self.send(Event::Admin(PatternDelta::Install(Arc::new(compiled)))).await?;
        Ok(id)
    }

    pub async fn remove_pattern(&self, id: &str) -> Result<(), EngineError> {
        self.send(Event::Admin(PatternDelta::Remove(id.to_string()))).await
    }

    pub async fn set_pattern_enabled(&self, id: &str, enabled: bool) -> Result<(), EngineError> {
        self.send(Event::Admin(PatternDelta::SetEnabled {
            id: id.to_string(),
            enabled,
        }))
        .await
    }

    /// Last published per-node values for one pattern.
    pub fn diagnostics(&self, id: &str) -> Result<PatternDiagnostics, EngineError> {
        self.board
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::PatternNotFound(id.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Inbox sender for producers such as the telemetry poller.
    pub fn inbox(&self) -> mpsc::Sender<Event> {
        self.tx.clone()
    }

    async fn send(&self, event: Event) -> Result<(), EngineError> {
        self.tx.send(event).await.map_err(|_| EngineError::EngineStopped)
    }
}
