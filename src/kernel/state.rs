use std::collections::BTreeMap;
use std::sync::Arc;

use crate::pattern::compile::CompiledPattern;

/// Admin change to the installed pattern set. Queued by the handle, applied by the reactor
/// at the start of a tick, never mid-evaluation.
#[derive(Debug, Clone)]
pub enum PatternDelta {
    Install(Arc<CompiledPattern>),
    Remove(String),
    SetEnabled { id: String, enabled: bool },
}

#[derive(Debug, Clone)]
pub struct InstalledPattern {
    pub compiled: Arc<CompiledPattern>,
    pub enabled: bool,
    pub last_fired_at: Option<u64>,
}

impl InstalledPattern {
    /// Pattern-wide cooldown gate.
    pub fn cooldown_ready(&self, now_ms: u64) -> bool {
        match self.last_fired_at {
            Some(last) => now_ms.saturating_sub(last) >= self.compiled.cooldown_ms,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    Installed,
    Replaced,
    Removed,
    Toggled { enabled: bool, changed: bool },
    NotFound,
}

/// Installed patterns keyed by id. Mutated only through [`PatternSet::reduce`]; iteration is
/// in id order so evaluation order is stable.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: BTreeMap<String, InstalledPattern>,
    pub version: u64,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reduce(&mut self, delta: PatternDelta) -> DeltaOutcome {
        let outcome = match delta {
            PatternDelta::Install(compiled) => {
                let id = compiled.id.clone();
                let enabled = compiled.enabled;
                match self.patterns.get_mut(&id) {
                    // Replacement keeps the cooldown timer.
                    Some(slot) => {
                        slot.compiled = compiled;
                        slot.enabled = enabled;
                        DeltaOutcome::Replaced
                    }
                    None => {
                        self.patterns.insert(
                            id,
                            InstalledPattern {
                                compiled,
                                enabled,
                                last_fired_at: None,
                            },
                        );
                        DeltaOutcome::Installed
                    }
                }
            }
            PatternDelta::Remove(id) => match self.patterns.remove(&id) {
                Some(_) => DeltaOutcome::Removed,
                None => DeltaOutcome::NotFound,
            },
            PatternDelta::SetEnabled { id, enabled } => match self.patterns.get_mut(&id) {
                Some(slot) => {
                    let changed = slot.enabled != enabled;
                    slot.enabled = enabled;
                    DeltaOutcome::Toggled { enabled, changed }
                }
                None => DeltaOutcome::NotFound,
            },
        };
        if outcome != DeltaOutcome::NotFound {
            self.version += 1;
        }
        outcome
    }

    pub fn get(&self, id: &str) -> Option<&InstalledPattern> {
        self.patterns.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut InstalledPattern> {
        self.patterns.get_mut(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.patterns.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Session boundary: every pattern may fire again immediately.
    pub fn clear_cooldowns(&mut self) {
        for p in self.patterns.values_mut() {
            p.last_fired_at = None;
        }
    }
}
