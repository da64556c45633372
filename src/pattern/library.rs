use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::PatternGraph;
use crate::error::ValidationError;

/// Pattern files come either as a bare array or wrapped in `{"patterns": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryFile {
    Bare(Vec<PatternGraph>),
    Wrapped { patterns: Vec<PatternGraph> },
}

#[derive(Serialize)]
struct LibraryFileOut<'a> {
    patterns: &'a [PatternGraph],
}

/// On-disk collection of authored patterns. Import and export only; installation goes through
/// the engine handle so every graph is validated before it can run.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    pub patterns: Vec<PatternGraph>,
}

impl PatternLibrary {
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let file: LibraryFile = serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let mut patterns = match file {
            LibraryFile::Bare(p) => p,
            LibraryFile::Wrapped { patterns } => patterns,
        };
        for pattern in &mut patterns {
            if pattern.id.trim().is_empty() {
                pattern.id = Uuid::new_v4().to_string();
            }
        }
        Ok(Self { patterns })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&LibraryFileOut {
            patterns: &self.patterns,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading pattern library {}", path.display()))?;
        let lib = Self::from_json(&raw).with_context(|| format!("parsing pattern library {}", path.display()))?;
        info!("Loaded {} pattern(s) from {}", lib.patterns.len(), path.display());
        Ok(lib)
    }

    /// Like [`load`](Self::load) but a missing or broken file yields an empty library.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(lib) => lib,
            Err(e) => {
                warn!("Pattern library unavailable, starting empty: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).with_context(|| format!("writing pattern library {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PatternGraph> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Inserts or replaces by id.
    pub fn upsert(&mut self, pattern: PatternGraph) {
        match self.patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(slot) => *slot = pattern,
            None => self.patterns.push(pattern),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<PatternGraph> {
        let pos = self.patterns.iter().position(|p| p.id == id)?;
        Some(self.patterns.remove(pos))
    }
}
