//! Facts persisted across runs in `<workdir>/memory.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::facts::{dedupe_facts, parse_fact_array};
use crate::io::config::write_atomic;
use crate::io::prompt::render_compaction_prompt;

pub const MEMORY_FILE_NAME: &str = "memory.json";

/// JSON array of fact strings on disk.
#[derive(Debug, Clone)]
pub struct FactStore {
    path: PathBuf,
}

impl FactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_workdir(workdir: &Path) -> Self {
        Self::new(workdir.join(MEMORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored facts; a missing file means none.
    pub fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let facts: Vec<String> = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", self.path.display()))?;
        debug!(count = facts.len(), "loaded facts");
        Ok(facts)
    }

    pub fn save(&self, facts: &[String]) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(facts).context("serialize facts")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)?;
        info!(count = facts.len(), path = %self.path.display(), "saved facts");
        Ok(())
    }
}

/// Ask the model to consolidate `facts`.
///
/// An empty consolidated list is treated as a bad answer and the original
/// facts are kept.
pub fn compact_facts<F>(facts: &[String], mut ask: F) -> Result<Vec<String>>
where
    F: FnMut(&str) -> Result<String>,
{
    let prompt = render_compaction_prompt(facts)?;
    let reply = ask(&prompt).context("compaction request")?;
    let compacted = parse_fact_array(&reply)?;
    if compacted.is_empty() {
        return Ok(facts.to_vec());
    }
    Ok(dedupe_facts(compacted))
}
