// src/store/file.rs

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::dag::WorkflowRun;
use crate::store::RunStore;
use crate::types::RunKey;

/// Directory (relative to the state dir) that holds run records.
///
/// The effective layout on disk is:
///
/// `<state_dir>/runs/<workflow_id>/<YYYYMMDDTHHMMSS.nnnnnnnnnZ>.json`
///
/// The name carries the full nanosecond precision of `scheduled_for`, so two
/// manual runs in the same second never share a record.
pub const RUNS_DIR: &str = "runs";

/// Stores each run as a JSON document.
///
/// Writes go to a temporary file that is then renamed over the record, so a
/// crash mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct FileRunStore {
    root: PathBuf,
}

impl FileRunStore {
    /// Open (and create if needed) the store under `state_dir`.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let root = state_dir.as_ref().join(RUNS_DIR);
        fs::create_dir_all(&root)
            .with_context(|| format!("creating run store directory at {:?}", root))?;
        info!(path = ?root, "opened file run store");
        Ok(Self { root })
    }

    fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        self.root.join(sanitize(workflow_id))
    }

    fn record_path(&self, key: &RunKey) -> PathBuf {
        self.workflow_dir(&key.workflow_id).join(format!(
            "{}.json",
            key.scheduled_for.format("%Y%m%dT%H%M%S%.9fZ")
        ))
    }

    fn read_record(path: &Path) -> Result<WorkflowRun> {
        let file = File::open(path).with_context(|| format!("opening run record {:?}", path))?;
        let run = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing run record {:?}", path))?;
        Ok(run)
    }

    fn read_dir_records(dir: &Path, out: &mut Vec<WorkflowRun>) -> Result<()> {
        for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path) {
                Ok(run) => out.push(run),
                // Unreadable records are skipped, the rest still load.
                Err(err) => warn!(path = ?path, error = %err, "skipping unreadable run record"),
            }
        }
        Ok(())
    }
}

impl RunStore for FileRunStore {
    fn save(&self, run: &WorkflowRun) -> Result<()> {
        let path = self.record_path(&run.key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating run directory at {:?}", parent))?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)
                .with_context(|| format!("creating run record at {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, run)
                .with_context(|| format!("serializing run {}", run.key))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("moving run record into place at {:?}", path))?;

        debug!(run = %run.key, state = ?run.state, "stored run (file)");
        Ok(())
    }

    fn get(&self, key: &RunKey) -> Result<Option<WorkflowRun>> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let run = Self::read_record(&path)?;
        if run.key != *key {
            warn!(path = ?path, requested = %key, stored = %run.key, "run record holds a different key; ignoring");
            return Ok(None);
        }
        Ok(Some(run))
    }

    fn list(&self, workflow_id: Option<&str>) -> Result<Vec<WorkflowRun>> {
        let mut runs = Vec::new();

        match workflow_id {
            Some(id) => {
                let dir = self.workflow_dir(id);
                if dir.is_dir() {
                    Self::read_dir_records(&dir, &mut runs)?;
                }
            }
            None => {
                for entry in fs::read_dir(&self.root)
                    .with_context(|| format!("reading dir {:?}", self.root))?
                {
                    let path = entry?.path();
                    if path.is_dir() {
                        Self::read_dir_records(&path, &mut runs)?;
                    }
                }
            }
        }

        runs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(runs)
    }
}

/// Keep workflow ids usable as a single path component.
fn sanitize(workflow_id: &str) -> String {
    workflow_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
