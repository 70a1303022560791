//! JSONL transcript audit log.
//!
//! One line per finished request, appended and never rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::llm::Usage;
use crate::prompt::Step;
use crate::runner::{LoopOutcome, LoopReport};

const AUDIT_FILE: &str = "transcripts.jsonl";

/// One audited request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub prompt: String,
    pub started_ms: u64,
    pub finished_ms: u64,
    /// "done" or the failure kind
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub steps: u32,
    pub malformed: u32,
    pub usage: Usage,
    pub transcript: Vec<Step>,
}

impl AuditRecord {
    pub fn from_report(request_id: &str, prompt: &str, started_ms: u64, finished_ms: u64, report: &LoopReport) -> Self {
        let (outcome, answer) = match &report.outcome {
            LoopOutcome::Done(answer) => ("done".to_string(), Some(answer.clone())),
            LoopOutcome::Failed(err) => (err.kind().to_string(), None),
        };
        Self {
            request_id: request_id.to_string(),
            prompt: prompt.to_string(),
            started_ms,
            finished_ms,
            outcome,
            answer,
            steps: report.state.step,
            malformed: report.state.malformed,
            usage: report.usage,
            transcript: report.transcript.steps().to_vec(),
        }
    }
}

/// Append-only JSONL audit of finished transcripts.
pub struct TranscriptAudit {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TranscriptAudit {
    /// Create the audit log under `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(AUDIT_FILE),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record as one line.
    pub fn record(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| AgentError::Io(std::io::Error::other(e.to_string())))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        debug!("Audited request {} to {}", record.request_id, self.path.display());
        Ok(())
    }

    /// Read every record back, oldest first.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}
