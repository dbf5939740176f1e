#![allow(dead_code)]

use anyhow::Result;
use claude_ledger::models::LogFile;
use claude_ledger::session_utils::SessionUtils;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One usage line. `None` fields are left out of the JSON entirely.
#[derive(Debug, Clone, Default)]
pub struct Line {
    pub timestamp: String,
    pub input: u64,
    pub output: u64,
    pub model: Option<String>,
    pub cost: Option<f64>,
    pub message_id: Option<String>,
    pub request_id: Option<String>,
    pub version: Option<String>,
}

impl Line {
    pub fn new(timestamp: &str, input: u64, output: u64) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            input,
            output,
            ..Default::default()
        }
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn ids(mut self, message_id: &str, request_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn to_json(&self) -> String {
        let mut message = json!({
            "usage": { "input_tokens": self.input, "output_tokens": self.output }
        });
        if let Some(model) = &self.model {
            message["model"] = json!(model);
        }
        if let Some(id) = &self.message_id {
            message["id"] = json!(id);
        }

        let mut line = json!({ "timestamp": self.timestamp, "message": message });
        if let Some(cost) = self.cost {
            line["costUSD"] = json!(cost);
        }
        if let Some(request_id) = &self.request_id {
            line["requestId"] = json!(request_id);
        }
        if let Some(version) = &self.version {
            line["version"] = Value::String(version.clone());
        }
        line.to_string()
    }
}

/// A temp directory laid out like a Claude data root: `<root>/projects/...`.
pub fn setup_claude_root() -> Result<TempDir> {
    let dir = TempDir::new()?;
    fs::create_dir_all(dir.path().join("projects"))?;
    Ok(dir)
}

/// Write raw text to `<root>/projects/<relative>`, creating parent directories.
pub fn create_test_jsonl(root: &Path, relative: &str, content: &str) -> Result<PathBuf> {
    let path = root.join("projects").join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

/// Write usage lines as a session log and return it as a [`LogFile`].
pub fn write_session(root: &Path, relative: &str, lines: &[Line]) -> Result<LogFile> {
    let content: String = lines.iter().map(|l| l.to_json() + "\n").collect();
    let path = create_test_jsonl(root, relative, &content)?;
    Ok(SessionUtils::log_file(path))
}
