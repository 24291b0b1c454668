//! Image analysis through an external program.
//!
//! The analyzer is a narrow seam: image bytes in, free text out. The shipped
//! [`CommandAnalyzer`] pipes the original file to a configured command's
//! stdin and takes its stdout as the description. Any failure becomes
//! [`Analysis::Unavailable`]; it is logged and never fails the item.

use crate::batch::Batch;
use serde::Serialize;
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("could not start analyzer: {0}")]
    Spawn(std::io::Error),
    #[error("analyzer IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("analyzer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("analyzer returned no text")]
    Empty,
}

/// Descriptive text for one image, or the fact that none could be had.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Analysis {
    Text(String),
    Unavailable,
}

impl Analysis {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Unavailable => None,
        }
    }
}

/// Bytes → text.
pub trait Analyzer {
    fn describe(&self, image: &[u8]) -> Result<String, AnalysisError>;
}

/// Runs a program per image: bytes on stdin, description on stdout.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    /// Build from `[program, args...]`. An empty command means analysis is off.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Analyzer for CommandAnalyzer {
    fn describe(&self, image: &[u8]) -> Result<String, AnalysisError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(AnalysisError::Spawn)?;

        let stdin = child.stdin.take();
        let output = std::thread::scope(|s| {
            // Feed stdin on its own thread so a chatty child can't deadlock us.
            let writer = s.spawn(move || match stdin {
                Some(mut pipe) => pipe.write_all(image),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            if let Ok(Err(e)) = writer.join() {
                // A child that exits without reading all of stdin is fine.
                tracing::debug!(error = %e, "analyzer stdin closed early");
            }
            output
        })?;

        if !output.status.success() {
            return Err(AnalysisError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(AnalysisError::Empty);
        }
        Ok(text)
    }
}

/// Describe one image, degrading any failure to `Unavailable`.
pub fn analyze(analyzer: &impl Analyzer, name: &str, image: &[u8]) -> Analysis {
    match analyzer.describe(image) {
        Ok(text) => Analysis::Text(text),
        Err(e) => {
            tracing::warn!(item = name, error = %e, "analysis unavailable");
            Analysis::Unavailable
        }
    }
}

/// Analyze every item that has no analysis yet. Returns how many were run.
pub fn analyze_batch(analyzer: &impl Analyzer, batch: &mut Batch) -> usize {
    let pending: Vec<_> = batch
        .items()
        .iter()
        .filter(|item| item.analysis.is_none())
        .map(|item| (item.id, item.name.clone(), item.source.clone()))
        .collect();
    let count = pending.len();
    for (id, name, source) in pending {
        let analysis = analyze(analyzer, &name, &source);
        batch.set_analysis(id, analysis);
    }
    count
}
