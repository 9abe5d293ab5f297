//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use arbor_core::{BranchInfo, Commit, FileState, Hash, TreeEntry};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(
        &self,
        data: &T,
        text_fn: impl FnOnce() -> String,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write raw bytes to stdout regardless of format.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut handle = self.stdout.lock();
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error message and its causes.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
    pub branch: String,
}

/// File staged by `add`.
#[derive(Debug, Clone, Serialize)]
pub struct StagedFile {
    pub path: String,
    pub mode: String,
    pub hash: Hash,
}

/// Output for `add` command.
#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub result_code: u8,
    pub staged: Vec<StagedFile>,
}

/// Output for `rm` command.
#[derive(Debug, Serialize)]
pub struct RmOutput {
    pub success: bool,
    pub result_code: u8,
    pub removed: Vec<String>,
    /// Paths that were not in the index.
    pub not_tracked: Vec<String>,
}

/// One tracked path for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatusInfo {
    pub path: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash>,
}

impl FileStatusInfo {
    pub fn new(path: &str, state: &FileState) -> Self {
        let (state, hash) = match state {
            FileState::Unmodified => ("unmodified", None),
            FileState::Modified { hash, .. } => ("modified", Some(*hash)),
            FileState::Deleted => ("deleted", None),
        };
        Self {
            path: path.to_string(),
            state,
            hash,
        }
    }
}

/// Output for `status` command.
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Hash>,
    pub tracked: usize,
    pub changes: Vec<FileStatusInfo>,
}

/// Output for `write-tree` command.
#[derive(Debug, Serialize)]
pub struct WriteTreeOutput {
    pub success: bool,
    pub result_code: u8,
    pub tree: Hash,
}

/// Output for `commit` command.
#[derive(Debug, Serialize)]
pub struct CommitOutput {
    pub success: bool,
    pub result_code: u8,
    pub commit: Hash,
    pub tree: Hash,
    pub parents: Vec<Hash>,
    /// Reference that was moved.
    pub reference: String,
    pub summary: String,
}

/// Commit information for `log`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub hash: Hash,
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub author: String,
    pub email: String,
    pub date: DateTime<FixedOffset>,
    pub message: String,
}

impl CommitInfo {
    pub fn new(hash: Hash, commit: &Commit) -> Self {
        Self {
            hash,
            tree: commit.tree,
            parents: commit.parents.clone(),
            author: commit.author.name.clone(),
            email: commit.author.email.clone(),
            date: commit.author.when,
            message: commit.message.clone(),
        }
    }
}

/// Output for `log` command.
#[derive(Debug, Serialize)]
pub struct LogOutput {
    pub success: bool,
    pub result_code: u8,
    pub commits: Vec<CommitInfo>,
}

/// Branch information for `branches`.
#[derive(Debug, Clone, Serialize)]
pub struct BranchEntry {
    pub name: String,
    pub commit: Hash,
    pub tree: Hash,
    pub author: String,
    pub date: DateTime<FixedOffset>,
    pub summary: String,
    pub is_head: bool,
}

impl From<BranchInfo> for BranchEntry {
    fn from(branch: BranchInfo) -> Self {
        Self {
            name: branch.name,
            commit: branch.commit,
            tree: branch.tree,
            author: branch.author.name,
            date: branch.author.when,
            summary: branch.summary,
            is_head: branch.is_head,
        }
    }
}

/// Output for `branches` command.
#[derive(Debug, Serialize)]
pub struct BranchesOutput {
    pub success: bool,
    pub result_code: u8,
    pub branches: Vec<BranchEntry>,
}

/// Tree entry information for `ls` command.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntryInfo {
    pub name: String,
    pub mode: String,
    pub entry_type: &'static str,
    pub hash: Hash,
}

impl From<&TreeEntry> for TreeEntryInfo {
    fn from(entry: &TreeEntry) -> Self {
        Self {
            name: entry.name.clone(),
            mode: entry.mode.to_string(),
            entry_type: if entry.mode.is_dir() { "tree" } else { "blob" },
            hash: entry.hash,
        }
    }
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub hash: Hash,
    pub entries: Vec<TreeEntryInfo>,
}
