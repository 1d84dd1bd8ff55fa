//! Append-only transcript of stage messages, one file per run.
//!
//! Each entry is written as `"<speaker>: <text>\n\n"` with a single
//! `write_all`, so entries never interleave. The controller is the only
//! writer.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::{Message, RedlineError, Result};

/// Sink for transcript entries.
pub trait Transcript: Send + Sync {
    /// Append one message. Failures are reported, never fatal to the run.
    fn record(&self, message: &Message) -> Result<()>;

    /// Where the transcript lives, when it is backed by a file.
    fn location(&self) -> Option<&Path>;
}

/// Render a transcript entry.
pub fn format_entry(message: &Message) -> String {
    format!("{}: {}\n\n", message.speaker, message.content)
}

/// Log file name for a run started at `started_at` (second granularity).
pub fn log_file_name(started_at: DateTime<Utc>) -> String {
    format!("conversation_{}.log", started_at.format("%Y-%m-%d_%H-%M-%S"))
}

/// File-backed transcript.
#[derive(Debug)]
pub struct FileTranscript {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileTranscript {
    /// Open (or reuse) the log file for a run under `log_dir`.
    ///
    /// The directory is created if needed. An existing file with the same
    /// name is appended to, never truncated.
    pub fn create(log_dir: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .map_err(|e| RedlineError::Logging(format!("create {}: {e}", log_dir.display())))?;
        Self::open(log_dir.join(log_file_name(started_at)))
    }

    /// Open an explicit log path in append mode.
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RedlineError::Logging(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transcript for FileTranscript {
    fn record(&self, message: &Message) -> Result<()> {
        let entry = format_entry(message);
        let mut file = self
            .file
            .lock()
            .map_err(|_| RedlineError::Logging("transcript lock poisoned".to_string()))?;
        file.write_all(entry.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| RedlineError::Logging(format!("write {}: {e}", self.path.display())))
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Transcript that keeps nothing, for runs whose log folder is unusable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardTranscript;

impl Transcript for DiscardTranscript {
    fn record(&self, _message: &Message) -> Result<()> {
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        None
    }
}
