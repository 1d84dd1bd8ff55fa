//! The document under revision and its editing requirements.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{RedlineError, Result};

/// Whitespace-delimited token count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Original text plus the best revision produced so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    original: String,
    current: String,
}

impl Document {
    /// Build a document from raw text. Surrounding whitespace is stripped.
    pub fn new(text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim().to_string();
        Self {
            current: text.clone(),
            original: text,
        }
    }

    /// Read the input artifact. A missing or non-UTF-8 file is an input error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RedlineError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let doc = Self::new(raw);
        if doc.original.is_empty() {
            return Err(RedlineError::InvalidInput(format!(
                "input document {} is empty",
                path.display()
            )));
        }
        Ok(doc)
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Replace the current best revision.
    pub fn revise(&mut self, text: impl Into<String>) {
        self.current = text.into();
    }
}

/// Ordered free-text editing constraints, fixed for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Requirements(Vec<String>);

impl Requirements {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            items
                .into_iter()
                .map(Into::into)
                .map(|s: String| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Parse one requirement per non-blank line; leading `-` or `*` bullets are dropped.
    pub fn parse(text: &str) -> Self {
        Self::new(text.lines().map(|line| {
            let line = line.trim();
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .unwrap_or(line)
                .to_string()
        }))
    }

    /// Read requirements from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RedlineError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let reqs = Self::parse(&raw);
        if reqs.is_empty() {
            return Err(RedlineError::InvalidInput(format!(
                "requirements file {} contains no requirements",
                path.display()
            )));
        }
        Ok(reqs)
    }

    pub fn items(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a bullet list, one requirement per line.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text of the Admin message that seeds every run.
pub fn admin_brief(document: &Document, requirements: &Requirements) -> String {
    format!(
        "Article to edit:\n{}\n\nRequirements:\n{}\n\nPlease begin editing process.",
        document.original(),
        requirements.render()
    )
}
