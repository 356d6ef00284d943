//! Error and diagnostic types.
//!
//! Rendering is best-effort: almost nothing here aborts a parse. Stage
//! failures are represented as [`ArticleError`] values that the pipeline turns
//! into [`Diagnostic`] entries before passing the stage input through.

use serde::Serialize;

/// Errors raised by individual pipeline stages and by the configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum ArticleError {
    #[error("front matter opened on line 1 is never closed")]
    UnterminatedHeader,

    #[error("markdown engine `{0}` is unavailable")]
    EngineUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("typesetting engine did not become ready within {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Info,
}

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Metadata,
    Callouts,
    Formulas,
    Protect,
    Convert,
    PostProcess,
    Restore,
    Outline,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Callouts => "callouts",
            Stage::Formulas => "formulas",
            Stage::Protect => "protect",
            Stage::Convert => "convert",
            Stage::PostProcess => "post-process",
            Stage::Restore => "restore",
            Stage::Outline => "outline",
        }
    }
}

/// A recoverable problem noticed while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    /// 1-based source line, when the problem maps to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            stage,
            message: message.into(),
            line: None,
        }
    }

    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            stage,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match self.line {
            Some(line) => write!(f, "{level}[{}] line {line}: {}", self.stage.as_str(), self.message),
            None => write!(f, "{level}[{}]: {}", self.stage.as_str(), self.message),
        }
    }
}
