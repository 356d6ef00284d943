//! Core data types shared across the rendering pipeline.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Diagnostic;

/// Raw article source plus the path it was loaded from.
///
/// The path is only used to resolve relative image and link references; it
/// is never read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub source: String,
    pub path: Option<String>,
}

impl Document {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A single front matter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    List(Vec<String>),
    Number(i64),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Front matter in source order.
pub type Metadata = IndexMap<String, MetaValue>;

/// Whether a math span is inline (`$…$`) or display (`$$…$$`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaKind {
    Inline,
    Block,
}

/// A math span lifted out of the text before markdown conversion.
///
/// `index` is the position of the token in the session's token list and is
/// the number encoded in its placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaToken {
    pub kind: FormulaKind,
    pub index: usize,
    pub content: String,
}

/// Terminal output of one parse call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedArticle {
    pub html: String,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedArticle {
    /// Front matter `title`, if it is a string.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(MetaValue::as_str)
    }
}

/// A heading found in rendered HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub id: String,
}

/// A heading with the headings nested beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineNode {
    pub level: u8,
    pub text: String,
    pub id: String,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn from_heading(heading: &Heading) -> Self {
        Self {
            level: heading.level,
            text: heading.text.clone(),
            id: heading.id.clone(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::count).sum::<usize>()
    }
}

/// Result of [`crate::outline::build_outline`].
///
/// `nodes` is `None` when the article has fewer headings than the configured
/// minimum; consumers should hide their table of contents in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outline {
    pub html: String,
    pub headings: Vec<Heading>,
    pub nodes: Option<Vec<OutlineNode>>,
    pub diagnostics: Vec<Diagnostic>,
}
