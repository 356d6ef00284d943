//! Parser configuration.
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```
//! use article_render::config::ParseOptions;
//!
//! let opts = ParseOptions::from_yaml_str("content_root: /static/articles\nmin_outline_headings: 3\n").unwrap();
//! assert_eq!(opts.content_root, "/static/articles");
//! assert_eq!(opts.min_outline_headings, 3);
//! assert_eq!(opts.document_route, "/article/");
//! ```

use serde::Deserialize;

use crate::error::ArticleError;

/// Options controlling a parse. Shared read-only between parse calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// URL prefix under which article assets are served.
    pub content_root: String,
    /// URL prefix of the document viewer; internal links become
    /// `{document_route}{path-without-extension}`.
    pub document_route: String,
    /// Below this many headings the outline is reported as absent.
    pub min_outline_headings: usize,
    /// Add `loading="lazy"` to rewritten images.
    pub lazy_images: bool,
    /// `rel` value given to external links.
    pub external_rel: String,
    /// Upper bound for waiting on the typesetting engine.
    pub typeset_timeout_ms: u64,
    /// Rewrite callout quotes into containers.
    pub callouts: bool,
    pub formula: FormulaOptions,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            content_root: "/content".to_string(),
            document_route: "/article/".to_string(),
            min_outline_headings: 2,
            lazy_images: true,
            external_rel: "noopener noreferrer".to_string(),
            typeset_timeout_ms: 5000,
            callouts: true,
            formula: FormulaOptions::default(),
        }
    }
}

impl ParseOptions {
    /// Parse options from a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ArticleError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML options file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ArticleError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn typeset_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.typeset_timeout_ms)
    }
}

/// Bounds for the fenced-block formula heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormulaOptions {
    pub enabled: bool,
    /// Minimum trimmed length (in characters) of a formula block.
    pub min_len: usize,
    /// Maximum trimmed length (in characters) of a formula block.
    pub max_len: usize,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            min_len: 2,
            max_len: 400,
        }
    }
}
