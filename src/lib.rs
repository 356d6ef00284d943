//! `article-render`: renders math-heavy markdown articles to HTML.
//!
//! An article is markdown with an optional `---` front matter header,
//! callout quotes (`> ⚠️ **Label**`), inline `$…$` and display `$$…$$`
//! math, and unlabeled code fences that may hold Unicode formulas. The
//! pipeline keeps math byte-for-byte intact across markdown conversion and
//! produces HTML ready for a client-side typesetter, plus a heading outline.
//!
//! # Quick start
//!
//! ```
//! use article_render::{ArticleParser, Document};
//!
//! let parser = ArticleParser::new();
//! let doc = Document::new("---\ntitle: Circles\n---\n\n# Unit circle\n\nPoints with $x^2 + y^2 = 1$.\n")
//!     .with_path("geometry/circle.md");
//! let article = parser.parse(&doc);
//! assert_eq!(article.title(), Some("Circles"));
//! assert!(article.html.contains("$x^2 + y^2 = 1$"));
//!
//! let outline = parser.outline(&article);
//! assert_eq!(outline.headings[0].id, "unit-circle");
//! assert!(outline.nodes.is_none());
//! ```

pub mod callout;
pub mod config;
pub mod convert;
pub mod error;
mod fence;
pub mod formula;
pub mod guard;
mod html;
pub mod metadata;
pub mod outline;
pub mod parse;
pub mod postprocess;
pub mod slug;
#[cfg(feature = "typeset")]
pub mod typeset;
pub mod types;

pub use config::{FormulaOptions, ParseOptions};
pub use convert::{MarkdownEngine, MathRecognizer, MinimalEngine, PulldownEngine};
pub use error::*;
pub use parse::{ArticleParser, ParseSession, parse_article};
pub use types::*;

#[cfg(feature = "typeset")]
pub use typeset::{EngineStatus, wait_for_engine};
