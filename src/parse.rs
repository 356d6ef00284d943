//! The rendering pipeline.
//!
//! [`ArticleParser`] holds configuration only. Each call to
//! [`ArticleParser::parse`] creates a [`ParseSession`] that owns the math
//! tokens, the heading-id registry and the diagnostics for that call, so
//! one parser can serve any number of threads.

use tracing::instrument;

use crate::callout::preprocess_callouts;
use crate::config::ParseOptions;
use crate::convert::{Converter, MarkdownEngine};
use crate::error::{ArticleError, Diagnostic, Stage};
use crate::formula::classify_formulas;
use crate::guard::{FormulaGuard, cleanup};
use crate::metadata::extract_metadata;
use crate::outline::build_outline;
use crate::postprocess::{self, RefContext};
use crate::slug::SlugRegistry;
use crate::types::{Document, Metadata, Outline, ParsedArticle};

/// Renders documents into [`ParsedArticle`]s.
#[derive(Debug, Default)]
pub struct ArticleParser {
    options: ParseOptions,
    converter: Converter,
}

impl ArticleParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            options,
            converter: Converter::default(),
        }
    }

    /// Replace the markdown engine.
    pub fn with_engine(mut self, engine: Box<dyn MarkdownEngine>) -> Self {
        self.converter = Converter::new(engine);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Render one document. Never fails; problems are reported in
    /// [`ParsedArticle::diagnostics`].
    #[instrument(skip_all, fields(path = doc.path.as_deref().unwrap_or("-"), bytes = doc.source.len()))]
    pub fn parse(&self, doc: &Document) -> ParsedArticle {
        let mut session = ParseSession::new();

        let (metadata, body) = session.metadata(&doc.source);

        let text = if self.options.callouts {
            preprocess_callouts(&body, &mut session.diagnostics)
        } else {
            body
        };

        let text = if self.options.formula.enabled {
            let (text, found) = classify_formulas(&text, &self.options.formula);
            tracing::debug!(found, "classified formula blocks");
            if found > 0 {
                session.diagnostics.push(Diagnostic::info(
                    Stage::Formulas,
                    format!("{found} unlabeled code block(s) rendered as display math"),
                ));
            }
            text
        } else {
            text
        };

        let text = session.guard.protect(&text);
        if session.guard.unclosed() > 0 {
            session.diagnostics.push(Diagnostic::info(
                Stage::Protect,
                format!("{} unclosed `$$` left as literal text", session.guard.unclosed()),
            ));
        }

        let html = self
            .converter
            .convert(&text, &mut session.slugs, &mut session.diagnostics);

        let refs = RefContext::new(&self.options, doc.path.as_deref());
        let html = session.run_stage(Stage::PostProcess, html, |session, html| {
            postprocess::process(html, &refs, &mut session.slugs).map(|(html, _)| html)
        });

        let html = session.guard.restore(&html, &mut session.diagnostics);
        let html = cleanup(&html);

        tracing::debug!(
            engine = self.converter.engine_name(),
            bytes = html.len(),
            headings = session.slugs.len(),
            diagnostics = session.diagnostics.len(),
            "parsed article"
        );

        ParsedArticle {
            html,
            metadata,
            diagnostics: session.diagnostics,
        }
    }

    /// Build the heading outline of a parsed article.
    ///
    /// If the outline cannot be built, the article HTML is returned as-is
    /// with no outline and a warning.
    pub fn outline(&self, article: &ParsedArticle) -> Outline {
        outline_or_passthrough(
            &article.html,
            build_outline(&article.html, self.options.min_outline_headings),
        )
    }
}

fn outline_or_passthrough(html: &str, built: Result<Outline, ArticleError>) -> Outline {
    match built {
        Ok(outline) => outline,
        Err(err) => {
            tracing::warn!(%err, "could not build outline");
            Outline {
                html: html.to_string(),
                headings: Vec::new(),
                nodes: None,
                diagnostics: vec![Diagnostic::warning(
                    Stage::Outline,
                    format!("{err}; article html kept without an outline"),
                )],
            }
        }
    }
}

/// Render `source` with default options.
///
/// ```
/// let article = article_render::parse_article("---\ntitle: Hello\n---\n\n# Hi\n", None);
/// assert_eq!(article.title(), Some("Hello"));
/// assert!(article.html.contains("<h1 id=\"hi\">Hi</h1>"));
/// ```
pub fn parse_article(source: &str, path: Option<&str>) -> ParsedArticle {
    let mut doc = Document::new(source);
    doc.path = path.map(str::to_string);
    ArticleParser::new().parse(&doc)
}

/// Mutable state of a single parse call.
#[derive(Debug, Default)]
pub struct ParseSession {
    pub guard: FormulaGuard,
    pub slugs: SlugRegistry,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a fallible stage. On error the failure is recorded and the
    /// stage input is returned unchanged.
    pub fn run_stage<F>(&mut self, stage: Stage, input: String, f: F) -> String
    where
        F: FnOnce(&mut Self, &str) -> Result<String, ArticleError>,
    {
        match f(self, &input) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(stage = stage.as_str(), %err, "stage failed, passing input through");
                self.diagnostics.push(Diagnostic::warning(
                    stage,
                    format!("{err}; input passed through unchanged"),
                ));
                input
            }
        }
    }

    fn metadata(&mut self, source: &str) -> (Metadata, String) {
        match extract_metadata(source) {
            Ok(extracted) => {
                tracing::debug!(keys = extracted.metadata.len(), "extracted front matter");
                self.diagnostics.extend(extracted.diagnostics);
                (extracted.metadata, extracted.body.to_string())
            }
            Err(err) => {
                tracing::warn!(%err, "front matter ignored");
                self.diagnostics.push(Diagnostic::warning(
                    Stage::Metadata,
                    format!("{err}; the whole document is treated as body"),
                ));
                (Metadata::new(), source.to_string())
            }
        }
    }
}
