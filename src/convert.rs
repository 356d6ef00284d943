//! Markdown to HTML conversion.
//!
//! The converter is an adapter over a replaceable [`MarkdownEngine`]. The
//! default engine is pulldown-cmark; [`MinimalEngine`] covers headings,
//! emphasis, code and paragraphs and is used whenever the configured engine
//! fails, so conversion never aborts a parse.
//!
//! Math that reaches the converter (the guard normally lifts it out first) is
//! handled by [`MathRecognizer`]s, tried in registration order: display math
//! before inline math.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd};

use crate::error::{ArticleError, Diagnostic, Stage};
use crate::fence::{Fence, split_lines};
use crate::html::escape_html;
use crate::slug::SlugRegistry;
use crate::types::FormulaKind;

/// A math span found at the start of some input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathMatch {
    pub kind: FormulaKind,
    pub content: String,
    /// Bytes consumed from the input, delimiters included.
    pub len: usize,
}

/// Recognizes one kind of math span and renders it back as markup.
pub trait MathRecognizer: Send + Sync {
    fn kind(&self) -> FormulaKind;

    /// Match a span starting at the beginning of `input`.
    fn recognize(&self, input: &str) -> Option<MathMatch>;

    fn render(&self, token: &MathMatch) -> String;
}

/// `$$…$$`, may span lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockMathRecognizer;

impl MathRecognizer for BlockMathRecognizer {
    fn kind(&self) -> FormulaKind {
        FormulaKind::Block
    }

    fn recognize(&self, input: &str) -> Option<MathMatch> {
        let rest = input.strip_prefix("$$")?;
        let end = rest.find("$$")?;
        let content = &rest[..end];
        if content.trim().is_empty() {
            return None;
        }
        Some(MathMatch {
            kind: FormulaKind::Block,
            content: content.to_string(),
            len: end + 4,
        })
    }

    fn render(&self, token: &MathMatch) -> String {
        format!("$${}$$", escape_html(&token.content))
    }
}

/// `$…$` on a single line.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineMathRecognizer;

impl MathRecognizer for InlineMathRecognizer {
    fn kind(&self) -> FormulaKind {
        FormulaKind::Inline
    }

    fn recognize(&self, input: &str) -> Option<MathMatch> {
        let rest = input.strip_prefix('$')?;
        if rest.starts_with('$') {
            return None;
        }
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'\n' => return None,
                b'$' => {
                    let content = &rest[..i];
                    if content.trim().is_empty() {
                        return None;
                    }
                    return Some(MathMatch {
                        kind: FormulaKind::Inline,
                        content: content.to_string(),
                        len: i + 2,
                    });
                }
                _ => i += 1,
            }
        }
        None
    }

    fn render(&self, token: &MathMatch) -> String {
        format!("${}$", escape_html(&token.content))
    }
}

/// Block before inline, so `$$` is never read as two inline delimiters.
pub fn default_recognizers() -> Vec<Box<dyn MathRecognizer>> {
    vec![Box::new(BlockMathRecognizer), Box::new(InlineMathRecognizer)]
}

/// Per-call state an engine may use.
pub struct RenderContext<'a> {
    pub slugs: &'a mut SlugRegistry,
    pub recognizers: &'a [Box<dyn MathRecognizer>],
}

impl RenderContext<'_> {
    /// Try each recognizer in order against the start of `input`.
    pub fn match_math(&self, input: &str) -> Option<(MathMatch, String)> {
        self.recognizers.iter().find_map(|r| {
            let token = r.recognize(input)?;
            let html = r.render(&token);
            Some((token, html))
        })
    }

    /// Render math the engine has already delimited.
    pub fn render_math(&self, kind: FormulaKind, content: &str) -> String {
        let token = MathMatch {
            kind,
            content: content.to_string(),
            len: content.len(),
        };
        match self.recognizers.iter().find(|r| r.kind() == kind) {
            Some(r) => r.render(&token),
            None => escape_html(content),
        }
    }
}

/// A markdown to HTML engine.
pub trait MarkdownEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, markdown: &str, ctx: &mut RenderContext<'_>) -> Result<String, ArticleError>;
}

/// pulldown-cmark with GFM extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PulldownEngine;

impl PulldownEngine {
    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        options.insert(Options::ENABLE_MATH);
        options
    }
}

impl MarkdownEngine for PulldownEngine {
    fn name(&self) -> &'static str {
        "pulldown-cmark"
    }

    fn render(&self, markdown: &str, ctx: &mut RenderContext<'_>) -> Result<String, ArticleError> {
        let mut events: Vec<Event<'_>> = Parser::new_ext(markdown, Self::options()).collect();

        // Explicit `{#id}`s are claimed before any generated id.
        for event in events.iter_mut() {
            if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
                let current: &str = id;
                let unique = ctx.slugs.reserve(current);
                if unique != current {
                    *id = CowStr::from(unique);
                }
            }
        }

        for i in 0..events.len() {
            if !matches!(events[i], Event::Start(Tag::Heading { id: None, .. })) {
                continue;
            }
            let text = heading_text(&events[i + 1..]);
            let slug = ctx.slugs.assign(&text);
            if let Event::Start(Tag::Heading { id, .. }) = &mut events[i] {
                *id = Some(CowStr::from(slug));
            }
        }

        let events = events.into_iter().map(|event| match event {
            Event::InlineMath(tex) => {
                Event::InlineHtml(CowStr::from(ctx.render_math(FormulaKind::Inline, &tex)))
            }
            Event::DisplayMath(tex) => {
                Event::InlineHtml(CowStr::from(ctx.render_math(FormulaKind::Block, &tex)))
            }
            other => other,
        });

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        pulldown_cmark::html::push_html(&mut html_output, events);
        Ok(html_output)
    }
}

fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) | Event::InlineMath(t) | Event::DisplayMath(t) => {
                text.push_str(t)
            }
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

/// Line-based fallback engine. Handles ATX headings, fenced code, raw HTML
/// lines, paragraphs, `**bold**`, `*italic*`, `` `code` `` and math.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinimalEngine;

impl MarkdownEngine for MinimalEngine {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn render(&self, markdown: &str, ctx: &mut RenderContext<'_>) -> Result<String, ArticleError> {
        let (lines, _) = split_lines(markdown);
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        let mut paragraph: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim();

            if let Some(fence) = Fence::open(line) {
                flush_paragraph(&mut paragraph, &mut out, ctx);
                let mut body: Vec<&str> = Vec::new();
                i += 1;
                while i < lines.len() && !fence.is_closed_by(lines[i]) {
                    body.push(lines[i]);
                    i += 1;
                }
                i += 1;
                if body.is_empty() && fence.language().is_none() {
                    out.push_str("<pre><code></code></pre>\n");
                    continue;
                }
                let mut code = body.join("\n");
                code.push('\n');
                match fence.language() {
                    Some(lang) => out.push_str(&format!(
                        "<pre><code class=\"language-{}\">{}</code></pre>\n",
                        escape_html(lang),
                        escape_html(&code)
                    )),
                    None => out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_html(&code))),
                }
                continue;
            }

            if trimmed.is_empty() {
                flush_paragraph(&mut paragraph, &mut out, ctx);
            } else if let Some((level, text)) = atx_heading(trimmed) {
                flush_paragraph(&mut paragraph, &mut out, ctx);
                let id = ctx.slugs.assign(text);
                out.push_str(&format!(
                    "<h{level} id=\"{id}\">{}</h{level}>\n",
                    render_inline(text, ctx)
                ));
            } else if trimmed.starts_with('<') && paragraph.is_empty() {
                out.push_str(line);
                out.push('\n');
            } else {
                paragraph.push(trimmed);
            }
            i += 1;
        }
        flush_paragraph(&mut paragraph, &mut out, ctx);
        Ok(out)
    }
}

fn atx_heading(line: &str) -> Option<(usize, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim_end()))
}

fn flush_paragraph(paragraph: &mut Vec<&str>, out: &mut String, ctx: &RenderContext<'_>) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join("\n");
    paragraph.clear();
    out.push_str("<p>");
    out.push_str(&render_inline(&text, ctx));
    out.push_str("</p>\n");
}

fn render_inline(text: &str, ctx: &RenderContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut strong = false;
    let mut em = false;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];

        if let Some(code) = rest.strip_prefix('`')
            && let Some(end) = code.find('`')
        {
            out.push_str("<code>");
            out.push_str(&escape_html(&code[..end]));
            out.push_str("</code>");
            i += end + 2;
            continue;
        }
        if rest.starts_with('\\') && rest.len() > 1 && rest.as_bytes()[1] == b'$' {
            out.push('$');
            i += 2;
            continue;
        }
        if rest.starts_with('$')
            && let Some((token, html)) = ctx.match_math(rest)
        {
            out.push_str(&html);
            i += token.len;
            continue;
        }
        if let Some(after) = rest.strip_prefix("**")
            && (strong || after.contains("**"))
        {
            out.push_str(if strong { "</strong>" } else { "<strong>" });
            strong = !strong;
            i += 2;
            continue;
        }
        if let Some(after) = rest.strip_prefix('*')
            && (em || after.contains('*'))
        {
            out.push_str(if em { "</em>" } else { "<em>" });
            em = !em;
            i += 1;
            continue;
        }

        let Some(c) = rest.chars().next() else { break };
        out.push_str(&escape_html(&rest[..c.len_utf8()]));
        i += c.len_utf8();
    }

    if em {
        out.push_str("</em>");
    }
    if strong {
        out.push_str("</strong>");
    }
    out
}

/// The conversion stage: the configured engine, with [`MinimalEngine`] as
/// the fallback.
pub struct Converter {
    engine: Box<dyn MarkdownEngine>,
    fallback: MinimalEngine,
    recognizers: Vec<Box<dyn MathRecognizer>>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(Box::new(PulldownEngine))
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("engine", &self.engine.name())
            .field("recognizers", &self.recognizers.len())
            .finish()
    }
}

impl Converter {
    pub fn new(engine: Box<dyn MarkdownEngine>) -> Self {
        Self {
            engine,
            fallback: MinimalEngine,
            recognizers: default_recognizers(),
        }
    }

    /// Name of the configured engine, not the fallback.
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Convert `markdown` to HTML. Never fails: if the engine errors, ids it
    /// handed out are rolled back and the fallback engine renders instead.
    pub fn convert(
        &self,
        markdown: &str,
        slugs: &mut SlugRegistry,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> String {
        let snapshot = slugs.clone();
        let mut ctx = RenderContext {
            slugs,
            recognizers: &self.recognizers,
        };

        match self.engine.render(markdown, &mut ctx) {
            Ok(html) => {
                tracing::debug!(engine = self.engine.name(), bytes = html.len(), "converted markdown");
                html
            }
            Err(err) => {
                tracing::warn!(engine = self.engine.name(), %err, "markdown engine failed, using minimal engine");
                diagnostics.push(Diagnostic::warning(
                    Stage::Convert,
                    format!("{} engine failed ({err}); used the minimal engine", self.engine.name()),
                ));
                *ctx.slugs = snapshot;
                match self.fallback.render(markdown, &mut ctx) {
                    Ok(html) => html,
                    Err(err) => {
                        tracing::warn!(%err, "minimal engine failed, emitting escaped text");
                        format!("<pre>{}</pre>\n", escape_html(markdown))
                    }
                }
            }
        }
    }
}
