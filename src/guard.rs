//! Math protection across markdown conversion.
//!
//! The markdown engine knows nothing about `$…$` and `$$…$$`: left alone it
//! would turn `a_1 * b_2` into emphasis and escape or reflow display blocks.
//! [`FormulaGuard::protect`] lifts every math span out of the text and leaves
//! an opaque placeholder in its place; [`FormulaGuard::restore`] puts the spans
//! back into the converted HTML. [`cleanup`] then normalises what the round
//! trip leaves behind.
//!
//! Placeholders are written with Unicode private-use brackets,
//! `U+E000 M B|I <index> U+E001`, which no markdown rule touches and which do
//! not occur in ordinary text.
//!
//! Token `i` is always the `i`-th placeholder emitted, and restoration only
//! ever replaces the placeholder with exactly that index and kind.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{Diagnostic, Stage};
use crate::fence::Fence;
use crate::html::escape_html;
use crate::types::{FormulaKind, FormulaToken};

pub const PLACEHOLDER_OPEN: char = '\u{e000}';
pub const PLACEHOLDER_CLOSE: char = '\u{e001}';

/// Placeholder text for the token with `index` and `kind`.
pub fn placeholder(kind: FormulaKind, index: usize) -> String {
    let tag = match kind {
        FormulaKind::Block => 'B',
        FormulaKind::Inline => 'I',
    };
    format!("{PLACEHOLDER_OPEN}M{tag}{index}{PLACEHOLDER_CLOSE}")
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x{e000}M[BI][0-9]+\x{e001}").unwrap())
}

/// Whether `text` still holds any placeholder.
pub fn contains_placeholder(text: &str) -> bool {
    placeholder_re().is_match(text)
}

/// Remove all placeholders from `text` (used when deriving slugs).
pub fn strip_placeholders(text: &str) -> Cow<'_, str> {
    placeholder_re().replace_all(text, "")
}

/// Per-parse math token store.
#[derive(Debug, Default)]
pub struct FormulaGuard {
    tokens: Vec<FormulaToken>,
    unclosed: usize,
}

impl FormulaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens(&self) -> &[FormulaToken] {
        &self.tokens
    }

    /// Number of `$$` openers without a closing `$$`, left as literal text.
    pub fn unclosed(&self) -> usize {
        self.unclosed
    }

    /// Replace math spans outside code with placeholders.
    ///
    /// Display spans are collected first over the whole text, then inline
    /// spans, so a `$$` is never mistaken for two inline delimiters. Empty
    /// spans, unclosed delimiters and `\$` are left as they are.
    pub fn protect(&mut self, text: &str) -> String {
        let mut segments = split_code(text);

        for segment in segments.iter_mut().filter(|s| !s.code) {
            segment.text = self.protect_blocks(&segment.text);
        }
        for segment in segments.iter_mut().filter(|s| !s.code) {
            segment.text = self.protect_inline(&segment.text);
        }

        tracing::debug!(tokens = self.tokens.len(), "protected math spans");
        segments.into_iter().map(|s| s.text).collect()
    }

    fn push(&mut self, kind: FormulaKind, content: &str) -> String {
        let index = self.tokens.len();
        self.tokens.push(FormulaToken {
            kind,
            index,
            content: content.to_string(),
        });
        placeholder(kind, index)
    }

    fn protect_blocks(&mut self, s: &str) -> String {
        let bytes = s.as_bytes();
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'$' if bytes.get(i + 1) == Some(&b'$') => {
                    let Some(end) = find_unescaped(s, i + 2, "$$") else {
                        self.unclosed += 1;
                        break;
                    };
                    let content = &s[i + 2..end];
                    if !content.trim().is_empty() {
                        out.push_str(&s[last..i]);
                        let ph = self.push(FormulaKind::Block, content);
                        out.push_str(&ph);
                        last = end + 2;
                    }
                    i = end + 2;
                }
                _ => i += 1,
            }
        }

        out.push_str(&s[last..]);
        out
    }

    fn protect_inline(&mut self, s: &str) -> String {
        let bytes = s.as_bytes();
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                // A leftover `$$` was not closed; it never opens inline math.
                b'$' if bytes.get(i + 1) == Some(&b'$') => i += 2,
                b'$' => {
                    let Some(end) = find_inline_close(bytes, i + 1) else {
                        i += 1;
                        continue;
                    };
                    let content = &s[i + 1..end];
                    if !content.trim().is_empty() {
                        out.push_str(&s[last..i]);
                        let ph = self.push(FormulaKind::Inline, content);
                        out.push_str(&ph);
                        last = end + 1;
                    }
                    i = end + 1;
                }
                _ => i += 1,
            }
        }

        out.push_str(&s[last..]);
        out
    }

    /// Put every token back into `html`.
    ///
    /// A token whose placeholder cannot be found is reported and skipped; the
    /// remaining tokens are still restored. Placeholders without a matching
    /// token are removed so the output never carries them.
    pub fn restore(&self, html: &str, diagnostics: &mut Vec<Diagnostic>) -> String {
        let mut out = recover_escapes(html).into_owned();

        for token in &self.tokens {
            let ph = placeholder(token.kind, token.index);
            if !out.contains(&ph) {
                tracing::warn!(index = token.index, kind = ?token.kind, "math placeholder lost during conversion");
                diagnostics.push(Diagnostic::warning(
                    Stage::Restore,
                    format!("math span #{} was lost during conversion and has been dropped", token.index),
                ));
                continue;
            }
            let content = escape_html(&token.content);
            let replacement = match token.kind {
                FormulaKind::Block => format!("\n\n$${content}$$\n\n"),
                FormulaKind::Inline => format!("${content}$"),
            };
            out = out.replace(&ph, &replacement);
        }

        if contains_placeholder(&out) {
            tracing::warn!("removing placeholders with no matching token");
            diagnostics.push(Diagnostic::warning(
                Stage::Restore,
                "removed placeholders that matched no math span",
            ));
            out = strip_placeholders(&out).into_owned();
        }

        out
    }
}

fn find_unescaped(s: &str, from: usize, delim: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let d = delim.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(d) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Closing `$` of an inline span, on the same line and not part of `$$`.
fn find_inline_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'\n' => return None,
            b'\\' => j += 2,
            b'$' if bytes.get(j + 1) == Some(&b'$') => return None,
            b'$' => return Some(j),
            _ => j += 1,
        }
    }
    None
}

#[derive(Debug)]
struct Segment {
    text: String,
    code: bool,
}

/// Split text into code (fenced blocks, inline code spans) and prose.
fn split_code(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut prose = String::new();
    let mut fence: Option<(Fence, String)> = None;

    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);
        match &mut fence {
            Some((open, code)) => {
                code.push_str(line);
                if open.is_closed_by(bare) {
                    segments.push(Segment {
                        text: std::mem::take(code),
                        code: true,
                    });
                    fence = None;
                }
            }
            None => match Fence::open(bare) {
                Some(open) => {
                    split_inline_code(&std::mem::take(&mut prose), &mut segments);
                    fence = Some((open, line.to_string()));
                }
                None => prose.push_str(line),
            },
        }
    }

    if let Some((_, code)) = fence {
        segments.push(Segment { text: code, code: true });
    }
    split_inline_code(&prose, &mut segments);
    segments
}

fn split_inline_code(text: &str, segments: &mut Vec<Segment>) {
    if text.is_empty() {
        return;
    }
    let bytes = text.as_bytes();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
        let Some(close) = find_backtick_run(bytes, i + run, run) else {
            i += run;
            continue;
        };
        if last < i {
            segments.push(Segment {
                text: text[last..i].to_string(),
                code: false,
            });
        }
        segments.push(Segment {
            text: text[i..close + run].to_string(),
            code: true,
        });
        i = close + run;
        last = i;
    }

    if last < text.len() {
        segments.push(Segment {
            text: text[last..].to_string(),
            code: false,
        });
    }
}

/// Closing backtick run of exactly `len`, within the same paragraph.
fn find_backtick_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'`' => {
                let run = bytes[j..].iter().take_while(|b| **b == b'`').count();
                if run == len {
                    return Some(j);
                }
                j += run;
            }
            b'\n' if starts_blank_line(&bytes[j + 1..]) => return None,
            _ => j += 1,
        }
    }
    None
}

fn starts_blank_line(rest: &[u8]) -> bool {
    let indent = rest.iter().take_while(|b| matches!(b, b' ' | b'\t' | b'\r')).count();
    rest.get(indent) == Some(&b'\n')
}

// ------------------------------------------------------------------
// Escape recovery
// ------------------------------------------------------------------

const DELIM: &str = r"(?:\$|&(?:amp;)?#(?:36|[xX]24);|&(?:amp;)?dollar;)";

fn block_region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"{DELIM}{DELIM}[^<]*?{DELIM}{DELIM}")).unwrap())
}

fn inline_region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"{DELIM}[^<\n]*?{DELIM}")).unwrap())
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"&(?:amp;)?(?:#(36|[xX]24|92|[xX]5[cC]|123|[xX]7[bB]|125|[xX]7[dD]);|(dollar|bsol|lbrace|lcub|rbrace|rcub);)",
        )
        .unwrap()
    })
}

fn decode_math_entities(region: &str) -> String {
    entity_re()
        .replace_all(region, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            match name.to_ascii_lowercase().as_str() {
                "36" | "x24" | "dollar" => "$",
                "92" | "x5c" | "bsol" => "\\",
                "123" | "x7b" | "lbrace" | "lcub" => "{",
                "125" | "x7d" | "rbrace" | "rcub" => "}",
                _ => "",
            }
        })
        .into_owned()
}

/// Undo entity escaping of `$`, `\`, `{` and `}` inside regions that look
/// like math. Text outside such regions is returned untouched.
pub fn recover_escapes(html: &str) -> Cow<'_, str> {
    if !html.contains('&') {
        return Cow::Borrowed(html);
    }
    let blocks = block_region_re().replace_all(html, |caps: &Captures| decode_math_entities(&caps[0]));
    let inline = inline_region_re()
        .replace_all(&blocks, |caps: &Captures| decode_math_entities(&caps[0]))
        .into_owned();
    if inline == html {
        Cow::Borrowed(html)
    } else {
        Cow::Owned(inline)
    }
}

// ------------------------------------------------------------------
// Cleanup
// ------------------------------------------------------------------

/// Normalise restored HTML.
///
/// - drops empty display spans and the empty paragraphs they leave behind
/// - unwraps display math that is the only content of a `<p>` or `<code>`
/// - joins math spans the converter split across lines
/// - collapses runs of blank lines
/// - recovers entity-escaped math delimiters
///
/// Delimiters pair left to right, so the closing `$$` of one span and the
/// opening `$$` of the next never form a span of their own. `<pre>` blocks
/// are never modified. The passes are repeated until nothing changes; every
/// pass only shortens the text or turns a line break into a space, so the
/// loop terminates and `cleanup(cleanup(x)) == cleanup(x)`.
pub fn cleanup(html: &str) -> String {
    let mut current = html.to_string();
    loop {
        let next = cleanup_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn cleanup_pass(html: &str) -> String {
    static PRE: OnceLock<Regex> = OnceLock::new();
    let pre = PRE.get_or_init(|| Regex::new(r"(?s)<pre\b.*?</pre>").unwrap());

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in pre.find_iter(html) {
        out.push_str(&cleanup_prose(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&cleanup_prose(&html[last..]));
    out
}

/// A `$$…$$` span. Content never holds `$$` or markup, so successive matches
/// pair delimiters left to right.
fn display_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\$(?:[^$<]|\$[^$<])*?\$\$").unwrap())
}

fn cleanup_prose(s: &str) -> String {
    static EMPTY_P: OnceLock<Regex> = OnceLock::new();
    static WRAPPED: OnceLock<Regex> = OnceLock::new();
    static BLANK: OnceLock<Regex> = OnceLock::new();
    static RUNAWAY: OnceLock<Regex> = OnceLock::new();

    let empty_p = EMPTY_P.get_or_init(|| Regex::new(r"<p>\s*</p>").unwrap());
    let wrapped = WRAPPED.get_or_init(|| {
        Regex::new(r"<(p|code)>\s*(\$\$(?:[^$<]|\$[^$<])+?\$\$)\s*</(?:p|code)>").unwrap()
    });
    let blank = BLANK.get_or_init(|| Regex::new(r"\n[ \t]*\n").unwrap());
    let runaway = RUNAWAY.get_or_init(|| Regex::new(r"\n{3,}").unwrap());

    let s = recover_escapes(s);
    let s = display_span_re().replace_all(&s, |caps: &Captures| {
        let span = &caps[0];
        if span[2..span.len() - 2].trim().is_empty() {
            String::new()
        } else {
            blank.replace_all(span, "\n").into_owned()
        }
    });
    let s = empty_p.replace_all(&s, "");
    let s = wrapped.replace_all(&s, |caps: &Captures| {
        let open = &caps[1];
        let close = &caps[0][caps[0].rfind("</").unwrap_or(0)..];
        // Only unwrap when open and close tags agree.
        if close == format!("</{open}>") {
            caps[2].to_string()
        } else {
            caps[0].to_string()
        }
    });
    let s = join_split_inline(&s);
    runaway.replace_all(&s, "\n\n").into_owned()
}

/// Join inline spans the converter wrapped onto a second line.
///
/// Inline delimiters pair left to right and display spans are stepped over
/// whole, so a line break between two separate spans is left alone.
fn join_split_inline(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let mut out = String::new();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                i = match display_span_re().find_at(s, i) {
                    Some(m) if m.start() == i => m.end(),
                    _ => i + 2,
                };
            }
            b'$' => match find_wrapped_close(bytes, i + 1) {
                Some((close, newline)) => {
                    if let Some(nl) = newline {
                        out.push_str(&s[last..nl]);
                        out.push(' ');
                        last = nl + 1;
                    }
                    i = close + 1;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    if last == 0 {
        return Cow::Borrowed(s);
    }
    out.push_str(&s[last..]);
    Cow::Owned(out)
}

/// Closing `$` of an inline span that may hold one line break, plus the
/// position of that break when text sits on both sides of it.
fn find_wrapped_close(bytes: &[u8], from: usize) -> Option<(usize, Option<usize>)> {
    let mut newline = None;
    let mut j = from;
    while j < bytes.len() {
        match bytes[j] {
            b'<' => return None,
            b'\n' if newline.is_some() => return None,
            b'\n' => {
                newline = Some(j);
                j += 1;
            }
            b'\\' => j += 2,
            b'$' if bytes.get(j + 1) == Some(&b'$') => return None,
            b'$' => return Some((j, newline.filter(|&nl| nl > from && nl + 1 < j))),
            _ => j += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn protect(text: &str) -> (String, FormulaGuard) {
        let mut guard = FormulaGuard::new();
        let out = guard.protect(text);
        (out, guard)
    }

    #[test]
    fn blocks_are_indexed_before_inline() {
        let (out, guard) = protect("Inline $a$ then $$b$$ and $c$.");
        let tokens = guard.tokens();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, FormulaKind::Block);
        assert_eq!(tokens[0].content, "b");
        assert_eq!(tokens[1].kind, FormulaKind::Inline);
        assert_eq!(tokens[1].content, "a");
        assert_eq!(tokens[2].content, "c");
        for token in tokens {
            assert!(out.contains(&placeholder(token.kind, token.index)));
        }
        assert!(!out.contains('$'));
    }

    #[test]
    fn multiline_block() {
        let (out, guard) = protect("$$\n\\begin{aligned}\na &= b\n\\end{aligned}\n$$\n");
        assert_eq!(guard.tokens().len(), 1);
        assert_eq!(out, format!("{}\n", placeholder(FormulaKind::Block, 0)));
    }

    #[test]
    fn empty_and_unclosed_spans_untouched() {
        let src = "Empty $$ $$ and $ $ and unclosed $x and $$y";
        let (out, guard) = protect(src);
        assert!(guard.tokens().is_empty());
        assert_eq!(out, src);
    }

    #[test]
    fn unclosed_display_opener_is_counted() {
        let (_, guard) = protect("Empty $$ $$ and unclosed $$y");
        assert_eq!(guard.unclosed(), 1);
        let (_, guard) = protect("$$a$$ and $b$");
        assert_eq!(guard.unclosed(), 0);
    }

    #[test]
    fn escaped_dollars_do_not_delimit() {
        let src = r"Costs \$5 and \$6.";
        let (out, guard) = protect(src);
        assert!(guard.tokens().is_empty());
        assert_eq!(out, src);
    }

    #[test]
    fn inline_does_not_cross_lines() {
        let (_, guard) = protect("$a\nb$");
        assert!(guard.tokens().is_empty());
    }

    #[test]
    fn code_is_not_protected() {
        let src = "Run `echo $HOME$` or\n\n```sh\necho $$ $x$\n```\n\nbut $y$ is math.";
        let (out, guard) = protect(src);
        assert_eq!(guard.tokens().len(), 1);
        assert_eq!(guard.tokens()[0].content, "y");
        assert!(out.contains("`echo $HOME$`"));
        assert!(out.contains("echo $$ $x$"));
    }

    #[test]
    fn stray_backtick_does_not_hide_math_in_next_paragraph() {
        let (out, guard) = protect("Use ` here.\n\nThen $x_1 * y_2$ and ` there");
        assert_eq!(guard.tokens().len(), 1);
        assert_eq!(guard.tokens()[0].content, "x_1 * y_2");
        assert!(out.starts_with("Use ` here.\n\nThen "));
    }

    #[test]
    fn code_span_may_wrap_a_single_line() {
        let (_, guard) = protect("`a $x$\nb` and $y$");
        assert_eq!(guard.tokens().len(), 1);
        assert_eq!(guard.tokens()[0].content, "y");
    }

    #[test]
    fn restore_round_trip() {
        let src = "A $$ x^2 + y^2 = 1 $$ B $E=mc^2$";
        let (protected, guard) = protect(src);
        let html = format!("<p>{protected}</p>");
        let mut diags = Vec::new();
        let restored = guard.restore(&html, &mut diags);
        assert!(diags.is_empty());
        assert!(restored.contains("$$ x^2 + y^2 = 1 $$"));
        assert!(restored.contains("$E=mc^2$"));
        assert!(!contains_placeholder(&restored));
    }

    #[test]
    fn restore_escapes_html_in_math() {
        let (protected, guard) = protect("$a<b & c>d$");
        let restored = guard.restore(&protected, &mut Vec::new());
        assert_eq!(restored, "$a&lt;b &amp; c&gt;d$");
    }

    #[test]
    fn missing_placeholder_is_recoverable() {
        let (protected, guard) = protect("$a$ $b$ $c$");
        let damaged = protected.replace(&placeholder(FormulaKind::Inline, 1), "");
        let mut diags = Vec::new();
        let restored = guard.restore(&damaged, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].stage, Stage::Restore);
        assert_eq!(restored, "$a$  $c$");
    }

    #[test]
    fn index_one_does_not_match_index_ten() {
        let src: String = (0..11).map(|i| format!("${i}$ ")).collect();
        let (protected, guard) = protect(&src);
        let restored = guard.restore(&protected, &mut Vec::new());
        assert_eq!(restored, src);
    }

    #[test]
    fn stray_placeholders_are_removed() {
        let guard = FormulaGuard::new();
        let mut diags = Vec::new();
        let out = guard.restore(&format!("x{}y", placeholder(FormulaKind::Inline, 7)), &mut diags);
        assert_eq!(out, "xy");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn recover_only_inside_math() {
        let html = "<p>&#123;literal&#125; and &#36;\\frac&#123;1&#125;&#123;2&#125;&#36;</p>";
        assert_eq!(
            recover_escapes(html),
            "<p>&#123;literal&#125; and $\\frac{1}{2}$</p>"
        );
    }

    #[test]
    fn recover_double_escaped_block() {
        let html = "&amp;#36;&amp;#36;a &#92;cdot b&amp;#36;&amp;#36;";
        assert_eq!(recover_escapes(html), "$$a \\cdot b$$");
    }

    #[test]
    fn cleanup_unwraps_paragraph() {
        assert_eq!(cleanup("<p>\n\n$$x$$\n\n</p>\n<p>t</p>"), "$$x$$\n<p>t</p>");
    }

    #[test]
    fn cleanup_unwraps_code() {
        assert_eq!(cleanup("<code>$$x$$</code>"), "$$x$$");
        assert_eq!(cleanup("<code>$x$</code>"), "<code>$x$</code>");
    }

    #[test]
    fn cleanup_keeps_prose_with_math() {
        let html = "<p>See $$a$$ and $$b$$.</p>";
        assert_eq!(cleanup(html), html);
    }

    #[test]
    fn cleanup_drops_empty_blocks() {
        assert_eq!(cleanup("<p>$$ $$</p>\n<p>x</p>"), "\n<p>x</p>");
    }

    #[test]
    fn cleanup_merges_split_spans() {
        assert_eq!(cleanup("$$a\n\n\nb$$"), "$$a\nb$$");
        assert_eq!(cleanup("<p>$a\nb$</p>"), "<p>$a b$</p>");
    }

    #[test]
    fn cleanup_keeps_line_breaks_between_inline_spans() {
        let html = "<p>Price $a$ is\nnice and $b$ ok.</p>";
        assert_eq!(cleanup(html), html);
        assert_eq!(cleanup("<p>$$x$$ then\n$y$ and $z$</p>"), "<p>$$x$$ then\n$y$ and $z$</p>");
    }

    #[test]
    fn cleanup_keeps_adjacent_display_spans_apart() {
        assert_eq!(cleanup("$$\nx\n$$\n$$\ny\n$$"), "$$\nx\n$$\n$$\ny\n$$");
        assert_eq!(cleanup("$$ a $$\n$$ b $$\n"), "$$ a $$\n$$ b $$\n");

        let restored = "<p>\n\n$$\nx = 1\n$$\n\n</p>\n<p>\n\n$$\ny = 2\n$$\n\n</p>\n";
        assert_eq!(cleanup(restored), "$$\nx = 1\n$$\n$$\ny = 2\n$$\n");
    }

    #[test]
    fn cleanup_drops_only_the_empty_span() {
        assert_eq!(cleanup("$$a$$ $$ $$ $$b$$"), "$$a$$  $$b$$");
    }

    #[test]
    fn cleanup_collapses_blank_runs() {
        assert_eq!(cleanup("<p>a</p>\n\n\n\n<p>b</p>"), "<p>a</p>\n\n<p>b</p>");
    }

    #[test]
    fn cleanup_leaves_pre_alone() {
        let html = "<pre><code>$$\n\n\n$$\necho $A\necho $B\n</code></pre>";
        assert_eq!(cleanup(html), html);
    }

    proptest! {
        #[test]
        fn cleanup_is_idempotent(s in "(<p>|</p>|<code>|</code>|<pre>|</pre>|\\$|\\$\\$|&#36;|&amp;#123;|x|y|\n| ){0,40}") {
            let once = cleanup(&s);
            prop_assert_eq!(cleanup(&once), once);
        }

        #[test]
        fn cleanup_is_idempotent_any_text(s in "\\PC{0,80}") {
            let once = cleanup(&s);
            prop_assert_eq!(cleanup(&once), once);
        }

        #[test]
        fn protect_restore_is_lossless_for_plain_math(parts in proptest::collection::vec("[a-z0-9^+= ]{1,8}", 1..6)) {
            let src: String = parts
                .iter()
                .enumerate()
                .map(|(i, p)| if i % 2 == 0 { format!("${}$ ", p.trim().replace(' ', "")) } else { format!("{p} ") })
                .filter(|s| s != "$$ ")
                .collect();
            let (protected, guard) = protect(&src);
            prop_assert!(!protected.contains('$') || guard.tokens().is_empty());
            let restored = guard.restore(&protected, &mut Vec::new());
            prop_assert_eq!(restored, src);
        }
    }
}
