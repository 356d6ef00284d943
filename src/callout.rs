//! Callout boxes.
//!
//! A callout is a blockquote whose first line carries a marker and a bold
//! label:
//!
//! ```text
//! > ⚠️ **Division by zero**
//! > The denominator must never vanish.
//! ```
//!
//! The marker may also be written as a tag, e.g. `> [!warning] **Label**`.
//! Callouts are rewritten into container markup before markdown conversion;
//! their bodies stay markdown so the converter still renders them.

use crate::error::{Diagnostic, Stage};
use crate::fence::{Fence, join_lines, split_lines};
use crate::html::escape_html;

/// The four supported callout kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalloutKind {
    Warning,
    KeyIdea,
    Note,
    Example,
}

impl CalloutKind {
    pub const ALL: [CalloutKind; 4] = [
        CalloutKind::Warning,
        CalloutKind::KeyIdea,
        CalloutKind::Note,
        CalloutKind::Example,
    ];

    /// CSS modifier and tag name.
    pub fn as_str(self) -> &'static str {
        match self {
            CalloutKind::Warning => "warning",
            CalloutKind::KeyIdea => "key-idea",
            CalloutKind::Note => "note",
            CalloutKind::Example => "example",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            CalloutKind::Warning => "⚠️",
            CalloutKind::KeyIdea => "💡",
            CalloutKind::Note => "📝",
            CalloutKind::Example => "📌",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            CalloutKind::Warning => "Warning",
            CalloutKind::KeyIdea => "Key idea",
            CalloutKind::Note => "Note",
            CalloutKind::Example => "Example",
        }
    }

    fn from_tag(tag: &str) -> Option<CalloutKind> {
        match tag.to_ascii_lowercase().as_str() {
            "warning" => Some(CalloutKind::Warning),
            "key-idea" | "keyidea" | "key" => Some(CalloutKind::KeyIdea),
            "note" => Some(CalloutKind::Note),
            "example" => Some(CalloutKind::Example),
            _ => None,
        }
    }

    /// Strip a leading marker (emoji or `[!tag]`) from `s`.
    fn strip_marker(s: &str) -> Option<(CalloutKind, &str)> {
        for kind in CalloutKind::ALL {
            let icon = kind.icon();
            // Accept the emoji with or without its variation selector.
            let bare = icon.trim_end_matches('\u{fe0f}');
            if let Some(rest) = s.strip_prefix(icon).or_else(|| s.strip_prefix(bare)) {
                return Some((kind, rest));
            }
        }
        let inner = s.strip_prefix("[!")?;
        let (tag, rest) = inner.split_once(']')?;
        Some((CalloutKind::from_tag(tag)?, rest))
    }
}

/// Parsed first line of a callout.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CalloutHead<'a> {
    kind: CalloutKind,
    label: &'a str,
    trailing: &'a str,
}

/// Rewrite every callout in `text`. Fenced code is left alone; quotes that
/// carry a marker but no bold label stay ordinary quotes and produce a
/// warning.
pub fn preprocess_callouts(text: &str, diagnostics: &mut Vec<Diagnostic>) -> String {
    let (lines, trailing_newline) = split_lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut fence: Option<Fence> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(open) = &fence {
            if open.is_closed_by(line) {
                fence = None;
            }
            out.push(line.to_string());
            i += 1;
            continue;
        }
        if let Some(open) = Fence::open(line) {
            fence = Some(open);
            out.push(line.to_string());
            i += 1;
            continue;
        }

        let Some(first) = strip_quote(line) else {
            out.push(line.to_string());
            i += 1;
            continue;
        };

        match parse_head(first) {
            Ok(Some(head)) => {
                let mut body: Vec<&str> = Vec::new();
                if !head.trailing.is_empty() {
                    body.push(head.trailing);
                }
                let mut j = i + 1;
                while j < lines.len() {
                    match strip_quote(lines[j]) {
                        Some(rest) => body.push(rest),
                        None => break,
                    }
                    j += 1;
                }
                out.push(render_callout(&head, &body.join("\n"), diagnostics));
                i = j;
            }
            Ok(None) => {
                out.push(line.to_string());
                i += 1;
            }
            Err(kind) => {
                tracing::debug!(kind = kind.as_str(), line = i + 1, "callout marker without bold label");
                diagnostics.push(
                    Diagnostic::warning(
                        Stage::Callouts,
                        format!("{} marker without a bold label; left as a quote", kind.as_str()),
                    )
                    .at_line(i + 1),
                );
                out.push(line.to_string());
                i += 1;
            }
        }
    }

    join_lines(&out, trailing_newline)
}

/// Strip the blockquote prefix (`>` plus one optional space).
fn strip_quote(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = line[indent..].strip_prefix('>')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// `Ok(None)` when the quote has no marker, `Err(kind)` when it has a marker
/// but no bold label.
fn parse_head(first: &str) -> Result<Option<CalloutHead<'_>>, CalloutKind> {
    let Some((kind, rest)) = CalloutKind::strip_marker(first.trim_start()) else {
        return Ok(None);
    };
    let rest = rest.trim_start();
    let inner = rest.strip_prefix("**").ok_or(kind)?;
    let (label, trailing) = inner.split_once("**").ok_or(kind)?;
    let label = label.trim();
    if label.is_empty() {
        return Err(kind);
    }
    Ok(Some(CalloutHead {
        kind,
        label,
        trailing: trailing.trim(),
    }))
}

fn render_callout(head: &CalloutHead<'_>, body: &str, diagnostics: &mut Vec<Diagnostic>) -> String {
    let kind = head.kind.as_str();
    // Bodies may hold further callouts.
    let body = preprocess_callouts(body, diagnostics);
    format!(
        "<div class=\"callout callout-{kind}\" data-callout=\"{kind}\">\n\
         <div class=\"callout-header\"><span class=\"callout-icon\" aria-hidden=\"true\">{icon}</span><span class=\"callout-title\">{title}</span></div>\n\
         <div class=\"callout-body\">\n\n{body}\n\n</div>\n</div>\n",
        icon = head.kind.icon(),
        title = escape_html(head.label),
    )
}
