//! Front matter extraction.
//!
//! The header is a `---` fenced block of `key: value` lines at the very start
//! of the article. Only a small value grammar is supported: quoted strings,
//! `[a, b, c]` lists, integers and bare strings.

use crate::error::{ArticleError, Diagnostic, Stage};
use crate::types::{MetaValue, Metadata};

const MARKER: &str = "---";

/// Front matter split from an article body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extracted<'a> {
    pub metadata: Metadata,
    pub body: &'a str,
    /// Warnings for header lines that were skipped.
    pub diagnostics: Vec<Diagnostic>,
}

/// Split the front matter from `source`.
///
/// A document without a header yields empty metadata and the unchanged
/// source as body. A header that is opened but never closed is an error;
/// callers are expected to fall back to treating the whole input as body.
pub fn extract_metadata(source: &str) -> Result<Extracted<'_>, ArticleError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let mut lines = source.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(Extracted {
            body: source,
            ..Default::default()
        });
    };
    if first.trim_end() != MARKER {
        return Ok(Extracted {
            body: source,
            ..Default::default()
        });
    }

    let mut metadata = Metadata::new();
    let mut diagnostics = Vec::new();
    let mut offset = first.len();
    let mut line_no = 1;

    for line in lines {
        line_no += 1;
        offset += line.len();

        let trimmed = line.trim();
        if trimmed == MARKER {
            let rest = &source[offset..];
            let body = strip_one_blank_line(rest);
            return Ok(Extracted {
                metadata,
                body,
                diagnostics,
            });
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(trimmed) {
            Some((key, value)) => {
                metadata.insert(key.to_string(), value);
            }
            None => {
                tracing::warn!(line = line_no, "skipping malformed front matter line");
                diagnostics.push(
                    Diagnostic::warning(
                        Stage::Metadata,
                        format!("malformed front matter line `{trimmed}`"),
                    )
                    .at_line(line_no),
                );
            }
        }
    }

    Err(ArticleError::UnterminatedHeader)
}

fn strip_one_blank_line(rest: &str) -> &str {
    match rest.split_once('\n') {
        Some((first, tail)) if first.trim().is_empty() => tail,
        None if rest.trim().is_empty() => "",
        _ => rest,
    }
}

fn parse_line(line: &str) -> Option<(&str, MetaValue)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, parse_value(value.trim())))
}

/// Parse a single scalar or list value.
pub fn parse_value(raw: &str) -> MetaValue {
    let raw = raw.trim();

    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(|item| unquote(item.trim()).to_string())
            .filter(|item| !item.is_empty())
            .collect();
        return MetaValue::List(items);
    }

    if is_quoted(raw) {
        return MetaValue::String(unquote(raw).to_string());
    }

    if let Ok(n) = raw.parse::<i64>() {
        return MetaValue::Number(n);
    }

    MetaValue::String(raw.to_string())
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

fn unquote(s: &str) -> &str {
    if is_quoted(s) { &s[1..s.len() - 1] } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn title_and_tags() {
        let src = "---\ntitle: \"Hello\"\ntags: [a, b]\n---\n\n# Body\n";
        let out = extract_metadata(src).unwrap();
        assert_eq!(out.metadata.get("title"), Some(&MetaValue::String("Hello".into())));
        assert_eq!(
            out.metadata.get("tags"),
            Some(&MetaValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(out.body, "# Body\n");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn no_header_passes_through() {
        let src = "# Just a heading\n\nText.";
        let out = extract_metadata(src).unwrap();
        assert!(out.metadata.is_empty());
        assert_eq!(out.body, src);
    }

    #[test]
    fn marker_must_be_first_line() {
        let src = "\n---\ntitle: x\n---\n";
        let out = extract_metadata(src).unwrap();
        assert!(out.metadata.is_empty());
        assert_eq!(out.body, src);
    }

    #[test]
    fn integers_and_strings() {
        let src = "---\norder: 12\ndelta: -3\nversion: 1.5\nquoted: \"7\"\n---\n";
        let out = extract_metadata(src).unwrap();
        assert_eq!(out.metadata["order"], MetaValue::Number(12));
        assert_eq!(out.metadata["delta"], MetaValue::Number(-3));
        assert_eq!(out.metadata["version"], MetaValue::String("1.5".into()));
        assert_eq!(out.metadata["quoted"], MetaValue::String("7".into()));
        assert_eq!(out.body, "");
    }

    #[test]
    fn keeps_source_order() {
        let src = "---\nzeta: 1\nalpha: 2\nmid: 3\n---\n";
        let out = extract_metadata(src).unwrap();
        let keys: Vec<_> = out.metadata.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn list_items_are_unquoted() {
        assert_eq!(
            parse_value("['graph theory', \"trees\", ,]"),
            MetaValue::List(vec!["graph theory".into(), "trees".into()])
        );
        assert_eq!(parse_value("[]"), MetaValue::List(vec![]));
    }

    #[test]
    fn value_may_contain_colons() {
        let out = extract_metadata("---\nsource: https://example.com/a\n---\n").unwrap();
        assert_eq!(out.metadata["source"], MetaValue::String("https://example.com/a".into()));
    }

    #[test]
    fn malformed_lines_are_skipped_with_warning() {
        let src = "---\ntitle: Ok\nthis line has no colon\n: empty key\n---\nbody";
        let out = extract_metadata(src).unwrap();
        assert_eq!(out.metadata.len(), 1);
        assert_eq!(out.diagnostics.len(), 2);
        assert_eq!(out.diagnostics[0].line, Some(3));
        assert_eq!(out.diagnostics[1].line, Some(4));
        assert_eq!(out.body, "body");
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let src = "---\n# comment\n\ntitle: T\n---\n";
        let out = extract_metadata(src).unwrap();
        assert_eq!(out.metadata.len(), 1);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn unterminated_header_is_error() {
        let err = extract_metadata("---\ntitle: x\n\n# Heading").unwrap_err();
        assert!(matches!(err, ArticleError::UnterminatedHeader));
    }

    #[test]
    fn crlf_and_bom() {
        let src = "\u{feff}---\r\ntitle: 'Win'\r\n---\r\nText\r\n";
        let out = extract_metadata(src).unwrap();
        assert_eq!(out.metadata["title"], MetaValue::String("Win".into()));
        assert_eq!(out.body, "Text\r\n");
    }
}
