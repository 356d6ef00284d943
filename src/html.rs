//! HTML helpers shared by the renderers, the post-processor and the outline
//! builder.

use std::io;

use kuchikikiki::NodeRef;
use kuchikikiki::traits::*;

use crate::error::ArticleError;

/// Escape text for element content and double-quoted attribute values.
pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Parse converted markdown output into a document tree.
///
/// The fragment is placed after an explicit `<body>` start tag, so `<style>`,
/// `<meta>` and similar elements stay in place instead of moving to `<head>`.
/// Malformed markup is recovered the way browsers recover it.
pub(crate) fn parse_fragment(html: &str) -> NodeRef {
    kuchikikiki::parse_html().one(format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>"))
}

/// Serialize the children of `<body>` back into a fragment.
pub(crate) fn serialize_fragment(document: &NodeRef) -> Result<String, ArticleError> {
    let mut out = Vec::new();
    if let Ok(body) = document.select_first("body") {
        for child in body.as_node().children() {
            child.serialize(&mut out)?;
        }
    }
    String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// `1..=6` for `h1`..`h6`.
pub(crate) fn heading_level(tag: &str) -> Option<u8> {
    match tag.as_bytes() {
        [b'h', d @ b'1'..=b'6'] => Some(d - b'0'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_markup_and_quotes() {
        assert_eq!(escape_html("a < b & \"c\" > d"), "a &lt; b &amp; &quot;c&quot; &gt; d");
    }

    #[test]
    fn fragment_round_trip() {
        let html = "<h2 id=\"a\">A &amp; B</h2>\n<p>x <em>y</em></p>\n";
        assert_eq!(serialize_fragment(&parse_fragment(html)).unwrap(), html);
    }

    #[test]
    fn head_elements_stay_in_the_fragment() {
        let html = "<style>p { color: red; }</style>\n<p>x</p>";
        assert_eq!(serialize_fragment(&parse_fragment(html)).unwrap(), html);
    }

    #[test]
    fn unterminated_markup_is_recovered() {
        let out = serialize_fragment(&parse_fragment("<p>ok<em>still open")).unwrap();
        assert_eq!(out, "<p>ok<em>still open</em></p>");
    }

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("h1"), Some(1));
        assert_eq!(heading_level("h6"), Some(6));
        assert_eq!(heading_level("h7"), None);
        assert_eq!(heading_level("hr"), None);
        assert_eq!(heading_level("header"), None);
    }
}
