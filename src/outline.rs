//! Heading outline.

use kuchikikiki::traits::*;

use crate::error::{ArticleError, Diagnostic, Stage};
use crate::html::{escape_html, heading_level, parse_fragment, serialize_fragment};
use crate::slug::SlugRegistry;
use crate::types::{Heading, Outline, OutlineNode};

/// Collect the headings of `html`, make their ids unique and nest them.
///
/// Existing ids are kept unless empty or already used by an earlier
/// heading. The returned HTML is re-serialised only when an id changed.
/// With fewer than `min_headings` headings, `nodes` is `None` and an info
/// diagnostic says why.
pub fn build_outline(html: &str, min_headings: usize) -> Result<Outline, ArticleError> {
    let document = parse_fragment(html);
    let mut slugs = SlugRegistry::new();
    let mut headings = Vec::new();
    let mut changed = false;

    for element in document.descendants().elements() {
        let Some(level) = heading_level(&element.name.local) else {
            continue;
        };
        let text = plain_text(&element.as_node().text_contents());
        let mut attrs = element.attributes.borrow_mut();
        let id = match attrs.get("id") {
            Some(existing) if !existing.is_empty() && !slugs.contains(existing) => slugs.reserve(existing),
            _ => {
                changed = true;
                let id = slugs.assign(&text);
                attrs.insert("id", id.clone());
                id
            }
        };
        headings.push(Heading { level, text, id });
    }

    let html = if changed {
        serialize_fragment(&document)?
    } else {
        html.to_string()
    };

    let mut diagnostics = Vec::new();
    let nodes = if headings.is_empty() || headings.len() < min_headings {
        tracing::debug!(headings = headings.len(), min_headings, "too few headings for an outline");
        if !headings.is_empty() {
            diagnostics.push(Diagnostic::info(
                Stage::Outline,
                format!(
                    "{} heading(s) found, {min_headings} needed for an outline",
                    headings.len()
                ),
            ));
        }
        None
    } else {
        Some(nest(&headings))
    };

    Ok(Outline {
        html,
        headings,
        nodes,
        diagnostics,
    })
}

/// A heading becomes a child of the nearest preceding heading with a lower
/// level; skipped levels are fine.
pub fn nest(headings: &[Heading]) -> Vec<OutlineNode> {
    fn attach(siblings: &mut Vec<OutlineNode>, node: OutlineNode) {
        match siblings.last_mut() {
            Some(last) if last.level < node.level => attach(&mut last.children, node),
            _ => siblings.push(node),
        }
    }

    let mut roots = Vec::new();
    for heading in headings {
        attach(&mut roots, OutlineNode::from_heading(heading));
    }
    roots
}

/// Static table of contents markup.
pub fn render_toc(nodes: &[OutlineNode]) -> String {
    if nodes.is_empty() {
        return "<nav class=\"toc\"></nav>".to_string();
    }
    let mut out = String::from("<nav class=\"toc\">");
    render_list(nodes, &mut out);
    out.push_str("</nav>");
    out
}

fn render_list(nodes: &[OutlineNode], out: &mut String) {
    out.push_str("<ul>");
    for node in nodes {
        out.push_str(&format!(
            "<li class=\"toc-item toc-l{}\"><a href=\"#{}\">{}</a>",
            node.level,
            escape_html(&node.id),
            escape_html(&node.text)
        ));
        if !node.children.is_empty() {
            render_list(&node.children, out);
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
}

/// Heading text with whitespace collapsed.
fn plain_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
