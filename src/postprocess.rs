//! Rewrites on the converted HTML tree: image sources, document links and
//! missing heading ids.

use kuchikikiki::Attributes;
use kuchikikiki::traits::*;

use crate::config::ParseOptions;
use crate::error::ArticleError;
use crate::html::{heading_level, parse_fragment, serialize_fragment};
use crate::slug::SlugRegistry;

/// How a `src`/`href` reference is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefKind {
    #[default]
    Empty,
    /// `/path`
    Absolute,
    /// `./file` or `../file`
    DocRelative,
    /// `file`
    Bare,
    /// `#anchor`
    Fragment,
    /// `http:`, `https:` or `//`
    External,
    /// `mailto:`, `tel:`, `data:` and any other scheme
    Scheme,
}

impl RefKind {
    pub fn classify(reference: &str) -> Self {
        let reference = reference.trim();
        if reference.is_empty() {
            Self::Empty
        } else if reference.starts_with("//")
            || starts_with_ignore_case(reference, "http://")
            || starts_with_ignore_case(reference, "https://")
        {
            Self::External
        } else if has_scheme(reference) {
            Self::Scheme
        } else if reference.starts_with('/') {
            Self::Absolute
        } else if reference.starts_with('#') {
            Self::Fragment
        } else if reference.starts_with("./") || reference.starts_with("../") {
            Self::DocRelative
        } else {
            Self::Bare
        }
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// `scheme:` per RFC 3986, checked before the first `/`, `?` or `#`.
fn has_scheme(s: &str) -> bool {
    let Some(colon) = s.find(':') else {
        return false;
    };
    let head = &s[..colon];
    if head.contains(['/', '?', '#']) {
        return false;
    }
    let mut chars = head.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Path-resolution inputs for one document.
#[derive(Debug, Clone)]
pub struct RefContext<'a> {
    pub options: &'a ParseOptions,
    /// Directory of the document relative to the content root, no slashes
    /// at either end.
    pub doc_dir: String,
}

impl<'a> RefContext<'a> {
    pub fn new(options: &'a ParseOptions, doc_path: Option<&str>) -> Self {
        let doc_dir = doc_path
            .map(|p| {
                let p = p.trim_matches('/');
                p.rsplit_once('/').map_or("", |(dir, _)| dir).to_string()
            })
            .unwrap_or_default();
        Self { options, doc_dir }
    }

    /// New image source, or `None` when it stays as written.
    pub fn image_src(&self, src: &str) -> Option<String> {
        let src = src.trim();
        let resolved = match RefKind::classify(src) {
            RefKind::DocRelative => resolve(&self.doc_dir, src),
            RefKind::Bare => resolve(&join(&self.doc_dir, "images"), src),
            _ => return None,
        };
        Some(join(&self.options.content_root, &resolved))
    }

    /// New href for a link to another document's source file.
    pub fn document_href(&self, href: &str) -> Option<String> {
        let href = href.trim();
        let kind = RefKind::classify(href);
        if !matches!(kind, RefKind::DocRelative | RefKind::Bare | RefKind::Absolute) {
            return None;
        }
        let (path, fragment) = match href.find(['#', '?']) {
            Some(pos) if href[pos..].starts_with('#') => (&href[..pos], &href[pos..]),
            Some(pos) => {
                let frag = href[pos..].find('#').map_or("", |f| &href[pos + f..]);
                (&href[..pos], frag)
            }
            None => (href, ""),
        };
        let stem = strip_doc_extension(path)?;
        let resolved = if kind == RefKind::Absolute {
            resolve("", stem)
        } else {
            resolve(&self.doc_dir, stem)
        };
        Some(format!("{}{}{}", self.options.document_route, resolved, fragment))
    }
}

fn strip_doc_extension(path: &str) -> Option<&str> {
    [".md", ".markdown"].iter().find_map(|ext| {
        let cut = path.len().checked_sub(ext.len())?;
        (path.is_char_boundary(cut) && path[cut..].eq_ignore_ascii_case(ext)).then(|| &path[..cut])
    })
}

/// Resolve `rel` against `base`, folding `.` and `..`. Never climbs above
/// the root.
fn resolve(base: &str, rel: &str) -> String {
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn join(base: &str, rest: &str) -> String {
    match (base.trim_end_matches('/'), rest.trim_start_matches('/')) {
        ("", r) if base.starts_with('/') => format!("/{r}"),
        (b, "") => b.to_string(),
        ("", r) => r.to_string(),
        (b, r) => format!("{b}/{r}"),
    }
}

/// Counts of what [`process`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rewrites {
    pub images: usize,
    pub internal_links: usize,
    pub external_links: usize,
    pub heading_ids: usize,
}

impl Rewrites {
    pub fn total(&self) -> usize {
        self.images + self.internal_links + self.external_links + self.heading_ids
    }
}

/// Rewrite images, links and heading ids in `html`.
///
/// Returns the input unchanged when nothing was rewritten. Attribute values
/// are read decoded and written back escaped by the serializer.
pub fn process(
    html: &str,
    refs: &RefContext<'_>,
    slugs: &mut SlugRegistry,
) -> Result<(String, Rewrites), ArticleError> {
    let document = parse_fragment(html);
    let mut rewrites = Rewrites::default();

    for element in document.descendants().elements() {
        let tag: &str = &element.name.local;
        let mut attrs = element.attributes.borrow_mut();
        match tag {
            "img" => rewrite_image(&mut attrs, refs, &mut rewrites),
            "a" => rewrite_link(&mut attrs, refs, &mut rewrites),
            _ if heading_level(tag).is_some() && attrs.get("id").is_none_or(str::is_empty) => {
                let id = slugs.assign(&element.as_node().text_contents());
                attrs.insert("id", id);
                rewrites.heading_ids += 1;
            }
            _ => {}
        }
    }

    tracing::debug!(
        images = rewrites.images,
        internal = rewrites.internal_links,
        external = rewrites.external_links,
        headings = rewrites.heading_ids,
        "post-processed html"
    );

    if rewrites.total() == 0 {
        return Ok((html.to_string(), rewrites));
    }
    Ok((serialize_fragment(&document)?, rewrites))
}

fn rewrite_image(attrs: &mut Attributes, refs: &RefContext<'_>, rewrites: &mut Rewrites) {
    let Some(new_src) = attrs.get("src").and_then(|src| refs.image_src(src)) else {
        return;
    };
    attrs.insert("src", new_src);
    if refs.options.lazy_images {
        if !attrs.contains("loading") {
            attrs.insert("loading", "lazy".to_string());
        }
        if !attrs.contains("decoding") {
            attrs.insert("decoding", "async".to_string());
        }
    }
    rewrites.images += 1;
}

fn rewrite_link(attrs: &mut Attributes, refs: &RefContext<'_>, rewrites: &mut Rewrites) {
    let Some(href) = attrs.get("href").map(str::to_string) else {
        return;
    };
    match RefKind::classify(&href) {
        RefKind::External => {
            if attrs.contains("target") || attrs.contains("rel") {
                return;
            }
            attrs.insert("target", "_blank".to_string());
            attrs.insert("rel", refs.options.external_rel.clone());
            rewrites.external_links += 1;
        }
        RefKind::DocRelative | RefKind::Bare | RefKind::Absolute => {
            if let Some(new_href) = refs.document_href(&href) {
                attrs.insert("href", new_href);
                attrs.insert("data-internal", "true".to_string());
                rewrites.internal_links += 1;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn run(html: &str, path: Option<&str>) -> String {
        let options = ParseOptions::default();
        let refs = RefContext::new(&options, path);
        let mut slugs = SlugRegistry::new();
        process(html, &refs, &mut slugs).unwrap().0
    }

    /// Attributes of every `tag` element in `html`, in document order.
    fn attrs_of(html: &str, tag: &str) -> Vec<BTreeMap<String, String>> {
        parse_fragment(html)
            .select(tag)
            .unwrap()
            .map(|el| {
                el.attributes
                    .borrow()
                    .map
                    .iter()
                    .map(|(name, attr)| (name.local.to_string(), attr.value.clone()))
                    .collect()
            })
            .collect()
    }

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn classify_references() {
        assert_eq!(RefKind::classify("#top"), RefKind::Fragment);
        assert_eq!(RefKind::classify("./a.png"), RefKind::DocRelative);
        assert_eq!(RefKind::classify("../a.md"), RefKind::DocRelative);
        assert_eq!(RefKind::classify("a.png"), RefKind::Bare);
        assert_eq!(RefKind::classify("/static/a.png"), RefKind::Absolute);
        assert_eq!(RefKind::classify("https://x.org"), RefKind::External);
        assert_eq!(RefKind::classify("HTTP://x.org"), RefKind::External);
        assert_eq!(RefKind::classify("//cdn.x.org/a.js"), RefKind::External);
        assert_eq!(RefKind::classify("mailto:a@b.c"), RefKind::Scheme);
        assert_eq!(RefKind::classify("data:image/png;base64,AA"), RefKind::Scheme);
        assert_eq!(RefKind::classify("dir/a:b.png"), RefKind::Bare);
        assert_eq!(RefKind::classify(""), RefKind::Empty);
    }

    #[test]
    fn images_resolve_against_document_dir() {
        let out = run(
            "<p><img src=\"./fig.png\" alt=\"f\" /><img src=\"plot.png\" alt=\"p\" /></p>",
            Some("graphs/intro.md"),
        );
        assert_eq!(
            attrs_of(&out, "img"),
            vec![
                attrs(&[
                    ("src", "/content/graphs/fig.png"),
                    ("alt", "f"),
                    ("loading", "lazy"),
                    ("decoding", "async"),
                ]),
                attrs(&[
                    ("src", "/content/graphs/images/plot.png"),
                    ("alt", "p"),
                    ("loading", "lazy"),
                    ("decoding", "async"),
                ]),
            ]
        );
        assert!(out.starts_with("<p><img "), "{out}");
    }

    #[test]
    fn images_without_document_path() {
        let out = run("<img src=\"a.png\">", None);
        assert_eq!(
            attrs_of(&out, "img"),
            vec![attrs(&[
                ("src", "/content/images/a.png"),
                ("loading", "lazy"),
                ("decoding", "async"),
            ])]
        );
    }

    #[test]
    fn parent_directory_images() {
        let out = run("<img src=\"../shared/a.png\">", Some("/graphs/trees/intro.md"));
        assert!(out.contains("src=\"/content/graphs/shared/a.png\""), "{out}");
    }

    #[test]
    fn absolute_external_and_data_images_untouched() {
        for html in [
            "<img src=\"/static/a.png\">",
            "<img src=\"https://x.org/a.png\">",
            "<img src=\"//x.org/a.png\">",
            "<img src=\"data:image/png;base64,AAAA\">",
        ] {
            assert_eq!(run(html, Some("a/b.md")), html);
        }
    }

    #[test]
    fn existing_loading_attribute_kept() {
        let out = run("<img src=\"a.png\" loading=\"eager\">", None);
        assert_eq!(attrs_of(&out, "img")[0]["loading"], "eager");
        assert!(!out.contains("loading=\"lazy\""));
    }

    #[test]
    fn lazy_loading_can_be_disabled() {
        let options = ParseOptions {
            lazy_images: false,
            ..ParseOptions::default()
        };
        let refs = RefContext::new(&options, None);
        let (out, _) = process("<img src=\"a.png\">", &refs, &mut SlugRegistry::new()).unwrap();
        assert_eq!(out, "<img src=\"/content/images/a.png\">");
    }

    #[test]
    fn document_links_become_routes() {
        let out = run(
            "<a href=\"trees.md#roots\">t</a> <a href=\"../sets/union.markdown\">u</a> <a href=\"/algebra/groups.md\">g</a>",
            Some("graphs/intro.md"),
        );
        let internal = |href: &str| attrs(&[("href", href), ("data-internal", "true")]);
        assert_eq!(
            attrs_of(&out, "a"),
            vec![
                internal("/article/graphs/trees#roots"),
                internal("/article/sets/union"),
                internal("/article/algebra/groups"),
            ]
        );
    }

    #[test]
    fn encoded_hrefs_are_decoded_before_resolving() {
        let out = run("<a href=\"notes&#x2F;q&amp;a.md\">q</a>", Some("faq/index.md"));
        assert_eq!(attrs_of(&out, "a")[0]["href"], "/article/faq/notes/q&a");
        assert!(out.contains("href=\"/article/faq/notes/q&amp;a\""), "{out}");
    }

    #[test]
    fn non_document_links_untouched() {
        for html in [
            "<a href=\"#section\">s</a>",
            "<a href=\"mailto:me@x.org\">m</a>",
            "<a href=\"tel:+100\">t</a>",
            "<a href=\"notes.txt\">n</a>",
            "<a href=\"/static/file.pdf\">p</a>",
        ] {
            assert_eq!(run(html, Some("a/b.md")), html);
        }
    }

    #[test]
    fn external_links_open_in_new_tab() {
        let out = run("<a href=\"https://x.org\">x</a>", None);
        assert_eq!(
            attrs_of(&out, "a"),
            vec![attrs(&[
                ("href", "https://x.org"),
                ("target", "_blank"),
                ("rel", "noopener noreferrer"),
            ])]
        );
        let kept = "<a href=\"https://x.org\" rel=\"me\">x</a>";
        assert_eq!(run(kept, None), kept);
    }

    #[test]
    fn headings_without_ids_get_them() {
        let options = ParseOptions::default();
        let refs = RefContext::new(&options, None);
        let mut slugs = SlugRegistry::new();
        slugs.reserve("intro");
        let (out, rewrites) =
            process("<h2 id=\"intro\">Intro</h2><h2>Intro</h2>", &refs, &mut slugs).unwrap();
        assert_eq!(out, "<h2 id=\"intro\">Intro</h2><h2 id=\"intro-1\">Intro</h2>");
        assert_eq!(rewrites.heading_ids, 1);
    }

    #[test]
    fn heading_entities_are_decoded_for_slugs() {
        let out = run("<h2>Euler&#x27;s&nbsp;formula</h2>", None);
        assert_eq!(attrs_of(&out, "h2")[0]["id"], "eulers-formula");
    }

    #[test]
    fn unchanged_html_is_returned_verbatim() {
        let html = "<p class='x'>a &amp; b</p>";
        assert_eq!(run(html, None), html);
    }

    #[test]
    fn malformed_fragment_is_recovered() {
        let out = run("<p>see <a href=\"https://x.org\">x", None);
        assert_eq!(
            attrs_of(&out, "a"),
            vec![attrs(&[
                ("href", "https://x.org"),
                ("target", "_blank"),
                ("rel", "noopener noreferrer"),
            ])]
        );
        assert!(out.ends_with("x</a></p>"), "{out}");
    }
}
