//! Heading slugs and per-parse id uniqueness.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::guard::strip_placeholders;

/// Turn heading text into an id fragment.
///
/// Tags and math placeholders are removed, the text is lower-cased, and only
/// Latin and Cyrillic letters, digits, spaces and hyphens are kept. Runs of
/// whitespace become a single hyphen. May return an empty string.
pub fn slugify(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());

    let text = strip_placeholders(text);
    let text = tag.replace_all(&text, "");
    let lowered = text.to_lowercase();

    let kept: String = lowered
        .chars()
        .filter(|c| c.is_whitespace() || *c == '-' || is_slug_char(*c))
        .collect();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('-')
        .to_string()
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || (c.is_alphabetic()
            && matches!(c as u32, 0x00c0..=0x024f | 0x0400..=0x04ff))
}

/// Ids handed out during one parse.
///
/// A registry is created at the start of each parse and dropped with it, so
/// ids never leak between documents.
#[derive(Debug, Clone, Default)]
pub struct SlugRegistry {
    used: HashSet<String>,
    ordinal: usize,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a unique id from heading text. Text with no usable characters
    /// falls back to `section-<ordinal>`.
    pub fn assign(&mut self, text: &str) -> String {
        self.ordinal += 1;
        let base = slugify(text);
        let base = if base.is_empty() {
            format!("section-{}", self.ordinal)
        } else {
            base
        };
        self.unique(base)
    }

    /// Register an id chosen by the author, suffixing it if it is taken.
    pub fn reserve(&mut self, id: &str) -> String {
        self.ordinal += 1;
        self.unique(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    fn unique(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
