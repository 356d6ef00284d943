//! Fenced code block detection shared by the line-based preprocessors.

/// An open code fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    pub marker: char,
    pub len: usize,
    /// Info string after the fence, trimmed. Empty for unlabeled fences.
    pub info: String,
}

impl Fence {
    /// Recognise an opening fence line (up to three spaces of indentation).
    pub fn open(line: &str) -> Option<Fence> {
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            return None;
        }
        let rest = &line[indent..];
        let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = rest.chars().take_while(|c| *c == marker).count();
        if len < 3 {
            return None;
        }
        let info = rest[len..].trim();
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some(Fence {
            marker,
            len,
            info: info.to_string(),
        })
    }

    /// Whether `line` closes this fence.
    pub fn is_closed_by(&self, line: &str) -> bool {
        let trimmed = line.trim_start_matches(' ');
        if line.len() - trimmed.len() > 3 {
            return false;
        }
        let run = trimmed.chars().take_while(|c| *c == self.marker).count();
        run >= self.len && trimmed[run * self.marker.len_utf8()..].trim().is_empty()
    }

    /// Language from the info string, if any.
    pub fn language(&self) -> Option<&str> {
        self.info.split_whitespace().next()
    }
}

/// Split text into lines, remembering whether it ended with a newline so the
/// caller can reassemble it without changing the trailing newline.
pub fn split_lines(text: &str) -> (Vec<&str>, bool) {
    let trailing = text.ends_with('\n');
    (text.lines().collect(), trailing)
}

pub fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}
