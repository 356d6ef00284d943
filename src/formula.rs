//! Formula detection in unlabeled code fences.
//!
//! Authors often paste formulas into plain ```` ``` ```` fences using Unicode
//! notation (`x₁² + y₁² = r²`, `√(a·b)`, `α ≤ ½`). This module recognises such
//! fences and rewrites them into `$$…$$` display math with TeX notation the
//! typesetter understands.
//!
//! The decision is a heuristic. Some code will be mistaken for a formula and
//! some formulas will be left as code; both outcomes render readably.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::FormulaOptions;
use crate::fence::{Fence, join_lines, split_lines};

/// Rewrite every unlabeled fence that looks like a formula. Returns the new
/// text and the number of fences converted.
pub fn classify_formulas(text: &str, opts: &FormulaOptions) -> (String, usize) {
    if !opts.enabled {
        return (text.to_string(), 0);
    }

    let (lines, trailing_newline) = split_lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut converted = 0;
    let mut i = 0;

    while i < lines.len() {
        let Some(fence) = Fence::open(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };

        let close = (i + 1..lines.len()).find(|&j| fence.is_closed_by(lines[j]));
        let Some(close) = close else {
            // Unclosed fence runs to the end of the document.
            out.extend(lines[i..].iter().map(|l| l.to_string()));
            break;
        };

        let body_lines = &lines[i + 1..close];
        let body = body_lines.join("\n");
        if fence.language().is_none() && is_formula(&body, opts) {
            out.push("$$".to_string());
            out.push(to_display_math(body_lines));
            out.push("$$".to_string());
            converted += 1;
        } else {
            out.extend(lines[i..=close].iter().map(|l| l.to_string()));
        }
        i = close + 1;
    }

    (join_lines(&out, trailing_newline), converted)
}

/// Decide whether the body of an unlabeled fence is a formula.
pub fn is_formula(body: &str, opts: &FormulaOptions) -> bool {
    let trimmed = body.trim();
    let len = trimmed.chars().count();
    if len < opts.min_len || len > opts.max_len {
        return false;
    }
    if is_box_drawing(trimmed) || looks_like_code(trimmed) {
        return false;
    }
    has_math_signal(trimmed)
}

/// ASCII or Unicode frame art.
pub fn is_box_drawing(body: &str) -> bool {
    static FRAME: OnceLock<Regex> = OnceLock::new();
    let frame = FRAME.get_or_init(|| Regex::new(r"(?m)^\s*[+|][-=+]{3,}[+|]\s*$").unwrap());
    body.chars().any(|c| ('\u{2500}'..='\u{257f}').contains(&c)) || frame.is_match(body)
}

fn looks_like_code(body: &str) -> bool {
    static CODE: OnceLock<Regex> = OnceLock::new();
    let code = CODE.get_or_init(|| {
        Regex::new(
            r"(?m)(;\s*$|[{}]\s*$|^\s*(fn|def|let|const|var|return|import|from|class|if|for|while|print|#include)\b|//|::|=>)",
        )
        .unwrap()
    });
    code.is_match(body)
}

fn has_math_signal(body: &str) -> bool {
    static FUNCTIONS: OnceLock<Regex> = OnceLock::new();
    static SHAPE: OnceLock<Regex> = OnceLock::new();

    if body.chars().any(|c| {
        subscript(c).is_some()
            || superscript(c).is_some()
            || greek(c).is_some()
            || operator(c).is_some()
            || fraction(c).is_some()
            || c == '√'
            || c == '∛'
    }) {
        return true;
    }

    let functions = FUNCTIONS.get_or_init(|| {
        Regex::new(r"\b(sin|cos|tan|cot|log|ln|exp|lim|max|min|sqrt|det)\s*\(").unwrap()
    });
    if functions.is_match(body) {
        return true;
    }

    let shape = SHAPE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*[A-Za-z][A-Za-z0-9']*(\([A-Za-z0-9, ]*\))?\s*(=|<|>|[-+*/^]\s*[A-Za-z0-9(])",
        )
        .unwrap()
    });
    shape.is_match(body)
}

fn to_display_math(lines: &[&str]) -> String {
    let rows: Vec<String> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(to_tex)
        .collect();

    if rows.len() <= 1 {
        return rows.into_iter().next().unwrap_or_default();
    }

    let aligned: Vec<String> = rows
        .into_iter()
        .map(|row| match row.find('=') {
            Some(pos) => {
                let lhs = row[..pos].trim_end();
                if lhs.is_empty() {
                    format!("&{}", &row[pos..])
                } else {
                    format!("{lhs} &{}", &row[pos..])
                }
            }
            None => format!("&{row}"),
        })
        .collect();
    format!("\\begin{{aligned}}\n{}\n\\end{{aligned}}", aligned.join(" \\\\\n"))
}

/// Translate Unicode math notation on one line into TeX.
pub fn to_tex(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if subscript(c).is_some() || superscript(c).is_some() {
            let is_sub = subscript(c).is_some();
            let mut run = String::new();
            while i < chars.len() {
                let mapped = if is_sub { subscript(chars[i]) } else { superscript(chars[i]) };
                match mapped {
                    Some(m) => run.push(m),
                    None => break,
                }
                i += 1;
            }
            out.push(if is_sub { '_' } else { '^' });
            if run.chars().count() == 1 {
                out.push_str(&run);
            } else {
                out.push('{');
                out.push_str(&run);
                out.push('}');
            }
            continue;
        }

        if c == '√' || c == '∛' {
            let (radicand, next) = take_radicand(&chars, i + 1);
            out.push_str(if c == '√' { "\\sqrt{" } else { "\\sqrt[3]{" });
            out.push_str(&to_tex(&radicand));
            out.push('}');
            i = next;
            continue;
        }

        if let Some((num, den)) = fraction(c) {
            out.push_str(&format!("\\frac{{{num}}}{{{den}}}"));
            i += 1;
            continue;
        }

        if let Some(cmd) = greek(c).or_else(|| operator(c)) {
            out.push_str(cmd);
            if cmd.starts_with('\\') && chars.get(i + 1).is_some_and(|n| n.is_ascii_alphanumeric()) {
                out.push(' ');
            }
            i += 1;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Radicand after a root sign: a balanced parenthesised group (parentheses
/// dropped) or a run of alphanumerics.
fn take_radicand(chars: &[char], start: usize) -> (String, usize) {
    if chars.get(start) == Some(&'(') {
        let mut depth = 0usize;
        for (j, &ch) in chars.iter().enumerate().skip(start) {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return (chars[start + 1..j].iter().collect(), j + 1);
                    }
                }
                _ => {}
            }
        }
    }
    let end = chars[start..]
        .iter()
        .position(|c| !(c.is_alphanumeric() || *c == '.'))
        .map_or(chars.len(), |p| start + p);
    (chars[start..end].iter().collect(), end)
}

fn subscript(c: char) -> Option<char> {
    Some(match c {
        '₀'..='₉' => char::from_digit(c as u32 - '₀' as u32, 10)?,
        '₊' => '+',
        '₋' => '-',
        '₌' => '=',
        '₍' => '(',
        '₎' => ')',
        'ₐ' => 'a',
        'ₑ' => 'e',
        'ₒ' => 'o',
        'ₓ' => 'x',
        'ᵢ' => 'i',
        'ⱼ' => 'j',
        'ₖ' => 'k',
        'ₘ' => 'm',
        'ₙ' => 'n',
        _ => return None,
    })
}

fn superscript(c: char) -> Option<char> {
    Some(match c {
        '⁰' => '0',
        '¹' => '1',
        '²' => '2',
        '³' => '3',
        '⁴'..='⁹' => char::from_digit(c as u32 - '⁴' as u32 + 4, 10)?,
        '⁺' => '+',
        '⁻' => '-',
        '⁼' => '=',
        '⁽' => '(',
        '⁾' => ')',
        'ⁿ' => 'n',
        'ⁱ' => 'i',
        _ => return None,
    })
}

fn fraction(c: char) -> Option<(u8, u8)> {
    Some(match c {
        '½' => (1, 2),
        '⅓' => (1, 3),
        '⅔' => (2, 3),
        '¼' => (1, 4),
        '¾' => (3, 4),
        '⅕' => (1, 5),
        '⅖' => (2, 5),
        '⅗' => (3, 5),
        '⅘' => (4, 5),
        '⅙' => (1, 6),
        '⅚' => (5, 6),
        '⅛' => (1, 8),
        '⅜' => (3, 8),
        '⅝' => (5, 8),
        '⅞' => (7, 8),
        _ => return None,
    })
}

fn greek(c: char) -> Option<&'static str> {
    Some(match c {
        'α' => "\\alpha",
        'β' => "\\beta",
        'γ' => "\\gamma",
        'δ' => "\\delta",
        'ε' => "\\varepsilon",
        'ζ' => "\\zeta",
        'η' => "\\eta",
        'θ' => "\\theta",
        'ι' => "\\iota",
        'κ' => "\\kappa",
        'λ' => "\\lambda",
        'μ' => "\\mu",
        'ν' => "\\nu",
        'ξ' => "\\xi",
        'π' => "\\pi",
        'ρ' => "\\rho",
        'σ' => "\\sigma",
        'τ' => "\\tau",
        'υ' => "\\upsilon",
        'φ' => "\\varphi",
        'χ' => "\\chi",
        'ψ' => "\\psi",
        'ω' => "\\omega",
        'Γ' => "\\Gamma",
        'Δ' => "\\Delta",
        'Θ' => "\\Theta",
        'Λ' => "\\Lambda",
        'Ξ' => "\\Xi",
        'Π' => "\\Pi",
        'Σ' => "\\Sigma",
        'Φ' => "\\Phi",
        'Ψ' => "\\Psi",
        'Ω' => "\\Omega",
        _ => return None,
    })
}

fn operator(c: char) -> Option<&'static str> {
    Some(match c {
        '×' => "\\times",
        '÷' => "\\div",
        '±' => "\\pm",
        '∓' => "\\mp",
        '≤' => "\\leq",
        '≥' => "\\geq",
        '≠' => "\\neq",
        '≈' => "\\approx",
        '≡' => "\\equiv",
        '∞' => "\\infty",
        '∑' => "\\sum",
        '∏' => "\\prod",
        '∫' => "\\int",
        '∂' => "\\partial",
        '∇' => "\\nabla",
        '→' => "\\to",
        '←' => "\\leftarrow",
        '⇒' => "\\Rightarrow",
        '⇔' => "\\Leftrightarrow",
        '·' | '⋅' => "\\cdot",
        '∈' => "\\in",
        '∉' => "\\notin",
        '⊂' => "\\subset",
        '⊆' => "\\subseteq",
        '∪' => "\\cup",
        '∩' => "\\cap",
        '∀' => "\\forall",
        '∃' => "\\exists",
        '∅' => "\\emptyset",
        '−' => "-",
        '′' => "'",
        _ => return None,
    })
}
