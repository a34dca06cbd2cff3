//! Graphviz rendering of the lattice, one vertex per node named by its
//! current value. Output order follows construction order (start position,
//! then span length), never score order.
//!
//! Values that are plain DOT identifiers (letters, digits, `_` and any
//! non-ASCII character, not starting with a digit) are written bare, so
//! ordinary lattices read like `幽蝶 -> 能;`. Anything else, and the
//! keywords `graph`, `node` and friends, is double-quoted with `"` and `\`
//! escaped.

use std::borrow::Cow;
use std::fmt::Write;

use crate::assembler::Span;

const KEYWORDS: [&str; 6] = ["node", "edge", "graph", "digraph", "subgraph", "strict"];

fn is_plain_id(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let word = |c: char| c == '_' || c.is_ascii_alphanumeric() || !c.is_ascii();
    (word(first) && !first.is_ascii_digit())
        && chars.all(word)
        && !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(value))
}

fn dot_id(value: &str) -> Cow<'_, str> {
    if is_plain_id(value) {
        return Cow::Borrowed(value);
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    Cow::Owned(format!("\"{escaped}\""))
}

pub fn render(spans: &[Span], vertical: bool) -> String {
    let rank = if vertical { "TB" } else { "LR" };
    let mut out = format!("digraph {{\ngraph [ rankdir={rank} ];\nBOS;\n");
    let n = spans.len();

    for (start, span) in spans.iter().enumerate() {
        for (&length, node) in span {
            let value = dot_id(node.current_value());
            if start == 0 {
                let _ = writeln!(out, "BOS -> {value};");
            }
            let _ = writeln!(out, "{value};");
            let end = start + length;
            if let Some(next) = spans.get(end) {
                for dest in next.values() {
                    let _ = writeln!(out, "{value} -> {};", dot_id(dest.current_value()));
                }
            }
            if end == n {
                let _ = writeln!(out, "{value} -> EOS;");
            }
        }
    }

    out.push_str("EOS;\n}\n");
    out
}
