//! Plain-text dictionary format.
//!
//! One gram per line: `readings value probability [type_id] [previous]`,
//! fields separated by whitespace, readings joined by the trie separator.
//! Blank lines and lines starting with `#` are skipped.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{CoreError, Result};
use crate::gram::Gram;
use crate::trie::Trie;

static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<readings>\S+)\s+(?P<value>\S+)\s+(?P<prob>\S+)(?:\s+(?P<type>\d+))?(?:\s+(?P<prev>\S+))?\s*$",
    )
    .unwrap()
});

/// Parse one non-comment line into a gram keyed by `separator`.
pub fn parse_line(line: &str, separator: &str, line_no: usize) -> Result<Gram> {
    let parse_err = |message: String| CoreError::Parse {
        line: line_no,
        message,
    };

    let caps = LINE
        .captures(line.trim())
        .ok_or_else(|| parse_err("expected `readings value probability [type] [previous]`".into()))?;

    let probability: f64 = caps["prob"]
        .parse()
        .map_err(|e| parse_err(format!("bad probability {:?}: {e}", &caps["prob"])))?;
    if !probability.is_finite() {
        return Err(parse_err("probability must be finite".into()));
    }

    let type_id = match caps.name("type") {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|e| parse_err(format!("bad type id {:?}: {e}", m.as_str())))?,
        None => 0,
    };

    let readings: Vec<String> = caps["readings"]
        .split(separator)
        .map(str::to_string)
        .collect();
    if readings.iter().any(String::is_empty) {
        return Err(parse_err("empty reading component".into()));
    }

    Ok(Gram {
        readings,
        value: caps["value"].to_string(),
        type_id,
        probability,
        previous: caps.name("prev").map(|m| m.as_str().to_string()),
    })
}

/// Build a trie from dictionary text.
pub fn parse_dictionary(text: &str, separator: &str) -> Result<Trie> {
    let mut trie = Trie::new(separator)?;
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let gram = parse_line(line, separator, i + 1)?;
        trie.insert_gram(gram)?;
    }
    Ok(trie)
}

/// Render a gram in dictionary-line form.
pub fn format_line(gram: &Gram, separator: &str) -> String {
    let mut line = format!(
        "{}\t{}\t{}",
        gram.joined_readings(separator),
        gram.value,
        gram.probability
    );
    if gram.type_id != 0 || gram.previous.is_some() {
        line.push_str(&format!("\t{}", gram.type_id));
    }
    if let Some(prev) = &gram.previous {
        line.push_str(&format!("\t{prev}"));
    }
    line
}
