//! Best-path search over the lattice.
//!
//! A state is one (node, candidate value) pair, so a bigram can look at the
//! exact value chosen just before it. Nodes are visited by start position,
//! which is a topological order of the DAG; each state keeps the best
//! predecessor, giving a single-source longest path in
//! O(states × predecessors).

use serde::{Deserialize, Serialize};

use crate::assembler::Span;
use crate::node::{BigramPolicy, OverrideKind};

/// One step of the assembled path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssembledUnit {
    pub readings: Vec<String>,
    pub value: String,
    pub start: usize,
    /// Score this node contributed given its predecessor.
    pub score: f64,
    pub overridden: bool,
}

impl AssembledUnit {
    pub fn span_length(&self) -> usize {
        self.readings.len()
    }
}

struct State<'a> {
    start: usize,
    length: usize,
    value: &'a str,
    local: f64,
    total: f64,
    steps: usize,
    back: Option<usize>,
}

/// Spans pinned by a `Specified` override, as `(start, length)`.
fn specified(spans: &[Span]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for (start, span) in spans.iter().enumerate() {
        for (&length, node) in span {
            if node
                .overridden()
                .is_some_and(|o| o.kind == OverrideKind::Specified)
            {
                out.push((start, length));
            }
        }
    }
    out
}

fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.0 + b.1 && b.0 < a.0 + a.1
}

/// Higher total wins; on equal totals fewer steps (longer spans) win;
/// otherwise the earlier candidate stays.
fn better(total: f64, steps: usize, best: Option<(f64, usize)>) -> bool {
    match best {
        None => true,
        Some((bt, bs)) => total > bt || (total == bt && steps < bs),
    }
}

pub fn best_path(spans: &[Span], policy: BigramPolicy) -> Vec<AssembledUnit> {
    let n = spans.len();
    if n == 0 {
        return Vec::new();
    }

    let pinned = specified(spans);
    let mut states: Vec<State<'_>> = Vec::new();
    let mut ending_at: Vec<Vec<usize>> = vec![Vec::new(); n + 1];

    for (start, span) in spans.iter().enumerate() {
        if start > 0 && ending_at[start].is_empty() {
            continue;
        }
        let preds: Vec<Option<usize>> = if start == 0 {
            vec![None]
        } else {
            ending_at[start].iter().copied().map(Some).collect()
        };

        for (&length, node) in span {
            let here = (start, length);
            if pinned.iter().any(|&p| p != here && overlaps(p, here)) {
                continue;
            }
            for value in node.path_candidates() {
                let mut best: Option<(f64, usize, f64, Option<usize>)> = None;
                for &pred in &preds {
                    let (prev_value, prev_total, prev_steps) = match pred {
                        Some(i) => (Some(states[i].value), states[i].total, states[i].steps),
                        None => (None, 0.0, 0),
                    };
                    let Some(local) = node.score(value, prev_value, policy) else {
                        continue;
                    };
                    let total = prev_total + local;
                    let steps = prev_steps + 1;
                    if better(total, steps, best.map(|b| (b.0, b.1))) {
                        best = Some((total, steps, local, pred));
                    }
                }
                if let Some((total, steps, local, back)) = best {
                    ending_at[start + length].push(states.len());
                    states.push(State {
                        start,
                        length,
                        value,
                        local,
                        total,
                        steps,
                        back,
                    });
                }
            }
        }
    }

    let mut best: Option<(f64, usize, usize)> = None;
    for &i in &ending_at[n] {
        if better(states[i].total, states[i].steps, best.map(|b| (b.0, b.1))) {
            best = Some((states[i].total, states[i].steps, i));
        }
    }

    let mut path = Vec::new();
    let mut cursor = best.map(|b| b.2);
    while let Some(i) = cursor {
        let state = &states[i];
        let node = &spans[state.start][&state.length];
        path.push(AssembledUnit {
            readings: node.readings().to_vec(),
            value: state.value.to_string(),
            start: state.start,
            score: state.local,
            overridden: node.overridden().is_some(),
        });
        cursor = state.back;
    }
    path.reverse();
    path
}
