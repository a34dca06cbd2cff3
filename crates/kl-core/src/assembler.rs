//! Incremental lattice over a reading-key sequence.
//!
//! `spans[i]` holds every node starting at key `i`, keyed by span length.
//! Nodes are plain values in that arena; edges are implied by adjacency
//! (a node ending at `p` connects to every node starting at `p`), so
//! overrides and refreshes are index rewrites.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_SPAN_LENGTH, FALLBACK_PROBABILITY, FALLBACK_TYPE_ID};
use crate::error::{CoreError, Result};
use crate::gram::{Gram, GramQuerier};
use crate::node::{BigramPolicy, CandidatePair, Node, OverrideKind};
use crate::walk::{self, AssembledUnit};

pub type Span = BTreeMap<usize, Node>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    pub max_span_length: usize,
    pub bigram_policy: BigramPolicy,
    pub fallback_probability: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_span_length: DEFAULT_MAX_SPAN_LENGTH,
            bigram_policy: BigramPolicy::default(),
            fallback_probability: FALLBACK_PROBABILITY,
        }
    }
}

/// Which side of the cursor `drop_key` removes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The key before the cursor (backspace).
    Rear,
    /// The key after the cursor (delete).
    Front,
}

pub struct Assembler<'q> {
    keys: Vec<String>,
    spans: Vec<Span>,
    cursor: usize,
    config: AssemblerConfig,
    querier: Box<dyn GramQuerier + 'q>,
    assembled: Option<Vec<AssembledUnit>>,
}

impl<'q> Assembler<'q> {
    pub fn new(querier: impl GramQuerier + 'q, config: AssemblerConfig) -> Result<Self> {
        if config.max_span_length == 0 {
            return Err(CoreError::Configuration(
                "max_span_length must be at least 1".into(),
            ));
        }
        if !config.fallback_probability.is_finite() {
            return Err(CoreError::Configuration(
                "fallback_probability must be finite".into(),
            ));
        }
        Ok(Self {
            keys: Vec::new(),
            spans: Vec::new(),
            cursor: 0,
            config,
            querier: Box::new(querier),
            assembled: None,
        })
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn node_count(&self) -> usize {
        self.spans.iter().map(BTreeMap::len).sum()
    }

    pub fn node(&self, start: usize, length: usize) -> Option<&Node> {
        self.spans.get(start)?.get(&length)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, position: usize) -> Result<()> {
        if position > self.keys.len() {
            return Err(self.invalid_position(position));
        }
        self.cursor = position;
        Ok(())
    }

    /// The last assembled path, if nothing changed since.
    pub fn assembled(&self) -> Option<&[AssembledUnit]> {
        self.assembled.as_deref()
    }

    pub fn is_assembled(&self) -> bool {
        self.assembled.is_some()
    }

    /// Swap the gram supplier. Existing nodes keep their grams until
    /// `assign_nodes` is called.
    pub fn set_querier(&mut self, querier: impl GramQuerier + 'q) {
        self.querier = Box::new(querier);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.spans.clear();
        self.cursor = 0;
        self.assembled = None;
    }

    /// Insert a reading key at the cursor and grow the lattice around it.
    pub fn insert_key(&mut self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        let at = self.cursor;
        self.keys.insert(at, key.to_string());
        self.spans.insert(at, Span::new());
        self.drop_nodes_crossing(at);
        self.cursor += 1;
        self.fill_around(at);
        self.assembled = None;
        Ok(())
    }

    /// Remove the key on one side of the cursor.
    pub fn drop_key(&mut self, direction: Direction) -> Result<()> {
        let at = match direction {
            Direction::Rear if self.cursor > 0 => self.cursor - 1,
            Direction::Front if self.cursor < self.keys.len() => self.cursor,
            _ => return Err(self.invalid_position(self.cursor)),
        };
        self.keys.remove(at);
        self.spans.remove(at);
        self.drop_nodes_crossing(at);
        if direction == Direction::Rear {
            self.cursor -= 1;
        }
        self.fill_around(at);
        self.assembled = None;
        Ok(())
    }

    /// Re-query the supplier. With `update_existing`, every node gets a
    /// fresh gram list (overrides survive if their value is still there);
    /// otherwise only missing spans are created. Returns the number of
    /// nodes created or refreshed.
    pub fn assign_nodes(&mut self, update_existing: bool) -> usize {
        let mut touched = 0;
        if update_existing {
            for start in 0..self.spans.len() {
                let lengths: Vec<usize> = self.spans[start].keys().copied().collect();
                for length in lengths {
                    let grams = self.grams_for(start, length);
                    if grams.is_empty() {
                        self.spans[start].remove(&length);
                    } else if let Some(node) = self.spans[start].get_mut(&length) {
                        node.set_grams(grams);
                    }
                    touched += 1;
                }
            }
        }
        touched += self.fill(0, self.keys.len());
        self.assembled = None;
        touched
    }

    /// Force `pair.value` on the node whose readings equal `pair.readings`
    /// and which covers key `at`. `at == key_count` addresses the last key;
    /// if no matching node covers `at`, the key before it is tried.
    pub fn override_candidate(
        &mut self,
        pair: &CandidatePair,
        at: usize,
        kind: OverrideKind,
    ) -> Result<()> {
        self.apply_override(Some(pair.readings.as_slice()), &pair.value, at, kind)
    }

    /// Like [`override_candidate`](Self::override_candidate), matching any readings.
    pub fn override_value(&mut self, value: &str, at: usize, kind: OverrideKind) -> Result<()> {
        self.apply_override(None, value, at, kind)
    }

    fn apply_override(
        &mut self,
        readings: Option<&[String]>,
        value: &str,
        at: usize,
        kind: OverrideKind,
    ) -> Result<()> {
        let n = self.keys.len();
        if n == 0 || at > n {
            return Err(self.invalid_position(at));
        }
        let position = at.min(n - 1);

        let matches =
            |node: &Node| readings.is_none_or(|r| node.readings() == r) && node.has_value(value);
        let find = |p: usize| {
            self.covering(p)
                .into_iter()
                .find(|&(s, l)| self.spans[s].get(&l).is_some_and(|node| matches(node)))
        };
        let target = find(position).or_else(|| position.checked_sub(1).and_then(&find));
        let Some((start, length)) = target else {
            return Err(CoreError::NoMatchingCandidate {
                position: at,
                value: value.to_string(),
            });
        };

        for (s, l) in self.overlapping(start, length) {
            if (s, l) != (start, length)
                && let Some(node) = self.spans[s].get_mut(&l)
            {
                node.reset();
            }
        }
        if let Some(node) = self.spans[start].get_mut(&length) {
            node.select_override(value, kind);
        }
        self.assembled = None;
        Ok(())
    }

    /// Candidates of every node covering `position`, longest spans first.
    pub fn candidates_at(&self, position: usize) -> Vec<CandidatePair> {
        let n = self.keys.len();
        if n == 0 || position > n {
            return Vec::new();
        }
        let mut nodes = self.covering(position.min(n - 1));
        nodes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        nodes
            .into_iter()
            .filter_map(|(s, l)| self.spans[s].get(&l))
            .flat_map(|node| {
                node.values().into_iter().map(|v| CandidatePair {
                    readings: node.readings().to_vec(),
                    value: v.to_string(),
                })
            })
            .collect()
    }

    /// Run path search and cache the result.
    pub fn assemble(&mut self) -> Vec<AssembledUnit> {
        let path = walk::best_path(&self.spans, self.config.bigram_policy);
        self.assembled = Some(path.clone());
        path
    }

    pub fn dump_dot(&self, vertical: bool) -> String {
        crate::dot::render(&self.spans, vertical)
    }

    // --- lattice maintenance ---

    fn invalid_position(&self, position: usize) -> CoreError {
        CoreError::InvalidPosition {
            position,
            key_count: self.keys.len(),
        }
    }

    /// `(start, length)` of nodes covering key `p`: those starting at `p`
    /// first, then earlier starts, shortest first within a start.
    fn covering(&self, p: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let lowest = p.saturating_sub(self.config.max_span_length - 1);
        for start in (lowest..=p).rev() {
            let Some(span) = self.spans.get(start) else {
                continue;
            };
            out.extend(
                span.keys()
                    .filter(|&&l| start + l > p)
                    .map(|&l| (start, l)),
            );
        }
        out
    }

    fn overlapping(&self, start: usize, length: usize) -> Vec<(usize, usize)> {
        let end = start + length;
        let lowest = start.saturating_sub(self.config.max_span_length - 1);
        let mut out = Vec::new();
        for s in lowest..end.min(self.spans.len()) {
            out.extend(
                self.spans[s]
                    .keys()
                    .filter(|&&l| s + l > start)
                    .map(|&l| (s, l)),
            );
        }
        out
    }

    /// Remove nodes that start before `at` and extend past it.
    fn drop_nodes_crossing(&mut self, at: usize) {
        let lowest = at.saturating_sub(self.config.max_span_length);
        for start in lowest..at.min(self.spans.len()) {
            self.spans[start].retain(|&length, _| start + length <= at);
        }
    }

    /// Create missing nodes for every span within reach of `at`.
    fn fill_around(&mut self, at: usize) {
        let max = self.config.max_span_length;
        let lo = at.saturating_sub(max);
        let hi = (at + max).min(self.keys.len());
        self.fill(lo, hi);
    }

    /// Create missing nodes for spans starting in `lo..hi`.
    fn fill(&mut self, lo: usize, hi: usize) -> usize {
        let n = self.keys.len();
        let mut created = 0;
        for start in lo..hi.min(n) {
            let longest = self.config.max_span_length.min(n - start);
            for length in 1..=longest {
                if self.spans[start].contains_key(&length) {
                    continue;
                }
                let grams = self.grams_for(start, length);
                if grams.is_empty() {
                    continue;
                }
                let readings = self.keys[start..start + length].to_vec();
                self.spans[start].insert(length, Node::new(readings, grams));
                created += 1;
            }
        }
        created
    }

    /// Supplier grams for a span; single-key spans fall back to a
    /// placeholder so every position stays reachable.
    fn grams_for(&self, start: usize, length: usize) -> Vec<Gram> {
        let readings = &self.keys[start..start + length];
        let grams = self.querier.query(readings, false);
        if grams.is_empty() && length == 1 {
            return vec![Gram {
                readings: readings.to_vec(),
                value: readings[0].clone(),
                type_id: FALLBACK_TYPE_ID,
                probability: self.config.fallback_probability,
                previous: None,
            }];
        }
        grams
    }
}
