use serde::{Deserialize, Serialize};

use crate::constants::ORPHAN_BIGRAM_PENALTY;
use crate::gram::Gram;

/// How a unigram score and a matching bigram probability combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BigramPolicy {
    /// The bigram probability replaces the unigram score.
    #[default]
    Replace,
    /// The bigram probability is added to the unigram score.
    Additive,
    /// The larger of the two wins.
    Max,
}

impl BigramPolicy {
    pub fn combine(self, base: f64, bigram: f64) -> f64 {
        match self {
            Self::Replace => bigram,
            Self::Additive => base + bigram,
            Self::Max => base.max(bigram),
        }
    }
}

/// Strength of a user override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    /// Forces the value and removes every overlapping node from path search.
    Specified,
    /// Pins the value at no less than the node's top score; overlapping
    /// nodes stay in play.
    TopScore,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Override {
    pub value: String,
    pub kind: OverrideKind,
}

/// A reading/value pair naming one candidate of one span.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CandidatePair {
    pub readings: Vec<String>,
    pub value: String,
}

impl CandidatePair {
    pub fn new(readings: &[&str], value: &str) -> Self {
        Self {
            readings: readings.iter().map(|s| s.to_string()).collect(),
            value: value.to_string(),
        }
    }
}

/// A lattice node: the grams applicable to exactly one span of keys.
///
/// Grams are kept ordered by the base score of their value (best first,
/// ties in supplier order), so `values()` doubles as the candidate list.
#[derive(Clone, Debug)]
pub struct Node {
    readings: Vec<String>,
    grams: Vec<Gram>,
    overridden: Option<Override>,
}

impl Node {
    pub fn new(readings: Vec<String>, grams: Vec<Gram>) -> Self {
        let mut node = Self {
            readings,
            grams: Vec::new(),
            overridden: None,
        };
        node.set_grams(grams);
        node
    }

    pub fn readings(&self) -> &[String] {
        &self.readings
    }

    pub fn span_length(&self) -> usize {
        self.readings.len()
    }

    pub fn grams(&self) -> &[Gram] {
        &self.grams
    }

    pub fn overridden(&self) -> Option<&Override> {
        self.overridden.as_ref()
    }

    /// Replace the gram list. Returns `true` when an override was dropped
    /// because its value is gone.
    pub fn set_grams(&mut self, grams: Vec<Gram>) -> bool {
        self.grams = grams;
        let bases: Vec<f64> = self
            .grams
            .iter()
            .map(|g| self.base_score(&g.value).unwrap_or(f64::NEG_INFINITY))
            .collect();
        let mut paired: Vec<(f64, Gram)> = bases
            .into_iter()
            .zip(std::mem::take(&mut self.grams))
            .collect();
        paired.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.grams = paired.into_iter().map(|(_, g)| g).collect();

        let stale = self
            .overridden
            .as_ref()
            .is_some_and(|o| !self.has_value(&o.value));
        if stale {
            self.overridden = None;
        }
        stale
    }

    pub fn has_value(&self, value: &str) -> bool {
        self.grams.iter().any(|g| g.value == value)
    }

    /// Distinct values, best base score first.
    pub fn values(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for g in &self.grams {
            if !out.contains(&g.value.as_str()) {
                out.push(&g.value);
            }
        }
        out
    }

    /// The value this node shows when nothing else is known: the override,
    /// else the best-scoring candidate.
    pub fn current_value(&self) -> &str {
        match &self.overridden {
            Some(o) => &o.value,
            None => self.grams.first().map(|g| g.value.as_str()).unwrap_or(""),
        }
    }

    /// Context-free score of `value`: its best unigram probability, or its
    /// best bigram probability plus a penalty when it has no unigram.
    pub fn base_score(&self, value: &str) -> Option<f64> {
        let best = |unigram: bool| {
            self.grams
                .iter()
                .filter(|g| g.value == value && g.is_unigram() == unigram)
                .map(|g| g.probability)
                .reduce(f64::max)
        };
        best(true).or_else(|| best(false).map(|p| p + ORPHAN_BIGRAM_PENALTY))
    }

    pub fn top_score(&self) -> Option<f64> {
        self.grams
            .first()
            .and_then(|g| self.base_score(&g.value))
    }

    fn bigram_score(&self, value: &str, previous: &str) -> Option<f64> {
        self.grams
            .iter()
            .filter(|g| g.value == value && g.previous.as_deref() == Some(previous))
            .map(|g| g.probability)
            .reduce(f64::max)
    }

    /// Score of `value` given the value assembled just before this node.
    pub fn score(&self, value: &str, previous: Option<&str>, policy: BigramPolicy) -> Option<f64> {
        let base = self.base_score(value)?;
        let contextual = match previous.and_then(|p| self.bigram_score(value, p)) {
            Some(bigram) => policy.combine(base, bigram),
            None => base,
        };
        match &self.overridden {
            Some(o) if o.kind == OverrideKind::TopScore && o.value == value => {
                Some(contextual.max(self.top_score().unwrap_or(contextual)))
            }
            _ => Some(contextual),
        }
    }

    /// Candidates path search may pick at this node.
    pub(crate) fn path_candidates(&self) -> Vec<&str> {
        match &self.overridden {
            Some(o) => vec![o.value.as_str()],
            None => self.values(),
        }
    }

    /// Pin `value` with `kind`. Fails when the node has no such value.
    pub fn select_override(&mut self, value: &str, kind: OverrideKind) -> bool {
        if !self.has_value(value) {
            return false;
        }
        self.overridden = Some(Override {
            value: value.to_string(),
            kind,
        });
        true
    }

    pub fn reset(&mut self) {
        self.overridden = None;
    }
}
