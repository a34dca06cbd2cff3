use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A dictionary entry: a reading sequence mapped to an output value.
///
/// `previous` turns the entry into a bigram: its probability applies only
/// when the value assembled right before it equals `previous`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gram {
    pub readings: Vec<String>,
    pub value: String,
    pub type_id: u32,
    pub probability: f64,
    #[serde(default)]
    pub previous: Option<String>,
}

impl Gram {
    pub fn new(readings: &[&str], value: &str, probability: f64) -> Self {
        Self {
            readings: readings.iter().map(|s| s.to_string()).collect(),
            value: value.to_string(),
            type_id: 0,
            probability,
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: &str) -> Self {
        self.previous = Some(previous.to_string());
        self
    }

    pub fn with_type(mut self, type_id: u32) -> Self {
        self.type_id = type_id;
        self
    }

    pub fn is_unigram(&self) -> bool {
        self.previous.is_none()
    }

    pub fn joined_readings(&self, separator: &str) -> String {
        self.readings.join(separator)
    }
}

/// Supplies grams to the assembler for a slice of reading keys.
///
/// Any backend honoring this contract is interchangeable: the in-memory
/// trie, a deserialized binary blob, or the SQL-backed reader.
pub trait GramQuerier {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram>;

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        !self.query(readings, partially_match).is_empty()
    }
}

impl<T: GramQuerier + ?Sized> GramQuerier for &T {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        (**self).query(readings, partially_match)
    }

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        (**self).exists(readings, partially_match)
    }
}

impl<T: GramQuerier + ?Sized> GramQuerier for Arc<T> {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        (**self).query(readings, partially_match)
    }

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        (**self).exists(readings, partially_match)
    }
}

impl<T: GramQuerier + ?Sized> GramQuerier for Box<T> {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        (**self).query(readings, partially_match)
    }

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        (**self).exists(readings, partially_match)
    }
}

/// Adapts a plain function or closure into a [`GramQuerier`].
pub struct FnQuerier<F>(pub F);

impl<F> GramQuerier for FnQuerier<F>
where
    F: Fn(&[String], bool) -> Vec<Gram>,
{
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        (self.0)(readings, partially_match)
    }
}

/// Wraps a querier and drops every bigram from its results.
pub struct UnigramsOnly<Q>(pub Q);

impl<Q: GramQuerier> GramQuerier for UnigramsOnly<Q> {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        self.0
            .query(readings, partially_match)
            .into_iter()
            .filter(Gram::is_unigram)
            .collect()
    }
}
