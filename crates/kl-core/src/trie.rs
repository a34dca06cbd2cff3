use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::gram::{Gram, GramQuerier};

/// One arena slot. The root has no reading and no parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrieNode {
    pub(crate) parent: Option<usize>,
    pub(crate) reading_id: Option<u32>,
    pub(crate) children: BTreeMap<u32, usize>,
    pub(crate) grams: Vec<Gram>,
}

/// Read-only view of a trie node, produced by [`Trie::preorder`].
#[derive(Debug)]
pub struct NodeView<'a> {
    /// Position of this node in pre-order; the root is 0.
    pub order: usize,
    /// Pre-order position of the parent, `None` for the root.
    pub parent: Option<usize>,
    pub reading_id: Option<u32>,
    pub keychain: String,
    pub grams: &'a [Gram],
}

/// Prefix tree keyed by reading-token sequences.
///
/// Tokens are interned into `vocabulary` on first sight; children are
/// ordered by interned id, so traversal order is first-seen token order
/// and stays stable across the binary and SQL encodings.
#[derive(Clone, Debug, PartialEq)]
pub struct Trie {
    separator: String,
    vocabulary: Vec<String>,
    reading_ids: HashMap<String, u32>,
    pub(crate) nodes: Vec<TrieNode>,
}

/// A separator must be non-empty and free of whitespace and control characters.
pub fn validate_separator(separator: &str) -> Result<()> {
    if separator.is_empty() {
        return Err(CoreError::Configuration("separator must not be empty".into()));
    }
    if separator.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::Configuration(format!(
            "separator {separator:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}

impl Trie {
    pub fn new(separator: &str) -> Result<Self> {
        validate_separator(separator)?;
        Ok(Self {
            separator: separator.to_string(),
            vocabulary: Vec::new(),
            reading_ids: HashMap::new(),
            nodes: vec![TrieNode::default()],
        })
    }

    /// Rebuild a trie from already-validated parts (used by the codec).
    pub(crate) fn from_parts(
        separator: String,
        vocabulary: Vec<String>,
        nodes: Vec<TrieNode>,
    ) -> Self {
        let reading_ids = vocabulary
            .iter()
            .enumerate()
            .map(|(i, r)| (r.clone(), i as u32))
            .collect();
        Self {
            separator,
            vocabulary,
            reading_ids,
            nodes,
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Interned reading tokens, indexed by id.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entry_count(&self) -> usize {
        self.nodes.iter().map(|n| n.grams.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    pub fn split_key<'a>(&self, key: &'a str) -> Result<Vec<&'a str>> {
        if key.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        let parts: Vec<&str> = key.split(self.separator.as_str()).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::EmptyKey);
        }
        Ok(parts)
    }

    /// Insert `gram` under the path formed by splitting `key` on the separator.
    /// The gram's readings are replaced by the split key.
    pub fn insert(&mut self, key: &str, mut gram: Gram) -> Result<()> {
        let parts = self.split_key(key)?;
        if !gram.probability.is_finite() {
            return Err(CoreError::CorruptData(format!(
                "non-finite probability for {key:?}"
            )));
        }
        gram.readings = parts.iter().map(|s| s.to_string()).collect();

        let mut node_idx = 0;
        for part in parts {
            let reading_id = self.intern(part);
            let next_idx = if let Some(&idx) = self.nodes[node_idx].children.get(&reading_id) {
                idx
            } else {
                let idx = self.nodes.len();
                self.nodes.push(TrieNode {
                    parent: Some(node_idx),
                    reading_id: Some(reading_id),
                    ..TrieNode::default()
                });
                self.nodes[node_idx].children.insert(reading_id, idx);
                idx
            };
            node_idx = next_idx;
        }
        self.nodes[node_idx].grams.push(gram);
        Ok(())
    }

    /// Insert using the gram's own readings as the key.
    pub fn insert_gram(&mut self, gram: Gram) -> Result<()> {
        if gram.readings.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        let key = gram.readings.join(&self.separator);
        self.insert(&key, gram)
    }

    fn intern(&mut self, reading: &str) -> u32 {
        if let Some(&id) = self.reading_ids.get(reading) {
            return id;
        }
        let id = self.vocabulary.len() as u32;
        self.vocabulary.push(reading.to_string());
        self.reading_ids.insert(reading.to_string(), id);
        id
    }

    /// Follow exactly `readings.len()` edges from the root.
    fn locate(&self, readings: &[String]) -> Option<usize> {
        let mut node_idx = 0;
        for reading in readings {
            let id = self.reading_ids.get(reading)?;
            node_idx = *self.nodes[node_idx].children.get(id)?;
        }
        Some(node_idx)
    }

    /// Arena indices of the subtree rooted at `start`, in pre-order.
    fn subtree(&self, start: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.values().rev());
        }
        order
    }

    pub fn has_grams(
        &self,
        readings: &[String],
        partially_match: bool,
        filter_type: Option<u32>,
    ) -> Result<bool> {
        if readings.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        let Some(node_idx) = self.locate(readings) else {
            return Ok(false);
        };
        let matches = |g: &Gram| filter_type.is_none_or(|t| g.type_id == t);
        if !partially_match {
            return Ok(self.nodes[node_idx].grams.iter().any(matches));
        }
        Ok(self
            .subtree(node_idx)
            .into_iter()
            .any(|idx| self.nodes[idx].grams.iter().any(matches)))
    }

    /// Exact match returns the grams of the node reached by `readings`;
    /// partial match returns every gram in that node's subtree.
    pub fn query_grams(
        &self,
        readings: &[String],
        partially_match: bool,
        filter_type: Option<u32>,
    ) -> Result<Vec<Gram>> {
        if readings.is_empty() {
            return Err(CoreError::EmptyKey);
        }
        let Some(node_idx) = self.locate(readings) else {
            return Ok(Vec::new());
        };
        let nodes = if partially_match {
            self.subtree(node_idx)
        } else {
            vec![node_idx]
        };
        Ok(nodes
            .into_iter()
            .flat_map(|idx| self.nodes[idx].grams.iter())
            .filter(|g| filter_type.is_none_or(|t| g.type_id == t))
            .cloned()
            .collect())
    }

    /// Every node in pre-order with its parent expressed as a pre-order position.
    pub fn preorder(&self) -> Vec<NodeView<'_>> {
        let order = self.subtree(0);
        let mut position = vec![0usize; self.nodes.len()];
        for (pos, &idx) in order.iter().enumerate() {
            position[idx] = pos;
        }

        let mut keychains: Vec<String> = vec![String::new(); self.nodes.len()];
        let mut views = Vec::with_capacity(order.len());
        for (pos, &idx) in order.iter().enumerate() {
            let node = &self.nodes[idx];
            if let (Some(parent), Some(rid)) = (node.parent, node.reading_id) {
                let reading = &self.vocabulary[rid as usize];
                keychains[idx] = if parent == 0 {
                    reading.clone()
                } else {
                    format!("{}{}{}", keychains[parent], self.separator, reading)
                };
            }
            views.push(NodeView {
                order: pos,
                parent: node.parent.map(|p| position[p]),
                reading_id: node.reading_id,
                keychain: keychains[idx].clone(),
                grams: &node.grams,
            });
        }
        views
    }

    /// Keys that hold at least one gram, in pre-order.
    pub fn keychains(&self) -> Vec<String> {
        self.preorder()
            .into_iter()
            .filter(|v| !v.grams.is_empty())
            .map(|v| v.keychain)
            .collect()
    }
}

impl GramQuerier for Trie {
    fn query(&self, readings: &[String], partially_match: bool) -> Vec<Gram> {
        self.query_grams(readings, partially_match, None)
            .unwrap_or_default()
    }

    fn exists(&self, readings: &[String], partially_match: bool) -> bool {
        self.has_grams(readings, partially_match, None)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(readings: &[&str]) -> Vec<String> {
        readings.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Trie {
        let mut trie = Trie::new("-").unwrap();
        trie.insert("liu2", Gram::new(&[], "留", -4.0)).unwrap();
        trie.insert("liu2-yi4", Gram::new(&[], "留意", -3.0)).unwrap();
        trie.insert("liu2", Gram::new(&[], "流", -4.5)).unwrap();
        trie.insert("liu2", Gram::new(&[], "留", -3.5).with_previous("能"))
            .unwrap();
        trie.insert("yi4", Gram::new(&[], "意", -5.0).with_type(2))
            .unwrap();
        trie
    }

    #[test]
    fn test_rejects_bad_separator() {
        assert!(matches!(Trie::new(""), Err(CoreError::Configuration(_))));
        assert!(matches!(Trie::new(" "), Err(CoreError::Configuration(_))));
        assert!(matches!(Trie::new("\t"), Err(CoreError::Configuration(_))));
        assert!(Trie::new("::").is_ok());
    }

    #[test]
    fn test_insert_normalizes_readings() {
        let trie = sample();
        let grams = trie.query_grams(&keys(&["liu2", "yi4"]), false, None).unwrap();
        assert_eq!(grams.len(), 1);
        assert_eq!(grams[0].readings, keys(&["liu2", "yi4"]));
    }

    #[test]
    fn test_exact_match_keeps_insertion_order() {
        let trie = sample();
        let values: Vec<String> = trie
            .query_grams(&keys(&["liu2"]), false, None)
            .unwrap()
            .into_iter()
            .map(|g| g.value)
            .collect();
        assert_eq!(values, vec!["留", "流", "留"]);
    }

    #[test]
    fn test_partial_match_collects_subtree() {
        let trie = sample();
        let values: Vec<String> = trie
            .query_grams(&keys(&["liu2"]), true, None)
            .unwrap()
            .into_iter()
            .map(|g| g.value)
            .collect();
        assert_eq!(values, vec!["留", "流", "留", "留意"]);
    }

    #[test]
    fn test_has_grams_on_intermediate_node() {
        let mut trie = Trie::new("-").unwrap();
        trie.insert("a-b-c", Gram::new(&[], "abc", -1.0)).unwrap();
        assert!(!trie.has_grams(&keys(&["a", "b"]), false, None).unwrap());
        assert!(trie.has_grams(&keys(&["a", "b"]), true, None).unwrap());
        assert!(!trie.has_grams(&keys(&["b"]), true, None).unwrap());
    }

    #[test]
    fn test_filter_type() {
        let trie = sample();
        assert!(trie.has_grams(&keys(&["yi4"]), false, Some(2)).unwrap());
        assert!(!trie.has_grams(&keys(&["yi4"]), false, Some(0)).unwrap());
        let grams = trie.query_grams(&keys(&["liu2"]), true, Some(0)).unwrap();
        assert_eq!(grams.len(), 4);
    }

    #[test]
    fn test_empty_key_is_reported() {
        let mut trie = sample();
        assert_eq!(trie.query_grams(&[], false, None), Err(CoreError::EmptyKey));
        assert_eq!(trie.has_grams(&[], true, None), Err(CoreError::EmptyKey));
        assert_eq!(
            trie.insert("", Gram::new(&[], "x", -1.0)),
            Err(CoreError::EmptyKey)
        );
        assert_eq!(
            trie.insert("a--b", Gram::new(&[], "x", -1.0)),
            Err(CoreError::EmptyKey)
        );
    }

    #[test]
    fn test_rejects_non_finite_probability() {
        let mut trie = sample();
        let before = trie.entry_count();
        assert!(matches!(
            trie.insert("a", Gram::new(&[], "x", f64::NAN)),
            Err(CoreError::CorruptData(_))
        ));
        assert_eq!(trie.entry_count(), before);
    }

    #[test]
    fn test_unknown_reading_is_a_miss() {
        let trie = sample();
        assert!(trie.query_grams(&keys(&["zzz"]), true, None).unwrap().is_empty());
        assert!(!trie.has_grams(&keys(&["liu2", "zzz"]), false, None).unwrap());
    }

    #[test]
    fn test_preorder_views() {
        let trie = sample();
        let views = trie.preorder();
        assert_eq!(views.len(), trie.node_count());
        assert_eq!(views[0].parent, None);
        let chains: Vec<&str> = views.iter().map(|v| v.keychain.as_str()).collect();
        assert_eq!(chains, vec!["", "liu2", "liu2-yi4", "yi4"]);
        assert_eq!(views[2].parent, Some(1));
        assert_eq!(trie.keychains(), vec!["liu2", "liu2-yi4", "yi4"]);
    }

    #[test]
    fn test_counts() {
        let trie = sample();
        assert_eq!(trie.entry_count(), 5);
        assert_eq!(trie.vocabulary(), &keys(&["liu2", "yi4"])[..]);
        assert!(!trie.is_empty());
        assert!(Trie::new("-").unwrap().is_empty());
    }
}
