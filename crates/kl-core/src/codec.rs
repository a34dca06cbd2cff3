//! Compact binary encoding of a [`Trie`].
//!
//! Layout: 4 magic bytes, a little-endian `u16` format version, then a
//! bincode body. The body stores grams without their readings; readings
//! are rebuilt from the node path on decode, so the trie's structure is
//! the single source of truth for keys.

use std::collections::{BTreeMap, HashSet};

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::constants::{BINARY_MAGIC, BINARY_VERSION};
use crate::error::{CoreError, Result};
use crate::gram::Gram;
use crate::trie::{Trie, TrieNode, validate_separator};

const HEADER_LEN: usize = BINARY_MAGIC.len() + 2;

#[derive(Serialize, Deserialize, Debug)]
struct WireTrie {
    separator: String,
    vocabulary: Vec<String>,
    nodes: Vec<WireNode>,
}

#[derive(Serialize, Deserialize, Debug)]
struct WireNode {
    parent: Option<u32>,
    reading_id: Option<u32>,
    children: Vec<(u32, u32)>,
    grams: Vec<WireGram>,
}

#[derive(Serialize, Deserialize, Debug)]
struct WireGram {
    value: String,
    type_id: u32,
    probability: f64,
    previous: Option<String>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
}

/// Encode `trie` into a versioned byte blob. Equal tries encode to equal bytes.
pub fn serialize(trie: &Trie) -> Result<Vec<u8>> {
    let wire = WireTrie {
        separator: trie.separator().to_string(),
        vocabulary: trie.vocabulary().to_vec(),
        nodes: trie
            .nodes
            .iter()
            .map(|node| WireNode {
                parent: node.parent.map(|p| p as u32),
                reading_id: node.reading_id,
                children: node
                    .children
                    .iter()
                    .map(|(&rid, &idx)| (rid, idx as u32))
                    .collect(),
                grams: node
                    .grams
                    .iter()
                    .map(|g| WireGram {
                        value: g.value.clone(),
                        type_id: g.type_id,
                        probability: g.probability,
                        previous: g.previous.clone(),
                    })
                    .collect(),
            })
            .collect(),
    };

    let body = options()
        .serialize(&wire)
        .map_err(|e| CoreError::CorruptData(format!("encode failed: {e}")))?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&BINARY_MAGIC);
    out.extend_from_slice(&BINARY_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a blob produced by [`serialize`].
pub fn deserialize(bytes: &[u8]) -> Result<Trie> {
    if bytes.len() < HEADER_LEN {
        return Err(CoreError::CorruptData(format!(
            "blob too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..BINARY_MAGIC.len()] != BINARY_MAGIC {
        return Err(CoreError::CorruptData("bad magic".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != BINARY_VERSION {
        return Err(CoreError::CorruptData(format!(
            "unsupported version {version} (expected {BINARY_VERSION})"
        )));
    }

    let wire: WireTrie = options().deserialize(&bytes[HEADER_LEN..])?;
    rebuild(wire)
}

fn corrupt(msg: String) -> CoreError {
    CoreError::CorruptData(msg)
}

fn rebuild(wire: WireTrie) -> Result<Trie> {
    validate_separator(&wire.separator).map_err(|e| corrupt(e.to_string()))?;

    let mut seen = HashSet::with_capacity(wire.vocabulary.len());
    for reading in &wire.vocabulary {
        if reading.is_empty() || reading.contains(wire.separator.as_str()) {
            return Err(corrupt(format!("invalid reading {reading:?}")));
        }
        if !seen.insert(reading.as_str()) {
            return Err(corrupt(format!("duplicate reading {reading:?}")));
        }
    }

    let count = wire.nodes.len();
    let Some(root) = wire.nodes.first() else {
        return Err(corrupt("no root node".into()));
    };
    if root.parent.is_some() || root.reading_id.is_some() {
        return Err(corrupt("root node has a parent or reading".into()));
    }

    let vocab_len = wire.vocabulary.len() as u32;
    for (idx, node) in wire.nodes.iter().enumerate() {
        if idx > 0 {
            let (Some(parent), Some(rid)) = (node.parent, node.reading_id) else {
                return Err(corrupt(format!("node {idx} lacks parent or reading")));
            };
            let linked = wire
                .nodes
                .get(parent as usize)
                .is_some_and(|p| p.children.contains(&(rid, idx as u32)));
            if !linked {
                return Err(corrupt(format!("node {idx} not linked from parent {parent}")));
            }
        }
        for &(rid, child) in &node.children {
            if rid >= vocab_len {
                return Err(corrupt(format!("reading id {rid} out of range")));
            }
            let ok = wire.nodes.get(child as usize).is_some_and(|c| {
                c.parent == Some(idx as u32) && c.reading_id == Some(rid)
            });
            if !ok {
                return Err(corrupt(format!("node {idx} has dangling child {child}")));
            }
        }
        if node.grams.iter().any(|g| !g.probability.is_finite()) {
            return Err(corrupt(format!("node {idx} has a non-finite probability")));
        }
    }

    // Parents always precede children in the arena, so one forward pass
    // resolves every path.
    let mut paths: Vec<Vec<String>> = vec![Vec::new(); count];
    let mut nodes = Vec::with_capacity(count);
    for (idx, node) in wire.nodes.into_iter().enumerate() {
        if let (Some(parent), Some(rid)) = (node.parent, node.reading_id) {
            if parent as usize >= idx {
                return Err(corrupt(format!("node {idx} precedes its parent {parent}")));
            }
            let mut path = paths[parent as usize].clone();
            path.push(wire.vocabulary[rid as usize].clone());
            paths[idx] = path;
        }
        let readings = &paths[idx];
        let grams = node
            .grams
            .into_iter()
            .map(|g| Gram {
                readings: readings.clone(),
                value: g.value,
                type_id: g.type_id,
                probability: g.probability,
                previous: g.previous,
            })
            .collect();
        nodes.push(TrieNode {
            parent: node.parent.map(|p| p as usize),
            reading_id: node.reading_id,
            children: node
                .children
                .into_iter()
                .map(|(rid, child)| (rid, child as usize))
                .collect::<BTreeMap<_, _>>(),
            grams,
        });
    }

    if !nodes[0].grams.is_empty() {
        return Err(corrupt("root node holds grams".into()));
    }

    Ok(Trie::from_parts(wire.separator, wire.vocabulary, nodes))
}
