//! Property tests: a trie rendered to SQL answers every query exactly like
//! the trie itself, for random dictionaries and separators. Keys are drawn
//! from the separators' own characters so tokens often hold part of one.

use kl_core::{Gram, Trie};
use kl_store::{SqlTrie, generate_sql_script};
use proptest::prelude::*;

const SEPARATORS: [&str; 4] = ["-", "::", ":-", "ab"];
const VALUES: [&str; 4] = ["甲", "o'k", "丙", "a-b"];
const KEY: &str = "[ab:-]{1,8}";
const TOKEN: &str = "[ab:-]{1,3}";

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: usize,
    probability: f64,
    type_id: u32,
    previous: Option<usize>,
}

fn entry() -> impl Strategy<Value = Entry> {
    (
        KEY,
        0..VALUES.len(),
        -10.0f64..0.0,
        0u32..3,
        prop::option::of(0..VALUES.len()),
    )
        .prop_map(|(key, value, probability, type_id, previous)| Entry {
            key,
            value,
            probability,
            type_id,
            previous,
        })
}

/// Keys that split into an empty reading are rejected by the trie and skipped.
fn build(separator: &str, entries: &[Entry]) -> Trie {
    let mut trie = Trie::new(separator).unwrap();
    for e in entries {
        let mut gram = Gram::new(&[], VALUES[e.value], e.probability).with_type(e.type_id);
        if let Some(p) = e.previous {
            gram = gram.with_previous(VALUES[p]);
        }
        let _ = trie.insert(&e.key, gram);
    }
    trie
}

/// Every prefix of every stored keychain, plus the random token lists.
fn probes(trie: &Trie, separator: &str, random: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let mut out = random;
    for keychain in trie.keychains() {
        let parts: Vec<String> = keychain.split(separator).map(str::to_string).collect();
        for len in 1..=parts.len() {
            out.push(parts[..len].to_vec());
        }
    }
    out
}

proptest! {
    #[test]
    fn sql_rendering_is_query_equivalent(
        separator in prop::sample::select(SEPARATORS.to_vec()),
        entries in prop::collection::vec(entry(), 0..24),
        random in prop::collection::vec(prop::collection::vec(TOKEN, 1..4), 0..12),
    ) {
        let trie = build(separator, &entries);
        let sql = SqlTrie::from_script(&generate_sql_script(&trie)).unwrap();
        prop_assert_eq!(sql.info().entry_count, trie.entry_count());
        prop_assert_eq!(sql.info().node_count, trie.node_count());

        for key in probes(&trie, separator, random) {
            for partial in [false, true] {
                for filter in [None, Some(0), Some(2)] {
                    prop_assert_eq!(
                        sql.query_grams(&key, partial, filter).unwrap(),
                        trie.query_grams(&key, partial, filter).unwrap(),
                        "{:?} partial={} filter={:?}", key, partial, filter
                    );
                    prop_assert_eq!(
                        sql.has_grams(&key, partial, filter).unwrap(),
                        trie.has_grams(&key, partial, filter).unwrap()
                    );
                }
            }
        }
    }
}
