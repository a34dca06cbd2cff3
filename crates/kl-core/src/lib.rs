//! Reading-lattice assembler and trie dictionary.
//!
//! Turns a sequence of phonetic reading keys into the most plausible
//! sequence of words. The dictionary is a prefix tree of weighted
//! reading→value grams (with optional bigram context) that round-trips
//! through a compact binary blob; the assembler builds a lattice of
//! candidate spans over the keys, finds the best path through it and
//! keeps user overrides across edits.
//!
//! Zero I/O. Persistence beyond bytes lives in `kl-store`.

pub mod assembler;
pub mod codec;
pub mod constants;
pub mod dictionary;
pub mod dot;
pub mod error;
pub mod gram;
pub mod node;
pub mod trie;
pub mod walk;

pub use assembler::{Assembler, AssemblerConfig, Direction, Span};
pub use codec::{deserialize, serialize};
pub use constants::{
    BINARY_VERSION, DEFAULT_MAX_SPAN_LENGTH, DEFAULT_SEPARATOR, FALLBACK_PROBABILITY,
    FALLBACK_TYPE_ID, ORPHAN_BIGRAM_PENALTY,
};
pub use dictionary::{format_line, parse_dictionary, parse_line};
pub use error::{CoreError, Result};
pub use gram::{FnQuerier, Gram, GramQuerier, UnigramsOnly};
pub use node::{BigramPolicy, CandidatePair, Node, Override, OverrideKind};
pub use trie::{NodeView, Trie, validate_separator};
pub use walk::AssembledUnit;
