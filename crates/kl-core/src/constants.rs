/// Default separator joining reading tokens into a trie key.
pub const DEFAULT_SEPARATOR: &str = "-";

/// Longest span (in reading keys) a lattice node may cover.
pub const DEFAULT_MAX_SPAN_LENGTH: usize = 10;

/// Probability given to the placeholder gram of a reading the dictionary lacks.
pub const FALLBACK_PROBABILITY: f64 = -99.0;

/// Category tag carried by placeholder grams.
pub const FALLBACK_TYPE_ID: u32 = u32::MAX;

/// Added to the bigram probability of a value that has no unigram entry,
/// when it is scored outside of its bigram context.
pub const ORPHAN_BIGRAM_PENALTY: f64 = -10.0;

/// Binary codec magic bytes.
pub const BINARY_MAGIC: [u8; 4] = *b"KLTR";

/// Binary codec format version. Blobs with any other version are rejected.
pub const BINARY_VERSION: u16 = 1;
