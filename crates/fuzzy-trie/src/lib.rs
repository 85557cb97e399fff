mod active_node;
mod active_set;
mod alphabet;
mod error;
mod trie;

pub use self::active_node::PivotalActiveNode;
pub use self::active_set::PrefixActiveNodeSet;
pub use self::alphabet::{Alphabet, CharClass, FUZZY_KEY_UPPER_BOUND};
pub use self::error::Error;
pub use self::trie::{NodeId, Trie, TrieSnapshot};

pub type Result<T> = std::result::Result<T, Error>;

/// The unit in which edit-distance costs and thresholds are counted.
///
/// Thresholds are small, typically between 0 and 5, and every cost a set
/// keeps is bounded by its threshold.
pub type EditDistance = u8;

/// The maximum number of characters a keyword can have.
pub const MAX_KEYWORD_LENGTH: usize = 250;
