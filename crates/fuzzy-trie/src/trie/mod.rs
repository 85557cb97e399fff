mod builder;

pub use self::builder::Trie;

use serde::{Deserialize, Serialize};

use crate::alphabet::Alphabet;

/// The index of a node inside the arena of a trie snapshot.
///
/// Ids are plain arena offsets: they are `Copy`, hashable, and stable from
/// one version to the next for every node a commit does not touch, which is
/// what lets an active-node set key its map by id while the trie keeps being
/// extended in the background. An id is only meaningful relative to the
/// snapshot family it was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> NodeId {
        NodeId(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The sentinel character carried by the root node. Keywords containing
/// control characters are rejected at commit time, so it can never collide
/// with indexed text.
const ROOT_CHARACTER: char = '\0';

#[derive(Debug, Clone)]
struct TrieNode {
    character: char,
    /// The alphabet ordering key of `character`, precomputed once.
    sort_key: u32,
    is_terminal: bool,
    /// Ordered by the sort key of the nodes they point to.
    children: Vec<NodeId>,
}

/// An immutable, shareable version of the trie.
///
/// The whole node graph lives in a single arena. A snapshot never changes
/// once published and is kept alive by reference counting alone, so any
/// number of concurrent readers can walk it without synchronization while
/// newer versions are being published next to it.
pub struct TrieSnapshot {
    version: u64,
    alphabet: Alphabet,
    nodes: Vec<TrieNode>,
    root: NodeId,
    keyword_count: usize,
}

impl TrieSnapshot {
    fn empty(alphabet: Alphabet) -> TrieSnapshot {
        let root = TrieNode {
            character: ROOT_CHARACTER,
            sort_key: alphabet.sort_key(ROOT_CHARACTER),
            is_terminal: false,
            children: Vec::new(),
        };
        TrieSnapshot { version: 0, alphabet, nodes: vec![root], root: NodeId(0), keyword_count: 0 }
    }

    fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id.index()]
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn keyword_count(&self) -> usize {
        self.keyword_count
    }

    pub fn character(&self, id: NodeId) -> char {
        self.node(id).character
    }

    pub fn is_terminal(&self, id: NodeId) -> bool {
        self.node(id).is_terminal
    }

    pub(crate) fn sort_key_of(&self, id: NodeId) -> u32 {
        self.node(id).sort_key
    }

    pub fn children_count(&self, id: NodeId) -> usize {
        self.node(id).children.len()
    }

    pub fn child_at(&self, id: NodeId, position: usize) -> NodeId {
        self.node(id).children[position]
    }

    /// The position of the child of `id` carrying exactly `c`, if any.
    pub fn find_child(&self, id: NodeId, c: char) -> Option<usize> {
        let key = self.alphabet.sort_key(c);
        let children = &self.node(id).children;
        children.binary_search_by_key(&key, |child| self.node(*child).sort_key).ok()
    }

    /// Plain, non-fuzzy descent along `prefix`.
    pub fn node_for(&self, prefix: &str) -> Option<NodeId> {
        let mut current = self.root;
        for c in prefix.chars() {
            let position = self.find_child(current, c)?;
            current = self.child_at(current, position);
        }
        Some(current)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.node_for(keyword).is_some_and(|node| self.is_terminal(node))
    }

    /// Rebuilds the path string leading from the root to `node`.
    ///
    /// This walks the snapshot it is called on, so it must be called against
    /// the snapshot the id was obtained from, the one a reader pinned for
    /// the duration of its query. It is a reporting helper, not part of the
    /// matching hot path.
    pub fn prefix_string(&self, node: NodeId) -> Option<String> {
        if node == self.root {
            return Some(String::new());
        }
        let mut path = Vec::new();
        if self.locate(self.root, node, &mut path) {
            Some(path.into_iter().collect())
        } else {
            None
        }
    }

    fn locate(&self, current: NodeId, target: NodeId, path: &mut Vec<char>) -> bool {
        for &child in &self.node(current).children {
            path.push(self.character(child));
            if child == target || self.locate(child, target, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// The terminal nodes stored below `node`, itself included, in child
    /// order. This is the completion surface downstream consumers read once
    /// the active nodes of a query are known.
    pub fn terminals_below(&self, node: NodeId) -> Vec<NodeId> {
        let mut terminals = Vec::new();
        self.collect_terminals(node, &mut terminals);
        terminals
    }

    fn collect_terminals(&self, node: NodeId, terminals: &mut Vec<NodeId>) {
        if self.is_terminal(node) {
            terminals.push(node);
        }
        for &child in &self.node(node).children {
            self.collect_terminals(child, terminals);
        }
    }

    /// Every keyword of the snapshot, in child order.
    pub fn keywords(&self) -> Vec<String> {
        let mut path = String::new();
        let mut keywords = Vec::new();
        self.walk_keywords(self.root, &mut path, &mut keywords);
        keywords
    }

    fn walk_keywords(&self, node: NodeId, path: &mut String, keywords: &mut Vec<String>) {
        if self.is_terminal(node) {
            keywords.push(path.clone());
        }
        for &child in &self.node(node).children {
            path.push(self.character(child));
            self.walk_keywords(child, path, keywords);
            path.pop();
        }
    }
}
