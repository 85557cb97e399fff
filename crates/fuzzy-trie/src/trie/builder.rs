use std::sync::{Arc, RwLock};

use crate::alphabet::Alphabet;
use crate::error::Error;
use crate::trie::{NodeId, TrieNode, TrieSnapshot};
use crate::{Result, MAX_KEYWORD_LENGTH};

/// The publisher half of the trie.
///
/// Readers call [`snapshot`](Trie::snapshot) once, keep the returned handle
/// for the whole query, and never synchronize again: a published snapshot is
/// immutable. [`commit`](Trie::commit) builds the next version copy-on-write
/// and publishes it atomically; holders of older versions are unaffected
/// until they drop their handle.
pub struct Trie {
    published: RwLock<Arc<TrieSnapshot>>,
}

impl Trie {
    pub fn new(alphabet: Alphabet) -> Trie {
        Trie { published: RwLock::new(Arc::new(TrieSnapshot::empty(alphabet))) }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<TrieSnapshot> {
        self.published.read().unwrap().clone()
    }

    /// Inserts `keywords` and publishes the resulting snapshot.
    ///
    /// The next arena starts as a copy of the published one: only the paths
    /// of the inserted keywords change or allocate nodes, and every
    /// untouched node keeps its id from one version to the next. When a
    /// keyword fails validation, nothing is published and the error is
    /// returned; an already-known keyword is accepted and simply not counted
    /// again.
    pub fn commit<I, A>(&self, keywords: I) -> Result<Arc<TrieSnapshot>>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let current = self.snapshot();
        let mut nodes = current.nodes.clone();
        let mut inserted = 0usize;

        for keyword in keywords {
            let keyword = keyword.as_ref();
            validate(keyword)?;
            if insert(&mut nodes, &current.alphabet, current.root, keyword) {
                inserted += 1;
            }
        }

        let snapshot = TrieSnapshot {
            version: current.version + 1,
            alphabet: current.alphabet,
            root: current.root,
            keyword_count: current.keyword_count + inserted,
            nodes,
        };
        tracing::debug!(
            version = snapshot.version,
            inserted,
            nodes = snapshot.node_count(),
            "published a new trie snapshot"
        );

        let snapshot = Arc::new(snapshot);
        *self.published.write().unwrap() = snapshot.clone();
        Ok(snapshot)
    }
}

impl Default for Trie {
    fn default() -> Trie {
        Trie::new(Alphabet::default())
    }
}

fn validate(keyword: &str) -> Result<()> {
    if keyword.is_empty() {
        return Err(Error::EmptyKeyword);
    }
    let length = keyword.chars().count();
    if length > MAX_KEYWORD_LENGTH {
        return Err(Error::KeywordTooLong { length });
    }
    if let Some(character) = keyword.chars().find(|c| c.is_control()) {
        return Err(Error::InvalidCharacter { character });
    }
    Ok(())
}

/// Descends along `keyword`, allocating the missing part of the path, and
/// marks the last node terminal. Returns whether the keyword is new.
fn insert(nodes: &mut Vec<TrieNode>, alphabet: &Alphabet, root: NodeId, keyword: &str) -> bool {
    let mut current = root;
    for c in keyword.chars() {
        let key = alphabet.sort_key(c);
        let children = &nodes[current.index()].children;
        match children.binary_search_by_key(&key, |child| nodes[child.index()].sort_key) {
            Ok(position) => current = nodes[current.index()].children[position],
            Err(position) => {
                let child = NodeId::new(nodes.len());
                nodes.push(TrieNode {
                    character: c,
                    sort_key: key,
                    is_terminal: false,
                    children: Vec::new(),
                });
                nodes[current.index()].children.insert(position, child);
                current = child;
            }
        }
    }

    let node = &mut nodes[current.index()];
    if node.is_terminal {
        false
    } else {
        node.is_terminal = true;
        true
    }
}
