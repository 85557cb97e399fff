use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::active_node::PivotalActiveNode;
use crate::alphabet::FUZZY_KEY_UPPER_BOUND;
use crate::trie::{NodeId, TrieSnapshot};
use crate::EditDistance;

/// The set of trie nodes reachable within an edit-distance threshold for one
/// query prefix, computed against one pinned trie snapshot.
///
/// A set is immutable once built and can be read by any number of consumers
/// concurrently. [`extend`](PrefixActiveNodeSet::extend) returns a brand-new
/// set for the prefix grown by one character and leaves `self` untouched, so
/// every intermediate prefix of a query keyword keeps its own valid set, the
/// way an as-you-type search needs them. The threshold and the transposition
/// flag are fixed for the lifetime of a chain, and the chain keeps its trie
/// snapshot alive independently of newer versions being published.
#[derive(Clone)]
pub struct PrefixActiveNodeSet {
    prefix: SmallVec<[char; 16]>,
    threshold: EditDistance,
    transpositions: bool,
    snapshot: Arc<TrieSnapshot>,
    nodes: FxHashMap<NodeId, PivotalActiveNode>,
}

impl PrefixActiveNodeSet {
    /// The empty-prefix base case: the root alone, at distance zero.
    pub fn new(snapshot: Arc<TrieSnapshot>, threshold: EditDistance) -> PrefixActiveNodeSet {
        Self::with_options(snapshot, threshold, false)
    }

    /// Same as [`new`](PrefixActiveNodeSet::new) but counting the swap of
    /// two adjacent characters as a single edit.
    pub fn with_transpositions(
        snapshot: Arc<TrieSnapshot>,
        threshold: EditDistance,
    ) -> PrefixActiveNodeSet {
        Self::with_options(snapshot, threshold, true)
    }

    fn with_options(
        snapshot: Arc<TrieSnapshot>,
        threshold: EditDistance,
        transpositions: bool,
    ) -> PrefixActiveNodeSet {
        let mut nodes = FxHashMap::default();
        nodes.insert(snapshot.root(), PivotalActiveNode::origin());
        PrefixActiveNodeSet { prefix: SmallVec::new(), threshold, transpositions, snapshot, nodes }
    }

    pub fn prefix(&self) -> String {
        self.prefix.iter().collect()
    }

    pub fn threshold(&self) -> EditDistance {
        self.threshold
    }

    pub fn supports_transpositions(&self) -> bool {
        self.transpositions
    }

    /// The trie snapshot this chain was computed against.
    pub fn snapshot(&self) -> &Arc<TrieSnapshot> {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// An empty set is a valid value: it means no node of the trie lies
    /// within the threshold for this prefix, and extending it further can
    /// only yield empty sets again.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<PivotalActiveNode> {
        self.nodes.get(&node).copied()
    }

    /// The fuzzy edit-distance signal downstream ranking reads per node.
    pub fn transformation_distance(&self, node: NodeId) -> Option<EditDistance> {
        self.nodes.get(&node).map(|pan| pan.transformation_distance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, PivotalActiveNode)> + '_ {
        self.nodes.iter().map(|(&node, &pan)| (node, pan))
    }

    /// Builds the active-node set for the prefix grown by `c`, reusing the
    /// work stored in `self` instead of recomputing from the root.
    ///
    /// Each entry contributes through two independent sub-steps, both merged
    /// through the same tie-break rule: staying in place while spending one
    /// edit on `c` (the character was inserted in the query relative to the
    /// indexed word), and a depth-first fan-out below the entry bounded by
    /// the budget the prefix has not consumed yet. The exploration depth per
    /// entry is capped by the threshold, never by the size of the trie.
    pub fn extend(&self, c: char) -> PrefixActiveNodeSet {
        let mut prefix = self.prefix.clone();
        prefix.push(c);
        let mut next = PrefixActiveNodeSet {
            prefix,
            threshold: self.threshold,
            transpositions: self.transpositions,
            snapshot: self.snapshot.clone(),
            nodes: FxHashMap::default(),
        };

        let fuzzy = self.snapshot.alphabet().is_fuzzy(c);
        for (&node, pan) in &self.nodes {
            if fuzzy && pan.transformation_distance < self.threshold {
                next.add_or_merge(node, PivotalActiveNode {
                    transformation_distance: pan.transformation_distance + 1,
                    differ: pan.differ + 1,
                    edit_distance_of_prefix: pan.edit_distance_of_prefix,
                });
            }
            self.fan_out(&mut next, node, *pan, c, fuzzy);
        }

        tracing::trace!(
            prefix_len = next.prefix.len(),
            from = self.nodes.len(),
            to = next.nodes.len(),
            "extended active-node set"
        );
        next
    }

    /// Folds [`extend`](PrefixActiveNodeSet::extend) over every character of
    /// `suffix`.
    pub fn extend_str(&self, suffix: &str) -> PrefixActiveNodeSet {
        let mut set = self.clone();
        for c in suffix.chars() {
            set = set.extend(c);
        }
        set
    }

    /// The literal trie strings the nodes of this set spell, in map
    /// iteration order. Callers that need determinism must sort the result.
    ///
    /// Reconstruction walks the snapshot pinned by this set, which is the
    /// only snapshot the stored ids are valid against.
    pub fn computed_similar_prefixes(&self) -> Vec<String> {
        self.nodes.keys().filter_map(|&node| self.snapshot.prefix_string(node)).collect()
    }

    /// The terminal nodes of the set with the edit distance spent to reach
    /// them, ordered by id.
    pub fn terminal_matches(&self) -> Vec<(NodeId, EditDistance)> {
        let mut matches: Vec<_> = self
            .nodes
            .iter()
            .filter(|(&node, _)| self.snapshot.is_terminal(node))
            .map(|(&node, pan)| (node, pan.transformation_distance))
            .collect();
        matches.sort_unstable();
        matches
    }

    /// Keeps the single best record per node.
    ///
    /// A candidate over the threshold is dropped; otherwise it replaces the
    /// existing entry only when the tie-break of
    /// [`PivotalActiveNode::improves`] says so. The rule is commutative:
    /// whatever order candidates are discovered in, the final map is the
    /// same.
    fn add_or_merge(&mut self, node: NodeId, candidate: PivotalActiveNode) {
        if candidate.transformation_distance > self.threshold {
            return;
        }
        match self.nodes.entry(node) {
            Entry::Occupied(mut entry) => {
                if candidate.improves(entry.get()) {
                    entry.insert(candidate);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(candidate);
            }
        }
    }

    fn fan_out(
        &self,
        next: &mut PrefixActiveNodeSet,
        node: NodeId,
        pan: PivotalActiveNode,
        c: char,
        fuzzy: bool,
    ) {
        // The budget still available below this entry before the cost
        // attributable to the prefix would exceed the threshold.
        let depth_limit = self.threshold.saturating_sub(pan.edit_distance_of_prefix);
        if !fuzzy || depth_limit == 0 {
            // Exact-only character or exhausted budget: single child lookup.
            if let Some(position) = self.snapshot.find_child(node, c) {
                let child = self.snapshot.child_at(node, position);
                self.record_match(next, child, pan, 0);
            }
            return;
        }
        self.descend(next, node, pan, c, 0, depth_limit);
    }

    /// Depth-bounded walk below `node` looking for `c`, consuming skipped
    /// positions of the indexed words as substitutions.
    fn descend(
        &self,
        next: &mut PrefixActiveNodeSet,
        node: NodeId,
        pan: PivotalActiveNode,
        c: char,
        cur_depth: EditDistance,
        depth_limit: EditDistance,
    ) {
        for position in 0..self.snapshot.children_count(node) {
            let child = self.snapshot.child_at(node, position);
            // Children are ordered with every fuzzy character first: once
            // the boundary is crossed no further sibling can match.
            if self.snapshot.sort_key_of(child) >= FUZZY_KEY_UPPER_BOUND {
                break;
            }
            if self.snapshot.character(child) == c {
                self.record_match(next, child, pan, cur_depth);
                // An adjacent swap: the previous prefix character was
                // skipped one extension ago (differ > 0) and reappears
                // right below the child carrying `c`. The swap already paid
                // its edit at skip time, the grandchild costs nothing more.
                if self.transpositions && pan.differ > 0 {
                    if let Some(&previous) = self.prefix.last() {
                        if let Some(position) = self.snapshot.find_child(child, previous) {
                            let grandchild = self.snapshot.child_at(child, position);
                            self.record_match(next, grandchild, pan, cur_depth);
                        }
                    }
                }
            }
            if cur_depth < depth_limit {
                self.descend(next, child, pan, c, cur_depth + 1, depth_limit);
            }
        }
    }

    /// Records an exact match of `c` at `node`, reached after `cur_depth`
    /// skipped positions. The skipped positions and the slack accumulated
    /// before (`differ`) can absorb each other as substitutions, so the
    /// grown prefix is charged whichever of the two is larger.
    fn record_match(
        &self,
        next: &mut PrefixActiveNodeSet,
        node: NodeId,
        pan: PivotalActiveNode,
        cur_depth: EditDistance,
    ) {
        let distance =
            pan.edit_distance_of_prefix as u16 + cur_depth.max(pan.differ) as u16;
        if distance > self.threshold as u16 {
            return;
        }
        let distance = distance as EditDistance;
        next.add_or_merge(node, PivotalActiveNode {
            transformation_distance: distance,
            differ: 0,
            edit_distance_of_prefix: distance,
        });
    }
}

impl fmt::Display for PrefixActiveNodeSet {
    /// A sorted, line-oriented dump, stable across map iteration orders.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "prefix: {:?}", self.prefix())?;
        writeln!(f, "threshold: {}", self.threshold)?;
        writeln!(f, "transpositions: {}", self.transpositions)?;
        let mut entries: Vec<_> = self
            .nodes
            .iter()
            .map(|(&node, &pan)| (self.snapshot.prefix_string(node).unwrap_or_default(), pan))
            .collect();
        entries.sort_by(|(left, _), (right, _)| left.cmp(right));
        for (string, pan) in entries {
            writeln!(
                f,
                "{string:?}: distance {} differ {} prefix_distance {}",
                pan.transformation_distance, pan.differ, pan.edit_distance_of_prefix,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use big_s::S;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::alphabet::{Alphabet, CharClass};
    use crate::trie::Trie;

    fn snapshot_of(keywords: &[&str]) -> Arc<TrieSnapshot> {
        let trie = Trie::default();
        trie.commit(keywords).unwrap()
    }

    fn pan(td: u8, differ: u8, edp: u8) -> PivotalActiveNode {
        PivotalActiveNode {
            transformation_distance: td,
            differ,
            edit_distance_of_prefix: edp,
        }
    }

    /// Plain Levenshtein distance, the textbook yardstick the engine must
    /// never undercut.
    fn levenshtein(source: &str, target: &str) -> u16 {
        let source: Vec<char> = source.chars().collect();
        let target: Vec<char> = target.chars().collect();
        let mut row: Vec<u16> = (0..=target.len() as u16).collect();
        for (i, s) in source.iter().enumerate() {
            let mut previous = row[0];
            row[0] = i as u16 + 1;
            for (j, t) in target.iter().enumerate() {
                let cost = if s == t { 0 } else { 1 };
                let value = (previous + cost).min(row[j] + 1).min(row[j + 1] + 1);
                previous = row[j + 1];
                row[j + 1] = value;
            }
        }
        row[target.len()]
    }

    /// `node` and every node reachable below it.
    fn descendants(snapshot: &TrieSnapshot, node: NodeId) -> Vec<NodeId> {
        let mut nodes = vec![node];
        let mut position = 0;
        while position < nodes.len() {
            let node = nodes[position];
            position += 1;
            for child in 0..snapshot.children_count(node) {
                nodes.push(snapshot.child_at(node, child));
            }
        }
        nodes
    }

    #[test]
    fn empty_prefix_base_case() {
        let snapshot = snapshot_of(&["form", "fork"]);
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 2);

        assert_eq!(set.prefix(), "");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(snapshot.root()), Some(PivotalActiveNode::origin()));
        assert_eq!(set.computed_similar_prefixes(), &[S("")]);
    }

    #[test]
    fn exact_search_degeneracy() {
        let snapshot = snapshot_of(&["form", "fork", "storm"]);

        // With a zero threshold the chain is a plain trie descent: exactly
        // one node per existing prefix, at distance zero.
        let mut set = PrefixActiveNodeSet::new(snapshot.clone(), 0);
        for (i, c) in "form".chars().enumerate() {
            set = set.extend(c);
            let prefix: String = "form".chars().take(i + 1).collect();
            let node = snapshot.node_for(&prefix).unwrap();
            assert_eq!(set.len(), 1);
            assert_eq!(set.get(node), Some(PivotalActiveNode::origin()));
        }
    }

    #[test]
    fn missing_path_empties_the_set_for_good() {
        let snapshot = snapshot_of(&["form"]);

        let set = PrefixActiveNodeSet::new(snapshot, 0).extend_str("fox");
        assert!(set.is_empty());
        assert_eq!(set.prefix(), "fox");

        let set = set.extend('y');
        assert!(set.is_empty());
        assert!(set.computed_similar_prefixes().is_empty());
        assert!(set.terminal_matches().is_empty());
    }

    #[test]
    fn single_typo_families() {
        let snapshot = snapshot_of(&["form", "fork", "storm"]);

        // One substitution.
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 1).extend_str("farm");
        let form = snapshot.node_for("form").unwrap();
        assert_eq!(set.transformation_distance(form), Some(1));

        // One character missing from the query.
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 1).extend_str("frm");
        assert_eq!(set.transformation_distance(form), Some(1));

        // One character too many in the query.
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 1).extend_str("foorm");
        assert_eq!(set.transformation_distance(form), Some(1));

        // Out of budget.
        let set = PrefixActiveNodeSet::new(snapshot, 1).extend_str("xarm");
        assert_eq!(set.transformation_distance(form), None);
    }

    #[test]
    fn transposition_scenario() {
        let snapshot = snapshot_of(&["form"]);
        let for_node = snapshot.node_for("for").unwrap();

        // "fro" reaches the "for" path through the swap of 'r' and 'o',
        // a single edit.
        let set = PrefixActiveNodeSet::with_transpositions(snapshot.clone(), 1).extend_str("fro");
        assert_eq!(set.transformation_distance(for_node), Some(1));

        // Without swap support the same budget cannot reach it.
        let set = PrefixActiveNodeSet::new(snapshot, 1).extend_str("fro");
        assert_eq!(set.transformation_distance(for_node), None);
    }

    #[test]
    fn exact_only_characters_never_match_fuzzily() {
        let snapshot = snapshot_of(&["a1", "b1"]);

        // '2' is exact-only under the default alphabet: no deletion step,
        // no fan-out, whatever the budget.
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 2).extend_str("a2");
        assert!(set.is_empty());

        // The exact digit still matches below the fuzzy letter.
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 1).extend_str("a1");
        let a1 = snapshot.node_for("a1").unwrap();
        assert_eq!(set.transformation_distance(a1), Some(0));
        // The substitution of 'a' by 'b' stays pending until a later fuzzy
        // character materializes it, and '1' cannot: "b1" stays out of
        // reach even though it is one substitution away.
        let b1 = snapshot.node_for("b1").unwrap();
        assert_eq!(set.transformation_distance(b1), None);
    }

    #[test]
    fn substitutions_materialize_on_later_matches() {
        let snapshot = snapshot_of(&["ax", "bx"]);
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 1).extend_str("ax");

        let ax = snapshot.node_for("ax").unwrap();
        let bx = snapshot.node_for("bx").unwrap();
        assert_eq!(set.transformation_distance(ax), Some(0));
        assert_eq!(set.transformation_distance(bx), Some(1));
    }

    #[test]
    fn custom_partition_makes_digits_fuzzy() {
        let trie = Trie::new(Alphabet::new(|c| {
            if c.is_ascii_digit() {
                CharClass::Fuzzy
            } else {
                CharClass::Exact
            }
        }));
        let snapshot = trie.commit(["13", "17"]).unwrap();

        // Substituting the first digit materializes on the second one.
        let set = PrefixActiveNodeSet::new(snapshot.clone(), 1).extend_str("23");
        let node = snapshot.node_for("13").unwrap();
        assert_eq!(set.transformation_distance(node), Some(1));
        let node = snapshot.node_for("17").unwrap();
        assert_eq!(set.transformation_distance(node), None);

        // Under the default partition the same query matches nothing.
        let snapshot = snapshot_of(&["13", "17"]);
        let set = PrefixActiveNodeSet::new(snapshot, 1).extend_str("23");
        assert!(set.is_empty());
    }

    #[test]
    fn threshold_bounds_every_entry() {
        let snapshot = snapshot_of(&["form", "fork", "formal", "former", "fort", "storm"]);
        let mut rng = SmallRng::seed_from_u64(42);
        let alphabet = ['f', 'o', 'r', 'm', 's', 't', 'x'];

        for _ in 0..200 {
            let threshold = rng.gen_range(0..=3);
            let length = rng.gen_range(0..=6);
            let query: String =
                (0..length).map(|_| *alphabet.choose(&mut rng).unwrap()).collect();
            let base = if rng.gen() {
                PrefixActiveNodeSet::new(snapshot.clone(), threshold)
            } else {
                PrefixActiveNodeSet::with_transpositions(snapshot.clone(), threshold)
            };

            let mut set = base;
            for c in query.chars() {
                set = set.extend(c);
                for (_, pan) in set.iter() {
                    assert!(pan.transformation_distance <= threshold);
                    assert!(pan.edit_distance_of_prefix <= pan.transformation_distance);
                }
            }
        }
    }

    #[test]
    fn extension_is_monotonic() {
        let snapshot = snapshot_of(&["form", "fork", "formal", "storm", "fro"]);

        for query in ["form", "fro", "sform", "ofrm"] {
            let mut set = PrefixActiveNodeSet::with_transpositions(snapshot.clone(), 2);
            for c in query.chars() {
                let next = set.extend(c);
                // No entry appears out of nowhere: everything in the new
                // set is reachable from some node of the previous one.
                for (node, _) in next.iter() {
                    let reachable = set
                        .iter()
                        .any(|(source, _)| descendants(&snapshot, source).contains(&node));
                    assert!(reachable, "query {query:?}: unreachable node");
                }
                set = next;
            }
        }
    }

    #[test]
    fn merge_rule_is_order_independent() {
        let snapshot = snapshot_of(&["form", "fork", "fort", "storm"]);
        let nodes = descendants(&snapshot, snapshot.root());
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..50 {
            let candidates: Vec<(NodeId, PivotalActiveNode)> = (0..40)
                .map(|_| {
                    let node = *nodes.choose(&mut rng).unwrap();
                    let edp = rng.gen_range(0..=3);
                    let differ = rng.gen_range(0..=3);
                    (node, pan(edp + differ, differ, edp))
                })
                .collect();

            let mut reference = PrefixActiveNodeSet::new(snapshot.clone(), 2);
            for &(node, candidate) in &candidates {
                reference.add_or_merge(node, candidate);
            }

            let mut shuffled = candidates.clone();
            shuffled.shuffle(&mut rng);
            let mut permuted = PrefixActiveNodeSet::new(snapshot.clone(), 2);
            for (node, candidate) in shuffled {
                permuted.add_or_merge(node, candidate);
            }

            assert_eq!(reference.nodes, permuted.nodes);
        }
    }

    #[test]
    fn incremental_equals_from_scratch() {
        let snapshot = snapshot_of(&["form", "fork", "formal", "former", "storm"]);

        for threshold in 0..=2 {
            let base = PrefixActiveNodeSet::with_transpositions(snapshot.clone(), threshold);
            let mut incremental = base.clone();
            for (i, c) in "formal".chars().enumerate() {
                incremental = incremental.extend(c);
                // Recomputing the whole prefix in one go from a fresh base
                // case lands on the same map.
                let prefix: String = "formal".chars().take(i + 1).collect();
                let from_scratch = base.extend_str(&prefix);
                assert_eq!(incremental.nodes, from_scratch.nodes);
            }
        }
    }

    #[test]
    fn intermediate_sets_remain_usable() {
        let snapshot = snapshot_of(&["form", "fork"]);
        let base = PrefixActiveNodeSet::new(snapshot, 1);

        let fo = base.extend('f').extend('o');
        let before = fo.nodes.clone();
        // Branch the chain twice from the same intermediate set.
        let form = fo.extend('r').extend('m');
        let fork = fo.extend('r').extend('k');

        assert_eq!(fo.nodes, before);
        assert!(!form.is_empty());
        assert!(!fork.is_empty());
    }

    #[test]
    fn distances_never_undercut_levenshtein() {
        let snapshot =
            snapshot_of(&["form", "fork", "formal", "former", "fort", "storm", "forum"]);

        for query in ["form", "fro", "frm", "xorm", "fomr", "storn", "zzz", "foormal"] {
            let mut set = PrefixActiveNodeSet::new(snapshot.clone(), 2);
            for (i, c) in query.chars().enumerate() {
                set = set.extend(c);
                let prefix: String = query.chars().take(i + 1).collect();
                for (node, pan) in set.iter() {
                    let path = snapshot.prefix_string(node).unwrap();
                    // The stored cost is the cost of a real edit script, so
                    // the optimal script can only be cheaper.
                    assert!(
                        levenshtein(&prefix, &path) <= pan.transformation_distance as u16,
                        "prefix {prefix:?} path {path:?} pan {pan:?}"
                    );
                }
                // An exactly-matching path is always found, at cost zero.
                if let Some(node) = snapshot.node_for(&prefix) {
                    assert_eq!(set.get(node), Some(PivotalActiveNode::origin()));
                }
            }
        }
    }

    #[test]
    fn reconstruction_round_trips() {
        let snapshot = snapshot_of(&["form", "fork", "fort", "storm", "forum"]);
        let set = PrefixActiveNodeSet::with_transpositions(snapshot.clone(), 2)
            .extend_str("fro");

        let nodes: Vec<NodeId> = set.iter().map(|(node, _)| node).collect();
        let prefixes = set.computed_similar_prefixes();
        assert_eq!(prefixes.len(), nodes.len());
        for node in nodes {
            let string = snapshot.prefix_string(node).unwrap();
            // Re-walking the reconstructed string with exact lookups lands
            // exactly on the node it came from.
            assert_eq!(snapshot.node_for(&string), Some(node));
        }
    }

    #[test]
    fn snapshot_after_first_character() {
        let snapshot = snapshot_of(&["form", "fork"]);
        let set = PrefixActiveNodeSet::with_transpositions(snapshot, 1).extend('f');

        insta::assert_snapshot!(set, @r###"
        prefix: "f"
        threshold: 1
        transpositions: true
        "": distance 1 differ 1 prefix_distance 0
        "f": distance 0 differ 0 prefix_distance 0
        "###);
    }

    #[test]
    fn snapshot_after_transposed_prefix() {
        let snapshot = snapshot_of(&["form", "fork"]);
        let set = PrefixActiveNodeSet::with_transpositions(snapshot, 1).extend_str("fro");

        insta::assert_snapshot!(set, @r###"
        prefix: "fro"
        threshold: 1
        transpositions: true
        "fo": distance 1 differ 0 prefix_distance 1
        "for": distance 1 differ 0 prefix_distance 1
        "###);
    }
}
