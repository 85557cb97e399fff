use serde::{Deserialize, Serialize};

use crate::EditDistance;

/// The match bookkeeping attached to one trie node of an active-node set.
///
/// `transformation_distance` is the total edit cost spent reaching the node
/// for the current prefix, `differ` counts the extra character positions
/// explored beyond an exact-match alignment, and `edit_distance_of_prefix`
/// is the share of the budget already attributable to the consumed prefix,
/// excluding further lookahead. `transformation_distance` is never smaller
/// than `edit_distance_of_prefix` and both stay within the threshold of the
/// set that owns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PivotalActiveNode {
    pub transformation_distance: EditDistance,
    pub differ: EditDistance,
    pub edit_distance_of_prefix: EditDistance,
}

impl PivotalActiveNode {
    /// The record stored for the root node under the empty prefix.
    pub fn origin() -> PivotalActiveNode {
        PivotalActiveNode {
            transformation_distance: 0,
            differ: 0,
            edit_distance_of_prefix: 0,
        }
    }

    /// Whether `self` must replace `other` when both reach the same node.
    ///
    /// Smaller distance wins. At equal distance the record that matched more
    /// positions exactly (greater `differ`) wins, then the one that spent
    /// less of its budget on the prefix alone: it leaves more depth budget
    /// for future extensions. This precedence is a compatibility contract,
    /// changing it changes observable ranking output.
    pub fn improves(&self, other: &PivotalActiveNode) -> bool {
        if self.transformation_distance != other.transformation_distance {
            return self.transformation_distance < other.transformation_distance;
        }
        if self.differ != other.differ {
            return self.differ > other.differ;
        }
        self.edit_distance_of_prefix < other.edit_distance_of_prefix
    }
}
