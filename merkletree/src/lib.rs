use std::fmt::Display;

use tally_crypto::Hash;

/// Merkle aggregation over an ordered list of leaf hashes.
///
/// Leaves are stored as given. Each parent is the hash of its two children
/// concatenated; a level with an odd count pairs its last node with itself.
/// The tree is stored level by level, leaves first, root last.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    tree: Vec<Hash>,
    leaf_count: usize,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Hash]) -> Self {
        let mut merkle = MerkleTree {
            tree: leaves.to_vec(),
            leaf_count: leaves.len(),
        };
        merkle.rebuild_tree();
        merkle
    }

    /// `None` when the tree has no leaves.
    pub fn root(&self) -> Option<Hash> {
        self.tree.last().copied()
    }

    fn rebuild_tree(&mut self) {
        let mut leaves = self.tree[..self.leaf_count].to_vec();
        self.tree = leaves.clone();

        while leaves.len() > 1 {
            let parents = leaves
                .chunks(2)
                .map(|pair| Hash::concat_and_hash(&[pair[0], *pair.get(1).unwrap_or(&pair[0])]))
                .collect::<Vec<Hash>>();
            self.tree.extend_from_slice(&parents);
            leaves = parents;
        }
    }
}

/// Root of the ordered leaf list, `None` for an empty list.
pub fn merkle_root(leaves: &[Hash]) -> Option<Hash> {
    MerkleTree::from_leaves(leaves).root()
}

impl Display for MerkleTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.leaf_count == 0 {
            return write!(f, "<empty>");
        }
        let mut counter = self.leaf_count - 1;
        let mut level_count = self.leaf_count;
        for node in &self.tree {
            let mut display = node.to_hex();
            display.truncate(8);

            write!(f, "{}, ", display)?;

            if counter == 0 {
                writeln!(f)?;
                level_count = (level_count + 1) / 2;
                counter = level_count.saturating_sub(1);
            } else {
                counter -= 1;
            }
        }
        Ok(())
    }
}
