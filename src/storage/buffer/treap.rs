//! Randomized order-statistics search tree (treap) over arena-held nodes.
//!
//! Nodes live in a slice owned by the caller and are addressed by [`FrameId`].
//! A [`Treap`] only stores the root index and the member count; all linkage is
//! kept inside the nodes themselves, so moving a node between trees is a matter
//! of re-linking, never of copying.
//!
//! Every node satisfies two orders:
//!
//! - search order: keys in the left subtree are not bigger than the node's key,
//!   keys in the right subtree are bigger;
//! - heap order: a node's priority is at least the priority of both children.
//!
//! Priorities are drawn fresh from the tree's own generator on every insert,
//! which keeps the expected height logarithmic. Each node also records the
//! size of its subtree so rank queries run in expected `O(log n)`.

use crate::storage::{StorageError, StorageResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub type FrameId = usize;

/// Intrusive linkage embedded in every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    pub(crate) left: Option<FrameId>,
    pub(crate) right: Option<FrameId>,
    pub(crate) priority: u64,
    /// Number of nodes in the subtree rooted here (zero while unlinked).
    pub(crate) size: usize,
}

/// A node that can be linked into a [`Treap`].
pub trait TreapNode {
    fn key(&self) -> u64;
    fn link(&self) -> &Link;
    fn link_mut(&mut self) -> &mut Link;
}

/// Where a subtree hangs: the tree root or one side of a parent.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    Left(FrameId),
    Right(FrameId),
}

#[derive(Debug)]
pub struct Treap {
    root: Option<FrameId>,
    count: usize,
    rng: StdRng,
}

impl Treap {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a tree whose priorities and random picks are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            root: None,
            count: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<FrameId> {
        self.root
    }

    /// Links `id` into the tree under its current key.
    ///
    /// `id` must not be linked into any tree: fresh nodes and nodes returned
    /// by one of the `erase` calls qualify. The node sinks past every member
    /// with a higher priority; whatever subtree it displaces is split around
    /// its key and hung below it.
    pub fn insert<N: TreapNode>(&mut self, nodes: &mut [N], id: FrameId) -> FrameId {
        debug_assert_eq!(
            *nodes[id].link(),
            Link::default(),
            "node {} is already linked",
            id
        );
        let priority = self.rng.gen::<u64>();
        *nodes[id].link_mut() = Link {
            left: None,
            right: None,
            priority,
            size: 1,
        };
        let key = nodes[id].key();

        let mut slot = Slot::Root;
        let mut current = self.root;
        while let Some(node) = current {
            if nodes[node].link().priority < priority {
                break;
            }
            nodes[node].link_mut().size += 1;
            if key <= nodes[node].key() {
                slot = Slot::Left(node);
                current = nodes[node].link().left;
            } else {
                slot = Slot::Right(node);
                current = nodes[node].link().right;
            }
        }

        let (left, right) = split(nodes, current, key);
        let link = nodes[id].link_mut();
        link.left = left;
        link.right = right;
        update_size(nodes, id);

        self.attach(nodes, slot, Some(id));
        self.count += 1;
        id
    }

    /// Returns some member whose key equals `key`.
    pub fn find<N: TreapNode>(&self, nodes: &[N], key: u64) -> Option<FrameId> {
        let mut current = self.root;
        while let Some(node) = current {
            let node_key = nodes[node].key();
            if key == node_key {
                return Some(node);
            }
            current = if key < node_key {
                nodes[node].link().left
            } else {
                nodes[node].link().right
            };
        }
        None
    }

    /// Returns the member at in-order position `rank` (0-based).
    pub fn get<N: TreapNode>(&self, nodes: &[N], rank: usize) -> Option<FrameId> {
        let mut rank = rank;
        let mut current = self.root;
        while let Some(node) = current {
            let left = nodes[node].link().left;
            let left_size = subtree_size(nodes, left);
            if rank < left_size {
                current = left;
            } else if rank == left_size {
                return Some(node);
            } else {
                rank -= left_size + 1;
                current = nodes[node].link().right;
            }
        }
        None
    }

    /// Returns true if this very node (not merely its key) is a member.
    pub fn contains<N: TreapNode>(&self, nodes: &[N], id: FrameId) -> bool {
        self.locate(nodes, id).is_some()
    }

    /// Unlinks `id`. Returns `None` if it is not a member of this tree.
    pub fn erase<N: TreapNode>(&mut self, nodes: &mut [N], id: FrameId) -> Option<FrameId> {
        let slot = self.locate(nodes, id)?;

        let key = nodes[id].key();
        let mut current = self.root;
        while let Some(node) = current {
            if node == id {
                break;
            }
            nodes[node].link_mut().size -= 1;
            current = if key <= nodes[node].key() {
                nodes[node].link().left
            } else {
                nodes[node].link().right
            };
        }

        let Link { left, right, .. } = *nodes[id].link();
        let merged = join(nodes, left, right);
        self.attach(nodes, slot, merged);

        *nodes[id].link_mut() = Link::default();
        self.count -= 1;
        Some(id)
    }

    /// Unlinks the member with the smallest key.
    pub fn erase_min<N: TreapNode>(&mut self, nodes: &mut [N]) -> Option<FrameId> {
        let mut slot = Slot::Root;
        let mut current = self.root?;
        while let Some(left) = nodes[current].link().left {
            nodes[current].link_mut().size -= 1;
            slot = Slot::Left(current);
            current = left;
        }

        let right = nodes[current].link().right;
        self.attach(nodes, slot, right);

        *nodes[current].link_mut() = Link::default();
        self.count -= 1;
        Some(current)
    }

    /// Unlinks a uniformly chosen member.
    pub fn erase_random<N: TreapNode>(&mut self, nodes: &mut [N]) -> Option<FrameId> {
        if self.count == 0 {
            return None;
        }
        let rank = self.rng.gen_range(0..self.count);
        let id = self.get(nodes, rank)?;
        self.erase(nodes, id)
    }

    /// Member keys in ascending order.
    pub fn keys<N: TreapNode>(&self, nodes: &[N]) -> Vec<u64> {
        let mut keys = Vec::with_capacity(self.count);
        let mut stack = Vec::new();
        let mut current = self.root;
        loop {
            while let Some(node) = current {
                stack.push(node);
                current = nodes[node].link().left;
            }
            match stack.pop() {
                Some(node) => {
                    keys.push(nodes[node].key());
                    current = nodes[node].link().right;
                }
                None => break,
            }
        }
        keys
    }

    /// Checks search order, heap order, subtree sizes and the member count.
    pub fn validate<N: TreapNode>(&self, nodes: &[N]) -> StorageResult<()> {
        let mut budget = nodes.len();
        let reachable = check_subtree(nodes, self.root, None, None, &mut budget)?;
        if reachable != self.count {
            return Err(StorageError::CorruptIndex(format!(
                "count is {} but {} nodes are reachable",
                self.count, reachable
            )));
        }
        Ok(())
    }

    /// Finds where `id` hangs by walking its key's search path.
    fn locate<N: TreapNode>(&self, nodes: &[N], id: FrameId) -> Option<Slot> {
        let key = nodes.get(id)?.key();
        let mut slot = Slot::Root;
        let mut current = self.root;
        while let Some(node) = current {
            if node == id {
                return Some(slot);
            }
            if key <= nodes[node].key() {
                slot = Slot::Left(node);
                current = nodes[node].link().left;
            } else {
                slot = Slot::Right(node);
                current = nodes[node].link().right;
            }
        }
        None
    }

    fn attach<N: TreapNode>(&mut self, nodes: &mut [N], slot: Slot, child: Option<FrameId>) {
        match slot {
            Slot::Root => self.root = child,
            Slot::Left(parent) => nodes[parent].link_mut().left = child,
            Slot::Right(parent) => nodes[parent].link_mut().right = child,
        }
    }
}

impl Default for Treap {
    fn default() -> Self {
        Self::new()
    }
}

fn subtree_size<N: TreapNode>(nodes: &[N], id: Option<FrameId>) -> usize {
    id.map_or(0, |id| nodes[id].link().size)
}

fn update_size<N: TreapNode>(nodes: &mut [N], id: FrameId) {
    let link = *nodes[id].link();
    let size = 1 + subtree_size(nodes, link.left) + subtree_size(nodes, link.right);
    nodes[id].link_mut().size = size;
}

/// Splits a subtree into keys `<= key` and keys `> key`.
fn split<N: TreapNode>(
    nodes: &mut [N],
    root: Option<FrameId>,
    key: u64,
) -> (Option<FrameId>, Option<FrameId>) {
    let Some(node) = root else {
        return (None, None);
    };
    if nodes[node].key() <= key {
        let right = nodes[node].link().right;
        let (not_bigger, bigger) = split(nodes, right, key);
        nodes[node].link_mut().right = not_bigger;
        update_size(nodes, node);
        (Some(node), bigger)
    } else {
        let left = nodes[node].link().left;
        let (not_bigger, bigger) = split(nodes, left, key);
        nodes[node].link_mut().left = bigger;
        update_size(nodes, node);
        (not_bigger, Some(node))
    }
}

/// Joins two subtrees where every key of `left` is not bigger than every key
/// of `right`. The higher-priority root stays on top.
fn join<N: TreapNode>(
    nodes: &mut [N],
    left: Option<FrameId>,
    right: Option<FrameId>,
) -> Option<FrameId> {
    match (left, right) {
        (None, other) | (other, None) => other,
        (Some(l), Some(r)) => {
            if nodes[l].link().priority >= nodes[r].link().priority {
                let l_right = nodes[l].link().right;
                let merged = join(nodes, l_right, Some(r));
                nodes[l].link_mut().right = merged;
                update_size(nodes, l);
                Some(l)
            } else {
                let r_left = nodes[r].link().left;
                let merged = join(nodes, Some(l), r_left);
                nodes[r].link_mut().left = merged;
                update_size(nodes, r);
                Some(r)
            }
        }
    }
}

fn check_subtree<N: TreapNode>(
    nodes: &[N],
    id: Option<FrameId>,
    low: Option<u64>,
    high: Option<u64>,
    budget: &mut usize,
) -> StorageResult<usize> {
    let Some(id) = id else {
        return Ok(0);
    };
    if id >= nodes.len() {
        return Err(StorageError::CorruptIndex(format!("link to unknown node {}", id)));
    }
    if *budget == 0 {
        return Err(StorageError::CorruptIndex("cycle in tree links".to_string()));
    }
    *budget -= 1;

    let key = nodes[id].key();
    let link = *nodes[id].link();
    if low.is_some_and(|low| key < low) || high.is_some_and(|high| key > high) {
        return Err(StorageError::CorruptIndex(format!(
            "node {} with key {} breaks search order",
            id, key
        )));
    }
    for child in [link.left, link.right].into_iter().flatten() {
        if child < nodes.len() && nodes[child].link().priority > link.priority {
            return Err(StorageError::CorruptIndex(format!(
                "child {} outranks parent {}",
                child, id
            )));
        }
    }

    let left = check_subtree(nodes, link.left, low, Some(key), budget)?;
    let right = check_subtree(nodes, link.right, Some(key), high, budget)?;
    let size = 1 + left + right;
    if link.size != size {
        return Err(StorageError::CorruptIndex(format!(
            "node {} records size {} but holds {}",
            id, link.size, size
        )));
    }
    Ok(size)
}
