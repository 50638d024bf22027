//! Binary buddy allocator over a fixed address range.
//!
//! Blocks live in a `SlotMap` arena. A parent owns its two children by key and
//! every child keeps a plain key back to its parent, so merging is just
//! removing the two child keys and turning the parent back into a free leaf.

use slotmap::{SlotMap, new_key_type};

use crate::{
    core::WorkloadId,
    error::{Error, Result},
};

new_key_type! {
    pub struct BlockId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Free,
    Allocated { owner: WorkloadId, requested: u64 },
    Split { left: BlockId, right: BlockId },
}

#[derive(Debug, Clone)]
pub struct Block {
    pub size: u64,
    pub start: u64,
    pub parent: Option<BlockId>,
    pub kind: BlockKind,
}

impl Block {
    fn new(size: u64, start: u64, parent: Option<BlockId>) -> Self {
        Self {
            size,
            start,
            parent,
            kind: BlockKind::Free,
        }
    }

    /// Exclusive end of the address range.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, BlockKind::Split { .. })
    }

    pub fn is_free(&self) -> bool {
        self.kind == BlockKind::Free
    }

    pub fn owner(&self) -> Option<WorkloadId> {
        match self.kind {
            BlockKind::Allocated { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Size the owner asked for; only meaningful on an allocated leaf.
    pub fn requested_size(&self) -> Option<u64> {
        match self.kind {
            BlockKind::Allocated { requested, .. } => Some(requested),
            _ => None,
        }
    }
}

/// Smallest power of two that can hold `size`, or `None` when that does not
/// fit in a `u64`. Zero-sized requests still take a unit block.
pub fn block_size_for(size: u64) -> Option<u64> {
    size.max(1).checked_next_power_of_two()
}

#[derive(Debug)]
pub struct BuddyAllocator {
    blocks: SlotMap<BlockId, Block>,
    root: BlockId,
    capacity: u64,
}

impl BuddyAllocator {
    pub fn new(capacity: u64) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::InvalidCapacity(capacity));
        }
        let mut blocks = SlotMap::with_key();
        let root = blocks.insert(Block::new(capacity, 0, None));
        Ok(Self {
            blocks,
            root,
            capacity,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Claims a free leaf of `block_size_for(size)` for `owner`, splitting
    /// larger leaves on the way down. Returns `None` when no free block is big
    /// enough; that is routine and the caller decides what to do next.
    pub fn allocate(&mut self, size: u64, owner: WorkloadId) -> Option<BlockId> {
        let required = block_size_for(size).filter(|&r| r <= self.capacity)?;

        let id = self.allocate_in(self.root, required)?;
        self.blocks[id].kind = BlockKind::Allocated {
            owner,
            requested: size,
        };
        log::debug!(
            "buddy: {} units for workload {} -> [{}, {})",
            size,
            owner,
            self.blocks[id].start,
            self.blocks[id].end()
        );
        Some(id)
    }

    fn allocate_in(&mut self, node: BlockId, required: u64) -> Option<BlockId> {
        let (size, kind) = {
            let block = &self.blocks[node];
            (block.size, block.kind)
        };
        if size < required {
            return None;
        }

        match kind {
            BlockKind::Allocated { .. } => None,
            BlockKind::Free if size == required => Some(node),
            BlockKind::Free => {
                let (left, right) = self.split(node);
                self.allocate_in(left, required)
                    .or_else(|| self.allocate_in(right, required))
            }
            BlockKind::Split { left, right } => {
                let left_best = self.best_fit(left, required);
                let right_best = self.best_fit(right, required);
                if left_best.is_none() && right_best.is_none() {
                    return None;
                }

                // Tighter subtree first; left wins ties.
                let (first, second) =
                    if left_best.unwrap_or(u64::MAX) <= right_best.unwrap_or(u64::MAX) {
                        (left, right)
                    } else {
                        (right, left)
                    };
                self.allocate_in(first, required)
                    .or_else(|| self.allocate_in(second, required))
            }
        }
    }

    /// Size of the smallest free leaf under `node` that can hold `required`.
    fn best_fit(&self, node: BlockId, required: u64) -> Option<u64> {
        let block = &self.blocks[node];
        match block.kind {
            BlockKind::Free if block.size >= required => Some(block.size),
            BlockKind::Free | BlockKind::Allocated { .. } => None,
            BlockKind::Split { left, right } => {
                match (self.best_fit(left, required), self.best_fit(right, required)) {
                    (Some(l), Some(r)) => Some(l.min(r)),
                    (l, r) => l.or(r),
                }
            }
        }
    }

    fn split(&mut self, node: BlockId) -> (BlockId, BlockId) {
        let (size, start) = {
            let block = &self.blocks[node];
            debug_assert!(block.is_free(), "only free leaves are split");
            (block.size, block.start)
        };
        let half = size / 2;
        let left = self.blocks.insert(Block::new(half, start, Some(node)));
        let right = self.blocks.insert(Block::new(half, start + half, Some(node)));
        self.blocks[node].kind = BlockKind::Split { left, right };
        (left, right)
    }

    /// Frees the leaf owned by `owner` and merges free buddies upward.
    /// Returns a snapshot of the freed leaf, or `None` if `owner` holds nothing.
    pub fn deallocate(&mut self, owner: WorkloadId) -> Option<Block> {
        let id = self.find_by_owner(owner)?;
        let freed = self.blocks[id].clone();
        self.blocks[id].kind = BlockKind::Free;

        let mut current = id;
        while let Some(parent) = self.blocks[current].parent {
            let BlockKind::Split { left, right } = self.blocks[parent].kind else {
                break;
            };
            if !(self.blocks[left].is_free() && self.blocks[right].is_free()) {
                break;
            }
            self.blocks.remove(left);
            self.blocks.remove(right);
            self.blocks[parent].kind = BlockKind::Free;
            current = parent;
        }

        log::debug!(
            "buddy: released [{}, {}) from workload {}",
            freed.start,
            freed.end(),
            owner
        );
        Some(freed)
    }

    pub fn find_by_owner(&self, owner: WorkloadId) -> Option<BlockId> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.blocks[id].kind {
                BlockKind::Allocated { owner: o, .. } if o == owner => return Some(id),
                BlockKind::Split { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                _ => {}
            }
        }
        None
    }

    /// Leaves in address order.
    pub fn leaves(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let block = &self.blocks[id];
            match block.kind {
                BlockKind::Split { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                _ => out.push(block),
            }
        }
        out
    }

    pub fn free_blocks(&self) -> Vec<&Block> {
        self.leaves().into_iter().filter(|b| b.is_free()).collect()
    }

    pub fn allocated_blocks(&self) -> Vec<&Block> {
        self.leaves().into_iter().filter(|b| !b.is_free()).collect()
    }

    pub fn free_total(&self) -> u64 {
        self.free_blocks().iter().map(|b| b.size).sum()
    }

    pub fn allocated_total(&self) -> u64 {
        self.allocated_blocks().iter().map(|b| b.size).sum()
    }

    /// Drops every block and starts over with a single free root.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.root = self.blocks.insert(Block::new(self.capacity, 0, None));
    }

    /// Walks the whole tree and reports the first structural violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut reachable = 0usize;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            reachable += 1;
            let block = &self.blocks[id];
            if !block.size.is_power_of_two() {
                return Err(format!("block at {} has size {}", block.start, block.size));
            }
            let BlockKind::Split { left, right } = block.kind else {
                continue;
            };
            let (l, r) = (&self.blocks[left], &self.blocks[right]);
            if l.parent != Some(id) || r.parent != Some(id) {
                return Err(format!("children of block at {} lost their parent", block.start));
            }
            if l.size + r.size != block.size
                || l.start != block.start
                || r.start != l.end()
                || r.end() != block.end()
            {
                return Err(format!(
                    "block [{}, {}) is not halved by its children",
                    block.start,
                    block.end()
                ));
            }
            if l.is_free() && r.is_free() {
                return Err(format!(
                    "free buddies under [{}, {}) were not merged",
                    block.start,
                    block.end()
                ));
            }
            stack.push(left);
            stack.push(right);
        }

        if reachable != self.blocks.len() {
            return Err(format!(
                "{} blocks in arena but {} reachable from the root",
                self.blocks.len(),
                reachable
            ));
        }
        let total = self.free_total() + self.allocated_total();
        if total != self.capacity {
            return Err(format!("leaves cover {} of {} units", total, self.capacity));
        }
        Ok(())
    }
}
