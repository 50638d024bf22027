pub mod buddy;

pub use buddy::{Block, BlockId, BlockKind, BuddyAllocator, block_size_for};
