//! Block planning for detail fetches

use crate::models::{Block, ListingRecord};

/// Split `records` into consecutive blocks of at most `block_size`
///
/// Order is preserved and the last block may be shorter. Blocks are indexed
/// from zero. A `block_size` of zero is treated as one.
pub fn partition(records: &[ListingRecord], block_size: usize) -> Vec<Block> {
    records
        .chunks(block_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Block::new(index, chunk.to_vec()))
        .collect()
}
