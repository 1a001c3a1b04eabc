// src/utils.rs
use crate::types::BlockRange;

/// Splits `[from_block, to_block]` into consecutive windows of at most `chunk_size` blocks.
/// Empty when the bounds are inverted or `chunk_size` is zero.
pub fn create_block_chunks(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<BlockRange> {
    let mut chunks = Vec::new();
    if chunk_size == 0 {
        return chunks;
    }
    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = current_from
            .saturating_add(chunk_size - 1)
            .min(to_block);
        chunks.push(BlockRange {
            from_block: current_from,
            to_block: current_to,
        });
        match current_to.checked_add(1) {
            Some(next) => current_from = next,
            None => break,
        }
    }
    chunks
}

/// Number of blocks covering `days` at `blocks_per_day`, rounded to nearest.
pub fn blocks_for_days(days: f64, blocks_per_day: u64) -> u64 {
    if !days.is_finite() || days <= 0.0 {
        return 0;
    }
    (days * blocks_per_day as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_cover_range_contiguously() {
        let chunks = create_block_chunks(100, 1_050, 200);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], BlockRange { from_block: 100, to_block: 299 });
        assert_eq!(chunks[4], BlockRange { from_block: 900, to_block: 1_050 });
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].to_block + 1, pair[1].from_block);
        }
    }

    #[test]
    fn test_chunks_edge_cases() {
        assert_eq!(create_block_chunks(7, 7, 100), vec![BlockRange::single(7)]);
        assert!(create_block_chunks(8, 7, 100).is_empty());
        assert!(create_block_chunks(0, 10, 0).is_empty());
        let top = create_block_chunks(u64::MAX - 1, u64::MAX, 1);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_blocks_for_days() {
        assert_eq!(blocks_for_days(1.0, 7_200), 7_200);
        assert_eq!(blocks_for_days(0.5, 7_200), 3_600);
        assert_eq!(blocks_for_days(0.0001, 7_200), 1);
        assert_eq!(blocks_for_days(-1.0, 7_200), 0);
    }
}
