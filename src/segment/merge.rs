//! Greedy single-pass merge of y-sorted line candidates
//!
//! A candidate joins the running line when it starts before that line is
//! 60% finished vertically. The pass is order dependent: callers must sort
//! by top edge first.

use super::types::Region;

/// Fraction of the running line's height within which a new candidate merges
pub const MERGE_OVERLAP_FACTOR: f64 = 0.6;

/// Whether `next` continues the line currently spanning `current`
pub fn continues_line(current: &Region, next: &Region) -> bool {
    let reach = (current.height as f64 * MERGE_OVERLAP_FACTOR) as u32;
    next.y <= current.y + reach
}

/// Merge y-sorted regions into final line regions
pub fn merge_regions(sorted: &[Region]) -> Vec<Region> {
    let mut merged = Vec::with_capacity(sorted.len());
    let mut iter = sorted.iter();
    let Some(first) = iter.next() else {
        return merged;
    };

    let mut current = *first;
    for next in iter {
        if continues_line(&current, next) {
            current = current.union(next);
        } else {
            merged.push(current);
            current = *next;
        }
    }
    merged.push(current);
    merged
}
