//! # Cost Model
//!
//! Plan cost is two-dimensional: `startup` (cost to produce the first row)
//! and `total` (cost to produce all rows). Keeping the two separate lets the
//! hash-vs-sort decision honor a caller's row-limit budget: when only a
//! fraction of the output is needed, a low-startup plan (sorted stream) can
//! beat a plan whose total cost is lower but which must consume its whole
//! input before emitting anything (hash table build).
//!
//! The per-operation formulas follow the usual shapes: sorting is
//! O(n log n) comparisons, hash grouping pays one hash per input row and
//! holds one entry per group, streaming grouping pays one comparison per
//! input row. The absolute constants only matter relative to each other.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Cost charged per row emitted by an operator.
pub const CPU_TUPLE_COST: f64 = 0.01;
/// Cost charged per operator/comparison evaluation.
pub const CPU_OPERATOR_COST: f64 = 0.0025;
/// Per-entry overhead of a hash table beyond the stored row width.
pub const HASH_ENTRY_OVERHEAD_BYTES: f64 = 56.0;
/// Weight applied to bytes moved between execution units.
pub const REDISTRIBUTE_BYTE_COST: f64 = 0.0005;

/// Startup and total cost of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    /// Cost expended before the first output row is available.
    pub startup: f64,
    /// Cost expended to produce all output rows.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self {
            startup: 0.0,
            total: 0.0,
        }
    }

    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }
}

/// Cost of an explicit sort over `input_rows` rows of `width` bytes.
///
/// The whole input must be consumed and sorted before the first row comes
/// out, so the n log n term lands in startup.
pub fn cost_sort(input: &Cost, input_rows: f64, width: f64) -> Cost {
    let rows = input_rows.max(1.0);
    let comparisons = rows * rows.log2().max(1.0);
    // Charge a little extra for wide rows being shuffled through the sort.
    let width_factor = 1.0 + width / 1024.0;
    let startup = input.total + comparisons * 2.0 * CPU_OPERATOR_COST * width_factor;
    Cost {
        startup,
        total: startup + rows * CPU_TUPLE_COST,
    }
}

/// Cost of hash-based grouping: hash every input row into a table of
/// `groups` entries, then emit the groups.
///
/// The table must be fully built before any group is emitted, so the build
/// lands in startup.
pub fn cost_hash_grouping(input: &Cost, input_rows: f64, group_cols: usize, groups: f64) -> Cost {
    let startup = input.total + input_rows * (group_cols as f64) * CPU_OPERATOR_COST;
    Cost {
        startup,
        total: startup + groups.max(1.0) * CPU_TUPLE_COST,
    }
}

/// Cost of streaming grouping over already-sorted input: one comparison per
/// input row, emitting groups as boundaries are detected. Startup is the
/// input's startup -- the first group can be emitted early.
pub fn cost_stream_grouping(input: &Cost, input_rows: f64, group_cols: usize, groups: f64) -> Cost {
    Cost {
        startup: input.startup,
        total: input.total
            + input_rows * (group_cols as f64) * CPU_OPERATOR_COST
            + groups.max(1.0) * CPU_TUPLE_COST,
    }
}

/// Cost of a projection emitting `rows` rows.
pub fn cost_project(input: &Cost, rows: f64) -> Cost {
    Cost {
        startup: input.startup,
        total: input.total + rows * CPU_TUPLE_COST / 2.0,
    }
}

/// Cost of concatenating several inputs: children run in sequence, so the
/// first child's startup dominates and totals add.
pub fn cost_append(inputs: &[Cost]) -> Cost {
    Cost {
        startup: inputs.first().map(|c| c.startup).unwrap_or(0.0),
        total: inputs.iter().map(|c| c.total).sum(),
    }
}

/// Cost of redistributing `rows` rows of `width` bytes across execution
/// units. Dominated by the bytes moved.
pub fn cost_redistribute(input: &Cost, rows: f64, width: f64) -> Cost {
    Cost {
        startup: input.startup,
        total: input.total + rows * width * REDISTRIBUTE_BYTE_COST + rows * CPU_TUPLE_COST,
    }
}

/// Estimated hash-table memory for `groups` entries of `width`-byte rows.
pub fn hash_table_bytes(width: f64, groups: f64) -> f64 {
    (width + HASH_ENTRY_OVERHEAD_BYTES) * groups.max(1.0)
}

/// Compare two costs under a row-limit fraction.
///
/// With `fraction` in (0, 1), each plan is charged its startup cost plus the
/// given fraction of its run cost -- the caller only intends to pull that
/// share of the output. A fraction outside (0, 1) means "all rows": compare
/// totals.
pub fn compare_fractional(a: &Cost, b: &Cost, fraction: f64) -> Ordering {
    let (ca, cb) = if fraction > 0.0 && fraction < 1.0 {
        (
            a.startup + fraction * (a.total - a.startup),
            b.startup + fraction * (b.total - b.startup),
        )
    } else {
        (a.total, b.total)
    };
    ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_comparison_prefers_low_startup() {
        // Hash: everything in startup. Sorted stream: cheap startup, higher total.
        let hashed = Cost::new(100.0, 101.0);
        let sorted = Cost::new(5.0, 150.0);
        assert_eq!(compare_fractional(&hashed, &sorted, 0.0), Ordering::Less);
        assert_eq!(compare_fractional(&hashed, &sorted, 0.01), Ordering::Greater);
    }

    #[test]
    fn sort_startup_covers_whole_input() {
        let input = Cost::new(0.0, 10.0);
        let sorted = cost_sort(&input, 1000.0, 32.0);
        assert!(sorted.startup > input.total);
        assert!(sorted.total > sorted.startup);
    }

    #[test]
    fn stream_grouping_keeps_input_startup() {
        let input = Cost::new(3.0, 50.0);
        let grouped = cost_stream_grouping(&input, 1000.0, 2, 10.0);
        assert_eq!(grouped.startup, 3.0);
    }
}
