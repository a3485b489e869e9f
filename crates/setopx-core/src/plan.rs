//! # Physical Plans
//!
//! A [`PhysicalPlan`] is one node of the chosen execution plan: an operator,
//! its inputs, the output schema, a row estimate, startup/total cost, and the
//! node's parallel execution distribution.
//!
//! ## Distribution
//!
//! `Distribution` records how a node's output rows are spread across parallel
//! execution units. It is load-bearing for correctness, not just cost: before
//! rows from two inputs can be compared for duplicate elimination, equal rows
//! must be guaranteed to meet on the same execution unit. `Sharded` with a
//! non-empty key set co-locates rows that are equal on those columns;
//! `Sharded` with an empty key set means rows are spread with no co-location
//! guarantee (the result of appending differently-distributed inputs).

use crate::cost::Cost;
use crate::schema::OutputSchema;
use crate::types::RelId;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// How a plan node's output rows are spread across parallel execution units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    /// All rows on a single execution unit.
    Single,
    /// Rows spread across units, co-located by hash of the named output
    /// columns (1-based positions). An empty key set means no co-location
    /// guarantee.
    Sharded(Vec<u32>),
    /// Every row present on every execution unit.
    Replicated,
}

impl Distribution {
    /// Whether grouping on `group_cols` is valid without redistribution:
    /// every set of rows equal on those columns must reside on one unit.
    pub fn valid_for_grouping(&self, group_cols: &[u32]) -> bool {
        match self {
            Distribution::Single | Distribution::Replicated => true,
            Distribution::Sharded(keys) => {
                !keys.is_empty() && keys.iter().all(|k| group_cols.contains(k))
            }
        }
    }
}

/// Reduction applied by a set-operation node to each group of equal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOpCmd {
    /// Emit one row per group present in both operands.
    Intersect,
    /// Emit `min(c0, c1)` rows per group.
    IntersectAll,
    /// Emit one row per group present in the first operand but not the second.
    Except,
    /// Emit `max(c0 - c1, 0)` rows per group.
    ExceptAll,
}

/// Physical strategy of a set-operation reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOpStrategy {
    Hashed,
    Sorted,
}

/// Physical operator of one plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanOp {
    /// Scan over a planned leaf subquery. Produced by the external per-leaf
    /// planner; opaque to this core beyond its schema, rows, and cost.
    SubqueryScan { rel: RelId },
    /// Compute the node's schema expressions over the single input.
    Project,
    /// Concatenate the inputs.
    Append,
    /// Hash-based duplicate elimination grouping on the given output
    /// positions.
    HashDedup { group_refs: Vec<u32> },
    /// Explicit sort on the given output positions.
    Sort { sort_refs: Vec<u32> },
    /// Streaming duplicate elimination over sorted input.
    Unique { group_refs: Vec<u32> },
    /// INTERSECT/EXCEPT reduction: group on `group_refs`, count per-operand
    /// occurrences via the provenance flag at `flag_position`, and emit rows
    /// per the command's rule.
    SetOpReduce {
        cmd: SetOpCmd,
        strategy: SetOpStrategy,
        group_refs: Vec<u32>,
        /// 1-based position of the auxiliary provenance flag column.
        flag_position: u32,
        /// Flag value of the first-concatenated operand; needed by the hashed
        /// strategy to seed table entries. `None` for the sorted strategy.
        first_operand_flag: Option<i32>,
        /// Estimated number of distinct groups.
        groups: f64,
    },
    /// Move rows between execution units to reach the node's distribution.
    Redistribute,
    /// Self-referential union: evaluate the first input once, then iterate
    /// the second input against the accumulated working set. An empty
    /// `group_refs` means UNION ALL semantics (no duplicate elimination).
    RecursiveUnion { group_refs: Vec<u32>, groups: f64 },
}

/// One node of a physical execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPlan {
    pub op: PlanOp,
    pub inputs: Vec<PhysicalPlan>,
    pub schema: OutputSchema,
    /// Estimated output row count.
    pub rows: f64,
    pub cost: Cost,
    pub distribution: Distribution,
}

impl PhysicalPlan {
    /// Render the plan tree for debugging and test assertions.
    pub fn display(&self, indent: usize) -> String {
        let mut out = String::new();
        let pad = "  ".repeat(indent);
        let label = match &self.op {
            PlanOp::SubqueryScan { rel } => format!("SubqueryScan(rel={rel})"),
            PlanOp::Project => "Project".to_string(),
            PlanOp::Append => "Append".to_string(),
            PlanOp::HashDedup { group_refs } => format!("HashDedup(cols={group_refs:?})"),
            PlanOp::Sort { sort_refs } => format!("Sort(cols={sort_refs:?})"),
            PlanOp::Unique { group_refs } => format!("Unique(cols={group_refs:?})"),
            PlanOp::SetOpReduce { cmd, strategy, .. } => {
                format!("SetOpReduce({cmd:?}, {strategy:?})")
            }
            PlanOp::Redistribute => format!("Redistribute({:?})", self.distribution),
            PlanOp::RecursiveUnion { .. } => "RecursiveUnion".to_string(),
        };
        let _ = writeln!(
            out,
            "{pad}{label} rows={:.0} cost={:.2}..{:.2}",
            self.rows, self.cost.startup, self.cost.total
        );
        for child in &self.inputs {
            out.push_str(&child.display(indent + 1));
        }
        out
    }

    /// Depth-first search for an operator satisfying `pred`.
    pub fn find_op(&self, pred: &dyn Fn(&PlanOp) -> bool) -> Option<&PhysicalPlan> {
        if pred(&self.op) {
            return Some(self);
        }
        self.inputs.iter().find_map(|c| c.find_op(pred))
    }
}
