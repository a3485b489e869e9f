//! # Statement-Wide Planning Context
//!
//! One [`PlannerContext`] exists per statement being planned. It owns the
//! range table, the append-relation list, row marks, dynamic scan
//! descriptors, and the subplan registry. The append-relation expander is
//! the only writer of the append-relation machinery; the plan builder and
//! attribute rewriter read it afterwards. Passing the context by reference
//! through the call tree keeps the single-writer discipline visible in the
//! signatures instead of hiding it in global state.

use crate::expr::ScalarExpr;
use crate::plan::PhysicalPlan;
use crate::query::{QueryFragment, RowMark};
use crate::relids::{ColumnSet, RelIdSet};
use crate::types::{RelId, RowTypeId, SubplanId, TableId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tuning knobs and limits for one planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Memory budget for a duplicate-elimination hash table, in kilobytes.
    pub work_mem_kb: u64,
    /// Whether hash-based duplicate elimination may be chosen at all.
    pub enable_hash_dedup: bool,
    /// Whether the external leaf planner should prefer plans that satisfy a
    /// leaf query's internal ORDER BY. Cleared when planning set-operation
    /// leaves: sibling order is irrelevant to the combine step.
    pub honor_sort_preference: bool,
    /// Whether the global deadlock-avoidance mode is active, allowing a
    /// row-locking clause over a single relation to take a weaker row-level
    /// lock instead of a strong table lock.
    pub deadlock_avoidance_mode: bool,
    /// Depth limit for the set-operation tree recursion.
    pub max_setop_nesting: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            work_mem_kb: 4096,
            enable_hash_dedup: true,
            honor_sort_preference: true,
            deadlock_avoidance_mode: false,
            max_setop_nesting: 128,
        }
    }
}

/// What a range-table entry refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeEntryKind {
    /// A stored relation.
    Relation {
        table: TableId,
        kind: crate::catalog::RelationKind,
    },
    /// A planned-separately subquery (set-operation leaves, flattened
    /// UNION ALL members).
    Subquery { query: QueryFragment },
}

/// One entry of the statement's range table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeTableEntry {
    pub kind: RangeEntryKind,
    /// Declared column names, aligned with the relation's column ordinals.
    pub column_names: Vec<String>,
    /// Whether this reference asks for inheritance expansion. Cleared when
    /// expansion finds nothing to expand.
    pub inherit: bool,
    /// Columns this statement reads (ordinal bits; bit 0 = whole row).
    pub selected_cols: ColumnSet,
    /// Columns this statement inserts into.
    pub inserted_cols: ColumnSet,
    /// Columns this statement updates.
    pub updated_cols: ColumnSet,
}

impl RangeTableEntry {
    pub fn relation(table: TableId, kind: crate::catalog::RelationKind) -> Self {
        Self {
            kind: RangeEntryKind::Relation { table, kind },
            column_names: Vec::new(),
            inherit: false,
            selected_cols: ColumnSet::new(),
            inserted_cols: ColumnSet::new(),
            updated_cols: ColumnSet::new(),
        }
    }

    pub fn subquery(query: QueryFragment) -> Self {
        Self {
            kind: RangeEntryKind::Subquery { query },
            column_names: Vec::new(),
            inherit: false,
            selected_cols: ColumnSet::new(),
            inserted_cols: ColumnSet::new(),
            updated_cols: ColumnSet::new(),
        }
    }

    pub fn with_names(mut self, names: &[&str]) -> Self {
        self.column_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_inherit(mut self) -> Self {
        self.inherit = true;
        self
    }
}

/// Parent/child column-translation record for one append-relation member.
///
/// `column_map[i]` is the child expression standing in for the parent's
/// `(i+1)`-th column, or `None` exactly when that parent column is dropped.
/// The map's length always equals the parent's declared column count.
/// Created once during expansion and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendRelInfo {
    pub parent_rel: RelId,
    pub child_rel: RelId,
    pub parent_row_type: Option<RowTypeId>,
    pub child_row_type: Option<RowTypeId>,
    /// Catalog identity of the parent relation, for diagnostics.
    pub parent_table: TableId,
    pub column_map: Vec<Option<ScalarExpr>>,
}

/// Metadata enabling runtime pruning of a partitioned hierarchy's members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicScanDescriptor {
    /// Root of the partitioned hierarchy.
    pub root: TableId,
    /// Range-table reference the expansion started from.
    pub reference: RelId,
    /// Range-table ids of the surviving member relations.
    pub leaf_rels: RelIdSet,
    /// 1-based positions of the partition key columns.
    pub partition_key_positions: Vec<u32>,
    /// Statement-wide identity, assigned sequentially.
    pub scan_id: u32,
}

/// A registered subplan: the planned fragment plus its private planning
/// context. Duplicated wholesale when two references to it must diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubplanEntry {
    pub plan: QueryFragment,
    pub config: PlannerConfig,
}

/// Per-statement planning state.
#[derive(Debug, Default)]
pub struct PlannerContext {
    /// Range table; entries are addressed 1-based by [`RelId`].
    pub range_table: Vec<RangeTableEntry>,
    /// Append-relation records, written only by the expander.
    pub append_rel_list: Vec<Arc<AppendRelInfo>>,
    pub row_marks: Vec<RowMark>,
    pub dynamic_scans: Vec<DynamicScanDescriptor>,
    pub subplans: Vec<SubplanEntry>,
    /// Mutation target of the statement, if any.
    pub result_relation: Option<RelId>,
    /// Fraction of the output the caller intends to fetch; >= 1.0 is an
    /// absolute row count, 0.0 means all rows.
    pub tuple_fraction: f64,
    /// Whether the statement is a self-referential recursive union.
    pub has_recursion: bool,
    /// The planned non-recursive arm, visible while the recursive arm is
    /// being planned so its feedback scan can match distributions.
    pub non_recursive_plan: Option<PhysicalPlan>,
    pub config: PlannerConfig,
}

impl PlannerContext {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Append a range-table entry, returning its id.
    pub fn push_entry(&mut self, entry: RangeTableEntry) -> RelId {
        self.range_table.push(entry);
        RelId(self.range_table.len() as u32)
    }

    pub fn entry(&self, rel: RelId) -> &RangeTableEntry {
        &self.range_table[rel.0 as usize - 1]
    }

    pub fn entry_mut(&mut self, rel: RelId) -> &mut RangeTableEntry {
        &mut self.range_table[rel.0 as usize - 1]
    }

    /// The leaf subquery behind a range-table entry, if it is one.
    pub fn subquery(&self, rel: RelId) -> Option<&QueryFragment> {
        match &self.entry(rel).kind {
            RangeEntryKind::Subquery { query } => Some(query),
            RangeEntryKind::Relation { .. } => None,
        }
    }

    /// Find the append-relation record whose child is `child`.
    pub fn append_rel_info_for_child(&self, child: RelId) -> Option<&Arc<AppendRelInfo>> {
        self.append_rel_list.iter().find(|a| a.child_rel == child)
    }

    /// All append-relation records expanded from `parent`.
    pub fn append_rel_infos_for_parent(
        &self,
        parent: RelId,
    ) -> impl Iterator<Item = &Arc<AppendRelInfo>> {
        self.append_rel_list
            .iter()
            .filter(move |a| a.parent_rel == parent)
    }

    pub fn row_mark_index(&self, rel: RelId) -> Option<usize> {
        self.row_marks.iter().position(|m| m.rel == rel)
    }

    /// Register a subplan, returning its id.
    pub fn add_subplan(&mut self, entry: SubplanEntry) -> SubplanId {
        self.subplans.push(entry);
        SubplanId(self.subplans.len() as u32 - 1)
    }

    /// Duplicate a registered subplan (plan and private context), returning
    /// the duplicate's fresh id so a translated reference can diverge from
    /// the original.
    pub fn duplicate_subplan(&mut self, id: SubplanId) -> SubplanId {
        let copy = self.subplans[id.0 as usize].clone();
        self.subplans.push(copy);
        SubplanId(self.subplans.len() as u32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryFragment;

    #[test]
    fn range_table_is_one_based() {
        let mut ctx = PlannerContext::default();
        let r1 = ctx.push_entry(RangeTableEntry::subquery(QueryFragment::select()));
        let r2 = ctx.push_entry(RangeTableEntry::subquery(QueryFragment::select()));
        assert_eq!(r1, RelId(1));
        assert_eq!(r2, RelId(2));
        assert!(ctx.subquery(r1).is_some());
    }

    #[test]
    fn duplicate_subplan_gets_fresh_identity() {
        let mut ctx = PlannerContext::default();
        let id = ctx.add_subplan(SubplanEntry {
            plan: QueryFragment::select(),
            config: PlannerConfig::default(),
        });
        let copy = ctx.duplicate_subplan(id);
        assert_ne!(id, copy);
        assert_eq!(ctx.subplans.len(), 2);
    }
}
