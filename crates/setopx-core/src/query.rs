//! # Query Fragments and Set-Operation Trees
//!
//! The statement representations this core consumes: the set-operation tree
//! handed to the plan builder, the query fragments the attribute rewriter
//! restates for append-relation children, and the filter clauses whose
//! derived caches must be invalidated on translation.
//!
//! ## Filter-clause caches
//!
//! A [`FilterClause`] carries derived fields (evaluation cost, selectivity,
//! hash bucket sizes) that are expensive to compute and depend on which
//! relation the clause applies to. They live in an explicit
//! `Option<ClauseCache>`: `None` means "needs recomputation", which the
//! rewriter forces by clearing the field when a clause is translated to a
//! child relation. Equivalence-class membership survives translation -- a
//! child column is implicitly equivalent to its parent -- but the per-side
//! member ids do not.

use crate::cost::Cost;
use crate::expr::ScalarExpr;
use crate::relids::RelIdSet;
use crate::schema::TargetEntry;
use crate::types::{Collation, ColumnType, EquivClassId, EquivMemberId, RelId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Set-operation operator of a combine node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

impl SetOpKind {
    /// Display name for error messages.
    pub fn construct_name(&self) -> &'static str {
        match self {
            SetOpKind::Union => "UNION",
            SetOpKind::Intersect => "INTERSECT",
            SetOpKind::Except => "EXCEPT",
        }
    }
}

/// Per-column comparison capabilities and grouping identity for a set
/// operation, as determined during statement analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOpGroupClause {
    /// Whether the column's equality operator has a compatible sort operator.
    pub sortable: bool,
    /// Whether the column's equality operator has a compatible hash function.
    pub hashable: bool,
    /// Grouping reference tying the clause to an output column. Zero until
    /// the plan builder installs the reference from the generated schema.
    pub group_ref: u32,
}

impl SetOpGroupClause {
    pub fn sortable_hashable() -> Self {
        Self {
            sortable: true,
            hashable: true,
            group_ref: 0,
        }
    }

    pub fn sortable_only() -> Self {
        Self {
            sortable: true,
            hashable: false,
            group_ref: 0,
        }
    }

    pub fn hashable_only() -> Self {
        Self {
            sortable: false,
            hashable: true,
            group_ref: 0,
        }
    }
}

/// A node of the set-operation tree. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetOpNode {
    /// Reference to a range-table entry holding a leaf subquery.
    Leaf { rel: RelId },
    /// Combination of two subtrees under a set operation.
    Combine {
        kind: SetOpKind,
        /// ALL semantics: keep duplicates.
        all: bool,
        left: Box<SetOpNode>,
        right: Box<SetOpNode>,
        /// Declared result column types.
        col_types: Vec<ColumnType>,
        /// Declared result column collations.
        col_collations: Vec<Option<Collation>>,
        /// Per-column comparison capabilities, aligned with `col_types`.
        grouping: Vec<SetOpGroupClause>,
    },
}

impl SetOpNode {
    /// The leftmost leaf of the tree; its query supplies the display names
    /// for every schema generated while planning the tree.
    pub fn leftmost_leaf(&self) -> RelId {
        match self {
            SetOpNode::Leaf { rel } => *rel,
            SetOpNode::Combine { left, .. } => left.leftmost_leaf(),
        }
    }
}

/// SQL join types, as they appear in join-tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

/// One item of a query fragment's join tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromItem {
    /// Leaf slot referencing a range-table entry.
    Relation(RelId),
    /// Join node. `rel` is the join's own range-table identity, when it has
    /// one (outer joins that can be referenced by alias).
    Join {
        kind: JoinType,
        left: Box<FromItem>,
        right: Box<FromItem>,
        on: Option<ScalarExpr>,
        rel: Option<RelId>,
    },
}

/// Statement kind of a query fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Select,
    Update,
    Delete,
}

/// The minimal query representation consumed by this core: enough structure
/// for the attribute rewriter to restate a fragment against an
/// append-relation child, and for the leaf group-count estimate to know
/// whether the query already deduplicates its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFragment {
    pub command: CommandKind,
    /// Mutation target for UPDATE/DELETE fragments.
    pub result_relation: Option<RelId>,
    pub target_list: Vec<TargetEntry>,
    pub quals: Option<ScalarExpr>,
    pub from: Vec<FromItem>,
    /// Set-operation tree, when this fragment is a set-operation statement.
    pub set_operations: Option<SetOpNode>,
    pub has_aggregates: bool,
    pub has_grouping: bool,
    pub has_distinct: bool,
}

impl QueryFragment {
    pub fn select() -> Self {
        Self {
            command: CommandKind::Select,
            result_relation: None,
            target_list: Vec::new(),
            quals: None,
            from: Vec::new(),
            set_operations: None,
            has_aggregates: false,
            has_grouping: false,
            has_distinct: false,
        }
    }

    /// Whether the query's own evaluation already groups or deduplicates,
    /// making its row estimate a usable distinct-group estimate.
    pub fn output_mostly_unique(&self) -> bool {
        self.has_grouping || self.has_aggregates || self.has_distinct
    }
}

/// Derived fields of a filter clause, recomputed per relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseCache {
    pub eval_cost: Cost,
    pub selectivity: f64,
    pub outer_selectivity: f64,
    pub left_bucket_size: f64,
    pub right_bucket_size: f64,
}

/// A filter clause with its applicability metadata, as tracked by the join
/// planner. Relid sets are shared (`Arc`) between the parent's clause and
/// translated child copies until a translation actually changes them.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub clause: ScalarExpr,
    pub clause_rels: Arc<RelIdSet>,
    pub required_rels: Arc<RelIdSet>,
    pub outer_rels: Arc<RelIdSet>,
    pub nullable_rels: Arc<RelIdSet>,
    pub left_rels: Arc<RelIdSet>,
    pub right_rels: Arc<RelIdSet>,
    /// Derived cost/selectivity fields; `None` means "needs recomputation".
    pub cache: Option<ClauseCache>,
    /// Equivalence class of the left side, if any. Survives translation.
    pub left_ec: Option<EquivClassId>,
    pub right_ec: Option<EquivClassId>,
    /// Specific member ids within the classes. Cleared on translation.
    pub left_member: Option<EquivMemberId>,
    pub right_member: Option<EquivMemberId>,
}

impl FilterClause {
    pub fn new(clause: ScalarExpr, clause_rels: RelIdSet) -> Self {
        let rels = Arc::new(clause_rels);
        Self {
            clause,
            clause_rels: Arc::clone(&rels),
            required_rels: rels,
            outer_rels: Arc::new(RelIdSet::new()),
            nullable_rels: Arc::new(RelIdSet::new()),
            left_rels: Arc::new(RelIdSet::new()),
            right_rels: Arc::new(RelIdSet::new()),
            cache: None,
            left_ec: None,
            right_ec: None,
            left_member: None,
            right_member: None,
        }
    }
}

/// Strength of a row-locking clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStrength {
    KeyShare,
    Share,
    NoKeyUpdate,
    Update,
}

/// Row-locking mechanism chosen for one relation. The mechanism depends on
/// what kind of relation is being marked, so children of an append relation
/// may use a different kind than their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowMarkKind {
    /// Lock the row exclusively.
    Exclusive,
    /// Lock the row exclusively except against key updates.
    NoKeyExclusive,
    /// Shared row lock.
    Shared,
    /// Shared row lock on key columns only.
    KeyShared,
    /// No row lock possible; re-fetch by reference at execution.
    Reference,
    /// No row lock possible; carry a full row copy.
    Copy,
}

/// Behavior when a row lock cannot be acquired immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockWaitPolicy {
    Block,
    Skip,
    Error,
}

/// A row-locking requirement attached to one range-table relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMark {
    pub rel: RelId,
    /// The relation this mark was derived from; equal to `rel` for
    /// non-inherited marks.
    pub parent_rel: RelId,
    /// Statement-wide identity shared by a parent mark and its children.
    pub mark_id: u32,
    pub kind: RowMarkKind,
    /// Bitmask of every mark kind used across this mark's children.
    pub all_kinds: u32,
    pub strength: LockStrength,
    pub wait_policy: LockWaitPolicy,
    pub is_parent: bool,
    /// Whether the statement qualifies for the weaker row-level lock under
    /// the global deadlock-avoidance mode (single-relation statements only).
    pub single_rel_optimizable: bool,
}

impl RowMark {
    pub fn kind_bit(kind: RowMarkKind) -> u32 {
        1 << kind as u32
    }
}
