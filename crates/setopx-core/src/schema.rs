//! # Output Schemas
//!
//! An [`OutputSchema`] is the ordered list of columns a plan node produces.
//! Real columns carry a grouping reference equal to their 1-based position;
//! auxiliary columns (the provenance flag, bookkeeping entries) carry 0. This
//! is an invariant checked throughout the set-operation builder, not merely a
//! convention: duplicate-elimination group lists are built by reading the
//! grouping references back off the schema.

use crate::expr::ScalarExpr;
use crate::types::{Collation, ColumnType};
use serde::{Deserialize, Serialize};

/// One output column of a plan node or one entry of a query's target list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEntry {
    pub expr: ScalarExpr,
    /// 1-based output position.
    pub position: u32,
    pub name: String,
    /// Auxiliary (provenance/bookkeeping) columns do not participate in the
    /// relation's visible output.
    pub auxiliary: bool,
    /// 0 for auxiliary columns, else equal to `position`.
    pub grouping_ref: u32,
}

impl TargetEntry {
    pub fn real(expr: ScalarExpr, position: u32, name: impl Into<String>) -> Self {
        Self {
            expr,
            position,
            name: name.into(),
            auxiliary: false,
            grouping_ref: position,
        }
    }

    pub fn auxiliary(expr: ScalarExpr, position: u32, name: impl Into<String>) -> Self {
        Self {
            expr,
            position,
            name: name.into(),
            auxiliary: true,
            grouping_ref: 0,
        }
    }
}

/// Ordered output schema of a plan node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub columns: Vec<TargetEntry>,
}

impl OutputSchema {
    pub fn new(columns: Vec<TargetEntry>) -> Self {
        let schema = Self { columns };
        debug_assert!(schema.grouping_refs_consistent());
        schema
    }

    /// Check the grouping-reference invariant: real columns have
    /// `grouping_ref == position`, auxiliary columns have 0.
    pub fn grouping_refs_consistent(&self) -> bool {
        self.columns.iter().all(|c| {
            if c.auxiliary {
                c.grouping_ref == 0
            } else {
                c.grouping_ref == c.position
            }
        })
    }

    pub fn real_columns(&self) -> impl Iterator<Item = &TargetEntry> {
        self.columns.iter().filter(|c| !c.auxiliary)
    }

    pub fn real_count(&self) -> usize {
        self.real_columns().count()
    }

    pub fn has_auxiliary(&self) -> bool {
        self.columns.iter().any(|c| c.auxiliary)
    }

    /// Declared types of the real columns, in order.
    pub fn column_types(&self) -> Vec<ColumnType> {
        self.real_columns().map(|c| c.expr.column_type()).collect()
    }

    /// Exposed collations of the real columns, in order.
    pub fn collations(&self) -> Vec<Option<Collation>> {
        self.real_columns().map(|c| c.expr.collation()).collect()
    }

    /// Whether the real columns' type ids match `want` exactly. When
    /// `junk_ok` is false, the presence of any auxiliary column also counts
    /// as a mismatch, since the caller cannot tolerate extra output.
    pub fn same_types(&self, want: &[ColumnType], junk_ok: bool) -> bool {
        if !junk_ok && self.has_auxiliary() {
            return false;
        }
        let mine: Vec<_> = self.real_columns().map(|c| c.expr.column_type().id).collect();
        mine.len() == want.len() && mine.iter().zip(want).all(|(a, b)| *a == b.id)
    }

    /// Whether the real columns' collations match `want` exactly, with the
    /// same `junk_ok` treatment as [`Self::same_types`].
    pub fn same_collations(&self, want: &[Option<Collation>], junk_ok: bool) -> bool {
        if !junk_ok && self.has_auxiliary() {
            return false;
        }
        let mine = self.collations();
        mine.len() == want.len() && mine.iter().zip(want).all(|(a, b)| a == b)
    }

    /// Estimated output row width in bytes, for memory budgeting.
    pub fn estimated_width(&self) -> f64 {
        self.columns
            .iter()
            .map(|c| c.expr.column_type().id.byte_width())
            .sum()
    }

    /// Grouping references of the real columns, used to build group lists for
    /// duplicate elimination.
    pub fn grouping_positions(&self) -> Vec<u32> {
        self.real_columns().map(|c| c.grouping_ref).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ScalarExpr;
    use crate::types::{RelId, TypeId};

    fn int_col(position: u32) -> TargetEntry {
        TargetEntry::real(
            ScalarExpr::column(RelId(1), position, ColumnType::new(TypeId::Int32), None),
            position,
            format!("c{position}"),
        )
    }

    #[test]
    fn grouping_invariant_holds_for_builders() {
        let schema = OutputSchema::new(vec![
            int_col(1),
            int_col(2),
            TargetEntry::auxiliary(ScalarExpr::int_literal(0), 3, "flag"),
        ]);
        assert!(schema.grouping_refs_consistent());
        assert_eq!(schema.real_count(), 2);
        assert_eq!(schema.grouping_positions(), vec![1, 2]);
    }

    #[test]
    fn junk_disallowed_fails_type_match() {
        let schema = OutputSchema::new(vec![
            int_col(1),
            TargetEntry::auxiliary(ScalarExpr::int_literal(0), 2, "flag"),
        ]);
        let want = vec![ColumnType::new(TypeId::Int32)];
        assert!(schema.same_types(&want, true));
        assert!(!schema.same_types(&want, false));
    }
}
