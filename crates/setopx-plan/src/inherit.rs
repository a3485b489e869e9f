//! # Append-Relation Expander
//!
//! Expands each range-table reference that denotes "this table and all its
//! descendants" into an explicit append relation: one member record per live
//! descendant (the table itself included), each carrying the parent-to-child
//! column translation built by [`crate::translate`].
//!
//! The original reference keeps representing the whole set; the first member
//! is the same table in its role as a plain member. A childless table is
//! never an inheritance set, so a reference that turns out to have fewer
//! than two members -- including the race where descendants existed at
//! check time but are gone at enumeration time -- is quietly reverted to an
//! ordinary unexpanded reference.
//!
//! ## Locking
//!
//! Each member is locked while it is enumerated, before any of its metadata
//! is read. The lock strength depends on how the statement uses the parent:
//! mutation target takes a write lock; an explicit row-locking clause takes
//! a strong lock, relaxed to a weaker row-level lock when the global
//! deadlock-avoidance mode is active and the statement touches only this
//! one relation; plain reads take a read lock.

use crate::translate::build_column_map;
use setopx_core::catalog::{Catalog, LockMode, RelationKind};
use setopx_core::context::{
    AppendRelInfo, DynamicScanDescriptor, PlannerContext, RangeEntryKind,
};
use setopx_core::error::PlanResult;
use setopx_core::expr::ScalarExpr;
use setopx_core::query::{LockStrength, RowMark, RowMarkKind};
use setopx_core::relids::{ColumnSet, RelIdSet};
use setopx_core::types::RelId;
use std::sync::Arc;
use tracing::{debug, trace};

/// Expand every inheritance-requesting range-table entry of the statement.
///
/// Expansion appends child entries to the range table; those children can
/// never themselves request inheritance, so only the original entries are
/// scanned.
pub fn expand_append_relations(
    ctx: &mut PlannerContext,
    catalog: &dyn Catalog,
) -> PlanResult<()> {
    let original_len = ctx.range_table.len();
    for idx in 0..original_len {
        expand_entry(ctx, catalog, RelId(idx as u32 + 1))?;
    }
    Ok(())
}

/// Expand one range-table reference, mutating statement-wide state.
///
/// No-ops unless the reference requests inheritance expansion and denotes a
/// stored relation with at least one live descendant.
pub fn expand_entry(
    ctx: &mut PlannerContext,
    catalog: &dyn Catalog,
    rti: RelId,
) -> PlanResult<()> {
    if !ctx.entry(rti).inherit {
        return Ok(());
    }
    let parent_table = match &ctx.entry(rti).kind {
        RangeEntryKind::Relation { table, .. } => *table,
        // An already-flattened UNION ALL reference; nothing to expand here.
        RangeEntryKind::Subquery { .. } => return Ok(()),
    };

    // Fast reject for the common childless case.
    if !catalog.has_descendants(parent_table) {
        ctx.entry_mut(rti).inherit = false;
        return Ok(());
    }

    let mark_idx = ctx.row_mark_index(rti);
    let lockmode = if ctx.result_relation == Some(rti) {
        LockMode::RowExclusive
    } else if let Some(i) = mark_idx {
        // A row-locking clause normally needs a strong table lock on each
        // member, because the row-level protocol cannot reach rows behind a
        // redistribution. When the global deadlock-avoidance mode is active
        // and the statement touches only this one relation, the row-level
        // lock is safe.
        if ctx.config.deadlock_avoidance_mode && ctx.row_marks[i].single_rel_optimizable {
            LockMode::RowShare
        } else {
            LockMode::Exclusive
        }
    } else {
        LockMode::AccessShare
    };

    let members = catalog.list_descendants(parent_table, lockmode);
    // A table that lost its children between the check above and the
    // enumeration is treated as childless, not as an error.
    if members.len() < 2 {
        ctx.entry_mut(rti).inherit = false;
        return Ok(());
    }

    if let Some(i) = mark_idx {
        ctx.row_marks[i].is_parent = true;
    }

    let Some(parent_layout) = catalog.column_layout(parent_table) else {
        ctx.entry_mut(rti).inherit = false;
        return Ok(());
    };
    let parent_row_type = catalog.row_type(parent_table);
    let partitioned = catalog.is_partitioned(parent_table);
    let parent_entry = ctx.entry(rti).clone();

    let mut appinfos: Vec<AppendRelInfo> = Vec::new();
    let mut child_rels = RelIdSet::new();

    for child_table in members {
        let is_parent_member = child_table == parent_table;

        // Descendants that are session-private temporaries of other sessions
        // cannot be accessed safely; silently ignore them.
        if !is_parent_member && catalog.is_other_session_temp(child_table) {
            trace!("skipping other-session temporary {:?}", child_table);
            continue;
        }
        // In a partitioned hierarchy only the root and the true leaf storage
        // units are exposed; intermediate levels have no storage of their own.
        if partitioned && !is_parent_member && !catalog.is_leaf_partition(child_table) {
            trace!("skipping intermediate partition level {:?}", child_table);
            continue;
        }
        // A member vanishing after enumeration is an expected race.
        let child_layout = if is_parent_member {
            parent_layout.clone()
        } else {
            match catalog.column_layout(child_table) {
                Some(layout) => layout,
                None => continue,
            }
        };

        let child_rel = RelId(ctx.range_table.len() as u32 + 1);
        let column_map =
            build_column_map(&parent_layout, &child_layout, child_rel, is_parent_member)?;

        let mut child_entry = parent_entry.clone();
        child_entry.kind = RangeEntryKind::Relation {
            table: child_table,
            kind: catalog.relation_kind(child_table),
        };
        child_entry.inherit = false;
        if !is_parent_member {
            child_entry.selected_cols =
                translate_col_privs(&parent_entry.selected_cols, &column_map);
            child_entry.inserted_cols =
                translate_col_privs(&parent_entry.inserted_cols, &column_map);
            child_entry.updated_cols =
                translate_col_privs(&parent_entry.updated_cols, &column_map);
        }
        let pushed = ctx.push_entry(child_entry);
        debug_assert_eq!(pushed, child_rel);
        child_rels.insert(child_rel);

        appinfos.push(AppendRelInfo {
            parent_rel: rti,
            child_rel,
            parent_row_type,
            child_row_type: catalog.row_type(child_table),
            parent_table,
            column_map,
        });

        // Derive a child-specific row-locking directive; the mechanism may
        // differ per descendant kind.
        if let Some(i) = mark_idx {
            let parent_mark = ctx.row_marks[i].clone();
            let kind = select_rowmark_kind(
                catalog.relation_kind(child_table),
                parent_mark.strength,
            );
            ctx.row_marks[i].all_kinds |= RowMark::kind_bit(kind);
            ctx.row_marks.push(RowMark {
                rel: child_rel,
                parent_rel: rti,
                mark_id: parent_mark.mark_id,
                kind,
                all_kinds: RowMark::kind_bit(kind),
                strength: parent_mark.strength,
                wait_policy: parent_mark.wait_policy,
                is_parent: false,
                single_rel_optimizable: parent_mark.single_rel_optimizable,
            });
        }
    }

    // Every member may have been filtered out (all temporaries, all
    // vanished); pretend there was no inheritance after all.
    if appinfos.is_empty() {
        ctx.entry_mut(rti).inherit = false;
        return Ok(());
    }

    if partitioned {
        let scan_id = ctx.dynamic_scans.len() as u32 + 1;
        ctx.dynamic_scans.push(DynamicScanDescriptor {
            root: parent_table,
            reference: rti,
            leaf_rels: child_rels,
            partition_key_positions: catalog.partition_key_positions(parent_table),
            scan_id,
        });
    }

    debug!(
        "expanded relation {} into {} append members",
        rti,
        appinfos.len()
    );
    ctx.append_rel_list
        .extend(appinfos.into_iter().map(Arc::new));
    Ok(())
}

/// Translate a parent's per-column permission set to the child's numbering.
///
/// A whole-row permission does not become a child whole-row permission --
/// that would require permissions on columns the query never inherited.
/// Instead the per-column bits are set for every non-dropped translated
/// column.
pub fn translate_col_privs(
    parent_privs: &ColumnSet,
    column_map: &[Option<ScalarExpr>],
) -> ColumnSet {
    let whole_row = parent_privs.contains_whole_row();
    let mut child_privs = ColumnSet::new();
    for (idx, slot) in column_map.iter().enumerate() {
        let Some(translated) = slot else {
            continue;
        };
        if whole_row || parent_privs.contains(idx as u32 + 1) {
            if let Some(var) = translated.as_column() {
                child_privs.insert(var.ordinal);
            }
        }
    }
    child_privs
}

/// Pick the row-locking mechanism for one relation kind. Plain tables can
/// take real row locks; foreign tables carry a row copy; everything else is
/// re-fetched by reference at execution.
pub fn select_rowmark_kind(kind: RelationKind, strength: LockStrength) -> RowMarkKind {
    match kind {
        RelationKind::Table => match strength {
            LockStrength::Update => RowMarkKind::Exclusive,
            LockStrength::NoKeyUpdate => RowMarkKind::NoKeyExclusive,
            LockStrength::Share => RowMarkKind::Shared,
            LockStrength::KeyShare => RowMarkKind::KeyShared,
        },
        RelationKind::ForeignTable => RowMarkKind::Copy,
        RelationKind::View => RowMarkKind::Reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setopx_core::types::{ColumnType, TypeId};

    #[test]
    fn whole_row_permission_becomes_per_column() {
        let map = vec![
            Some(ScalarExpr::column(
                RelId(2),
                3,
                ColumnType::new(TypeId::Int32),
                None,
            )),
            None,
            Some(ScalarExpr::column(
                RelId(2),
                1,
                ColumnType::new(TypeId::Bool),
                None,
            )),
        ];
        let mut parent = ColumnSet::new();
        parent.insert_whole_row();
        let child = translate_col_privs(&parent, &map);
        assert!(!child.contains_whole_row());
        assert!(child.contains(3));
        assert!(child.contains(1));
        assert!(!child.contains(2));
    }

    #[test]
    fn single_column_permission_follows_translation() {
        let map = vec![
            Some(ScalarExpr::column(
                RelId(2),
                2,
                ColumnType::new(TypeId::Int32),
                None,
            )),
            Some(ScalarExpr::column(
                RelId(2),
                1,
                ColumnType::new(TypeId::Int32),
                None,
            )),
        ];
        let parent = ColumnSet::from_iter([1]);
        let child = translate_col_privs(&parent, &map);
        assert!(child.contains(2));
        assert!(!child.contains(1));
    }

    #[test]
    fn rowmark_kind_depends_on_relation_kind() {
        assert_eq!(
            select_rowmark_kind(RelationKind::Table, LockStrength::Update),
            RowMarkKind::Exclusive
        );
        assert_eq!(
            select_rowmark_kind(RelationKind::Table, LockStrength::KeyShare),
            RowMarkKind::KeyShared
        );
        assert_eq!(
            select_rowmark_kind(RelationKind::ForeignTable, LockStrength::Update),
            RowMarkKind::Copy
        );
        assert_eq!(
            select_rowmark_kind(RelationKind::View, LockStrength::Share),
            RowMarkKind::Reference
        );
    }
}
