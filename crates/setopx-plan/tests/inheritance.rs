//! End-to-end append-relation expansion tests.
//!
//! These tests register inheritance hierarchies in an in-memory catalog,
//! run the expander, and verify the statement-wide state it produces: the
//! member entries appended to the range table, the append-relation records
//! and their column maps, lock modes, permission translation, derived row
//! marks, and dynamic scan descriptors for partitioned hierarchies.

use setopx_core::catalog::{ColumnMeta, InMemoryCatalog, LockMode, RelationKind, TableDef};
use setopx_core::context::{PlannerContext, RangeEntryKind, RangeTableEntry};
use setopx_core::error::PlanError;
use setopx_core::query::{LockStrength, LockWaitPolicy, RowMark, RowMarkKind};
use setopx_core::relids::ColumnSet;
use setopx_core::types::{ColumnType, RelId, RowTypeId, TableId, TypeId};
use setopx_plan::inherit::expand_append_relations;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PARENT: TableId = TableId(10);
const CHILD1: TableId = TableId(11);
const CHILD2: TableId = TableId(12);

fn two_cols() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("a", ColumnType::new(TypeId::Int32)),
        ColumnMeta::new("b", ColumnType::new(TypeId::Text)),
    ]
}

fn plain_table(columns: Vec<ColumnMeta>, descendants: Vec<TableId>) -> TableDef {
    TableDef {
        columns,
        descendants,
        ..Default::default()
    }
}

/// A parent with two same-layout children, referenced by range entry 1.
fn family() -> (PlannerContext, InMemoryCatalog) {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(PARENT, plain_table(two_cols(), vec![CHILD1, CHILD2]));
    catalog.add_table(CHILD1, plain_table(two_cols(), vec![]));
    catalog.add_table(CHILD2, plain_table(two_cols(), vec![]));

    let mut ctx = PlannerContext::default();
    ctx.push_entry(
        RangeTableEntry::relation(PARENT, RelationKind::Table)
            .with_names(&["a", "b"])
            .with_inherit(),
    );
    (ctx, catalog)
}

fn member_tables(ctx: &PlannerContext) -> Vec<TableId> {
    ctx.append_rel_list
        .iter()
        .map(|a| match &ctx.entry(a.child_rel).kind {
            RangeEntryKind::Relation { table, .. } => *table,
            other => panic!("child entry is not a relation: {other:?}"),
        })
        .collect()
}

// ===========================================================================
// Basic expansion
// ===========================================================================

#[test]
fn expansion_adds_one_member_per_descendant() {
    let (mut ctx, catalog) = family();
    expand_append_relations(&mut ctx, &catalog).unwrap();

    // Three members: the parent in its role as a plain member, plus both
    // children. The original entry still represents the whole set.
    assert_eq!(ctx.range_table.len(), 4);
    assert_eq!(ctx.append_rel_list.len(), 3);
    assert!(ctx.entry(RelId(1)).inherit);
    assert_eq!(member_tables(&ctx), vec![PARENT, CHILD1, CHILD2]);

    // The parent-as-member record is an identity map.
    let first = &ctx.append_rel_list[0];
    assert_eq!(first.parent_rel, RelId(1));
    assert_eq!(first.child_rel, RelId(2));
    assert_eq!(first.column_map.len(), 2);
    let ords: Vec<u32> = first
        .column_map
        .iter()
        .map(|m| m.as_ref().unwrap().as_column().unwrap().ordinal)
        .collect();
    assert_eq!(ords, vec![1, 2]);

    // Child entries never re-request expansion.
    for rel in 2..=4 {
        assert!(!ctx.entry(RelId(rel)).inherit);
    }
}

#[test]
fn childless_table_reverts_to_plain_reference() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(PARENT, plain_table(two_cols(), vec![]));
    let mut ctx = PlannerContext::default();
    ctx.push_entry(
        RangeTableEntry::relation(PARENT, RelationKind::Table)
            .with_names(&["a", "b"])
            .with_inherit(),
    );

    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(!ctx.entry(RelId(1)).inherit);
    assert!(ctx.append_rel_list.is_empty());
    assert_eq!(ctx.range_table.len(), 1);
}

#[test]
fn vanished_descendants_are_a_normal_outcome() {
    // The descendant existed at check time but is gone at enumeration time.
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(PARENT, plain_table(two_cols(), vec![TableId(99)]));
    let mut ctx = PlannerContext::default();
    ctx.push_entry(
        RangeTableEntry::relation(PARENT, RelationKind::Table)
            .with_names(&["a", "b"])
            .with_inherit(),
    );

    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(!ctx.entry(RelId(1)).inherit);
    assert!(ctx.append_rel_list.is_empty());
}

#[test]
fn other_session_temporaries_are_skipped() {
    let (mut ctx, mut catalog) = family();
    catalog.add_table(
        CHILD2,
        TableDef {
            columns: two_cols(),
            other_session_temp: true,
            ..Default::default()
        },
    );

    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert_eq!(member_tables(&ctx), vec![PARENT, CHILD1]);
}

#[test]
fn subquery_reference_is_left_alone() {
    let mut ctx = PlannerContext::default();
    let mut entry =
        RangeTableEntry::subquery(setopx_core::query::QueryFragment::select());
    entry.inherit = true;
    ctx.push_entry(entry);
    let catalog = InMemoryCatalog::new();

    expand_append_relations(&mut ctx, &catalog).unwrap();
    // An already-flattened reference keeps its flag and gains no members.
    assert!(ctx.entry(RelId(1)).inherit);
    assert!(ctx.append_rel_list.is_empty());
}

#[test]
fn divergent_child_schema_aborts_planning() {
    let (mut ctx, mut catalog) = family();
    catalog.add_table(
        CHILD1,
        plain_table(
            vec![
                ColumnMeta::new("a", ColumnType::new(TypeId::Int64)),
                ColumnMeta::new("b", ColumnType::new(TypeId::Text)),
            ],
            vec![],
        ),
    );

    let err = expand_append_relations(&mut ctx, &catalog).unwrap_err();
    assert!(matches!(err, PlanError::SchemaMismatch(_)));
}

// ===========================================================================
// Locking
// ===========================================================================

fn parent_mark(single_rel_optimizable: bool) -> RowMark {
    RowMark {
        rel: RelId(1),
        parent_rel: RelId(1),
        mark_id: 1,
        kind: RowMarkKind::Shared,
        all_kinds: RowMark::kind_bit(RowMarkKind::Shared),
        strength: LockStrength::Share,
        wait_policy: LockWaitPolicy::Block,
        is_parent: false,
        single_rel_optimizable,
    }
}

#[test]
fn plain_read_takes_access_share() {
    let (mut ctx, catalog) = family();
    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(catalog
        .acquired_locks()
        .iter()
        .all(|(_, mode)| *mode == LockMode::AccessShare));
    assert_eq!(catalog.acquired_locks().len(), 3);
}

#[test]
fn mutation_target_takes_row_exclusive() {
    let (mut ctx, catalog) = family();
    ctx.result_relation = Some(RelId(1));
    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(catalog
        .acquired_locks()
        .iter()
        .all(|(_, mode)| *mode == LockMode::RowExclusive));
}

#[test]
fn row_locking_clause_takes_exclusive() {
    let (mut ctx, catalog) = family();
    ctx.row_marks.push(parent_mark(false));
    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(catalog
        .acquired_locks()
        .iter()
        .all(|(_, mode)| *mode == LockMode::Exclusive));
}

#[test]
fn deadlock_avoidance_mode_relaxes_to_row_share() {
    let (mut ctx, catalog) = family();
    ctx.config.deadlock_avoidance_mode = true;
    ctx.row_marks.push(parent_mark(true));
    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(catalog
        .acquired_locks()
        .iter()
        .all(|(_, mode)| *mode == LockMode::RowShare));
}

#[test]
fn optimizable_mark_without_mode_stays_exclusive() {
    let (mut ctx, catalog) = family();
    ctx.row_marks.push(parent_mark(true));
    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(catalog
        .acquired_locks()
        .iter()
        .all(|(_, mode)| *mode == LockMode::Exclusive));
}

// ===========================================================================
// Row marks
// ===========================================================================

#[test]
fn children_get_derived_row_marks() {
    let (mut ctx, mut catalog) = family();
    catalog.add_table(
        CHILD2,
        TableDef {
            columns: two_cols(),
            kind: Some(RelationKind::ForeignTable),
            ..Default::default()
        },
    );
    ctx.row_marks.push(parent_mark(false));

    expand_append_relations(&mut ctx, &catalog).unwrap();

    // One mark per member plus the parent's.
    assert_eq!(ctx.row_marks.len(), 4);
    let parent = &ctx.row_marks[0];
    assert!(parent.is_parent);
    // The parent accumulates every member mechanism, including the foreign
    // child's row-copy mark.
    assert_ne!(parent.all_kinds & RowMark::kind_bit(RowMarkKind::Shared), 0);
    assert_ne!(parent.all_kinds & RowMark::kind_bit(RowMarkKind::Copy), 0);

    let child_marks: Vec<&RowMark> = ctx.row_marks[1..].iter().collect();
    for mark in &child_marks {
        assert_eq!(mark.parent_rel, RelId(1));
        assert_eq!(mark.mark_id, 1);
        assert!(!mark.is_parent);
    }
    // Mechanism is re-derived per member kind.
    assert_eq!(child_marks[0].kind, RowMarkKind::Shared);
    assert_eq!(child_marks[1].kind, RowMarkKind::Shared);
    assert_eq!(child_marks[2].kind, RowMarkKind::Copy);
}

// ===========================================================================
// Permissions
// ===========================================================================

#[test]
fn whole_row_permission_expands_to_translated_columns() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(PARENT, plain_table(two_cols(), vec![CHILD1]));
    // Child has an extra leading column, shifting the inherited ones.
    catalog.add_table(
        CHILD1,
        plain_table(
            vec![
                ColumnMeta::new("extra", ColumnType::new(TypeId::Bool)),
                ColumnMeta::new("a", ColumnType::new(TypeId::Int32)),
                ColumnMeta::new("b", ColumnType::new(TypeId::Text)),
            ],
            vec![],
        ),
    );

    let mut ctx = PlannerContext::default();
    let mut entry = RangeTableEntry::relation(PARENT, RelationKind::Table)
        .with_names(&["a", "b"])
        .with_inherit();
    entry.selected_cols.insert_whole_row();
    let mut updated = ColumnSet::new();
    updated.insert(2);
    entry.updated_cols = updated;
    ctx.push_entry(entry);

    expand_append_relations(&mut ctx, &catalog).unwrap();

    // The parent-as-member keeps the parent's own permission sets.
    let parent_member = ctx.entry(RelId(2));
    assert!(parent_member.selected_cols.contains_whole_row());

    // The real child gets per-column bits on every translated column, never
    // a whole-row bit.
    let child = ctx.entry(RelId(3));
    assert!(!child.selected_cols.contains_whole_row());
    assert!(child.selected_cols.contains(2));
    assert!(child.selected_cols.contains(3));
    assert!(!child.selected_cols.contains(1));
    // A single-column permission follows its column's new position.
    assert!(child.updated_cols.contains(3));
    assert!(!child.updated_cols.contains(2));
}

// ===========================================================================
// Partitioned hierarchies
// ===========================================================================

#[test]
fn partitioned_expansion_exposes_root_and_leaves_only() {
    const MID: TableId = TableId(20);
    const LEAF1: TableId = TableId(21);
    const LEAF2: TableId = TableId(22);

    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(
        PARENT,
        TableDef {
            columns: two_cols(),
            descendants: vec![MID, LEAF1, LEAF2],
            partitioned: true,
            partition_keys: vec![1],
            ..Default::default()
        },
    );
    // The intermediate level is not a leaf storage unit.
    catalog.add_table(MID, plain_table(two_cols(), vec![]));
    for leaf in [LEAF1, LEAF2] {
        catalog.add_table(
            leaf,
            TableDef {
                columns: two_cols(),
                leaf_partition: true,
                ..Default::default()
            },
        );
    }

    let mut ctx = PlannerContext::default();
    ctx.push_entry(
        RangeTableEntry::relation(PARENT, RelationKind::Table)
            .with_names(&["a", "b"])
            .with_inherit(),
    );

    expand_append_relations(&mut ctx, &catalog).unwrap();

    // Exactly three members: root-as-self plus the two true leaves; the
    // intermediate level never appears.
    assert_eq!(ctx.append_rel_list.len(), 3);
    assert_eq!(member_tables(&ctx), vec![PARENT, LEAF1, LEAF2]);

    // One dynamic scan descriptor for the expansion.
    assert_eq!(ctx.dynamic_scans.len(), 1);
    let ds = &ctx.dynamic_scans[0];
    assert_eq!(ds.root, PARENT);
    assert_eq!(ds.reference, RelId(1));
    assert_eq!(ds.scan_id, 1);
    assert_eq!(ds.partition_key_positions, vec![1]);
    let members: Vec<RelId> = ds.leaf_rels.iter().collect();
    assert_eq!(members, vec![RelId(2), RelId(3), RelId(4)]);
}

#[test]
fn unpartitioned_expansion_emits_no_descriptor() {
    let (mut ctx, catalog) = family();
    expand_append_relations(&mut ctx, &catalog).unwrap();
    assert!(ctx.dynamic_scans.is_empty());
}

// ===========================================================================
// Row types
// ===========================================================================

#[test]
fn row_types_are_recorded_per_member() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(
        PARENT,
        TableDef {
            columns: two_cols(),
            descendants: vec![CHILD1],
            row_type: Some(RowTypeId(100)),
            ..Default::default()
        },
    );
    catalog.add_table(
        CHILD1,
        TableDef {
            columns: two_cols(),
            row_type: Some(RowTypeId(101)),
            ..Default::default()
        },
    );
    let mut ctx = PlannerContext::default();
    ctx.push_entry(
        RangeTableEntry::relation(PARENT, RelationKind::Table)
            .with_names(&["a", "b"])
            .with_inherit(),
    );

    expand_append_relations(&mut ctx, &catalog).unwrap();

    let self_member = &ctx.append_rel_list[0];
    assert_eq!(self_member.parent_row_type, Some(RowTypeId(100)));
    assert_eq!(self_member.child_row_type, Some(RowTypeId(100)));
    let child = &ctx.append_rel_list[1];
    assert_eq!(child.parent_row_type, Some(RowTypeId(100)));
    assert_eq!(child.child_row_type, Some(RowTypeId(101)));
}
