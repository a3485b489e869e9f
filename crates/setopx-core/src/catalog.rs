//! # Catalog Interface
//!
//! The catalog supplies the append-relation expander with everything it needs
//! to know about stored relations: descendant enumeration (with lock
//! acquisition), column layouts, named row types, partitioning structure, and
//! session-visibility of temporary objects.
//!
//! ## Trait Design
//!
//! `Catalog` is a trait object boundary so different backends can provide
//! metadata. The `InMemoryCatalog` is a HashMap-backed implementation for
//! tests and development; it records every lock acquisition so tests can
//! assert on lock modes.
//!
//! ## Locking Contract
//!
//! `list_descendants` enumerates the relation itself plus all live
//! descendants, acquiring the given lock on each before returning it. A
//! descendant that disappears between a `has_descendants` check and the
//! enumeration simply doesn't appear in the result -- callers treat a short
//! list as the no-descendants case, not as an error.

use crate::types::{Collation, ColumnType, RowTypeId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Table-level lock modes, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    /// Plain read access.
    AccessShare,
    /// Read access with row-level locking intent.
    RowShare,
    /// Write access to rows.
    RowExclusive,
    /// Strong lock taken for row-locking clauses when the weaker row-level
    /// protocol cannot be used.
    Exclusive,
}

/// What kind of object a stored relation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Table,
    ForeignTable,
    View,
}

/// One column of a stored relation's layout, in declaration order. Dropped
/// columns remain in the layout as holes so that ordinals stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub ty: ColumnType,
    pub collation: Option<Collation>,
    pub dropped: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            collation: None,
            dropped: false,
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    pub fn dropped(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            collation: None,
            dropped: true,
        }
    }
}

/// Catalog and storage metadata consumed by the expander.
pub trait Catalog: Send + Sync {
    /// Cheap check whether the relation has (or recently had) descendants.
    fn has_descendants(&self, table: TableId) -> bool;

    /// Enumerate the relation itself plus all live descendants, acquiring
    /// `lock` on each. The relation itself is first.
    fn list_descendants(&self, table: TableId, lock: LockMode) -> Vec<TableId>;

    /// Acquire a lock on one relation.
    fn acquire_lock(&self, table: TableId, lock: LockMode);

    /// Column layout, including dropped-column holes. `None` if the relation
    /// no longer exists.
    fn column_layout(&self, table: TableId) -> Option<Vec<ColumnMeta>>;

    /// The relation's named composite row type, if it has one.
    fn row_type(&self, table: TableId) -> Option<RowTypeId>;

    fn relation_kind(&self, table: TableId) -> RelationKind;

    /// Whether the relation is the root of a partitioned hierarchy.
    fn is_partitioned(&self, table: TableId) -> bool;

    /// Whether the relation is a leaf storage unit of a partitioned
    /// hierarchy (as opposed to an intermediate level).
    fn is_leaf_partition(&self, table: TableId) -> bool;

    /// 1-based positions of the partition key columns of a partitioned root.
    fn partition_key_positions(&self, table: TableId) -> Vec<u32>;

    /// Whether the relation is a session-private temporary object of some
    /// other session, which this statement cannot safely access.
    fn is_other_session_temp(&self, table: TableId) -> bool;
}

/// One table's registered metadata in the in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct TableDef {
    pub columns: Vec<ColumnMeta>,
    /// Direct and transitive descendants, in enumeration order.
    pub descendants: Vec<TableId>,
    pub row_type: Option<RowTypeId>,
    pub kind: Option<RelationKind>,
    pub partitioned: bool,
    pub leaf_partition: bool,
    pub partition_keys: Vec<u32>,
    pub other_session_temp: bool,
}

/// In-memory catalog for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<TableId, TableDef>,
    locks: Mutex<Vec<(TableId, LockMode)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableId, def: TableDef) {
        self.tables.insert(table, def);
    }

    /// Every lock acquired through this catalog, in order.
    pub fn acquired_locks(&self) -> Vec<(TableId, LockMode)> {
        self.locks.lock().expect("lock log poisoned").clone()
    }
}

impl Catalog for InMemoryCatalog {
    fn has_descendants(&self, table: TableId) -> bool {
        self.tables
            .get(&table)
            .map_or(false, |t| !t.descendants.is_empty())
    }

    fn list_descendants(&self, table: TableId, lock: LockMode) -> Vec<TableId> {
        let Some(def) = self.tables.get(&table) else {
            return Vec::new();
        };
        let mut members = vec![table];
        // A registered descendant that has since been dropped is silently
        // omitted, mirroring a concurrent drop between check and enumeration.
        members.extend(
            def.descendants
                .iter()
                .copied()
                .filter(|d| self.tables.contains_key(d)),
        );
        for member in &members {
            self.acquire_lock(*member, lock);
        }
        members
    }

    fn acquire_lock(&self, table: TableId, lock: LockMode) {
        self.locks
            .lock()
            .expect("lock log poisoned")
            .push((table, lock));
    }

    fn column_layout(&self, table: TableId) -> Option<Vec<ColumnMeta>> {
        self.tables.get(&table).map(|t| t.columns.clone())
    }

    fn row_type(&self, table: TableId) -> Option<RowTypeId> {
        self.tables.get(&table).and_then(|t| t.row_type)
    }

    fn relation_kind(&self, table: TableId) -> RelationKind {
        self.tables
            .get(&table)
            .and_then(|t| t.kind)
            .unwrap_or(RelationKind::Table)
    }

    fn is_partitioned(&self, table: TableId) -> bool {
        self.tables.get(&table).map_or(false, |t| t.partitioned)
    }

    fn is_leaf_partition(&self, table: TableId) -> bool {
        self.tables.get(&table).map_or(false, |t| t.leaf_partition)
    }

    fn partition_key_positions(&self, table: TableId) -> Vec<u32> {
        self.tables
            .get(&table)
            .map(|t| t.partition_keys.clone())
            .unwrap_or_default()
    }

    fn is_other_session_temp(&self, table: TableId) -> bool {
        self.tables
            .get(&table)
            .map_or(false, |t| t.other_session_temp)
    }
}
