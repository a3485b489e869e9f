//! # Identifiers and Column Types
//!
//! Identifier newtypes keep the many small integer ids in this planner from
//! being mixed up: a `RelId` is a position in the statement's range table,
//! a `TableId` names a stored relation in the catalog, a `RowTypeId` names a
//! declared composite row type, and a `Collation` names a text-comparison
//! locale. `SubplanId` indexes the statement-wide subplan registry, and the
//! equivalence-class ids tie filter clauses to the join planner's equivalence
//! machinery.
//!
//! `ColumnType` pairs a type id with optional precision/scale metadata
//! (`UNSPECIFIED_PRECISION` when unconstrained). Two columns agree only when
//! both the type id and the precision agree; schema reconciliation widens
//! precision to unspecified when operands disagree.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a relation in the statement's range table (1-based).
///
/// `RelId::OUTPUT` is reserved for references to the output of a plan node's
/// single input, used by schema-adapting projections above combine nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u32);

impl RelId {
    /// Reference to the input plan's own output columns rather than a range
    /// table entry. Range table positions start at 1, so 0 is free.
    pub const OUTPUT: RelId = RelId(0);
}

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog identity of a stored relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

/// Catalog identity of a named composite row type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowTypeId(pub u32);

/// Catalog identity of a collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collation(pub u32);

/// Index into the statement-wide subplan registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubplanId(pub u32);

/// Identity of an equivalence class in the join planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquivClassId(pub u32);

/// Identity of one member of an equivalence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquivMemberId(pub u32);

/// Scalar type ids understood by the planning core.
///
/// `Unknown` is the type of an untyped literal whose concrete type is
/// resolved by the first coercion applied to it. `Record` is the type of an
/// anonymous row value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeId {
    Bool,
    Int32,
    Int64,
    Float64,
    Numeric,
    Text,
    Date,
    Record,
    Unknown,
}

impl TypeId {
    /// Rough per-value width in bytes, used for hash-table memory estimates.
    pub fn byte_width(&self) -> f64 {
        match self {
            TypeId::Bool => 1.0,
            TypeId::Int32 | TypeId::Date => 4.0,
            TypeId::Int64 | TypeId::Float64 => 8.0,
            TypeId::Numeric => 16.0,
            TypeId::Text | TypeId::Unknown => 32.0,
            TypeId::Record => 64.0,
        }
    }
}

/// Precision/scale metadata value meaning "unconstrained".
pub const UNSPECIFIED_PRECISION: i32 = -1;

/// A column's declared type: type id plus precision/scale metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub id: TypeId,
    pub precision: i32,
}

impl ColumnType {
    pub fn new(id: TypeId) -> Self {
        Self {
            id,
            precision: UNSPECIFIED_PRECISION,
        }
    }

    pub fn with_precision(id: TypeId, precision: i32) -> Self {
        Self { id, precision }
    }

    /// The same type with precision widened to unspecified.
    pub fn widened(&self) -> Self {
        Self::new(self.id)
    }
}

/// Constant values appearing in expressions.
///
/// `f64` is wrapped in `OrderedFloat` so values can participate in `Eq`/`Hash`
/// comparisons; structural equality of expressions is load-bearing for
/// reference matching between plan layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Days since the Unix epoch.
    Date(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widened_column_type_drops_precision() {
        let t = ColumnType::with_precision(TypeId::Numeric, 12);
        assert_eq!(t.widened(), ColumnType::new(TypeId::Numeric));
    }

    #[test]
    fn scalar_values_hashable() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ScalarValue::Float64(OrderedFloat(1.5)));
        assert!(set.contains(&ScalarValue::Float64(OrderedFloat(1.5))));
    }
}
