//! # Scalar Expressions
//!
//! The recursive expression tree used throughout the planning core: in output
//! schemas, filter clauses, column-translation maps, and query fragments.
//!
//! Two properties of this representation are load-bearing:
//!
//! - **Structural equality.** Reference matching between plan layers compares
//!   expressions with `==`, so adapters must never introduce nodes that
//!   evaluate at runtime when a non-evaluating relabel suffices. Collation
//!   adjustments use `Relabel`, and whole-row conversions between compatible
//!   named row types use `ConvertRow`; neither adds executable work.
//! - **Closed sum.** Every consumer matches exhaustively, so adding a variant
//!   is a compile-time event across the whole core rather than a runtime tag
//!   check.
//!
//! Column references carry `levels_up`: the number of query-fragment
//! boundaries between the reference and the fragment that owns the relation.

use crate::query::QueryFragment;
use crate::relids::RelIdSet;
use crate::types::{Collation, ColumnType, RelId, RowTypeId, ScalarValue, SubplanId, TypeId};
use serde::{Deserialize, Serialize};

/// A reference to one column of a range-table relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnVar {
    pub rel: RelId,
    /// 1-based column ordinal in the referenced relation.
    pub ordinal: u32,
    pub ty: ColumnType,
    pub collation: Option<Collation>,
    /// Query-fragment nesting distance to the owning fragment.
    pub levels_up: u32,
}

/// Binary operators appearing in predicates and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }
}

/// Unary operators for boolean logic and null tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    /// Reference to one column of a relation.
    Column(ColumnVar),
    /// Reference to a whole row of a relation. `row_type` is `None` when the
    /// relation has no named composite type (an anonymous record).
    WholeRow {
        rel: RelId,
        row_type: Option<RowTypeId>,
        levels_up: u32,
    },
    /// Constant. `ty` is `TypeId::Unknown` for an untyped literal whose
    /// concrete type is assigned by the first coercion applied to it.
    Literal { value: ScalarValue, ty: TypeId },
    /// Run-time type coercion.
    Cast {
        arg: Box<ScalarExpr>,
        target: ColumnType,
    },
    /// Non-evaluating collation relabel. Changes only the exposed collation;
    /// the argument reaches the executor unmodified.
    Relabel {
        arg: Box<ScalarExpr>,
        collation: Option<Collation>,
    },
    /// Non-evaluating row-type relabel between compatible named row types.
    ConvertRow {
        arg: Box<ScalarExpr>,
        target: RowTypeId,
    },
    /// Explicit row construction from individually listed fields.
    Row {
        fields: Vec<ScalarExpr>,
        names: Vec<String>,
        row_type: Option<RowTypeId>,
    },
    /// Cursor target: "WHERE CURRENT OF" style reference to a relation.
    CurrentOf { rel: RelId },
    /// A value pulled up through an outer join, carrying the set of relations
    /// it must be evaluated against.
    Placeholder {
        expr: Box<ScalarExpr>,
        rels: RelIdSet,
        levels_up: u32,
    },
    /// Reference to an entry in the statement-wide subplan registry. One-time
    /// references are evaluated at most once and may stay shared; other
    /// references are duplicated when translation must diverge.
    SubplanRef { id: SubplanId, one_time: bool },
    /// A nested query fragment used as an expression.
    Subquery(Box<QueryFragment>),
    BinaryOp {
        op: BinaryOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<ScalarExpr>,
    },
    Function {
        name: String,
        args: Vec<ScalarExpr>,
        ty: ColumnType,
        collation: Option<Collation>,
    },
    /// Flat conjunction, kept unnested to simplify predicate handling.
    And(Vec<ScalarExpr>),
    /// Flat disjunction.
    Or(Vec<ScalarExpr>),
}

impl ScalarExpr {
    pub fn column(rel: RelId, ordinal: u32, ty: ColumnType, collation: Option<Collation>) -> Self {
        ScalarExpr::Column(ColumnVar {
            rel,
            ordinal,
            ty,
            collation,
            levels_up: 0,
        })
    }

    pub fn int_literal(value: i32) -> Self {
        ScalarExpr::Literal {
            value: ScalarValue::Int32(value),
            ty: TypeId::Int32,
        }
    }

    /// The expression's result type.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ScalarExpr::Column(v) => v.ty,
            ScalarExpr::WholeRow { .. } | ScalarExpr::Row { .. } => ColumnType::new(TypeId::Record),
            ScalarExpr::Literal { ty, .. } => ColumnType::new(*ty),
            ScalarExpr::Cast { target, .. } => *target,
            ScalarExpr::Relabel { arg, .. } => arg.column_type(),
            ScalarExpr::ConvertRow { .. } => ColumnType::new(TypeId::Record),
            ScalarExpr::CurrentOf { .. } => ColumnType::new(TypeId::Bool),
            ScalarExpr::Placeholder { expr, .. } => expr.column_type(),
            ScalarExpr::SubplanRef { .. } | ScalarExpr::Subquery(_) => ColumnType::new(TypeId::Unknown),
            ScalarExpr::BinaryOp { op, left, .. } => {
                if op.is_comparison() {
                    ColumnType::new(TypeId::Bool)
                } else {
                    left.column_type()
                }
            }
            ScalarExpr::UnaryOp { op, operand } => match op {
                UnaryOp::Neg => operand.column_type(),
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => ColumnType::new(TypeId::Bool),
            },
            ScalarExpr::Function { ty, .. } => *ty,
            ScalarExpr::And(_) | ScalarExpr::Or(_) => ColumnType::new(TypeId::Bool),
        }
    }

    /// The expression's exposed collation.
    pub fn collation(&self) -> Option<Collation> {
        match self {
            ScalarExpr::Column(v) => v.collation,
            ScalarExpr::Relabel { collation, .. } => *collation,
            ScalarExpr::Placeholder { expr, .. } => expr.collation(),
            ScalarExpr::Function { collation, .. } => *collation,
            _ => None,
        }
    }

    /// Whether this is a bare constant (no wrapping computation).
    pub fn is_literal(&self) -> bool {
        matches!(self, ScalarExpr::Literal { .. })
    }

    /// Collect all column references in this expression, without descending
    /// into nested query fragments.
    pub fn columns(&self) -> Vec<&ColumnVar> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnVar>) {
        match self {
            ScalarExpr::Column(v) => out.push(v),
            ScalarExpr::WholeRow { .. }
            | ScalarExpr::Literal { .. }
            | ScalarExpr::CurrentOf { .. }
            | ScalarExpr::SubplanRef { .. }
            | ScalarExpr::Subquery(_) => {}
            ScalarExpr::Cast { arg, .. }
            | ScalarExpr::Relabel { arg, .. }
            | ScalarExpr::ConvertRow { arg, .. } => arg.collect_columns(out),
            ScalarExpr::Row { fields, .. } => {
                for f in fields {
                    f.collect_columns(out);
                }
            }
            ScalarExpr::Placeholder { expr, .. } => expr.collect_columns(out),
            ScalarExpr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            ScalarExpr::UnaryOp { operand, .. } => operand.collect_columns(out),
            ScalarExpr::Function { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            ScalarExpr::And(exprs) | ScalarExpr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// View this expression as a simple column reference, if it is one.
    pub fn as_column(&self) -> Option<&ColumnVar> {
        match self {
            ScalarExpr::Column(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_yields_bool() {
        let e = ScalarExpr::BinaryOp {
            op: BinaryOp::Lt,
            left: Box::new(ScalarExpr::column(
                RelId(1),
                1,
                ColumnType::new(TypeId::Int64),
                None,
            )),
            right: Box::new(ScalarExpr::int_literal(5)),
        };
        assert_eq!(e.column_type(), ColumnType::new(TypeId::Bool));
    }

    #[test]
    fn relabel_preserves_type_changes_collation() {
        let base = ScalarExpr::column(
            RelId(1),
            2,
            ColumnType::new(TypeId::Text),
            Some(Collation(10)),
        );
        let relabeled = ScalarExpr::Relabel {
            arg: Box::new(base.clone()),
            collation: Some(Collation(20)),
        };
        assert_eq!(relabeled.column_type(), base.column_type());
        assert_eq!(relabeled.collation(), Some(Collation(20)));
    }

    #[test]
    fn collect_columns_walks_nested_ops() {
        let a = ScalarExpr::column(RelId(1), 1, ColumnType::new(TypeId::Int32), None);
        let b = ScalarExpr::column(RelId(2), 3, ColumnType::new(TypeId::Int32), None);
        let e = ScalarExpr::And(vec![
            ScalarExpr::BinaryOp {
                op: BinaryOp::Eq,
                left: Box::new(a),
                right: Box::new(b),
            },
            ScalarExpr::int_literal(1),
        ]);
        assert_eq!(e.columns().len(), 2);
    }
}
