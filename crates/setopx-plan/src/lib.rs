//! # setopx-plan: Set-Operation and Append-Relation Planning
//!
//! The planning algorithms of the core, over the data model in
//! `setopx-core`:
//!
//! - **`translate`**: builds the parent-column to child-expression map for
//!   one parent/child pair (name-matched, type/precision/collation-checked).
//! - **`rewrite`**: restates an expression, filter clause, or query fragment
//!   written against an append-relation parent in terms of one specific
//!   child, repairing every derived field that depended on the old ids.
//! - **`inherit`**: expands a table reference denoting "this table and all
//!   its descendants" into explicit append-relation members, with lock
//!   acquisition, permission translation, row-mark derivation, and dynamic
//!   scan descriptors for partitioned hierarchies.
//! - **`setop`**: turns a set-operation tree into a cost-chosen physical
//!   plan with a uniformly-typed output schema, choosing hash- or sort-based
//!   duplicate elimination by cost.
//!
//! Expansion runs first per statement; its append-relation records are
//! consumed both by the general join planner (outside this core) and, for
//! inheritance flattened into UNION ALL, by the set-operation builder. The
//! rewriter is invoked by both whenever a condition or target expression
//! must be restated for a specific child.

pub mod inherit;
pub mod rewrite;
pub mod setop;
pub mod translate;
