//! # setopx-core: Set-Operation Planner Data Model
//!
//! This crate defines the data structures and collaborator interfaces for the
//! set-operation and append-relation planning core. It is consumed by the
//! `setopx-plan` crate, which implements the planning algorithms.
//!
//! ## Module Overview
//!
//! - **`types`**: Identifiers (relations, tables, row types, collations) and the
//!   column type system with precision metadata.
//! - **`expr`**: The scalar expression tree (column references, literals,
//!   coercions, row construction, subplan references) used in schemas, filter
//!   clauses, and column-translation maps.
//! - **`relids`**: Relation-identifier sets and column sets with copy-on-write
//!   substitution.
//! - **`schema`**: Output schemas -- ordered target entries with display names
//!   and grouping references.
//! - **`plan`**: Physical plan (path) nodes with row estimates, startup/total
//!   cost, and parallel execution distribution.
//! - **`cost`**: Cost formulas for sorting, hash grouping, and streaming
//!   grouping, plus fractional cost comparison.
//! - **`query`**: Query fragments, set-operation trees, join trees, filter
//!   clauses with invalidatable caches, and row-locking marks.
//! - **`catalog`**: The catalog trait (descendant enumeration, column layouts,
//!   lock acquisition) and an in-memory implementation for tests.
//! - **`planner`**: The external per-leaf planner trait and a stub
//!   implementation for tests.
//! - **`context`**: The statement-wide planning context: range table,
//!   append-relation list, row marks, dynamic scan descriptors, and the
//!   subplan registry.
//! - **`error`**: The planning error taxonomy.

pub mod catalog;
pub mod context;
pub mod cost;
pub mod error;
pub mod expr;
pub mod plan;
pub mod planner;
pub mod query;
pub mod relids;
pub mod schema;
pub mod types;
