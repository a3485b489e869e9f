//! # External Leaf Planner Interface
//!
//! The set-operation builder does not plan leaf queries itself: each leaf is
//! handed to the general cost-based planner behind the [`SubqueryPlanner`]
//! trait, which returns the cheapest plan meeting the caller's row-limit
//! fraction. The builder only adapts the returned plan's schema and combines
//! the results.
//!
//! `StubPlanner` is the test implementation: leaf plans and distinct-count
//! estimates are registered per relation id, and every `plan_best` call is
//! logged so tests can assert on the fraction and configuration passed down
//! (for example, that the sort-preference flag is cleared for set-operation
//! leaves).

use crate::context::{PlannerConfig, PlannerContext};
use crate::error::{PlanError, PlanResult};
use crate::expr::ScalarExpr;
use crate::plan::PhysicalPlan;
use crate::types::RelId;
use std::collections::HashMap;
use std::sync::Mutex;

/// The general cost-based planner, invoked once per set-operation leaf.
pub trait SubqueryPlanner {
    /// Plan the subquery behind range-table entry `rel`, returning the
    /// cheapest plan that satisfies `tuple_fraction` under `config`.
    fn plan_best(
        &self,
        rel: RelId,
        ctx: &PlannerContext,
        tuple_fraction: f64,
        config: &PlannerConfig,
    ) -> PlanResult<PhysicalPlan>;

    /// Estimate the number of distinct value combinations `columns` take on
    /// over the plan's output.
    fn estimate_distinct(&self, plan: &PhysicalPlan, columns: &[ScalarExpr]) -> f64;
}

/// One logged `plan_best` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanBestCall {
    pub rel: RelId,
    pub tuple_fraction: f64,
    pub honor_sort_preference: bool,
}

/// Test planner with canned leaf plans and distinct estimates.
#[derive(Debug, Default)]
pub struct StubPlanner {
    plans: HashMap<RelId, PhysicalPlan>,
    distinct: HashMap<RelId, f64>,
    calls: Mutex<Vec<PlanBestCall>>,
}

impl StubPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rel: RelId, plan: PhysicalPlan) {
        self.plans.insert(rel, plan);
    }

    /// Register the distinct-group estimate reported for a leaf's output.
    pub fn register_distinct(&mut self, rel: RelId, groups: f64) {
        self.distinct.insert(rel, groups);
    }

    pub fn calls(&self) -> Vec<PlanBestCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }
}

impl SubqueryPlanner for StubPlanner {
    fn plan_best(
        &self,
        rel: RelId,
        _ctx: &PlannerContext,
        tuple_fraction: f64,
        config: &PlannerConfig,
    ) -> PlanResult<PhysicalPlan> {
        self.calls.lock().expect("call log poisoned").push(PlanBestCall {
            rel,
            tuple_fraction,
            honor_sort_preference: config.honor_sort_preference,
        });
        self.plans
            .get(&rel)
            .cloned()
            .ok_or_else(|| PlanError::SchemaMismatch(format!("no plan registered for relation {rel}")))
    }

    fn estimate_distinct(&self, plan: &PhysicalPlan, _columns: &[ScalarExpr]) -> f64 {
        // Look up by the scan relation when the plan (or its input) is a
        // subquery scan; otherwise fall back to the row estimate.
        fn scan_rel(plan: &PhysicalPlan) -> Option<RelId> {
            match &plan.op {
                crate::plan::PlanOp::SubqueryScan { rel } => Some(*rel),
                _ => plan.inputs.iter().find_map(scan_rel),
            }
        }
        scan_rel(plan)
            .and_then(|rel| self.distinct.get(&rel).copied())
            .unwrap_or(plan.rows)
    }
}
