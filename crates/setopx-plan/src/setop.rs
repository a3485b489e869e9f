//! # Set-Operation Plan Builder
//!
//! Turns a tree of UNION / UNION ALL / INTERSECT / EXCEPT nodes into one
//! physical plan with a correct, uniformly-typed output schema.
//!
//! ## Structure
//!
//! The builder recurses over the set-operation tree. Leaves are planned by
//! the external [`SubqueryPlanner`] and then wrapped in a schema-adapting
//! projection that makes every operand produce exactly the declared column
//! types and collations. UNION branches flatten nested compatible UNIONs
//! into one flat operand list and concatenate them; INTERSECT/EXCEPT plan
//! their two sides independently, tag each with a provenance flag, and
//! reduce groups of equal rows by per-operand counts. Duplicate elimination
//! chooses hash- or sort-based grouping by comparing costs under the
//! caller's row-limit fraction.
//!
//! ## Schema discipline
//!
//! Generated schemas reference operand outputs positionally, insert a type
//! coercion only when the operand's type differs from the declared one, and
//! adjust collations with a non-evaluating relabel -- never a runtime
//! coercion. Later layers match references against the underlying plan's
//! output expressions structurally, so the adapters must be bit-predictable:
//! the same inputs always generate the same expressions.

use setopx_core::context::PlannerContext;
use setopx_core::cost::{
    compare_fractional, cost_append, cost_hash_grouping, cost_project, cost_redistribute,
    cost_sort, cost_stream_grouping, hash_table_bytes, Cost, CPU_OPERATOR_COST,
};
use setopx_core::error::{PlanError, PlanResult};
use setopx_core::expr::ScalarExpr;
use setopx_core::plan::{
    Distribution, PhysicalPlan, PlanOp, SetOpCmd, SetOpStrategy,
};
use setopx_core::planner::SubqueryPlanner;
use setopx_core::query::{QueryFragment, SetOpGroupClause, SetOpKind, SetOpNode};
use setopx_core::schema::{OutputSchema, TargetEntry};
use setopx_core::types::{Collation, ColumnType, RelId, TypeId, UNSPECIFIED_PRECISION};
use std::cmp::Ordering;
use tracing::{debug, trace};

/// Plan the set-operation tree of a statement.
///
/// Returns the finished plan and its output schema. The display names of
/// every generated schema come from the tree's leftmost leaf query, so the
/// statement's visible column names are stable no matter how the tree is
/// rearranged during planning.
pub fn plan_set_operations(
    ctx: &mut PlannerContext,
    planner: &dyn SubqueryPlanner,
    query: &QueryFragment,
) -> PlanResult<(PhysicalPlan, OutputSchema)> {
    let top = query.set_operations.as_ref().ok_or_else(|| {
        PlanError::unsupported("set operation", "statement has no set-operation tree")
    })?;

    let leftmost = top.leftmost_leaf();
    let names: Vec<String> = ctx
        .subquery(leftmost)
        .map(|q| {
            q.target_list
                .iter()
                .filter(|t| !t.auxiliary)
                .map(|t| t.name.clone())
                .collect()
        })
        .unwrap_or_default();

    let mut builder = SetOpBuilder {
        ctx,
        planner,
        names,
        depth: 0,
    };

    let plan = if builder.ctx.has_recursion {
        builder.plan_recursive(top)?
    } else {
        let SetOpNode::Combine {
            col_types,
            col_collations,
            ..
        } = top
        else {
            return Err(PlanError::unsupported(
                "set operation",
                "tree root is a bare leaf",
            ));
        };
        let (plan, _groups) =
            builder.recurse(top, col_types, col_collations, true, None, false)?;
        plan
    };

    debug!(
        "planned set-operation tree: rows={:.0} cost={:.2}",
        plan.rows, plan.cost.total
    );
    let schema = plan.schema.clone();
    Ok((plan, schema))
}

struct SetOpBuilder<'a> {
    ctx: &'a mut PlannerContext,
    planner: &'a dyn SubqueryPlanner,
    /// Display names taken from the leftmost leaf query.
    names: Vec<String>,
    depth: u32,
}

impl SetOpBuilder<'_> {
    fn descend(&mut self) -> PlanResult<()> {
        self.depth += 1;
        if self.depth > self.ctx.config.max_setop_nesting {
            return Err(PlanError::ResourceExhausted {
                limit: self.ctx.config.max_setop_nesting,
            });
        }
        Ok(())
    }

    /// Recursively handle one node of the set-operation tree.
    ///
    /// `junk_ok` permits auxiliary columns in the result; `flag` requests a
    /// literal provenance column with the given value; `want_groups` asks
    /// for a distinct-group estimate alongside the plan.
    fn recurse(
        &mut self,
        node: &SetOpNode,
        want_types: &[ColumnType],
        want_collations: &[Option<Collation>],
        junk_ok: bool,
        flag: Option<i32>,
        want_groups: bool,
    ) -> PlanResult<(PhysicalPlan, Option<f64>)> {
        self.descend()?;
        let result = match node {
            SetOpNode::Leaf { rel } => {
                self.plan_leaf(*rel, want_types, want_collations, flag, want_groups)
            }
            SetOpNode::Combine { .. } => self.plan_combine(
                node,
                want_types,
                want_collations,
                junk_ok,
                flag,
                want_groups,
            ),
        };
        self.depth -= 1;
        result
    }

    /// Plan a leaf subquery and adapt its schema to the declared types.
    fn plan_leaf(
        &mut self,
        rel: RelId,
        want_types: &[ColumnType],
        want_collations: &[Option<Collation>],
        flag: Option<i32>,
        want_groups: bool,
    ) -> PlanResult<(PhysicalPlan, Option<f64>)> {
        // Sibling order is irrelevant to the combine step, so the leaf
        // planner must not pay for a pre-sorted plan.
        let mut config = self.ctx.config.clone();
        config.honor_sort_preference = false;
        let subplan = self
            .planner
            .plan_best(rel, self.ctx, self.ctx.tuple_fraction, &config)?;

        let schema = generate_setop_schema(
            want_types,
            want_collations,
            flag,
            rel,
            true,
            &subplan.schema,
            &self.names,
        )?;
        let plan = apply_projection(subplan, schema);

        let groups = if want_groups {
            let mostly_unique = self
                .ctx
                .subquery(rel)
                .map(|q| q.output_mostly_unique())
                .unwrap_or(false);
            Some(if mostly_unique {
                // The leaf already groups, aggregates, or deduplicates; its
                // row estimate is the group estimate.
                plan.rows
            } else {
                let cols: Vec<ScalarExpr> = plan
                    .schema
                    .real_columns()
                    .map(|c| c.expr.clone())
                    .collect();
                self.planner.estimate_distinct(&plan, &cols)
            })
        } else {
            None
        };

        Ok((plan, groups))
    }

    /// Plan a combine node and re-adapt its schema when the caller's
    /// requirements are not already met exactly.
    fn plan_combine(
        &mut self,
        node: &SetOpNode,
        want_types: &[ColumnType],
        want_collations: &[Option<Collation>],
        junk_ok: bool,
        flag: Option<i32>,
        want_groups: bool,
    ) -> PlanResult<(PhysicalPlan, Option<f64>)> {
        let SetOpNode::Combine { kind, .. } = node else {
            unreachable!("plan_combine called on a leaf");
        };

        let (mut plan, groups) = match kind {
            SetOpKind::Union => self.plan_union(node, want_groups)?,
            SetOpKind::Intersect | SetOpKind::Except => self.plan_nonunion(node)?,
        };

        // Nested correctness depends on structural equality between a
        // reference and the underlying plan's corresponding output
        // expression, so the adaptation references the combine's own output
        // numbering, never the leaf numbering.
        if flag.is_some()
            || !plan.schema.same_types(want_types, junk_ok)
            || !plan.schema.same_collations(want_collations, junk_ok)
        {
            let schema = generate_setop_schema(
                want_types,
                want_collations,
                flag,
                RelId::OUTPUT,
                false,
                &plan.schema,
                &self.names,
            )?;
            plan = apply_projection(plan, schema);
        }

        let groups = if want_groups { groups } else { None };
        Ok((plan, groups))
    }

    /// Plan a UNION or UNION ALL node: flatten compatible nested UNIONs into
    /// one operand list, concatenate, and deduplicate if not ALL.
    fn plan_union(
        &mut self,
        node: &SetOpNode,
        want_groups: bool,
    ) -> PlanResult<(PhysicalPlan, Option<f64>)> {
        let SetOpNode::Combine {
            all,
            left,
            right,
            col_types,
            col_collations,
            grouping,
            ..
        } = node
        else {
            unreachable!("plan_union called on a leaf");
        };

        let save_fraction = self.ctx.tuple_fraction;
        // Plain UNION must see every input row to deduplicate; UNION ALL
        // passes the caller's fraction through unchanged.
        if !*all {
            self.ctx.tuple_fraction = 0.0;
        }
        let result = self.plan_union_guts(
            node, *all, left, right, col_types, col_collations, grouping, want_groups,
        );
        self.ctx.tuple_fraction = save_fraction;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_union_guts(
        &mut self,
        top: &SetOpNode,
        all: bool,
        left: &SetOpNode,
        right: &SetOpNode,
        col_types: &[ColumnType],
        col_collations: &[Option<Collation>],
        grouping: &[SetOpGroupClause],
        want_groups: bool,
    ) -> PlanResult<(PhysicalPlan, Option<f64>)> {
        let mut operands = Vec::new();
        self.collect_union_operands(left, top, &mut operands)?;
        self.collect_union_operands(right, top, &mut operands)?;
        trace!("union flattened into {} operands", operands.len());

        let input_schemas: Vec<&OutputSchema> = operands.iter().map(|p| &p.schema).collect();
        let schema = generate_append_schema(
            col_types,
            col_collations,
            false,
            &input_schemas,
            &self.names,
        );

        let group_cols: Vec<u32> = schema.grouping_positions();
        let operands = if !all {
            reconcile_for_grouping(operands, &group_cols)
        } else {
            operands
        };
        let mut plan = make_append(operands, schema);

        if !all {
            plan = self.make_union_unique(grouping, plan)?;
        }

        // The output is assumed unique: certainly true after deduplication,
        // and the conservative choice for UNION ALL.
        let groups = want_groups.then_some(plan.rows);
        Ok((plan, groups))
    }

    /// Fold compatible nested UNION children into the parent's operand list;
    /// plan anything else as a standalone operand.
    ///
    /// A nested UNION ALL always folds: its duplicates are either kept (ALL
    /// parent) or removed by the parent's own deduplication. A nested plain
    /// UNION folds only into another plain UNION with identical declared
    /// column types. Collations are deliberately ignored in this decision:
    /// all supported collations agree on which values are equal, and operand
    /// order never survives the combine step, so a collation difference
    /// cannot change the result.
    fn collect_union_operands(
        &mut self,
        node: &SetOpNode,
        top: &SetOpNode,
        out: &mut Vec<PhysicalPlan>,
    ) -> PlanResult<()> {
        let SetOpNode::Combine {
            kind: top_kind,
            all: top_all,
            col_types: top_types,
            col_collations: top_collations,
            ..
        } = top
        else {
            unreachable!("union parent is always a combine node");
        };

        if let SetOpNode::Combine {
            kind,
            all,
            left,
            right,
            col_types,
            ..
        } = node
        {
            if kind == top_kind && (*all == *top_all || *all) && col_types == top_types {
                self.descend()?;
                let result = (|| {
                    self.collect_union_operands(left, top, out)?;
                    self.collect_union_operands(right, top, out)
                })();
                self.depth -= 1;
                return result;
            }
        }

        // Not mergeable: plan this child separately. Auxiliary columns are
        // disallowed because the concatenation performs no projection of its
        // own -- every operand must produce exactly the declared columns.
        let (plan, _groups) =
            self.recurse(node, top_types, top_collations, false, None, false)?;
        out.push(plan);
        Ok(())
    }

    /// Add duplicate elimination on top of a union's concatenation.
    fn make_union_unique(
        &mut self,
        grouping: &[SetOpGroupClause],
        plan: PhysicalPlan,
    ) -> PlanResult<PhysicalPlan> {
        let group_list = generate_setop_grouplist(grouping, &plan.schema);
        if group_list.is_empty() {
            return Err(PlanError::unsupported(
                "UNION",
                "set operation over no columns",
            ));
        }

        // Take the number of distinct groups as the total input size: the
        // worst case. A statistical estimate that undershoots would risk a
        // hash table overrunning its memory budget, so never under-estimate.
        let num_groups = plan.rows;

        let use_hash = self.choose_hashed_setop(&group_list, &plan, num_groups, num_groups, "UNION")?;
        let group_refs: Vec<u32> = group_list.iter().map(|c| c.group_ref).collect();
        Ok(if use_hash {
            make_hash_dedup(plan, group_refs, num_groups)
        } else {
            let sorted = make_sort(plan, group_refs.clone());
            make_unique(sorted, group_refs, num_groups)
        })
    }

    /// Plan an INTERSECT / EXCEPT (± ALL) node.
    fn plan_nonunion(&mut self, node: &SetOpNode) -> PlanResult<(PhysicalPlan, Option<f64>)> {
        let SetOpNode::Combine {
            kind,
            all,
            left,
            right,
            col_types,
            col_collations,
            grouping,
            ..
        } = node
        else {
            unreachable!("plan_nonunion called on a leaf");
        };
        let construct = kind.construct_name();

        // Both sides must be read completely to compare groups.
        let save_fraction = self.ctx.tuple_fraction;
        self.ctx.tuple_fraction = 0.0;
        let lresult = self.recurse(left, col_types, col_collations, false, Some(0), true);
        let rresult = self.recurse(right, col_types, col_collations, false, Some(1), true);
        self.ctx.tuple_fraction = save_fraction;
        let (lplan, lgroups) = lresult?;
        let (rplan, rgroups) = rresult?;
        let lgroups = lgroups.unwrap_or(lplan.rows);
        let rgroups = rgroups.unwrap_or(rplan.rows);
        let (lrows, rrows) = (lplan.rows, rplan.rows);

        // EXCEPT is not commutative: the left input must stay first. For
        // INTERSECT either order gives the same rows, so put the side with
        // fewer groups first to shrink the hash table.
        let (first, second, first_flag) =
            if *kind == SetOpKind::Except || lgroups <= rgroups {
                (lplan, rplan, 0)
            } else {
                trace!("INTERSECT reordered: right side has fewer groups");
                (rplan, lplan, 1)
            };

        let input_schemas = [&first.schema, &second.schema];
        let schema = generate_append_schema(
            col_types,
            col_collations,
            true,
            &input_schemas,
            &self.names,
        );
        let group_cols: Vec<u32> = schema.grouping_positions();

        // Redistribute below the concatenation if the sides disagree, so
        // equal rows from either side are guaranteed comparable and the
        // per-operand flag ordering survives.
        let operands = reconcile_for_grouping(vec![first, second], &group_cols);
        let plan = make_append(operands, schema);

        let group_list = generate_setop_grouplist(grouping, &plan.schema);
        if group_list.is_empty() {
            return Err(PlanError::unsupported(
                construct,
                "set operation over no columns",
            ));
        }

        // Hashtable entries cover the left-hand input for EXCEPT, or the
        // smaller input for INTERSECT. Worst-case estimates, deliberately.
        let (num_groups, output_rows) = match kind {
            SetOpKind::Except => (lgroups, if *all { lrows } else { lgroups }),
            SetOpKind::Intersect => {
                let groups = lgroups.min(rgroups);
                (groups, if *all { lrows.min(rrows) } else { groups })
            }
            SetOpKind::Union => unreachable!("handled by plan_union"),
        };

        let use_hash =
            self.choose_hashed_setop(&group_list, &plan, num_groups, output_rows, construct)?;
        let group_refs: Vec<u32> = group_list.iter().map(|c| c.group_ref).collect();
        let plan = if use_hash {
            plan
        } else {
            make_sort(plan, group_refs.clone())
        };

        let cmd = match (kind, all) {
            (SetOpKind::Intersect, false) => SetOpCmd::Intersect,
            (SetOpKind::Intersect, true) => SetOpCmd::IntersectAll,
            (SetOpKind::Except, false) => SetOpCmd::Except,
            (SetOpKind::Except, true) => SetOpCmd::ExceptAll,
            (SetOpKind::Union, _) => unreachable!("handled by plan_union"),
        };
        let flag_position = plan.schema.real_count() as u32 + 1;
        let strategy = if use_hash {
            SetOpStrategy::Hashed
        } else {
            SetOpStrategy::Sorted
        };
        let ncols = group_refs.len();
        let cost = Cost {
            startup: if use_hash {
                plan.cost.total
            } else {
                plan.cost.startup
            },
            total: plan.cost.total + plan.rows * ncols as f64 * CPU_OPERATOR_COST,
        };
        let reduce = PhysicalPlan {
            op: PlanOp::SetOpReduce {
                cmd,
                strategy,
                group_refs,
                flag_position,
                first_operand_flag: use_hash.then_some(first_flag),
                groups: num_groups,
            },
            schema: plan.schema.clone(),
            rows: output_rows,
            cost,
            distribution: plan.distribution.clone(),
            inputs: vec![plan],
        };
        Ok((reduce, Some(num_groups)))
    }

    /// Plan a self-referential recursive union.
    ///
    /// The non-recursive side is planned first; if it replicates rows across
    /// execution units it is forced onto a single unit, because the
    /// recursive side's feedback scan must match its distribution. Duplicate
    /// elimination, when requested, can only hash: the working set grows as
    /// iteration proceeds, which a sort-based strategy cannot handle.
    fn plan_recursive(&mut self, node: &SetOpNode) -> PlanResult<PhysicalPlan> {
        let SetOpNode::Combine {
            kind,
            all,
            left,
            right,
            col_types,
            col_collations,
            grouping,
            ..
        } = node
        else {
            return Err(PlanError::unsupported(
                "recursive set operation",
                "tree root is a bare leaf",
            ));
        };
        if *kind != SetOpKind::Union {
            return Err(PlanError::unsupported(
                "recursive set operation",
                "only UNION can be recursive",
            ));
        }

        let (lplan, _) = self.recurse(left, col_types, col_collations, false, None, false)?;
        let lplan = if lplan.distribution == Distribution::Replicated {
            make_redistribute(lplan, Distribution::Single)
        } else {
            lplan
        };

        // The recursive side's planner needs to see the non-recursive plan
        // to give the feedback scan a matching distribution.
        self.ctx.non_recursive_plan = Some(lplan.clone());
        let rresult = self.recurse(right, col_types, col_collations, false, None, false);
        self.ctx.non_recursive_plan = None;
        let (rplan, _) = rresult?;

        let schema = generate_append_schema(
            col_types,
            col_collations,
            false,
            &[&lplan.schema, &rplan.schema],
            &self.names,
        );

        let (group_refs, num_groups) = if *all {
            (Vec::new(), 0.0)
        } else {
            let group_list = generate_setop_grouplist(grouping, &schema);
            if !group_list.iter().all(|c| c.hashable) {
                return Err(PlanError::unsupported(
                    "recursive UNION",
                    "all column data types must be hashable",
                ));
            }
            // No statistical model exists for iterative growth; assume the
            // working set stays within ten recursions' worth of rows.
            (
                group_list.iter().map(|c| c.group_ref).collect(),
                lplan.rows + rplan.rows * 10.0,
            )
        };

        let rows = lplan.rows + rplan.rows * 10.0;
        let cost = Cost {
            startup: lplan.cost.startup,
            total: lplan.cost.total + rplan.cost.total * 10.0,
        };
        let distribution = rplan.distribution.clone();
        Ok(PhysicalPlan {
            op: PlanOp::RecursiveUnion {
                group_refs,
                groups: num_groups,
            },
            schema,
            rows,
            cost,
            distribution,
            inputs: vec![lplan, rplan],
        })
    }

    /// Decide between hash-based grouping and sort-plus-streaming grouping.
    fn choose_hashed_setop(
        &self,
        group_list: &[SetOpGroupClause],
        input: &PhysicalPlan,
        num_groups: f64,
        output_rows: f64,
        construct: &str,
    ) -> PlanResult<bool> {
        let can_sort = group_list.iter().all(|c| c.sortable);
        let can_hash = group_list.iter().all(|c| c.hashable);
        match (can_hash, can_sort) {
            (true, true) => {}
            (true, false) => return Ok(true),
            (false, true) => return Ok(false),
            (false, false) => {
                return Err(PlanError::unsupported(
                    construct,
                    "some column data types support only hashing while others support only sorting",
                ))
            }
        }

        if !self.ctx.config.enable_hash_dedup {
            return Ok(false);
        }

        // Reject hashing outright if the table cannot fit the memory budget;
        // the grouping hash table cannot spill.
        let width = input.schema.estimated_width();
        if hash_table_bytes(width, num_groups) > self.ctx.config.work_mem_kb as f64 * 1024.0 {
            trace!("hash dedup rejected: table would exceed memory budget");
            return Ok(false);
        }

        let ncols = group_list.len();
        let hashed = cost_hash_grouping(&input.cost, input.rows, ncols, num_groups);
        let sorted_input = cost_sort(&input.cost, input.rows, width);
        let sorted = cost_stream_grouping(&sorted_input, input.rows, ncols, num_groups);

        // An absolute row limit becomes a fraction of the estimated output.
        let mut fraction = self.ctx.tuple_fraction;
        if fraction >= 1.0 {
            fraction /= output_rows.max(1.0);
        }
        let use_hash = compare_fractional(&hashed, &sorted, fraction) == Ordering::Less;
        trace!(
            "{construct} dedup strategy: {} (hashed {:.2} vs sorted {:.2})",
            if use_hash { "hashed" } else { "sorted" },
            hashed.total,
            sorted.total
        );
        Ok(use_hash)
    }
}

/// Generate the schema-adapting projection for one operand.
///
/// Each wanted column references the input's same-position output; a type
/// coercion is inserted when the types differ, and a collation difference is
/// repaired with a non-evaluating relabel. At the first adaptation layer
/// (`copy_literals`) a literal constant in the input is copied through
/// unchanged instead of being wrapped in a reference -- this preserves
/// literal-ness so type inference on untyped literals behaves correctly. No
/// other layer may do this: phony constants must not appear in the output of
/// upper plan levels.
fn generate_setop_schema(
    want_types: &[ColumnType],
    want_collations: &[Option<Collation>],
    flag: Option<i32>,
    input_rel: RelId,
    copy_literals: bool,
    input_schema: &OutputSchema,
    names: &[String],
) -> PlanResult<OutputSchema> {
    let input_real: Vec<&TargetEntry> = input_schema.real_columns().collect();
    if input_real.len() != want_types.len() {
        return Err(PlanError::SchemaMismatch(format!(
            "operand produces {} columns, {} expected",
            input_real.len(),
            want_types.len()
        )));
    }

    let mut columns = Vec::with_capacity(want_types.len() + 1);
    for (idx, (want, want_coll)) in want_types.iter().zip(want_collations).enumerate() {
        let input = input_real[idx];
        debug_assert_eq!(input.position, idx as u32 + 1);

        let mut expr = if copy_literals && input.expr.is_literal() {
            input.expr.clone()
        } else {
            ScalarExpr::column(
                input_rel,
                idx as u32 + 1,
                input.expr.column_type(),
                input.expr.collation(),
            )
        };
        if expr.column_type().id != want.id {
            expr = coerce_to_type(expr, want.id);
        }
        if expr.collation() != *want_coll {
            expr = ScalarExpr::Relabel {
                arg: Box::new(expr),
                collation: *want_coll,
            };
        }

        let name = names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("column{}", idx + 1));
        columns.push(TargetEntry::real(expr, idx as u32 + 1, name));
    }

    if let Some(value) = flag {
        columns.push(TargetEntry::auxiliary(
            ScalarExpr::int_literal(value),
            want_types.len() as u32 + 1,
            "flag",
        ));
    }

    Ok(OutputSchema::new(columns))
}

/// Coerce an expression to a target type. An untyped literal is retyped in
/// place rather than wrapped, so its value participates in later inference.
fn coerce_to_type(expr: ScalarExpr, target: TypeId) -> ScalarExpr {
    match expr {
        ScalarExpr::Literal { value, ty } if ty == TypeId::Unknown => ScalarExpr::Literal {
            value,
            ty: target,
        },
        other => ScalarExpr::Cast {
            arg: Box::new(other),
            target: ColumnType::new(target),
        },
    }
}

/// Generate the schema of a concatenation node.
///
/// Every entry is a positional reference to the node's output. Per-column
/// precision metadata is kept only when every operand agrees on it;
/// otherwise it is widened to unspecified. With `flag`, an auxiliary
/// provenance column is appended, shown as copied up from the operands.
fn generate_append_schema(
    want_types: &[ColumnType],
    want_collations: &[Option<Collation>],
    flag: bool,
    input_schemas: &[&OutputSchema],
    names: &[String],
) -> OutputSchema {
    let mut columns = Vec::with_capacity(want_types.len() + 1);
    for (idx, (want, want_coll)) in want_types.iter().zip(want_collations).enumerate() {
        let mut precision = None;
        let mut agreed = true;
        for schema in input_schemas {
            let Some(col) = schema.real_columns().nth(idx) else {
                agreed = false;
                break;
            };
            let ty = col.expr.column_type();
            if ty.id != want.id {
                agreed = false;
                break;
            }
            match precision {
                None => precision = Some(ty.precision),
                Some(p) if p != ty.precision => {
                    agreed = false;
                    break;
                }
                Some(_) => {}
            }
        }
        let precision = if agreed {
            precision.unwrap_or(UNSPECIFIED_PRECISION)
        } else {
            UNSPECIFIED_PRECISION
        };

        let name = names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("column{}", idx + 1));
        columns.push(TargetEntry::real(
            ScalarExpr::column(
                RelId::OUTPUT,
                idx as u32 + 1,
                ColumnType::with_precision(want.id, precision),
                *want_coll,
            ),
            idx as u32 + 1,
            name,
        ));
    }

    if flag {
        columns.push(TargetEntry::auxiliary(
            ScalarExpr::column(
                RelId::OUTPUT,
                want_types.len() as u32 + 1,
                ColumnType::new(TypeId::Int32),
                None,
            ),
            want_types.len() as u32 + 1,
            "flag",
        ));
    }

    OutputSchema::new(columns)
}

/// Copy the node's grouping directives, installing the grouping references
/// the generated schema assigned to its real columns.
fn generate_setop_grouplist(
    grouping: &[SetOpGroupClause],
    schema: &OutputSchema,
) -> Vec<SetOpGroupClause> {
    debug_assert_eq!(grouping.len(), schema.real_count());
    grouping
        .iter()
        .zip(schema.real_columns())
        .map(|(clause, entry)| {
            debug_assert_eq!(entry.grouping_ref, entry.position);
            SetOpGroupClause {
                group_ref: entry.grouping_ref,
                ..clause.clone()
            }
        })
        .collect()
}

/// Whether a generated schema projects the input onto itself: every column a
/// bare positional reference with nothing inserted, dropped, or reordered.
fn projection_is_trivial(input: &PhysicalPlan, schema: &OutputSchema) -> bool {
    schema.columns.len() == input.schema.columns.len()
        && schema
            .columns
            .iter()
            .zip(&input.schema.columns)
            .all(|(new, old)| {
                new.auxiliary == old.auxiliary
                    && match new.expr.as_column() {
                        Some(var) => var.ordinal == new.position && var.levels_up == 0,
                        None => false,
                    }
            })
}

/// Apply a schema-adapting projection to a plan. A projection that changes
/// nothing structurally just replaces the plan's schema -- no projection
/// layer, no cost.
fn apply_projection(input: PhysicalPlan, schema: OutputSchema) -> PhysicalPlan {
    if projection_is_trivial(&input, &schema) {
        let mut out = input;
        out.schema = schema;
        return out;
    }
    let cost = cost_project(&input.cost, input.rows);
    PhysicalPlan {
        op: PlanOp::Project,
        schema,
        rows: input.rows,
        cost,
        distribution: input.distribution.clone(),
        inputs: vec![input],
    }
}

/// Concatenate operands into one node. The result's distribution is the
/// operands' common distribution, or sharded-with-no-key when they disagree.
fn make_append(operands: Vec<PhysicalPlan>, schema: OutputSchema) -> PhysicalPlan {
    let rows = operands.iter().map(|p| p.rows).sum();
    let costs: Vec<Cost> = operands.iter().map(|p| p.cost).collect();
    let cost = cost_append(&costs);
    let distribution = match operands.split_first() {
        Some((head, tail)) if tail.iter().all(|p| p.distribution == head.distribution) => {
            head.distribution.clone()
        }
        _ => Distribution::Sharded(Vec::new()),
    };
    PhysicalPlan {
        op: PlanOp::Append,
        schema,
        rows,
        cost,
        distribution,
        inputs: operands,
    }
}

/// Redistribute operands so that rows equal on the grouping columns land on
/// one execution unit, unless their common distribution already guarantees
/// it.
fn reconcile_for_grouping(operands: Vec<PhysicalPlan>, group_cols: &[u32]) -> Vec<PhysicalPlan> {
    let compatible = match operands.split_first() {
        Some((head, tail)) => {
            tail.iter().all(|p| p.distribution == head.distribution)
                && head.distribution.valid_for_grouping(group_cols)
        }
        None => true,
    };
    if compatible {
        return operands;
    }
    let target = Distribution::Sharded(group_cols.to_vec());
    operands
        .into_iter()
        .map(|p| {
            if p.distribution == target {
                p
            } else {
                make_redistribute(p, target.clone())
            }
        })
        .collect()
}

fn make_redistribute(input: PhysicalPlan, distribution: Distribution) -> PhysicalPlan {
    let width = input.schema.estimated_width();
    let cost = cost_redistribute(&input.cost, input.rows, width);
    PhysicalPlan {
        op: PlanOp::Redistribute,
        schema: input.schema.clone(),
        rows: input.rows,
        cost,
        distribution,
        inputs: vec![input],
    }
}

fn make_sort(input: PhysicalPlan, sort_refs: Vec<u32>) -> PhysicalPlan {
    let width = input.schema.estimated_width();
    let cost = cost_sort(&input.cost, input.rows, width);
    PhysicalPlan {
        op: PlanOp::Sort { sort_refs },
        schema: input.schema.clone(),
        rows: input.rows,
        cost,
        distribution: input.distribution.clone(),
        inputs: vec![input],
    }
}

fn make_hash_dedup(input: PhysicalPlan, group_refs: Vec<u32>, groups: f64) -> PhysicalPlan {
    let cost = cost_hash_grouping(&input.cost, input.rows, group_refs.len(), groups);
    PhysicalPlan {
        op: PlanOp::HashDedup { group_refs },
        schema: input.schema.clone(),
        rows: groups,
        cost,
        distribution: input.distribution.clone(),
        inputs: vec![input],
    }
}

fn make_unique(input: PhysicalPlan, group_refs: Vec<u32>, groups: f64) -> PhysicalPlan {
    let cost = cost_stream_grouping(&input.cost, input.rows, group_refs.len(), groups);
    PhysicalPlan {
        op: PlanOp::Unique { group_refs },
        schema: input.schema.clone(),
        rows: groups,
        cost,
        distribution: input.distribution.clone(),
        inputs: vec![input],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_schema(types: &[ColumnType]) -> OutputSchema {
        OutputSchema::new(
            types
                .iter()
                .enumerate()
                .map(|(i, ty)| {
                    TargetEntry::real(
                        ScalarExpr::column(RelId(1), i as u32 + 1, *ty, None),
                        i as u32 + 1,
                        format!("c{}", i + 1),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn append_schema_keeps_unanimous_precision() {
        let a = ref_schema(&[ColumnType::with_precision(TypeId::Numeric, 10)]);
        let b = ref_schema(&[ColumnType::with_precision(TypeId::Numeric, 10)]);
        let want = [ColumnType::new(TypeId::Numeric)];
        let schema = generate_append_schema(&want, &[None], false, &[&a, &b], &[]);
        assert_eq!(
            schema.columns[0].expr.column_type(),
            ColumnType::with_precision(TypeId::Numeric, 10)
        );
    }

    #[test]
    fn append_schema_widens_disagreeing_precision() {
        let a = ref_schema(&[ColumnType::with_precision(TypeId::Numeric, 10)]);
        let b = ref_schema(&[ColumnType::with_precision(TypeId::Numeric, 12)]);
        let want = [ColumnType::new(TypeId::Numeric)];
        let schema = generate_append_schema(&want, &[None], false, &[&a, &b], &[]);
        assert_eq!(
            schema.columns[0].expr.column_type(),
            ColumnType::new(TypeId::Numeric)
        );
    }

    #[test]
    fn untyped_literal_retyped_in_place() {
        let coerced = coerce_to_type(
            ScalarExpr::Literal {
                value: setopx_core::types::ScalarValue::Utf8("42".into()),
                ty: TypeId::Unknown,
            },
            TypeId::Int64,
        );
        assert!(matches!(
            coerced,
            ScalarExpr::Literal {
                ty: TypeId::Int64,
                ..
            }
        ));

        let wrapped = coerce_to_type(
            ScalarExpr::column(RelId(1), 1, ColumnType::new(TypeId::Int32), None),
            TypeId::Int64,
        );
        assert!(matches!(wrapped, ScalarExpr::Cast { .. }));
    }

    #[test]
    fn setop_schema_marks_grouping_refs() {
        let input = ref_schema(&[ColumnType::new(TypeId::Int32), ColumnType::new(TypeId::Text)]);
        let want = [ColumnType::new(TypeId::Int32), ColumnType::new(TypeId::Text)];
        let schema =
            generate_setop_schema(&want, &[None, None], Some(1), RelId(4), true, &input, &[])
                .unwrap();
        assert!(schema.grouping_refs_consistent());
        assert_eq!(schema.real_count(), 2);
        let flag = schema.columns.last().unwrap();
        assert!(flag.auxiliary);
        assert_eq!(flag.grouping_ref, 0);
        assert!(flag.expr.is_literal());
    }
}
