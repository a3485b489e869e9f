//! # Attribute Rewriter
//!
//! Restates an expression, filter clause, or query fragment written against
//! an append-relation parent so that it applies to one specific child. Column
//! references go through the append-relation record's column map; everything
//! derived from the old relation identity (relid sets, cached costs and
//! selectivities, bare relation-id fields in join trees) is repaired or
//! invalidated along the way.
//!
//! ## Depth tracking
//!
//! The rewriter tracks how many query-fragment boundaries it has descended
//! through. A column reference is translated only when its `levels_up`
//! equals the current depth -- references with other depths belong to other
//! fragments. Bare relation-id fields (cursor targets, join-tree leaf slots,
//! join node identities) exist only in the fragment being rewritten, so they
//! are substituted only at depth 0.
//!
//! ## Shared subplans
//!
//! A non-one-time subplan reference is duplicated (plan plus its private
//! planning context) on first rewrite and the duplicate registered in the
//! statement-wide registry, so the translated reference can later diverge
//! from the original. One-time references are left untouched.

use setopx_core::context::{AppendRelInfo, PlannerContext};
use setopx_core::error::{PlanError, PlanResult};
use setopx_core::expr::ScalarExpr;
use setopx_core::query::{CommandKind, FilterClause, FromItem, QueryFragment, SetOpNode};
use setopx_core::relids::adjust_relid_set;
use setopx_core::schema::TargetEntry;
use setopx_core::types::RelId;

/// Rewriting state for one parent/child pair.
pub struct AppendRelRewrite<'a> {
    ctx: &'a mut PlannerContext,
    appinfo: &'a AppendRelInfo,
    depth: u32,
}

/// Translate a whole query fragment from the parent to the child.
///
/// If the fragment's mutation target is the parent, it is redirected to the
/// child; for an update-style fragment the output-column positions are then
/// re-derived, since a column added after the fact to only some descendants
/// can shift the child's numbering.
pub fn adjust_appendrel_attrs(
    ctx: &mut PlannerContext,
    appinfo: &AppendRelInfo,
    query: &QueryFragment,
) -> PlanResult<QueryFragment> {
    let mut rw = AppendRelRewrite {
        ctx,
        appinfo,
        depth: 0,
    };
    let mut out = rw.rewrite_query_body(query)?;
    if out.result_relation == Some(appinfo.parent_rel) {
        out.result_relation = Some(appinfo.child_rel);
        if out.command == CommandKind::Update {
            out.target_list = adjust_inherited_tlist(out.target_list, appinfo)?;
        }
    }
    Ok(out)
}

/// Translate a bare expression from the parent to the child.
pub fn adjust_appendrel_attrs_expr(
    ctx: &mut PlannerContext,
    appinfo: &AppendRelInfo,
    expr: &ScalarExpr,
) -> PlanResult<ScalarExpr> {
    AppendRelRewrite {
        ctx,
        appinfo,
        depth: 0,
    }
    .rewrite_expr(expr)
}

/// Translate a filter clause from the parent to the child, rebuilding its
/// relid sets and invalidating its derived caches.
pub fn adjust_appendrel_attrs_filter(
    ctx: &mut PlannerContext,
    appinfo: &AppendRelInfo,
    clause: &FilterClause,
) -> PlanResult<FilterClause> {
    AppendRelRewrite {
        ctx,
        appinfo,
        depth: 0,
    }
    .rewrite_filter(clause)
}

/// Restate an expression for a descendant several append levels below its
/// ancestor by composing single-level rewrites from the root downward.
pub fn adjust_appendrel_attrs_multilevel(
    ctx: &mut PlannerContext,
    expr: &ScalarExpr,
    child: RelId,
) -> PlanResult<ScalarExpr> {
    let appinfo = ctx
        .append_rel_info_for_child(child)
        .cloned()
        .ok_or_else(|| {
            PlanError::SchemaMismatch(format!("relation {child} is not an append-relation child"))
        })?;
    // If the parent is itself a child of some higher append relation, apply
    // the higher levels first.
    let expr = if ctx.append_rel_info_for_child(appinfo.parent_rel).is_some() {
        adjust_appendrel_attrs_multilevel(ctx, expr, appinfo.parent_rel)?
    } else {
        expr.clone()
    };
    adjust_appendrel_attrs_expr(ctx, &appinfo, &expr)
}

impl AppendRelRewrite<'_> {
    fn parent(&self) -> RelId {
        self.appinfo.parent_rel
    }

    fn child(&self) -> RelId {
        self.appinfo.child_rel
    }

    /// Rewrite a fragment's contents without crossing a fragment boundary:
    /// used for the entry fragment (depth stays 0). Nested fragments reached
    /// through expressions go through [`Self::rewrite_expr`], which
    /// increments the depth around the recursion.
    fn rewrite_query_body(&mut self, q: &QueryFragment) -> PlanResult<QueryFragment> {
        let target_list = q
            .target_list
            .iter()
            .map(|t| {
                Ok(TargetEntry {
                    expr: self.rewrite_expr(&t.expr)?,
                    ..t.clone()
                })
            })
            .collect::<PlanResult<Vec<_>>>()?;
        let quals = q.quals.as_ref().map(|e| self.rewrite_expr(e)).transpose()?;
        let from = q
            .from
            .iter()
            .map(|f| self.rewrite_from_item(f))
            .collect::<PlanResult<Vec<_>>>()?;
        let set_operations = q
            .set_operations
            .as_ref()
            .map(|s| self.rewrite_setop(s))
            .transpose()?;
        Ok(QueryFragment {
            command: q.command,
            result_relation: q.result_relation,
            target_list,
            quals,
            from,
            set_operations,
            has_aggregates: q.has_aggregates,
            has_grouping: q.has_grouping,
            has_distinct: q.has_distinct,
        })
    }

    fn rewrite_from_item(&mut self, item: &FromItem) -> PlanResult<FromItem> {
        match item {
            FromItem::Relation(rel) => Ok(FromItem::Relation(self.substitute_rel(*rel))),
            FromItem::Join {
                kind,
                left,
                right,
                on,
                rel,
            } => Ok(FromItem::Join {
                kind: *kind,
                left: Box::new(self.rewrite_from_item(left)?),
                right: Box::new(self.rewrite_from_item(right)?),
                on: on.as_ref().map(|e| self.rewrite_expr(e)).transpose()?,
                rel: rel.map(|r| self.substitute_rel(r)),
            }),
        }
    }

    fn rewrite_setop(&mut self, node: &SetOpNode) -> PlanResult<SetOpNode> {
        match node {
            SetOpNode::Leaf { rel } => Ok(SetOpNode::Leaf {
                rel: self.substitute_rel(*rel),
            }),
            SetOpNode::Combine {
                kind,
                all,
                left,
                right,
                col_types,
                col_collations,
                grouping,
            } => Ok(SetOpNode::Combine {
                kind: *kind,
                all: *all,
                left: Box::new(self.rewrite_setop(left)?),
                right: Box::new(self.rewrite_setop(right)?),
                col_types: col_types.clone(),
                col_collations: col_collations.clone(),
                grouping: grouping.clone(),
            }),
        }
    }

    /// Substitute a bare relation-id field. Only meaningful at depth 0: bare
    /// id fields belong to the fragment being rewritten.
    fn substitute_rel(&self, rel: RelId) -> RelId {
        if self.depth == 0 && rel == self.parent() {
            self.child()
        } else {
            rel
        }
    }

    pub fn rewrite_expr(&mut self, expr: &ScalarExpr) -> PlanResult<ScalarExpr> {
        match expr {
            ScalarExpr::Column(v) => {
                if v.levels_up == self.depth && v.rel == self.parent() {
                    self.translate_column(v.ordinal)
                } else {
                    Ok(expr.clone())
                }
            }
            ScalarExpr::WholeRow {
                rel,
                row_type,
                levels_up,
            } => {
                if *levels_up == self.depth && *rel == self.parent() {
                    self.translate_whole_row(*row_type, *levels_up)
                } else {
                    Ok(expr.clone())
                }
            }
            ScalarExpr::Literal { .. } => Ok(expr.clone()),
            ScalarExpr::Cast { arg, target } => Ok(ScalarExpr::Cast {
                arg: Box::new(self.rewrite_expr(arg)?),
                target: *target,
            }),
            ScalarExpr::Relabel { arg, collation } => Ok(ScalarExpr::Relabel {
                arg: Box::new(self.rewrite_expr(arg)?),
                collation: *collation,
            }),
            ScalarExpr::ConvertRow { arg, target } => Ok(ScalarExpr::ConvertRow {
                arg: Box::new(self.rewrite_expr(arg)?),
                target: *target,
            }),
            ScalarExpr::Row {
                fields,
                names,
                row_type,
            } => Ok(ScalarExpr::Row {
                fields: fields
                    .iter()
                    .map(|f| self.rewrite_expr(f))
                    .collect::<PlanResult<Vec<_>>>()?,
                names: names.clone(),
                row_type: *row_type,
            }),
            ScalarExpr::CurrentOf { rel } => Ok(ScalarExpr::CurrentOf {
                rel: self.substitute_rel(*rel),
            }),
            ScalarExpr::Placeholder {
                expr: inner,
                rels,
                levels_up,
            } => {
                let inner = Box::new(self.rewrite_expr(inner)?);
                // The placeholder's relid set is translated only when its
                // nesting depth matches the current one.
                let rels = if *levels_up == self.depth && rels.contains(self.parent()) {
                    let mut r = rels.clone();
                    r.remove(self.parent());
                    r.insert(self.child());
                    r
                } else {
                    rels.clone()
                };
                Ok(ScalarExpr::Placeholder {
                    expr: inner,
                    rels,
                    levels_up: *levels_up,
                })
            }
            ScalarExpr::SubplanRef { id, one_time } => {
                if *one_time {
                    Ok(expr.clone())
                } else {
                    let new_id = self.ctx.duplicate_subplan(*id);
                    Ok(ScalarExpr::SubplanRef {
                        id: new_id,
                        one_time: false,
                    })
                }
            }
            ScalarExpr::Subquery(q) => {
                self.depth += 1;
                let result = self.rewrite_query_body(q);
                self.depth -= 1;
                Ok(ScalarExpr::Subquery(Box::new(result?)))
            }
            ScalarExpr::BinaryOp { op, left, right } => Ok(ScalarExpr::BinaryOp {
                op: *op,
                left: Box::new(self.rewrite_expr(left)?),
                right: Box::new(self.rewrite_expr(right)?),
            }),
            ScalarExpr::UnaryOp { op, operand } => Ok(ScalarExpr::UnaryOp {
                op: *op,
                operand: Box::new(self.rewrite_expr(operand)?),
            }),
            ScalarExpr::Function {
                name,
                args,
                ty,
                collation,
            } => Ok(ScalarExpr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.rewrite_expr(a))
                    .collect::<PlanResult<Vec<_>>>()?,
                ty: *ty,
                collation: *collation,
            }),
            ScalarExpr::And(exprs) => Ok(ScalarExpr::And(
                exprs
                    .iter()
                    .map(|e| self.rewrite_expr(e))
                    .collect::<PlanResult<Vec<_>>>()?,
            )),
            ScalarExpr::Or(exprs) => Ok(ScalarExpr::Or(
                exprs
                    .iter()
                    .map(|e| self.rewrite_expr(e))
                    .collect::<PlanResult<Vec<_>>>()?,
            )),
        }
    }

    /// Translate a simple column reference through the map.
    fn translate_column(&self, ordinal: u32) -> PlanResult<ScalarExpr> {
        let slot = self
            .appinfo
            .column_map
            .get(ordinal as usize - 1)
            .ok_or_else(|| self.missing_column(ordinal))?;
        let translated = slot.as_ref().ok_or_else(|| self.missing_column(ordinal))?;
        let mut out = translated.clone();
        add_levels(&mut out, self.depth);
        Ok(out)
    }

    /// Translate a whole-row reference. With a compatible named row type on
    /// the child, a non-evaluating row-type relabel suffices; without one
    /// there is no shared type to convert through, so the row is built
    /// explicitly from the translated columns, labeled with the parent's
    /// declared names.
    fn translate_whole_row(
        &mut self,
        parent_row_type: Option<setopx_core::types::RowTypeId>,
        levels_up: u32,
    ) -> PlanResult<ScalarExpr> {
        debug_assert_eq!(parent_row_type, self.appinfo.parent_row_type);
        if let Some(child_type) = self.appinfo.child_row_type {
            let child_var = ScalarExpr::WholeRow {
                rel: self.child(),
                row_type: Some(child_type),
                levels_up,
            };
            if self.appinfo.parent_row_type == Some(child_type) {
                return Ok(child_var);
            }
            let target = self.appinfo.parent_row_type.ok_or_else(|| {
                PlanError::SchemaMismatch(format!(
                    "relation {} has no row type to convert child rows to",
                    self.parent()
                ))
            })?;
            return Ok(ScalarExpr::ConvertRow {
                arg: Box::new(child_var),
                target,
            });
        }

        let names = self.ctx.entry(self.parent()).column_names.clone();
        let mut fields = Vec::with_capacity(self.appinfo.column_map.len());
        let mut field_names = Vec::with_capacity(self.appinfo.column_map.len());
        for (idx, slot) in self.appinfo.column_map.iter().enumerate() {
            let translated = slot
                .as_ref()
                .ok_or_else(|| self.missing_column(idx as u32 + 1))?;
            let mut field = translated.clone();
            add_levels(&mut field, self.depth);
            fields.push(field);
            field_names.push(names.get(idx).cloned().unwrap_or_default());
        }
        Ok(ScalarExpr::Row {
            fields,
            names: field_names,
            row_type: None,
        })
    }

    fn missing_column(&self, ordinal: u32) -> PlanError {
        PlanError::SchemaMismatch(format!(
            "column {ordinal} of relation {} does not exist in child relation {}",
            self.parent(),
            self.child()
        ))
    }

    /// Translate a filter clause: rewrite the expression, rebuild the relid
    /// sets, and invalidate every derived field that depended on the old
    /// relation identity. Equivalence-class membership is preserved -- a
    /// child column is implicitly equivalent to its parent -- but the
    /// per-side member ids are not.
    pub fn rewrite_filter(&mut self, f: &FilterClause) -> PlanResult<FilterClause> {
        let clause = self.rewrite_expr(&f.clause)?;
        let (old, new) = (self.parent(), self.child());
        Ok(FilterClause {
            clause,
            clause_rels: adjust_relid_set(&f.clause_rels, old, new),
            required_rels: adjust_relid_set(&f.required_rels, old, new),
            outer_rels: adjust_relid_set(&f.outer_rels, old, new),
            nullable_rels: adjust_relid_set(&f.nullable_rels, old, new),
            left_rels: adjust_relid_set(&f.left_rels, old, new),
            right_rels: adjust_relid_set(&f.right_rels, old, new),
            cache: None,
            left_ec: f.left_ec,
            right_ec: f.right_ec,
            left_member: None,
            right_member: None,
        })
    }
}

/// Shift a translated expression's column references down by `n` fragment
/// levels, so a substitution performed inside a nested fragment still points
/// at the owning fragment's relations.
fn add_levels(expr: &mut ScalarExpr, n: u32) {
    if n == 0 {
        return;
    }
    match expr {
        ScalarExpr::Column(v) => v.levels_up += n,
        ScalarExpr::WholeRow { levels_up, .. } => *levels_up += n,
        ScalarExpr::Placeholder {
            expr: inner,
            levels_up,
            ..
        } => {
            *levels_up += n;
            add_levels(inner, n);
        }
        ScalarExpr::Literal { .. }
        | ScalarExpr::CurrentOf { .. }
        | ScalarExpr::SubplanRef { .. }
        | ScalarExpr::Subquery(_) => {}
        ScalarExpr::Cast { arg, .. }
        | ScalarExpr::Relabel { arg, .. }
        | ScalarExpr::ConvertRow { arg, .. } => add_levels(arg, n),
        ScalarExpr::Row { fields, .. } => {
            for f in fields {
                add_levels(f, n);
            }
        }
        ScalarExpr::BinaryOp { left, right, .. } => {
            add_levels(left, n);
            add_levels(right, n);
        }
        ScalarExpr::UnaryOp { operand, .. } => add_levels(operand, n),
        ScalarExpr::Function { args, .. } => {
            for a in args {
                add_levels(a, n);
            }
        }
        ScalarExpr::And(exprs) | ScalarExpr::Or(exprs) => {
            for e in exprs {
                add_levels(e, n);
            }
        }
    }
}

/// Re-derive the output-column positions of an inherited update's target
/// list after translation.
///
/// The expressions have already been rewritten; what can still be stale are
/// the positions, because a column added after the fact to only some
/// descendants shifts the child's numbering. If no real column's position
/// actually changed, the input is returned unchanged. Otherwise the real
/// columns are rebuilt in strictly ascending position order and the
/// auxiliary columns are appended afterwards with fresh sequential
/// positions.
pub fn adjust_inherited_tlist(
    tlist: Vec<TargetEntry>,
    appinfo: &AppendRelInfo,
) -> PlanResult<Vec<TargetEntry>> {
    let mut updated = tlist;
    let mut changed = false;

    for entry in updated.iter_mut().filter(|t| !t.auxiliary) {
        let slot = appinfo
            .column_map
            .get(entry.position as usize - 1)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| {
                PlanError::SchemaMismatch(format!(
                    "column {} of relation {} does not exist in child relation {}",
                    entry.position, appinfo.parent_rel, appinfo.child_rel
                ))
            })?;
        let child_var = slot.as_column().ok_or_else(|| {
            PlanError::SchemaMismatch(format!(
                "column {} of relation {} does not translate to a simple column",
                entry.position, appinfo.parent_rel
            ))
        })?;
        if entry.position != child_var.ordinal {
            entry.position = child_var.ordinal;
            changed = true;
        }
    }

    if !changed {
        return Ok(updated);
    }

    let (mut real, aux): (Vec<_>, Vec<_>) = updated.into_iter().partition(|t| !t.auxiliary);
    real.sort_by_key(|t| t.position);
    let mut next = real.last().map(|t| t.position + 1).unwrap_or(1);
    let mut out = real;
    for mut entry in aux {
        entry.position = next;
        next += 1;
        out.push(entry);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use setopx_core::context::{PlannerConfig, RangeTableEntry, SubplanEntry};
    use setopx_core::query::QueryFragment;
    use setopx_core::relids::RelIdSet;
    use setopx_core::types::{ColumnType, RowTypeId, TypeId};
    use std::sync::Arc;

    fn int_ty() -> ColumnType {
        ColumnType::new(TypeId::Int32)
    }

    /// Parent rel 1 with columns (a, b); child rel 2 with (b, a) swapped.
    fn swapped_appinfo() -> AppendRelInfo {
        AppendRelInfo {
            parent_rel: RelId(1),
            child_rel: RelId(2),
            parent_row_type: None,
            child_row_type: None,
            parent_table: setopx_core::types::TableId(10),
            column_map: vec![
                Some(ScalarExpr::column(RelId(2), 2, int_ty(), None)),
                Some(ScalarExpr::column(RelId(2), 1, int_ty(), None)),
            ],
        }
    }

    fn ctx_with_parent_names() -> PlannerContext {
        let mut ctx = PlannerContext::default();
        ctx.push_entry(
            RangeTableEntry::relation(
                setopx_core::types::TableId(10),
                setopx_core::catalog::RelationKind::Table,
            )
            .with_names(&["a", "b"]),
        );
        ctx.push_entry(RangeTableEntry::relation(
            setopx_core::types::TableId(11),
            setopx_core::catalog::RelationKind::Table,
        ));
        ctx
    }

    #[test]
    fn column_reference_translates_through_map() {
        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        let expr = ScalarExpr::column(RelId(1), 1, int_ty(), None);
        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &expr).unwrap();
        let var = out.as_column().unwrap();
        assert_eq!(var.rel, RelId(2));
        assert_eq!(var.ordinal, 2);
    }

    #[test]
    fn reference_at_other_depth_untouched() {
        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        let mut var = ScalarExpr::column(RelId(1), 1, int_ty(), None);
        if let ScalarExpr::Column(v) = &mut var {
            v.levels_up = 1;
        }
        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &var).unwrap();
        assert_eq!(out, var);
    }

    #[test]
    fn nested_fragment_reference_translates_with_bumped_level() {
        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        // A nested fragment referencing the parent one level up.
        let mut inner = QueryFragment::select();
        let mut var = ScalarExpr::column(RelId(1), 2, int_ty(), None);
        if let ScalarExpr::Column(v) = &mut var {
            v.levels_up = 1;
        }
        inner.quals = Some(var);
        let expr = ScalarExpr::Subquery(Box::new(inner));

        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &expr).unwrap();
        let ScalarExpr::Subquery(q) = out else {
            panic!("expected subquery")
        };
        let var = q.quals.as_ref().unwrap().as_column().unwrap();
        assert_eq!(var.rel, RelId(2));
        assert_eq!(var.ordinal, 1);
        assert_eq!(var.levels_up, 1);
    }

    #[test]
    fn whole_row_with_named_types_gets_relabel() {
        let mut ctx = ctx_with_parent_names();
        let mut appinfo = swapped_appinfo();
        appinfo.parent_row_type = Some(RowTypeId(100));
        appinfo.child_row_type = Some(RowTypeId(200));
        let expr = ScalarExpr::WholeRow {
            rel: RelId(1),
            row_type: Some(RowTypeId(100)),
            levels_up: 0,
        };
        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &expr).unwrap();
        let ScalarExpr::ConvertRow { arg, target } = out else {
            panic!("expected row-type relabel")
        };
        assert_eq!(target, RowTypeId(100));
        assert!(matches!(
            *arg,
            ScalarExpr::WholeRow {
                rel: RelId(2),
                row_type: Some(RowTypeId(200)),
                ..
            }
        ));
    }

    #[test]
    fn whole_row_without_named_type_builds_row() {
        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        let expr = ScalarExpr::WholeRow {
            rel: RelId(1),
            row_type: None,
            levels_up: 0,
        };
        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &expr).unwrap();
        let ScalarExpr::Row { fields, names, .. } = out else {
            panic!("expected row construction")
        };
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(fields[0].as_column().unwrap().ordinal, 2);
        assert_eq!(fields[1].as_column().unwrap().ordinal, 1);
    }

    #[test]
    fn filter_caches_cleared_equivalence_kept() {
        use setopx_core::cost::Cost;
        use setopx_core::query::ClauseCache;
        use setopx_core::types::{EquivClassId, EquivMemberId};

        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        let mut clause = FilterClause::new(
            ScalarExpr::column(RelId(1), 1, int_ty(), None),
            RelIdSet::from_iter([RelId(1), RelId(3)]),
        );
        clause.cache = Some(ClauseCache {
            eval_cost: Cost::new(1.0, 2.0),
            selectivity: 0.5,
            outer_selectivity: 0.5,
            left_bucket_size: 0.1,
            right_bucket_size: 0.1,
        });
        clause.left_ec = Some(EquivClassId(7));
        clause.left_member = Some(EquivMemberId(3));
        let untouched = Arc::clone(&clause.outer_rels);

        let out = adjust_appendrel_attrs_filter(&mut ctx, &appinfo, &clause).unwrap();
        assert!(out.cache.is_none());
        assert_eq!(out.left_ec, Some(EquivClassId(7)));
        assert!(out.left_member.is_none());
        assert!(out.clause_rels.contains(RelId(2)));
        assert!(!out.clause_rels.contains(RelId(1)));
        assert!(out.clause_rels.contains(RelId(3)));
        // A set that did not mention the parent stays shared.
        assert!(Arc::ptr_eq(&untouched, &out.outer_rels));
    }

    #[test]
    fn shared_subplan_duplicated_one_time_untouched() {
        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        let id = ctx.add_subplan(SubplanEntry {
            plan: QueryFragment::select(),
            config: PlannerConfig::default(),
        });

        let shared = ScalarExpr::SubplanRef {
            id,
            one_time: false,
        };
        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &shared).unwrap();
        let ScalarExpr::SubplanRef { id: new_id, .. } = out else {
            panic!("expected subplan reference")
        };
        assert_ne!(new_id, id);
        assert_eq!(ctx.subplans.len(), 2);

        let once = ScalarExpr::SubplanRef { id, one_time: true };
        let out = adjust_appendrel_attrs_expr(&mut ctx, &appinfo, &once).unwrap();
        assert_eq!(out, once);
        assert_eq!(ctx.subplans.len(), 2);
    }

    #[test]
    fn update_fragment_redirected_and_renumbered() {
        let mut ctx = ctx_with_parent_names();
        let appinfo = swapped_appinfo();
        let mut q = QueryFragment::select();
        q.command = CommandKind::Update;
        q.result_relation = Some(RelId(1));
        q.from = vec![FromItem::Relation(RelId(1))];
        q.target_list = vec![
            TargetEntry {
                expr: ScalarExpr::int_literal(1),
                position: 1,
                name: "a".into(),
                auxiliary: false,
                grouping_ref: 0,
            },
            TargetEntry {
                expr: ScalarExpr::column(RelId(1), 2, int_ty(), None),
                position: 2,
                name: "b".into(),
                auxiliary: false,
                grouping_ref: 0,
            },
            TargetEntry {
                expr: ScalarExpr::CurrentOf { rel: RelId(1) },
                position: 3,
                name: "ctid".into(),
                auxiliary: true,
                grouping_ref: 0,
            },
        ];

        let out = adjust_appendrel_attrs(&mut ctx, &appinfo, &q).unwrap();
        assert_eq!(out.result_relation, Some(RelId(2)));
        assert_eq!(out.from, vec![FromItem::Relation(RelId(2))]);
        // Parent position 1 maps to child ordinal 2 and vice versa, so the
        // real entries are re-sorted and the auxiliary entry renumbered.
        let positions: Vec<_> = out.target_list.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(out.target_list[0].name, "b");
        assert_eq!(out.target_list[1].name, "a");
        assert!(out.target_list[2].auxiliary);
    }

    #[test]
    fn unchanged_positions_return_input() {
        let identity = AppendRelInfo {
            parent_rel: RelId(1),
            child_rel: RelId(2),
            parent_row_type: None,
            child_row_type: None,
            parent_table: setopx_core::types::TableId(10),
            column_map: vec![
                Some(ScalarExpr::column(RelId(2), 1, int_ty(), None)),
                Some(ScalarExpr::column(RelId(2), 2, int_ty(), None)),
            ],
        };
        let tlist = vec![TargetEntry {
            expr: ScalarExpr::int_literal(5),
            position: 2,
            name: "b".into(),
            auxiliary: false,
            grouping_ref: 0,
        }];
        let out = adjust_inherited_tlist(tlist.clone(), &identity).unwrap();
        assert_eq!(out, tlist);
    }

    #[test]
    fn multilevel_composes_root_downward() {
        let mut ctx = ctx_with_parent_names();
        // Add a grandchild rel 3: child of rel 2, with another swap.
        ctx.push_entry(RangeTableEntry::relation(
            setopx_core::types::TableId(12),
            setopx_core::catalog::RelationKind::Table,
        ));
        ctx.append_rel_list.push(Arc::new(swapped_appinfo()));
        ctx.append_rel_list.push(Arc::new(AppendRelInfo {
            parent_rel: RelId(2),
            child_rel: RelId(3),
            parent_row_type: None,
            child_row_type: None,
            parent_table: setopx_core::types::TableId(11),
            column_map: vec![
                Some(ScalarExpr::column(RelId(3), 2, int_ty(), None)),
                Some(ScalarExpr::column(RelId(3), 1, int_ty(), None)),
            ],
        }));

        let expr = ScalarExpr::column(RelId(1), 1, int_ty(), None);
        let out = adjust_appendrel_attrs_multilevel(&mut ctx, &expr, RelId(3)).unwrap();
        // Two swaps cancel: parent column 1 ends up at grandchild ordinal 1.
        let var = out.as_column().unwrap();
        assert_eq!(var.rel, RelId(3));
        assert_eq!(var.ordinal, 1);
    }
}
