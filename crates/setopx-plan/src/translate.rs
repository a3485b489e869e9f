//! # Column Translator
//!
//! Builds the parent-column to child-expression map for one parent/child
//! pair of an append relation. Columns are matched by name: there is no
//! guarantee a child column sits at the same ordinal as in the parent
//! (columns added later, multiple inheritance), so the same-position slot is
//! tried first and a full scan follows. Type, precision, and collation must
//! match the parent's declaration exactly -- a divergence means the catalog
//! has drifted from the declared inheritance contract and planning aborts.

use setopx_core::catalog::ColumnMeta;
use setopx_core::error::{PlanError, PlanResult};
use setopx_core::expr::ScalarExpr;
use setopx_core::types::RelId;

/// Build the translation map from a parent's column layout to a child's.
///
/// The result has exactly one slot per parent column (dropped columns
/// included): `None` for a dropped parent column, else the child expression
/// standing in for it. With `same_relation` (the parent appearing as a plain
/// member of its own append relation) every slot is an identity positional
/// reference and no matching is needed.
pub fn build_column_map(
    parent: &[ColumnMeta],
    child: &[ColumnMeta],
    child_rel: RelId,
    same_relation: bool,
) -> PlanResult<Vec<Option<ScalarExpr>>> {
    let mut map = Vec::with_capacity(parent.len());

    for (old_idx, pcol) in parent.iter().enumerate() {
        if pcol.dropped {
            map.push(None);
            continue;
        }

        if same_relation {
            map.push(Some(ScalarExpr::column(
                child_rel,
                old_idx as u32 + 1,
                pcol.ty,
                pcol.collation,
            )));
            continue;
        }

        // Try the same ordinal first; the common case is an unchanged layout.
        let new_idx = match child.get(old_idx) {
            Some(ccol) if !ccol.dropped && ccol.name == pcol.name => old_idx,
            _ => child
                .iter()
                .position(|ccol| !ccol.dropped && ccol.name == pcol.name)
                .ok_or_else(|| {
                    PlanError::SchemaMismatch(format!(
                        "could not find inherited column \"{}\" in child relation {}",
                        pcol.name, child_rel
                    ))
                })?,
        };

        let ccol = &child[new_idx];
        if ccol.ty != pcol.ty {
            return Err(PlanError::SchemaMismatch(format!(
                "column \"{}\" of child relation {} does not match the parent's type",
                pcol.name, child_rel
            )));
        }
        if ccol.collation != pcol.collation {
            return Err(PlanError::SchemaMismatch(format!(
                "column \"{}\" of child relation {} does not match the parent's collation",
                pcol.name, child_rel
            )));
        }

        map.push(Some(ScalarExpr::column(
            child_rel,
            new_idx as u32 + 1,
            pcol.ty,
            pcol.collation,
        )));
    }

    Ok(map)
}
