//! # Error Taxonomy
//!
//! Three fatal error classes cover everything the planning core can fail on:
//!
//! - `FeatureNotSupported`: the statement asks for something no physical
//!   strategy can implement (a set operation whose column types are neither
//!   sortable nor hashable, a set operation over zero comparison columns, a
//!   recursive union whose operator is not UNION or whose columns cannot be
//!   hashed). Reported to the caller verbatim, never retried.
//! - `SchemaMismatch`: a descendant's column layout diverges from the declared
//!   parent schema, or a translated column cannot be found. Indicates catalog
//!   drift and aborts planning of the statement.
//! - `ResourceExhausted`: the set-operation tree is nested beyond the
//!   configured depth limit. Reported before any stack damage occurs.
//!
//! Expected conditions -- an inaccessible or vanished descendant during
//! expansion -- are absorbed locally (skip the member, or revert the reference
//! to unexpanded) and never surface through this enum. No partial results are
//! produced: a fatal error discards the whole plan attempt.

/// Fatal planning errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// No usable physical strategy exists for the requested construct.
    #[error("could not implement {construct}: {detail}")]
    FeatureNotSupported { construct: String, detail: String },
    /// A descendant's schema diverges from the declared parent schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// The set-operation tree is nested too deeply to plan safely.
    #[error("set-operation tree is nested too deeply (limit {limit})")]
    ResourceExhausted { limit: u32 },
}

impl PlanError {
    /// Shorthand for `FeatureNotSupported`.
    pub fn unsupported(construct: impl Into<String>, detail: impl Into<String>) -> Self {
        PlanError::FeatureNotSupported {
            construct: construct.into(),
            detail: detail.into(),
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
