//! Size gate between diff computation and live-buffer replay.
//!
//! Incremental replay cost grows with the number of discrete operations;
//! past a threshold a whole-buffer replace is both cheaper and safer, at
//! the price of losing fine-grained cursor and scroll preservation. The
//! gate is evaluated after [`crate::cleanup`] and before any mutation, and
//! tripping it is the expected outcome for pathological diffs (for example
//! a file whose line endings were globally converted), not a bug condition.

use crate::diff::EditScript;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a script's cost is measured against the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostModel {
    /// Count INSERT and DELETE operations; EQUAL context is free.
    #[default]
    EditOps,
    /// Count total payload characters across all operations.
    TotalLen,
}

/// A configured bound on acceptable script cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimit {
    pub max: usize,
    pub model: CostModel,
}

impl SizeLimit {
    pub fn edit_ops(max: usize) -> Self {
        Self {
            max,
            model: CostModel::EditOps,
        }
    }

    pub fn total_len(max: usize) -> Self {
        Self {
            max,
            model: CostModel::TotalLen,
        }
    }

    pub fn cost_of(&self, script: &EditScript) -> usize {
        match self.model {
            CostModel::EditOps => script.edit_count(),
            CostModel::TotalLen => script.text_len(),
        }
    }
}

/// Signal that a script is too expensive to replay incrementally.
///
/// Recoverable by design: the documented response is to discard the script
/// and replace the whole content instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("edit script cost {cost} exceeds limit {limit}")]
pub struct TooManyOperations {
    pub cost: usize,
    pub limit: usize,
}

/// Pass the script through unchanged when its cost is within `limit`,
/// otherwise report [`TooManyOperations`].
pub fn check_size(script: EditScript, limit: &SizeLimit) -> Result<EditScript, TooManyOperations> {
    let cost = limit.cost_of(&script);
    if cost > limit.max {
        return Err(TooManyOperations {
            cost,
            limit: limit.max,
        });
    }
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::cleanup;
    use crate::diff::diff;

    #[test]
    fn test_within_limit_passes_through() {
        let script = cleanup(&diff("hello world", "hello there"));
        let passed = check_size(script.clone(), &SizeLimit::edit_ops(10)).unwrap();
        assert_eq!(passed, script);
    }

    #[test]
    fn test_zero_limit_rejects_any_edit() {
        let script = diff("foo", "bar");
        let err = check_size(script, &SizeLimit::edit_ops(0)).unwrap_err();
        assert_eq!(err.limit, 0);
        assert!(err.cost > 0);
    }

    #[test]
    fn test_zero_limit_accepts_identity_under_edit_ops() {
        // An all-EQUAL script has no mutations to count.
        let script = diff("same", "same");
        assert!(check_size(script, &SizeLimit::edit_ops(0)).is_ok());
    }

    #[test]
    fn test_total_len_counts_context() {
        let script = diff("hello world", "hello there");
        // Total payload length includes the shared "hello " context.
        let err = check_size(script.clone(), &SizeLimit::total_len(5)).unwrap_err();
        assert!(err.cost > 5);
        assert!(check_size(script, &SizeLimit::total_len(10_000)).is_ok());
    }

    #[test]
    fn test_cost_at_exact_limit_passes() {
        let script = diff("foo", "bar");
        let cost = SizeLimit::edit_ops(0).cost_of(&script);
        assert!(check_size(script, &SizeLimit::edit_ops(cost)).is_ok());
    }
}
