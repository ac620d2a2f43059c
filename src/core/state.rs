//! Execution state models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a pipeline, job or step
///
/// Every node starts `Pending` and ends in exactly one of the three terminal
/// states. A disabled node goes straight from `Pending` to `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Node has not started
    Pending,
    /// Node is currently running
    Executing,
    /// Node completed with exit code 0
    Passed,
    /// Node completed with a non-zero exit code
    Failed,
    /// Node was never executed (disabled, or an earlier sibling failed)
    Skipped,
}

impl NodeStatus {
    /// Check if the node has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Passed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "PENDING",
            NodeStatus::Executing => "EXECUTING",
            NodeStatus::Passed => "PASSED",
            NodeStatus::Failed => "FAILED",
            NodeStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Result of executing one node, reported on its terminal status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeResult {
    pub status: NodeStatus,
    pub exit_code: i32,
    pub elapsed_ms: u128,
}
