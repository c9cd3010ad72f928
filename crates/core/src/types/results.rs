use serde::{Deserialize, Serialize};

use super::snapshot::RequestSnapshot;
use super::variables::Variables;

// =============================================================================
// Result Types
// =============================================================================

/// Outcome of one `test(...)` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    /// Description passed to `test`.
    pub description: String,

    /// Whether the body completed without throwing.
    pub passed: bool,

    /// Message of the thrown error, for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: true,
            error: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// The report returned to the host after a run.
///
/// Every field is plain data so the report can cross a process or
/// serialization boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptExecutionResult {
    /// The request, including any script mutations and variable write-backs.
    pub request: RequestSnapshot,

    /// Environment tier after the run.
    pub env_variables: Variables,

    /// Runtime tier after the run.
    pub runtime_variables: Variables,

    /// Global environment tier after the run.
    pub global_environment_variables: Variables,

    /// Test outcomes in declaration order.
    pub results: Vec<AssertionResult>,

    /// Request the runner should execute next, if the script chose one.
    #[serde(default)]
    pub next_request_name: Option<String>,
}

impl ScriptExecutionResult {
    /// Whether every recorded test passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Number of failed tests.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }
}
