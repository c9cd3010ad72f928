//! Result collector.
//!
//! Snapshots a context into the report handed back to the host. Works the
//! same after success and after failure.

use scriptbox_core::{ScriptExecutionResult, VariableTier};

use crate::context::ScriptContext;

/// Build the report for `context` as it stands now.
///
/// The collection, folder, request and global tiers are written back into
/// the request's variable bags so the host can persist them.
pub fn collect(context: &ScriptContext) -> ScriptExecutionResult {
    let scope = context.scope.borrow();

    let mut request = context.request.borrow().snapshot().clone();
    request.global_environment_variables = scope.tier(VariableTier::GlobalEnvironment).clone();
    request.collection_variables = scope.tier(VariableTier::Collection).clone();
    request.folder_variables = scope.tier(VariableTier::Folder).clone();
    request.request_variables = scope.tier(VariableTier::Request).clone();

    ScriptExecutionResult {
        request,
        env_variables: scope.tier(VariableTier::Environment).clone(),
        runtime_variables: scope.tier(VariableTier::Runtime).clone(),
        global_environment_variables: scope.tier(VariableTier::GlobalEnvironment).clone(),
        results: context.recorder.borrow().results(),
        next_request_name: context.next_request.borrow().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbox_core::{AssertionResult, RequestSnapshot, ResponseSnapshot};
    use serde_json::json;

    #[test]
    fn test_collect_writes_tiers_back() {
        let request: RequestSnapshot = serde_json::from_value(json!({
            "method": "GET",
            "collectionVariables": {"a": 1}
        }))
        .unwrap();
        let context = ScriptContext::builder(request, ResponseSnapshot::default()).build();

        {
            let mut scope = context.scope.borrow_mut();
            scope.set(VariableTier::Collection, "b", json!(2)).unwrap();
            scope.set(VariableTier::Runtime, "token", json!("t")).unwrap();
            scope.set(VariableTier::GlobalEnvironment, "g", json!(true)).unwrap();
        }
        context.recorder.borrow_mut().record(AssertionResult::pass("ok"));
        *context.next_request.borrow_mut() = Some("Logout".into());

        let result = collect(&context);
        assert_eq!(result.request.method, "GET");
        assert_eq!(result.request.collection_variables, *json!({"a": 1, "b": 2}).as_object().unwrap());
        assert_eq!(result.runtime_variables.get("token"), Some(&json!("t")));
        assert_eq!(result.global_environment_variables.get("g"), Some(&json!(true)));
        assert_eq!(result.request.global_environment_variables.get("g"), Some(&json!(true)));
        assert_eq!(result.results, vec![AssertionResult::pass("ok")]);
        assert_eq!(result.next_request_name.as_deref(), Some("Logout"));
    }
}
