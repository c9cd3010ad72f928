use std::process::Command;
use std::sync::Arc;

use serde_json::{json, Value};

use scriptbox_core::config::{AppConfig, BackendKind};
use scriptbox_core::mocks::{RecordingConsole, ScriptedRequestRunner};
use scriptbox_core::{RequestSnapshot, ResponseSnapshot};
use scriptbox_sandbox::{RunRequest, TestRuntime};

// =============================================================================
// Fixtures
// =============================================================================

const LOGIN_FLOW: &str = r#"
    const login = await bru.runRequest('auth/login');
    bru.setVar('token', login.body.token);
    req.setHeader('Authorization', bru.interpolate('Bearer {{token}}'));

    test('status is 200', () => expect(res.getStatus()).to.equal(200));
    test('has items', () => expect(res.body.items).to.be.an('array').that.is.not.empty);
    test('first item is priced', () => expect(res('items[0].price')).to.be.above(0));

    console.log('token', bru.getVar('token'));
    bru.setNextRequest('Checkout');
"#;

fn exchange() -> (RequestSnapshot, ResponseSnapshot) {
    let request = serde_json::from_value(json!({
        "method": "GET",
        "url": "https://shop.example.com/items",
        "name": "List items",
        "headers": {"Accept": "application/json"}
    }))
    .unwrap();
    let response = serde_json::from_value(json!({
        "status": 200,
        "statusText": "OK",
        "body": {"items": [{"id": 1, "price": 9.5}]}
    }))
    .unwrap();
    (request, response)
}

// =============================================================================
// System Tests
// =============================================================================

#[tokio::test]
async fn test_system_login_flow() -> anyhow::Result<()> {
    let config = AppConfig::load(None)?;
    assert_eq!(config.runtime.backend, BackendKind::Isolated);

    for backend in [BackendKind::Isolated, BackendKind::Embedded] {
        let mut runtime_config = config.runtime.clone();
        runtime_config.backend = backend;

        let (request, response) = exchange();
        let console = Arc::new(RecordingConsole::new());
        let runner = Arc::new(
            ScriptedRequestRunner::new()
                .with_response("auth/login", json!({"status": 200, "body": {"token": "t-123"}})),
        );

        let result = TestRuntime::new(runtime_config)
            .run(RunRequest {
                script: LOGIN_FLOW.into(),
                request,
                response,
                on_console_log: Some(console.clone()),
                run_request_by_path: Some(runner),
                scripting_config: config.scripting.clone(),
                ..Default::default()
            })
            .await?;

        assert_eq!(result.results.len(), 3, "{}", backend);
        assert!(result.results.iter().all(|r| r.passed), "{:?}", result.results);
        assert_eq!(result.runtime_variables["token"], json!("t-123"));
        assert_eq!(result.request.header("authorization"), Some(&json!("Bearer t-123")));
        assert_eq!(result.next_request_name.as_deref(), Some("Checkout"));
        assert_eq!(console.lines(), vec!["log: token t-123"]);
    }

    Ok(())
}

#[tokio::test]
async fn test_system_report_serializes() -> anyhow::Result<()> {
    let (request, response) = exchange();
    let failure = TestRuntime::default()
        .run(RunRequest {
            script: "test('a', () => {}); assert.fail('stop here');".into(),
            request,
            response,
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(failure.error.to_string(), "stop here");
    let report = serde_json::to_value(&failure.partial_results)?;
    assert_eq!(report["results"], json!([{"description": "a", "passed": true}]));
    assert_eq!(report["request"]["name"], json!("List items"));

    Ok(())
}

// =============================================================================
// CLI
// =============================================================================

fn cli(script: &str, extra: &[&str]) -> anyhow::Result<(bool, Value)> {
    let dir = tempfile::tempdir()?;
    let script_path = dir.path().join("script.js");
    let exchange_path = dir.path().join("exchange.json");
    std::fs::write(&script_path, script)?;
    std::fs::write(
        &exchange_path,
        json!({
            "request": {"method": "GET", "url": "https://example.com"},
            "response": {"status": 204},
            "envVariables": {"host": "example.com"}
        })
        .to_string(),
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_scriptbox"))
        .arg("run")
        .arg("--script")
        .arg(&script_path)
        .arg("--exchange")
        .arg(&exchange_path)
        .args(extra)
        .env("RUST_LOG", "warn")
        .output()?;

    let report: Value = serde_json::from_slice(&output.stdout)?;
    Ok((output.status.success(), report))
}

#[test]
fn test_cli_prints_report() -> anyhow::Result<()> {
    let script = r#"
        test('no content', () => expect(res.status).to.equal(204));
        bru.setEnvVar('seen', bru.getEnvVar('host'));
    "#;
    for backend in ["isolated", "embedded"] {
        let (success, report) = cli(script, &["--backend", backend])?;
        assert!(success, "{}", backend);
        assert_eq!(report["results"][0]["passed"], json!(true));
        assert_eq!(report["envVariables"]["seen"], json!("example.com"));
    }
    Ok(())
}

#[test]
fn test_cli_failure_prints_partial_results() -> anyhow::Result<()> {
    let (success, report) = cli("test('first', () => {}); throw new Error('boom');", &[])?;
    assert!(!success);
    assert_eq!(report["results"][0]["description"], json!("first"));
    Ok(())
}
