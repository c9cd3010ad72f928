//! Module catalogue integration tests.
//!
//! Exercises the inbuilt library through the `NativeModule` trait the way the
//! sandbox does: by name, with JSON arguments.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use scriptbox_core::mocks::EchoModule;
use scriptbox_core::traits::{CallKind, NativeModule};
use scriptbox_modules::{FilesystemModule, InbuiltModule, ModuleRegistry};

// =============================================================================
// Helpers
// =============================================================================

fn inbuilt(module: InbuiltModule) -> Arc<dyn NativeModule> {
    module
        .native(Path::new("/collections/petstore"))
        .expect("module has a native half")
}

// =============================================================================
// 1. Every export is callable with its declared convention
// =============================================================================

#[test]
fn test_exports_have_consistent_kinds() {
    for module in InbuiltModule::ALL {
        let Some(native) = module.native(Path::new("/")) else {
            continue;
        };
        let exports = native.exports();
        assert!(!exports.is_empty(), "{} exports nothing", module);

        let kinds: Vec<CallKind> = exports.iter().map(|e| e.kind).collect();
        if module == InbuiltModule::Axios {
            assert!(kinds.iter().all(|k| *k == CallKind::Async));
        } else {
            assert!(kinds.iter().all(|k| *k == CallKind::Sync), "{} has async exports", module);
        }
    }
}

// =============================================================================
// 2. Callable modules dispatch to `default`
// =============================================================================

#[test]
fn test_callable_modules() {
    let btoa = inbuilt(InbuiltModule::Btoa);
    let atob = inbuilt(InbuiltModule::Atob);
    assert!(btoa.is_callable());

    let encoded = btoa.call("default", &[json!("bruno")]).unwrap();
    let decoded = atob.call("default", &[encoded]).unwrap();
    assert_eq!(decoded, json!("bruno"));
}

// =============================================================================
// 3. Adapters are declared where the script API is object-shaped
// =============================================================================

#[test]
fn test_adapters() {
    assert_eq!(inbuilt(InbuiltModule::Moment).adapter(), Some("moment"));
    assert_eq!(inbuilt(InbuiltModule::CryptoJs).adapter(), Some("crypto-js"));
    assert_eq!(inbuilt(InbuiltModule::Ajv).adapter(), Some("ajv"));
    assert_eq!(inbuilt(InbuiltModule::Xml2js).adapter(), Some("xml2js"));
    assert_eq!(inbuilt(InbuiltModule::Cheerio).adapter(), Some("cheerio"));
    assert_eq!(inbuilt(InbuiltModule::Lodash).adapter(), None);

    let fs = FilesystemModule::new("/collections/petstore".into(), Vec::new());
    assert_eq!(fs.adapter(), Some("fs"));
    assert_eq!(fs.roots().len(), 1);
}

// =============================================================================
// 4. Unknown functions are errors, not panics
// =============================================================================

#[tokio::test]
async fn test_unknown_functions() {
    for module in InbuiltModule::ALL {
        let Some(native) = module.native(Path::new("/")) else {
            continue;
        };
        assert!(native.call("__missing__", &[]).is_err(), "{}", module);
        assert!(native.call_async("__missing__", Vec::new()).await.is_err(), "{}", module);
    }
}

// =============================================================================
// 5. Registry holds host modules next to the inbuilt library
// =============================================================================

#[test]
fn test_registry_with_host_module() {
    let registry = ModuleRegistry::new();
    registry.register(Arc::new(EchoModule::new("node-vault"))).unwrap();

    let vault = registry.get("node-vault").unwrap();
    let out = vault.call("echo", &[json!("secret/path")]).unwrap();
    assert_eq!(out["args"], json!(["secret/path"]));

    assert!(InbuiltModule::from_name("node-vault").is_none());
}

// =============================================================================
// 6. Markup modules
// =============================================================================

#[test]
fn test_xml2js_through_the_catalogue() {
    assert!(InbuiltModule::ALL.contains(&InbuiltModule::Xml2js));
    assert_eq!(InbuiltModule::from_name("xml2js"), Some(InbuiltModule::Xml2js));

    let xml2js = inbuilt(InbuiltModule::Xml2js);
    let parsed = xml2js
        .call("parse", &[json!(r#"<pet id="3"><tag>cat</tag></pet>"#), json!({})])
        .unwrap();
    assert_eq!(parsed, json!({"pet": {"$": {"id": "3"}, "tag": ["cat"]}}));

    let flat = xml2js
        .call("parse", &[json!("<pet><tag>cat</tag></pet>"), json!({"explicitArray": false})])
        .unwrap();
    assert_eq!(flat, json!({"pet": {"tag": "cat"}}));

    let built = xml2js
        .call(
            "build",
            &[
                json!({"pet": {"tag": "dog"}}),
                json!({"headless": true, "renderOpts": {"pretty": false}}),
            ],
        )
        .unwrap();
    assert_eq!(built, json!("<pet><tag>dog</tag></pet>"));

    assert!(xml2js.call("parse", &[json!("<pet>"), json!({})]).is_err());
}

#[test]
fn test_cheerio_through_the_catalogue() {
    assert!(InbuiltModule::ALL.contains(&InbuiltModule::Cheerio));

    let cheerio = inbuilt(InbuiltModule::Cheerio);
    let page = r#"<div id="pets"><span class="name">Rex</span><span class="name">Tom</span></div>"#;
    let names = cheerio
        .call(
            "query",
            &[json!(page), json!([{"op": "select", "selector": "#pets"}, {"op": "find", "selector": ".name"}])],
        )
        .unwrap();
    let texts: Vec<&str> = names
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["Rex", "Tom"]);

    let rendered = cheerio.call("render", &[json!(page)]).unwrap();
    assert!(rendered.as_str().unwrap().contains(r#"<span class="name">Rex</span>"#));
}
