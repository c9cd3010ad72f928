//! `cheerio`: CSS selection over HTML documents.
//!
//! The module is stateless. A script-side selection is a list of steps
//! replayed against a fresh parse of the document on every query.

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg, arg_text, unknown_function};

/// HTML querying exposed as `cheerio`.
pub struct CheerioModule;

/// One step of a selection chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    /// `$(selector)`: match anywhere in the document.
    Select { selector: String },
    /// `.find(selector)`: descendants of the current elements.
    Find { selector: String },
    /// `.children([selector])`
    Children {
        #[serde(default)]
        selector: Option<String>,
    },
    /// `.parent()`
    Parent,
    /// `.eq(index)`
    Eq { index: usize },
    /// A selection with nothing in it.
    Empty,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| Error::module_call(format!("cheerio: invalid selector '{}': {}", selector, e)))
}

fn push_unique<'a>(found: &mut Vec<ElementRef<'a>>, element: ElementRef<'a>) {
    if !found.contains(&element) {
        found.push(element);
    }
}

fn describe(element: &ElementRef<'_>) -> Value {
    let attribs: Map<String, Value> = element
        .value()
        .attrs()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();

    json!({
        "name": element.value().name(),
        "attribs": attribs,
        "text": element.text().collect::<String>(),
        "innerHtml": element.inner_html(),
        "outerHtml": element.html(),
    })
}

/// Replay `steps` against `html` and describe the matched elements.
///
/// An empty step list selects the document element.
pub fn query(html: &str, steps: &[Step]) -> Result<Vec<Value>> {
    let document = Html::parse_document(html);
    let mut current = vec![document.root_element()];

    for step in steps {
        current = match step {
            Step::Select { selector } => {
                let selector = compile(selector)?;
                document.select(&selector).collect()
            }
            Step::Find { selector } => {
                let selector = compile(selector)?;
                let mut found = Vec::new();
                for element in &current {
                    for matched in element.select(&selector) {
                        push_unique(&mut found, matched);
                    }
                }
                found
            }
            Step::Children { selector } => {
                let selector = selector.as_deref().map(compile).transpose()?;
                current
                    .iter()
                    .flat_map(|element| element.children().filter_map(ElementRef::wrap))
                    .filter(|child| selector.as_ref().map_or(true, |s| s.matches(child)))
                    .collect()
            }
            Step::Parent => {
                let mut found = Vec::new();
                for element in &current {
                    if let Some(parent) = element.parent().and_then(ElementRef::wrap) {
                        push_unique(&mut found, parent);
                    }
                }
                found
            }
            Step::Eq { index } => current.get(*index).copied().into_iter().collect(),
            Step::Empty => Vec::new(),
        };
    }

    Ok(current.iter().map(describe).collect())
}

impl NativeModule for CheerioModule {
    fn name(&self) -> &str {
        "cheerio"
    }

    fn exports(&self) -> Vec<Export> {
        vec![Export::sync("query"), Export::sync("render")]
    }

    fn adapter(&self) -> Option<&str> {
        Some("cheerio")
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "query" => {
                let steps: Vec<Step> = serde_json::from_value(arg(args, 1).clone())?;
                Ok(Value::Array(query(&arg_text(args, 0), &steps)?))
            }
            "render" => Ok(Value::String(Html::parse_document(&arg_text(args, 0)).html())),
            other => Err(unknown_function("cheerio", other)),
        }
    }
}
