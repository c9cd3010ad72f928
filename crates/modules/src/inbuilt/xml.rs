//! `xml2js`: XML documents to JSON trees and back.
//!
//! The tree shape follows xml2js: attributes under `$`, text under `_`, and
//! child elements collected into arrays unless `explicitArray` is off.

use std::fmt;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use serde_json::{Map, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg, arg_text, unknown_function};

/// XML parser and builder exposed as `xml2js`.
pub struct Xml2jsModule;

/// Options accepted by `new xml2js.Parser(options)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParserOptions {
    pub explicit_array: bool,
    pub explicit_root: bool,
    pub ignore_attrs: bool,
    pub merge_attrs: bool,
    pub explicit_charkey: bool,
    pub trim: bool,
    pub normalize: bool,
    pub attrkey: String,
    pub charkey: String,
    pub empty_tag: Value,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            explicit_array: true,
            explicit_root: true,
            ignore_attrs: false,
            merge_attrs: false,
            explicit_charkey: false,
            trim: false,
            normalize: false,
            attrkey: "$".to_string(),
            charkey: "_".to_string(),
            empty_tag: Value::String(String::new()),
        }
    }
}

/// Options accepted by `new xml2js.Builder(options)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuilderOptions {
    pub root_name: String,
    pub headless: bool,
    pub attrkey: String,
    pub charkey: String,
    pub render_opts: RenderOptions,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            root_name: "root".to_string(),
            headless: false,
            attrkey: "$".to_string(),
            charkey: "_".to_string(),
            render_opts: RenderOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub pretty: bool,
    pub indent: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: "  ".to_string(),
        }
    }
}

fn xml_error(e: impl fmt::Display) -> Error {
    Error::module_call(format!("xml2js: {}", e))
}

fn options<T: Default + for<'de> Deserialize<'de>>(value: &Value) -> Result<T> {
    match value {
        Value::Null => Ok(T::default()),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

// =============================================================================
// Parsing
// =============================================================================

struct Frame {
    name: String,
    node: Map<String, Value>,
    text: String,
    cdata: bool,
}

fn push_child(node: &mut Map<String, Value>, key: String, value: Value, explicit_array: bool) {
    match node.get_mut(&key) {
        None if explicit_array => {
            node.insert(key, Value::Array(vec![value]));
        }
        None => {
            node.insert(key, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

fn open(start: &BytesStart<'_>, options: &ParserOptions) -> Result<Frame> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut node = Map::new();

    if !options.ignore_attrs {
        let mut attrs = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            attrs.insert(key, Value::String(value));
        }
        if !attrs.is_empty() {
            if options.merge_attrs {
                for (key, value) in attrs {
                    push_child(&mut node, key, value, options.explicit_array);
                }
            } else {
                node.insert(options.attrkey.clone(), Value::Object(attrs));
            }
        }
    }

    Ok(Frame {
        name,
        node,
        text: String::new(),
        cdata: false,
    })
}

fn close(frame: Frame, options: &ParserOptions) -> (String, Value) {
    let Frame {
        name,
        mut node,
        text,
        cdata,
    } = frame;

    // Whitespace-only text is layout, unless it came from CDATA
    let mut blank = String::new();
    if text.trim().is_empty() && !cdata {
        blank = text;
    } else {
        let mut text = text;
        if options.trim {
            text = text.trim().to_string();
        }
        if options.normalize {
            text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        node.insert(options.charkey.clone(), Value::String(text));
    }

    let value = if node.len() == 1 && !options.explicit_charkey {
        match node.remove(&options.charkey) {
            Some(text) => text,
            None => Value::Object(node),
        }
    } else if node.is_empty() {
        match &options.empty_tag {
            Value::String(tag) if tag.is_empty() => Value::String(blank),
            other => other.clone(),
        }
    } else {
        Value::Object(node)
    };

    (name, value)
}

/// Parse `xml` into an xml2js-shaped tree. Blank input yields `null`.
pub fn parse(xml: &str, options: &ParserOptions) -> Result<Value> {
    if xml.trim().is_empty() {
        return Ok(Value::Null);
    }

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(open(&start, options)?),
            Event::Empty(start) => {
                let (name, value) = close(open(&start, options)?, options);
                match stack.last_mut() {
                    Some(parent) => push_child(&mut parent.node, name, value, options.explicit_array),
                    None => root = Some((name, value)),
                }
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or_else(|| xml_error("unexpected close tag"))?;
                let (name, value) = close(frame, options);
                match stack.last_mut() {
                    Some(parent) => push_child(&mut parent.node, name, value, options.explicit_array),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    frame.cdata = true;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(frame) = stack.last() {
        return Err(xml_error(format!("unclosed tag <{}>", frame.name)));
    }
    let (name, value) = root.ok_or_else(|| xml_error("document has no root element"))?;

    if options.explicit_root {
        let mut wrapped = Map::new();
        wrapped.insert(name, value);
        Ok(Value::Object(wrapped))
    } else {
        Ok(value)
    }
}

// =============================================================================
// Building
// =============================================================================

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    options: &BuilderOptions,
) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item, options)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            if let Some(Value::Object(attrs)) = map.get(&options.attrkey) {
                for (key, attr) in attrs {
                    let text = scalar_text(attr);
                    start.push_attribute((key.as_str(), text.as_str()));
                }
            }
            let text = map.get(&options.charkey).map(scalar_text);
            let children: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(key, _)| **key != options.attrkey && **key != options.charkey)
                .collect();

            if text.is_none() && children.is_empty() {
                return writer.write_event(Event::Empty(start)).map_err(xml_error);
            }
            writer.write_event(Event::Start(start)).map_err(xml_error)?;
            if let Some(text) = text {
                writer
                    .write_event(Event::Text(BytesText::new(&text)))
                    .map_err(xml_error)?;
            }
            for (child, child_value) in children {
                write_element(writer, child, child_value, options)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)
        }
        Value::Null => writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(xml_error),
        scalar => {
            let text = scalar_text(scalar);
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)
        }
    }
}

/// Render an xml2js-shaped tree as an XML document.
pub fn build(value: &Value, options: &BuilderOptions) -> Result<String> {
    let mut writer = if options.render_opts.pretty {
        Writer::new_with_indent(Vec::new(), b' ', options.render_opts.indent.len())
    } else {
        Writer::new(Vec::new())
    };

    if !options.headless {
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_error)?;
    }

    // A single top-level key names the root, unless a root name was given
    match value {
        Value::Object(map) if map.len() == 1 && options.root_name == "root" => {
            for (name, inner) in map {
                write_element(&mut writer, name, inner, options)?;
            }
        }
        other => write_element(&mut writer, &options.root_name, other, options)?,
    }

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

impl NativeModule for Xml2jsModule {
    fn name(&self) -> &str {
        "xml2js"
    }

    fn exports(&self) -> Vec<Export> {
        vec![Export::sync("parse"), Export::sync("build")]
    }

    fn adapter(&self) -> Option<&str> {
        Some("xml2js")
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "parse" => parse(&arg_text(args, 0), &options(arg(args, 1))?),
            "build" => Ok(Value::String(build(arg(args, 0), &options(arg(args, 1))?)?)),
            other => Err(unknown_function("xml2js", other)),
        }
    }
}
