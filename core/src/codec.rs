//! Body encoding and decoding for the three wire formats.
//!
//! # Design
//! Every decoded body is a `serde_json::Value`, whatever the wire format, so
//! the paginator and typed operations probe one shape. XML maps onto that
//! value the way Plex's own JSON mirrors its XML: an element becomes an
//! object of its attributes, child elements are grouped by name into arrays,
//! and the document is wrapped as `{rootName: {...}}`. Nesting beyond
//! `MAX_DEPTH` levels is rejected in both directions.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use crate::error::{PlexError, Result};
use crate::http::Format;

/// Maximum nesting accepted when encoding or decoding a body.
pub const MAX_DEPTH: usize = 10;

/// Key holding an element's character data in decoded XML.
pub const XML_TEXT_KEY: &str = "$text";

const XML_FALLBACK_ROOT: &str = "root";

/// Serialize `body` for the wire in `format`.
pub fn encode_body(body: &Value, format: Format) -> Result<String> {
    match format {
        Format::Json => {
            check_depth(body).map_err(PlexError::Encode)?;
            serde_json::to_string(body).map_err(|e| PlexError::Encode(e.to_string()))
        }
        Format::Xml => encode_xml(body),
        Format::Raw => match body {
            Value::String(text) => Ok(text.clone()),
            other => serde_json::to_string(other).map_err(|e| PlexError::Encode(e.to_string())),
        },
    }
}

/// Parse a response body declared as `format`.
///
/// Blank JSON or XML bodies decode to `Value::Null`.
pub fn decode_body(text: &str, format: Format) -> Result<Value> {
    match format {
        Format::Raw => Ok(Value::String(text.to_string())),
        _ if text.trim().is_empty() => Ok(Value::Null),
        Format::Json => {
            let value: Value = serde_json::from_str(text).map_err(|e| decode_error(format, e))?;
            check_depth(&value).map_err(|message| PlexError::Decode { format, message })?;
            Ok(value)
        }
        Format::Xml => decode_xml(text),
    }
}

/// Nesting depth of a JSON value; scalars are 0, each container adds 1.
pub fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn check_depth(value: &Value) -> std::result::Result<(), String> {
    let found = depth(value);
    if found > MAX_DEPTH {
        return Err(format!("nesting depth {found} exceeds limit of {MAX_DEPTH}"));
    }
    Ok(())
}

fn decode_error(format: Format, err: impl std::fmt::Display) -> PlexError {
    PlexError::Decode {
        format,
        message: err.to_string(),
    }
}

fn encode_error(err: impl std::fmt::Display) -> PlexError {
    PlexError::Encode(err.to_string())
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

fn encode_xml(body: &Value) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    match body {
        Value::Array(_) => {
            return Err(PlexError::Encode(
                "a top-level array has no element name".to_string(),
            ))
        }
        // An array under the single key would repeat the root element.
        Value::Object(map) if map.len() == 1 && !map.values().any(Value::is_array) => {
            for (name, value) in map {
                write_element(&mut writer, name, value, 1)?;
            }
        }
        other => write_element(&mut writer, XML_FALLBACK_ROOT, other, 1)?,
    }
    String::from_utf8(writer.into_inner()).map_err(encode_error)
}

/// Scalars inside an object become attributes; objects and arrays become
/// child elements; an array repeats its element once per item.
fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value, level: usize) -> Result<()> {
    if level > MAX_DEPTH {
        return Err(PlexError::Encode(format!(
            "element <{name}> nests deeper than {MAX_DEPTH} levels"
        )));
    }
    if name.is_empty() {
        return Err(PlexError::Encode("element name must not be empty".to_string()));
    }

    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item, level)?;
            }
        }
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            let mut text = None;
            let mut children = Vec::new();
            for (key, child) in map {
                match child {
                    Value::Object(_) | Value::Array(_) => children.push((key, child)),
                    Value::Null => {}
                    scalar if key == XML_TEXT_KEY => text = Some(scalar_text(scalar)),
                    scalar => start.push_attribute((key.as_str(), scalar_text(scalar).as_str())),
                }
            }

            if children.is_empty() && text.is_none() {
                writer.write_event(Event::Empty(start)).map_err(encode_error)?;
                return Ok(());
            }
            writer.write_event(Event::Start(start)).map_err(encode_error)?;
            if let Some(text) = text {
                writer
                    .write_event(Event::Text(BytesText::new(&text)))
                    .map_err(encode_error)?;
            }
            for (key, child) in children {
                write_element(writer, key, child, level + 1)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(encode_error)?;
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(encode_error)?;
        }
        scalar => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(encode_error)?;
            writer
                .write_event(Event::Text(BytesText::new(&scalar_text(scalar))))
                .map_err(encode_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(encode_error)?;
        }
    }
    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode_xml(text: &str) -> Result<Value> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<(String, Map<String, Value>)> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(PlexError::Decode {
                        format: Format::Xml,
                        message: format!("element nesting exceeds limit of {MAX_DEPTH}"),
                    });
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push((name, read_attributes(&e)?));
            }
            Ok(Event::Empty(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(PlexError::Decode {
                        format: Format::Xml,
                        message: format!("element nesting exceeds limit of {MAX_DEPTH}"),
                    });
                }
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let node = Value::Object(read_attributes(&e)?);
                attach(&mut stack, &mut root, name, node)?;
            }
            Ok(Event::Text(e)) => {
                let content = e.unescape().map_err(|err| decode_error(Format::Xml, err))?;
                push_text(&mut stack, &content);
            }
            Ok(Event::CData(e)) => {
                let content = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut stack, &content);
            }
            Ok(Event::End(_)) => {
                let (name, node) = stack.pop().ok_or_else(|| PlexError::Decode {
                    format: Format::Xml,
                    message: "closing tag without an open element".to_string(),
                })?;
                attach(&mut stack, &mut root, name, Value::Object(node))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(decode_error(Format::Xml, e)),
            _ => {}
        }
    }

    if let Some((name, _)) = stack.last() {
        return Err(PlexError::Decode {
            format: Format::Xml,
            message: format!("unclosed element <{name}>"),
        });
    }
    root.ok_or_else(|| PlexError::Decode {
        format: Format::Xml,
        message: "document has no root element".to_string(),
    })
}

fn read_attributes(start: &BytesStart<'_>) -> Result<Map<String, Value>> {
    let mut attributes = Map::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| decode_error(Format::Xml, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| decode_error(Format::Xml, e))?;
        attributes.insert(key, Value::String(value.into_owned()));
    }
    Ok(attributes)
}

fn push_text(stack: &mut [(String, Map<String, Value>)], content: &str) {
    if content.trim().is_empty() {
        return;
    }
    if let Some((_, node)) = stack.last_mut() {
        match node.get_mut(XML_TEXT_KEY) {
            Some(Value::String(existing)) => existing.push_str(content),
            _ => {
                node.insert(XML_TEXT_KEY.to_string(), Value::String(content.to_string()));
            }
        }
    }
}

fn attach(
    stack: &mut [(String, Map<String, Value>)],
    root: &mut Option<Value>,
    name: String,
    node: Value,
) -> Result<()> {
    let Some((_, parent)) = stack.last_mut() else {
        if root.is_some() {
            return Err(PlexError::Decode {
                format: Format::Xml,
                message: "document has more than one root element".to_string(),
            });
        }
        let mut wrapper = Map::new();
        wrapper.insert(name, node);
        *root = Some(Value::Object(wrapper));
        return Ok(());
    };

    match parent.get_mut(&name) {
        Some(Value::Array(siblings)) => siblings.push(node),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, node]);
        }
        None => {
            parent.insert(name, Value::Array(vec![node]));
        }
    }
    Ok(())
}
