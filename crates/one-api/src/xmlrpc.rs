//! XML-RPC envelope encoding and decoding.
//!
//! Only the value types OpenNebula uses on the `one.*` methods are covered.

use quick_xml::escape::escape;

use crate::xml::{self, Element};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Param<'a> {
    Str(&'a str),
    Int(i32),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

pub(crate) fn encode_call(method: &str, params: &[Param<'_>]) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    body.push_str(&escape(method));
    body.push_str("</methodName><params>");
    for param in params {
        body.push_str("<param><value>");
        match param {
            Param::Str(s) => {
                body.push_str("<string>");
                body.push_str(&escape(*s));
                body.push_str("</string>");
            }
            Param::Int(i) => body.push_str(&format!("<i4>{i}</i4>")),
            Param::Bool(b) => body.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
        }
        body.push_str("</value></param>");
    }
    body.push_str("</params></methodCall>");
    body
}

/// Decode a `methodResponse` into its single return value.
pub(crate) fn decode_response(body: &str) -> Result<Value> {
    let root = xml::parse(body)?;
    if root.name != "methodResponse" {
        return Err(Error::Decode(format!(
            "expected methodResponse, got <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let value = fault
            .child("value")
            .ok_or_else(|| Error::Decode("fault without value".into()))
            .and_then(decode_value)?;
        return Err(Error::Fault {
            code: value.member("faultCode").and_then(Value::as_i64).unwrap_or(0),
            message: value
                .member("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    root.child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or_else(|| Error::Decode("methodResponse without params".into()))
        .and_then(decode_value)
}

fn decode_value(value: &Element) -> Result<Value> {
    // A bare <value> with no type tag is a string.
    let Some(typed) = value.children.first() else {
        return Ok(Value::Str(value.text.clone()));
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "string" => Ok(Value::Str(typed.text.clone())),
        "i4" | "int" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| Error::Decode(format!("invalid integer {text:?}"))),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(Error::Decode(format!("invalid boolean {other:?}"))),
        },
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| Error::Decode(format!("invalid double {text:?}"))),
        "nil" => Ok(Value::Nil),
        "array" => typed
            .child("data")
            .map(|data| {
                data.children_named("value")
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(Value::Array),
        "struct" => typed
            .children_named("member")
            .map(|member| {
                let name = member.child_text("name").unwrap_or_default().to_string();
                let value = member
                    .child("value")
                    .ok_or_else(|| Error::Decode(format!("struct member {name} without value")))
                    .and_then(decode_value)?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Struct),
        other => Err(Error::Decode(format!("unsupported xml-rpc type <{other}>"))),
    }
}
