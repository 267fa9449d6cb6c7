// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::{ensure_present, ensure_string};
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use data_encoding::BASE64;

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("base64decode", (base64decode, 1));
    m.insert("base64encode", (base64encode, 1));
    m.insert("jsondecode", (jsondecode, 1));
    m.insert("jsonencode", (jsonencode, 1));
    m.insert("textdecodebase64", (textdecodebase64, 2));
    m.insert("textencodebase64", (textencodebase64, 2));
    m.insert("urlencode", (urlencode, 1));

    #[cfg(feature = "yaml")]
    {
        m.insert("yamldecode", (yamldecode, 1));
        m.insert("yamlencode", (yamlencode, 1));
    }
}

fn base64decode(args: &[Value]) -> Result<Value> {
    let name = "base64decode";
    let encoded = ensure_string(name, &args[0])?;
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| anyhow!("`{name}` invalid base64: {e}"))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(Value::from(s)),
        Err(_) => bail!("`{name}` decoded bytes are not valid UTF-8"),
    }
}

fn base64encode(args: &[Value]) -> Result<Value> {
    let s = ensure_string("base64encode", &args[0])?;
    Ok(Value::from(BASE64.encode(s.as_bytes())))
}

fn jsondecode(args: &[Value]) -> Result<Value> {
    let name = "jsondecode";
    let s = ensure_string(name, &args[0])?;
    Value::from_json_str(&s).map_err(|e| anyhow!("`{name}` invalid JSON: {e}"))
}

fn jsonencode(args: &[Value]) -> Result<Value> {
    let v = ensure_present("jsonencode", &args[0])?;
    Ok(Value::from(serde_json::to_string(v)?))
}

#[cfg(feature = "yaml")]
fn yamldecode(args: &[Value]) -> Result<Value> {
    let name = "yamldecode";
    let s = ensure_string(name, &args[0])?;
    Value::from_yaml_str(&s).map_err(|e| anyhow!("`{name}` invalid YAML: {e}"))
}

#[cfg(feature = "yaml")]
fn yamlencode(args: &[Value]) -> Result<Value> {
    let v = ensure_present("yamlencode", &args[0])?;
    Ok(Value::from(serde_yaml::to_string(v)?))
}

fn urlencode(args: &[Value]) -> Result<Value> {
    let s = ensure_string("urlencode", &args[0])?;
    Ok(Value::from(
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>(),
    ))
}

fn textencodebase64(args: &[Value]) -> Result<Value> {
    let name = "textencodebase64";
    let s = ensure_string(name, &args[0])?;
    let encoding = ensure_string(name, &args[1])?;
    let bytes: Vec<u8> = match encoding.to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => s.as_bytes().to_vec(),
        "UTF-16LE" => s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
        "UTF-16BE" => s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect(),
        _ => bail!("`{name}` unsupported encoding `{encoding}`"),
    };
    Ok(Value::from(BASE64.encode(&bytes)))
}

fn textdecodebase64(args: &[Value]) -> Result<Value> {
    let name = "textdecodebase64";
    let encoded = ensure_string(name, &args[0])?;
    let encoding = ensure_string(name, &args[1])?;
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| anyhow!("`{name}` invalid base64: {e}"))?;

    let utf16 = |to_u16: fn([u8; 2]) -> u16| -> Result<String> {
        if bytes.len() % 2 != 0 {
            bail!("`{name}` odd number of bytes for UTF-16 text");
        }
        let units: Vec<u16> = bytes.chunks_exact(2).map(|c| to_u16([c[0], c[1]])).collect();
        String::from_utf16(&units).map_err(|_| anyhow!("`{name}` invalid UTF-16 text"))
    };

    let s = match encoding.to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => String::from_utf8(bytes.clone())
            .map_err(|_| anyhow!("`{name}` decoded bytes are not valid UTF-8"))?,
        "UTF-16LE" => utf16(u16::from_le_bytes)?,
        "UTF-16BE" => utf16(u16::from_be_bytes)?,
        _ => bail!("`{name}` unsupported encoding `{encoding}`"),
    };
    Ok(Value::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_structure() -> Result<()> {
        let decoded = jsondecode(&[Value::from(r#"{"Statement":[{"Effect":"Allow"}]}"#)])?;
        assert_eq!(decoded["Statement"][0]["Effect"], Value::from("Allow"));
        assert_eq!(
            jsonencode(&[Value::from(vec![Value::from(1i64), Value::Null])])?,
            Value::from("[1,null]")
        );
        assert!(jsondecode(&[Value::from("{")]).is_err());
        Ok(())
    }

    #[test]
    fn text_encodings() -> Result<()> {
        let encoded = textencodebase64(&[Value::from("hi"), Value::from("UTF-16LE")])?;
        assert_eq!(encoded, Value::from("aABpAA=="));
        assert_eq!(
            textdecodebase64(&[encoded, Value::from("UTF-16LE")])?,
            Value::from("hi")
        );
        assert!(base64decode(&[Value::from("not base64!")]).is_err());
        Ok(())
    }

    #[test]
    fn url_encoding() -> Result<()> {
        assert_eq!(
            urlencode(&[Value::from("a b&c")])?,
            Value::from("a+b%26c")
        );
        Ok(())
    }
}
