// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::ensure_string;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::Result;
use data_encoding::{BASE64, HEXLOWER};
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("base64sha256", (base64sha256, 1));
    m.insert("base64sha512", (base64sha512, 1));
    m.insert("md5", (crypto_md5, 1));
    m.insert("sha1", (crypto_sha1, 1));
    m.insert("sha256", (crypto_sha256, 1));
    m.insert("sha512", (crypto_sha512, 1));
}

fn crypto_md5(args: &[Value]) -> Result<Value> {
    let s = ensure_string("md5", &args[0])?;
    Ok(Value::from(HEXLOWER.encode(&Md5::digest(s.as_bytes()))))
}

fn crypto_sha1(args: &[Value]) -> Result<Value> {
    let s = ensure_string("sha1", &args[0])?;
    Ok(Value::from(HEXLOWER.encode(&Sha1::digest(s.as_bytes()))))
}

fn crypto_sha256(args: &[Value]) -> Result<Value> {
    let s = ensure_string("sha256", &args[0])?;
    Ok(Value::from(HEXLOWER.encode(&Sha256::digest(s.as_bytes()))))
}

fn crypto_sha512(args: &[Value]) -> Result<Value> {
    let s = ensure_string("sha512", &args[0])?;
    Ok(Value::from(HEXLOWER.encode(&Sha512::digest(s.as_bytes()))))
}

fn base64sha256(args: &[Value]) -> Result<Value> {
    let s = ensure_string("base64sha256", &args[0])?;
    Ok(Value::from(BASE64.encode(&Sha256::digest(s.as_bytes()))))
}

fn base64sha512(args: &[Value]) -> Result<Value> {
    let s = ensure_string("base64sha512", &args[0])?;
    Ok(Value::from(BASE64.encode(&Sha512::digest(s.as_bytes()))))
}
