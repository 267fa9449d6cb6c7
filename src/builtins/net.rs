// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::{ensure_integer, ensure_string};
use crate::value::Value;

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use ipnet::IpNet;

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("cidrcontains", (cidrcontains, 2));
    m.insert("cidrhost", (cidrhost, 2));
    m.insert("cidrnetmask", (cidrnetmask, 1));
    m.insert("cidrsubnet", (cidrsubnet, 3));
}

fn parse_net(fcn: &str, s: &str) -> Result<IpNet> {
    s.parse::<IpNet>()
        .map(|n| n.trunc())
        .map_err(|_| anyhow!("`{fcn}` invalid CIDR address `{s}`"))
}

fn to_u128(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(a) => u32::from(a) as u128,
        IpAddr::V6(a) => u128::from(a),
    }
}

fn from_u128(v: u128, like: &IpNet) -> IpAddr {
    match like {
        IpNet::V4(_) => IpAddr::V4(Ipv4Addr::from(v as u32)),
        IpNet::V6(_) => IpAddr::V6(Ipv6Addr::from(v)),
    }
}

/// Compute the address of host number `hostnum` within `prefix`. Negative
/// numbers count back from the end of the range.
pub fn host(fcn: &str, prefix: &str, hostnum: i64) -> Result<IpAddr> {
    let net = parse_net(fcn, prefix)?;
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    let last: u128 = if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };

    let offset = if hostnum < 0 {
        let back = hostnum.unsigned_abs() as u128 - 1;
        if back > last {
            bail!("`{fcn}` host number {hostnum} does not fit in {host_bits} bits");
        }
        last - back
    } else {
        let n = hostnum as u128;
        if n > last {
            bail!("`{fcn}` host number {hostnum} does not fit in {host_bits} bits");
        }
        n
    };
    Ok(from_u128(to_u128(net.network()) | offset, &net))
}

/// Compute subnet `netnum` obtained by extending `prefix` by `newbits`.
pub fn subnet(fcn: &str, prefix: &str, newbits: i64, netnum: i64) -> Result<IpNet> {
    let net = parse_net(fcn, prefix)?;
    let max = i64::from(net.max_prefix_len());
    let prefix_len = i64::from(net.prefix_len());
    if newbits < 0 || newbits > max - prefix_len {
        bail!("`{fcn}` insufficient address space to extend prefix by {newbits} bits");
    }
    if netnum < 0 || (newbits < 128 && netnum as u128 >= (1u128 << newbits)) {
        bail!("`{fcn}` network number {netnum} does not fit in {newbits} bits");
    }
    let new_len = prefix_len + newbits;
    let shift = (max - new_len) as u32;
    let offset = if shift >= 128 {
        0
    } else {
        (netnum as u128) << shift
    };
    let addr = from_u128(to_u128(net.network()) | offset, &net);
    IpNet::new(addr, new_len as u8).map_err(|e| anyhow!("`{fcn}` {e}"))
}

fn cidrhost(args: &[Value]) -> Result<Value> {
    let name = "cidrhost";
    let prefix = ensure_string(name, &args[0])?;
    let hostnum = ensure_integer(name, &args[1])?;
    Ok(Value::from(host(name, &prefix, hostnum)?.to_string()))
}

fn cidrnetmask(args: &[Value]) -> Result<Value> {
    let name = "cidrnetmask";
    let prefix = ensure_string(name, &args[0])?;
    match parse_net(name, &prefix)? {
        IpNet::V4(n) => Ok(Value::from(n.netmask().to_string())),
        IpNet::V6(_) => bail!("`{name}` only supports IPv4 prefixes"),
    }
}

fn cidrsubnet(args: &[Value]) -> Result<Value> {
    let name = "cidrsubnet";
    let prefix = ensure_string(name, &args[0])?;
    let newbits = ensure_integer(name, &args[1])?;
    let netnum = ensure_integer(name, &args[2])?;
    Ok(Value::from(subnet(name, &prefix, newbits, netnum)?.to_string()))
}

fn cidrcontains(args: &[Value]) -> Result<Value> {
    let name = "cidrcontains";
    let prefix = ensure_string(name, &args[0])?;
    let other = ensure_string(name, &args[1])?;
    let net = parse_net(name, &prefix)?;

    if other.contains('/') {
        let inner = parse_net(name, &other)?;
        if matches!(net, IpNet::V4(_)) != matches!(inner, IpNet::V4(_)) {
            bail!("`{name}` address families of `{prefix}` and `{other}` differ");
        }
        return Ok(Value::Bool(net.contains(&inner)));
    }

    let addr = other
        .parse::<IpAddr>()
        .map_err(|_| anyhow!("`{name}` invalid IP address `{other}`"))?;
    if matches!(net, IpNet::V4(_)) != addr.is_ipv4() {
        bail!("`{name}` address families of `{prefix}` and `{other}` differ");
    }
    Ok(Value::Bool(net.contains(&addr)))
}
