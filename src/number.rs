// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt::{self, Debug, Display, Formatter};
use core::str::FromStr;

use anyhow::{anyhow, bail, Result};
use num_bigint::BigInt as NumBigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use serde::ser::Serializer;
use serde::Serialize;

use crate::error::EvalError;
use crate::Rc;

pub type BigInt = NumBigInt;

const F64_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Largest integer `pow` computes exactly.
pub const MAX_INTEGER_BITS: u64 = 4096;

/// A configuration-language number.
///
/// Integers are exact and never overflow: values outside `i64` are promoted to
/// a big integer. Numbers with a fractional part are held as `f64`. Whichever
/// representation a literal used, numbers compare by numeric value, so `1`,
/// `1.0` and `1e0` are all equal.
#[derive(Clone)]
pub enum Number {
    Int(i64),
    BigInt(Rc<BigInt>),
    Float(f64),
}

impl Number {
    fn from_bigint_owned(value: BigInt) -> Self {
        match value.to_i64() {
            Some(i) => Number::Int(i),
            None => Number::BigInt(Rc::new(value)),
        }
    }

    fn from_i128(value: i128) -> Self {
        match i64::try_from(value) {
            Ok(i) => Number::Int(i),
            Err(_) => Number::BigInt(Rc::new(BigInt::from(value))),
        }
    }

    fn to_bigint_owned(&self) -> Option<BigInt> {
        match self {
            Number::Int(v) => Some(BigInt::from(*v)),
            Number::BigInt(v) => Some((**v).clone()),
            Number::Float(f) => Self::float_to_small_bigint(*f),
        }
    }

    fn float_to_small_bigint(value: f64) -> Option<BigInt> {
        if !value.is_finite() || value.fract() != 0.0 || value.abs() > F64_SAFE_INTEGER {
            return None;
        }
        let i = value as i64;
        if (i as f64) == value {
            Some(BigInt::from(i))
        } else {
            None
        }
    }

    fn to_f64_lossy(&self) -> f64 {
        match self {
            Number::Int(v) => *v as f64,
            Number::Float(v) => *v,
            Number::BigInt(v) => match v.to_f64() {
                Some(f) => f,
                None if v.is_negative() => f64::NEG_INFINITY,
                None => f64::INFINITY,
            },
        }
    }

    fn normalize_float(value: f64) -> Number {
        match Self::float_to_small_bigint(value) {
            Some(int) => Self::from_bigint_owned(int),
            None => Number::Float(value),
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, Number::Float(_))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(v) => *v == 0,
            Number::BigInt(v) => v.is_zero(),
            Number::Float(f) => *f == 0.0,
        }
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Number::Int(_) | Number::BigInt(_) => true,
            Number::Float(f) => f.is_finite() && f.fract() == 0.0,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Number::Int(v) => *v < 0,
            Number::BigInt(v) => v.is_negative(),
            Number::Float(f) => *f < 0.0,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(v) => Some(*v),
            Number::BigInt(v) => v.to_i64(),
            Number::Float(f) => Self::float_to_small_bigint(*f).and_then(|b| b.to_i64()),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|i| usize::try_from(i).ok())
    }

    pub fn as_f64(&self) -> f64 {
        self.to_f64_lossy()
    }

    pub fn add(&self, rhs: &Self) -> Result<Number> {
        if self.is_float() || rhs.is_float() {
            return Ok(Number::normalize_float(
                self.to_f64_lossy() + rhs.to_f64_lossy(),
            ));
        }
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Ok(Number::from_i128(*a as i128 + *b as i128)),
            _ => Ok(Number::from_bigint_owned(
                self.to_big()? + rhs.to_big()?,
            )),
        }
    }

    pub fn sub(&self, rhs: &Self) -> Result<Number> {
        if self.is_float() || rhs.is_float() {
            return Ok(Number::normalize_float(
                self.to_f64_lossy() - rhs.to_f64_lossy(),
            ));
        }
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Ok(Number::from_i128(*a as i128 - *b as i128)),
            _ => Ok(Number::from_bigint_owned(
                self.to_big()? - rhs.to_big()?,
            )),
        }
    }

    pub fn mul(&self, rhs: &Self) -> Result<Number> {
        if self.is_float() || rhs.is_float() {
            return Ok(Number::normalize_float(
                self.to_f64_lossy() * rhs.to_f64_lossy(),
            ));
        }
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Ok(Number::from_i128(*a as i128 * *b as i128)),
            _ => Ok(Number::from_bigint_owned(
                self.to_big()? * rhs.to_big()?,
            )),
        }
    }

    pub fn divide(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("division by zero");
        }

        if !self.is_float() && !rhs.is_float() {
            let (a, b) = (self.to_big()?, rhs.to_big()?);
            if (&a % &b).is_zero() {
                return Ok(Number::from_bigint_owned(a / b));
            }
        }

        Ok(Number::normalize_float(
            self.to_f64_lossy() / rhs.to_f64_lossy(),
        ))
    }

    /// Remainder with the sign of the dividend.
    pub fn modulo(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("modulo by zero");
        }

        if !self.is_float() && !rhs.is_float() {
            return Ok(Number::from_bigint_owned(self.to_big()? % rhs.to_big()?));
        }

        Ok(Number::normalize_float(
            self.to_f64_lossy() % rhs.to_f64_lossy(),
        ))
    }

    pub fn neg(&self) -> Number {
        match self {
            Number::Int(v) => Number::from_i128(-(*v as i128)),
            Number::BigInt(v) => Number::from_bigint_owned(-(**v).clone()),
            Number::Float(f) => Number::Float(-*f),
        }
    }

    pub fn abs(&self) -> Number {
        if self.is_negative() {
            self.neg()
        } else {
            self.clone()
        }
    }

    pub fn floor(&self) -> Number {
        match self {
            Number::Float(f) => Number::normalize_float(f.floor()),
            _ => self.clone(),
        }
    }

    pub fn ceil(&self) -> Number {
        match self {
            Number::Float(f) => Number::normalize_float(f.ceil()),
            _ => self.clone(),
        }
    }

    pub fn pow(&self, exponent: &Self) -> Result<Number> {
        if let (Some(base), Some(exp)) = (self.to_bigint_owned(), exponent.as_i64()) {
            if (0..=u32::MAX as i64).contains(&exp) && !exponent.is_float() {
                let bits = base.bits();
                if bits > 1 && bits.saturating_mul(exp as u64) > MAX_INTEGER_BITS {
                    return Err(EvalError::Limit(format!(
                        "`pow` result exceeds {MAX_INTEGER_BITS} bits"
                    ))
                    .into());
                }
                return Ok(Number::from_bigint_owned(num_traits::pow(base, exp as usize)));
            }
        }
        Ok(Number::normalize_float(
            self.to_f64_lossy().powf(exponent.to_f64_lossy()),
        ))
    }

    pub fn to_big(&self) -> Result<BigInt> {
        self.to_bigint_owned()
            .ok_or_else(|| anyhow!("{} is not an integer", self.format_decimal()))
    }

    pub fn format_decimal(&self) -> String {
        match self {
            Number::Int(v) => v.to_string(),
            Number::BigInt(v) => v.to_string(),
            Number::Float(f) if f.is_nan() => "NaN".to_string(),
            Number::Float(f) if f.is_infinite() && *f > 0.0 => "Infinity".to_string(),
            Number::Float(f) if f.is_infinite() => "-Infinity".to_string(),
            Number::Float(f) => {
                let s = f.to_string();
                match s.strip_suffix(".0") {
                    Some(int) => int.to_string(),
                    None => s,
                }
            }
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::Int(v) => serializer.serialize_i64(*v),
            Number::Float(f) => serializer.serialize_f64(*f),
            Number::BigInt(_) => {
                let v = serde_json::Number::from_str(&self.format_decimal())
                    .map_err(|_| serde::ser::Error::custom("could not serialize number"))?;
                v.serialize(serializer)
            }
        }
    }
}

impl From<BigInt> for Number {
    fn from(value: BigInt) -> Self {
        Number::from_bigint_owned(value)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Number::from_i128(value as i128)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number::from_i128(value as i128)
    }
}

impl From<i128> for Number {
    fn from(value: i128) -> Self {
        Number::from_i128(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::normalize_float(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseNumberError;

impl Display for ParseNumberError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("invalid number")
    }
}

impl std::error::Error for ParseNumberError {}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
        if digits.is_empty() || !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            return Err(ParseNumberError);
        }

        if digits.chars().all(|c| c.is_ascii_digit()) {
            return BigInt::from_str(s)
                .map(Number::from_bigint_owned)
                .map_err(|_| ParseNumberError);
        }

        match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Number::normalize_float(f)),
            _ => Err(ParseNumberError),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.to_bigint_owned(), other.to_bigint_owned()) {
            return a.cmp(&b);
        }

        self.to_f64_lossy().total_cmp(&other.to_f64_lossy())
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
