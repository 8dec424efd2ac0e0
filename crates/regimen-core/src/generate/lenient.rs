//! `deserialize_with` helpers for numeric fields the generator may emit as
//! either JSON numbers or strings.
//!
//! Accepted: a number, or a string holding one (surrounding whitespace is
//! ignored). Integer fields only take integer text from strings, so `"8"`
//! parses but `"8.0"` and `"1e1"` do not; a JSON number with no fractional
//! part is still accepted. `null` and blank strings are treated as absent.
//! Anything else is rejected.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, Unexpected, Visitor};

pub(crate) trait LenientNumber: Sized {
    const EXPECTING: &'static str;

    fn from_i64(v: i64) -> Option<Self>;
    fn from_u64(v: u64) -> Option<Self>;
    fn from_f64(v: f64) -> Option<Self>;
    fn parse(s: &str) -> Option<Self>;
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

impl LenientNumber for i32 {
    const EXPECTING: &'static str = "an integer or a string containing one";

    fn from_i64(v: i64) -> Option<Self> {
        i32::try_from(v).ok()
    }

    fn from_u64(v: u64) -> Option<Self> {
        i32::try_from(v).ok()
    }

    fn from_f64(v: f64) -> Option<Self> {
        integral(v).and_then(Self::from_i64)
    }

    fn parse(s: &str) -> Option<Self> {
        s.parse::<i32>().ok()
    }
}

impl LenientNumber for i64 {
    const EXPECTING: &'static str = "an integer or a string containing one";

    fn from_i64(v: i64) -> Option<Self> {
        Some(v)
    }

    fn from_u64(v: u64) -> Option<Self> {
        i64::try_from(v).ok()
    }

    fn from_f64(v: f64) -> Option<Self> {
        integral(v)
    }

    fn parse(s: &str) -> Option<Self> {
        s.parse::<i64>().ok()
    }
}

impl LenientNumber for f64 {
    const EXPECTING: &'static str = "a number or a string containing one";

    fn from_i64(v: i64) -> Option<Self> {
        Some(v as f64)
    }

    fn from_u64(v: u64) -> Option<Self> {
        Some(v as f64)
    }

    fn from_f64(v: f64) -> Option<Self> {
        v.is_finite().then_some(v)
    }

    fn parse(s: &str) -> Option<Self> {
        s.parse::<f64>().ok().and_then(Self::from_f64)
    }
}

struct LenientVisitor<T>(PhantomData<T>);

impl<'de, T: LenientNumber> Visitor<'de> for LenientVisitor<T> {
    type Value = Option<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(T::EXPECTING)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        T::from_i64(v)
            .map(Some)
            .ok_or_else(|| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        T::from_u64(v)
            .map(Some)
            .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        T::from_f64(v)
            .map(Some)
            .ok_or_else(|| E::invalid_value(Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        T::parse(trimmed)
            .map(Some)
            .ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }
}

/// Optional numeric field. Pair with `#[serde(default)]` so a missing key
/// is also absent.
pub(crate) fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: LenientNumber,
{
    deserializer.deserialize_any(LenientVisitor(PhantomData))
}

/// Required numeric field: absent values (null, blank string) are errors.
pub(crate) fn required<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: LenientNumber,
{
    optional(deserializer)?
        .ok_or_else(|| de::Error::custom(format!("expected {}, found an empty value", T::EXPECTING)))
}
