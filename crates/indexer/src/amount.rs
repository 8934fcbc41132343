//! Arbitrary-precision amounts serialized as decimal strings.
//!
//! Chain balances exceed 64 bits; JSON carries them as strings (`"1250000000000000000000"`).

use num_bigint::BigInt;
use serde::{de, Deserialize, Deserializer, Serializer};
use std::str::FromStr;

pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Int(i64),
    }
    match Repr::deserialize(deserializer)? {
        Repr::Text(s) => parse(&s).ok_or_else(|| de::Error::custom(format!("invalid amount {s:?}"))),
        Repr::Int(n) => Ok(BigInt::from(n)),
    }
}

/// Parse a decimal amount.
pub fn parse(s: &str) -> Option<BigInt> {
    BigInt::from_str(s.trim()).ok()
}
