use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_json::Value;

// number | string → U256
pub fn deserialize_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(de::Error::custom),
            None => s.parse::<U256>().map_err(de::Error::custom),
        },
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| de::Error::custom(format!("Invalid number for U256: {n}"))),
        _ => Err(de::Error::custom("expected string or number")),
    }
}

pub fn serialize_u256<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn serialize_u64_hex<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{:x}", value))
}

pub fn serialize_option_u64_hex<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(v) => serialize_u64_hex(v, serializer),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize_u64_from_str_or_int<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(num) => num
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("Invalid number for u64: {num}"))),
        Value::String(s) => {
            if let Some(hex_val) = s.strip_prefix("0x") {
                u64::from_str_radix(hex_val, 16)
                    .map_err(|_| de::Error::custom(format!("Invalid hex string for u64: {s}")))
            } else {
                s.parse::<u64>()
                    .map_err(|_| de::Error::custom(format!("Invalid decimal string for u64: {s}")))
            }
        }
        _ => Err(de::Error::custom("u64 must be a number or a string")),
    }
}
