//! Deserializers for ids that peers send either as JSON numbers or as numeric strings.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

fn value_to_u32<E: de::Error>(value: &Value) -> Result<u32, E> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| E::custom(format!("id out of range: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| E::custom(format!("not a numeric id: {:?}", s))),
        other => Err(E::custom(format!("expected id, got {}", other))),
    }
}

fn value_to_string<E: de::Error>(value: &Value) -> Result<String, E> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(E::custom(format!("expected id, got {}", other))),
    }
}

pub fn u32_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_u32(&value)
}

pub fn string_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_string(&value)
}

pub fn u32_list_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values.iter().map(value_to_u32).collect()
}

pub fn string_list_from_any<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<String>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values.iter().map(value_to_string).collect()
}

/// Reads a u32 out of a loosely-typed JSON value, for config-service replies.
pub fn as_u32(value: &Value) -> Option<u32> {
    value_to_u32::<serde_json::Error>(value).ok()
}
