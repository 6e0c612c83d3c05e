//! The pluggable serializer adapter contract (§4.3).
//!
//! The engine never hard-codes a wire format for parameters, return values,
//! or call-context values: it goes through a `Serializer`, so a BSON-style
//! or other binary adapter can be swapped in without touching dispatch code.
//! Trait objects can't carry a generic `serialize<T>`, so the contract is
//! expressed over `serde_json::Value` — already the common self-describing
//! carrier every concrete value round-trips through before final encoding.

use crate::WireError;

/// Adapts values to and from the bytes carried in a `MethodCallParameterMessage`,
/// `MethodCallResultMessage`, or `CallContextEntry`.
pub trait Serializer: Send + Sync {
    /// Encode `value` to bytes.
    fn serialize_value(&self, value: &serde_json::Value) -> Result<Vec<u8>, WireError>;

    /// Decode bytes previously produced by [`Serializer::serialize_value`].
    fn deserialize_value(&self, bytes: &[u8]) -> Result<serde_json::Value, WireError>;

    /// Whether this format needs an out-of-band type name alongside the
    /// bytes to round-trip a value through a polymorphic declared type.
    /// `false` for the default JSON adapter: JSON values are self-describing
    /// enough for the shapes this protocol carries.
    fn envelope_needed_for_parameter_serialization(&self) -> bool {
        false
    }
}

/// The default adapter: `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize_value(&self, value: &serde_json::Value) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(value).map_err(|e| WireError::Serialize(e.to_string()))
    }

    fn deserialize_value(&self, bytes: &[u8]) -> Result<serde_json::Value, WireError> {
        serde_json::from_slice(bytes).map_err(|e| WireError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let s = JsonSerializer;
        let value = serde_json::json!({"a": 1, "b": [1, 2, 3]});
        let bytes = s.serialize_value(&value).unwrap();
        assert_eq!(s.deserialize_value(&bytes).unwrap(), value);
        assert!(!s.envelope_needed_for_parameter_serialization());
    }

    #[test]
    fn deserialize_garbage_fails() {
        let s = JsonSerializer;
        assert!(s.deserialize_value(b"\xff\xff\xff").is_err());
    }
}
