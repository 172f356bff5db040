//! Conversion between schema-less JSON values and schema-typed messages.
//!
//! Both directions follow the canonical protobuf JSON mapping. Encoding
//! accepts `snake_case` and `lowerCamelCase` field names, takes 64-bit
//! integers as numbers or strings, and ignores unknown fields. Decoding omits
//! unpopulated fields, uses lowerCamelCase names and renders 64-bit integers
//! as strings unless `DefaultsConfig` says otherwise.

use crate::error::CallError;
use grpcallconf::DefaultsConfig;
use prost_reflect::{
    DeserializeOptions, DynamicMessage, MessageDescriptor, ReflectMessage, SerializeOptions,
};
use serde_json::Value;

/// Schema-less representation of a message crossing the JSON boundary.
pub type DynamicValue = Value;

/// Builds a request message from a dynamic value.
pub struct RequestEncoder;

impl RequestEncoder {
    pub fn encode(input: &MessageDescriptor, value: &DynamicValue) -> Result<DynamicMessage, CallError> {
        let text = serde_json::to_string(value)
            .map_err(|e| CallError::InvalidRequest(format!("Failed to marshal request: {}", e)))?;

        let mut de = serde_json::Deserializer::from_str(&text);
        let options = DeserializeOptions::new().deny_unknown_fields(false);
        let message = DynamicMessage::deserialize_with_options(input.clone(), &mut de, &options)
            .map_err(|e| CallError::InvalidRequest(format!("Failed to populate request: {}", e)))?;
        de.end()
            .map_err(|e| CallError::InvalidRequest(format!("Failed to populate request: {}", e)))?;

        Ok(message)
    }
}

/// Renders response messages as dynamic values.
#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    options: SerializeOptions,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(&DefaultsConfig::default())
    }
}

impl ResponseDecoder {
    pub fn new(defaults: &DefaultsConfig) -> Self {
        let options = SerializeOptions::new()
            .skip_default_fields(!defaults.emit_default_fields)
            .use_proto_field_name(defaults.proto_field_names)
            .stringify_64_bit_integers(!defaults.int64_as_numbers);
        Self { options }
    }

    /// Decode `response`, which must be an instance of `expected`.
    pub fn decode(&self, expected: &MessageDescriptor, response: &DynamicMessage) -> Result<DynamicValue, CallError> {
        let actual = response.descriptor();
        if actual.full_name() != expected.full_name() {
            return Err(CallError::ResponseTypeError(format!(
                "Response is not a {} message (got {})",
                expected.full_name(),
                actual.full_name()
            )));
        }

        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::new(&mut buf);
        response
            .serialize_with_options(&mut ser, &self.options)
            .map_err(|e| CallError::ResponseMarshalFailed(e.to_string()))?;

        serde_json::from_slice(&buf).map_err(|e| CallError::ResponseMarshalFailed(e.to_string()))
    }
}
