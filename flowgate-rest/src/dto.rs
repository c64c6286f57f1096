use flowgate_core::{Projection, ResolvedVariable, ValueInfo, VariableModification};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

// ── Wire variable representation ──

/// The request/response body field group for one variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDto {
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default, rename = "valueInfo", skip_serializing_if = "ValueInfo::is_empty")]
    pub value_info: ValueInfo,
}

impl VariableDto {
    /// Response form of a reconciled read: the raw value of the projection
    /// the caller asked for, tagged with the primary value's wire type.
    pub fn from_resolved(resolved: &ResolvedVariable, primary: Projection) -> Self {
        let value = match primary {
            Projection::Serialized => resolved.value_serialized.clone(),
            Projection::Deserialized => resolved.value_deserialized.clone(),
        };
        Self {
            value_type: resolved.value.type_tag().to_string(),
            value,
            value_info: resolved.info.clone(),
        }
    }

    pub fn into_modification(self) -> VariableModification {
        VariableModification {
            value_type: self.value_type,
            value: self.value,
            info: self.value_info,
        }
    }
}

// ── Batch modification ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchVariablesDto {
    #[serde(default)]
    pub modifications: BTreeMap<String, VariableDto>,
    #[serde(default)]
    pub deletions: Vec<String>,
}

// ── Error body ──

#[derive(Debug, Serialize)]
pub struct ErrorDto {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub message: String,
    #[serde(rename = "rejectedTypes", skip_serializing_if = "Vec::is_empty")]
    pub rejected_types: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variable_dto_wire_shape() {
        let dto: VariableDto =
            serde_json::from_value(json!({"type": "Integer", "value": 42})).unwrap();
        assert_eq!(dto.value_type, "Integer");
        assert_eq!(dto.value, json!(42));
        assert!(dto.value_info.is_empty());

        let out = serde_json::to_value(&dto).unwrap();
        assert_eq!(out, json!({"type": "Integer", "value": 42}));
    }

    #[test]
    fn value_info_keys_are_camel_case() {
        let dto: VariableDto = serde_json::from_value(json!({
            "type": "Object",
            "value": "{}",
            "valueInfo": {"objectTypeName": "com.acme.Order"}
        }))
        .unwrap();
        assert_eq!(
            dto.value_info.object_type_name.as_deref(),
            Some("com.acme.Order")
        );
    }

    #[test]
    fn patch_dto_defaults() {
        let dto: PatchVariablesDto = serde_json::from_value(json!({})).unwrap();
        assert!(dto.modifications.is_empty());
        assert!(dto.deletions.is_empty());
    }
}
