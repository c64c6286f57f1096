use crate::error::VariableError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ─── Wire tags ────────────────────────────────────────────────

pub const TAG_NULL: &str = "Null";
pub const TAG_STRING: &str = "String";
pub const TAG_INTEGER: &str = "Integer";
pub const TAG_LONG: &str = "Long";
pub const TAG_DOUBLE: &str = "Double";
pub const TAG_BOOLEAN: &str = "Boolean";
pub const TAG_DATE: &str = "Date";
pub const TAG_BYTES: &str = "Bytes";
pub const TAG_FILE: &str = "File";
pub const TAG_OBJECT: &str = "Object";

// ─── ValueInfo ────────────────────────────────────────────────

fn is_false(v: &bool) -> bool {
    !v
}

/// Auxiliary metadata accompanying every TypedValue. An empty map is valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Authoritative type name for Object variables; the wire `type` field
    /// is informational for those.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub transient: bool,
}

impl ValueInfo {
    pub fn is_empty(&self) -> bool {
        *self == ValueInfo::default()
    }
}

// ─── TypedValue ───────────────────────────────────────────────

/// A file-valued variable. `content == None` means the engine stored a
/// null payload, which reads back as zero bytes, never as an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileValue {
    pub content: Option<Vec<u8>>,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub transient: bool,
}

/// A serialized object variable. The payload is the JSON serialization;
/// the type name is what the deserialization guard is asked about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectValue {
    pub payload: Vec<u8>,
    pub object_type_name: String,
}

/// The variant model of a process variable's value.
///
/// One variant per wire kind, exhaustively matched at every decode/encode
/// site, so adding a kind is a compile-time-checked change. Numeric kinds
/// stay distinct: Integer is 32-bit, Long is 64-bit, Double is floating
/// point — nothing widens or narrows silently. `Null` is a value, not the
/// absence of one. File and Bytes are leaf values, never nested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Null,
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    /// `None` means a null stored payload (reads back as zero bytes).
    Bytes(Option<Vec<u8>>),
    File(FileValue),
    Object(ObjectValue),
}

/// Which of the two read projections of a variable is meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Serialized,
    Deserialized,
}

impl TypedValue {
    /// The wire type tag echoed back to callers.
    pub fn type_tag(&self) -> &'static str {
        match self {
            TypedValue::Null => TAG_NULL,
            TypedValue::String(_) => TAG_STRING,
            TypedValue::Integer(_) => TAG_INTEGER,
            TypedValue::Long(_) => TAG_LONG,
            TypedValue::Double(_) => TAG_DOUBLE,
            TypedValue::Boolean(_) => TAG_BOOLEAN,
            TypedValue::Date(_) => TAG_DATE,
            TypedValue::Bytes(_) => TAG_BYTES,
            TypedValue::File(_) => TAG_FILE,
            TypedValue::Object(_) => TAG_OBJECT,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, TypedValue::Bytes(_) | TypedValue::File(_))
    }

    /// The raw wire value under the given projection.
    ///
    /// The projections only differ for Object values: serialized is the
    /// JSON text as a string, deserialized is the parsed structure.
    pub fn raw_value(&self, projection: Projection) -> JsonValue {
        match self {
            TypedValue::Null => JsonValue::Null,
            TypedValue::String(s) => JsonValue::String(s.clone()),
            TypedValue::Integer(n) => JsonValue::from(*n),
            TypedValue::Long(n) => JsonValue::from(*n),
            TypedValue::Double(d) => JsonValue::from(*d),
            TypedValue::Boolean(b) => JsonValue::Bool(*b),
            TypedValue::Date(d) => {
                JsonValue::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            TypedValue::Bytes(content) => match content {
                Some(bytes) => JsonValue::String(BASE64.encode(bytes)),
                None => JsonValue::Null,
            },
            TypedValue::File(file) => match &file.content {
                Some(bytes) => JsonValue::String(BASE64.encode(bytes)),
                None => JsonValue::Null,
            },
            TypedValue::Object(object) => {
                let text = String::from_utf8_lossy(&object.payload).into_owned();
                match projection {
                    Projection::Serialized => JsonValue::String(text),
                    Projection::Deserialized => serde_json::from_slice(&object.payload)
                        .unwrap_or(JsonValue::String(text)),
                }
            }
        }
    }
}

// ─── Decode ───────────────────────────────────────────────────

/// Decode a wire triple (tag, raw value, value info) into a TypedValue.
///
/// Pure dispatch on the tag. The binary tags ("File", "Bytes") match
/// case-insensitively; everything else is exact. Unrecognized tags fail
/// with `UnsupportedType`.
pub fn decode(tag: &str, raw: JsonValue, info: &ValueInfo) -> Result<TypedValue, VariableError> {
    if tag.eq_ignore_ascii_case(TAG_BYTES) {
        return decode_bytes(raw);
    }
    if tag.eq_ignore_ascii_case(TAG_FILE) {
        return decode_file(raw, info);
    }

    match tag {
        TAG_NULL => match raw {
            JsonValue::Null => Ok(TypedValue::Null),
            other => Err(VariableError::unsupported(format!(
                "Null variable carries a value: {other}"
            ))),
        },
        // A null raw value under a typed primitive tag is rejected instead of
        // silently retagged: Null is its own kind, and the declared tag must
        // survive a decode/encode round trip.
        TAG_STRING => match raw {
            JsonValue::String(s) => Ok(TypedValue::String(s)),
            other => Err(type_mismatch(TAG_STRING, &other)),
        },
        TAG_INTEGER => match raw {
            JsonValue::Number(ref n) => {
                let wide = n.as_i64().ok_or_else(|| type_mismatch(TAG_INTEGER, &raw))?;
                let narrow = i32::try_from(wide).map_err(|_| {
                    VariableError::unsupported(format!("value {wide} out of Integer range"))
                })?;
                Ok(TypedValue::Integer(narrow))
            }
            other => Err(type_mismatch(TAG_INTEGER, &other)),
        },
        TAG_LONG => match raw {
            JsonValue::Number(ref n) => {
                let v = n.as_i64().ok_or_else(|| type_mismatch(TAG_LONG, &raw))?;
                Ok(TypedValue::Long(v))
            }
            other => Err(type_mismatch(TAG_LONG, &other)),
        },
        TAG_DOUBLE => match raw {
            JsonValue::Number(ref n) => {
                let v = n.as_f64().ok_or_else(|| type_mismatch(TAG_DOUBLE, &raw))?;
                Ok(TypedValue::Double(v))
            }
            other => Err(type_mismatch(TAG_DOUBLE, &other)),
        },
        TAG_BOOLEAN => match raw {
            JsonValue::Bool(b) => Ok(TypedValue::Boolean(b)),
            other => Err(type_mismatch(TAG_BOOLEAN, &other)),
        },
        TAG_DATE => match raw {
            JsonValue::String(s) => {
                let parsed = DateTime::parse_from_rfc3339(&s).map_err(|e| {
                    VariableError::unsupported(format!("invalid Date value '{s}': {e}"))
                })?;
                let utc = parsed.with_timezone(&Utc);
                // Dates carry millisecond precision on the wire; truncate at
                // decode so stored values round-trip losslessly.
                let truncated = utc
                    .with_nanosecond(utc.nanosecond() - utc.nanosecond() % 1_000_000)
                    .unwrap_or(utc);
                Ok(TypedValue::Date(truncated))
            }
            other => Err(type_mismatch(TAG_DATE, &other)),
        },
        TAG_OBJECT => decode_object(raw, info),
        other => Err(VariableError::unsupported(format!(
            "unknown value type '{other}'"
        ))),
    }
}

fn decode_bytes(raw: JsonValue) -> Result<TypedValue, VariableError> {
    match raw {
        JsonValue::Null => Ok(TypedValue::Bytes(None)),
        JsonValue::String(s) => {
            let bytes = BASE64.decode(s.as_bytes()).map_err(|e| {
                VariableError::unsupported(format!("Bytes value is not valid base64: {e}"))
            })?;
            Ok(TypedValue::Bytes(Some(bytes)))
        }
        other => Err(type_mismatch(TAG_BYTES, &other)),
    }
}

fn decode_file(raw: JsonValue, info: &ValueInfo) -> Result<TypedValue, VariableError> {
    let content = match raw {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(BASE64.decode(s.as_bytes()).map_err(|e| {
            VariableError::unsupported(format!("File value is not valid base64: {e}"))
        })?),
        other => return Err(type_mismatch(TAG_FILE, &other)),
    };
    Ok(TypedValue::File(FileValue {
        content,
        filename: info.filename.clone().unwrap_or_else(|| "data".to_string()),
        mime_type: info.mime_type.clone(),
        encoding: info.encoding.clone(),
        transient: info.transient,
    }))
}

fn decode_object(raw: JsonValue, info: &ValueInfo) -> Result<TypedValue, VariableError> {
    let object_type_name = info.object_type_name.clone().ok_or_else(|| {
        VariableError::unsupported("Object variable without valueInfo.objectTypeName")
    })?;
    // A string raw value is the serialized form itself; anything else is
    // the deserialized structure and gets re-serialized verbatim.
    let payload = match raw {
        JsonValue::String(s) => s.into_bytes(),
        other => serde_json::to_vec(&other)
            .map_err(|e| VariableError::unsupported(format!("unserializable Object value: {e}")))?,
    };
    Ok(TypedValue::Object(ObjectValue {
        payload,
        object_type_name,
    }))
}

fn type_mismatch(tag: &str, raw: &JsonValue) -> VariableError {
    VariableError::unsupported(format!("value {raw} does not match declared type '{tag}'"))
}

// ─── Encode ───────────────────────────────────────────────────

/// Encode a TypedValue back into its wire triple.
///
/// The raw value is the deserialized projection; callers needing the
/// serialized one go through [`TypedValue::raw_value`].
pub fn encode(value: &TypedValue) -> (&'static str, JsonValue, ValueInfo) {
    let tag = value.type_tag();
    let raw = value.raw_value(Projection::Deserialized);
    let info = match value {
        TypedValue::File(file) => ValueInfo {
            filename: Some(file.filename.clone()),
            mime_type: file.mime_type.clone(),
            encoding: file.encoding.clone(),
            object_type_name: None,
            transient: file.transient,
        },
        TypedValue::Object(object) => ValueInfo {
            object_type_name: Some(object.object_type_name.clone()),
            ..ValueInfo::default()
        },
        _ => ValueInfo::default(),
    };
    (tag, raw, info)
}
