use crate::error::VariableError;
use crate::types::{TypedValue, ValueInfo};

pub const OCTET_STREAM: &str = "application/octet-stream";

const DEFAULT_FILENAME: &str = "data";

/// A byte-stream response ready for the transport layer: raw bytes, the
/// resolved download filename, and the media type to declare.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub media_type: String,
}

/// Build a byte-stream response from a Bytes- or File-valued variable.
///
/// A null stored payload yields zero bytes, never an error. A File's media
/// type is the stored mimeType, falling back to octet-stream. Filename
/// resolution order: explicit parameter, then valueInfo, then the stored
/// File filename, then `"data"`. Any other value kind here is a caller
/// error.
pub fn build_binary_response(
    value: &TypedValue,
    info: &ValueInfo,
    requested_filename: Option<&str>,
) -> Result<BinaryPayload, VariableError> {
    match value {
        TypedValue::Bytes(content) => Ok(BinaryPayload {
            bytes: content.clone().unwrap_or_default(),
            filename: resolve_filename(requested_filename, info, None),
            media_type: info.mime_type.clone().unwrap_or_else(|| OCTET_STREAM.to_string()),
        }),
        TypedValue::File(file) => Ok(BinaryPayload {
            bytes: file.content.clone().unwrap_or_default(),
            filename: resolve_filename(requested_filename, info, Some(&file.filename)),
            media_type: file
                .mime_type
                .clone()
                .unwrap_or_else(|| OCTET_STREAM.to_string()),
        }),
        other => Err(VariableError::unsupported(format!(
            "cannot stream value of type '{}' as binary",
            other.type_tag()
        ))),
    }
}

fn resolve_filename(
    requested: Option<&str>,
    info: &ValueInfo,
    stored: Option<&str>,
) -> String {
    requested
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| info.filename.clone().filter(|n| !n.is_empty()))
        .or_else(|| stored.filter(|n| !n.is_empty()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Media type for a raw deployment/resource byte stream, inferred from the
/// last `.`-delimited segment of the resource name. Unknown or absent
/// extensions fall back to octet-stream.
pub fn media_type_for_resource(resource_name: &str) -> &'static str {
    let extension = match resource_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return OCTET_STREAM,
    };
    match extension.as_str() {
        "bpmn" | "dmn" | "cmmn" | "xml" => "application/xml",
        "json" => "application/json",
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "tiff" | "tif" => "image/tiff",
        "svg" => "image/svg+xml",
        "html" | "htm" => "text/html",
        "txt" | "log" | "js" | "groovy" | "py" | "rb" => "text/plain",
        _ => OCTET_STREAM,
    }
}
