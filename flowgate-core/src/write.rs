use crate::adapter::{EngineVariable, ScopeAdapter, VariableDescriptor, VariableScope};
use crate::binary::OCTET_STREAM;
use crate::error::VariableError;
use crate::guard::DeserializationGuard;
use crate::types::{
    decode, FileValue, ObjectValue, TypedValue, ValueInfo, TAG_BYTES, TAG_FILE, TAG_OBJECT,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

// ─── Upload carrier ───────────────────────────────────────────

/// A multipart binary upload, drained from the transport before any await
/// point. Failure to read is a hard `IOError`, never empty content.
#[derive(Clone, Debug)]
pub struct BinaryUpload {
    pub data: Vec<u8>,
    /// Full Content-Type header of the part, parameters included.
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub encoding: Option<String>,
}

impl BinaryUpload {
    pub fn new(data: Vec<u8>, content_type: Option<String>, filename: Option<String>) -> Self {
        Self {
            data,
            content_type,
            filename,
            encoding: None,
        }
    }

    /// Drain a content stream eagerly.
    pub fn from_reader(
        mut reader: impl Read,
        content_type: Option<String>,
        filename: Option<String>,
    ) -> Result<Self, VariableError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data, content_type, filename))
    }

    /// Media type without parameters, lower-cased; octet-stream if absent.
    fn media_type(&self) -> String {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| OCTET_STREAM.to_string())
    }

    fn content_type_param(&self, name: &str) -> Option<String> {
        let ct = self.content_type.as_deref()?;
        for param in ct.split(';').skip(1) {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case(name) {
                    return Some(value.trim().trim_matches('"').to_string());
                }
            }
        }
        None
    }
}

/// One entry of a batch modification: the wire triple before decoding.
#[derive(Clone, Debug)]
pub struct VariableModification {
    pub value_type: String,
    pub value: serde_json::Value,
    pub info: ValueInfo,
}

// ─── Pipeline ─────────────────────────────────────────────────

/// Converts inbound wire payloads into TypedValues and applies them
/// through a ScopeAdapter. Three write shapes: plain value, object upload,
/// and raw binary/file upload.
pub struct VariablePipeline {
    guard: Arc<DeserializationGuard>,
}

impl VariablePipeline {
    pub fn new(guard: Arc<DeserializationGuard>) -> Self {
        Self { guard }
    }

    /// Plain value write: decode the wire triple and persist it.
    pub async fn write_value(
        &self,
        adapter: &dyn ScopeAdapter,
        descriptor: &VariableDescriptor,
        value_type: &str,
        value: serde_json::Value,
        info: ValueInfo,
    ) -> Result<(), VariableError> {
        if value_type == TAG_OBJECT {
            if let Some(type_name) = &info.object_type_name {
                self.guard.check_name(type_name)?;
            }
        }
        let typed = decode(value_type, value, &info)?;
        tracing::debug!(
            name = %descriptor.name,
            scope = descriptor.scope.kind(),
            value_type,
            "setting variable"
        );
        adapter
            .set_variable(descriptor, EngineVariable::new(typed, info))
            .await
    }

    /// Binary upload write. With a declared object type the payload must be
    /// JSON and becomes an Object variable; without one it is wrapped as
    /// Bytes or File according to `value_type` (absent defaults to Bytes,
    /// blank is rejected).
    pub async fn write_upload(
        &self,
        adapter: &dyn ScopeAdapter,
        descriptor: &VariableDescriptor,
        value_type: Option<&str>,
        object_type_name: Option<&str>,
        upload: BinaryUpload,
    ) -> Result<(), VariableError> {
        let variable = match object_type_name.filter(|n| !n.trim().is_empty()) {
            Some(type_name) => self.object_from_upload(type_name, upload)?,
            None => binary_from_upload(value_type, upload)?,
        };
        tracing::debug!(
            name = %descriptor.name,
            scope = descriptor.scope.kind(),
            value_type = variable.value.type_tag(),
            "setting variable from upload"
        );
        adapter.set_variable(descriptor, variable).await
    }

    /// Batch write: decode every modification, then apply modifications and
    /// deletions in one adapter call. Atomicity is the adapter's concern.
    pub async fn write_many(
        &self,
        adapter: &dyn ScopeAdapter,
        scope: &VariableScope,
        modifications: BTreeMap<String, VariableModification>,
        deletions: Vec<String>,
    ) -> Result<(), VariableError> {
        let mut decoded = BTreeMap::new();
        for (name, modification) in modifications {
            if modification.value_type == TAG_OBJECT {
                if let Some(type_name) = &modification.info.object_type_name {
                    self.guard.check_name(type_name)?;
                }
            }
            let typed = decode(
                &modification.value_type,
                modification.value,
                &modification.info,
            )?;
            decoded.insert(name, EngineVariable::new(typed, modification.info));
        }
        tracing::debug!(
            scope = scope.kind(),
            modified = decoded.len(),
            deleted = deletions.len(),
            "updating variables"
        );
        adapter.update_variables(scope, decoded, deletions).await
    }

    fn object_from_upload(
        &self,
        type_name: &str,
        upload: BinaryUpload,
    ) -> Result<EngineVariable, VariableError> {
        let media_type = upload.media_type();
        if media_type != "application/json" && !media_type.ends_with("+json") {
            return Err(VariableError::unsupported(format!(
                "object uploads must be JSON, got '{media_type}'"
            )));
        }
        self.guard.check_name(type_name)?;
        let info = ValueInfo {
            object_type_name: Some(type_name.to_string()),
            ..ValueInfo::default()
        };
        Ok(EngineVariable::new(
            TypedValue::Object(ObjectValue {
                payload: upload.data,
                object_type_name: type_name.to_string(),
            }),
            info,
        ))
    }
}

fn binary_from_upload(
    value_type: Option<&str>,
    upload: BinaryUpload,
) -> Result<EngineVariable, VariableError> {
    // Absent defaults to File when the part carries a filename (a named
    // upload reads back as File, not Bytes) and to Bytes otherwise;
    // explicitly blank is rejected.
    let tag = match value_type {
        None if upload.filename.as_deref().is_some_and(|n| !n.is_empty()) => TAG_FILE,
        None => TAG_BYTES,
        Some(t) if t.trim().is_empty() => {
            return Err(VariableError::unsupported("blank valueType on upload"))
        }
        Some(t) if t.eq_ignore_ascii_case(TAG_BYTES) => TAG_BYTES,
        Some(t) if t.eq_ignore_ascii_case(TAG_FILE) => TAG_FILE,
        Some(t) => {
            return Err(VariableError::unsupported(format!(
                "valueType '{t}' is not a binary type"
            )))
        }
    };

    let media_type = upload.media_type();
    let encoding = upload
        .encoding
        .clone()
        .or_else(|| upload.content_type_param("charset"));
    let transient = parse_transient(upload.content_type_param("transient").as_deref());
    let filename = upload.filename.clone();

    let info = ValueInfo {
        filename: filename.clone(),
        mime_type: Some(media_type.clone()),
        encoding: encoding.clone(),
        object_type_name: None,
        transient,
    };

    let value = match tag {
        TAG_FILE => TypedValue::File(FileValue {
            content: Some(upload.data),
            filename: filename.unwrap_or_else(|| "data".to_string()),
            mime_type: Some(media_type),
            encoding,
            transient,
        }),
        _ => TypedValue::Bytes(Some(upload.data)),
    };
    Ok(EngineVariable::new(value, info))
}

/// Malformed values default to false, loudly. The flag is advisory
/// metadata, so a bad spelling is tolerated rather than failing the write.
fn parse_transient(raw: Option<&str>) -> bool {
    match raw {
        None => false,
        Some(v) if v.eq_ignore_ascii_case("true") => true,
        Some(v) if v.eq_ignore_ascii_case("false") => false,
        Some(v) => {
            tracing::warn!(value = %v, "unparseable transient flag, defaulting to false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter_memory::MemoryEngine;
    use crate::guard::PatternAllowlist;
    use crate::reconcile::read_variable;
    use crate::types::Projection;
    use serde_json::json;

    fn pipeline() -> VariablePipeline {
        VariablePipeline::new(Arc::new(DeserializationGuard::disabled()))
    }

    fn guarded_pipeline(allow: &str) -> VariablePipeline {
        VariablePipeline::new(Arc::new(DeserializationGuard::new(
            true,
            Some(Arc::new(PatternAllowlist::parse(allow))),
        )))
    }

    fn task_descriptor(name: &str) -> VariableDescriptor {
        VariableDescriptor::live(VariableScope::Task("t1".to_string()), name)
    }

    /// Scenario A: write {type: Integer, value: 42}, read it back.
    #[tokio::test]
    async fn plain_integer_write_and_read() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("count");
        pipeline()
            .write_value(&engine, &d, "Integer", json!(42), ValueInfo::default())
            .await
            .unwrap();

        let resolved = read_variable(&engine, &d, Projection::Deserialized)
            .await
            .unwrap();
        assert_eq!(resolved.value, TypedValue::Integer(42));
        assert_eq!(resolved.value.type_tag(), "Integer");
        assert_eq!(resolved.value_deserialized, json!(42));
    }

    /// Uploading a png as a File variable keeps the declared mime type and
    /// filename, and they come back on the binary read path.
    #[tokio::test]
    async fn file_upload_round_trip() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("picture");
        let upload = BinaryUpload::new(
            vec![0x89, 0x50, 0x4e, 0x47],
            Some("image/png".to_string()),
            Some("logo.png".to_string()),
        );
        pipeline()
            .write_upload(&engine, &d, Some("File"), None, upload)
            .await
            .unwrap();

        let stored = engine.get_variable(&d, true).await.unwrap();
        match &stored.value {
            TypedValue::File(f) => {
                assert_eq!(f.mime_type.as_deref(), Some("image/png"));
                assert_eq!(f.filename, "logo.png");
                assert_eq!(f.content.as_deref(), Some(&[0x89, 0x50, 0x4e, 0x47][..]));
            }
            other => panic!("expected File, got {other:?}"),
        }

        let payload = crate::binary::build_binary_response(&stored.value, &stored.info, None).unwrap();
        assert_eq!(payload.media_type, "image/png");
        assert_eq!(payload.bytes, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    /// Scenario C: object upload naming a disallowed type fails with the
    /// full rejected list and persists nothing.
    #[tokio::test]
    async fn rejected_object_upload_persists_nothing() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("order");
        let upload = BinaryUpload::new(
            br#"{"x":1}"#.to_vec(),
            Some("application/json".to_string()),
            None,
        );
        let err = guarded_pipeline("com.acme.*")
            .write_upload(&engine, &d, None, Some("evil.Payload"), upload)
            .await
            .unwrap_err();
        match err {
            VariableError::DeserializationRejected { types } => {
                assert_eq!(types, vec!["evil.Payload"]);
            }
            other => panic!("expected DeserializationRejected, got {other:?}"),
        }
        assert!(engine.get_variable(&d, false).await.is_err());
    }

    #[tokio::test]
    async fn allowed_object_upload_is_stored() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("order");
        let upload = BinaryUpload::new(
            br#"{"x":1}"#.to_vec(),
            Some("application/json; charset=utf-8".to_string()),
            None,
        );
        guarded_pipeline("com.acme.*")
            .write_upload(&engine, &d, None, Some("com.acme.Order"), upload)
            .await
            .unwrap();

        let stored = engine.get_variable(&d, false).await.unwrap();
        match &stored.value {
            TypedValue::Object(o) => {
                assert_eq!(o.object_type_name, "com.acme.Order");
                assert_eq!(o.payload, br#"{"x":1}"#.to_vec());
            }
            other => panic!("expected Object, got {other:?}"),
        }
    }

    /// Object uploads must be JSON; anything else is a hard error.
    #[tokio::test]
    async fn non_json_object_upload_is_unsupported() {
        let engine = MemoryEngine::unguarded();
        let upload = BinaryUpload::new(
            b"<order/>".to_vec(),
            Some("application/xml".to_string()),
            None,
        );
        let err = pipeline()
            .write_upload(
                &engine,
                &task_descriptor("order"),
                None,
                Some("com.acme.Order"),
                upload,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VariableError::UnsupportedType { .. }));
    }

    /// valueType: absent defaults to Bytes, blank is rejected.
    #[tokio::test]
    async fn upload_value_type_default_and_blank() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("blob");
        pipeline()
            .write_upload(
                &engine,
                &d,
                None,
                None,
                BinaryUpload::new(vec![1, 2], None, None),
            )
            .await
            .unwrap();
        let stored = engine.get_variable(&d, true).await.unwrap();
        assert_eq!(stored.value, TypedValue::Bytes(Some(vec![1, 2])));
        assert_eq!(stored.info.mime_type.as_deref(), Some(OCTET_STREAM));

        let err = pipeline()
            .write_upload(
                &engine,
                &d,
                Some("  "),
                None,
                BinaryUpload::new(vec![1], None, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VariableError::UnsupportedType { .. }));
    }

    /// A named upload with valueType omitted is stored as a File variable,
    /// not Bytes — the kind is visible to callers through the type tag.
    #[tokio::test]
    async fn named_upload_defaults_to_file() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("picture");
        let upload = BinaryUpload::new(
            vec![0x89, 0x50],
            Some("image/png".to_string()),
            Some("logo.png".to_string()),
        );
        pipeline()
            .write_upload(&engine, &d, None, None, upload)
            .await
            .unwrap();

        let stored = engine.get_variable(&d, true).await.unwrap();
        assert_eq!(stored.value.type_tag(), "File");
        match &stored.value {
            TypedValue::File(f) => {
                assert_eq!(f.mime_type.as_deref(), Some("image/png"));
                assert_eq!(f.filename, "logo.png");
            }
            other => panic!("expected File, got {other:?}"),
        }
    }

    /// transient comes from the content-type parameters; malformed values
    /// default to false instead of failing the request.
    #[tokio::test]
    async fn transient_flag_parsing() {
        let engine = MemoryEngine::unguarded();
        let d = task_descriptor("tmp");
        let upload = BinaryUpload::new(
            vec![1],
            Some("application/octet-stream; transient=TRUE".to_string()),
            Some("tmp.bin".to_string()),
        );
        pipeline()
            .write_upload(&engine, &d, Some("file"), None, upload)
            .await
            .unwrap();
        let stored = engine.get_variable(&d, true).await.unwrap();
        assert!(matches!(
            stored.value,
            TypedValue::File(FileValue { transient: true, .. })
        ));

        let upload = BinaryUpload::new(
            vec![1],
            Some("application/octet-stream; transient=maybe".to_string()),
            None,
        );
        pipeline()
            .write_upload(&engine, &d, None, None, upload)
            .await
            .unwrap();
        let stored = engine.get_variable(&d, true).await.unwrap();
        assert!(!stored.info.transient);
    }

    #[tokio::test]
    async fn batch_write_decodes_and_applies() {
        let engine = MemoryEngine::unguarded();
        let scope = VariableScope::ProcessInstance("p1".to_string());
        pipeline()
            .write_value(
                &engine,
                &VariableDescriptor::live(scope.clone(), "old"),
                "Boolean",
                json!(true),
                ValueInfo::default(),
            )
            .await
            .unwrap();

        let mut modifications = BTreeMap::new();
        modifications.insert(
            "count".to_string(),
            VariableModification {
                value_type: "Long".to_string(),
                value: json!(7),
                info: ValueInfo::default(),
            },
        );
        pipeline()
            .write_many(&engine, &scope, modifications, vec!["old".to_string()])
            .await
            .unwrap();

        let count = VariableDescriptor::live(scope.clone(), "count");
        assert_eq!(
            engine.get_variable(&count, true).await.unwrap().value,
            TypedValue::Long(7)
        );
        let old = VariableDescriptor::live(scope, "old");
        assert!(engine.get_variable(&old, true).await.is_err());
    }

    /// A failing content stream is an IOError, never empty content.
    #[test]
    fn failing_upload_read_is_io_error() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "broken pipe"))
            }
        }
        let err = BinaryUpload::from_reader(Failing, None, None).unwrap_err();
        assert!(matches!(err, VariableError::Io(_)));
    }
}
