//! REST routes for process variables, one family per scope.
//!
//! All engine access goes through the ScopeAdapter registry; all value
//! marshalling goes through flowgate-core. Handlers translate pipeline
//! errors to status codes and nothing else.

use crate::dto::{ErrorDto, PatchVariablesDto, VariableDto};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use flowgate_core::{
    binary::build_binary_response, read_variable, BinaryUpload, EngineRegistry, Projection,
    VariableDescriptor, VariableError, VariablePipeline, VariableScope,
};
use serde::Deserialize;
use std::sync::Arc;

// ── State ──

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EngineRegistry>,
    pub pipeline: Arc<VariablePipeline>,
}

impl AppState {
    pub fn new(registry: Arc<EngineRegistry>, pipeline: Arc<VariablePipeline>) -> Self {
        Self { registry, pipeline }
    }
}

// ── Error mapping ──

pub struct ApiError(VariableError);

impl From<VariableError> for ApiError {
    fn from(err: VariableError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            VariableError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
            VariableError::UnsupportedType { .. } => (StatusCode::BAD_REQUEST, "UnsupportedType"),
            VariableError::DeserializationRejected { .. } => {
                (StatusCode::BAD_REQUEST, "DeserializationRejected")
            }
            VariableError::Authorization { .. } => (StatusCode::FORBIDDEN, "AuthorizationError"),
            VariableError::Engine { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "EngineError"),
            VariableError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IOError"),
        };
        let rejected_types = match &self.0 {
            VariableError::DeserializationRejected { types } => types.clone(),
            _ => Vec::new(),
        };
        let body = ErrorDto {
            error_type,
            message: self.0.to_string(),
            rejected_types,
        };
        (status, Json(body)).into_response()
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(VariableError::unsupported(format!(
        "malformed multipart body: {err}"
    )))
}

// ── Router ──

pub fn create_variable_router(state: AppState) -> Router {
    Router::new()
        .merge(scope_routes("task", "variables", VariableScope::Task))
        .merge(scope_routes(
            "execution",
            "localVariables",
            VariableScope::Execution,
        ))
        .merge(scope_routes(
            "process-instance",
            "variables",
            VariableScope::ProcessInstance,
        ))
        .merge(history_routes())
        .with_state(state)
}

fn scope_routes(
    root: &str,
    collection: &str,
    make: fn(String) -> VariableScope,
) -> Router<AppState> {
    Router::new()
        .route(
            &format!("/{root}/:id/{collection}"),
            axum::routing::post(
                move |state: State<AppState>,
                      Path(id): Path<String>,
                      Json(body): Json<PatchVariablesDto>| {
                    modify_variables(state, make(id), body)
                },
            ),
        )
        .route(
            &format!("/{root}/:id/{collection}/:name"),
            get(
                move |state: State<AppState>,
                      Path((id, name)): Path<(String, String)>,
                      query: Query<ReadQuery>| {
                    get_variable(state, VariableDescriptor::live(make(id), name), query)
                },
            )
            .put(
                move |state: State<AppState>,
                      Path((id, name)): Path<(String, String)>,
                      Json(body): Json<VariableDto>| {
                    put_variable(state, VariableDescriptor::live(make(id), name), body)
                },
            )
            .delete(
                move |state: State<AppState>, Path((id, name)): Path<(String, String)>| {
                    delete_variable(state, VariableDescriptor::live(make(id), name))
                },
            ),
        )
        .route(
            &format!("/{root}/:id/{collection}/:name/data"),
            get(
                move |state: State<AppState>,
                      Path((id, name)): Path<(String, String)>,
                      query: Query<DataQuery>| {
                    get_variable_data(state, VariableDescriptor::live(make(id), name), query)
                },
            )
            .post(
                move |state: State<AppState>,
                      Path((id, name)): Path<(String, String)>,
                      multipart: Multipart| {
                    post_variable_data(state, VariableDescriptor::live(make(id), name), multipart)
                },
            ),
        )
}

fn history_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/history/variable-instance/:scope/:id/:name",
            get(
                |state: State<AppState>,
                 Path((scope, id, name)): Path<(String, String, String)>,
                 query: Query<ReadQuery>| async move {
                    let descriptor =
                        VariableDescriptor::historic(parse_scope(&scope, id)?, name);
                    get_variable(state, descriptor, query).await
                },
            )
            .delete(
                |state: State<AppState>,
                 Path((scope, id, name)): Path<(String, String, String)>| async move {
                    let descriptor =
                        VariableDescriptor::historic(parse_scope(&scope, id)?, name);
                    delete_variable(state, descriptor).await
                },
            ),
        )
        .route(
            "/history/variable-instance/:scope/:id/:name/data",
            get(
                |state: State<AppState>,
                 Path((scope, id, name)): Path<(String, String, String)>,
                 query: Query<DataQuery>| async move {
                    let descriptor =
                        VariableDescriptor::historic(parse_scope(&scope, id)?, name);
                    get_variable_data(state, descriptor, query).await
                },
            ),
        )
}

fn parse_scope(kind: &str, id: String) -> Result<VariableScope, ApiError> {
    match kind {
        "task" => Ok(VariableScope::Task(id)),
        "execution" => Ok(VariableScope::Execution(id)),
        "process-instance" => Ok(VariableScope::ProcessInstance(id)),
        other => Err(ApiError(VariableError::unsupported(format!(
            "unknown scope kind '{other}'"
        )))),
    }
}

// ── Queries ──

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ReadQuery {
    #[serde(default = "default_true", rename = "deserializeValue")]
    deserialize_value: bool,
}

#[derive(Debug, Default, Deserialize)]
struct DataQuery {
    #[serde(default)]
    filename: Option<String>,
}

// ── Handlers ──

async fn get_variable(
    State(state): State<AppState>,
    descriptor: VariableDescriptor,
    Query(query): Query<ReadQuery>,
) -> Result<Json<VariableDto>, ApiError> {
    let adapter = state.registry.default_engine()?;
    let primary = if query.deserialize_value {
        Projection::Deserialized
    } else {
        Projection::Serialized
    };
    let resolved = read_variable(adapter.as_ref(), &descriptor, primary).await?;
    Ok(Json(VariableDto::from_resolved(&resolved, primary)))
}

async fn get_variable_data(
    State(state): State<AppState>,
    descriptor: VariableDescriptor,
    Query(query): Query<DataQuery>,
) -> Result<Response, ApiError> {
    let adapter = state.registry.default_engine()?;
    let resolved = read_variable(adapter.as_ref(), &descriptor, Projection::Deserialized).await?;
    let payload = build_binary_response(&resolved.value, &resolved.info, query.filename.as_deref())?;
    let headers = [
        (header::CONTENT_TYPE, payload.media_type),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", payload.filename),
        ),
    ];
    Ok((headers, payload.bytes).into_response())
}

async fn put_variable(
    State(state): State<AppState>,
    descriptor: VariableDescriptor,
    body: VariableDto,
) -> Result<StatusCode, ApiError> {
    let adapter = state.registry.default_engine()?;
    state
        .pipeline
        .write_value(
            adapter.as_ref(),
            &descriptor,
            &body.value_type,
            body.value,
            body.value_info,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_variable(
    State(state): State<AppState>,
    descriptor: VariableDescriptor,
) -> Result<StatusCode, ApiError> {
    let adapter = state.registry.default_engine()?;
    adapter.remove_variable(&descriptor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn modify_variables(
    State(state): State<AppState>,
    scope: VariableScope,
    body: PatchVariablesDto,
) -> Result<StatusCode, ApiError> {
    let adapter = state.registry.default_engine()?;
    let modifications = body
        .modifications
        .into_iter()
        .map(|(name, dto)| (name, dto.into_modification()))
        .collect();
    state
        .pipeline
        .write_many(adapter.as_ref(), &scope, modifications, body.deletions)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_variable_data(
    State(state): State<AppState>,
    descriptor: VariableDescriptor,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let mut upload: Option<BinaryUpload> = None;
    let mut value_type: Option<String> = None;
    let mut object_type_name: Option<String> = None;
    let mut encoding: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "data" => {
                let content_type = field.content_type().map(str::to_string);
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                upload = Some(BinaryUpload::new(bytes.to_vec(), content_type, filename));
            }
            "valueType" => value_type = Some(field.text().await.map_err(bad_multipart)?),
            "objectTypeName" | "type" => {
                object_type_name = Some(field.text().await.map_err(bad_multipart)?)
            }
            "encoding" => encoding = Some(field.text().await.map_err(bad_multipart)?),
            // Unknown parts are drained and ignored.
            _ => {
                field.bytes().await.map_err(bad_multipart)?;
            }
        }
    }

    let mut upload = upload.ok_or_else(|| {
        ApiError(VariableError::unsupported(
            "multipart body is missing the 'data' part",
        ))
    })?;
    upload.encoding = encoding;
    let adapter = state.registry.default_engine()?;
    state
        .pipeline
        .write_upload(
            adapter.as_ref(),
            &descriptor,
            value_type.as_deref(),
            object_type_name.as_deref(),
            upload,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
