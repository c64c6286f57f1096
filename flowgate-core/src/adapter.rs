use crate::error::VariableError;
use crate::types::{TypedValue, ValueInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ─── Scopes ───────────────────────────────────────────────────

/// The binding context a variable lives in. Ids are opaque engine strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableScope {
    Task(String),
    Execution(String),
    ProcessInstance(String),
}

impl VariableScope {
    pub fn id(&self) -> &str {
        match self {
            VariableScope::Task(id)
            | VariableScope::Execution(id)
            | VariableScope::ProcessInstance(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VariableScope::Task(_) => "task",
            VariableScope::Execution(_) => "execution",
            VariableScope::ProcessInstance(_) => "process-instance",
        }
    }
}

/// Identifies where a variable lives. Immutable once a request begins.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub scope: VariableScope,
    pub historic: bool,
}

impl VariableDescriptor {
    pub fn live(scope: VariableScope, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope,
            historic: false,
        }
    }

    pub fn historic(scope: VariableScope, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope,
            historic: true,
        }
    }
}

/// One variable as handed across the engine boundary: its typed value plus
/// the accompanying metadata map.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineVariable {
    pub value: TypedValue,
    pub info: ValueInfo,
}

impl EngineVariable {
    pub fn new(value: TypedValue, info: ValueInfo) -> Self {
        Self { value, info }
    }
}

// ─── Engine boundary ──────────────────────────────────────────

/// The engine-side variable operations this pipeline calls.
///
/// Every method blocks on engine I/O for the duration of one HTTP request;
/// the pipeline never retries. File content crosses this boundary as owned
/// bytes — the adapter drains and closes any underlying stream. Object
/// values returned with `deserialize == true` must already have cleared
/// the deserialization guard at this boundary.
#[async_trait]
pub trait ScopeAdapter: Send + Sync {
    async fn get_variable(
        &self,
        descriptor: &VariableDescriptor,
        deserialize: bool,
    ) -> Result<EngineVariable, VariableError>;

    async fn set_variable(
        &self,
        descriptor: &VariableDescriptor,
        variable: EngineVariable,
    ) -> Result<(), VariableError>;

    async fn remove_variable(&self, descriptor: &VariableDescriptor) -> Result<(), VariableError>;

    /// Apply all modifications and deletions in one engine call. Atomicity,
    /// if any, is the adapter's responsibility — the pipeline does not roll
    /// back partial writes.
    async fn update_variables(
        &self,
        scope: &VariableScope,
        modifications: BTreeMap<String, EngineVariable>,
        deletions: Vec<String>,
    ) -> Result<(), VariableError>;
}

// ─── Engine registry ──────────────────────────────────────────

pub const DEFAULT_ENGINE: &str = "default";

/// Keyed registry of engine adapters, built once at startup and read-only
/// thereafter — never a lazily-populated global.
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn ScopeAdapter>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: BTreeMap::new(),
        }
    }

    pub fn with_engine(mut self, name: impl Into<String>, adapter: Arc<dyn ScopeAdapter>) -> Self {
        self.engines.insert(name.into(), adapter);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ScopeAdapter>, VariableError> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| VariableError::engine(format!("no engine named '{name}'")))
    }

    pub fn default_engine(&self) -> Result<Arc<dyn ScopeAdapter>, VariableError> {
        self.get(DEFAULT_ENGINE)
    }

    pub fn engine_names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
