//! The variable value pipeline behind a process-engine REST façade.
//!
//! Converts between the wire representation of a process variable (type
//! tag, raw value, metadata map) and the engine's typed-value model, while
//! reconciling the serialized/deserialized read projections, guarding
//! object deserialization behind a configured type allowlist, and turning
//! binary and file values into byte-stream responses.
//!
//! The engine itself sits behind the [`adapter::ScopeAdapter`] trait; an
//! in-memory implementation backs the tests and POC wiring. Everything is
//! per-request and synchronous within one handler — the only process-wide
//! state is the allowlist, loaded once at startup.

pub mod adapter;
pub mod adapter_memory;
pub mod binary;
pub mod error;
pub mod guard;
pub mod reconcile;
pub mod types;
pub mod write;

pub use adapter::{
    EngineRegistry, EngineVariable, ScopeAdapter, VariableDescriptor, VariableScope,
};
pub use error::VariableError;
pub use guard::{DeserializationGuard, PatternAllowlist, TypeDescriptor};
pub use reconcile::{read_variable, ResolvedVariable};
pub use types::{decode, encode, Projection, TypedValue, ValueInfo};
pub use write::{BinaryUpload, VariableModification, VariablePipeline};
