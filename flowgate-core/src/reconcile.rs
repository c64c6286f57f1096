use crate::adapter::{EngineVariable, ScopeAdapter, VariableDescriptor};
use crate::error::VariableError;
use crate::types::{Projection, TypedValue, ValueInfo};
use serde_json::Value as JsonValue;

/// Both projections of one variable, fetched back-to-back.
///
/// Best-effort point-in-time pair: the two underlying reads are sequential
/// and not retried, so a concurrent mutation between them shows up as two
/// divergent snapshots. Known limitation, returned as-is.
#[derive(Clone, Debug)]
pub struct DualView {
    pub serialized: EngineVariable,
    pub deserialized: EngineVariable,
}

/// The reconciled read result: the typed value of the requested primary
/// projection, plus both raw values for the DTO layer to pick from.
#[derive(Clone, Debug)]
pub struct ResolvedVariable {
    pub descriptor: VariableDescriptor,
    pub value: TypedValue,
    pub info: ValueInfo,
    pub value_serialized: JsonValue,
    pub value_deserialized: JsonValue,
}

/// Read one variable in both projections and merge them.
///
/// Fetch order is deserialized first, then serialized. If either fetch
/// misses, the whole read fails `NotFound` — no partial result. Object
/// values arriving on the deserialized projection have already cleared
/// the deserialization guard at the adapter boundary; nothing is
/// re-validated here.
pub async fn read_variable(
    adapter: &dyn ScopeAdapter,
    descriptor: &VariableDescriptor,
    primary: Projection,
) -> Result<ResolvedVariable, VariableError> {
    let deserialized = adapter.get_variable(descriptor, true).await?;
    let serialized = adapter.get_variable(descriptor, false).await?;
    Ok(reconcile(
        descriptor.clone(),
        DualView {
            serialized,
            deserialized,
        },
        primary,
    ))
}

/// Merge a dual view into one response, selecting the primary projection.
pub fn reconcile(
    descriptor: VariableDescriptor,
    view: DualView,
    primary: Projection,
) -> ResolvedVariable {
    let value_serialized = view.serialized.value.raw_value(Projection::Serialized);
    let value_deserialized = view.deserialized.value.raw_value(Projection::Deserialized);
    let EngineVariable { value, info } = match primary {
        Projection::Serialized => view.serialized,
        Projection::Deserialized => view.deserialized,
    };
    ResolvedVariable {
        descriptor,
        value,
        info,
        value_serialized,
        value_deserialized,
    }
}
