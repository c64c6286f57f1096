use crate::adapter::{EngineVariable, ScopeAdapter, VariableDescriptor, VariableScope};
use crate::error::VariableError;
use crate::guard::DeserializationGuard;
use crate::types::TypedValue;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

type VarKey = (VariableScope, String);

/// In-memory ScopeAdapter for tests and POC wiring.
///
/// Holds a live view and a historic snapshot view. Every live write also
/// snapshots into the historic view, so the historic read path works
/// without a real engine. Historic variables are read/delete only.
pub struct MemoryEngine {
    live: RwLock<HashMap<VarKey, EngineVariable>>,
    historic: RwLock<HashMap<VarKey, EngineVariable>>,
    guard: Arc<DeserializationGuard>,
}

impl MemoryEngine {
    pub fn new(guard: Arc<DeserializationGuard>) -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
            historic: RwLock::new(HashMap::new()),
            guard,
        }
    }

    /// Engine with the deserialization check switched off.
    pub fn unguarded() -> Self {
        Self::new(Arc::new(DeserializationGuard::disabled()))
    }

    fn view(&self, historic: bool) -> &RwLock<HashMap<VarKey, EngineVariable>> {
        if historic {
            &self.historic
        } else {
            &self.live
        }
    }
}

fn lock_failed<T>(e: impl std::fmt::Display) -> Result<T, VariableError> {
    Err(VariableError::engine(format!("lock poisoned: {e}")))
}

#[async_trait]
impl ScopeAdapter for MemoryEngine {
    async fn get_variable(
        &self,
        descriptor: &VariableDescriptor,
        deserialize: bool,
    ) -> Result<EngineVariable, VariableError> {
        let store = match self.view(descriptor.historic).read() {
            Ok(s) => s,
            Err(e) => return lock_failed(e),
        };
        let key = (descriptor.scope.clone(), descriptor.name.clone());
        let variable = store
            .get(&key)
            .cloned()
            .ok_or_else(|| VariableError::not_found(&descriptor.name))?;

        // The engine boundary is where object payloads clear the guard
        // before being handed out in deserialized form.
        if deserialize {
            if let TypedValue::Object(object) = &variable.value {
                self.guard.check_name(&object.object_type_name)?;
            }
        }
        Ok(variable)
    }

    async fn set_variable(
        &self,
        descriptor: &VariableDescriptor,
        variable: EngineVariable,
    ) -> Result<(), VariableError> {
        if descriptor.historic {
            return Err(VariableError::engine("historic variables are read-only"));
        }
        let key = (descriptor.scope.clone(), descriptor.name.clone());
        match self.live.write() {
            Ok(mut live) => live.insert(key.clone(), variable.clone()),
            Err(e) => return lock_failed(e),
        };
        match self.historic.write() {
            Ok(mut historic) => historic.insert(key, variable),
            Err(e) => return lock_failed(e),
        };
        Ok(())
    }

    async fn remove_variable(&self, descriptor: &VariableDescriptor) -> Result<(), VariableError> {
        let mut store = match self.view(descriptor.historic).write() {
            Ok(s) => s,
            Err(e) => return lock_failed(e),
        };
        let key = (descriptor.scope.clone(), descriptor.name.clone());
        store
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| VariableError::not_found(&descriptor.name))
    }

    async fn update_variables(
        &self,
        scope: &VariableScope,
        modifications: BTreeMap<String, EngineVariable>,
        deletions: Vec<String>,
    ) -> Result<(), VariableError> {
        for (name, variable) in modifications {
            let descriptor = VariableDescriptor::live(scope.clone(), name);
            self.set_variable(&descriptor, variable).await?;
        }
        // Deleting a name that is already gone is not an error in batch form.
        let mut live = match self.live.write() {
            Ok(s) => s,
            Err(e) => return lock_failed(e),
        };
        for name in deletions {
            live.remove(&(scope.clone(), name));
        }
        Ok(())
    }
}
