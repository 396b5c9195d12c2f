//! TypedRegistry - Handler の登録と管理
//!
//! - `register::<T, H>()` で登録、内部的に TypedHandler でラップ
//! - HashMap<String, Arc<dyn DynHandler>> で管理
//! - 起動時に組み立て、実行時は読み取りのみ（ロック不要）

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;

#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let task_type = T::TYPE.to_string();
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        self.handlers
            .insert(task_type, Arc::new(TypedHandler::new(handler)));
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::test_handlers::{EchoHandler, PanicHandler};
    use crate::typed::task::test_tasks::{EchoTask, PanicTask};

    #[test]
    fn test_register_and_get() {
        let mut registry = TypedRegistry::new();
        registry.register::<EchoTask, _>(EchoHandler).unwrap();

        let retrieved = registry.get(EchoTask::TYPE).unwrap();
        assert_eq!(retrieved.task_type(), "echo");
        assert!(registry.get("download").is_none());
    }

    #[test]
    fn test_double_registration() {
        let mut registry = TypedRegistry::new();
        registry.register::<EchoTask, _>(EchoHandler).unwrap();
        let result = registry.register::<EchoTask, _>(EchoHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t == "echo"));
    }

    #[test]
    fn test_registered_types_are_sorted() {
        let mut registry = TypedRegistry::new();
        registry.register::<PanicTask, _>(PanicHandler).unwrap();
        registry.register::<EchoTask, _>(EchoHandler).unwrap();
        assert_eq!(registry.registered_types(), vec!["echo", "panic"]);
    }
}
