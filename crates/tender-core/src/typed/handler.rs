//! Handler trait - Task を実行する Handler の定義
//!
//! - `Handler<T>`: 型付きの表層
//! - `DynHandler`: object-safe な内部表現（type erasure）
//! - `TypedHandler<T, H>`: `Handler<T>` → `DynHandler` の変換

use async_trait::async_trait;
use std::marker::PhantomData;

use super::task::Task;
use crate::domain::{Outcome, TenderError};

/// Handler は Task を実行して Outcome を返す
///
/// 失敗は `Err` でも `Outcome::failure` でも返せます。どちらも Dispatcher で
/// error ステータスとして記録され、ワーカーには伝播しません。
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T) -> Result<Outcome, TenderError>;
}

/// Object-safe handler keyed by task string in the registry.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<Outcome, TenderError>;
    fn task_type(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<Outcome, TenderError> {
        let task: T = serde_json::from_value(payload)
            .map_err(|e| TenderError::Decode(format!("{} payload: {e}", T::TYPE)))?;
        self.handler.handle(task).await
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}

#[cfg(test)]
pub(crate) mod test_handlers {
    use super::*;
    use crate::typed::task::test_tasks::{EchoTask, PanicTask};

    pub struct EchoHandler;

    #[async_trait]
    impl Handler<EchoTask> for EchoHandler {
        async fn handle(&self, task: EchoTask) -> Result<Outcome, TenderError> {
            if task.value < 0 {
                return Err(TenderError::Other(format!("negative value {}", task.value)));
            }
            Ok(Outcome::success())
        }
    }

    pub struct PanicHandler;

    #[async_trait]
    impl Handler<PanicTask> for PanicHandler {
        async fn handle(&self, _task: PanicTask) -> Result<Outcome, TenderError> {
            panic!("handler blew up");
        }
    }
}
