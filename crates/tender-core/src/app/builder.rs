//! AppBuilder - handler の登録と起動時検証
//!
//! 必要な task（download / analyze）の handler が揃っていなければ
//! 起動前に BuildError を返します（Fail-fast）。

use thiserror::Error;

use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// ```ignore
/// let app = AppBuilder::new()
///     .register::<DownloadTask, _>(fetch_handler)?
///     .register::<AnalyzeTask, _>(process_handler)?
///     .expect_tasks(&[DownloadTask::TYPE, AnalyzeTask::TYPE])
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    registry: TypedRegistry,
    expected_tasks: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no handler registered for task types {0:?}")]
    MissingTaskTypes(Vec<String>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, BuildError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// task 文字列のうち、build 時に handler が必須のもの
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = task_types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// 期待集合 ⊆ 登録済み集合 をチェックして App を作る
    pub fn build(self) -> Result<App, BuildError> {
        let registered = self.registry.registered_types();
        let missing: Vec<String> = self
            .expected_tasks
            .into_iter()
            .filter(|t| !registered.contains(t))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingTaskTypes(missing));
        }
        Ok(App {
            registry: self.registry,
        })
    }
}

/// Validated handler set, ready to hand to a Dispatcher.
pub struct App {
    pub registry: TypedRegistry,
}
