//! Typed - 型付き Task API
//!
//! `task` 文字列の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::Task;
