//! tender-core
//!
//! Building blocks for `tenderd`, a daemon that picks up JSON instruction
//! files from a watch directory, runs them, and files them away.
//!
//! # モジュール構成
//! - **domain**: instruction レコード、型付き task、ID、Outcome、エラー
//! - **store**: watch / done / download ディレクトリと claim（rename による排他）
//! - **typed**: Task trait, Handler trait, TypedRegistry
//! - **ports**: Clock, IdGenerator, Fetcher, Analyzer
//! - **impls**: HttpFetcher, PlaceholderAnalyzer
//! - **app**: Dispatcher, WorkerPool, ClaimScheduler, Daemon
//! - **config**: JSON 設定ファイル

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod store;
pub mod typed;

pub use app::{Daemon, ShutdownReport};
pub use config::DaemonConfig;
