//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpFetcher**: reqwest ベースの Fetcher
//! - **PlaceholderAnalyzer**: analyze タスクの仮実装

pub mod http_fetcher;
pub mod placeholder_analyzer;

pub use self::http_fetcher::HttpFetcher;
pub use self::placeholder_analyzer::PlaceholderAnalyzer;
