//! Ports - 外部機能との境界
//!
//! 各 trait は daemon の外側にあるもの（時計、乱数 ID、HTTP、解析ロジック）への
//! インターフェースです。実装は `impls` にあります。

pub mod analyzer;
pub mod clock;
pub mod fetcher;
pub mod id_generator;

pub use self::analyzer::Analyzer;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::fetcher::{FetchError, Fetcher};
pub use self::id_generator::{IdGenerator, UlidGenerator};
