//! Task trait - task 文字列と型の対応付け
//!
//! `task` フィールドの値（"download" / "analyze"）を型に結び付け、
//! Handler との対応をコンパイル時に保証します。

use serde::Serialize;
use serde::de::DeserializeOwned;

/// # Trait Bounds
/// - `Serialize`: successor instruction として書き出すため
/// - `DeserializeOwned`: instruction ファイルから復元するため
/// - `Send + Sync + 'static`: ワーカー間で共有するため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// `task` フィールドの値
    const TYPE: &'static str;
}
