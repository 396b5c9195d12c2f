//! Domain identifiers.
//!
//! 2 種類の ID を扱います。
//! - **InstructionId**: instruction ファイルの `id`。外部の producer が決める不透明な文字列。
//! - **Id<T>**: daemon 自身が生成するファイル名用の ULID（artifact / chain）。
//!
//! ## Phantom Type パターン
//! `Id<T>` は `T` をマーカーとしてだけ使い、ArtifactId と ChainId を
//! コンパイル時に区別します。実行時のサイズは Ulid と同じです。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Correlation id carried by an instruction and copied onto its successor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionId(String);

impl InstructionId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// IdMarker は各 ID 型のマーカー trait
///
/// Display とファイル名で使うプレフィックスを提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ULID-based id, typed by what it names.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// File name for this id with the given extension (`".bin"`, `".json"`).
    pub fn file_name(&self, extension: &str) -> String {
        format!("{self}{extension}")
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Downloaded artifact のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Artifact {}

impl IdMarker for Artifact {
    fn prefix() -> &'static str {
        "artifact-"
    }
}

/// Successor instruction ファイルのマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {}

impl IdMarker for Chain {
    fn prefix() -> &'static str {
        "chain-"
    }
}

/// Name of a file written under the download directory.
pub type ArtifactId = Id<Artifact>;

/// Name of a successor instruction file written into the watch directory.
pub type ChainId = Id<Chain>;
