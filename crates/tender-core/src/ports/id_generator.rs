//! IdGenerator port - ファイル名用 ID 生成の抽象化
//!
//! artifact と successor instruction のファイル名は衝突してはいけないので、
//! ULID（timestamp + 80-bit random）で生成します。

use crate::domain::ids::{ArtifactId, ChainId};
use crate::ports::Clock;
use ulid::Ulid;

/// Thread Safety: 複数ワーカーから共有されるため `Send + Sync` を要求
pub trait IdGenerator: Send + Sync {
    fn generate_artifact_id(&self) -> ArtifactId;

    fn generate_chain_id(&self) -> ChainId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_artifact_id(&self) -> ArtifactId {
        ArtifactId::from(self.next_ulid())
    }

    fn generate_chain_id(&self) -> ChainId {
        ChainId::from(self.next_ulid())
    }
}
