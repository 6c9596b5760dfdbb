//! IdGenerator port - ID 生成の抽象化
//!
//! Owner token は「どの実行単位がロックを持っているか」をフリート全体で
//! 区別できる必要があるため、調整不要で生成できる ULID を使います。

use crate::domain::ids::{BatchId, OwnerId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    /// One fresh owner per dispatch invocation.
    fn generate_owner_id(&self) -> OwnerId;

    fn generate_batch_id(&self) -> BatchId;
}

/// UlidGenerator は Clock の時刻 + 乱数で ULID を生成
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_owner_id(&self) -> OwnerId {
        OwnerId::from(self.next_ulid())
    }

    fn generate_batch_id(&self) -> BatchId {
        BatchId::from(self.next_ulid())
    }
}
